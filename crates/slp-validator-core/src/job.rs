//! A single bounded validation run against one graph, and the single
//! worker that serializes all runs for that graph (§4.3, §4.4).
//!
//! Grounded on the teacher's `graph.rs` BFS ancestry builder for the
//! frontier/visited-set shape, and on its RPC/cache layering (fetch
//! order: cache before network, §4.3) — but the frontier here walks
//! "parent verdicts still needed" edges and drives the validator's
//! `get_info`/`validate` triad instead of pulling raw ancestry data.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bitcoin::Txid;
use tokio::sync::{mpsc, oneshot, Mutex};

use crate::token_graph::TokenGraph;
use crate::tx_cache::TxCache;
use crate::types::{MyInfo, ValidateResult, Validity};
use crate::validators::{resolve_genesis_from_parent, TokenValidator};

// ==============================================================================
// Collaborator Interfaces (§6)
// ==============================================================================

#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("fetch failed for txid {txid}: {message}")]
    Fetch { txid: Txid, message: String },
}

/// Per-transaction network fetch (§6: `get_transaction(txid) -> raw_tx`).
#[async_trait]
pub trait TxSource: Send + Sync {
    async fn get_transaction(&self, txid: Txid) -> Result<Vec<u8>, JobError>;
}

/// Caller-supplied pre-fetch: wallet-local transactions and/or opportunistic
/// bulk graph-search results (§4.3 fetch ordering, step c).
#[async_trait]
pub trait FetchHook: Send + Sync {
    async fn fetch(&self, txids: &[Txid]) -> Vec<(Txid, Vec<u8>)>;
}

/// Wallet-level validity cache (§6: `wallet.slpv1_validity`).
#[async_trait]
pub trait ValidityCache: Send + Sync {
    async fn get(&self, txid: &Txid) -> Option<Validity>;
    async fn put(&self, txid: Txid, validity: Validity);
}

/// Resolves an NFT1 child genesis against its parent group transaction's
/// verdict in a different graph (§4.1 last bullet, §4.2). Implemented by
/// `GraphContext`, which can build and run a job on the parent's graph;
/// `job` itself never constructs another graph.
#[async_trait]
pub trait Nft1ParentResolver: Send + Sync {
    /// Returns `(parent_validity, parent_output_amount_at_vout)` for the
    /// specific output the child genesis's sole input spends.
    async fn resolve_parent(&self, parent_txid: Txid, vout: u32) -> (Validity, u64);
}

// ==============================================================================
// Job Status
// ==============================================================================

#[derive(Debug, Clone, Default)]
pub struct JobStatus {
    pub root_validity: HashMap<Txid, Validity>,
    pub downloads_made: u64,
    pub depths_reached: u64,
    pub error_msg: Option<String>,
    pub cancelled: bool,
}

// ==============================================================================
// Validation Job
// ==============================================================================

/// One bounded run of the validator for a fixed root txid list (§4.3).
pub struct ValidationJob {
    pub roots: Vec<Txid>,
    pub graph: Arc<TokenGraph>,
    pub tx_source: Arc<dyn TxSource>,
    pub tx_cache: Arc<TxCache>,
    pub fetch_hook: Option<Arc<dyn FetchHook>>,
    pub validity_cache: Arc<dyn ValidityCache>,
    pub nft1_parent_resolver: Option<Arc<dyn Nft1ParentResolver>>,
    pub download_limit: Option<u64>,
    pub depth_limit: Option<u64>,
}

impl ValidationJob {
    pub fn new(
        roots: Vec<Txid>,
        graph: Arc<TokenGraph>,
        tx_source: Arc<dyn TxSource>,
        tx_cache: Arc<TxCache>,
        validity_cache: Arc<dyn ValidityCache>,
    ) -> Self {
        Self {
            roots,
            graph,
            tx_source,
            tx_cache,
            fetch_hook: None,
            validity_cache,
            nft1_parent_resolver: None,
            download_limit: None,
            depth_limit: None,
        }
    }

    pub fn with_fetch_hook(mut self, hook: Arc<dyn FetchHook>) -> Self {
        self.fetch_hook = Some(hook);
        self
    }

    pub fn with_nft1_parent_resolver(mut self, resolver: Arc<dyn Nft1ParentResolver>) -> Self {
        self.nft1_parent_resolver = Some(resolver);
        self
    }

    pub fn with_download_limit(mut self, limit: u64) -> Self {
        self.download_limit = Some(limit);
        self
    }

    pub fn with_depth_limit(mut self, limit: u64) -> Self {
        self.depth_limit = Some(limit);
        self
    }

    /// Run the job to completion: seed the roots, drain the frontier, and
    /// return the resulting status (§4.3 execution protocol).
    pub async fn run(&self, cancel: &AtomicBool) -> JobStatus {
        let mut status = JobStatus::default();
        let mut frontier: VecDeque<(Txid, u64)> = VecDeque::new();
        let mut queued: HashSet<Txid> = HashSet::new();

        for &root in &self.roots {
            self.graph.add(root).await;
            if queued.insert(root) {
                frontier.push_back((root, 0));
            }
        }

        'frontier: while let Some((txid, depth)) = frontier.pop_front() {
            if cancel.load(Ordering::SeqCst) {
                status.cancelled = true;
                break;
            }
            if depth > status.depths_reached {
                status.depths_reached = depth;
            }

            let node = self.graph.get(&txid).await;
            let classified = node
                .as_ref()
                .map(|n| n.myinfo.is_some() || n.validity.is_final())
                .unwrap_or(false);

            if !classified {
                match self.classify(txid, depth, &mut status).await {
                    ClassifyOutcome::Pruned(children) => {
                        // Re-examination pushes: always enqueue regardless of
                        // whether `child` was seen before, since a child may
                        // already have been visited (and found pending) prior
                        // to this parent's verdict becoming available.
                        for child in children {
                            frontier.push_back((child, depth));
                        }
                        continue 'frontier;
                    }
                    ClassifyOutcome::Parsed { parents } => {
                        for (parent_txid, parent_depth) in parents {
                            if queued.insert(parent_txid) {
                                frontier.push_back((parent_txid, parent_depth));
                            }
                        }
                    }
                    ClassifyOutcome::DownloadLimitReached => {
                        // Root(s) still referencing this branch stay unknown;
                        // the job is otherwise done (incomplete), per §4.3.4.
                        break 'frontier;
                    }
                    ClassifyOutcome::FetchFailed(message) => {
                        status.error_msg = Some(message);
                        continue 'frontier;
                    }
                }
            }

            if let Some(children) = self.try_resolve_and_finalize(txid).await {
                for child in children {
                    frontier.push_back((child, depth));
                }
            }
        }

        for &root in &self.roots {
            if let Some(node) = self.graph.get(&root).await {
                status.root_validity.insert(root, node.validity);
            }
        }

        // Every node this (or a prior) run decided gets written back
        // unconditionally, not just the ones a proxy follow-up touches
        // (§4.3 step 4, §4.6, §2): this is what lets a later job's
        // validity-cache check short-circuit re-walking a known-decided
        // ancestor (§4.3(a), §5).
        for (verdict_txid, validity) in self.graph.final_verdicts().await {
            self.validity_cache.put(verdict_txid, validity).await;
        }

        status
    }

    async fn classify(&self, txid: Txid, depth: u64, status: &mut JobStatus) -> ClassifyOutcome {
        if let Some(validity) = self.validity_cache.get(&txid).await {
            let children = self.graph.finalize(txid, validity).await;
            return ClassifyOutcome::Pruned(children);
        }

        let raw = match self.obtain_raw(txid, status).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return ClassifyOutcome::DownloadLimitReached,
            Err(message) => return ClassifyOutcome::FetchFailed(message),
        };

        let tx = match crate::tx::Tx::from_raw(&raw) {
            Ok(tx) => tx,
            Err(e) => {
                let children = self.graph.finalize(txid, Validity::Malformed).await;
                let _ = e;
                return ClassifyOutcome::Pruned(children);
            }
        };

        match self.graph.validator().get_info(&tx) {
            crate::types::GetInfoResult::Prune(v) => {
                let children = self.graph.finalize(txid, v).await;
                ClassifyOutcome::Pruned(children)
            }
            crate::types::GetInfoResult::Info {
                vin_mask,
                myinfo,
                outputs,
            } => {
                let mut parent_refs = Vec::new();
                let mut parents = Vec::new();
                for (i, input) in tx.inputs.iter().enumerate() {
                    if !vin_mask.get(i).copied().unwrap_or(false) {
                        continue;
                    }
                    let Some(prevout) = input.prevout else {
                        continue;
                    };
                    // The edge is always recorded as a dependency, even when
                    // the walk won't follow it: `try_resolve` needs to see
                    // it's still outstanding rather than silently absent
                    // (§4.3 point 2). Only the fetch/visit is skipped past
                    // `depth_limit`; the node this resolves via the normal
                    // rules, which means it never decides and the branch
                    // stays unknown (§5, §8: resource exhaustion leaves the
                    // root unknown rather than finalizing it).
                    parent_refs.push((prevout.txid, prevout.vout));
                    let within_depth_limit = self
                        .depth_limit
                        .map(|limit| depth < limit)
                        .unwrap_or(true);
                    if within_depth_limit {
                        self.graph.add(prevout.txid).await;
                        parents.push((prevout.txid, depth + 1));
                    }
                }

                self.graph
                    .set_parsed(txid, tx, myinfo, outputs, parent_refs)
                    .await;

                ClassifyOutcome::Parsed { parents }
            }
        }
    }

    /// Obtain raw transaction bytes via (b) tx-cache, (c) fetch-hook, (d)
    /// per-tx network fetch, in that order (§4.3). Returns `Ok(None)` if a
    /// network fetch would exceed `download_limit`.
    async fn obtain_raw(&self, txid: Txid, status: &mut JobStatus) -> Result<Option<Vec<u8>>, String> {
        if let Some(raw) = self.tx_cache.get(&txid).await {
            return Ok(Some(raw));
        }

        if let Some(hook) = &self.fetch_hook {
            let fetched = hook.fetch(&[txid]).await;
            if let Some((_, raw)) = fetched.into_iter().find(|(t, _)| *t == txid) {
                self.tx_cache.put(txid, raw.clone()).await;
                return Ok(Some(raw));
            }
        }

        if let Some(limit) = self.download_limit {
            if status.downloads_made >= limit {
                return Ok(None);
            }
        }

        match self.tx_source.get_transaction(txid).await {
            Ok(raw) => {
                status.downloads_made += 1;
                self.tx_cache.put(txid, raw.clone()).await;
                Ok(Some(raw))
            }
            Err(e) => Err(e.to_string()),
        }
    }

    /// Attempt to move `txid` from pending to a decided verdict, including
    /// the NFT1 child-genesis cross-graph special case (§4.1, §4.2).
    async fn try_resolve_and_finalize(&self, txid: Txid) -> Option<Vec<Txid>> {
        let node = self.graph.get(&txid).await?;
        if node.validity.is_final() {
            return None;
        }

        if node.myinfo == Some(MyInfo::Genesis) && self.graph.validator().is_nft1_child() {
            let resolver = self.nft1_parent_resolver.as_ref()?;
            let tx = node.tx?;
            let prevout = tx.inputs.first()?.prevout?;
            let (parent_validity, parent_amount) =
                resolver.resolve_parent(prevout.txid, prevout.vout).await;
            let verdict = resolve_genesis_from_parent(parent_validity, parent_amount);
            return Some(self.graph.finalize(txid, verdict).await);
        }

        match self.graph.try_resolve(txid).await? {
            ValidateResult::Decided(v) => Some(self.graph.finalize(txid, v).await),
            ValidateResult::Pending => None,
        }
    }
}

enum ClassifyOutcome {
    Pruned(Vec<Txid>),
    Parsed { parents: Vec<(Txid, u64)> },
    DownloadLimitReached,
    FetchFailed(String),
}

// ==============================================================================
// Job Manager
// ==============================================================================

struct Submission {
    job: ValidationJob,
    cancel: Arc<AtomicBool>,
    status: Arc<Mutex<JobStatus>>,
    done_tx: oneshot::Sender<JobStatus>,
}

/// A handle to a submitted job (§4.4): cancellation, a bounded wait for
/// completion, and the live status.
pub struct JobHandle {
    cancel: Arc<AtomicBool>,
    status: Arc<Mutex<JobStatus>>,
    done_rx: Mutex<Option<oneshot::Receiver<JobStatus>>>,
}

impl JobHandle {
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    pub async fn status(&self) -> JobStatus {
        self.status.lock().await.clone()
    }

    /// Wait for the job to finish and return its final status. Safe to
    /// call more than once; subsequent calls return the cached result.
    pub async fn wait(&self) -> JobStatus {
        let mut done_rx = self.done_rx.lock().await;
        if let Some(rx) = done_rx.take() {
            if let Ok(final_status) = rx.await {
                *self.status.lock().await = final_status.clone();
                return final_status;
            }
        }
        self.status.lock().await.clone()
    }
}

/// Single FIFO queue, single worker, strictly serial job execution (§4.4).
pub struct JobManager {
    submit_tx: mpsc::UnboundedSender<Submission>,
    worker: tokio::task::JoinHandle<()>,
}

impl JobManager {
    pub fn new() -> Self {
        let (submit_tx, mut submit_rx) = mpsc::unbounded_channel::<Submission>();
        let worker = tokio::spawn(async move {
            while let Some(submission) = submit_rx.recv().await {
                let result = submission.job.run(&submission.cancel).await;
                *submission.status.lock().await = result.clone();
                let _ = submission.done_tx.send(result);
            }
        });
        Self { submit_tx, worker }
    }

    /// Enqueue a job; returns immediately with a handle to track it.
    pub fn submit(&self, job: ValidationJob) -> JobHandle {
        let cancel = Arc::new(AtomicBool::new(false));
        let status = Arc::new(Mutex::new(JobStatus::default()));
        let (done_tx, done_rx) = oneshot::channel();

        let submission = Submission {
            job,
            cancel: cancel.clone(),
            status: status.clone(),
            done_tx,
        };
        // The worker only stops draining when `submit_tx` (held by every
        // `JobManager` clone-through-`Arc`) is dropped, so this never fails
        // in practice; a send error means the manager was killed mid-submit.
        let _ = self.submit_tx.send(submission);

        JobHandle {
            cancel,
            status,
            done_rx: Mutex::new(Some(done_rx)),
        }
    }

    /// Cancel the running job, drop queued jobs, and stop the worker. The
    /// manager is unusable afterward and must be recreated (§4.4).
    pub fn kill(self) {
        self.worker.abort();
    }
}

impl Default for JobManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::make_genesis_tx;
    use crate::token_graph::TokenGraph;
    use crate::validators::{Slp1Validator, Validator};
    use std::collections::HashMap as StdHashMap;
    use std::sync::Mutex as StdMutex;

    struct StaticSource(StdMutex<StdHashMap<Txid, Vec<u8>>>);

    #[async_trait]
    impl TxSource for StaticSource {
        async fn get_transaction(&self, txid: Txid) -> Result<Vec<u8>, JobError> {
            self.0
                .lock()
                .unwrap()
                .get(&txid)
                .cloned()
                .ok_or(JobError::Fetch {
                    txid,
                    message: "not found".into(),
                })
        }
    }

    struct NullValidityCache;

    #[async_trait]
    impl ValidityCache for NullValidityCache {
        async fn get(&self, _txid: &Txid) -> Option<Validity> {
            None
        }
        async fn put(&self, _txid: Txid, _validity: Validity) {}
    }

    fn raw_of(tx: &crate::tx::Tx) -> Vec<u8> {
        // Round-trip through a minimal bitcoin::Transaction so `Tx::from_raw`
        // can decode it back inside the job.
        let inputs = tx
            .inputs
            .iter()
            .map(|i| bitcoin::TxIn {
                previous_output: i.prevout.unwrap_or(bitcoin::OutPoint::null()),
                ..Default::default()
            })
            .collect();
        let outputs = tx
            .outputs
            .iter()
            .map(|o| bitcoin::TxOut {
                value: bitcoin::Amount::from_sat(0),
                script_pubkey: o.script_pubkey.clone(),
            })
            .collect();
        let btx = bitcoin::Transaction {
            version: bitcoin::transaction::Version::ONE,
            lock_time: bitcoin::absolute::LockTime::ZERO,
            input: inputs,
            output: outputs,
        };
        bitcoin::consensus::serialize(&btx)
    }

    #[tokio::test]
    async fn genesis_only_root_resolves_valid_with_no_downloads() {
        let genesis = make_genesis_tx("g", 1000, None, 2);
        let raw = raw_of(&genesis);
        // GENESIS's token-id is its own txid (§4.1), which `get_info`
        // derives from the raw-decoded transaction, not the label this
        // fixture was built with; use the same derivation here so the
        // validator's expected token-id actually matches.
        let root = crate::tx::Tx::from_raw(&raw).unwrap().txid;
        let mut raws = StdHashMap::new();
        raws.insert(root, raw);

        let validator = Validator::Slp1(Slp1Validator::new(root.to_string(), 1));
        let graph = Arc::new(TokenGraph::new(root.to_string(), validator));

        let job = ValidationJob::new(
            vec![root],
            graph.clone(),
            Arc::new(StaticSource(StdMutex::new(raws))),
            Arc::new(TxCache::new()),
            Arc::new(NullValidityCache),
        );

        let cancel = AtomicBool::new(false);
        let status = job.run(&cancel).await;

        assert_eq!(status.root_validity[&root], Validity::Valid);
        assert_eq!(status.downloads_made, 1);
    }

    #[tokio::test]
    async fn send_from_valid_genesis_resolves_valid() {
        let token = "tok";
        let token_id_hex = crate::test_util::pad_token_id(token);
        let genesis_txid = crate::test_util::txid("genesis-parent");

        // The genesis parent minted its quantity to vout 1, so the SEND's
        // input must spend that vout for `check_needed` to see it.
        let send = crate::test_util::make_send_tx_spending(
            token,
            vec![0, 1000],
            2,
            crate::test_util::outpoint("genesis-parent", 1),
        );

        let mut raws = StdHashMap::new();
        raws.insert(send.txid, raw_of(&send));

        let validator = Validator::Slp1(Slp1Validator::new(token_id_hex, 1));
        let graph = Arc::new(TokenGraph::new(token.to_string(), validator));
        // Seed the genesis parent as already-valid in the graph directly,
        // simulating a prior job run.
        graph.finalize(genesis_txid, Validity::Valid).await;
        // The genesis parent's output[1] must be known for `check_needed`.
        graph
            .set_parsed(
                genesis_txid,
                crate::tx::Tx {
                    txid: genesis_txid,
                    inputs: vec![],
                    outputs: vec![],
                },
                MyInfo::Genesis,
                vec![
                    crate::types::OutputSlot::None,
                    crate::types::OutputSlot::Amount(1000),
                ],
                vec![],
            )
            .await;

        let job = ValidationJob::new(
            vec![send.txid],
            graph.clone(),
            Arc::new(StaticSource(StdMutex::new(raws))),
            Arc::new(TxCache::new()),
            Arc::new(NullValidityCache),
        );

        let cancel = AtomicBool::new(false);
        let status = job.run(&cancel).await;

        assert_eq!(status.root_validity[&send.txid], Validity::Valid);
    }

    #[tokio::test]
    async fn download_limit_zero_leaves_root_unknown() {
        let genesis = make_genesis_tx("g2", 1000, None, 2);
        let mut raws = StdHashMap::new();
        raws.insert(genesis.txid, raw_of(&genesis));

        let validator = Validator::Slp1(Slp1Validator::new(genesis.txid.to_string(), 1));
        let graph = Arc::new(TokenGraph::new(genesis.txid.to_string(), validator));

        let job = ValidationJob::new(
            vec![genesis.txid],
            graph.clone(),
            Arc::new(StaticSource(StdMutex::new(raws))),
            Arc::new(TxCache::new()),
            Arc::new(NullValidityCache),
        )
        .with_download_limit(0);

        let cancel = AtomicBool::new(false);
        let status = job.run(&cancel).await;

        assert_eq!(status.root_validity[&genesis.txid], Validity::Unknown);
        assert_eq!(status.downloads_made, 0);
    }

    struct RecordingValidityCache(StdMutex<StdHashMap<Txid, Validity>>);

    impl RecordingValidityCache {
        fn new() -> Self {
            Self(StdMutex::new(StdHashMap::new()))
        }
    }

    #[async_trait]
    impl ValidityCache for RecordingValidityCache {
        async fn get(&self, txid: &Txid) -> Option<Validity> {
            self.0.lock().unwrap().get(txid).copied()
        }
        async fn put(&self, txid: Txid, validity: Validity) {
            self.0.lock().unwrap().insert(txid, validity);
        }
    }

    #[tokio::test]
    async fn completed_run_writes_every_final_verdict_back_to_the_validity_cache() {
        let genesis = make_genesis_tx("g-writeback", 1000, None, 2);
        let raw = raw_of(&genesis);
        let root = crate::tx::Tx::from_raw(&raw).unwrap().txid;
        let mut raws = StdHashMap::new();
        raws.insert(root, raw);

        let validator = Validator::Slp1(Slp1Validator::new(root.to_string(), 1));
        let graph = Arc::new(TokenGraph::new(root.to_string(), validator));
        let cache = Arc::new(RecordingValidityCache::new());

        let job = ValidationJob::new(
            vec![root],
            graph,
            Arc::new(StaticSource(StdMutex::new(raws))),
            Arc::new(TxCache::new()),
            cache.clone(),
        );

        let cancel = AtomicBool::new(false);
        let status = job.run(&cancel).await;
        assert_eq!(status.root_validity[&root], Validity::Valid);

        // Written back even though no proxy oracle is configured (default:
        // proxy disabled) — the only path that used to persist verdicts.
        assert_eq!(cache.get(&root).await, Some(Validity::Valid));
    }

    #[tokio::test]
    async fn depth_limit_cut_leaves_root_unknown_instead_of_insufficient_valid_inputs() {
        let token = "tok-depth";
        let token_id_hex = crate::test_util::pad_token_id(token);

        // The SEND's sole vin_mask-true input spends an ancestor that a
        // depth_limit of 0 will never let the walk reach.
        let send = crate::test_util::make_send_tx_spending(
            token,
            vec![0, 1000],
            2,
            crate::test_util::outpoint("depth-cut-ancestor", 0),
        );
        let mut raws = StdHashMap::new();
        raws.insert(send.txid, raw_of(&send));

        let validator = Validator::Slp1(Slp1Validator::new(token_id_hex, 1));
        let graph = Arc::new(TokenGraph::new(token.to_string(), validator));

        let job = ValidationJob::new(
            vec![send.txid],
            graph,
            Arc::new(StaticSource(StdMutex::new(raws))),
            Arc::new(TxCache::new()),
            Arc::new(NullValidityCache),
        )
        .with_depth_limit(0);

        let cancel = AtomicBool::new(false);
        let status = job.run(&cancel).await;

        // Truncated at the cut: the root must stay Unknown (pending on a
        // dependency that was never fetched), never force-finalized to
        // InsufficientValidInputs just because the walk ran out of depth.
        assert_eq!(status.root_validity[&send.txid], Validity::Unknown);
    }

    #[tokio::test]
    async fn job_manager_runs_submitted_jobs() {
        let genesis = make_genesis_tx("g3", 1000, None, 2);
        let raw = raw_of(&genesis);
        let root = crate::tx::Tx::from_raw(&raw).unwrap().txid;
        let mut raws = StdHashMap::new();
        raws.insert(root, raw);

        let validator = Validator::Slp1(Slp1Validator::new(root.to_string(), 1));
        let graph = Arc::new(TokenGraph::new(root.to_string(), validator));

        let job = ValidationJob::new(
            vec![root],
            graph,
            Arc::new(StaticSource(StdMutex::new(raws))),
            Arc::new(TxCache::new()),
            Arc::new(NullValidityCache),
        );

        let manager = JobManager::new();
        let handle = manager.submit(job);
        let status = handle.wait().await;
        assert_eq!(status.root_validity[&root], Validity::Valid);
    }
}
