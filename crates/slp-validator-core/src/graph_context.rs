//! Registry tying together graphs, the job manager, and the wallet/proxy
//! collaborators (§4.6).
//!
//! Grounded on the teacher's `rpc/mod.rs` collaborator-trait shape (small
//! `async_trait` interfaces the core depends on, implemented by the
//! embedding application) for `WalletStore`/`ValidityOracle`, and on
//! `rpc/http_adapter/client.rs`'s "one long-lived client, callers borrow
//! it" style for how `GraphContext` itself is held (behind an `Arc`, shared
//! by every caller thread per §5's concurrency model).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bitcoin::Txid;
use tokio::sync::Mutex;
use tracing::warn;

use crate::error::CoreError;
use crate::job::{FetchHook, JobHandle, JobManager, Nft1ParentResolver, TxSource, ValidationJob, ValidityCache};
use crate::slp_script::{parse_slp_output_script, SlpTransactionType};
use crate::token_graph::TokenGraph;
use crate::tx::Tx;
use crate::tx_cache::TxCache;
use crate::types::{OutputSlot, TokenId, Validity};
use crate::validators::{Nft1ChildValidator, Slp1Validator, Validator, NFT1_CHILD_TOKEN_TYPE};

const PROXY_REPLY_TIMEOUT: Duration = Duration::from_secs(5);

/// Wallet-side collaborator (§6): wallet-known transactions and the
/// per-wallet validity cache, read before a fetch and written on completion.
#[async_trait]
pub trait WalletStore: Send + Sync {
    async fn get_transaction(&self, txid: &Txid) -> Option<Vec<u8>>;
    async fn get_validity(&self, txid: &Txid) -> Option<Validity>;
    async fn put_validity(&self, txid: Txid, validity: Validity);
}

/// External validity oracle consulted when `ValidatorConfig::proxy_enabled`
/// (§4.6, §5: "bounded waits on the proxy reply queue").
#[async_trait]
pub trait ValidityOracle: Send + Sync {
    async fn query(&self, txids: &[Txid]) -> HashMap<Txid, Validity>;
}

/// Recognized configuration keys (§6), resolved once by the embedding
/// application and handed to the context as a plain value rather than read
/// from process-wide mutable config at job time.
#[derive(Debug, Clone, Default)]
pub struct ValidatorConfig {
    pub download_limit: Option<u64>,
    pub depth_limit: Option<u64>,
    pub proxy_enabled: bool,
}

struct WalletValidityCache(Arc<dyn WalletStore>);

#[async_trait]
impl ValidityCache for WalletValidityCache {
    async fn get(&self, txid: &Txid) -> Option<Validity> {
        self.0.get_validity(txid).await
    }

    async fn put(&self, txid: Txid, validity: Validity) {
        self.0.put_validity(txid, validity).await;
    }
}

struct WalletFetchHook(Arc<dyn WalletStore>);

#[async_trait]
impl FetchHook for WalletFetchHook {
    async fn fetch(&self, txids: &[Txid]) -> Vec<(Txid, Vec<u8>)> {
        let mut out = Vec::with_capacity(txids.len());
        for &txid in txids {
            if let Some(raw) = self.0.get_transaction(&txid).await {
                out.push((txid, raw));
            }
        }
        out
    }
}

/// Thread-safe registry owning one job manager and a map token-id → graph
/// (§4.6).
pub struct GraphContext {
    graphs: Mutex<HashMap<TokenId, Arc<TokenGraph>>>,
    /// Two managers, per §5 point 1: SLP1 jobs and NFT1 jobs run on
    /// separate single-worker managers. This matters beyond throughput —
    /// resolving an NFT1 child's GENESIS submits and awaits a job on the
    /// parent's SLP1 graph from *inside* the NFT1 job's own worker; sharing
    /// one manager would deadlock that wait against itself.
    manager_slp1: Mutex<JobManager>,
    manager_nft1: Mutex<JobManager>,
    tx_source: Arc<dyn TxSource>,
    tx_cache: Arc<TxCache>,
    wallet: Arc<dyn WalletStore>,
    oracle: Option<Arc<dyn ValidityOracle>>,
    config: ValidatorConfig,
}

impl GraphContext {
    pub fn new(
        tx_source: Arc<dyn TxSource>,
        tx_cache: Arc<TxCache>,
        wallet: Arc<dyn WalletStore>,
        oracle: Option<Arc<dyn ValidityOracle>>,
        config: ValidatorConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            graphs: Mutex::new(HashMap::new()),
            manager_slp1: Mutex::new(JobManager::new()),
            manager_nft1: Mutex::new(JobManager::new()),
            tx_source,
            tx_cache,
            wallet,
            oracle,
            config,
        })
    }

    /// Return the existing graph for `token_id`, or construct one with the
    /// validator implied by `token_type` (§4.1, §4.6).
    pub async fn get_graph(&self, token_id: TokenId, token_type: u8) -> Arc<TokenGraph> {
        let mut graphs = self.graphs.lock().await;
        if let Some(graph) = graphs.get(&token_id) {
            return graph.clone();
        }
        let validator = if token_type == NFT1_CHILD_TOKEN_TYPE {
            Validator::Nft1Child(Nft1ChildValidator::new(token_id.clone()))
        } else {
            Validator::Slp1(Slp1Validator::new(token_id.clone(), token_type))
        };
        let graph = Arc::new(TokenGraph::new(token_id.clone(), validator));
        graphs.insert(token_id, graph.clone());
        graph
    }

    /// Remove and reset a graph (§4.6).
    pub async fn kill_graph(&self, token_id: &str) {
        let removed = self.graphs.lock().await.remove(token_id);
        if let Some(graph) = removed {
            graph.reset().await;
        }
    }

    /// Parse `tx`'s first output, derive its token-id, and resolve (or
    /// build) its graph (§4.6).
    pub async fn setup_job(&self, tx: &Tx) -> Result<(Arc<TokenGraph>, TokenId), CoreError> {
        if tx.outputs.is_empty() {
            return Err(CoreError::InvalidTxData("transaction has no outputs".into()));
        }
        let msg = parse_slp_output_script(&tx.outputs[0].script_pubkey)
            .map_err(|e| CoreError::InvalidTxData(e.to_string()))?;

        let token_id = match &msg.transaction_type {
            SlpTransactionType::Genesis { .. } => tx.txid.to_string(),
            SlpTransactionType::Mint { token_id_hex, .. } => token_id_hex.clone(),
            SlpTransactionType::Send { token_id_hex, .. } => token_id_hex.clone(),
            SlpTransactionType::Commit => {
                return Err(CoreError::InvalidTxData("COMMIT carries no token-id".into()))
            }
        };

        let graph = self.get_graph(token_id.clone(), msg.token_type).await;
        Ok((graph, token_id))
    }

    /// Set up, configure, build, and submit a job for `tx`'s root (§4.6).
    /// If proxy consultation is enabled, a background task awaits the job's
    /// completion, consults the oracle with a bounded wait, folds its
    /// replies into the graph, and writes final verdicts to the wallet's
    /// validity cache.
    pub async fn make_job(self: &Arc<Self>, tx: Tx) -> Result<Arc<JobHandle>, CoreError> {
        let (graph, _token_id) = self.setup_job(&tx).await?;
        let root = tx.txid;
        graph.add(root).await;

        let mut job = ValidationJob::new(
            vec![root],
            graph.clone(),
            self.tx_source.clone(),
            self.tx_cache.clone(),
            Arc::new(WalletValidityCache(self.wallet.clone())),
        )
        .with_fetch_hook(Arc::new(WalletFetchHook(self.wallet.clone())));
        job = self.apply_limits(job);

        let is_nft1 = graph.validator().is_nft1_child();
        if is_nft1 {
            job = job.with_nft1_parent_resolver(self.clone() as Arc<dyn Nft1ParentResolver>);
        }

        let handle = Arc::new({
            let manager = if is_nft1 {
                self.manager_nft1.lock().await
            } else {
                self.manager_slp1.lock().await
            };
            manager.submit(job)
        });

        if self.config.proxy_enabled {
            if let Some(oracle) = self.oracle.clone() {
                let ctx = self.clone();
                let handle_bg = handle.clone();
                let graph_bg = graph.clone();
                tokio::spawn(async move {
                    handle_bg.wait().await;
                    ctx.run_proxy_followup(&graph_bg, &oracle).await;
                });
            }
        }

        Ok(handle)
    }

    /// Reset all graphs, kill the job manager, then install a fresh one
    /// (§4.6). The context is usable again immediately after.
    pub async fn kill(&self) {
        {
            let graphs = self.graphs.lock().await;
            for graph in graphs.values() {
                graph.reset().await;
            }
        }
        let mut slp1 = self.manager_slp1.lock().await;
        std::mem::take(&mut *slp1).kill();

        let mut nft1 = self.manager_nft1.lock().await;
        std::mem::take(&mut *nft1).kill();
    }

    fn apply_limits(&self, mut job: ValidationJob) -> ValidationJob {
        if let Some(limit) = self.config.download_limit {
            job = job.with_download_limit(limit);
        }
        if let Some(limit) = self.config.depth_limit {
            job = job.with_depth_limit(limit);
        }
        job
    }

    async fn fetch_raw(&self, txid: Txid) -> Option<Vec<u8>> {
        if let Some(raw) = self.tx_cache.get(&txid).await {
            return Some(raw);
        }
        if let Some(raw) = self.wallet.get_transaction(&txid).await {
            self.tx_cache.put(txid, raw.clone()).await;
            return Some(raw);
        }
        match self.tx_source.get_transaction(txid).await {
            Ok(raw) => {
                self.tx_cache.put(txid, raw.clone()).await;
                Some(raw)
            }
            Err(e) => {
                warn!(%txid, error = %e, "graph context: per-tx fetch failed");
                None
            }
        }
    }

    async fn run_proxy_followup(&self, graph: &Arc<TokenGraph>, oracle: &Arc<dyn ValidityOracle>) {
        let unresolved = graph.unresolved_txids().await;
        if unresolved.is_empty() {
            return;
        }

        let reply = tokio::time::timeout(PROXY_REPLY_TIMEOUT, oracle.query(&unresolved)).await;
        let Ok(results) = reply else {
            warn!("graph context: proxy oracle reply timed out");
            return;
        };

        graph.finalize_from_proxy(&results).await;
        for (&txid, &validity) in &results {
            self.wallet.put_validity(txid, validity).await;
        }
    }
}

#[async_trait]
impl Nft1ParentResolver for GraphContext {
    /// Resolve an NFT1 child genesis's parent group transaction by running
    /// a job for it on its own SLP1 graph and reading back the result
    /// (§4.1 last bullet, §4.2). `vout` is the output the child's genesis
    /// input actually spends — the one whose token amount must be nonzero.
    async fn resolve_parent(&self, parent_txid: Txid, vout: u32) -> (Validity, u64) {
        let Some(raw) = self.fetch_raw(parent_txid).await else {
            return (Validity::Unknown, 0);
        };
        let tx = match Tx::from_raw(&raw) {
            Ok(tx) => tx,
            Err(_) => return (Validity::Malformed, 0),
        };
        let Ok((graph, _token_id)) = self.setup_job(&tx).await else {
            return (Validity::Unknown, 0);
        };
        graph.add(parent_txid).await;

        let mut job = ValidationJob::new(
            vec![parent_txid],
            graph.clone(),
            self.tx_source.clone(),
            self.tx_cache.clone(),
            Arc::new(WalletValidityCache(self.wallet.clone())),
        )
        .with_fetch_hook(Arc::new(WalletFetchHook(self.wallet.clone())));
        job = self.apply_limits(job);

        {
            // The parent of an NFT1 child is always an SLP1/129 group
            // token, never itself an NFT1 child, so this always targets
            // the other manager from whichever one is running us.
            let manager = self.manager_slp1.lock().await;
            let handle = manager.submit(job);
            handle.wait().await;
        }

        match graph.get(&parent_txid).await {
            Some(node) => {
                let amount = match node.outputs.get(vout as usize) {
                    Some(OutputSlot::Amount(v)) => *v,
                    _ => 0,
                };
                (node.validity, amount)
            }
            None => (Validity::Unknown, 0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobError;
    use crate::test_util::make_genesis_tx;
    use std::collections::HashMap as StdHashMap;
    use std::sync::Mutex as StdMutex;

    struct FakeWallet {
        transactions: StdMutex<StdHashMap<Txid, Vec<u8>>>,
        validity: StdMutex<StdHashMap<Txid, Validity>>,
    }

    impl FakeWallet {
        fn new() -> Self {
            Self {
                transactions: StdMutex::new(StdHashMap::new()),
                validity: StdMutex::new(StdHashMap::new()),
            }
        }

        fn insert(&self, txid: Txid, raw: Vec<u8>) {
            self.transactions.lock().unwrap().insert(txid, raw);
        }
    }

    #[async_trait]
    impl WalletStore for FakeWallet {
        async fn get_transaction(&self, txid: &Txid) -> Option<Vec<u8>> {
            self.transactions.lock().unwrap().get(txid).cloned()
        }
        async fn get_validity(&self, txid: &Txid) -> Option<Validity> {
            self.validity.lock().unwrap().get(txid).copied()
        }
        async fn put_validity(&self, txid: Txid, validity: Validity) {
            self.validity.lock().unwrap().insert(txid, validity);
        }
    }

    struct DeadSource;

    #[async_trait]
    impl TxSource for DeadSource {
        async fn get_transaction(&self, txid: Txid) -> Result<Vec<u8>, JobError> {
            Err(JobError::Fetch {
                txid,
                message: "no network in this test".into(),
            })
        }
    }

    fn raw_of(tx: &Tx) -> Vec<u8> {
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

    fn context(wallet: Arc<FakeWallet>) -> Arc<GraphContext> {
        GraphContext::new(
            Arc::new(DeadSource),
            Arc::new(TxCache::new()),
            wallet,
            None,
            ValidatorConfig::default(),
        )
    }

    #[tokio::test]
    async fn get_graph_builds_slp1_for_type_one() {
        let ctx = context(Arc::new(FakeWallet::new()));
        let graph = ctx.get_graph("deadbeef".repeat(8), 1).await;
        assert!(!graph.validator().is_nft1_child());
    }

    #[tokio::test]
    async fn get_graph_builds_nft1_child_for_type_sixty_five() {
        let ctx = context(Arc::new(FakeWallet::new()));
        let graph = ctx.get_graph("deadbeef".repeat(8), 65).await;
        assert!(graph.validator().is_nft1_child());
    }

    #[tokio::test]
    async fn get_graph_is_idempotent_per_token_id() {
        let ctx = context(Arc::new(FakeWallet::new()));
        let token_id = "deadbeef".repeat(8);
        let a = ctx.get_graph(token_id.clone(), 1).await;
        let b = ctx.get_graph(token_id, 1).await;
        assert!(Arc::ptr_eq(&a, &b));
    }

    /// GENESIS's token-id is its own txid (§4.1), and `get_info` derives
    /// that txid from the raw-decoded transaction fetched off the wire,
    /// not from whatever label a fixture was built with. Reassign `.txid`
    /// to match what `Tx::from_raw` will independently compute, so the
    /// graph's token-id (taken from the `Tx` passed into `make_job`)
    /// agrees with it.
    fn with_real_txid(tx: Tx) -> (Tx, Vec<u8>) {
        let raw = raw_of(&tx);
        let real_txid = crate::tx::Tx::from_raw(&raw).unwrap().txid;
        (Tx { txid: real_txid, ..tx }, raw)
    }

    #[tokio::test]
    async fn make_job_resolves_genesis_via_wallet_fetch_hook() {
        let wallet = Arc::new(FakeWallet::new());
        let (genesis, raw) = with_real_txid(make_genesis_tx("ctx-genesis", 1000, None, 2));
        wallet.insert(genesis.txid, raw);

        let ctx = context(wallet);
        let handle = ctx.make_job(genesis.clone()).await.unwrap();
        let status = handle.wait().await;

        assert_eq!(status.root_validity[&genesis.txid], Validity::Valid);
    }

    #[tokio::test]
    async fn kill_graph_drops_prior_nodes() {
        let wallet = Arc::new(FakeWallet::new());
        let (genesis, raw) = with_real_txid(make_genesis_tx("ctx-kill", 1000, None, 2));
        wallet.insert(genesis.txid, raw);

        let ctx = context(wallet);
        ctx.make_job(genesis.clone()).await.unwrap().wait().await;

        let token_id = genesis.txid.to_string();
        ctx.kill_graph(&token_id).await;

        let graph = ctx.get_graph(token_id, 1).await;
        assert_eq!(graph.node_count().await, 0);
    }

    #[tokio::test]
    async fn nft1_genesis_resolves_from_parent_graph() {
        let wallet = Arc::new(FakeWallet::new());

        let (parent_genesis, parent_raw) = with_real_txid(make_genesis_tx("parent-group", 1, None, 2));
        wallet.insert(parent_genesis.txid, parent_raw);

        let (child_genesis_tx, child_raw) = with_real_txid(crate::test_util::make_nft1_genesis_tx(
            "nft-genesis",
            parent_genesis.txid,
            1,
        ));
        wallet.insert(child_genesis_tx.txid, child_raw);

        let ctx = context(wallet);
        let handle = ctx.make_job(child_genesis_tx.clone()).await.unwrap();
        let status = handle.wait().await;

        assert_eq!(
            status.root_validity[&child_genesis_tx.txid],
            Validity::Valid
        );
    }
}
