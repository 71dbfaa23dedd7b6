//! Bulk ancestor fetcher against an SLPDB-shaped indexer (§4.5, §6).
//!
//! Grounded on the teacher's `rpc/http_adapter/client.rs`: a `reqwest::Client`
//! built once with connect/read timeouts, `tracing` spans around each call,
//! and errors normalized into the crate's own error type rather than leaking
//! `reqwest::Error` to callers. Unlike the JSON-RPC teacher client, this one
//! speaks the indexer's single `GET /q/{base64(query)}` endpoint and walks
//! the ancestor DAG in depth-bounded strips (§4.5 step 3).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use bitcoin::Txid;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::IndexerError;
use crate::tx_cache::TxCache;

/// Ancestors per query, matching the server-side ceiling (§4.5).
const DEFAULT_CEILING: u32 = 1_000;
const METADATA_TIMEOUT: Duration = Duration::from_secs(10);
const GRAPH_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    g: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct MetadataDoc {
    txid: String,
    #[serde(default)]
    txcount: u64,
    #[serde(rename = "totalDepth", default)]
    total_depth: u32,
    #[serde(rename = "queryDepth", default)]
    query_depth: u32,
}

#[derive(Debug, Deserialize)]
struct AncestorDoc {
    txid: String,
    depth: u32,
    /// Base64-encoded raw transaction bytes.
    raw: String,
}

#[derive(Debug, Deserialize)]
struct GraphDoc {
    #[serde(default)]
    ancestors: Vec<AncestorDoc>,
}

/// Per-root metadata learned from a metadata query (§4.5 step 1).
#[derive(Debug, Clone, Copy)]
struct RootMetadata {
    query_depth: u32,
    total_depth: u32,
}

/// One bulk ancestor search. Re-entrant across calls for different root
/// sets; callers are expected to run at most one search at a time through
/// their own serialization (the job manager's single worker, in practice).
pub struct GraphSearchClient {
    client: reqwest::Client,
    host: String,
    ceiling: u32,
    done: AtomicU64,
    total: AtomicU64,
    error_msg: Mutex<Option<String>>,
    success: Mutex<Option<bool>>,
}

impl GraphSearchClient {
    pub fn new(host: impl Into<String>) -> Self {
        Self::with_ceiling(host, DEFAULT_CEILING)
    }

    pub fn with_ceiling(host: impl Into<String>, ceiling: u32) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(GRAPH_TIMEOUT)
            .build()
            .expect("reqwest client builder uses valid static config");
        Self {
            client,
            host: host.into(),
            ceiling,
            done: AtomicU64::new(0),
            total: AtomicU64::new(0),
            error_msg: Mutex::new(None),
            success: Mutex::new(None),
        }
    }

    /// `(done, total)` progress counters, readable from any thread (§4.5).
    pub fn progress(&self) -> (u64, u64) {
        (self.done.load(Ordering::Relaxed), self.total.load(Ordering::Relaxed))
    }

    pub async fn search_error(&self) -> Option<String> {
        self.error_msg.lock().await.clone()
    }

    pub async fn search_success(&self) -> Option<bool> {
        *self.success.lock().await
    }

    /// Fetch every ancestor of `roots` into `tx_cache`, up to each root's
    /// server-reported depth, recursing in strips per §4.5 step 3.
    ///
    /// Always sets `search_success`/`search_error` before returning,
    /// mirroring the "finally-guarded" completion the spec describes, even
    /// when an individual root's queries fail.
    pub async fn search(&self, roots: &[Txid], tx_cache: &TxCache) -> Result<(), IndexerError> {
        if roots.is_empty() {
            return Err(IndexerError::EmptyQuery);
        }
        if self.host.is_empty() {
            *self.success.lock().await = Some(false);
            *self.error_msg.lock().await = Some(IndexerError::NoHost.to_string());
            return Err(IndexerError::NoHost);
        }

        self.done.store(0, Ordering::Relaxed);
        self.total.store(0, Ordering::Relaxed);
        *self.error_msg.lock().await = None;

        let outcome = self.search_inner(roots, tx_cache).await;

        *self.success.lock().await = Some(outcome.is_ok());
        if let Err(ref e) = outcome {
            *self.error_msg.lock().await = Some(e.to_string());
        }
        outcome
    }

    async fn search_inner(&self, roots: &[Txid], tx_cache: &TxCache) -> Result<(), IndexerError> {
        let metadata = self.metadata_query(roots).await?;

        for &root in roots {
            let Some(meta) = metadata.get(&root) else {
                continue;
            };
            self.total.fetch_add(meta.total_depth.max(1) as u64, Ordering::Relaxed);
            self.walk_strips(root, *meta, tx_cache).await?;
        }
        Ok(())
    }

    /// Walk one root's ancestor DAG in depth-bounded strips until the
    /// indexer's own `totalDepth` is exhausted (§4.5 step 3).
    async fn walk_strips(
        &self,
        root: Txid,
        meta: RootMetadata,
        tx_cache: &TxCache,
    ) -> Result<(), IndexerError> {
        let mut frontier = vec![root];
        let mut depth_covered = 0u32;

        while !frontier.is_empty() && depth_covered < meta.total_depth {
            let remaining = meta.total_depth - depth_covered;
            let step = meta.query_depth.min(remaining).max(1);

            let mut deepest_layer: HashMap<u32, Vec<Txid>> = HashMap::new();
            let mut max_depth_seen = 0u32;

            for &seed in &frontier {
                let ancestors = self.graph_query(seed, step).await?;
                for ancestor in ancestors {
                    tx_cache.put(ancestor.txid, ancestor.raw).await;
                    self.done.fetch_add(1, Ordering::Relaxed);
                    max_depth_seen = max_depth_seen.max(ancestor.depth);
                    deepest_layer.entry(ancestor.depth).or_default().push(ancestor.txid);
                }
            }

            depth_covered += step;
            frontier = deepest_layer.remove(&max_depth_seen).unwrap_or_default();
            if frontier.is_empty() {
                break;
            }
        }
        Ok(())
    }

    async fn metadata_query(&self, txids: &[Txid]) -> Result<HashMap<Txid, RootMetadata>, IndexerError> {
        let txid_strings: Vec<String> = txids.iter().map(Txid::to_string).collect();
        let query = json!({
            "v": 3,
            "q": {
                "db": ["g"],
                "aggregate": [
                    { "$match": { "graphTxn.txid": { "$in": txid_strings } } },
                    { "$project": {
                        "txid": "$graphTxn.txid",
                        "txcount": 1,
                        "totalDepth": 1,
                        "queryDepth": 1,
                    }}
                ],
                "limit": self.ceiling,
            }
        });

        let docs: Vec<MetadataDoc> = self.fetch(&query, METADATA_TIMEOUT).await?;
        let mut out = HashMap::with_capacity(docs.len());
        for doc in docs {
            let txid: Txid = doc
                .txid
                .parse()
                .map_err(|_| IndexerError::InvalidResponse(format!("bad txid in metadata doc: {}", doc.txid)))?;
            out.insert(
                txid,
                RootMetadata {
                    query_depth: doc.query_depth.min(doc.total_depth).max(1),
                    total_depth: doc.total_depth,
                },
            );
            debug!(%txid, txcount = doc.txcount, "graph-search metadata");
        }
        Ok(out)
    }

    async fn graph_query(&self, seed: Txid, max_depth: u32) -> Result<Vec<ParsedAncestor>, IndexerError> {
        let query = json!({
            "v": 3,
            "q": {
                "db": ["g"],
                "aggregate": [
                    { "$match": { "graphTxn.txid": seed.to_string() } },
                    { "$graphLookup": {
                        "from": "graphs",
                        "startWith": "$graphTxn.txid",
                        "connectFromField": "graphTxn.txid",
                        "connectToField": "graphTxn.outputs.spendTxid",
                        "as": "ancestors",
                        "maxDepth": max_depth,
                        "depthField": "depth",
                    }},
                    { "$project": {
                        "ancestors.graphTxn.txid": 1,
                        "ancestors.depth": 1,
                        "ancestors.raw": 1,
                    }}
                ],
            }
        });

        let docs: Vec<GraphDoc> = self.fetch(&query, GRAPH_TIMEOUT).await?;
        let mut out = Vec::new();
        for doc in docs {
            for ancestor in doc.ancestors {
                let txid: Txid = ancestor.txid.parse().map_err(|_| {
                    IndexerError::InvalidResponse(format!("bad txid in ancestor doc: {}", ancestor.txid))
                })?;
                let raw = URL_SAFE
                    .decode(ancestor.raw.as_bytes())
                    .map_err(|e| IndexerError::InvalidResponse(format!("bad base64 raw tx: {e}")))?;
                out.push(ParsedAncestor {
                    txid,
                    depth: ancestor.depth,
                    raw,
                });
            }
        }
        Ok(out)
    }

    async fn fetch<T: for<'de> Deserialize<'de>>(
        &self,
        query: &serde_json::Value,
        timeout: Duration,
    ) -> Result<Vec<T>, IndexerError> {
        let encoded = URL_SAFE.encode(query.to_string());
        let url = format!("{}/q/{}", self.host.trim_end_matches('/'), encoded);

        debug!(url = %url, "graph-search request");
        let response = self
            .client
            .get(&url)
            .timeout(timeout)
            .send()
            .await
            .map_err(IndexerError::Transport)?;

        if !response.status().is_success() {
            let status = response.status();
            warn!(%status, "graph-search indexer returned non-2xx");
            return Err(IndexerError::InvalidResponse(format!("HTTP {status}")));
        }

        let envelope: Envelope<T> = response
            .json()
            .await
            .map_err(IndexerError::Transport)?;
        Ok(envelope.g)
    }
}

struct ParsedAncestor {
    txid: Txid,
    depth: u32,
    raw: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_roots_is_rejected() {
        let client = GraphSearchClient::new("http://localhost:1");
        let cache = TxCache::new();
        let err = client.search(&[], &cache).await.unwrap_err();
        assert!(matches!(err, IndexerError::EmptyQuery));
    }

    #[tokio::test]
    async fn missing_host_is_rejected_and_recorded() {
        let client = GraphSearchClient::new("");
        let cache = TxCache::new();
        let root = crate::test_util::txid("root");
        let err = client.search(&[root], &cache).await.unwrap_err();
        assert!(matches!(err, IndexerError::NoHost));
        assert_eq!(client.search_success().await, Some(false));
        assert!(client.search_error().await.is_some());
    }

    #[tokio::test]
    async fn progress_starts_at_zero() {
        let client = GraphSearchClient::new("http://localhost:1");
        assert_eq!(client.progress(), (0, 0));
    }
}
