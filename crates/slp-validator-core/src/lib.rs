//! Validation core for an SLP (Simple Ledger Protocol) token client.
//!
//! This crate implements the pure per-type consensus rules, the token
//! DAG and its propagation rule, the bounded validation job and its
//! manager, a bulk graph-search accelerator against an SLPDB-shaped
//! indexer, and the `GraphContext` that ties a wallet's collaborators
//! (tx fetch, tx cache, validity cache) to all of the above.

pub mod error;
pub mod graph_context;
pub mod graph_search;
pub mod job;
pub mod slp_script;
pub mod token_graph;
pub mod tx;
pub mod tx_cache;
pub mod types;
pub mod validators;

#[cfg(test)]
pub(crate) mod test_util;

pub use error::{CoreError, IndexerError, SlpParseError};
pub use graph_context::{GraphContext, ValidatorConfig, ValidityOracle, WalletStore};
pub use graph_search::GraphSearchClient;
pub use job::{
    FetchHook, JobError, JobHandle, JobManager, JobStatus, Nft1ParentResolver, TxSource, ValidationJob,
    ValidityCache,
};
pub use token_graph::{Node, TokenGraph};
pub use tx::{Tx, TxIn, TxOut};
pub use tx_cache::TxCache;
pub use types::{GetInfoResult, MyInfo, OutputSlot, ParentInfo, TokenId, ValidateResult, Validity};
pub use validators::{Nft1ChildValidator, Slp1Validator, TokenValidator, Validator};
