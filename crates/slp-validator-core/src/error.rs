//! Error types for slp-validator-core.

use bitcoin::Txid;

// ==============================================================================
// SLP Message Parse Errors
// ==============================================================================

/// Errors from decoding the first output of a transaction as an SLP message.
///
/// A script that isn't SLP at all (`NotSlp`) and a script whose `token_type`
/// is outside a validator's accepted set are both pruned as validity 0
/// ("unknown", not cached) by `get_info` (§4.1); only `Malformed` maps to
/// validity 2.
#[derive(Debug, thiserror::Error, PartialEq, Eq, Clone)]
pub enum SlpParseError {
    #[error("not an SLP output script")]
    NotSlp,

    #[error("malformed SLP message: {0}")]
    Malformed(String),
}

// ==============================================================================
// Indexer (Graph-Search) Errors
// ==============================================================================

/// Errors from the graph-search HTTP client (§4.5, §6).
#[derive(Debug, thiserror::Error)]
pub enum IndexerError {
    #[error("HTTP transport: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("indexer returned invalid response: {0}")]
    InvalidResponse(String),

    #[error("no txids provided for graph search query")]
    EmptyQuery,

    #[error("slpdb host is not configured")]
    NoHost,
}

// ==============================================================================
// Core Errors
// ==============================================================================

/// Top-level error type for slp-validator-core.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error(transparent)]
    Indexer(#[from] IndexerError),

    #[error("transaction not found: {0}")]
    TxNotFound(Txid),

    #[error("invalid transaction data: {0}")]
    InvalidTxData(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
