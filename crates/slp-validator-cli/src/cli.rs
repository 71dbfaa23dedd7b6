use clap::Parser;

/// slp-validator-cli — validates a root transaction against the SLP
/// token-DAG validation core, using a JSON-file wallet store and an
/// optional Bitcoin Core RPC endpoint and SLPDB-shaped indexer.
#[derive(Parser)]
#[command(version, about)]
pub struct Cli {
    /// Txid of the transaction to validate.
    pub txid: String,

    /// JSON file backing the wallet store (known transactions and the
    /// validity cache). Created if it does not exist.
    #[arg(long, default_value = "wallet-store.json")]
    pub wallet_file: std::path::PathBuf,

    /// Bitcoin Core (or wire-compatible) RPC URL, used when a transaction
    /// is not already in the wallet store.
    #[arg(long, env = "SLP_VALIDATOR_RPC_URL")]
    pub rpc_url: Option<String>,

    /// RPC username.
    #[arg(long, env = "SLP_VALIDATOR_RPC_USER")]
    pub rpc_user: Option<String>,

    /// RPC password.
    #[arg(long, env = "SLP_VALIDATOR_RPC_PASS")]
    pub rpc_pass: Option<String>,

    /// SLPDB-shaped indexer host, for bulk ancestor graph search.
    #[arg(long, env = "SLP_VALIDATOR_SLPDB_HOST")]
    pub slpdb_host: Option<String>,

    /// Cap on new transactions a validation job may download (§6).
    #[arg(long, env = "SLP_VALIDATOR_DOWNLOAD_LIMIT")]
    pub download_limit: Option<u64>,

    /// Cap on ancestor hops a validation job will walk (§6).
    #[arg(long, env = "SLP_VALIDATOR_DEPTH_LIMIT")]
    pub depth_limit: Option<u64>,

    /// Maximum number of raw transactions to keep in the in-memory cache.
    #[arg(long, default_value = "1000")]
    pub tx_cache_cap: usize,
}
