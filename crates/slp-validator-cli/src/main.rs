mod cli;
mod rpc_source;
mod wallet_store;

use std::sync::Arc;

use clap::Parser;
use eyre::{eyre, Context};

use async_trait::async_trait;
use bitcoin::Txid;
use slp_validator_core::{
    GraphContext, JobError, JobStatus, Tx, TxCache, TxSource, ValidatorConfig,
};

use rpc_source::RpcTxSource;
use wallet_store::JsonWalletStore;

/// Stand-in `TxSource` for runs with no `--rpc-url`: every fetch not
/// already covered by the wallet store or tx cache fails explicitly,
/// rather than silently hanging.
struct NoRpcTxSource;

#[async_trait]
impl TxSource for NoRpcTxSource {
    async fn get_transaction(&self, txid: Txid) -> Result<Vec<u8>, JobError> {
        Err(JobError::Fetch {
            txid,
            message: "no --rpc-url configured; transaction not in wallet store or cache".into(),
        })
    }
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let args = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_file(true)
        .with_line_number(true)
        .with_level(true)
        .init();

    let root_txid: Txid = args.txid.parse().wrap_err("parse txid argument")?;

    let wallet = Arc::new(
        JsonWalletStore::open(args.wallet_file.clone())
            .wrap_err_with(|| format!("open wallet store at {}", args.wallet_file.display()))?,
    );

    let tx_source: Arc<dyn TxSource> = match &args.rpc_url {
        Some(url) => Arc::new(RpcTxSource::new(
            url.clone(),
            args.rpc_user.clone(),
            args.rpc_pass.clone(),
        )),
        None => Arc::new(NoRpcTxSource),
    };

    let tx_cache = Arc::new(TxCache::with_capacity(args.tx_cache_cap));

    if let Some(host) = &args.slpdb_host {
        let search = slp_validator_core::GraphSearchClient::new(host.clone());
        tracing::info!(%host, "running bulk graph search before validation");
        if let Err(err) = search.search(&[root_txid], &tx_cache).await {
            tracing::warn!(error = %err, "graph search failed; falling back to per-tx fetch");
        } else {
            let (done, total) = search.progress();
            tracing::info!(done, total, "graph search complete");
        }
    }

    let config = ValidatorConfig {
        download_limit: args.download_limit,
        depth_limit: args.depth_limit,
        proxy_enabled: false,
    };

    let ctx = GraphContext::new(tx_source.clone(), tx_cache.clone(), wallet.clone(), None, config);

    let raw = fetch_root(&wallet, &tx_source, &tx_cache, root_txid)
        .await
        .map_err(|err| eyre!(format_fetch_error(&root_txid.to_string(), &err)))?;
    let tx = Tx::from_raw(&raw).wrap_err("decode root transaction")?;

    let handle = ctx.make_job(tx).await.wrap_err("submit validation job")?;
    let status = handle.wait().await;

    print_status(&root_txid, &status);

    Ok(())
}

async fn fetch_root(
    wallet: &Arc<JsonWalletStore>,
    tx_source: &Arc<dyn TxSource>,
    tx_cache: &Arc<TxCache>,
    txid: Txid,
) -> Result<Vec<u8>, String> {
    use slp_validator_core::WalletStore;

    if let Some(raw) = tx_cache.get(&txid).await {
        return Ok(raw);
    }
    if let Some(raw) = wallet.get_transaction(&txid).await {
        tx_cache.put(txid, raw.clone()).await;
        return Ok(raw);
    }
    tx_source
        .get_transaction(txid)
        .await
        .inspect(|raw| {
            let tx_cache = tx_cache.clone();
            let raw2 = raw.clone();
            tokio::spawn(async move { tx_cache.put(txid, raw2).await });
        })
        .map_err(|e| e.to_string())
}

fn print_status(root: &Txid, status: &JobStatus) {
    println!();
    println!("  slp-validator-cli result for {root}:");
    match status.root_validity.get(root) {
        Some(validity) => println!("    validity: {validity:?} (code {})", validity.code()),
        None => println!("    validity: unknown (job did not reach the root)"),
    }
    println!("    downloads made: {}", status.downloads_made);
    println!("    max depth reached: {}", status.depths_reached);
    if status.cancelled {
        println!("    cancelled: yes");
    }
    if let Some(err) = &status.error_msg {
        println!("    last fetch error: {err}");
    }
    println!();
}

fn format_fetch_error(txid: &str, source_error: &str) -> String {
    let mut lines = vec![
        format!("could not obtain root transaction `{txid}`"),
        format!("error: {source_error}"),
    ];

    if source_error.contains("no --rpc-url") {
        lines.push("hint: pass --rpc-url, or add the transaction to the wallet file directly".into());
    } else if source_error.contains("Could not resolve host") || source_error.contains("dns error") {
        lines.push("hint: hostname resolution failed; verify --rpc-url and your DNS/network".into());
    } else if source_error.contains("401") || source_error.contains("403") {
        lines.push("hint: authentication failed; verify --rpc-user/--rpc-pass".into());
    }

    lines.join("\n")
}
