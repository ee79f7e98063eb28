//! claimsync CLI — run the claim scanner against a JSON config.
//!
//! Usage:
//! ```bash
//! claimsync run --config claimsync.json
//! claimsync info
//! ```
//!
//! With the `sqlite` feature, `CLAIMSYNC_DB_PATH` selects a SQLite ledger
//! file; otherwise the in-memory store is used.

use std::env;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use claimsync_chain::{ChainClient, HttpEndpoint, ProviderPool};
use claimsync_core::{AppConfig, LedgerStore};
use claimsync_engine::{EventScanner, LedgerWriter};

fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        print_usage();
        process::exit(1);
    }

    match args[1].as_str() {
        "run" => {
            let config_path = flag_value(&args, "--config").unwrap_or_else(|| {
                eprintln!("run requires --config <path>");
                process::exit(1);
            });
            if let Err(e) = cmd_run(&config_path) {
                eprintln!("Error: {e:#}");
                process::exit(1);
            }
        }
        "info" => cmd_info(),
        "version" | "--version" | "-V" => {
            println!("claimsync {}", env!("CARGO_PKG_VERSION"));
        }
        "help" | "--help" | "-h" => print_usage(),
        other => {
            eprintln!("Unknown command: {other}");
            print_usage();
            process::exit(1);
        }
    }
}

fn flag_value(args: &[String], flag: &str) -> Option<String> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

fn print_usage() {
    println!("claimsync {}", env!("CARGO_PKG_VERSION"));
    println!("Chain-sync engine for claim, referral, and withdrawal ledgers\n");
    println!("USAGE:");
    println!("    claimsync <COMMAND>\n");
    println!("COMMANDS:");
    println!("    run --config <path>  Start the event scanner loop");
    println!("    info                 Show ClaimSync configuration info");
    println!("    version              Print version");
    println!("    help                 Print this help");
}

fn cmd_info() {
    println!("ClaimSync v{}", env!("CARGO_PKG_VERSION"));
    println!("  Default confirmation depth: 12 blocks");
    println!("  Default fetch span: 1000 blocks/call, halving on rate limits");
    println!("  Default poll interval: 5000 ms");
    println!("  Storage backends: memory, SQLite (feature: sqlite)");
    println!("  Contract events: Claimed, ReferralReward, CooldownReset");
}

fn cmd_run(config_path: &str) -> anyhow::Result<()> {
    // .env before the subscriber so RUST_LOG from the file takes effect
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let raw = std::fs::read_to_string(config_path)
        .with_context(|| format!("reading config {config_path}"))?;
    let config: Arc<AppConfig> =
        Arc::new(serde_json::from_str(&raw).with_context(|| format!("parsing {config_path}"))?);
    anyhow::ensure!(!config.rpc_urls.is_empty(), "config lists no rpc_urls");

    let runtime = tokio::runtime::Runtime::new().context("starting runtime")?;
    runtime.block_on(run_scanner(config))
}

async fn run_scanner(config: Arc<AppConfig>) -> anyhow::Result<()> {
    let timeout = Duration::from_millis(config.scan.rpc_timeout_ms);
    let mut endpoints: Vec<Arc<dyn ChainClient>> = Vec::with_capacity(config.rpc_urls.len());
    for url in &config.rpc_urls {
        let endpoint =
            HttpEndpoint::new(url.clone(), timeout).with_context(|| format!("endpoint {url}"))?;
        endpoints.push(Arc::new(endpoint));
    }
    let pool = Arc::new(ProviderPool::new(endpoints));

    let store = provision_store().await.context("provisioning ledger store")?;
    info!(
        providers = pool.len(),
        contract = %config.contract_address,
        "claimsync starting"
    );

    let chain: Arc<dyn ChainClient> = pool.clone();
    let writer = Arc::new(LedgerWriter::new(store.clone(), chain, config.clone()));
    let scanner = EventScanner::new(pool, store, writer, config);
    scanner.run().await;
    Ok(())
}

#[cfg(feature = "sqlite")]
async fn provision_store() -> anyhow::Result<Arc<dyn LedgerStore>> {
    match env::var("CLAIMSYNC_DB_PATH") {
        Ok(path) => {
            info!(path = %path, "opening sqlite ledger");
            Ok(Arc::new(claimsync_storage::SqliteStore::open(&path).await?))
        }
        Err(_) => Ok(Arc::new(claimsync_storage::MemoryStore::new())),
    }
}

#[cfg(not(feature = "sqlite"))]
async fn provision_store() -> anyhow::Result<Arc<dyn LedgerStore>> {
    Ok(Arc::new(claimsync_storage::MemoryStore::new()))
}
