use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use portfolio_aggregator::{
    Aggregator, ChainId, Config, MergeKey, PortfolioSnapshot, SnapshotDecision, SnapshotPolicy,
    WalletRef,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "portfolio-aggregator")]
#[command(about = "Aggregate priced balances across EVM, Bitcoin and Solana wallets", long_about = None)]
struct Args {
    /// Wallet to include, as chain:address (repeatable)
    #[arg(short, long = "wallet", value_parser = parse_wallet, required = true)]
    wallets: Vec<WalletRef>,

    /// Fetch wallets one at a time instead of all at once
    #[arg(long)]
    sequential: bool,

    /// Number of holdings to show
    #[arg(short, long)]
    top: Option<usize>,

    /// Keep tokens that share a ticker on one chain separate
    #[arg(long)]
    merge_by_contract: bool,

    /// Snapshot history file to consult and update
    #[arg(long)]
    history: Option<PathBuf>,
}

fn parse_wallet(s: &str) -> Result<WalletRef, String> {
    let (chain, address) = s
        .split_once(':')
        .ok_or_else(|| format!("expected chain:address, got '{}'", s))?;
    let chain: ChainId = chain.parse().map_err(|e| format!("{}", e))?;
    Ok(WalletRef::new(address.trim(), chain))
}

fn load_history(path: &Path) -> Result<Vec<PortfolioSnapshot>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let data = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("parsing {}", path.display()))
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let args = Args::parse();

    let config = Config::load()?;
    let mut aggregator = Aggregator::from_config(&config)?;
    if let Some(top) = args.top {
        aggregator = aggregator.with_top_n(top);
    }
    if args.merge_by_contract {
        aggregator = aggregator.with_merge_key(MergeKey::SymbolChainContract);
    }

    let report = if args.sequential {
        aggregator.fetch_all_sequential(&args.wallets).await
    } else {
        aggregator.fetch_all_concurrent(&args.wallets).await
    }?;

    println!("{}", "=".repeat(72));
    for asset in &report.assets {
        println!(
            "{:8} | {:10} | {:>18.6} @ ${:>12.4} = ${:>14.2}",
            asset.symbol,
            asset.chain.as_str(),
            asset.balance,
            asset.price,
            asset.value
        );
    }
    println!("{}", "=".repeat(72));
    println!("Total: ${:.2}", report.total_value());

    for failure in &report.failures {
        eprintln!(
            "warning: {} on {} returned nothing: {}",
            failure.wallet.address, failure.wallet.chain, failure.reason
        );
    }

    if let Some(path) = args.history {
        let policy = SnapshotPolicy::new(&config.snapshots);
        let now = Utc::now();
        let mut history = load_history(&path)?;

        match policy.decide(report.total_value(), &history, now) {
            SnapshotDecision::ReuseLatest(last) => {
                println!("Snapshot: reusing {} (${:.2})", last.timestamp, last.total_value);
            }
            SnapshotDecision::Capture => {
                history.push(PortfolioSnapshot::from_assets(&report.assets, now));
                policy.retain_window(&mut history, now);
                std::fs::write(&path, serde_json::to_string_pretty(&history)?)
                    .with_context(|| format!("writing {}", path.display()))?;
                println!("Snapshot: recorded ({} in history)", history.len());
            }
        }
    }

    Ok(())
}
