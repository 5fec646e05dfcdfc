mod aggregator;
mod bitcoin;
mod chain;
mod config;
mod error;
mod ethereum;
mod fetcher;
mod price;
mod registry;
mod snapshot;
mod solana;
mod types;
mod wallet;

pub use aggregator::{
    merge_assets, rank, AggregateReport, Aggregator, MergeKey, WalletFailure, WalletRef,
};
pub use bitcoin::BitcoinProvider;
pub use chain::ChainProvider;
pub use config::{
    ChainConfig, Config, HttpConfig, PipelineConfig, PriceConfig, SnapshotConfig, TokenInfo,
};
pub use error::PortfolioError;
pub use ethereum::EthereumProvider;
pub use fetcher::{FetchOutcome, Normalizer, WalletFetcher};
pub use price::{
    coingecko_id, select_best_pair, DexBaseToken, DexLiquidity, DexPair, DexQuote, PriceProvider,
    PriceResolver,
};
pub use registry::{Chain, ChainFamily, ChainId, ChainRegistry};
pub use snapshot::{
    latest, AssetValue, MemorySnapshotStore, PortfolioSnapshot, SnapshotDecision, SnapshotPolicy,
    SnapshotStore,
};
pub use solana::SolanaProvider;
pub use types::{format_units, units_to_f64, Asset, TokenAmount, TokenHolding, WalletBalances};
pub use wallet::{PortfolioExport, Wallet, WalletList};

/// Get priced balances for an address on a specific chain
pub async fn get_balances(chain_name: &str, address: &str) -> Result<WalletBalances, PortfolioError> {
    let config = Config::load()?;
    let chain: ChainId = chain_name.parse()?;
    Aggregator::from_config(&config)?
        .wallet_balances(address, chain)
        .await
}

/// Merged, ranked holdings across every wallet, fetched concurrently
pub async fn aggregate(wallets: &[WalletRef]) -> Result<AggregateReport, PortfolioError> {
    let config = Config::load()?;
    Aggregator::from_config(&config)?
        .fetch_all_concurrent(wallets)
        .await
}
