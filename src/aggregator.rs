use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::bitcoin::BitcoinProvider;
use crate::chain::ChainProvider;
use crate::config::Config;
use crate::error::PortfolioError;
use crate::ethereum::EthereumProvider;
use crate::fetcher::{FetchOutcome, Normalizer, WalletFetcher};
use crate::price::{PriceProvider, PriceResolver};
use crate::registry::{ChainFamily, ChainId, ChainRegistry};
use crate::solana::SolanaProvider;
use crate::types::{Asset, WalletBalances};

/// A wallet to fetch: the unit of dispatch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletRef {
    pub address: String,
    pub chain: ChainId,
}

impl WalletRef {
    pub fn new(address: impl Into<String>, chain: ChainId) -> Self {
        Self {
            address: address.into(),
            chain,
        }
    }
}

/// How assets are grouped when merging across wallets
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MergeKey {
    /// Distinct tokens sharing a ticker on one chain collapse together
    #[default]
    SymbolChain,
    SymbolChainContract,
}

impl MergeKey {
    fn key(&self, asset: &Asset) -> (String, ChainId, Option<String>) {
        let contract = match self {
            MergeKey::SymbolChain => None,
            MergeKey::SymbolChainContract => asset.contract_address.as_ref().map(|c| c.to_lowercase()),
        };
        (asset.symbol.to_uppercase(), asset.chain, contract)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WalletFailure {
    pub wallet: WalletRef,
    pub reason: String,
}

/// Ranked assets plus the wallets that contributed nothing because a source failed
#[derive(Debug, Clone, Default)]
pub struct AggregateReport {
    pub assets: Vec<Asset>,
    pub failures: Vec<WalletFailure>,
}

impl AggregateReport {
    pub fn total_value(&self) -> f64 {
        self.assets.iter().map(|a| a.value).sum()
    }
}

/// Group by merge key, summing balances and values. First-seen order is kept.
pub fn merge_assets(assets: Vec<Asset>, key: MergeKey) -> Vec<Asset> {
    let mut merged: Vec<Asset> = Vec::with_capacity(assets.len());
    let mut index: HashMap<(String, ChainId, Option<String>), usize> = HashMap::new();

    for asset in assets {
        match index.get(&key.key(&asset)) {
            Some(&i) => merged[i].absorb(&asset),
            None => {
                index.insert(key.key(&asset), merged.len());
                merged.push(asset);
            }
        }
    }
    merged
}

/// Sort descending by value and keep the top `top_n`. Ties keep their input order.
pub fn rank(mut assets: Vec<Asset>, top_n: usize) -> Vec<Asset> {
    assets.sort_by(|a, b| b.value.total_cmp(&a.value));
    assets.truncate(top_n);
    assets
}

/// Fans wallet fetches out to per-family fetchers and merges the results
pub struct Aggregator {
    registry: Arc<ChainRegistry>,
    prices: Arc<dyn PriceProvider>,
    normalizer: Normalizer,
    fetchers: HashMap<ChainFamily, WalletFetcher>,
    merge_key: MergeKey,
    top_n: usize,
}

impl Aggregator {
    pub fn new(registry: Arc<ChainRegistry>, prices: Arc<dyn PriceProvider>, normalizer: Normalizer) -> Self {
        Self {
            registry,
            prices,
            normalizer,
            fetchers: HashMap::new(),
            merge_key: MergeKey::default(),
            top_n: 10,
        }
    }

    /// Wire the live providers for every chain family
    pub fn from_config(config: &Config) -> Result<Self, PortfolioError> {
        let registry = Arc::new(ChainRegistry::from_config(config)?);
        let prices = PriceResolver::new(&config.prices).map_err(|e| PortfolioError::Config(format!("{:#}", e)))?;

        Ok(Self::new(registry, Arc::new(prices), Normalizer::new(&config.pipeline))
            .with_provider(
                ChainFamily::Evm,
                Arc::new(EthereumProvider::new(Duration::from_secs(config.http.explorer_timeout_secs))),
            )
            .with_provider(
                ChainFamily::Bitcoin,
                Arc::new(BitcoinProvider::new(Duration::from_secs(config.http.bitcoin_timeout_secs))),
            )
            .with_provider(ChainFamily::Solana, Arc::new(SolanaProvider))
            .with_top_n(config.pipeline.top_n))
    }

    pub fn with_provider(mut self, family: ChainFamily, provider: Arc<dyn ChainProvider>) -> Self {
        self.fetchers.insert(
            family,
            WalletFetcher::new(provider, self.prices.clone(), self.normalizer),
        );
        self
    }

    pub fn with_merge_key(mut self, merge_key: MergeKey) -> Self {
        self.merge_key = merge_key;
        self
    }

    pub fn with_top_n(mut self, top_n: usize) -> Self {
        self.top_n = top_n;
        self
    }

    pub fn registry(&self) -> &ChainRegistry {
        &self.registry
    }

    /// Fetch a single wallet. Only unknown chains and malformed addresses are errors.
    pub async fn fetch_wallet(&self, address: &str, chain_id: ChainId) -> Result<FetchOutcome, PortfolioError> {
        let chain = self.registry.ensure_valid(address, chain_id)?;
        let Some(fetcher) = self.fetchers.get(&chain.family()) else {
            warn!("No provider registered for {:?} chains", chain.family());
            return Ok(FetchOutcome::Failure {
                reason: format!("no provider registered for {}", chain_id),
            });
        };
        Ok(fetcher.fetch(chain, address).await)
    }

    /// Balance response for one wallet, unmerged and unranked
    pub async fn wallet_balances(&self, address: &str, chain_id: ChainId) -> Result<WalletBalances, PortfolioError> {
        let outcome = self.fetch_wallet(address, chain_id).await?;
        Ok(WalletBalances {
            chain: chain_id,
            address: address.to_string(),
            assets: outcome.into_assets(),
        })
    }

    /// Dispatch every wallet at once and join. The default internal strategy.
    pub async fn fetch_all_concurrent(&self, wallets: &[WalletRef]) -> Result<AggregateReport, PortfolioError> {
        self.validate_all(wallets)?;
        info!("Fetching balances for {} wallets concurrently", wallets.len());

        let outcomes = join_all(wallets.iter().map(|w| self.fetch_wallet(&w.address, w.chain))).await;
        let outcomes = outcomes.into_iter().collect::<Result<Vec<_>, _>>()?;
        Ok(self.finish(wallets, outcomes))
    }

    /// One wallet at a time, for callers that sit behind rate-limited APIs.
    pub async fn fetch_all_sequential(&self, wallets: &[WalletRef]) -> Result<AggregateReport, PortfolioError> {
        self.validate_all(wallets)?;
        info!("Fetching balances for {} wallets sequentially", wallets.len());

        let mut outcomes = Vec::with_capacity(wallets.len());
        for wallet in wallets {
            outcomes.push(self.fetch_wallet(&wallet.address, wallet.chain).await?);
        }
        Ok(self.finish(wallets, outcomes))
    }

    fn validate_all(&self, wallets: &[WalletRef]) -> Result<(), PortfolioError> {
        for wallet in wallets {
            self.registry.ensure_valid(&wallet.address, wallet.chain)?;
        }
        Ok(())
    }

    fn finish(&self, wallets: &[WalletRef], outcomes: Vec<FetchOutcome>) -> AggregateReport {
        let mut assets = Vec::new();
        let mut failures = Vec::new();

        for (wallet, outcome) in wallets.iter().zip(outcomes) {
            match outcome {
                FetchOutcome::Success(found) => assets.extend(found),
                FetchOutcome::Failure { reason } => failures.push(WalletFailure {
                    wallet: wallet.clone(),
                    reason,
                }),
            }
        }

        let merged = merge_assets(assets, self.merge_key);
        let total = merged.len();
        let assets = rank(merged, self.top_n);
        info!("Returning top {} holdings (from {} total assets)", assets.len(), total);

        AggregateReport { assets, failures }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::tests::{quote, raw_token, registry, FakeChain, FakePrices};

    const EVM_A: &str = "0x1111111111111111111111111111111111111111";
    const EVM_B: &str = "0x2222222222222222222222222222222222222222";
    const SOL: &str = "8vJ1EEeJBSX8UZetuHY7d2SiGjdw2AhfamzfxokPsCF4";

    fn asset(symbol: &str, value: f64, chain: ChainId, contract: Option<&str>) -> Asset {
        Asset::new(symbol, symbol.into(), value, 6, 1.0, chain, contract.map(str::to_string))
    }

    fn aggregator(evm: FakeChain, prices: FakePrices) -> Aggregator {
        Aggregator::new(Arc::new(registry()), Arc::new(prices), Normalizer::default())
            .with_provider(ChainFamily::Evm, Arc::new(evm))
    }

    fn usdc_wallets() -> (FakeChain, FakePrices) {
        let mut evm = FakeChain::default();
        for wallet in [EVM_A, EVM_B] {
            evm.native.insert(wallet.into(), 0);
            evm.tokens
                .insert(wallet.into(), vec![raw_token("0xusdc", "10000000", 6, Some("USDC"))]);
        }
        let mut prices = FakePrices::default();
        prices.tokens.insert("0xusdc".into(), quote(1.0, "USDC"));
        (evm, prices)
    }

    #[test]
    fn test_merge_same_symbol_and_chain() {
        let merged = merge_assets(
            vec![
                asset("USDC", 10.0, ChainId::Base, Some("0xa")),
                asset("ETH", 5.0, ChainId::Base, None),
                asset("usdc", 15.0, ChainId::Base, Some("0xb")),
            ],
            MergeKey::SymbolChain,
        );
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].symbol, "USDC");
        assert_eq!(merged[0].balance, 25.0);
        assert_eq!(merged[0].value, 25.0);
        assert_eq!(merged[1].symbol, "ETH");
    }

    #[test]
    fn test_merge_by_contract_keeps_distinct_tokens() {
        let merged = merge_assets(
            vec![
                asset("USDC", 10.0, ChainId::Base, Some("0xA")),
                asset("USDC", 15.0, ChainId::Base, Some("0xb")),
                asset("USDC", 1.0, ChainId::Base, Some("0xa")),
            ],
            MergeKey::SymbolChainContract,
        );
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].value, 11.0);
        assert_eq!(merged[1].value, 15.0);
    }

    #[test]
    fn test_single_asset_unaffected_by_merge() {
        let only = asset("SOL", 3.0, ChainId::Solana, None);
        assert_eq!(merge_assets(vec![only.clone()], MergeKey::SymbolChain), vec![only]);
    }

    #[test]
    fn test_rank_sorts_and_truncates() {
        let assets: Vec<Asset> = (0..15)
            .map(|i| asset(&format!("T{i}"), (i * 7 % 15) as f64, ChainId::Ethereum, None))
            .collect();
        let ranked = rank(assets, 10);
        assert_eq!(ranked.len(), 10);
        assert!(ranked.windows(2).all(|w| w[0].value >= w[1].value));
        assert_eq!(ranked[0].value, 14.0);
    }

    #[tokio::test]
    async fn test_same_token_on_different_chains_not_merged() {
        let registry = registry();
        let (evm, prices) = usdc_wallets();
        let aggregator = aggregator(evm, prices);
        let wallets = vec![WalletRef::new(EVM_A, ChainId::Ethereum), WalletRef::new(EVM_B, ChainId::Base)];

        let report = aggregator.fetch_all_concurrent(&wallets).await.unwrap();
        assert_eq!(report.assets.len(), 2);
        assert!(report.assets.iter().all(|a| a.symbol == "USDC" && a.value == 10.0));
        assert_ne!(report.assets[0].chain, report.assets[1].chain);
        assert!(report.failures.is_empty());
        assert_eq!(registry.resolve(report.assets[0].chain).unwrap().family(), ChainFamily::Evm);
    }

    #[tokio::test]
    async fn test_same_chain_wallets_merge() {
        let (evm, prices) = usdc_wallets();
        let aggregator = aggregator(evm, prices);
        let wallets = vec![WalletRef::new(EVM_A, ChainId::Base), WalletRef::new(EVM_B, ChainId::Base)];

        let report = aggregator.fetch_all_sequential(&wallets).await.unwrap();
        assert_eq!(report.assets.len(), 1);
        assert_eq!(report.assets[0].balance, 20.0);
        assert_eq!(report.total_value(), 20.0);
    }

    #[tokio::test]
    async fn test_failed_wallet_does_not_abort_siblings() {
        let (evm, prices) = usdc_wallets();
        let aggregator = aggregator(evm, prices);
        let unknown = "0x3333333333333333333333333333333333333333";
        let wallets = vec![
            WalletRef::new(unknown, ChainId::Ethereum),
            WalletRef::new(EVM_A, ChainId::Ethereum),
            WalletRef::new(SOL, ChainId::Solana),
        ];

        let report = aggregator.fetch_all_concurrent(&wallets).await.unwrap();
        assert_eq!(report.assets.len(), 1);
        assert_eq!(report.failures.len(), 2);
        assert_eq!(report.failures[0].wallet.address, unknown);
        assert!(report.failures[1].reason.contains("no provider"));
    }

    #[tokio::test]
    async fn test_strategies_agree() {
        let (evm, prices) = usdc_wallets();
        let aggregator = aggregator(evm, prices);
        let wallets = vec![WalletRef::new(EVM_A, ChainId::Ethereum), WalletRef::new(EVM_B, ChainId::Base)];

        let concurrent = aggregator.fetch_all_concurrent(&wallets).await.unwrap();
        let sequential = aggregator.fetch_all_sequential(&wallets).await.unwrap();
        assert_eq!(concurrent.assets, sequential.assets);
    }

    #[tokio::test]
    async fn test_invalid_address_rejected_up_front() {
        let (evm, prices) = usdc_wallets();
        let aggregator = aggregator(evm, prices);
        let wallets = vec![WalletRef::new(EVM_A, ChainId::Ethereum), WalletRef::new("0x123", ChainId::Base)];

        let err = aggregator.fetch_all_concurrent(&wallets).await.unwrap_err();
        assert!(matches!(err, PortfolioError::InvalidAddressFormat { chain: ChainId::Base, .. }));
    }

    #[tokio::test]
    async fn test_output_capped_at_top_n() {
        let mut evm = FakeChain::default();
        let mut prices = FakePrices::default();
        let mut tokens = Vec::new();
        for i in 0..14 {
            let contract = format!("0xt{i}");
            tokens.push(raw_token(&contract, &format!("{}", (i + 1) * 1_000_000), 6, Some(&format!("T{i}"))));
            prices.tokens.insert(contract, quote(20.0, &format!("T{i}")));
        }
        evm.native.insert(EVM_A.into(), 1_000_000_000_000_000_000);
        evm.tokens.insert(EVM_A.into(), tokens);
        prices.symbols.insert("ETH".into(), 2000.0);

        let report = aggregator(evm, prices)
            .fetch_all_concurrent(&[WalletRef::new(EVM_A, ChainId::Arbitrum)])
            .await
            .unwrap();
        assert_eq!(report.assets.len(), 10);
        assert_eq!(report.assets[0].symbol, "ETH");
        assert!(report.assets.windows(2).all(|w| w[0].value >= w[1].value));
    }

    #[tokio::test]
    async fn test_wallet_balances_response() {
        let (evm, prices) = usdc_wallets();
        let response = aggregator(evm, prices)
            .wallet_balances(EVM_A, ChainId::Optimism)
            .await
            .unwrap();
        assert_eq!(response.chain, ChainId::Optimism);
        assert_eq!(response.assets.len(), 1);
    }
}
