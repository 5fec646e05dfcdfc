use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::chain::ChainProvider;
use crate::config::PipelineConfig;
use crate::price::{DexQuote, PriceProvider};
use crate::registry::Chain;
use crate::types::{units_to_f64, Asset, TokenHolding};

/// Result of fetching one wallet. A failure contributes no assets but keeps its reason.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Success(Vec<Asset>),
    Failure { reason: String },
}

impl FetchOutcome {
    pub fn assets(&self) -> &[Asset] {
        match self {
            FetchOutcome::Success(assets) => assets,
            FetchOutcome::Failure { .. } => &[],
        }
    }

    pub fn into_assets(self) -> Vec<Asset> {
        match self {
            FetchOutcome::Success(assets) => assets,
            FetchOutcome::Failure { .. } => Vec::new(),
        }
    }

    pub fn failure_reason(&self) -> Option<&str> {
        match self {
            FetchOutcome::Success(_) => None,
            FetchOutcome::Failure { reason } => Some(reason),
        }
    }
}

/// Turns raw holdings into canonical assets and drops token dust.
#[derive(Debug, Clone, Copy)]
pub struct Normalizer {
    pub min_token_value: f64,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self {
            min_token_value: 10.0,
        }
    }
}

impl Normalizer {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            min_token_value: config.min_token_value_usd,
        }
    }

    /// Native assets are exempt from the value floor; a zero balance yields nothing.
    pub fn native_asset(&self, chain: &Chain, amount: u128, price: f64) -> Option<Asset> {
        if amount == 0 {
            return None;
        }
        let balance = units_to_f64(amount, chain.native_decimals);
        Some(Asset::new(
            &chain.native_symbol,
            chain.name.clone(),
            balance,
            chain.native_decimals,
            price,
            chain.id,
            None,
        ))
    }

    pub fn token_asset(
        &self,
        chain: &Chain,
        holding: &TokenHolding,
        quote: Option<&DexQuote>,
    ) -> Option<Asset> {
        let balance = holding.balance();
        if balance <= 0.0 {
            return None;
        }

        let symbol = holding
            .symbol
            .clone()
            .or_else(|| quote.and_then(|q| q.symbol.clone()))
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| truncate(&holding.contract_address, 8));
        let name = holding
            .name
            .clone()
            .or_else(|| quote.and_then(|q| q.name.clone()))
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| format!("Token {}", symbol.to_uppercase()));
        let price = quote.map(|q| q.price).unwrap_or(0.0);

        let asset = Asset::new(
            &symbol,
            name,
            balance,
            holding.decimals,
            price,
            chain.id,
            Some(holding.contract_address.clone()),
        );
        if !self.passes_floor(&asset) {
            debug!(
                "Skipping {} on {} - value ${:.2} is below ${} threshold",
                asset.symbol, chain.id, asset.value, self.min_token_value
            );
            return None;
        }
        Some(asset)
    }

    pub fn passes_floor(&self, asset: &Asset) -> bool {
        asset.is_native() || asset.value >= self.min_token_value
    }
}

pub(crate) fn truncate(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

/// Fetches and prices every holding of one wallet on one chain family
#[derive(Clone)]
pub struct WalletFetcher {
    provider: Arc<dyn ChainProvider>,
    prices: Arc<dyn PriceProvider>,
    normalizer: Normalizer,
}

impl WalletFetcher {
    pub fn new(
        provider: Arc<dyn ChainProvider>,
        prices: Arc<dyn PriceProvider>,
        normalizer: Normalizer,
    ) -> Self {
        Self {
            provider,
            prices,
            normalizer,
        }
    }

    /// Never fails: a native-balance failure yields `Failure`, a token-list
    /// failure keeps the native asset.
    pub async fn fetch(&self, chain: &Chain, address: &str) -> FetchOutcome {
        let native = match self.provider.get_native_balance(chain, address).await {
            Ok(amount) => amount,
            Err(e) => {
                warn!("Error fetching {} balance for {}: {:#}", chain.id, address, e);
                return FetchOutcome::Failure {
                    reason: format!("{} native balance: {:#}", chain.id, e),
                };
            }
        };

        let mut assets = Vec::new();
        if native > 0 {
            let price = self.prices.symbol_price(&chain.native_symbol).await;
            assets.extend(self.normalizer.native_asset(chain, native, price));
        }

        let holdings = match self.provider.get_token_holdings(chain, address).await {
            Ok(holdings) => holdings,
            Err(e) => {
                warn!("Token list unavailable for {} on {}, skipping tokens: {:#}", address, chain.id, e);
                Vec::new()
            }
        };
        let holdings: Vec<TokenHolding> = holdings.into_iter().filter(|h| h.balance() > 0.0).collect();

        if !holdings.is_empty() {
            debug!("Found {} token holdings for {} on {}", holdings.len(), address, chain.id);
            let contracts: Vec<String> = holdings.iter().map(|h| h.contract_address.clone()).collect();
            let quotes = self.prices.token_quotes(&contracts, chain).await;
            assets.extend(
                holdings
                    .iter()
                    .filter_map(|h| self.normalizer.token_asset(chain, h, quotes.get(&h.contract_address))),
            );
        }

        info!("Found {} assets for {} on {}", assets.len(), address, chain.id);
        FetchOutcome::Success(assets)
    }
}
