use std::collections::{HashMap, HashSet};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::PriceConfig;
use crate::registry::Chain;

/// Price, symbol and name taken from the deepest DEX pair for a token
#[derive(Debug, Clone, PartialEq)]
pub struct DexQuote {
    pub price: f64,
    pub symbol: Option<String>,
    pub name: Option<String>,
}

/// Trait for price sources.
///
/// Lookups never fail: an unavailable symbol price is `0.0` and an unavailable
/// token quote is `None`.
#[async_trait]
pub trait PriceProvider: Send + Sync {
    /// USD price for a well-known ticker
    async fn symbol_price(&self, symbol: &str) -> f64;

    /// USD quote for a token contract (or mint) on the given chain
    async fn token_quote(&self, contract: &str, chain: &Chain) -> Option<DexQuote>;

    /// Quotes for several contracts, keyed by contract. Missing quotes are absent.
    async fn token_quotes(&self, contracts: &[String], chain: &Chain) -> HashMap<String, DexQuote> {
        let mut quotes = HashMap::with_capacity(contracts.len());
        for contract in contracts {
            if let Some(quote) = self.token_quote(contract, chain).await {
                quotes.insert(contract.clone(), quote);
            }
        }
        quotes
    }
}

/// Map a ticker symbol to CoinGecko's asset id. Unknown tickers fall back to the lowercased symbol.
pub fn coingecko_id(symbol: &str) -> String {
    let id = match symbol.to_ascii_uppercase().as_str() {
        // Natives
        "BTC" => "bitcoin",
        "ETH" => "ethereum",
        "SOL" => "solana",
        "MATIC" | "POLYGON" => "matic-network",
        "BNB" => "binancecoin",
        "AVAX" => "avalanche-2",
        // Stables
        "USDC" => "usd-coin",
        "USDT" => "tether",
        "DAI" => "dai",
        // Wrapped
        "WETH" => "weth",
        "WBTC" => "wrapped-bitcoin",
        // DeFi
        "LINK" => "chainlink",
        "UNI" => "uniswap",
        "AAVE" => "aave",
        "CRV" => "curve-dao-token",
        "MKR" => "maker",
        "SNX" => "havven",
        "COMP" => "compound-governance-token",
        "SUSHI" => "sushi",
        _ => return symbol.to_lowercase(),
    };
    id.to_string()
}

#[derive(Debug, Deserialize)]
struct SimplePrice {
    usd: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct DexTokenResponse {
    pairs: Option<Vec<DexPair>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DexPair {
    pub chain_id: String,
    pub price_usd: Option<String>,
    pub base_token: Option<DexBaseToken>,
    pub liquidity: Option<DexLiquidity>,
}

impl DexPair {
    fn liquidity_usd(&self) -> f64 {
        self.liquidity.as_ref().and_then(|l| l.usd).unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DexBaseToken {
    pub symbol: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DexLiquidity {
    pub usd: Option<f64>,
}

/// Pick the highest-liquidity pair trading on `dex_chain`.
pub fn select_best_pair(pairs: &[DexPair], dex_chain: &str) -> Option<DexQuote> {
    let best = pairs
        .iter()
        .filter(|p| p.chain_id == dex_chain)
        // First pair wins on equal liquidity
        .min_by(|a, b| b.liquidity_usd().total_cmp(&a.liquidity_usd()))?;

    let price = best
        .price_usd
        .as_deref()
        .and_then(|p| p.parse::<f64>().ok())
        .unwrap_or(0.0);
    let (symbol, name) = match &best.base_token {
        Some(token) => (token.symbol.clone(), token.name.clone()),
        None => (None, None),
    };

    Some(DexQuote { price, symbol, name })
}

/// Prices via CoinGecko `/simple/price` (symbols) and DexScreener (contracts)
pub struct PriceResolver {
    client: Client,
    coingecko: Url,
    dexscreener: String,
    timeout: Duration,
    dex_timeout: Duration,
    dex_request_delay: Duration,
}

impl PriceResolver {
    pub fn new(config: &PriceConfig) -> Result<Self> {
        let coingecko = Url::parse(&format!(
            "{}/simple/price",
            config.coingecko_api.trim_end_matches('/')
        ))
        .context("coingecko: invalid base url")?;

        Ok(Self {
            client: Client::new(),
            coingecko,
            dexscreener: config.dexscreener_api.trim_end_matches('/').to_string(),
            timeout: config.timeout(),
            dex_timeout: config.dex_timeout(),
            dex_request_delay: config.dex_request_delay(),
        })
    }

    /// Batch USD prices for tickers, keyed by the uppercased ticker.
    pub async fn symbol_prices(&self, symbols: &[String]) -> HashMap<String, f64> {
        match self.try_symbol_prices(symbols).await {
            Ok(prices) => prices,
            Err(e) => {
                warn!("Price lookup failed for {:?}: {:#}", symbols, e);
                HashMap::new()
            }
        }
    }

    async fn try_symbol_prices(&self, symbols: &[String]) -> Result<HashMap<String, f64>> {
        if symbols.is_empty() {
            return Ok(HashMap::new());
        }

        // Deduplicate and map to CoinGecko ids
        let mut ids: Vec<String> = Vec::new();
        let mut seen = HashSet::new();
        for symbol in symbols {
            let id = coingecko_id(symbol);
            if seen.insert(id.clone()) {
                ids.push(id);
            }
        }

        let mut url = self.coingecko.clone();
        url.query_pairs_mut()
            .append_pair("ids", &ids.join(","))
            .append_pair("vs_currencies", "usd")
            .append_pair("include_24hr_change", "true");

        let parsed: HashMap<String, SimplePrice> = self
            .client
            .get(url)
            .header("accept", "application/json")
            .timeout(self.timeout)
            .send()
            .await
            .context("coingecko: request failed")?
            .error_for_status()
            .context("coingecko: non-success status")?
            .json()
            .await
            .context("coingecko: parse JSON failed")?;

        // Ids missing from the response are simply unpriced
        Ok(symbols
            .iter()
            .filter_map(|symbol| {
                let usd = parsed.get(&coingecko_id(symbol))?.usd?;
                Some((symbol.to_uppercase(), usd))
            })
            .collect())
    }

    async fn fetch_pairs(&self, contract: &str) -> Result<Vec<DexPair>> {
        let url = format!("{}/tokens/{}", self.dexscreener, contract);
        let response: DexTokenResponse = self
            .client
            .get(&url)
            .timeout(self.dex_timeout)
            .send()
            .await
            .context("dexscreener: request failed")?
            .error_for_status()
            .context("dexscreener: non-success status")?
            .json()
            .await
            .context("dexscreener: parse JSON failed")?;
        Ok(response.pairs.unwrap_or_default())
    }
}

#[async_trait]
impl PriceProvider for PriceResolver {
    async fn symbol_price(&self, symbol: &str) -> f64 {
        let symbol = symbol.to_uppercase();
        self.symbol_prices(std::slice::from_ref(&symbol))
            .await
            .get(&symbol)
            .copied()
            .unwrap_or(0.0)
    }

    async fn token_quote(&self, contract: &str, chain: &Chain) -> Option<DexQuote> {
        let dex_chain = chain.dex_chain.as_deref()?;
        debug!("Fetching DEX price for {} on {}", contract, chain.id);

        let pairs = match self.fetch_pairs(contract).await {
            Ok(pairs) => pairs,
            Err(e) => {
                warn!("DEX price lookup failed for {}: {:#}", contract, e);
                return None;
            }
        };
        if pairs.is_empty() {
            debug!("No DEX pairs for {}", contract);
            return None;
        }

        let quote = select_best_pair(&pairs, dex_chain);
        match &quote {
            Some(q) => debug!("DEX price for {} ({:?}): ${}", contract, q.symbol, q.price),
            None => debug!("No {} pairs for {}", dex_chain, contract),
        }
        quote
    }

    /// Sequential with a fixed delay between requests to stay under DexScreener's rate limit.
    async fn token_quotes(&self, contracts: &[String], chain: &Chain) -> HashMap<String, DexQuote> {
        let mut quotes = HashMap::with_capacity(contracts.len());
        for (i, contract) in contracts.iter().enumerate() {
            if i > 0 && !self.dex_request_delay.is_zero() {
                tokio::time::sleep(self.dex_request_delay).await;
            }
            if let Some(quote) = self.token_quote(contract, chain).await {
                quotes.insert(contract.clone(), quote);
            }
        }
        quotes
    }
}
