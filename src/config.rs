use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::error::PortfolioError;
use crate::registry::ChainFamily;

/// Configuration for all supported chains and the pricing pipeline
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub chains: HashMap<String, ChainConfig>,
    pub prices: PriceConfig,
    pub http: HttpConfig,
    pub pipeline: PipelineConfig,
    pub snapshots: SnapshotConfig,
}

/// Configuration for a single chain
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainConfig {
    #[serde(rename = "type")]
    pub chain_type: ChainFamily,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rpc: Option<String>,
    pub explorer: String,
    /// Blockscout-compatible `module=account&action=tokenlist` endpoint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_list_api: Option<String>,
    /// Chain slug used by the DEX pair aggregator
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dex_chain: Option<String>,
    pub native_token: TokenInfo,
}

/// Native token information from config
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TokenInfo {
    pub symbol: String,
    pub decimals: u8,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceConfig {
    pub coingecko_api: String,
    pub dexscreener_api: String,
    pub timeout_secs: u64,
    pub dex_timeout_secs: u64,
    pub dex_request_delay_ms: u64,
}

impl PriceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn dex_timeout(&self) -> Duration {
        Duration::from_secs(self.dex_timeout_secs)
    }

    pub fn dex_request_delay(&self) -> Duration {
        Duration::from_millis(self.dex_request_delay_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpConfig {
    pub explorer_timeout_secs: u64,
    pub bitcoin_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineConfig {
    /// Token holdings valued below this are dropped; native assets are exempt
    pub min_token_value_usd: f64,
    pub top_n: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotConfig {
    pub min_interval_minutes: i64,
    pub min_change_percent: f64,
    pub retention_days: i64,
}

impl Config {
    /// Load configuration from embedded JSON
    pub fn load() -> Result<Self, PortfolioError> {
        Self::from_json(include_str!("../config.json"))
    }

    pub fn from_json(json: &str) -> Result<Self, PortfolioError> {
        serde_json::from_str(json).map_err(|e| PortfolioError::Config(e.to_string()))
    }

    /// Get a specific chain configuration
    pub fn get_chain(&self, chain_name: &str) -> Option<&ChainConfig> {
        self.chains.get(chain_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_config() {
        let config = Config::load().unwrap();
        for chain in [
            "ethereum", "bitcoin", "solana", "polygon", "bsc", "arbitrum", "optimism", "avalanche",
            "base",
        ] {
            assert!(config.chains.contains_key(chain), "missing {chain}");
        }
    }

    #[test]
    fn test_ethereum_config() {
        let config = Config::load().unwrap();
        let ethereum = config.get_chain("ethereum").unwrap();
        assert_eq!(ethereum.chain_type, ChainFamily::Evm);
        assert_eq!(ethereum.native_token.symbol, "ETH");
        assert_eq!(ethereum.native_token.decimals, 18);
        assert!(ethereum.token_list_api.is_some());
    }

    #[test]
    fn test_bitcoin_has_no_rpc_or_dex() {
        let config = Config::load().unwrap();
        let bitcoin = config.get_chain("bitcoin").unwrap();
        assert_eq!(bitcoin.chain_type, ChainFamily::Bitcoin);
        assert_eq!(bitcoin.native_token.decimals, 8);
        assert!(bitcoin.rpc.is_none());
        assert!(bitcoin.dex_chain.is_none());
    }

    #[test]
    fn test_explorer_only_on_blockscout_chains() {
        let config = Config::load().unwrap();
        assert!(config.get_chain("bsc").unwrap().token_list_api.is_none());
        assert!(config.get_chain("avalanche").unwrap().token_list_api.is_none());
        assert!(config.get_chain("base").unwrap().token_list_api.is_some());
    }

    #[test]
    fn test_pipeline_defaults() {
        let config = Config::load().unwrap();
        assert_eq!(config.pipeline.min_token_value_usd, 10.0);
        assert_eq!(config.pipeline.top_n, 10);
        assert_eq!(config.prices.dex_request_delay(), Duration::from_millis(100));
        assert_eq!(config.snapshots.min_interval_minutes, 30);
    }

    #[test]
    fn test_malformed_config_is_rejected() {
        let err = Config::from_json("{\"chains\": 1}").unwrap_err();
        assert!(matches!(err, PortfolioError::Config(_)));
    }
}
