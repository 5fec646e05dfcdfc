use std::time::Duration;

use alloy::primitives::Address;
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::BlockNumberOrTag;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::chain::ChainProvider;
use crate::fetcher::truncate;
use crate::registry::Chain;
use crate::types::{TokenAmount, TokenHolding};

/// Entry of a Blockscout `tokenlist` response
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExplorerToken {
    contract_address: String,
    balance: Option<String>,
    decimals: Option<String>,
    symbol: Option<String>,
    name: Option<String>,
}

impl ExplorerToken {
    fn into_holding(self) -> TokenHolding {
        let decimals = self
            .decimals
            .as_deref()
            .and_then(|d| d.parse::<u8>().ok())
            .unwrap_or(18);
        let name = self.name.filter(|n| !n.is_empty());
        let symbol = self
            .symbol
            .filter(|s| !s.is_empty())
            .or_else(|| name.as_deref().map(|n| truncate(n, 6)));

        TokenHolding {
            contract_address: self.contract_address,
            amount: TokenAmount::Raw(self.balance.unwrap_or_else(|| "0".to_string())),
            decimals,
            symbol,
            name,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ExplorerResponse {
    #[serde(default)]
    result: serde_json::Value,
}

/// Decode a token-list body. Entries that don't parse are skipped.
fn parse_token_list(body: ExplorerResponse) -> Vec<TokenHolding> {
    let serde_json::Value::Array(entries) = body.result else {
        return Vec::new();
    };
    entries
        .into_iter()
        .filter_map(|entry| match serde_json::from_value::<ExplorerToken>(entry) {
            Ok(token) => Some(token.into_holding()),
            Err(e) => {
                warn!("Error processing explorer token: {}", e);
                None
            }
        })
        .collect()
}

/// EVM chain provider: JSON-RPC for native balances, Blockscout for tokens
pub struct EthereumProvider {
    http: Client,
    explorer_timeout: Duration,
}

impl EthereumProvider {
    pub fn new(explorer_timeout: Duration) -> Self {
        Self {
            http: Client::new(),
            explorer_timeout,
        }
    }
}

#[async_trait]
impl ChainProvider for EthereumProvider {
    async fn get_native_balance(&self, chain: &Chain, address: &str) -> Result<u128> {
        let rpc_url = chain
            .rpc_url
            .as_deref()
            .ok_or_else(|| anyhow!("no RPC endpoint configured for {}", chain.id))?;
        let provider = ProviderBuilder::new().on_http(rpc_url.parse()?);

        let addr: Address = address.parse()?;
        let balance = provider
            .get_balance(addr)
            .block_id(BlockNumberOrTag::Latest.into())
            .await?;

        u128::try_from(balance).map_err(|_| anyhow!("native balance {} overflows u128", balance))
    }

    async fn get_token_holdings(&self, chain: &Chain, address: &str) -> Result<Vec<TokenHolding>> {
        let Some(api) = chain.token_list_api.as_deref() else {
            debug!("No token explorer for {}, skipping tokens", chain.id);
            return Ok(Vec::new());
        };

        let body: ExplorerResponse = self
            .http
            .get(api)
            .query(&[("module", "account"), ("action", "tokenlist"), ("address", address)])
            .timeout(self.explorer_timeout)
            .send()
            .await
            .context("explorer: request failed")?
            .error_for_status()
            .context("explorer: non-success status")?
            .json()
            .await
            .context("explorer: parse JSON failed")?;

        let holdings = parse_token_list(body);
        debug!("Found {} tokens on {}", holdings.len(), chain.id);
        Ok(holdings)
    }
}
