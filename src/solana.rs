use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use solana_account_decoder::UiAccountData;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_request::TokenAccountsFilter;
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;
use tracing::debug;

use crate::chain::ChainProvider;
use crate::registry::Chain;
use crate::types::{TokenAmount, TokenHolding};

/// `info` object of a jsonParsed SPL token account
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ParsedTokenAccount {
    mint: String,
    token_amount: ParsedTokenAmount,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ParsedTokenAmount {
    amount: String,
    decimals: u8,
    ui_amount_string: Option<String>,
}

fn holding_from_parsed(parsed: &serde_json::Value) -> Option<TokenHolding> {
    let info = parsed.get("info")?;
    let account: ParsedTokenAccount = match serde_json::from_value(info.clone()) {
        Ok(account) => account,
        Err(e) => {
            debug!("Error processing SPL token account: {}", e);
            return None;
        }
    };
    let amount = match account.token_amount.ui_amount_string {
        Some(ui) => TokenAmount::Ui(ui),
        None => TokenAmount::Raw(account.token_amount.amount),
    };

    Some(TokenHolding {
        contract_address: account.mint,
        amount,
        decimals: account.token_amount.decimals,
        symbol: None,
        name: None,
    })
}

/// Solana chain provider using JSON-RPC
pub struct SolanaProvider;

impl SolanaProvider {
    fn client(chain: &Chain) -> Result<RpcClient> {
        let rpc_url = chain
            .rpc_url
            .clone()
            .ok_or_else(|| anyhow::anyhow!("no RPC endpoint configured for {}", chain.id))?;
        Ok(RpcClient::new(rpc_url))
    }
}

#[async_trait]
impl ChainProvider for SolanaProvider {
    async fn get_native_balance(&self, chain: &Chain, address: &str) -> Result<u128> {
        let pubkey = Pubkey::from_str(address)?;
        let lamports = Self::client(chain)?.get_balance(&pubkey).await?;
        Ok(lamports as u128)
    }

    async fn get_token_holdings(&self, chain: &Chain, address: &str) -> Result<Vec<TokenHolding>> {
        let owner = Pubkey::from_str(address)?;
        let filter = TokenAccountsFilter::ProgramId(spl_token::id());
        let accounts = Self::client(chain)?
            .get_token_accounts_by_owner(&owner, filter)
            .await?;
        debug!("Found {} SPL token accounts for {}", accounts.len(), address);

        Ok(accounts
            .iter()
            .filter_map(|keyed| match &keyed.account.data {
                UiAccountData::Json(parsed) => holding_from_parsed(&parsed.parsed),
                _ => None,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::registry::{ChainId, ChainRegistry};
    use serde_json::json;

    #[test]
    fn test_parsed_token_account() {
        let parsed = json!({
            "info": {
                "isNative": false,
                "mint": "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v",
                "owner": "8vJ1EEeJBSX8UZetuHY7d2SiGjdw2AhfamzfxokPsCF4",
                "state": "initialized",
                "tokenAmount": {
                    "amount": "12500000",
                    "decimals": 6,
                    "uiAmount": 12.5,
                    "uiAmountString": "12.5"
                }
            },
            "type": "account"
        });
        let holding = holding_from_parsed(&parsed).unwrap();
        assert_eq!(holding.contract_address, "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v");
        assert_eq!(holding.amount, TokenAmount::Ui("12.5".into()));
        assert_eq!(holding.balance(), 12.5);
        assert_eq!(holding.decimals, 6);
    }

    #[test]
    fn test_missing_ui_string_uses_raw_amount() {
        let parsed = json!({"info": {"mint": "m", "tokenAmount": {"amount": "3000", "decimals": 3}}});
        assert_eq!(holding_from_parsed(&parsed).unwrap().balance(), 3.0);
    }

    #[test]
    fn test_malformed_account_skipped() {
        assert!(holding_from_parsed(&json!({"type": "mint"})).is_none());
        assert!(holding_from_parsed(&json!({"info": {"mint": 7}})).is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    #[ignore] // Requires network access
    async fn test_solana_native_balance() {
        let registry = ChainRegistry::from_config(&Config::load().unwrap()).unwrap();
        let result = SolanaProvider
            .get_native_balance(
                registry.resolve(ChainId::Solana).unwrap(),
                "8vJ1EEeJBSX8UZetuHY7d2SiGjdw2AhfamzfxokPsCF4",
            )
            .await;
        assert!(result.is_ok());
    }
}
