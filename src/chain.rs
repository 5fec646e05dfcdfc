use anyhow::Result;
use async_trait::async_trait;

use crate::registry::Chain;
use crate::types::TokenHolding;

/// Trait for chain providers - implement this for each chain family.
///
/// Implementations are single-attempt and bounded in time; callers that want
/// retries can wrap a provider in their own decorator.
#[async_trait]
pub trait ChainProvider: Send + Sync {
    /// Get the native balance for an address, in the chain's smallest unit
    async fn get_native_balance(&self, chain: &Chain, address: &str) -> Result<u128>;

    /// Get every token position the address holds. Families without tokens keep the default.
    async fn get_token_holdings(&self, _chain: &Chain, _address: &str) -> Result<Vec<TokenHolding>> {
        Ok(Vec::new())
    }
}
