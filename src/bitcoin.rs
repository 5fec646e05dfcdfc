use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;

use crate::chain::ChainProvider;
use crate::registry::Chain;

/// Bitcoin provider backed by blockchain.info's plain-text balance query
pub struct BitcoinProvider {
    http: Client,
    timeout: Duration,
}

impl BitcoinProvider {
    pub fn new(timeout: Duration) -> Self {
        Self {
            http: Client::new(),
            timeout,
        }
    }
}

fn parse_satoshis(body: &str) -> Result<u128> {
    body.trim()
        .parse::<u128>()
        .with_context(|| format!("unexpected balance body: {:?}", body))
}

#[async_trait]
impl ChainProvider for BitcoinProvider {
    async fn get_native_balance(&self, chain: &Chain, address: &str) -> Result<u128> {
        let url = format!(
            "{}/q/addressbalance/{}",
            chain.explorer_url.trim_end_matches('/'),
            address
        );
        let body = self
            .http
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await
            .context("bitcoin: request failed")?
            .error_for_status()
            .context("bitcoin: non-success status")?
            .text()
            .await
            .context("bitcoin: read body failed")?;

        parse_satoshis(&body)
    }
}
