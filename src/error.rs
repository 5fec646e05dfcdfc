use thiserror::Error;

use crate::registry::ChainId;

/// Hard failures surfaced to callers. Source outages never appear here;
/// fetchers recover from those locally.
#[derive(Error, Debug)]
pub enum PortfolioError {
    #[error("unknown chain: {0}")]
    UnknownChain(String),
    #[error("invalid {chain} address: {address}")]
    InvalidAddressFormat { address: String, chain: ChainId },
    #[error("wallet {address} on {chain} already exists")]
    DuplicateWallet { address: String, chain: ChainId },
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("invalid portfolio data: {0}")]
    InvalidPortfolioData(#[from] serde_json::Error),
}
