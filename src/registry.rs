use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use crate::config::Config;
use crate::error::PortfolioError;

static EVM_ADDRESS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^0x[a-fA-F0-9]{40}$").expect("Invalid regex"));
static BITCOIN_LEGACY_ADDRESS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[13][a-km-zA-HJ-NP-Z1-9]{25,34}$").expect("Invalid regex"));
static BITCOIN_BECH32_ADDRESS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^bc1[a-z0-9]{39,59}$").expect("Invalid regex"));
static SOLANA_ADDRESS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[1-9A-HJ-NP-Za-km-z]{32,44}$").expect("Invalid regex"));

/// Supported networks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainId {
    Ethereum,
    Bitcoin,
    Solana,
    Polygon,
    Bsc,
    Arbitrum,
    Optimism,
    Avalanche,
    Base,
}

impl ChainId {
    pub const ALL: [ChainId; 9] = [
        ChainId::Ethereum,
        ChainId::Bitcoin,
        ChainId::Solana,
        ChainId::Polygon,
        ChainId::Bsc,
        ChainId::Arbitrum,
        ChainId::Optimism,
        ChainId::Avalanche,
        ChainId::Base,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChainId::Ethereum => "ethereum",
            ChainId::Bitcoin => "bitcoin",
            ChainId::Solana => "solana",
            ChainId::Polygon => "polygon",
            ChainId::Bsc => "bsc",
            ChainId::Arbitrum => "arbitrum",
            ChainId::Optimism => "optimism",
            ChainId::Avalanche => "avalanche",
            ChainId::Base => "base",
        }
    }

    pub fn family(&self) -> ChainFamily {
        match self {
            ChainId::Bitcoin => ChainFamily::Bitcoin,
            ChainId::Solana => ChainFamily::Solana,
            _ => ChainFamily::Evm,
        }
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChainId {
    type Err = PortfolioError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        ChainId::ALL
            .into_iter()
            .find(|id| id.as_str() == wanted)
            .ok_or_else(|| PortfolioError::UnknownChain(s.to_string()))
    }
}

/// Chain families share address formats and fetch strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainFamily {
    Evm,
    Bitcoin,
    Solana,
}

impl ChainFamily {
    /// Structural check only; no checksum validation.
    pub fn validate_address(&self, address: &str) -> bool {
        match self {
            ChainFamily::Evm => EVM_ADDRESS.is_match(address),
            ChainFamily::Bitcoin => {
                BITCOIN_LEGACY_ADDRESS.is_match(address) || BITCOIN_BECH32_ADDRESS.is_match(address)
            }
            ChainFamily::Solana => SOLANA_ADDRESS.is_match(address),
        }
    }
}

/// Static network metadata, built once at startup
#[derive(Debug, Clone)]
pub struct Chain {
    pub id: ChainId,
    pub name: String,
    pub native_symbol: String,
    pub native_decimals: u8,
    pub rpc_url: Option<String>,
    pub explorer_url: String,
    pub token_list_api: Option<String>,
    pub dex_chain: Option<String>,
}

impl Chain {
    pub fn family(&self) -> ChainFamily {
        self.id.family()
    }
}

/// Read-only lookup of every configured chain
#[derive(Debug, Clone)]
pub struct ChainRegistry {
    chains: HashMap<ChainId, Chain>,
}

impl ChainRegistry {
    pub fn from_config(config: &Config) -> Result<Self, PortfolioError> {
        let mut chains = HashMap::with_capacity(config.chains.len());
        for (key, chain_config) in &config.chains {
            let id: ChainId = key.parse()?;
            if chain_config.chain_type != id.family() {
                return Err(PortfolioError::Config(format!(
                    "chain '{}' declared as {:?}, expected {:?}",
                    key,
                    chain_config.chain_type,
                    id.family()
                )));
            }
            chains.insert(
                id,
                Chain {
                    id,
                    name: chain_config.name.clone(),
                    native_symbol: chain_config.native_token.symbol.to_uppercase(),
                    native_decimals: chain_config.native_token.decimals,
                    rpc_url: chain_config.rpc.clone(),
                    explorer_url: chain_config.explorer.clone(),
                    token_list_api: chain_config.token_list_api.clone(),
                    dex_chain: chain_config.dex_chain.clone(),
                },
            );
        }
        Ok(Self { chains })
    }

    pub fn resolve(&self, id: ChainId) -> Result<&Chain, PortfolioError> {
        self.chains
            .get(&id)
            .ok_or_else(|| PortfolioError::UnknownChain(id.to_string()))
    }

    pub fn validate_address(&self, address: &str, id: ChainId) -> bool {
        id.family().validate_address(address)
    }

    /// Resolve the chain and reject malformed addresses before any network call.
    pub fn ensure_valid(&self, address: &str, id: ChainId) -> Result<&Chain, PortfolioError> {
        let chain = self.resolve(id)?;
        if !self.validate_address(address, id) {
            return Err(PortfolioError::InvalidAddressFormat {
                address: address.to_string(),
                chain: id,
            });
        }
        Ok(chain)
    }

    pub fn chains(&self) -> impl Iterator<Item = &Chain> {
        self.chains.values()
    }
}
