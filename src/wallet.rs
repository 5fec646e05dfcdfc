use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::aggregator::WalletRef;
use crate::error::PortfolioError;
use crate::registry::{ChainId, ChainRegistry};
use crate::snapshot::PortfolioSnapshot;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Wallet {
    pub id: String,
    pub address: String,
    pub chain: ChainId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub added_at: DateTime<Utc>,
}

impl Wallet {
    pub fn new(address: &str, chain: ChainId, label: Option<String>, added_at: DateTime<Utc>) -> Self {
        let address = address.trim();
        Self {
            id: format!("{}-{}-{}", chain, address, added_at.timestamp_millis()),
            address: address.to_string(),
            chain,
            label,
            added_at,
        }
    }

    pub fn wallet_ref(&self) -> WalletRef {
        WalletRef::new(self.address.clone(), self.chain)
    }
}

/// The user's tracked wallets
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WalletList {
    wallets: Vec<Wallet>,
}

impl WalletList {
    pub fn new(wallets: Vec<Wallet>) -> Self {
        Self { wallets }
    }

    /// Rejects malformed addresses and the same address twice on one chain (case-insensitive).
    pub fn add(&mut self, wallet: Wallet, registry: &ChainRegistry) -> Result<(), PortfolioError> {
        registry.ensure_valid(&wallet.address, wallet.chain)?;
        let exists = self
            .wallets
            .iter()
            .any(|w| w.chain == wallet.chain && w.address.eq_ignore_ascii_case(&wallet.address));
        if exists {
            return Err(PortfolioError::DuplicateWallet {
                address: wallet.address,
                chain: wallet.chain,
            });
        }
        self.wallets.push(wallet);
        Ok(())
    }

    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.wallets.len();
        self.wallets.retain(|w| w.id != id);
        self.wallets.len() != before
    }

    pub fn relabel(&mut self, id: &str, label: &str) -> bool {
        match self.wallets.iter_mut().find(|w| w.id == id) {
            Some(wallet) => {
                wallet.label = Some(label.to_string());
                true
            }
            None => false,
        }
    }

    pub fn wallets(&self) -> &[Wallet] {
        &self.wallets
    }

    pub fn refs(&self) -> Vec<WalletRef> {
        self.wallets.iter().map(Wallet::wallet_ref).collect()
    }
}

/// JSON document for backing up wallets and history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioExport {
    #[serde(default)]
    pub wallets: Vec<Wallet>,
    #[serde(default)]
    pub snapshots: Vec<PortfolioSnapshot>,
    /// Absent in hand-written backups; ignored on import
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub exported_at: Option<DateTime<Utc>>,
}

impl PortfolioExport {
    pub fn new(wallets: &WalletList, snapshots: Vec<PortfolioSnapshot>, exported_at: DateTime<Utc>) -> Self {
        Self {
            wallets: wallets.wallets().to_vec(),
            snapshots,
            exported_at: Some(exported_at),
        }
    }

    pub fn to_json(&self) -> Result<String, PortfolioError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, PortfolioError> {
        Ok(serde_json::from_str(json)?)
    }
}
