use serde::{Deserialize, Serialize};

use crate::registry::ChainId;

/// Largest power of ten representable in u128
const MAX_EXACT_DECIMALS: u8 = 38;

/// Canonical priced holding. `value` is always `balance * price` at creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    pub symbol: String,
    pub name: String,
    pub balance: f64,
    pub decimals: u8,
    pub price: f64,
    pub value: f64,
    pub chain: ChainId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contract_address: Option<String>,
}

impl Asset {
    pub fn new(
        symbol: &str,
        name: String,
        balance: f64,
        decimals: u8,
        price: f64,
        chain: ChainId,
        contract_address: Option<String>,
    ) -> Self {
        Self {
            symbol: symbol.to_uppercase(),
            name,
            balance,
            decimals,
            price,
            value: balance * price,
            chain,
            contract_address,
        }
    }

    /// Native chain assets carry no contract address.
    pub fn is_native(&self) -> bool {
        self.contract_address.is_none()
    }

    /// Fold another holding of the same asset into this one. Prices are not re-averaged.
    pub fn absorb(&mut self, other: &Asset) {
        self.balance += other.balance;
        self.value += other.value;
    }
}

/// A token position as reported by a chain source, before pricing
#[derive(Debug, Clone, PartialEq)]
pub struct TokenHolding {
    pub contract_address: String,
    pub amount: TokenAmount,
    pub decimals: u8,
    pub symbol: Option<String>,
    pub name: Option<String>,
}

impl TokenHolding {
    pub fn balance(&self) -> f64 {
        self.amount.to_decimal(self.decimals)
    }
}

/// Sources report either the raw integer amount or an already-scaled one.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenAmount {
    /// Smallest-unit integer as a decimal string
    Raw(String),
    /// Human-readable amount, already divided by 10^decimals
    Ui(String),
}

impl TokenAmount {
    pub fn to_decimal(&self, decimals: u8) -> f64 {
        match self {
            TokenAmount::Raw(raw) => match raw.parse::<u128>() {
                Ok(value) if decimals <= MAX_EXACT_DECIMALS => units_to_f64(value, decimals),
                // Spam tokens can report supplies or decimals beyond u128
                _ => raw.parse::<f64>().unwrap_or(0.0) / 10f64.powi(decimals as i32),
            },
            TokenAmount::Ui(ui) => ui.parse::<f64>().unwrap_or(0.0),
        }
    }
}

/// Per-wallet balance response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletBalances {
    pub chain: ChainId,
    pub address: String,
    pub assets: Vec<Asset>,
}

/// Convert a smallest-unit amount into decimal units
pub fn units_to_f64(amount: u128, decimals: u8) -> f64 {
    format_units(amount, decimals).parse().unwrap_or(0.0)
}

/// Format balance with proper decimal places
pub fn format_units(amount: u128, decimals: u8) -> String {
    let Some(divisor) = 10u128.checked_pow(decimals as u32) else {
        // Past u128 range the exact split is impossible
        return (amount as f64 / 10f64.powi(decimals as i32)).to_string();
    };
    let whole = amount / divisor;
    let fractional = amount % divisor;

    if fractional == 0 {
        format!("{}", whole)
    } else {
        let frac_str = format!("{:0width$}", fractional, width = decimals as usize);
        let trimmed = frac_str.trim_end_matches('0');
        format!("{}.{}", whole, trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_units() {
        assert_eq!(format_units(1_500_000_000_000_000_000, 18), "1.5");
        assert_eq!(format_units(100_000_000, 8), "1");
        assert_eq!(format_units(1, 9), "0.000000001");
        assert_eq!(format_units(0, 18), "0");
    }

    #[test]
    fn test_format_units_beyond_u128_decimals() {
        assert_eq!(format_units(0, 39), "0");
        let tiny: f64 = format_units(1, 39).parse().unwrap();
        assert!(tiny > 0.0 && tiny < 1e-38);
        let big: f64 = format_units(5 * 10u128.pow(38), 40).parse().unwrap();
        assert!((big - 0.05).abs() < 1e-12);
        assert!((units_to_f64(5 * 10u128.pow(38), 40) - 0.05).abs() < 1e-12);
    }

    #[test]
    fn test_asset_value_and_symbol() {
        let asset = Asset::new("eth", "Ethereum".into(), 1.5, 18, 2000.0, ChainId::Ethereum, None);
        assert_eq!(asset.symbol, "ETH");
        assert!((asset.value - 3000.0).abs() < 1e-9);
        assert!(asset.is_native());
    }

    #[test]
    fn test_absorb_sums_balance_and_value() {
        let mut a = Asset::new("USDC", "USD Coin".into(), 10.0, 6, 1.0, ChainId::Base, Some("0xa".into()));
        let b = Asset::new("USDC", "USD Coin".into(), 5.0, 6, 1.0, ChainId::Base, Some("0xa".into()));
        a.absorb(&b);
        assert_eq!(a.balance, 15.0);
        assert_eq!(a.value, 15.0);
        assert_eq!(a.price, 1.0);
    }

    #[test]
    fn test_token_amounts() {
        assert_eq!(TokenAmount::Raw("2500000".into()).to_decimal(6), 2.5);
        assert_eq!(TokenAmount::Ui("12.75".into()).to_decimal(6), 12.75);
        assert_eq!(TokenAmount::Raw("garbage".into()).to_decimal(18), 0.0);
        let huge = TokenAmount::Raw("1".repeat(45)).to_decimal(18);
        assert!(huge > 1e26);
    }

    #[test]
    fn test_asset_json_shape() {
        let asset = Asset::new("sol", "Solana".into(), 2.0, 9, 100.0, ChainId::Solana, None);
        let json = serde_json::to_value(&asset).unwrap();
        assert_eq!(json["chain"], "solana");
        assert_eq!(json["value"], 200.0);
        assert!(json.get("contractAddress").is_none());
    }
}
