//! Curve Configuration
//!
//! TOML construction surface for a curve:
//!
//! ```toml
//! name = "Genesis Editions"
//! symbol = "GEN"
//! metadata_base_uri = "https://meta.example/gen/"
//! collateral = "native"            # or "token:<64 hex chars>"
//! initial_mint_price = 1000        # amounts above i64 go in quotes
//! slope = "10"
//! exponent_numerator = 3
//! exponent_denominator = 2
//! commission_policy = "deferred"   # default "immediate"
//!
//! [fees]                            # optional, applied once at construction
//! platform_account = "<64 hex chars>"
//! platform_rate = 5
//! creator_account = "<64 hex chars>"
//! creator_rate = 10
//! ```

use std::path::Path;

use lib_types::{Address, Amount, Percent, TokenId};
use serde::{Deserialize, Serialize};

use crate::errors::CurveError;
use crate::types::{CollateralAsset, CommissionPolicy, CurveParams, FeeConfig};

/// Configuration loading error
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("File system error: {0}")]
    FileSystem(#[from] std::io::Error),

    #[error("Configuration parsing error: {0}")]
    Parsing(#[from] toml::de::Error),

    #[error("Invalid collateral selector: {value}")]
    InvalidCollateral { value: String },

    #[error("Invalid account for {field}: {value}")]
    InvalidAccount { field: &'static str, value: String },

    #[error("Invalid curve configuration: {0}")]
    InvalidCurve(#[from] CurveError),
}

/// Curve construction parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurveConfig {
    pub name: String,
    pub symbol: String,
    #[serde(default)]
    pub metadata_base_uri: String,
    /// `native` or `token:<hex token id>`
    pub collateral: String,
    #[serde(with = "amount_repr")]
    pub initial_mint_price: Amount,
    #[serde(with = "amount_repr")]
    pub slope: Amount,
    pub exponent_numerator: u32,
    #[serde(default = "default_exponent_denominator")]
    pub exponent_denominator: u32,
    #[serde(default)]
    pub commission_policy: CommissionPolicy,
    #[serde(default)]
    pub fees: Option<FeeSection>,
}

/// Optional one-time fee setup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSection {
    pub platform_account: String,
    pub platform_rate: Percent,
    pub creator_account: String,
    pub creator_rate: Percent,
}

fn default_exponent_denominator() -> u32 {
    1
}

/// TOML integers stop at i64, so wider amounts are written as decimal strings
mod amount_repr {
    use lib_types::Amount;
    use serde::{de, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Amount, serializer: S) -> Result<S::Ok, S::Error> {
        match i64::try_from(*value) {
            Ok(v) => serializer.serialize_i64(v),
            Err(_) => serializer.serialize_str(&value.to_string()),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Amount, D::Error> {
        deserializer.deserialize_any(AmountVisitor)
    }

    struct AmountVisitor;

    impl<'de> de::Visitor<'de> for AmountVisitor {
        type Value = Amount;

        fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str("a non-negative integer or a decimal string")
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<Amount, E> {
            Amount::try_from(v).map_err(|_| E::invalid_value(de::Unexpected::Signed(v), &self))
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<Amount, E> {
            Ok(v as Amount)
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Amount, E> {
            v.trim()
                .replace('_', "")
                .parse()
                .map_err(|_| E::invalid_value(de::Unexpected::Str(v), &self))
        }
    }
}

impl CurveConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: CurveConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config = Self::from_toml_str(&content)?;
        tracing::info!(
            "Loaded curve configuration {} ({}) from {}",
            config.name,
            config.symbol,
            path.as_ref().display()
        );
        Ok(config)
    }

    /// Check every field that construction would reject
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.collateral_asset()?;
        self.curve_params()?;
        self.fee_config()?;
        Ok(())
    }

    pub fn collateral_asset(&self) -> Result<CollateralAsset, ConfigError> {
        let value = self.collateral.trim();
        if value.eq_ignore_ascii_case("native") {
            return Ok(CollateralAsset::Native);
        }
        value
            .strip_prefix("token:")
            .and_then(|hex| TokenId::from_hex(hex).ok())
            .map(CollateralAsset::Token)
            .ok_or_else(|| ConfigError::InvalidCollateral {
                value: self.collateral.clone(),
            })
    }

    pub fn curve_params(&self) -> Result<CurveParams, ConfigError> {
        Ok(CurveParams::new(
            self.initial_mint_price,
            self.slope,
            self.exponent_numerator,
            self.exponent_denominator,
        )?)
    }

    /// Fee setup from the `[fees]` section, if present
    pub fn fee_config(&self) -> Result<Option<FeeConfig>, ConfigError> {
        let Some(fees) = &self.fees else {
            return Ok(None);
        };
        let platform = parse_account("platform_account", &fees.platform_account)?;
        let creator = parse_account("creator_account", &fees.creator_account)?;
        Ok(Some(FeeConfig::new(
            platform,
            fees.platform_rate,
            creator,
            fees.creator_rate,
        )?))
    }
}

fn parse_account(field: &'static str, value: &str) -> Result<Address, ConfigError> {
    Address::from_hex(value.trim()).map_err(|_| ConfigError::InvalidAccount {
        field,
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PricingMode;
    use std::io::Write;

    const PLATFORM: &str = "0101010101010101010101010101010101010101010101010101010101010101";
    const CREATOR: &str = "0202020202020202020202020202020202020202020202020202020202020202";

    fn full_config() -> String {
        format!(
            r#"
name = "Genesis Editions"
symbol = "GEN"
metadata_base_uri = "https://meta.example/gen/"
collateral = "native"
initial_mint_price = 1000
slope = 10
exponent_numerator = 3
exponent_denominator = 2
commission_policy = "deferred"

[fees]
platform_account = "{}"
platform_rate = 5
creator_account = "0x{}"
creator_rate = 10
"#,
            PLATFORM, CREATOR
        )
    }

    #[test]
    fn test_parse_full_config() {
        let config = CurveConfig::from_toml_str(&full_config()).unwrap();
        assert_eq!(config.name, "Genesis Editions");
        assert_eq!(config.commission_policy, CommissionPolicy::Deferred);
        assert_eq!(config.collateral_asset().unwrap(), CollateralAsset::Native);

        let params = config.curve_params().unwrap();
        assert_eq!(params.virtual_balance, 990);
        assert_eq!(
            params.mode,
            PricingMode::Fractional {
                numerator: 3,
                denominator: 2
            }
        );

        let fees = config.fee_config().unwrap().unwrap();
        assert_eq!(fees.platform_account, Some(Address::new([1u8; 32])));
        assert_eq!(fees.creator_account, Some(Address::new([2u8; 32])));
        assert_eq!(fees.total_rate(), 15);
    }

    #[test]
    fn test_defaults() {
        let config = CurveConfig::from_toml_str(
            r#"
name = "Squares"
symbol = "SQ"
collateral = "token:0707070707070707070707070707070707070707070707070707070707070707"
initial_mint_price = 1
slope = 1
exponent_numerator = 2
"#,
        )
        .unwrap();

        assert_eq!(config.exponent_denominator, 1);
        assert_eq!(config.commission_policy, CommissionPolicy::Immediate);
        assert_eq!(config.metadata_base_uri, "");
        assert!(config.fee_config().unwrap().is_none());
        assert_eq!(
            config.collateral_asset().unwrap(),
            CollateralAsset::Token(TokenId::new([7u8; 32]))
        );
    }

    #[test]
    fn test_invalid_values_rejected() {
        let bad_collateral = full_config().replace("\"native\"", "\"gold\"");
        assert!(matches!(
            CurveConfig::from_toml_str(&bad_collateral),
            Err(ConfigError::InvalidCollateral { .. })
        ));

        let bad_account = full_config().replace(PLATFORM, "xyz");
        assert!(matches!(
            CurveConfig::from_toml_str(&bad_account),
            Err(ConfigError::InvalidAccount {
                field: "platform_account",
                ..
            })
        ));

        let zero_denominator = full_config().replace("exponent_denominator = 2", "exponent_denominator = 0");
        assert!(matches!(
            CurveConfig::from_toml_str(&zero_denominator),
            Err(ConfigError::InvalidCurve(CurveError::InvalidParameters(_)))
        ));

        let high_rates = full_config().replace("creator_rate = 10", "creator_rate = 96");
        assert!(matches!(
            CurveConfig::from_toml_str(&high_rates),
            Err(ConfigError::InvalidCurve(_))
        ));

        assert!(matches!(
            CurveConfig::from_toml_str("name = "),
            Err(ConfigError::Parsing(_))
        ));
    }

    #[test]
    fn test_wide_amounts_as_strings() {
        let config = CurveConfig::from_toml_str(
            r#"
name = "Wide"
symbol = "WIDE"
collateral = "native"
initial_mint_price = "36893488147419103232"
slope = "18_446_744_073_709_551_616"
exponent_numerator = 1
"#,
        )
        .unwrap();
        assert_eq!(config.initial_mint_price, 2 * (u64::MAX as u128 + 1));
        assert_eq!(config.slope, u64::MAX as u128 + 1);
        assert_eq!(config.curve_params().unwrap().virtual_balance, u64::MAX as u128 + 1);

        let written = toml::to_string(&config).unwrap();
        assert!(written.contains("slope = \"18446744073709551616\""));
        assert_eq!(CurveConfig::from_toml_str(&written).unwrap(), config);

        let negative = full_config().replace("slope = 10", "slope = -10");
        assert!(matches!(
            CurveConfig::from_toml_str(&negative),
            Err(ConfigError::Parsing(_))
        ));
        let garbage = full_config().replace("slope = 10", "slope = \"ten\"");
        assert!(matches!(
            CurveConfig::from_toml_str(&garbage),
            Err(ConfigError::Parsing(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(full_config().as_bytes()).unwrap();

        let config = CurveConfig::load(file.path()).unwrap();
        assert_eq!(config.symbol, "GEN");

        let missing = CurveConfig::load(file.path().with_extension("missing"));
        assert!(matches!(missing, Err(ConfigError::FileSystem(_))));
    }
}
