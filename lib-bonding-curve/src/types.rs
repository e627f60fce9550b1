//! Bonding Curve Types
//!
//! Curve parameters, pricing modes, collateral selection and fee configuration.
//!
//! # Price Curve
//! ```text
//!   price(x) = m · x^(n/d) + v        x = absolute unit index (1-based)
//!   v        = initial_mint_price - m so that price(1) = initial_mint_price
//! ```
//!
//! The pricing mode is fixed at construction: an integral `n/d` prices with
//! integer powers, anything else goes through the rational `pow` collaborator.

use lib_types::{Address, Amount, Percent, TokenId, PERCENT_DENOMINATOR};
use serde::{Deserialize, Serialize};

use crate::errors::{CurveError, CurveResult};

/// Integer exponents up to this bound are summed in closed form
pub const MAX_CLOSED_FORM_EXPONENT: u32 = 10;

/// How per-unit prices are evaluated for the life of the curve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PricingMode {
    /// `n/d` divides evenly: price = m · i^exponent + v
    Integer { exponent: u32 },
    /// `n/d` is not integral: price = v + m · pow(i, n/d)
    Fractional { numerator: u32, denominator: u32 },
}

impl PricingMode {
    /// Integer exponent, or 0 for fractional curves
    pub fn integer_exponent(&self) -> u32 {
        match *self {
            PricingMode::Integer { exponent } => exponent,
            PricingMode::Fractional { .. } => 0,
        }
    }

    /// Whether range sums can use the power-sum identity
    pub fn uses_closed_form(&self) -> bool {
        matches!(*self, PricingMode::Integer { exponent } if exponent <= MAX_CLOSED_FORM_EXPONENT)
    }

    /// Whether per-unit prices are memoized
    pub fn is_fractional(&self) -> bool {
        matches!(self, PricingMode::Fractional { .. })
    }

    pub fn name(&self) -> &'static str {
        match self {
            PricingMode::Integer { .. } if self.uses_closed_form() => "integer_closed_form",
            PricingMode::Integer { .. } => "integer_iterative",
            PricingMode::Fractional { .. } => "fractional",
        }
    }
}

impl std::fmt::Display for PricingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PricingMode::Integer { exponent } => write!(f, "x^{}", exponent),
            PricingMode::Fractional {
                numerator,
                denominator,
            } => write!(f, "x^({}/{})", numerator, denominator),
        }
    }
}

/// Immutable curve parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurveParams {
    /// Slope `m`
    pub slope: Amount,
    /// Exponent numerator `n`
    pub exponent_numerator: u32,
    /// Exponent denominator `d` (never zero)
    pub exponent_denominator: u32,
    /// Virtual balance `v`
    pub virtual_balance: Amount,
    /// Active pricing mode
    pub mode: PricingMode,
}

impl CurveParams {
    /// Derive parameters from the configured first-unit price
    ///
    /// # Arguments
    /// * `initial_mint_price` - Price of unit 1, must be at least `slope`
    /// * `slope` - Curve slope `m`
    /// * `exponent_numerator` - `n`
    /// * `exponent_denominator` - `d`, non-zero
    pub fn new(
        initial_mint_price: Amount,
        slope: Amount,
        exponent_numerator: u32,
        exponent_denominator: u32,
    ) -> CurveResult<Self> {
        if exponent_denominator == 0 {
            return Err(CurveError::InvalidParameters(
                "Exponent denominator cannot be zero".to_string(),
            ));
        }
        let virtual_balance = initial_mint_price.checked_sub(slope).ok_or_else(|| {
            CurveError::InvalidParameters(format!(
                "Initial mint price {} is below slope {}",
                initial_mint_price, slope
            ))
        })?;

        let mode = if exponent_numerator % exponent_denominator == 0
            && exponent_numerator / exponent_denominator > 0
        {
            PricingMode::Integer {
                exponent: exponent_numerator / exponent_denominator,
            }
        } else {
            PricingMode::Fractional {
                numerator: exponent_numerator,
                denominator: exponent_denominator,
            }
        };

        Ok(Self {
            slope,
            exponent_numerator,
            exponent_denominator,
            virtual_balance,
            mode,
        })
    }

    /// Integer exponent, or 0 in fractional mode
    pub fn integer_exponent(&self) -> u32 {
        self.mode.integer_exponent()
    }

    /// Price of unit 1
    pub fn initial_mint_price(&self) -> Amount {
        // v = initial - m was checked at construction
        self.virtual_balance.saturating_add(self.slope)
    }
}

/// Collateral the curve settles in, fixed at construction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CollateralAsset {
    /// Native currency: attached payment with refund of the excess
    Native,
    /// Fungible token: pulled through an allowance
    Token(TokenId),
}

impl CollateralAsset {
    pub fn is_native(&self) -> bool {
        matches!(self, CollateralAsset::Native)
    }
}

impl std::fmt::Display for CollateralAsset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CollateralAsset::Native => write!(f, "native"),
            CollateralAsset::Token(id) => write!(f, "token:{}", id),
        }
    }
}

/// Disposition of commission cuts at settlement time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommissionPolicy {
    /// Forward both cuts out of custody inside the mint
    #[default]
    Immediate,
    /// Accrue both cuts; beneficiaries claim later
    Deferred,
}

impl std::fmt::Display for CommissionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommissionPolicy::Immediate => write!(f, "immediate"),
            CommissionPolicy::Deferred => write!(f, "deferred"),
        }
    }
}

/// Commission recipient
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Beneficiary {
    Platform,
    Creator,
}

impl std::fmt::Display for Beneficiary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Beneficiary::Platform => write!(f, "platform"),
            Beneficiary::Creator => write!(f, "creator"),
        }
    }
}

/// One-time commission configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeConfig {
    pub platform_account: Option<Address>,
    pub platform_rate: Percent,
    pub creator_account: Option<Address>,
    pub creator_rate: Percent,
}

impl FeeConfig {
    /// Validate a new configuration
    pub fn new(
        platform_account: Address,
        platform_rate: Percent,
        creator_account: Address,
        creator_rate: Percent,
    ) -> CurveResult<Self> {
        let config = Self {
            platform_account: Some(platform_account),
            platform_rate,
            creator_account: Some(creator_account),
            creator_rate,
        };
        if config.total_rate() > PERCENT_DENOMINATOR {
            return Err(CurveError::InvalidParameters(format!(
                "Commission rates sum to {}%, max 100%",
                config.total_rate()
            )));
        }
        Ok(config)
    }

    /// True once either beneficiary account has been set
    pub fn is_configured(&self) -> bool {
        self.platform_account.is_some() || self.creator_account.is_some()
    }

    /// Account registered for a beneficiary
    pub fn account(&self, beneficiary: Beneficiary) -> Option<Address> {
        match beneficiary {
            Beneficiary::Platform => self.platform_account,
            Beneficiary::Creator => self.creator_account,
        }
    }

    /// Combined commission percentage
    pub fn total_rate(&self) -> Amount {
        self.platform_rate as Amount + self.creator_rate as Amount
    }

    /// Split a settlement value into platform, creator and reserve parts
    pub fn split(&self, total: Amount) -> CurveResult<FeeSplit> {
        let platform_cut = percent_of(total, self.platform_rate)?;
        let creator_cut = percent_of(total, self.creator_rate)?;
        let reserve_cut = total
            .checked_sub(platform_cut)
            .and_then(|v| v.checked_sub(creator_cut))
            .ok_or(CurveError::ArithmeticFault("fee split underflow"))?;

        Ok(FeeSplit {
            platform_cut,
            creator_cut,
            reserve_cut,
        })
    }

    /// Curve value net of the commission an equivalent mint would take
    pub fn net_of_commission(&self, gross: Amount) -> CurveResult<Amount> {
        let net_rate = PERCENT_DENOMINATOR
            .checked_sub(self.total_rate())
            .ok_or(CurveError::ArithmeticFault("commission rate above 100%"))?;
        gross
            .checked_mul(net_rate)
            .map(|v| v / PERCENT_DENOMINATOR)
            .ok_or(CurveError::ArithmeticFault("burn return overflow"))
    }
}

fn percent_of(amount: Amount, rate: Percent) -> CurveResult<Amount> {
    amount
        .checked_mul(rate as Amount)
        .map(|v| v / PERCENT_DENOMINATOR)
        .ok_or(CurveError::ArithmeticFault("commission overflow"))
}

/// Result of splitting a mint cost
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSplit {
    pub platform_cut: Amount,
    pub creator_cut: Amount,
    pub reserve_cut: Amount,
}

/// Point-in-time view of a curve
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurveStats {
    /// Live units
    pub total_supply: u64,
    /// Collateral owed to future burners
    pub reserve: Amount,
    /// Collateral held by the curve's custody account
    pub custodied: Amount,
    /// Quote for the next unit
    pub next_unit_price: Amount,
    /// Unclaimed platform commission
    pub accrued_platform: Amount,
    /// Unclaimed creator commission
    pub accrued_creator: Amount,
    /// Number of memoized unit prices
    pub cached_prices: usize,
}
