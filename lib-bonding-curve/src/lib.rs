//! Bonding Curve Settlement Engine
//!
//! Prices and settles mints and burns of serialized units against a
//! collateral reserve along `price(x) = m · x^(n/d) + v`.
//!
//! # Settlement Flow
//! ```text
//!   request ─▶ PricingEvaluator ─▶ fee split ─▶ collateral / ledger ─▶ commit ─▶ CurveEvent
//!              (quote or staged)                 (collaborator traits)
//! ```
//!
//! # Architecture
//! - `BondingCurve`: settlement orchestrator bound to its collaborators
//! - `CurveState`: reserve, supply, fee configuration, price cache
//! - `PricingEvaluator`: closed-form, iterative and memoized range sums
//! - `CurveMath`, `TokenLedger`, `CollateralTransfer`: collaborator seams
//! - `events`: settlement records and indexers
//! - `config`: TOML construction parameters

pub mod collateral;
pub mod config;
pub mod errors;
pub mod event_indexer;
pub mod events;
pub mod ledger;
pub mod math;
pub mod pricing;
pub mod settlement;
pub mod state;
pub mod types;

// Re-export core types
pub use collateral::{CollateralTransfer, InMemoryCollateral};
pub use config::{ConfigError, CurveConfig, FeeSection};
pub use errors::{CurveError, CurveResult};
pub use event_indexer::SledEventIndexer;
pub use events::{CurveEvent, EventIndexer, InMemoryEventIndexer};
pub use ledger::{InMemoryTokenLedger, TokenLedger};
pub use math::{CurveMath, ExactCurveMath, U256};
pub use pricing::PricingEvaluator;
pub use settlement::{BondingCurve, BurnReceipt, CurveSetup, MintReceipt, MintRequest};
pub use state::{CurveState, PriceCache};
pub use types::{
    Beneficiary, CollateralAsset, CommissionPolicy, CurveParams, CurveStats, FeeConfig, FeeSplit,
    PricingMode, MAX_CLOSED_FORM_EXPONENT,
};
