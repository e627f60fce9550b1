//! Curve State
//!
//! The single state block shared by the pricing evaluator and the settlement
//! orchestrator. Reads are public; every write goes through a [`Transition`]
//! computed in full before any of it is applied.
//!
//! # Invariants
//! - `reserve` never exceeds the collateral held in custody
//! - `total_supply` tracks the live units held by the token ledger
//! - A price cache entry, once written, never changes
//! - Fee configuration is written at most once
//! - Event sequence numbers only grow, and survive a snapshot

use std::collections::BTreeMap;

use lib_types::{Amount, UnitIndex};
use serde::{Deserialize, Serialize};

use crate::errors::{CurveError, CurveResult};
use crate::types::{Beneficiary, CollateralAsset, CommissionPolicy, CurveParams, FeeConfig};

/// Memoized per-unit prices keyed by absolute unit index
pub type PriceCache = BTreeMap<UnitIndex, Amount>;

/// Mutable curve state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurveState {
    params: CurveParams,
    collateral: CollateralAsset,
    commission_policy: CommissionPolicy,
    fees: FeeConfig,
    total_supply: u64,
    reserve: Amount,
    accrued_platform: Amount,
    accrued_creator: Amount,
    price_cache: PriceCache,
    last_sequence: u64,
}

/// Fully computed post-settlement values, applied atomically by [`CurveState::commit`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transition {
    pub total_supply: u64,
    pub reserve: Amount,
    pub accrued_platform: Amount,
    pub accrued_creator: Amount,
    pub cache_fills: PriceCache,
}

impl CurveState {
    /// Fresh state at zero supply
    pub fn new(
        params: CurveParams,
        collateral: CollateralAsset,
        commission_policy: CommissionPolicy,
    ) -> Self {
        Self {
            params,
            collateral,
            commission_policy,
            fees: FeeConfig::default(),
            total_supply: 0,
            reserve: 0,
            accrued_platform: 0,
            accrued_creator: 0,
            price_cache: PriceCache::new(),
            last_sequence: 0,
        }
    }

    /// Live units; the curve's x-axis position
    pub fn current_supply(&self) -> u64 {
        self.total_supply
    }

    /// Memoized price of a unit, if one has been settled
    pub fn cached_price(&self, index: UnitIndex) -> Option<Amount> {
        self.price_cache.get(&index).copied()
    }

    pub fn cached_prices(&self) -> usize {
        self.price_cache.len()
    }

    pub fn params(&self) -> &CurveParams {
        &self.params
    }

    pub fn collateral(&self) -> CollateralAsset {
        self.collateral
    }

    pub fn commission_policy(&self) -> CommissionPolicy {
        self.commission_policy
    }

    pub fn fees(&self) -> &FeeConfig {
        &self.fees
    }

    pub fn reserve(&self) -> Amount {
        self.reserve
    }

    pub fn accrued(&self, beneficiary: Beneficiary) -> Amount {
        match beneficiary {
            Beneficiary::Platform => self.accrued_platform,
            Beneficiary::Creator => self.accrued_creator,
        }
    }

    /// Sequence number of the last emitted event, 0 before the first
    pub fn last_sequence(&self) -> u64 {
        self.last_sequence
    }

    /// Collateral the curve owes: reserve plus unclaimed commission
    pub fn obligations(&self) -> CurveResult<Amount> {
        self.reserve
            .checked_add(self.accrued_platform)
            .and_then(|v| v.checked_add(self.accrued_creator))
            .ok_or(CurveError::ArithmeticFault("obligations overflow"))
    }

    /// Start a transition from the current values
    pub(crate) fn transition(&self) -> Transition {
        Transition {
            total_supply: self.total_supply,
            reserve: self.reserve,
            accrued_platform: self.accrued_platform,
            accrued_creator: self.accrued_creator,
            cache_fills: PriceCache::new(),
        }
    }

    /// Apply a transition. Cache fills never overwrite existing entries.
    pub(crate) fn commit(&mut self, transition: Transition) {
        self.total_supply = transition.total_supply;
        self.reserve = transition.reserve;
        self.accrued_platform = transition.accrued_platform;
        self.accrued_creator = transition.accrued_creator;
        for (index, price) in transition.cache_fills {
            let existing = *self.price_cache.entry(index).or_insert(price);
            debug_assert_eq!(existing, price, "cache entry {} changed", index);
        }
    }

    pub(crate) fn next_sequence(&mut self) -> u64 {
        self.last_sequence += 1;
        self.last_sequence
    }

    /// One-time fee setup
    pub(crate) fn configure_fees(&mut self, fees: FeeConfig) -> CurveResult<()> {
        if self.fees.is_configured() {
            return Err(CurveError::ConfigurationAlreadySet);
        }
        self.fees = fees;
        Ok(())
    }

    /// Serialize the full state, cache included
    pub fn to_snapshot_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    /// Restore a state written by [`CurveState::to_snapshot_bytes`]
    pub fn from_snapshot_bytes(bytes: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(bytes)
    }
}
