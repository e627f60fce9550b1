//! Bonding curve settlement primitives.
//! Stable, protocol-neutral, behavior-free.

pub mod primitives;

pub use primitives::{Address, Amount, BatchId, Percent, TokenId, UnitIndex, PERCENT_DENOMINATOR};
