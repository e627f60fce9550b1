//! Curve Settlement Errors

use lib_types::{Amount, BatchId};
use thiserror::Error;

use crate::types::CollateralAsset;

/// Error during pricing or settlement.
///
/// Every variant aborts the current settlement without mutating curve state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CurveError {
    #[error("Fee configuration has already been set")]
    ConfigurationAlreadySet,

    #[error("Fee configuration has not been set")]
    FeesNotConfigured,

    #[error("Slippage exceeded: first unit costs {price}, ceiling is {ceiling}")]
    SlippageExceeded { price: Amount, ceiling: Amount },

    #[error("Insufficient payment: required {required}, provided {provided}")]
    InsufficientPayment { required: Amount, provided: Amount },

    #[error("Arithmetic fault: {0}")]
    ArithmeticFault(&'static str),

    #[error("Reserve underflow: reserve {reserve}, requested {requested}")]
    ReserveUnderflow { reserve: Amount, requested: Amount },

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Insufficient balance of batch {batch_id}: have {have}, need {need}")]
    InsufficientBalance { batch_id: BatchId, have: u64, need: u64 },

    #[error("Unknown batch: {0}")]
    UnknownBatch(BatchId),

    #[error("Asset mismatch: curve settles in {expected}, call used {actual}")]
    AssetMismatch {
        expected: CollateralAsset,
        actual: CollateralAsset,
    },

    #[error("Invalid quantity: {0}")]
    InvalidQuantity(String),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Collateral transfer failed: {0}")]
    TransferFailed(String),

    #[error("Invariant violated: {0}")]
    InvariantViolated(String),
}

/// Result type for curve operations
pub type CurveResult<T> = Result<T, CurveError>;
