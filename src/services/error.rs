//! Errors returned by economy operations.

use uuid::Uuid;

use crate::model::{CycleStatus, Currency, UnknownCurrency};
use crate::storage::StorageError;

/// Result type for economy operations.
pub type Result<T> = std::result::Result<T, EconomyError>;

#[derive(Debug, thiserror::Error)]
pub enum EconomyError {
    #[error("Amount must be positive, got {0}")]
    NonPositiveAmount(i64),

    #[error(transparent)]
    UnknownCurrency(#[from] UnknownCurrency),

    #[error("Conversion from {from} to {to} is not supported")]
    UnsupportedConversion { from: Currency, to: Currency },

    #[error("Ticket multiplier must be a positive finite number, got {0}")]
    InvalidMultiplier(f64),

    #[error("Adding {amount} to {current} exceeds the largest storable amount")]
    AmountOverflow { current: i64, amount: i64 },

    #[error("Cycle window is empty: start {start_at} is not before end {end_at}")]
    InvalidWindow {
        start_at: chrono::DateTime<chrono::Utc>,
        end_at: chrono::DateTime<chrono::Utc>,
    },

    #[error("Insufficient {currency}: available {available}, requested {requested}")]
    InsufficientFunds {
        user_id: Uuid,
        currency: Currency,
        available: i64,
        requested: i64,
    },

    #[error("Daily conversion cap reached: used {used} of {cap}, requested {requested}")]
    DailyCapExceeded {
        user_id: Uuid,
        used: u32,
        requested: u32,
        cap: u32,
    },

    #[error("Cycle {cycle_id} is {actual}, expected one of {expected:?}")]
    InvalidCycleState {
        cycle_id: Uuid,
        expected: Vec<CycleStatus>,
        actual: CycleStatus,
    },

    #[error("Cycle not found: {0}")]
    CycleNotFound(Uuid),

    #[error("Tier lookup failed for user {user_id}: {reason}")]
    TierLookup { user_id: Uuid, reason: String },

    #[error("Storage error: {0}")]
    Storage(StorageError),
}

impl EconomyError {
    /// Whether the caller supplied bad input, as opposed to hitting a
    /// business refusal or a storage failure.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            EconomyError::NonPositiveAmount(_)
                | EconomyError::UnknownCurrency(_)
                | EconomyError::UnsupportedConversion { .. }
                | EconomyError::InvalidMultiplier(_)
                | EconomyError::AmountOverflow { .. }
                | EconomyError::InvalidWindow { .. }
        )
    }

    /// Whether retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            EconomyError::Storage(e) => e.is_transient(),
            EconomyError::TierLookup { .. } => true,
            _ => false,
        }
    }
}

impl From<StorageError> for EconomyError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::InsufficientFunds {
                user_id,
                currency,
                available,
                requested,
            } => EconomyError::InsufficientFunds {
                user_id,
                currency,
                available,
                requested,
            },
            StorageError::QuotaExceeded {
                user_id,
                used,
                requested,
                cap,
            } => EconomyError::DailyCapExceeded {
                user_id,
                used,
                requested,
                cap,
            },
            StorageError::AmountOverflow { current, amount } => EconomyError::AmountOverflow { current, amount },
            StorageError::CycleNotFound(id) => EconomyError::CycleNotFound(id),
            StorageError::CycleStateConflict {
                cycle_id,
                expected,
                actual,
            } => EconomyError::InvalidCycleState {
                cycle_id,
                expected,
                actual,
            },
            other => EconomyError::Storage(other),
        }
    }
}

/// Reject zero and negative amounts.
pub(crate) fn ensure_positive(amount: i64) -> Result<()> {
    if amount <= 0 {
        return Err(EconomyError::NonPositiveAmount(amount));
    }
    Ok(())
}
