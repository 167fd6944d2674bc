//! Storage interfaces and implementations.
//!
//! Every balance, jackpot and cycle-status mutation happens inside a single
//! storage call so the backend can make it atomic. Services never read a
//! value and write it back in a second call.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use crate::config::{StorageConfig, StorageType};
use crate::model::{CycleStatus, Currency, LedgerEntry, NewWinner, Posting, Winner};

mod balance_store;
mod cycle_store;
pub mod helpers;
pub mod memory;
mod revenue_store;
mod ticket_store;

#[cfg(feature = "sqlite")]
pub mod schema;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use balance_store::BalanceStore;
pub use cycle_store::CycleStore;
pub use memory::InMemoryStore;
pub use revenue_store::RevenueStore;
pub use ticket_store::TicketStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Insufficient {currency} for user {user_id}: available {available}, requested {requested}")]
    InsufficientFunds {
        user_id: Uuid,
        currency: Currency,
        available: i64,
        requested: i64,
    },

    #[error("Daily conversion cap reached for user {user_id}: used {used} of {cap}, requested {requested}")]
    QuotaExceeded {
        user_id: Uuid,
        used: u32,
        requested: u32,
        cap: u32,
    },

    #[error("Cycle not found: {0}")]
    CycleNotFound(Uuid),

    #[error("Cycle {cycle_id} is {actual}, expected one of {expected:?}")]
    CycleStateConflict {
        cycle_id: Uuid,
        expected: Vec<CycleStatus>,
        actual: CycleStatus,
    },

    #[error("Jackpot of cycle {cycle_id} moved from {expected} to {actual} during settlement")]
    JackpotChanged {
        cycle_id: Uuid,
        expected: i64,
        actual: i64,
    },

    #[error("Adding {amount} to {current} overflows the stored amount")]
    AmountOverflow { current: i64, amount: i64 },

    #[error("Invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),

    #[cfg(feature = "sqlite")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt row: {0}")]
    Corrupt(String),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

impl StorageError {
    /// Whether retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            StorageError::Unavailable(_) | StorageError::JackpotChanged { .. } => true,
            #[cfg(feature = "sqlite")]
            StorageError::Database(sqlx::Error::Database(db)) => is_sqlite_busy(&**db),
            #[cfg(feature = "sqlite")]
            StorageError::Database(e) => matches!(e, sqlx::Error::PoolTimedOut | sqlx::Error::Io(_)),
            _ => false,
        }
    }
}

#[cfg(feature = "sqlite")]
const SQLITE_BUSY: i32 = 5;
#[cfg(feature = "sqlite")]
const SQLITE_LOCKED: i32 = 6;

/// Lock contention, as opposed to constraint or schema failures.
///
/// SQLite reports extended result codes; the primary code is the low byte.
#[cfg(feature = "sqlite")]
fn is_sqlite_busy(err: &dyn sqlx::error::DatabaseError) -> bool {
    err.code()
        .and_then(|code| code.parse::<i32>().ok())
        .map_or(false, |code| matches!(code & 0xff, SQLITE_BUSY | SQLITE_LOCKED))
}

/// Everything a draw writes, applied in one transaction.
///
/// The store completes the cycle only if it is still `Calculating`, which is
/// what makes a retried or concurrent settlement fail instead of paying twice.
#[derive(Debug, Clone)]
pub struct DrawSettlement {
    pub cycle_id: Uuid,
    /// Jackpot the payouts were computed from. Settlement fails with
    /// `JackpotChanged` if the stored jackpot differs.
    pub jackpot: i64,
    pub winning_number: u32,
    pub winners: Vec<NewWinner>,
    pub postings: Vec<Posting>,
    /// Amount to add to the nearest future cycle's jackpot.
    pub carry_forward: i64,
}

/// What a settlement wrote.
#[derive(Debug, Clone, Default)]
pub struct SettlementReceipt {
    pub winners: Vec<Winner>,
    pub entries: Vec<LedgerEntry>,
    /// Cycle that received `carry_forward`, if any was found.
    pub rollover_cycle_id: Option<Uuid>,
}

/// Pick the rollover target: the earliest-starting non-completed cycle that
/// starts at or after `after`.
pub(crate) fn rollover_target<I>(cycles: I, source: Uuid, after: DateTime<Utc>) -> Option<Uuid>
where
    I: IntoIterator<Item = (Uuid, DateTime<Utc>, CycleStatus)>,
{
    cycles
        .into_iter()
        .filter(|(id, start_at, status)| {
            *id != source && *start_at >= after && *status != CycleStatus::Completed
        })
        .min_by_key(|(id, start_at, _)| (*start_at, *id))
        .map(|(id, _, _)| id)
}

/// Handles to one backend, one per storage interface.
#[derive(Clone)]
pub struct Stores {
    pub balances: Arc<dyn BalanceStore>,
    pub cycles: Arc<dyn CycleStore>,
    pub tickets: Arc<dyn TicketStore>,
    pub revenue: Arc<dyn RevenueStore>,
}

impl Stores {
    /// Share a single backend across all interfaces.
    pub fn from_backend<S>(store: Arc<S>) -> Self
    where
        S: BalanceStore + CycleStore + TicketStore + RevenueStore + 'static,
    {
        Self {
            balances: store.clone(),
            cycles: store.clone(),
            tickets: store.clone(),
            revenue: store,
        }
    }

    /// Fresh in-memory backend.
    pub fn in_memory() -> Self {
        Self::from_backend(Arc::new(InMemoryStore::new()))
    }
}

/// Initialize storage based on configuration.
pub async fn init_storage(config: &StorageConfig) -> std::result::Result<Stores, Box<dyn std::error::Error>> {
    match config.storage_type {
        StorageType::Memory => {
            info!("Storage: in-memory");
            Ok(Stores::in_memory())
        }
        #[cfg(feature = "sqlite")]
        StorageType::Sqlite => {
            info!("Storage: sqlite at {}", config.sqlite.path);
            let store = SqliteStore::connect(&config.sqlite).await?;
            store.init().await?;
            Ok(Stores::from_backend(Arc::new(store)))
        }
        #[cfg(not(feature = "sqlite"))]
        StorageType::Sqlite => {
            tracing::error!("SQLite storage requested but 'sqlite' feature is not enabled");
            Err("SQLite feature not enabled".into())
        }
    }
}
