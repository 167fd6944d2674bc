//! BalanceStore trait definition.

use async_trait::async_trait;
use uuid::Uuid;

use super::Result;
use crate::model::{Balance, Currency, LedgerBatch, LedgerEntry};

/// Interface for balances and the ledger that backs them.
///
/// Balances change only through [`BalanceStore::apply`], which writes the
/// balance updates and their ledger entries in one transaction. For every
/// user and currency the sum of ledger amounts equals the balance quantity.
///
/// # Implementations
///
/// - `SqliteStore`: SQLite storage
/// - `InMemoryStore`: in-process storage
#[async_trait]
pub trait BalanceStore: Send + Sync {
    /// Get a user's balance, creating a zeroed row if none exists.
    async fn balance(&self, user_id: Uuid) -> Result<Balance>;

    /// Apply a ledger batch atomically.
    ///
    /// Postings are applied in order. A spend that would take a quantity
    /// below zero fails the whole batch with `InsufficientFunds`; an
    /// over-cap quota claim fails it with `QuotaExceeded`. On failure nothing
    /// is written. Returns the appended entries in posting order.
    async fn apply(&self, batch: LedgerBatch) -> Result<Vec<LedgerEntry>>;

    /// Ledger entries for a user in id order, optionally for one currency.
    async fn ledger(&self, user_id: Uuid, currency: Option<Currency>) -> Result<Vec<LedgerEntry>>;
}
