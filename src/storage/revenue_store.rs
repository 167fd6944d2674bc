//! RevenueStore trait definition.

use async_trait::async_trait;
use uuid::Uuid;

use super::Result;
use crate::model::{NewRevenue, RevenueLedgerEntry};

/// Interface for revenue ingestion.
#[async_trait]
pub trait RevenueStore: Send + Sync {
    /// Record a revenue event.
    ///
    /// If the share is positive and `target_cycle` still accepts jackpot
    /// contributions, the entry is stored `Allocated` and the share added to
    /// that jackpot in the same transaction. Otherwise, including when the
    /// jackpot cannot hold the share, it is stored `Pending` and no jackpot
    /// changes.
    async fn record_revenue(&self, revenue: NewRevenue, target_cycle: Option<Uuid>) -> Result<RevenueLedgerEntry>;

    /// Entries that were never allocated, oldest first.
    async fn pending_revenue(&self) -> Result<Vec<RevenueLedgerEntry>>;
}
