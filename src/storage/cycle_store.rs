//! CycleStore trait definition.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{DrawSettlement, Result, SettlementReceipt};
use crate::model::{Cycle, CycleStatus, NewCycle, NewPoolItem, PoolItem, Winner};

/// Interface for cycle lifecycle, jackpots, side prizes and winners.
#[async_trait]
pub trait CycleStore: Send + Sync {
    /// Insert a new `Active` cycle with an empty jackpot.
    async fn create_cycle(&self, cycle: NewCycle) -> Result<Cycle>;

    async fn get_cycle(&self, cycle_id: Uuid) -> Result<Option<Cycle>>;

    /// The `Active` cycle whose window contains `now`. When several overlap
    /// the earliest-starting one wins.
    async fn active_cycle(&self, now: DateTime<Utc>) -> Result<Option<Cycle>>;

    /// Non-completed cycles whose window ended at or before `now`, oldest
    /// first.
    async fn due_cycles(&self, now: DateTime<Utc>) -> Result<Vec<Cycle>>;

    /// Atomically increment a jackpot. Fails with `CycleStateConflict` once
    /// the cycle is completed and with `AmountOverflow` if the sum does not
    /// fit. Returns the new jackpot amount.
    async fn add_to_jackpot(&self, cycle_id: Uuid, amount: i64) -> Result<i64>;

    /// Compare-and-set the cycle status.
    ///
    /// Returns `true` if the status was `from` and is now `to`, `false` if
    /// the status was anything else (nothing written).
    async fn transition(&self, cycle_id: Uuid, from: CycleStatus, to: CycleStatus) -> Result<bool>;

    /// Fix the winning number of a `Calculating` cycle.
    ///
    /// Only the first call writes; later calls return the number already
    /// recorded, so a retried draw resolves the same tickets. Fails with
    /// `CycleStateConflict` unless the cycle is `Calculating`.
    async fn record_winning_number(&self, cycle_id: Uuid, number: u32) -> Result<u32>;

    async fn add_pool_item(&self, cycle_id: Uuid, item: NewPoolItem) -> Result<PoolItem>;

    async fn pool_items(&self, cycle_id: Uuid) -> Result<Vec<PoolItem>>;

    async fn winners(&self, cycle_id: Uuid) -> Result<Vec<Winner>>;

    /// Record a draw's outcome in one transaction: winners, credits and
    /// their ledger entries, carry-forward into the nearest future cycle
    /// (marking it as a rollover), winning number, and completion.
    ///
    /// Fails with `CycleStateConflict` unless the cycle is `Calculating`.
    async fn settle_draw(&self, settlement: DrawSettlement) -> Result<SettlementReceipt>;
}
