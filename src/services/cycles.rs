//! Cycle lifecycle: creation, jackpot growth, status transitions and side
//! prizes.
//!
//! Status only moves forward: `Active -> Calculating -> Completed`. Every
//! transition is a compare-and-set in storage, so concurrent callers agree on
//! a single winner of each step.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use super::error::{ensure_positive, EconomyError, Result};
use crate::model::{Cycle, CycleStatus, CycleType, NewCycle, NewPoolItem, PoolItem, Winner};
use crate::storage::CycleStore;
use crate::utils::clock::Clock;

#[derive(Clone)]
pub struct CycleManager {
    store: Arc<dyn CycleStore>,
    clock: Arc<dyn Clock>,
}

impl CycleManager {
    pub fn new(store: Arc<dyn CycleStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Open a new `Active` cycle with an empty jackpot.
    #[tracing::instrument(name = "cycle.create", skip_all, fields(%cycle_type, %start_at, %end_at))]
    pub async fn create_cycle(
        &self,
        cycle_type: CycleType,
        start_at: DateTime<Utc>,
        end_at: DateTime<Utc>,
        config: serde_json::Value,
    ) -> Result<Cycle> {
        if start_at >= end_at {
            return Err(EconomyError::InvalidWindow { start_at, end_at });
        }
        let cycle = self
            .store
            .create_cycle(NewCycle {
                cycle_type,
                start_at,
                end_at,
                config,
            })
            .await?;
        info!(cycle_id = %cycle.id, "Cycle created");
        Ok(cycle)
    }

    /// The active cycle whose window contains the current time.
    pub async fn active_cycle(&self) -> Result<Option<Cycle>> {
        Ok(self.store.active_cycle(self.clock.now()).await?)
    }

    pub async fn get_cycle(&self, cycle_id: Uuid) -> Result<Cycle> {
        self.store
            .get_cycle(cycle_id)
            .await?
            .ok_or(EconomyError::CycleNotFound(cycle_id))
    }

    /// Cycles awaiting a draw: window closed by `now`, not yet completed.
    pub async fn due_cycles(&self, now: DateTime<Utc>) -> Result<Vec<Cycle>> {
        Ok(self.store.due_cycles(now).await?)
    }

    /// Grow a jackpot. Returns the new total.
    pub async fn add_to_jackpot(&self, cycle_id: Uuid, amount: i64) -> Result<i64> {
        ensure_positive(amount)?;
        let total = self.store.add_to_jackpot(cycle_id, amount).await?;
        debug!(%cycle_id, amount, total, "Jackpot increased");
        Ok(total)
    }

    /// Move an active cycle to `Calculating`.
    ///
    /// Returns `false` without writing if the cycle already left `Active`.
    #[tracing::instrument(name = "cycle.begin_draw", skip_all, fields(%cycle_id))]
    pub async fn begin_draw(&self, cycle_id: Uuid) -> Result<bool> {
        let started = self
            .store
            .transition(cycle_id, CycleStatus::Active, CycleStatus::Calculating)
            .await?;
        if started {
            info!("Cycle locked for draw");
        } else {
            debug!("Cycle already past active");
        }
        Ok(started)
    }

    /// Complete a cycle without a draw.
    ///
    /// Accepts `Active` or `Calculating`; a completed cycle is rejected.
    #[tracing::instrument(name = "cycle.close", skip_all, fields(%cycle_id))]
    pub async fn close_cycle(&self, cycle_id: Uuid) -> Result<()> {
        for from in [CycleStatus::Active, CycleStatus::Calculating] {
            if self.store.transition(cycle_id, from, CycleStatus::Completed).await? {
                info!(%from, "Cycle closed");
                return Ok(());
            }
        }

        let cycle = self.get_cycle(cycle_id).await?;
        Err(EconomyError::InvalidCycleState {
            cycle_id,
            expected: vec![CycleStatus::Active, CycleStatus::Calculating],
            actual: cycle.status,
        })
    }

    pub async fn add_pool_item(&self, cycle_id: Uuid, item: NewPoolItem) -> Result<PoolItem> {
        ensure_positive(item.amount)?;
        Ok(self.store.add_pool_item(cycle_id, item).await?)
    }

    pub async fn pool_items(&self, cycle_id: Uuid) -> Result<Vec<PoolItem>> {
        Ok(self.store.pool_items(cycle_id).await?)
    }

    pub async fn winners(&self, cycle_id: Uuid) -> Result<Vec<Winner>> {
        Ok(self.store.winners(cycle_id).await?)
    }
}
