//! Revenue ingestion.
//!
//! A fixed share of every revenue event is routed into the active cycle's
//! jackpot. Billing calls this fire-and-forget, so [`RevenueAllocator::track_revenue`]
//! never fails the caller.

use std::sync::Arc;

use tracing::{info, warn};

use super::error::{ensure_positive, Result};
use crate::config::RevenueConfig;
use crate::model::{apply_bps, NewRevenue, RevenueLedgerEntry, RevenueStatus};
use crate::storage::{CycleStore, RevenueStore};
use crate::utils::clock::Clock;

#[derive(Clone)]
pub struct RevenueAllocator {
    cycles: Arc<dyn CycleStore>,
    revenue: Arc<dyn RevenueStore>,
    clock: Arc<dyn Clock>,
    config: RevenueConfig,
}

impl RevenueAllocator {
    pub fn new(
        cycles: Arc<dyn CycleStore>,
        revenue: Arc<dyn RevenueStore>,
        clock: Arc<dyn Clock>,
        config: RevenueConfig,
    ) -> Self {
        Self {
            cycles,
            revenue,
            clock,
            config,
        }
    }

    /// Record revenue, logging and swallowing any failure.
    pub async fn track_revenue(&self, amount: i64, source_type: &str) -> Option<RevenueLedgerEntry> {
        match self.try_track_revenue(amount, source_type).await {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(amount, source_type, error = %e, "Revenue tracking failed");
                None
            }
        }
    }

    /// Record revenue, surfacing errors.
    ///
    /// The share is allocated to the active cycle in the same transaction as
    /// the entry. With no active cycle the entry is stored `Pending`.
    #[tracing::instrument(name = "revenue.track", skip_all, fields(amount = amount, source_type = source_type))]
    pub async fn try_track_revenue(&self, amount: i64, source_type: &str) -> Result<RevenueLedgerEntry> {
        ensure_positive(amount)?;
        let share = apply_bps(amount, self.config.share_bps);

        // A share that rounds to zero is recorded but never allocated.
        let target = if share > 0 {
            self.cycles.active_cycle(self.clock.now()).await?.map(|c| c.id)
        } else {
            None
        };
        let entry = self
            .revenue
            .record_revenue(
                NewRevenue {
                    source_type: source_type.to_string(),
                    total_amount: amount,
                    promoshare_share: share,
                },
                target,
            )
            .await?;

        match entry.status {
            RevenueStatus::Allocated => info!(
                share,
                cycle_id = ?entry.allocated_cycle_id,
                "Revenue share added to jackpot"
            ),
            RevenueStatus::Pending => warn!(share, "Revenue share not allocated, left pending"),
        }
        Ok(entry)
    }

    /// Entries never allocated to a cycle, for reporting.
    pub async fn pending_revenue(&self) -> Result<Vec<RevenueLedgerEntry>> {
        Ok(self.revenue.pending_revenue().await?)
    }
}
