//! Points to promokeys exchange.

use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use super::error::{EconomyError, Result};
use crate::config::ConversionConfig;
use crate::model::{Currency, LedgerBatch, LedgerEntry, Posting, QuotaClaim};
use crate::storage::{BalanceStore, StorageError};
use crate::utils::clock::Clock;

/// Source tag on both legs of a conversion.
pub const CONVERSION_SOURCE: &str = "conversion";

/// Both legs of a completed conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionReceipt {
    pub debit: LedgerEntry,
    pub credit: LedgerEntry,
}

/// Fixed-rate, daily-capped currency exchange.
#[derive(Clone)]
pub struct ConversionPolicy {
    store: Arc<dyn BalanceStore>,
    clock: Arc<dyn Clock>,
    config: ConversionConfig,
}

impl ConversionPolicy {
    pub fn new(store: Arc<dyn BalanceStore>, clock: Arc<dyn Clock>, config: ConversionConfig) -> Self {
        Self { store, clock, config }
    }

    /// Convert `count` units of `to` bought with `from`.
    ///
    /// Only points to promokeys is supported. The daily cap is checked
    /// before funds, and the debit, credit and counter update commit
    /// together.
    #[tracing::instrument(name = "conversion.convert", skip_all, fields(%user_id, %from, %to, count = count))]
    pub async fn convert(&self, user_id: Uuid, from: Currency, to: Currency, count: u32) -> Result<ConversionReceipt> {
        if (from, to) != (Currency::Points, Currency::PromoKeys) {
            return Err(EconomyError::UnsupportedConversion { from, to });
        }
        if count == 0 {
            return Err(EconomyError::NonPositiveAmount(0));
        }
        let cost = self
            .config
            .points_per_key
            .checked_mul(i64::from(count))
            .filter(|cost| *cost > 0)
            .ok_or(EconomyError::NonPositiveAmount(self.config.points_per_key))?;

        let reference = Some(Uuid::new_v4().to_string());
        let batch = LedgerBatch {
            postings: vec![
                Posting::spend(user_id, from, cost, CONVERSION_SOURCE)
                    .with_reference(reference.clone())
                    .with_description(Some(format!("{} {} for {} {}", cost, from, count, to))),
                Posting::earn(user_id, to, i64::from(count), CONVERSION_SOURCE)
                    .with_reference(reference)
                    .with_description(Some(format!("{} {} for {} {}", count, to, cost, from))),
            ],
            quota: Some(QuotaClaim {
                user_id,
                date: self.clock.today(),
                units: count,
                cap: self.config.daily_cap,
            }),
            master_key: None,
        };

        let entries = self.store.apply(batch).await.map_err(|e| {
            let err = EconomyError::from(e);
            warn!(error = %err, "Conversion refused");
            err
        })?;

        let mut legs = entries.into_iter();
        match (legs.next(), legs.next()) {
            (Some(debit), Some(credit)) => {
                info!(cost, "Conversion applied");
                Ok(ConversionReceipt { debit, credit })
            }
            _ => Err(StorageError::Corrupt("conversion batch returned fewer than two entries".to_string()).into()),
        }
    }

    /// Conversion units still available to a user today.
    pub async fn remaining_today(&self, user_id: Uuid) -> Result<u32> {
        let balance = self.store.balance(user_id).await?;
        let used = balance.conversions_used_on(self.clock.today());
        Ok(self.config.daily_cap.saturating_sub(used))
    }
}
