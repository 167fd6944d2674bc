//! Ledger-mediated balance changes.
//!
//! Every credit or debit is one storage batch holding one posting, so the
//! balance row and its ledger entry are written together or not at all.

use std::sync::Arc;

use chrono::Duration;
use tracing::{debug, info};
use uuid::Uuid;

use super::error::{ensure_positive, Result};
use crate::config::MasterKeyConfig;
use crate::model::{Balance, Currency, LedgerBatch, LedgerEntry, MasterKeyGrant, Posting};
use crate::storage::{BalanceStore, StorageError};
use crate::utils::clock::Clock;

/// Source tag on master key purchases.
pub const MASTER_KEY_SOURCE: &str = "master_key";

/// Writes balance changes through the ledger.
#[derive(Clone)]
pub struct LedgerWriter {
    store: Arc<dyn BalanceStore>,
    clock: Arc<dyn Clock>,
    master_key: MasterKeyConfig,
}

impl LedgerWriter {
    pub fn new(store: Arc<dyn BalanceStore>, clock: Arc<dyn Clock>, master_key: MasterKeyConfig) -> Self {
        Self {
            store,
            clock,
            master_key,
        }
    }

    /// Add `amount` of `currency` to a user's balance.
    #[tracing::instrument(name = "ledger.credit", skip_all, fields(%user_id, %currency, amount = amount, source = source))]
    pub async fn credit(
        &self,
        user_id: Uuid,
        currency: Currency,
        amount: i64,
        source: &str,
        reference_id: Option<String>,
        description: Option<String>,
    ) -> Result<LedgerEntry> {
        ensure_positive(amount)?;
        let posting = Posting::earn(user_id, currency, amount, source)
            .with_reference(reference_id)
            .with_description(description);
        self.post(posting).await
    }

    /// Remove `amount` of `currency` from a user's balance.
    ///
    /// Fails with `InsufficientFunds` if the balance is below `amount`.
    #[tracing::instrument(name = "ledger.debit", skip_all, fields(%user_id, %currency, amount = amount, source = source))]
    pub async fn debit(
        &self,
        user_id: Uuid,
        currency: Currency,
        amount: i64,
        source: &str,
        reference_id: Option<String>,
        description: Option<String>,
    ) -> Result<LedgerEntry> {
        ensure_positive(amount)?;
        let posting = Posting::spend(user_id, currency, amount, source)
            .with_reference(reference_id)
            .with_description(description);
        self.post(posting).await
    }

    async fn post(&self, posting: Posting) -> Result<LedgerEntry> {
        let mut entries = self.store.apply(LedgerBatch::single(posting)).await?;
        let entry = entries
            .pop()
            .ok_or_else(|| StorageError::Corrupt("batch returned no ledger entry".to_string()))?;
        debug!(entry_id = entry.id, signed_amount = entry.signed_amount, "Ledger entry appended");
        Ok(entry)
    }

    /// Current balance, creating a zeroed row on first access.
    pub async fn balance(&self, user_id: Uuid) -> Result<Balance> {
        Ok(self.store.balance(user_id).await?)
    }

    /// Ledger history in id order.
    pub async fn ledger(&self, user_id: Uuid, currency: Option<Currency>) -> Result<Vec<LedgerEntry>> {
        Ok(self.store.ledger(user_id, currency).await?)
    }

    /// Spend promokeys to activate (or extend) the master key.
    ///
    /// A key that is still valid is extended from its current expiry.
    #[tracing::instrument(name = "ledger.activate_master_key", skip_all, fields(%user_id))]
    pub async fn activate_master_key(&self, user_id: Uuid) -> Result<Balance> {
        ensure_positive(self.master_key.cost)?;
        let batch = LedgerBatch {
            postings: vec![Posting::spend(
                user_id,
                Currency::PromoKeys,
                self.master_key.cost,
                MASTER_KEY_SOURCE,
            )],
            quota: None,
            master_key: Some(MasterKeyGrant {
                user_id,
                now: self.clock.now(),
                valid_for: Duration::hours(self.master_key.duration_hours),
            }),
        };
        self.store.apply(batch).await?;

        let balance = self.store.balance(user_id).await?;
        info!(expiry = ?balance.master_key_expiry, "Master key activated");
        Ok(balance)
    }
}
