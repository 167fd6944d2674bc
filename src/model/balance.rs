//! Balances, ledger entries and the batch request that mutates them.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Currency;

/// Per-user balance row.
///
/// Quantities are never negative. A currency absent from `quantities` reads
/// as zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub user_id: Uuid,
    pub quantities: BTreeMap<Currency, i64>,
    pub daily_conversion_count: u32,
    pub daily_conversion_reset_date: Option<NaiveDate>,
    pub master_key_active: bool,
    pub master_key_expiry: Option<DateTime<Utc>>,
}

impl Balance {
    /// A zeroed balance, as created lazily on first access.
    pub fn empty(user_id: Uuid) -> Self {
        Self {
            user_id,
            quantities: BTreeMap::new(),
            daily_conversion_count: 0,
            daily_conversion_reset_date: None,
            master_key_active: false,
            master_key_expiry: None,
        }
    }

    pub fn quantity(&self, currency: Currency) -> i64 {
        self.quantities.get(&currency).copied().unwrap_or(0)
    }

    /// Conversions already used on `today`. A stale reset date counts as zero.
    pub fn conversions_used_on(&self, today: NaiveDate) -> u32 {
        if self.daily_conversion_reset_date == Some(today) {
            self.daily_conversion_count
        } else {
            0
        }
    }

    /// Whether the master key is active and unexpired at `now`.
    pub fn has_master_key(&self, now: DateTime<Utc>) -> bool {
        self.master_key_active && self.master_key_expiry.is_some_and(|expiry| expiry > now)
    }
}

/// Direction of a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Earn,
    Spend,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Earn => "earn",
            EntryKind::Spend => "spend",
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "earn" => Ok(EntryKind::Earn),
            "spend" => Ok(EntryKind::Spend),
            other => Err(format!("unknown entry kind: {}", other)),
        }
    }
}

/// Immutable, append-only record of one balance-affecting event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Monotonic id assigned by the store.
    pub id: i64,
    pub user_id: Uuid,
    pub currency: Currency,
    /// Positive for earn, negative for spend.
    pub signed_amount: i64,
    pub kind: EntryKind,
    pub source: String,
    pub reference_id: Option<String>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A single requested balance change. `amount` is always positive; `kind`
/// gives the direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Posting {
    pub user_id: Uuid,
    pub currency: Currency,
    pub amount: i64,
    pub kind: EntryKind,
    pub source: String,
    pub reference_id: Option<String>,
    pub description: Option<String>,
}

impl Posting {
    pub fn earn(user_id: Uuid, currency: Currency, amount: i64, source: impl Into<String>) -> Self {
        Self {
            user_id,
            currency,
            amount,
            kind: EntryKind::Earn,
            source: source.into(),
            reference_id: None,
            description: None,
        }
    }

    pub fn spend(user_id: Uuid, currency: Currency, amount: i64, source: impl Into<String>) -> Self {
        Self {
            kind: EntryKind::Spend,
            ..Self::earn(user_id, currency, amount, source)
        }
    }

    pub fn with_reference(mut self, reference_id: Option<String>) -> Self {
        self.reference_id = reference_id;
        self
    }

    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }

    pub fn signed_amount(&self) -> i64 {
        match self.kind {
            EntryKind::Earn => self.amount,
            EntryKind::Spend => -self.amount,
        }
    }
}

/// Claim against a user's daily conversion allowance, checked and recorded in
/// the same transaction as the postings it accompanies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaClaim {
    pub user_id: Uuid,
    pub date: NaiveDate,
    pub units: u32,
    pub cap: u32,
}

impl QuotaClaim {
    /// The new daily count if the claim fits under the cap, or `Err(used)`
    /// with the count already used today.
    pub fn apply(&self, stored_count: u32, stored_date: Option<NaiveDate>) -> Result<u32, u32> {
        let used = if stored_date == Some(self.date) { stored_count } else { 0 };
        match used.checked_add(self.units) {
            Some(total) if total <= self.cap => Ok(total),
            _ => Err(used),
        }
    }
}

/// Activation or extension of a user's master key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MasterKeyGrant {
    pub user_id: Uuid,
    pub now: DateTime<Utc>,
    pub valid_for: Duration,
}

impl MasterKeyGrant {
    /// Expiry after applying this grant. A still-valid key is extended from
    /// its current expiry; otherwise validity starts at `now`.
    pub fn expiry_after(&self, active: bool, current: Option<DateTime<Utc>>) -> DateTime<Utc> {
        let base = match current {
            Some(expiry) if active && expiry > self.now => expiry,
            _ => self.now,
        };
        base + self.valid_for
    }
}

/// All-or-nothing balance mutation: every posting applies, the quota claim
/// and master-key grant (if any) are recorded, or nothing changes.
#[derive(Debug, Clone, Default)]
pub struct LedgerBatch {
    pub postings: Vec<Posting>,
    pub quota: Option<QuotaClaim>,
    pub master_key: Option<MasterKeyGrant>,
}

impl LedgerBatch {
    pub fn single(posting: Posting) -> Self {
        Self {
            postings: vec![posting],
            ..Default::default()
        }
    }
}
