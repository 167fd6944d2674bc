//! Revenue ingestion records.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RevenueStatus {
    /// No cycle accepted the share when it was recorded.
    Pending,
    /// The share was added to `allocated_cycle_id`'s jackpot.
    Allocated,
}

impl RevenueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RevenueStatus::Pending => "pending",
            RevenueStatus::Allocated => "allocated",
        }
    }
}

impl fmt::Display for RevenueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RevenueStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RevenueStatus::Pending),
            "allocated" => Ok(RevenueStatus::Allocated),
            other => Err(format!("unknown revenue status: {}", other)),
        }
    }
}

/// One external revenue event and the share routed to the jackpot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevenueLedgerEntry {
    pub id: Uuid,
    pub source_type: String,
    pub total_amount: i64,
    pub promoshare_share: i64,
    pub status: RevenueStatus,
    pub allocated_cycle_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Revenue event as handed to the store, before allocation is decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRevenue {
    pub source_type: String,
    pub total_amount: i64,
    pub promoshare_share: i64,
}
