//! Lottery cycles, side prizes and winners.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Tier;

/// Cadence of a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CycleType {
    Daily,
    Weekly,
    Seasonal,
}

impl CycleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CycleType::Daily => "daily",
            CycleType::Weekly => "weekly",
            CycleType::Seasonal => "seasonal",
        }
    }
}

impl fmt::Display for CycleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CycleType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "daily" => Ok(CycleType::Daily),
            "weekly" => Ok(CycleType::Weekly),
            "seasonal" => Ok(CycleType::Seasonal),
            other => Err(format!("unknown cycle type: {}", other)),
        }
    }
}

/// Lifecycle state. Progresses `Active -> Calculating -> Completed` only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CycleStatus {
    Active,
    Calculating,
    Completed,
}

impl CycleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CycleStatus::Active => "active",
            CycleStatus::Calculating => "calculating",
            CycleStatus::Completed => "completed",
        }
    }

    /// Whether the jackpot may still grow.
    pub fn accepts_jackpot(&self) -> bool {
        matches!(self, CycleStatus::Active | CycleStatus::Calculating)
    }
}

impl fmt::Display for CycleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CycleStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(CycleStatus::Active),
            "calculating" => Ok(CycleStatus::Calculating),
            "completed" => Ok(CycleStatus::Completed),
            other => Err(format!("unknown cycle status: {}", other)),
        }
    }
}

/// A bounded window during which tickets accumulate against a jackpot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cycle {
    pub id: Uuid,
    pub cycle_type: CycleType,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub status: CycleStatus,
    pub jackpot_amount: i64,
    pub is_rollover: bool,
    pub config: serde_json::Value,
    /// Set when the draw settles.
    pub winning_number: Option<u32>,
    pub created_at: DateTime<Utc>,
}

impl Cycle {
    /// Whether `now` falls in `[start_at, end_at)`.
    pub fn contains(&self, now: DateTime<Utc>) -> bool {
        self.start_at <= now && now < self.end_at
    }
}

/// Parameters for creating a cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct NewCycle {
    pub cycle_type: CycleType,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub config: serde_json::Value,
}

/// Side prize attached to a cycle, outside the jackpot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolItem {
    pub id: Uuid,
    pub cycle_id: Uuid,
    pub reward_type: String,
    pub amount: i64,
    pub description: String,
    pub sponsor_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPoolItem {
    pub reward_type: String,
    pub amount: i64,
    pub description: String,
    pub sponsor_id: Option<Uuid>,
}

/// Payout detail recorded on a winner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrizeData {
    pub amount: i64,
    pub tier: Tier,
    pub ticket_number: u32,
}

/// A drawn winner. Written only by draw settlement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Winner {
    pub id: Uuid,
    pub cycle_id: Uuid,
    pub user_id: Uuid,
    pub ticket_id: Uuid,
    pub prize_description: String,
    pub prize_data: PrizeData,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewWinner {
    pub user_id: Uuid,
    pub ticket_id: Uuid,
    pub prize_description: String,
    pub prize_data: PrizeData,
}
