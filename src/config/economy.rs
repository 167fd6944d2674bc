//! Economy rules: rates, caps and payout policy.

use serde::Deserialize;
use uuid::Uuid;

use crate::model::Currency;

/// Points charged per promokey.
pub const DEFAULT_POINTS_PER_KEY: i64 = 500;
/// Promokeys a user may convert per UTC day.
pub const DEFAULT_DAILY_CONVERSION_CAP: u32 = 3;
/// Share of the base share paid to free-tier winners (30%).
pub const DEFAULT_FREE_TIER_SHARE_BPS: u32 = 3_000;
/// Share of each revenue event routed into the jackpot (5%).
pub const DEFAULT_REVENUE_SHARE_BPS: u32 = 500;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConversionConfig {
    pub points_per_key: i64,
    pub daily_cap: u32,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            points_per_key: DEFAULT_POINTS_PER_KEY,
            daily_cap: DEFAULT_DAILY_CONVERSION_CAP,
        }
    }
}

/// Where the part of a winner's share that is not paid out goes.
///
/// This covers the free-tier reduction and the remainder of dividing the
/// jackpot between several winners.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum ForfeitPolicy {
    /// Removed from circulation. Logged, never credited.
    #[default]
    Burn,
    /// Credited to a platform-owned account in the payout currency.
    Retain { house_account: Uuid },
    /// Added to the nearest future cycle's jackpot.
    Rollover,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DrawConfig {
    /// Basis points of the base share paid to free-tier winners.
    pub free_tier_share_bps: u32,
    /// Currency jackpots are paid in.
    pub payout_currency: Currency,
    pub forfeit_policy: ForfeitPolicy,
    /// Attempts per cycle when a scheduled draw hits a transient storage error.
    pub max_attempts: usize,
}

impl Default for DrawConfig {
    fn default() -> Self {
        Self {
            free_tier_share_bps: DEFAULT_FREE_TIER_SHARE_BPS,
            payout_currency: Currency::Gems,
            forfeit_policy: ForfeitPolicy::Burn,
            max_attempts: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RevenueConfig {
    pub share_bps: u32,
}

impl Default for RevenueConfig {
    fn default() -> Self {
        Self {
            share_bps: DEFAULT_REVENUE_SHARE_BPS,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TierCacheConfig {
    /// Seconds a looked-up tier stays valid.
    pub ttl_secs: u64,
}

impl Default for TierCacheConfig {
    fn default() -> Self {
        Self { ttl_secs: 300 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MasterKeyConfig {
    /// Promokeys spent per activation.
    pub cost: i64,
    /// Hours of validity per activation.
    pub duration_hours: i64,
}

impl Default for MasterKeyConfig {
    fn default() -> Self {
        Self {
            cost: 1,
            duration_hours: 24,
        }
    }
}
