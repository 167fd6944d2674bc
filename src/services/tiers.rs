//! Tier lookup.
//!
//! Subscription state lives outside this crate. The draw asks a
//! [`TierDirectory`] for each winner's tier; [`CachedTierDirectory`] keeps
//! answers for a bounded time so a large draw does not hammer the upstream.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use super::error::Result;
use crate::model::Tier;
use crate::utils::clock::Clock;

/// Source of truth for user tiers.
#[async_trait]
pub trait TierDirectory: Send + Sync {
    async fn tier(&self, user_id: Uuid) -> Result<Tier>;
}

/// Fixed tier table. Users not in the table are `Free`.
#[derive(Default)]
pub struct StaticTiers {
    tiers: RwLock<HashMap<Uuid, Tier>>,
}

impl StaticTiers {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set(&self, user_id: Uuid, tier: Tier) {
        self.tiers.write().await.insert(user_id, tier);
    }
}

#[async_trait]
impl TierDirectory for StaticTiers {
    async fn tier(&self, user_id: Uuid) -> Result<Tier> {
        Ok(self.tiers.read().await.get(&user_id).copied().unwrap_or(Tier::Free))
    }
}

/// TTL cache in front of another directory.
pub struct CachedTierDirectory {
    inner: Arc<dyn TierDirectory>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    entries: RwLock<HashMap<Uuid, (Tier, DateTime<Utc>)>>,
}

impl CachedTierDirectory {
    pub fn new(inner: Arc<dyn TierDirectory>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            inner,
            clock,
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Drop one user's cached tier, e.g. after a subscription change.
    pub async fn invalidate(&self, user_id: Uuid) {
        self.entries.write().await.remove(&user_id);
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }
}

#[async_trait]
impl TierDirectory for CachedTierDirectory {
    async fn tier(&self, user_id: Uuid) -> Result<Tier> {
        let now = self.clock.now();
        if let Some((tier, expires_at)) = self.entries.read().await.get(&user_id).copied() {
            if now < expires_at {
                return Ok(tier);
            }
        }

        let tier = self.inner.tier(user_id).await?;
        debug!(%user_id, %tier, "Tier cache refreshed");
        let mut entries = self.entries.write().await;
        entries.retain(|_, (_, expires_at)| now < *expires_at);
        entries.insert(user_id, (tier, now + self.ttl));
        Ok(tier)
    }
}
