//! Economy facade for in-process library usage.
//!
//! Wires every service over one storage backend.
//!
//! # Example
//!
//! ```ignore
//! use promoshare::config::Config;
//! use promoshare::facade::Economy;
//! use promoshare::model::Currency;
//!
//! let economy = Economy::builder(Config::for_test()).build().await?;
//! economy.ledger().credit(user_id, Currency::Points, 500, "quest", None, None).await?;
//! economy
//!     .conversion()
//!     .convert(user_id, Currency::Points, Currency::PromoKeys, 1)
//!     .await?;
//! ```

use std::sync::Arc;

use chrono::Duration;

use crate::config::Config;
use crate::services::{
    CachedTierDirectory, ConversionPolicy, CycleManager, DrawEngine, LedgerWriter, RevenueAllocator, StaticTiers,
    TicketIssuer, TierDirectory,
};
use crate::storage::{init_storage, Stores};
use crate::utils::clock::{Clock, SystemClock};
use crate::utils::random::{NumberSource, ThreadRngSource};

/// Builder for [`Economy`].
pub struct EconomyBuilder {
    config: Config,
    stores: Option<Stores>,
    clock: Arc<dyn Clock>,
    numbers: Arc<dyn NumberSource>,
    tiers: Option<Arc<dyn TierDirectory>>,
}

impl EconomyBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            stores: None,
            clock: Arc::new(SystemClock),
            numbers: Arc::new(ThreadRngSource),
            tiers: None,
        }
    }

    /// Use existing stores instead of opening the configured backend.
    pub fn with_stores(mut self, stores: Stores) -> Self {
        self.stores = Some(stores);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_numbers(mut self, numbers: Arc<dyn NumberSource>) -> Self {
        self.numbers = numbers;
        self
    }

    /// Upstream tier lookup. Wrapped in a TTL cache. Defaults to everyone
    /// on the free tier.
    pub fn with_tiers(mut self, tiers: Arc<dyn TierDirectory>) -> Self {
        self.tiers = Some(tiers);
        self
    }

    pub async fn build(self) -> Result<Economy, Box<dyn std::error::Error>> {
        let stores = match self.stores {
            Some(stores) => stores,
            None => init_storage(&self.config.storage).await?,
        };

        let upstream = self.tiers.unwrap_or_else(|| Arc::new(StaticTiers::new()));
        let ttl = Duration::seconds(i64::try_from(self.config.tiers.ttl_secs).unwrap_or(i64::MAX));
        let tiers = Arc::new(CachedTierDirectory::new(upstream, self.clock.clone(), ttl));

        let cycles = CycleManager::new(stores.cycles.clone(), self.clock.clone());
        let ledger = LedgerWriter::new(
            stores.balances.clone(),
            self.clock.clone(),
            self.config.master_key.clone(),
        );
        let conversion = ConversionPolicy::new(
            stores.balances.clone(),
            self.clock.clone(),
            self.config.conversion.clone(),
        );
        let tickets = TicketIssuer::new(
            stores.cycles.clone(),
            stores.tickets.clone(),
            self.clock.clone(),
            self.numbers.clone(),
        );
        let revenue = RevenueAllocator::new(
            stores.cycles.clone(),
            stores.revenue.clone(),
            self.clock.clone(),
            self.config.revenue.clone(),
        );
        let draws = DrawEngine::new(
            stores.cycles.clone(),
            stores.tickets.clone(),
            tiers.clone(),
            self.numbers,
            cycles.clone(),
            self.config.draw.clone(),
        );

        Ok(Economy {
            stores,
            clock: self.clock,
            tiers,
            ledger,
            conversion,
            tickets,
            cycles,
            draws,
            revenue,
        })
    }
}

/// Every economy service over one store.
pub struct Economy {
    stores: Stores,
    clock: Arc<dyn Clock>,
    tiers: Arc<CachedTierDirectory>,
    ledger: LedgerWriter,
    conversion: ConversionPolicy,
    tickets: TicketIssuer,
    cycles: CycleManager,
    draws: DrawEngine,
    revenue: RevenueAllocator,
}

impl Economy {
    pub fn builder(config: Config) -> EconomyBuilder {
        EconomyBuilder::new(config)
    }

    pub fn ledger(&self) -> &LedgerWriter {
        &self.ledger
    }

    pub fn conversion(&self) -> &ConversionPolicy {
        &self.conversion
    }

    pub fn tickets(&self) -> &TicketIssuer {
        &self.tickets
    }

    pub fn cycles(&self) -> &CycleManager {
        &self.cycles
    }

    pub fn draws(&self) -> &DrawEngine {
        &self.draws
    }

    pub fn revenue(&self) -> &RevenueAllocator {
        &self.revenue
    }

    /// The tier cache, for invalidation after subscription changes.
    pub fn tiers(&self) -> &CachedTierDirectory {
        &self.tiers
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub fn stores(&self) -> &Stores {
        &self.stores
    }
}
