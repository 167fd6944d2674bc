//! Economy services.
//!
//! Each service owns one concern and talks to storage only through the
//! storage traits. Multi-step mutations are handed to storage as a single
//! call so they commit atomically.

pub mod conversion;
pub mod cycles;
pub mod draw;
pub mod error;
pub mod ledger;
pub mod revenue;
pub mod tickets;
pub mod tiers;

pub use conversion::{ConversionPolicy, ConversionReceipt};
pub use cycles::CycleManager;
pub use draw::{DrawEngine, DrawOutcome};
pub use error::{EconomyError, Result};
pub use ledger::LedgerWriter;
pub use revenue::RevenueAllocator;
pub use tickets::{TicketIssuer, TicketRequest};
pub use tiers::{CachedTierDirectory, StaticTiers, TierDirectory};
