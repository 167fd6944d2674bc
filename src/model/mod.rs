//! Domain records of the economy.
//!
//! These are plain data types shared by the storage backends and the
//! services. They carry no persistence logic of their own.

mod balance;
mod currency;
mod cycle;
mod revenue;
mod ticket;

pub use balance::{Balance, EntryKind, LedgerBatch, LedgerEntry, MasterKeyGrant, Posting, QuotaClaim};
pub use currency::{Currency, UnknownCurrency};
pub use cycle::{Cycle, CycleStatus, CycleType, NewCycle, NewPoolItem, NewWinner, PoolItem, PrizeData, Winner};
pub use revenue::{NewRevenue, RevenueLedgerEntry, RevenueStatus};
pub use ticket::{NewTicket, Ticket, Tier};

/// Lowest ticket / winning number.
pub const MIN_TICKET_NUMBER: u32 = 1;
/// Highest ticket / winning number (inclusive).
pub const MAX_TICKET_NUMBER: u32 = 1_000_000;
/// Denominator for all basis-point rates.
pub const BPS_DENOMINATOR: i64 = 10_000;

/// Apply a basis-point rate to an amount, rounding down.
pub fn apply_bps(amount: i64, bps: u32) -> i64 {
    ((amount as i128 * bps as i128) / BPS_DENOMINATOR as i128) as i64
}
