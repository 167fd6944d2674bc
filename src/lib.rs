//! Promoshare - virtual economy core
//!
//! Multi-currency balances over an immutable ledger, a capped
//! points-to-promokeys exchange, and periodic jackpot draws funded by
//! revenue share and action tickets.

pub mod config;
pub mod facade;
pub mod model;
pub mod services;
pub mod storage;
pub mod utils;
