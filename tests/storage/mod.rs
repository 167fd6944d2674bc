//! Shared storage integration tests.
//!
//! Tests the storage interfaces against all implementations. Each
//! implementation module imports these test functions and runs them.
//!
//! All tests share one store per run. Each test works in its own calendar
//! era so cycles created by one test never fall inside another test's
//! windows, and eras increase in run order so rollover targets from earlier
//! tests always start before a later test's cycles end.

use chrono::{DateTime, Duration, TimeZone, Utc};

pub mod balance_store_tests;
pub mod economy_tests;
pub mod revenue_store_tests;

/// Midnight UTC on 1 January of `year`, plus `days`.
pub fn at(year: i32, days: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, 1, 1, 0, 0, 0).unwrap() + Duration::days(days)
}
