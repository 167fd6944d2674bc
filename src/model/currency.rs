//! Currency codes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A fungible balance type tracked per user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Currency {
    /// Earned through platform activity; convertible into promokeys.
    Points,
    /// Bought with points, spent on master keys.
    PromoKeys,
    /// Premium currency; default jackpot payout currency.
    Gems,
}

impl Currency {
    pub const ALL: [Currency; 3] = [Currency::Points, Currency::PromoKeys, Currency::Gems];

    /// Storage / wire code.
    pub fn code(&self) -> &'static str {
        match self {
            Currency::Points => "points",
            Currency::PromoKeys => "promokeys",
            Currency::Gems => "gems",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Returned when parsing a currency code outside the known set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown currency: {0}")]
pub struct UnknownCurrency(pub String);

impl FromStr for Currency {
    type Err = UnknownCurrency;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Currency::ALL
            .into_iter()
            .find(|c| c.code().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownCurrency(s.to_string()))
    }
}
