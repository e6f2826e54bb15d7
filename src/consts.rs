//! Shared constants: bands, default channel plans, tx power ranges.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Radio frequency band.
///
/// Ordering is by frequency, so `Band` can key a `BTreeMap` with 2G first.
#[derive(
    Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
pub enum Band {
    #[serde(rename = "2G")]
    Band2G,
    #[serde(rename = "5G")]
    Band5G,
    #[serde(rename = "6G")]
    Band6G,
}

impl Band {
    /// All bands, in frequency order.
    pub const ALL: [Band; 3] = [Band::Band2G, Band::Band5G, Band::Band6G];

    pub fn as_str(&self) -> &'static str {
        match self {
            Band::Band2G => "2G",
            Band::Band5G => "5G",
            Band::Band6G => "6G",
        }
    }
}

impl fmt::Display for Band {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Band {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "2G" => Ok(Band::Band2G),
            "5G" => Ok(Band::Band5G),
            "6G" => Ok(Band::Band6G),
            other => Err(format!("unknown band: {other}")),
        }
    }
}

/// Lowest configurable tx power (dBm).
pub const MIN_TX_POWER: i32 = 0;

/// Highest configurable tx power (dBm).
pub const MAX_TX_POWER: i32 = 30;

/// Default channel plan per band, used when the device registry carries no
/// per-device override.
///
/// 5G is restricted to UNII-1 and UNII-3; 6G to the preferred scanning
/// channels (PSC).
pub fn default_channels(band: Band) -> &'static [u32] {
    match band {
        Band::Band2G => &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11],
        Band::Band5G => &[36, 40, 44, 48, 149, 153, 157, 161, 165],
        Band::Band6G => &[
            5, 21, 37, 53, 69, 85, 101, 117, 133, 149, 165, 181, 197, 213, 229,
        ],
    }
}
