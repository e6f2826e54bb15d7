//! High Throughput (HT) Operation element, potentially present in wifi scan
//! entries. Introduced in 802.11n (2009).

use base64::prelude::*;

use crate::errors::ParseError;

/// Decoded HT Operation element (the fields relevant to channel layout).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HtOperation {
    /// The primary channel number.
    pub primary_channel: u8,
    /// Position of the secondary channel relative to the primary: 0 none,
    /// 1 above, 3 below (2 is reserved).
    pub secondary_channel_offset: u8,
    /// True when channel widths other than 20 MHz are allowed.
    pub sta_channel_width: bool,
}

impl HtOperation {
    /// Decode a base64-encoded HT Operation element body.
    pub fn decode(ht_oper: &str) -> Result<Self, ParseError> {
        let bytes = BASE64_STANDARD
            .decode(ht_oper)
            .map_err(|e| ParseError::Base64(e.to_string()))?;
        if bytes.len() < 2 {
            return Err(ParseError::PayloadShape(format!(
                "HT operation element too short: {} bytes",
                bytes.len()
            )));
        }
        Ok(Self {
            primary_channel: bytes[0],
            secondary_channel_offset: bytes[1] & 0b11,
            sta_channel_width: (bytes[1] >> 2) & 1 == 1,
        })
    }

    /// Whether `self` and `other` describe the same channel layout, for the
    /// purpose of aggregating statistics.
    pub fn matches_for_aggregation(&self, other: &HtOperation) -> bool {
        self.primary_channel == other.primary_channel
            && self.secondary_channel_offset == other.secondary_channel_offset
            && self.sta_channel_width == other.sta_channel_width
    }

    /// Option-aware variant of [`matches_for_aggregation`]; see
    /// [`crate::ies::VhtOperation::matches_encoded`] for the rules.
    ///
    /// [`matches_for_aggregation`]: HtOperation::matches_for_aggregation
    pub fn matches_encoded(a: Option<&str>, b: Option<&str>) -> bool {
        match (a, b) {
            (None, None) => true,
            (Some(a), Some(b)) if a == b => true,
            (Some(a), Some(b)) => match (Self::decode(a), Self::decode(b)) {
                (Ok(a), Ok(b)) => a.matches_for_aggregation(&b),
                _ => false,
            },
            _ => false,
        }
    }
}
