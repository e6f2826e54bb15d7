//! Very High Throughput (VHT) Operation element, potentially present in wifi
//! scan entries. Introduced in 802.11ac (2013).

use base64::prelude::*;

use crate::errors::ParseError;

/// Decoded VHT Operation element.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VhtOperation {
    /// 0 if the channel is 20 or 40 MHz wide, 1 otherwise. Values 2 and 3
    /// are deprecated.
    pub channel_width: u8,
    /// For 20/40/80 MHz channels, the channel number. For a 160 MHz channel,
    /// the number of the 80 MHz channel containing the primary channel. For
    /// 80+80 MHz, the primary channel number.
    pub channel1: u8,
    /// Zero unless the channel is 160 or 80+80 MHz wide.
    pub channel2: u8,
    /// Supported VHT-MCS per number of spatial streams, 8 entries of 2 bits
    /// each.
    pub vht_mcs_for_nss: [u8; 8],
}

impl VhtOperation {
    /// Decode a base64-encoded VHT Operation element body.
    pub fn decode(vht_oper: &str) -> Result<Self, ParseError> {
        let bytes = BASE64_STANDARD
            .decode(vht_oper)
            .map_err(|e| ParseError::Base64(e.to_string()))?;
        if bytes.len() < 5 {
            return Err(ParseError::PayloadShape(format!(
                "VHT operation element too short: {} bytes",
                bytes.len()
            )));
        }
        let mut vht_mcs_for_nss = [0u8; 8];
        for (i, slot) in vht_mcs_for_nss.iter_mut().enumerate() {
            let byte = bytes[3 + i / 4];
            let shift = 6 - 2 * (i % 4) as u32;
            *slot = (byte >> shift) & 0b11;
        }
        Ok(Self {
            channel_width: bytes[0],
            channel1: bytes[1],
            channel2: bytes[2],
            vht_mcs_for_nss,
        })
    }

    /// Whether `self` and `other` describe the same channel layout, for the
    /// purpose of aggregating statistics. The MCS map is ignored.
    pub fn matches_for_aggregation(&self, other: &VhtOperation) -> bool {
        self.channel_width == other.channel_width
            && self.channel1 == other.channel1
            && self.channel2 == other.channel2
    }

    /// Whether two optional encoded elements should have their statistics
    /// aggregated: equal strings (including both absent) match; exactly one
    /// absent does not; otherwise both are decoded and compared. Elements
    /// that fail to decode never match.
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
