//! Per-band phy capabilities reported by devices.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::consts::Band;

/// Capabilities of one radio phy, keyed per band in
/// [`PhyCapabilityMap`]. Mutated only by a capabilities refresh.
#[derive(Deserialize, Serialize, Clone, Debug, Default)]
pub struct PhyCapabilities {
    /// Channels the phy can operate on
    #[serde(default)]
    pub channels: Vec<u32>,
    /// Lowest supported tx power (dBm)
    #[serde(default)]
    pub tx_power_min: Option<i32>,
    /// Highest supported tx power (dBm)
    #[serde(default)]
    pub tx_power_max: Option<i32>,
    /// Supported channel widths (MHz)
    #[serde(default)]
    pub channel_widths: Vec<u32>,
}

/// Band → phy capabilities for one device.
pub type PhyCapabilityMap = BTreeMap<Band, PhyCapabilities>;

/// Determine a radio's band from its operating channel and the device's
/// per-band capabilities: the first band (in frequency order) whose channel
/// list contains the radio's channel.
pub fn band_for_channel(channel: u32, capabilities: &PhyCapabilityMap) -> Option<Band> {
    capabilities
        .iter()
        .find(|(_, phy)| phy.channels.contains(&channel))
        .map(|(band, _)| *band)
}
