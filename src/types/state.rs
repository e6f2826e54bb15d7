//! Device state telemetry, one snapshot per report.

use serde::{Deserialize, Serialize};

use crate::helpers::parse_reference_index;

/// One telemetry snapshot from a device. Immutable once ingested.
#[derive(Deserialize, Serialize, Clone, Debug, Default)]
pub struct State {
    #[serde(default)]
    pub radios: Vec<Radio>,
    #[serde(default)]
    pub interfaces: Vec<Interface>,
}

/// Operational parameters of one radio.
#[derive(Deserialize, Serialize, Clone, Debug, Default)]
pub struct Radio {
    /// Platform phy name (e.g. "platform/soc/c000000.wifi")
    #[serde(default)]
    pub phy: Option<String>,
    #[serde(default)]
    pub channel: u32,
    /// Channel width in MHz
    #[serde(default)]
    pub channel_width: Option<u32>,
    /// Configured transmit power (dBm)
    #[serde(default)]
    pub tx_power: i32,
}

/// A logical network interface carrying zero or more SSIDs.
#[derive(Deserialize, Serialize, Clone, Debug, Default)]
pub struct Interface {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub ssids: Vec<Ssid>,
}

/// One broadcast SSID on an interface.
#[derive(Deserialize, Serialize, Clone, Debug, Default)]
pub struct Ssid {
    #[serde(default)]
    pub ssid: Option<String>,
    #[serde(default)]
    pub bssid: Option<String>,
    /// Back-reference to the owning radio, a JSON pointer object such as
    /// `{"$ref": "#/radios/0"}`.
    #[serde(default)]
    pub radio: Option<serde_json::Value>,
    #[serde(default)]
    pub associations: Vec<Association>,
}

/// An associated station.
#[derive(Deserialize, Serialize, Clone, Debug, Default)]
pub struct Association {
    /// Station MAC address
    #[serde(default)]
    pub station: String,
    /// Received signal strength (dBm)
    #[serde(default)]
    pub rssi: i32,
}

impl Ssid {
    /// Parse this SSID's radio back-reference into an index into
    /// [`State::radios`]. Malformed or missing references yield `None`.
    pub fn radio_index(&self) -> Option<usize> {
        let reference = self.radio.as_ref()?.get("$ref")?.as_str()?;
        parse_reference_index(reference)
    }
}

impl State {
    /// Resolve an SSID's radio back-reference. Out-of-range or unparseable
    /// references yield `None`; callers skip the SSID, never the device.
    pub fn radio_for_ssid(&self, ssid: &Ssid) -> Option<&Radio> {
        self.radios.get(ssid.radio_index()?)
    }
}
