//! Transmit-power control algorithms.

mod measurement;
mod random;

pub use measurement::*;
pub use random::*;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::consts::{Band, MAX_TX_POWER, MIN_TX_POWER};
use crate::modeler::DataModel;
use crate::registry::DeviceRegistry;
use crate::types::band_for_channel;

/// Every dBm step in the configurable range; the fallback when the device
/// registry carries no per-band override.
pub fn default_tx_power_choices() -> Vec<i32> {
    (MIN_TX_POWER..=MAX_TX_POWER).collect()
}

/// Tx powers an algorithm may assign for this (device, band): the registry
/// override if set and non-empty, else the default range.
pub(crate) fn tx_power_choices(
    registry: &Arc<DeviceRegistry>,
    serial: &str,
    band: Band,
) -> Vec<i32> {
    registry
        .effective_config(serial)
        .and_then(|config| config.allowed_tx_powers)
        .and_then(|mut allowed| allowed.remove(&band))
        .filter(|choices| !choices.is_empty())
        .unwrap_or_else(default_tx_power_choices)
}

/// BSSIDs broadcast by devices in the snapshot (i.e. managed by RRM).
pub(crate) fn managed_bssids(model: &DataModel) -> BTreeSet<String> {
    let mut bssids = BTreeSet::new();
    for states in model.latest_states.values() {
        let Some(state) = states.back() else { continue };
        for iface in &state.interfaces {
            for ssid in &iface.ssids {
                if let Some(bssid) = &ssid.bssid {
                    bssids.insert(bssid.clone());
                }
            }
        }
    }
    bssids
}

/// Build a map from managed BSSID to a sorted (ascending) list of RSSIs at
/// which neighboring APs hear it on `band`. Every managed BSSID is a key;
/// unheard BSSIDs map to an empty list.
pub(crate) fn build_rssi_map(
    managed_bssids: &BTreeSet<String>,
    model: &DataModel,
    band: Band,
) -> BTreeMap<String, Vec<i32>> {
    let mut bssid_to_rssi: BTreeMap<String, Vec<i32>> = managed_bssids
        .iter()
        .map(|bssid| (bssid.clone(), Vec::new()))
        .collect();

    for scans in model.latest_wifi_scans.values() {
        let Some(latest_scan) = scans.back() else { continue };
        // a signal received here from another AP is that AP's coverage
        for entry in latest_scan {
            if crate::helpers::freq_to_band(entry.frequency) != Some(band) {
                continue;
            }
            if let Some(rssi_list) = bssid_to_rssi.get_mut(&entry.bssid) {
                rssi_list.push(entry.signal);
            }
        }
    }
    for rssi_list in bssid_to_rssi.values_mut() {
        rssi_list.sort_unstable();
    }
    bssid_to_rssi
}

/// Group the zone's devices by (band, operating channel), from their latest
/// states and capabilities.
pub(crate) fn aps_per_channel(
    model: &DataModel,
    zone_serials: &BTreeSet<String>,
) -> BTreeMap<Band, BTreeMap<u32, Vec<String>>> {
    let mut band_to_channel_to_aps: BTreeMap<Band, BTreeMap<u32, Vec<String>>> = BTreeMap::new();
    for (serial, states) in &model.latest_states {
        if !zone_serials.contains(serial) {
            continue;
        }
        let Some(state) = states.back() else { continue };
        let Some(capabilities) = model.latest_device_capabilities_phy.get(serial) else {
            continue;
        };
        for radio in &state.radios {
            let Some(band) = band_for_channel(radio.channel, capabilities) else {
                continue;
            };
            let aps = band_to_channel_to_aps
                .entry(band)
                .or_default()
                .entry(radio.channel)
                .or_default();
            if !aps.contains(serial) {
                aps.push(serial.clone());
            }
        }
    }
    band_to_channel_to_aps
}


#[cfg(test)]
mod tests {
    use super::test_fixtures::*;
    use super::*;

    #[test]
    fn rssi_map_covers_all_managed_bssids_sorted() {
        let mut model = DataModel::default();
        model
            .latest_states
            .entry("ap-1".to_string())
            .or_default()
            .push_back(ap_state(6, 20, "aa:00:00:00:00:01"));
        model
            .latest_states
            .entry("ap-2".to_string())
            .or_default()
            .push_back(ap_state(11, 20, "aa:00:00:00:00:02"));
        model
            .latest_wifi_scans
            .entry("ap-2".to_string())
            .or_default()
            .push_back(vec![
                scan_entry("aa:00:00:00:00:01", 2437, -60),
                scan_entry("aa:00:00:00:00:01", 2437, -75),
                // wrong band, ignored
                scan_entry("aa:00:00:00:00:01", 5180, -50),
                // unmanaged, ignored
                scan_entry("bb:00:00:00:00:99", 2437, -40),
            ]);

        let managed = managed_bssids(&model);
        assert_eq!(managed.len(), 2);
        let rssi_map = build_rssi_map(&managed, &model, Band::Band2G);
        assert_eq!(rssi_map["aa:00:00:00:00:01"], vec![-75, -60]);
        assert!(rssi_map["aa:00:00:00:00:02"].is_empty());
    }

    #[test]
    fn aps_per_channel_groups_by_band() {
        let mut model = DataModel::default();
        for (serial, channel) in [("ap-1", 6), ("ap-2", 6), ("ap-3", 36)] {
            model
                .latest_states
                .entry(serial.to_string())
                .or_default()
                .push_back(ap_state(channel, 20, "aa:00:00:00:00:01"));
            model
                .latest_device_capabilities_phy
                .insert(serial.to_string(), capabilities_2g_5g());
        }
        let serials: BTreeSet<String> =
            ["ap-1", "ap-2", "ap-3"].iter().map(|s| s.to_string()).collect();
        let grouped = aps_per_channel(&model, &serials);
        assert_eq!(grouped[&Band::Band2G][&6].len(), 2);
        assert_eq!(grouped[&Band::Band5G][&36], vec!["ap-3".to_string()]);
    }
}
