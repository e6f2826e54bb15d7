//! Channel assignment algorithms.
//!
//! All variants assign one channel per (device, band) out of that device's
//! allowed channel list, honoring operator pins. The occupancy-based
//! variants share the greedy framework in this module.

mod least_used;
mod random;
mod unmanaged_aware;

pub use least_used::*;
pub use random::*;
pub use unmanaged_aware::*;

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::consts::{default_channels, Band};
use crate::helpers::{freq_to_band, freq_to_channel};
use crate::ies::{HtOperation, VhtOperation};
use crate::modeler::DataModel;
use crate::optimizers::tpc::managed_bssids;
use crate::optimizers::ChannelMap;
use crate::registry::DeviceRegistry;
use crate::types::band_for_channel;

/// Channels an algorithm may assign for this (device, band): the registry
/// override if set and non-empty, else the default plan.
pub(crate) fn allowed_channels(
    registry: &Arc<DeviceRegistry>,
    serial: &str,
    band: Band,
) -> Vec<u32> {
    registry
        .effective_config(serial)
        .and_then(|config| config.allowed_channels)
        .and_then(|mut allowed| allowed.remove(&band))
        .filter(|channels| !channels.is_empty())
        .unwrap_or_else(|| default_channels(band).to_vec())
}

/// Operator-pinned channel for this (device, band), if any.
pub(crate) fn user_channel(
    registry: &Arc<DeviceRegistry>,
    serial: &str,
    band: Band,
) -> Option<u32> {
    registry
        .effective_config(serial)?
        .user_channels?
        .get(&band)
        .copied()
}

/// The latest view of one unmanaged neighbor BSS, aggregated across the scan
/// buffer.
#[derive(Clone, Debug)]
pub(crate) struct NeighborObservation {
    pub band: Band,
    pub channel: u32,
    /// Strongest signal (dBm) among aggregated samples
    pub signal: i32,
    ht_oper: Option<String>,
    vht_oper: Option<String>,
    unix_time_ms: i64,
}

impl NeighborObservation {
    fn matches(&self, ht_oper: Option<&str>, vht_oper: Option<&str>) -> bool {
        HtOperation::matches_encoded(self.ht_oper.as_deref(), ht_oper)
            && VhtOperation::matches_encoded(self.vht_oper.as_deref(), vht_oper)
    }
}

/// Collect unmanaged neighbors across every device's buffered scans, one
/// observation per BSSID.
///
/// Samples of the same BSSID are aggregated (strongest signal wins) only
/// while their HT/VHT operation elements match; an element change means the
/// neighbor was reconfigured, so the newest sample replaces the history.
pub(crate) fn unmanaged_neighbors(
    model: &DataModel,
    managed: &BTreeSet<String>,
) -> BTreeMap<String, NeighborObservation> {
    let mut neighbors: BTreeMap<String, NeighborObservation> = BTreeMap::new();
    for scans in model.latest_wifi_scans.values() {
        for scan in scans {
            for entry in scan {
                if managed.contains(&entry.bssid) {
                    continue;
                }
                let Some(band) = freq_to_band(entry.frequency) else {
                    continue;
                };
                let Some(channel) = entry
                    .channel
                    .or_else(|| freq_to_channel(entry.frequency))
                else {
                    continue;
                };
                let observation = NeighborObservation {
                    band,
                    channel,
                    signal: entry.signal,
                    ht_oper: entry.ht_oper.clone(),
                    vht_oper: entry.vht_oper.clone(),
                    unix_time_ms: entry.unix_time_ms,
                };
                match neighbors.entry(entry.bssid.clone()) {
                    Entry::Vacant(slot) => {
                        slot.insert(observation);
                    }
                    Entry::Occupied(mut slot) => {
                        let existing = slot.get_mut();
                        if existing.matches(entry.ht_oper.as_deref(), entry.vht_oper.as_deref()) {
                            existing.signal = existing.signal.max(entry.signal);
                            existing.unix_time_ms =
                                existing.unix_time_ms.max(entry.unix_time_ms);
                        } else if entry.unix_time_ms >= existing.unix_time_ms {
                            *existing = observation;
                        }
                    }
                }
            }
        }
    }
    neighbors
}

/// Shared greedy assignment pass.
///
/// Occupancy per candidate channel is the number of other managed APs on
/// the band currently using it, plus `obss_weight` per unmanaged neighbor
/// observed on it. With `rssi_penalty`, the strongest unmanaged-neighbor
/// RSSI on the candidate adds `max(0, rssi + 95) / 10` (a -45 dBm
/// interferer costs 5.0, anything at or below -95 dBm costs nothing).
/// Devices are visited in serial order and each assignment updates the
/// occupancy seen by later devices. Lowest cost wins; ties break to the
/// lowest channel number.
pub(crate) fn assign_channels(
    model: &DataModel,
    zone_serials: &BTreeSet<String>,
    registry: &Arc<DeviceRegistry>,
    obss_weight: f64,
    rssi_penalty: bool,
) -> ChannelMap {
    let managed = managed_bssids(model);
    let neighbors = unmanaged_neighbors(model, &managed);

    // unmanaged load and strongest interferer per (band, channel)
    let mut unmanaged_count: BTreeMap<(Band, u32), f64> = BTreeMap::new();
    let mut strongest: BTreeMap<(Band, u32), i32> = BTreeMap::new();
    for neighbor in neighbors.values() {
        let key = (neighbor.band, neighbor.channel);
        *unmanaged_count.entry(key).or_default() += 1.0;
        strongest
            .entry(key)
            .and_modify(|signal| *signal = (*signal).max(neighbor.signal))
            .or_insert(neighbor.signal);
    }

    // managed load per (band, channel), from every managed AP in the
    // snapshot (co-channel interference ignores zone boundaries)
    let mut managed_count: BTreeMap<(Band, u32), f64> = BTreeMap::new();
    let mut current: BTreeMap<(String, Band), u32> = BTreeMap::new();
    for (serial, states) in &model.latest_states {
        let Some(state) = states.back() else { continue };
        let Some(capabilities) = model.latest_device_capabilities_phy.get(serial) else {
            continue;
        };
        for radio in &state.radios {
            let Some(band) = band_for_channel(radio.channel, capabilities) else {
                continue;
            };
            if current.insert((serial.clone(), band), radio.channel).is_none() {
                *managed_count.entry((band, radio.channel)).or_default() += 1.0;
            }
        }
    }

    let mut channel_map = ChannelMap::new();
    for serial in zone_serials {
        let Some(states) = model.latest_states.get(serial) else {
            continue;
        };
        let Some(state) = states.back() else { continue };
        let Some(capabilities) = model.latest_device_capabilities_phy.get(serial) else {
            continue;
        };

        let mut bands_done = BTreeSet::new();
        for radio in &state.radios {
            let Some(band) = band_for_channel(radio.channel, capabilities) else {
                continue;
            };
            if !bands_done.insert(band) {
                continue;
            }
            let allowed = allowed_channels(registry, serial, band);

            // the device's own current channel must not count against itself
            if let Some(&own) = current.get(&(serial.clone(), band)) {
                if let Some(count) = managed_count.get_mut(&(band, own)) {
                    *count -= 1.0;
                }
            }

            let chosen = if let Some(pinned) = user_channel(registry, serial, band) {
                if allowed.contains(&pinned) {
                    pinned
                } else {
                    warn!(
                        "Device {serial}: pinned channel {pinned} not in allowed set, ignoring pin"
                    );
                    pick_least_cost(
                        &allowed,
                        band,
                        &managed_count,
                        &unmanaged_count,
                        &strongest,
                        obss_weight,
                        rssi_penalty,
                    )
                }
            } else {
                pick_least_cost(
                    &allowed,
                    band,
                    &managed_count,
                    &unmanaged_count,
                    &strongest,
                    obss_weight,
                    rssi_penalty,
                )
            };

            // later devices see this assignment
            *managed_count.entry((band, chosen)).or_default() += 1.0;
            debug!("Device {serial}: assigning channel {chosen} on {band}");
            channel_map
                .entry(serial.clone())
                .or_default()
                .insert(band, chosen);
        }
    }
    channel_map
}

fn pick_least_cost(
    allowed: &[u32],
    band: Band,
    managed_count: &BTreeMap<(Band, u32), f64>,
    unmanaged_count: &BTreeMap<(Band, u32), f64>,
    strongest: &BTreeMap<(Band, u32), i32>,
    obss_weight: f64,
    rssi_penalty: bool,
) -> u32 {
    let mut candidates: Vec<u32> = allowed.to_vec();
    candidates.sort_unstable();
    candidates.dedup();

    let mut best = candidates[0];
    let mut best_cost = f64::INFINITY;
    for &channel in &candidates {
        let key = (band, channel);
        let mut cost = managed_count.get(&key).copied().unwrap_or(0.0)
            + obss_weight * unmanaged_count.get(&key).copied().unwrap_or(0.0);
        if rssi_penalty {
            if let Some(&signal) = strongest.get(&key) {
                cost += f64::from((signal + 95).max(0)) / 10.0;
            }
        }
        // strict comparison: ties keep the lowest channel
        if cost < best_cost {
            best = channel;
            best_cost = cost;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimizers::tpc::test_fixtures::*;
    use base64::prelude::*;

    #[test]
    fn neighbor_aggregation_keeps_strongest_when_ies_match() {
        let mut model = DataModel::default();
        let mut scan1 = vec![scan_entry("bb:00:00:00:00:01", 2437, -70)];
        scan1[0].unix_time_ms = 1;
        let mut scan2 = vec![scan_entry("bb:00:00:00:00:01", 2437, -55)];
        scan2[0].unix_time_ms = 2;
        model
            .latest_wifi_scans
            .entry("ap-1".to_string())
            .or_default()
            .extend([scan1, scan2]);

        let neighbors = unmanaged_neighbors(&model, &BTreeSet::new());
        assert_eq!(neighbors["bb:00:00:00:00:01"].signal, -55);
    }

    #[test]
    fn neighbor_reconfiguration_resets_aggregation() {
        let ht_a = BASE64_STANDARD.encode([6u8, 0]);
        let ht_b = BASE64_STANDARD.encode([11u8, 0]);

        let mut old_entry = scan_entry("bb:00:00:00:00:01", 2437, -40);
        old_entry.ht_oper = Some(ht_a);
        old_entry.unix_time_ms = 1;
        let mut new_entry = scan_entry("bb:00:00:00:00:01", 2462, -80);
        new_entry.ht_oper = Some(ht_b);
        new_entry.unix_time_ms = 2;

        let mut model = DataModel::default();
        model
            .latest_wifi_scans
            .entry("ap-1".to_string())
            .or_default()
            .extend([vec![old_entry], vec![new_entry]]);

        let neighbors = unmanaged_neighbors(&model, &BTreeSet::new());
        // latest observation replaced the stale -40 dBm sample
        assert_eq!(neighbors["bb:00:00:00:00:01"].signal, -80);
        assert_eq!(neighbors["bb:00:00:00:00:01"].channel, 11);
    }

    #[test]
    fn pick_least_cost_breaks_ties_downward() {
        let managed = BTreeMap::new();
        let unmanaged = BTreeMap::new();
        let strongest = BTreeMap::new();
        let chosen = pick_least_cost(
            &[11, 1, 6],
            Band::Band2G,
            &managed,
            &unmanaged,
            &strongest,
            0.5,
            false,
        );
        assert_eq!(chosen, 1);
    }
}
