//! Measurement-based AP-AP transmit power control.
//!
//! For each managed BSSID, the RSSIs at which neighboring APs hear it form a
//! coverage measurement; tx power is adjusted so the Nth-smallest of those
//! lands on the coverage threshold.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, error, info};

use crate::consts::{Band, MAX_TX_POWER};
use crate::modeler::DataModel;
use crate::optimizers::{
    parse_arg, AlgorithmCategory, AlgorithmContext, AlgorithmDescriptor, ArgSpec, TpcAlgorithm,
    TxPowerMap,
};
use crate::registry::DeviceRegistry;
use crate::types::band_for_channel;

use super::{aps_per_channel, build_rssi_map, managed_bssids, tx_power_choices};

pub const MEASUREMENT_DESCRIPTOR: AlgorithmDescriptor = AlgorithmDescriptor {
    id: MeasurementBasedApApTpc::ALGORITHM_ID,
    category: AlgorithmCategory::Tpc,
    description: "Measurement-based AP-AP transmit power control",
    args: &[
        ArgSpec {
            name: "coverageThreshold",
            description: "Desired RSSI (dBm) at the calibration neighbor",
        },
        ArgSpec {
            name: "nthSmallestRssi",
            description: "Which neighbor RSSI (ascending, zero-indexed) to calibrate to",
        },
    ],
};

/// Measurement-based AP-AP TPC algorithm.
pub struct MeasurementBasedApApTpc {
    model: DataModel,
    zone_serials: BTreeSet<String>,
    registry: Arc<DeviceRegistry>,
    /// Coverage threshold between APs, in dBm
    coverage_threshold: i32,
    /// Nth smallest RSSI (zero-indexed) used for tx power calculation
    nth_smallest_rssi: usize,
}

impl MeasurementBasedApApTpc {
    pub const ALGORITHM_ID: &'static str = "measure_ap_ap";

    /// Default coverage threshold between APs, in dBm.
    ///
    /// Various client devices try to roam to another AP below thresholds in
    /// the -70 to -80 dBm range; -70 is the conservative pick.
    pub const DEFAULT_COVERAGE_THRESHOLD: i32 = -70;

    /// Default Nth smallest RSSI used for tx power calculation.
    pub const DEFAULT_NTH_SMALLEST_RSSI: usize = 0;

    pub fn make_with_args(ctx: AlgorithmContext) -> Self {
        let mut coverage_threshold = Self::DEFAULT_COVERAGE_THRESHOLD;
        if let Some(parsed) = parse_arg::<i32>(&ctx.args, "coverageThreshold") {
            if parsed > MAX_TX_POWER {
                error!(
                    "Invalid value passed for coverageThreshold - must be at most {MAX_TX_POWER}. \
                     Using default value."
                );
            } else {
                coverage_threshold = parsed;
            }
        }
        // usize parsing rejects negatives outright
        let nth_smallest_rssi = parse_arg::<usize>(&ctx.args, "nthSmallestRssi")
            .unwrap_or(Self::DEFAULT_NTH_SMALLEST_RSSI);

        Self {
            zone_serials: ctx.zone_serials(),
            model: ctx.model,
            registry: ctx.registry,
            coverage_threshold,
            nth_smallest_rssi,
        }
    }

    /// Compute the adjusted tx power (dBm) for one radio.
    ///
    /// `rssi_values` must be sorted ascending. With no neighbor measurements
    /// the radio goes to maximum power; otherwise the Nth-smallest RSSI is
    /// calibrated onto `coverage_threshold`, clamped to the choice range and
    /// snapped to the nearest available choice (first encountered on ties).
    pub(crate) fn compute_tx_power(
        serial_number: &str,
        current_tx_power: i32,
        rssi_values: &[i32],
        coverage_threshold: i32,
        nth_smallest_rssi: usize,
        tx_power_choices: &[i32],
    ) -> i32 {
        let max_tx_power = *tx_power_choices.iter().max().expect("choices non-empty");
        if rssi_values.is_empty() {
            return max_tx_power;
        }
        let min_tx_power = *tx_power_choices.iter().min().expect("choices non-empty");

        // We may not optimize for the closest AP, but the Nth closest
        let target_rssi = rssi_values[rssi_values.len().saturating_sub(1).min(nth_smallest_rssi)];
        let tx_delta = max_tx_power - current_tx_power;
        // The highest possible RSSI receivable by that neighboring AP
        let estimated_rssi = target_rssi + tx_delta;
        // equivalently: (coverage_threshold - target_rssi) + current_tx_power
        let mut new_tx_power = max_tx_power + coverage_threshold - estimated_rssi;

        if new_tx_power > max_tx_power {
            info!(
                "Device {serial_number}: computed tx power > maximum {max_tx_power}, using maximum"
            );
            new_tx_power = max_tx_power;
        } else if new_tx_power < min_tx_power {
            info!(
                "Device {serial_number}: computed tx power < minimum {min_tx_power}, using minimum"
            );
            new_tx_power = min_tx_power;
        }

        // snap to the nearest configurable choice
        let mut closest = tx_power_choices[0];
        for &choice in tx_power_choices {
            if (choice - new_tx_power).abs() < (closest - new_tx_power).abs() {
                closest = choice;
            }
        }
        closest
    }

    /// Calculate new tx powers for the APs sharing one (band, channel).
    fn build_tx_power_map_for_channel(
        &self,
        band: Band,
        channel: u32,
        serial_numbers: &[String],
        tx_power_map: &mut TxPowerMap,
    ) {
        let managed = managed_bssids(&self.model);
        let bssid_to_rssi = build_rssi_map(&managed, &self.model, band);
        debug!("Starting TPC for the {band} band");

        for serial_number in serial_numbers {
            let Some(states) = self.model.latest_states.get(serial_number) else {
                continue;
            };
            let Some(state) = states.back() else { continue };
            if state.radios.is_empty() {
                debug!("Device {serial_number}: No radios found, skipping...");
                continue;
            }
            if state.interfaces.is_empty() {
                debug!("Device {serial_number}: No interfaces found, skipping...");
                continue;
            }
            let Some(capabilities) = self
                .model
                .latest_device_capabilities_phy
                .get(serial_number)
            else {
                continue;
            };

            // An AP can have multiple interfaces; optimize for all of them
            for iface in &state.interfaces {
                for ssid in &iface.ssids {
                    let Some(radio) = state.radio_for_ssid(ssid) else {
                        error!(
                            "Unable to get radio for {serial_number}, invalid radio ref {:?}",
                            ssid.radio
                        );
                        continue;
                    };
                    // this specific SSID is not on the band of interest
                    let radio_band = band_for_channel(radio.channel, capabilities);
                    if radio_band != Some(band) {
                        continue;
                    }
                    let Some(bssid) = &ssid.bssid else { continue };

                    let current_tx_power = radio.tx_power;
                    let empty = Vec::new();
                    let rssi_values = bssid_to_rssi.get(bssid).unwrap_or(&empty);
                    debug!(
                        "Device <{serial_number}> : Channel <{channel}> : BSSID <{bssid}>"
                    );
                    for rssi in rssi_values {
                        debug!("  Neighbor received RSSI: {rssi}");
                    }
                    let choices = tx_power_choices(&self.registry, serial_number, band);
                    let new_tx_power = Self::compute_tx_power(
                        serial_number,
                        current_tx_power,
                        rssi_values,
                        self.coverage_threshold,
                        self.nth_smallest_rssi,
                        &choices,
                    );
                    debug!("  Old tx_power: {current_tx_power}");
                    debug!("  New tx_power: {new_tx_power}");
                    tx_power_map
                        .entry(serial_number.clone())
                        .or_default()
                        .insert(band, new_tx_power);
                }
            }
        }
    }
}

impl TpcAlgorithm for MeasurementBasedApApTpc {
    fn compute_tx_power_map(&self) -> TxPowerMap {
        let mut tx_power_map = TxPowerMap::new();
        for (band, channel_to_aps) in aps_per_channel(&self.model, &self.zone_serials) {
            for (channel, serial_numbers) in channel_to_aps {
                self.build_tx_power_map_for_channel(
                    band,
                    channel,
                    &serial_numbers,
                    &mut tx_power_map,
                );
            }
        }
        tx_power_map
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimizers::clientsteering::ClientSteeringState;
    use crate::optimizers::tpc::test_fixtures::*;
    use crate::registry::{DeviceConfig, Topology};
    use std::collections::{BTreeMap, BTreeSet};

    fn compute(
        current: i32,
        rssi: &[i32],
        threshold: i32,
        nth: usize,
        choices: &[i32],
    ) -> i32 {
        MeasurementBasedApApTpc::compute_tx_power("test-ap", current, rssi, threshold, nth, choices)
    }

    #[test]
    fn no_neighbors_maximizes_coverage() {
        // S1: allowed powers 6..=30 step 2, empty RSSI list
        let choices: Vec<i32> = (6..=30).step_by(2).collect();
        assert_eq!(compute(20, &[], -70, 0, &choices), 30);
    }

    #[test]
    fn typical_adjustment_hits_threshold() {
        // S2: target -80, estimated -70, newTx = 30 + (-70) - (-70) = 30
        let choices: Vec<i32> = (0..=30).collect();
        assert_eq!(compute(20, &[-80, -75, -65], -70, 0, &choices), 30);
    }

    #[test]
    fn nth_smallest_selects_calibration_neighbor() {
        // S3: target -75, estimated -65, newTx = 30 + (-70) - (-65) = 25
        let choices: Vec<i32> = (0..=30).collect();
        assert_eq!(compute(20, &[-80, -75, -65], -70, 1, &choices), 25);
    }

    #[test]
    fn nth_beyond_list_uses_last() {
        let choices: Vec<i32> = (0..=30).collect();
        // nth=5 clamps to the largest RSSI: (-70 - (-65)) + 20 = 15
        assert_eq!(compute(20, &[-80, -75, -65], -70, 5, &choices), 15);
    }

    #[test]
    fn result_is_clamped_to_choice_range() {
        let choices: Vec<i32> = (10..=20).collect();
        // very strong neighbor drives power below the floor
        assert_eq!(compute(20, &[-20], -70, 0, &choices), 10);
        // very weak neighbor drives power above the ceiling
        assert_eq!(compute(20, &[-120], -70, 0, &choices), 20);
    }

    #[test]
    fn result_snaps_to_nearest_choice() {
        // computed 25 with only even choices available snaps to 24 or 26;
        // 24 is encountered first
        let choices: Vec<i32> = (0..=30).step_by(2).collect();
        assert_eq!(compute(20, &[-80, -75, -65], -70, 1, &choices), 24);
    }

    #[test]
    fn equivalence_with_simple_form() {
        // newTx == (threshold - target) + currentTx, before clamp/snap
        let choices: Vec<i32> = (0..=30).collect();
        for &(current, target, threshold) in
            &[(20, -75, -70), (10, -60, -70), (25, -90, -65), (0, -70, -70)]
        {
            let expected = ((threshold - target) + current).clamp(0, 30);
            assert_eq!(
                compute(current, &[target], threshold, 0, &choices),
                expected
            );
        }
    }

    #[test]
    fn raising_threshold_never_lowers_power() {
        let choices: Vec<i32> = (0..=30).collect();
        let mut previous = i32::MIN;
        for threshold in (-90..=-40).step_by(5) {
            let tx = compute(20, &[-75, -60], threshold, 0, &choices);
            assert!(tx >= previous);
            previous = tx;
        }
    }

    fn algorithm_under_test(
        model: DataModel,
        serials: &[&str],
        args: BTreeMap<String, String>,
    ) -> MeasurementBasedApApTpc {
        let registry = Arc::new(DeviceRegistry::new());
        let mut topology = Topology::new();
        topology.insert(
            "zone-a".to_string(),
            serials.iter().map(|s| s.to_string()).collect::<BTreeSet<_>>(),
        );
        registry.set_topology(topology);
        MeasurementBasedApApTpc::make_with_args(AlgorithmContext {
            model,
            zone: "zone-a".to_string(),
            registry,
            steering_state: Arc::new(ClientSteeringState::new()),
            args,
        })
    }

    #[test]
    fn full_map_computation_uses_neighbor_scans() {
        let mut model = DataModel::default();
        for (serial, bssid) in [("ap-1", "aa:00:00:00:00:01"), ("ap-2", "aa:00:00:00:00:02")] {
            model
                .latest_states
                .entry(serial.to_string())
                .or_default()
                .push_back(ap_state(6, 20, bssid));
            model
                .latest_device_capabilities_phy
                .insert(serial.to_string(), capabilities_2g_5g());
        }
        // ap-2 hears ap-1 at -80
        model
            .latest_wifi_scans
            .entry("ap-2".to_string())
            .or_default()
            .push_back(vec![scan_entry("aa:00:00:00:00:01", 2437, -80)]);

        let algo = algorithm_under_test(model, &["ap-1", "ap-2"], BTreeMap::new());
        let map = algo.compute_tx_power_map();
        // ap-1: heard at -80, calibrate to -70: (−70 − (−80)) + 20 = 30
        assert_eq!(map["ap-1"][&Band::Band2G], 30);
        // ap-2: never heard, maximize
        assert_eq!(map["ap-2"][&Band::Band2G], 30);
    }

    #[test]
    fn registry_override_restricts_choices() {
        let mut model = DataModel::default();
        model
            .latest_states
            .entry("ap-1".to_string())
            .or_default()
            .push_back(ap_state(6, 20, "aa:00:00:00:00:01"));
        model
            .latest_device_capabilities_phy
            .insert("ap-1".to_string(), capabilities_2g_5g());

        let algo = algorithm_under_test(model, &["ap-1"], BTreeMap::new());
        let mut config = DeviceConfig::default();
        config.allowed_tx_powers = Some(BTreeMap::from([(Band::Band2G, vec![6, 8, 10])]));
        algo.registry.set_ap_config("ap-1", config);

        let map = algo.compute_tx_power_map();
        // empty RSSI list: max of the override, not the global max
        assert_eq!(map["ap-1"][&Band::Band2G], 10);
    }

    #[test]
    fn out_of_range_coverage_threshold_rejected() {
        let mut args = BTreeMap::new();
        args.insert("coverageThreshold".to_string(), "40".to_string());
        let algo = algorithm_under_test(DataModel::default(), &[], args);
        assert_eq!(
            algo.coverage_threshold,
            MeasurementBasedApApTpc::DEFAULT_COVERAGE_THRESHOLD
        );
    }

    #[test]
    fn device_with_missing_interfaces_is_skipped() {
        // S6: a state with no interfaces yields no entry, no error
        let mut model = DataModel::default();
        let state: crate::types::State = serde_json::from_value(serde_json::json!({
            "radios": [{"channel": 6, "tx_power": 20}],
        }))
        .unwrap();
        model
            .latest_states
            .entry("ap-1".to_string())
            .or_default()
            .push_back(state);
        model
            .latest_device_capabilities_phy
            .insert("ap-1".to_string(), capabilities_2g_5g());

        let algo = algorithm_under_test(model, &["ap-1"], BTreeMap::new());
        assert!(algo.compute_tx_power_map().is_empty());
    }
}
