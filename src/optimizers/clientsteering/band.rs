//! Single-AP band steering.
//!
//! 2G clients below a threshold RSSI are deauthenticated; 2G clients above a
//! second threshold are asked to move up to 5G/6G; 5G and 6G clients below a
//! third threshold are asked to move down to 2G.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::debug;

use crate::consts::Band;
use crate::helpers::monotonic_ns;
use crate::modeler::DataModel;
use crate::optimizers::{
    parse_arg, AlgorithmCategory, AlgorithmContext, AlgorithmDescriptor, ArgSpec,
    ClientActionMap, ClientSteeringAlgorithm,
};
use crate::types::band_for_channel;

use super::{ClientAction, ClientSteeringState};

pub const BAND_STEERING_DESCRIPTOR: AlgorithmDescriptor = AlgorithmDescriptor {
    id: SingleApBandSteering::ALGORITHM_ID,
    category: AlgorithmCategory::ClientSteering,
    description: "Per-AP band steering by client RSSI thresholds",
    args: &[
        ArgSpec {
            name: "minRssi2G",
            description: "RSSI (dBm) below which 2G clients are deauthenticated",
        },
        ArgSpec {
            name: "maxRssi2G",
            description: "RSSI (dBm) above which 2G clients are steered to 5G/6G",
        },
        ArgSpec {
            name: "minRssiNon2G",
            description: "RSSI (dBm) below which 5G/6G clients are steered to 2G",
        },
        ArgSpec {
            name: "backoffTimeNs",
            description: "Minimum time (ns) between actions for one (AP, client) pair",
        },
    ],
};

/// Single-AP band steering algorithm.
pub struct SingleApBandSteering {
    model: DataModel,
    zone_serials: BTreeSet<String>,
    steering_state: Arc<ClientSteeringState>,
    /// RSSI below which 2G clients are deauthenticated
    min_rssi_2g: i32,
    /// RSSI above which 2G clients are asked to move to 5G or 6G
    max_rssi_2g: i32,
    /// RSSI below which 5G and 6G clients are asked to move to 2G
    min_rssi_non_2g: i32,
    /// Backoff time (ns) for all APs and radios
    backoff_time_ns: i64,
}

impl SingleApBandSteering {
    pub const ALGORITHM_ID: &'static str = "band";

    /// RSSI (dBm) below which a client on 2G should be disconnected using
    /// deauthentication.
    pub const DEFAULT_MIN_RSSI_2G: i32 = -87;
    /// RSSI (dBm) above which a client on 2G should be requested to move to
    /// 5G/6G.
    pub const DEFAULT_MAX_RSSI_2G: i32 = -67;
    /// RSSI (dBm) below which a client on 5G/6G should be requested to move
    /// to 2G.
    pub const DEFAULT_MIN_RSSI_NON_2G: i32 = -82;
    /// Default backoff time (5 min) for all APs and radios.
    pub const DEFAULT_BACKOFF_TIME_NS: i64 = 300_000_000_000;

    pub fn make_with_args(ctx: AlgorithmContext) -> Self {
        let min_rssi_2g = parse_arg(&ctx.args, "minRssi2G").unwrap_or(Self::DEFAULT_MIN_RSSI_2G);
        let max_rssi_2g = parse_arg(&ctx.args, "maxRssi2G").unwrap_or(Self::DEFAULT_MAX_RSSI_2G);
        let min_rssi_non_2g =
            parse_arg(&ctx.args, "minRssiNon2G").unwrap_or(Self::DEFAULT_MIN_RSSI_NON_2G);
        let backoff_time_ns =
            parse_arg(&ctx.args, "backoffTimeNs").unwrap_or(Self::DEFAULT_BACKOFF_TIME_NS);

        Self {
            zone_serials: ctx.zone_serials(),
            model: ctx.model,
            steering_state: ctx.steering_state,
            min_rssi_2g,
            max_rssi_2g,
            min_rssi_non_2g,
            backoff_time_ns,
        }
    }

    fn action_for(&self, band: Band, rssi: i32) -> Option<ClientAction> {
        if band == Band::Band2G {
            if rssi < self.min_rssi_2g {
                Some(ClientAction::Deauthenticate)
            } else if rssi > self.max_rssi_2g {
                Some(ClientAction::SteerUp)
            } else {
                None
            }
        } else {
            // treat 5G and 6G clients the same way
            if rssi < self.min_rssi_non_2g {
                Some(ClientAction::SteerDown)
            } else {
                None
            }
        }
    }
}

impl ClientSteeringAlgorithm for SingleApBandSteering {
    fn compute_ap_client_action_map(&self, dry_run: bool) -> ClientActionMap {
        let mut ap_client_action_map = ClientActionMap::new();

        for (serial_number, states) in &self.model.latest_states {
            if !self.zone_serials.contains(serial_number) {
                continue;
            }
            let Some(state) = states.back() else { continue };
            let Some(capabilities) = self
                .model
                .latest_device_capabilities_phy
                .get(serial_number)
            else {
                continue;
            };
            let current_time_ns = monotonic_ns();

            for iface in &state.interfaces {
                for ssid in &iface.ssids {
                    if ssid.associations.is_empty() {
                        continue;
                    }
                    let Some(radio) = state.radio_for_ssid(ssid) else {
                        continue;
                    };
                    let Some(band) = band_for_channel(radio.channel, capabilities) else {
                        continue;
                    };
                    for assoc in &ssid.associations {
                        let Some(action) = self.action_for(band, assoc.rssi) else {
                            continue;
                        };
                        if !self.steering_state.register_if_backoff_expired(
                            serial_number,
                            &assoc.station,
                            current_time_ns,
                            self.backoff_time_ns,
                            dry_run,
                        ) {
                            continue;
                        }
                        debug!(
                            "Planning {action} for client {} on AP {serial_number}",
                            assoc.station
                        );
                        ap_client_action_map
                            .entry(serial_number.clone())
                            .or_default()
                            .insert(assoc.station.clone(), action);
                    }
                }
            }
        }
        ap_client_action_map
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{DeviceRegistry, Topology};
    use crate::types::{PhyCapabilities, PhyCapabilityMap, State};
    use std::collections::BTreeMap;

    const SERIAL: &str = "aabbccddeeff";
    const CLIENT: &str = "11:22:33:44:55:66";

    fn capabilities() -> PhyCapabilityMap {
        let mut caps = PhyCapabilityMap::new();
        caps.insert(
            Band::Band2G,
            PhyCapabilities {
                channels: vec![1, 6, 11],
                ..Default::default()
            },
        );
        caps.insert(
            Band::Band5G,
            PhyCapabilities {
                channels: vec![36, 40, 44, 48],
                ..Default::default()
            },
        );
        caps
    }

    fn state_with_client(channel: u32, rssi: i32) -> State {
        serde_json::from_value(serde_json::json!({
            "radios": [{"channel": channel, "tx_power": 20}],
            "interfaces": [{
                "ssids": [{
                    "bssid": "aa:bb:cc:dd:ee:01",
                    "radio": {"$ref": "#/radios/0"},
                    "associations": [{"station": CLIENT, "rssi": rssi}],
                }],
            }],
        }))
        .unwrap()
    }

    fn steering(channel: u32, rssi: i32) -> SingleApBandSteering {
        let registry = Arc::new(DeviceRegistry::new());
        let mut topology = Topology::new();
        topology.insert(
            "zone-a".to_string(),
            BTreeSet::from([SERIAL.to_string()]),
        );
        registry.set_topology(topology);

        let mut model = DataModel::default();
        model
            .latest_states
            .entry(SERIAL.to_string())
            .or_default()
            .push_back(state_with_client(channel, rssi));
        model
            .latest_device_capabilities_phy
            .insert(SERIAL.to_string(), capabilities());

        SingleApBandSteering::make_with_args(AlgorithmContext {
            model,
            zone: "zone-a".to_string(),
            registry,
            steering_state: Arc::new(ClientSteeringState::new()),
            args: BTreeMap::new(),
        })
    }

    #[test]
    fn weak_2g_client_is_deauthenticated_once() {
        let algo = steering(6, -90);
        let actions = algo.compute_ap_client_action_map(false);
        assert_eq!(
            actions[SERIAL][CLIENT],
            ClientAction::Deauthenticate
        );
        // within the backoff window, the same run setup emits nothing
        let actions = algo.compute_ap_client_action_map(false);
        assert!(actions.is_empty());
    }

    #[test]
    fn strong_2g_client_is_steered_up() {
        let algo = steering(6, -50);
        let actions = algo.compute_ap_client_action_map(false);
        assert_eq!(actions[SERIAL][CLIENT], ClientAction::SteerUp);
    }

    #[test]
    fn mid_range_2g_client_is_left_alone() {
        let algo = steering(6, -70);
        assert!(algo.compute_ap_client_action_map(false).is_empty());
    }

    #[test]
    fn weak_5g_client_is_steered_down() {
        let algo = steering(36, -85);
        let actions = algo.compute_ap_client_action_map(false);
        assert_eq!(actions[SERIAL][CLIENT], ClientAction::SteerDown);
    }

    #[test]
    fn dry_run_does_not_consume_backoff() {
        let algo = steering(6, -90);
        let actions = algo.compute_ap_client_action_map(true);
        assert_eq!(actions[SERIAL][CLIENT], ClientAction::Deauthenticate);
        // the dry run left the backoff state untouched
        let actions = algo.compute_ap_client_action_map(false);
        assert_eq!(actions[SERIAL][CLIENT], ClientAction::Deauthenticate);
    }

    #[test]
    fn device_without_interfaces_is_skipped() {
        let mut algo = steering(6, -90);
        algo.model.latest_states.get_mut(SERIAL).unwrap()[0] = State::default();
        assert!(algo.compute_ap_client_action_map(false).is_empty());
    }

    #[test]
    fn malformed_threshold_arg_falls_back_to_default() {
        let registry = Arc::new(DeviceRegistry::new());
        let mut args = BTreeMap::new();
        args.insert("minRssi2G".to_string(), "very low".to_string());
        args.insert("backoffTimeNs".to_string(), "1000".to_string());
        let algo = SingleApBandSteering::make_with_args(AlgorithmContext {
            model: DataModel::default(),
            zone: "zone-a".to_string(),
            registry,
            steering_state: Arc::new(ClientSteeringState::new()),
            args,
        });
        assert_eq!(algo.min_rssi_2g, SingleApBandSteering::DEFAULT_MIN_RSSI_2G);
        assert_eq!(algo.backoff_time_ns, 1000);
    }
}
