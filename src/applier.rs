//! Turns computed action maps into device-gateway mutations.
//!
//! Channel and tx-power maps become per-device configuration POSTs that
//! touch only the targeted band's field; steering actions become per-client
//! script calls. One device failing never aborts the batch.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::consts::Band;
use crate::gateway::GatewayClient;
use crate::modeler::Modeler;
use crate::optimizers::{ChannelMap, ClientActionMap, TxPowerMap};
use crate::prelude::*;
use crate::Error;

/// What happened to a batch of mutations.
#[derive(Clone, Copy, Debug, Default, Serialize)]
pub struct ApplyReport {
    /// Mutations pushed (or, in a dry run, that would have been pushed)
    pub applied: usize,
    /// Devices whose push failed
    pub failed: usize,
}

/// Configuration applier.
pub struct ConfigApplier {
    modeler: Arc<Modeler>,
    gateway: Arc<dyn GatewayClient>,
}

impl ConfigApplier {
    pub fn new(modeler: Arc<Modeler>, gateway: Arc<dyn GatewayClient>) -> Self {
        Self { modeler, gateway }
    }

    /// Push a channel map. Each device's configured radios are fetched from
    /// the model, only the targeted band's channel replaced, and the result
    /// POSTed back.
    pub async fn apply_channel_map(&self, channel_map: &ChannelMap, dry_run: bool) -> ApplyReport {
        let mut report = ApplyReport::default();
        for (serial, bands) in channel_map {
            let updates: BTreeMap<Band, serde_json::Value> = bands
                .iter()
                .map(|(band, channel)| (*band, serde_json::json!(channel)))
                .collect();
            match self.apply_radio_field(serial, &updates, "channel", dry_run).await {
                Ok(()) => report.applied += 1,
                Err(e) => {
                    warn!("Device {serial}: failed to apply channel config: {e}");
                    report.failed += 1;
                }
            }
        }
        report
    }

    /// Push a tx-power map; same shape as [`apply_channel_map`].
    ///
    /// [`apply_channel_map`]: ConfigApplier::apply_channel_map
    pub async fn apply_tx_power_map(
        &self,
        tx_power_map: &TxPowerMap,
        dry_run: bool,
    ) -> ApplyReport {
        let mut report = ApplyReport::default();
        for (serial, bands) in tx_power_map {
            let updates: BTreeMap<Band, serde_json::Value> = bands
                .iter()
                .map(|(band, tx_power)| (*band, serde_json::json!(tx_power)))
                .collect();
            match self
                .apply_radio_field(serial, &updates, "tx-power", dry_run)
                .await
            {
                Ok(()) => report.applied += 1,
                Err(e) => {
                    warn!("Device {serial}: failed to apply tx power config: {e}");
                    report.failed += 1;
                }
            }
        }
        report
    }

    /// Issue steering actions, one script call per (device, client, action).
    pub async fn apply_client_actions(
        &self,
        action_map: &ClientActionMap,
        dry_run: bool,
    ) -> ApplyReport {
        let mut report = ApplyReport::default();
        for (serial, clients) in action_map {
            for (station, action) in clients {
                if dry_run {
                    debug!("Device {serial}: would {action} client {station}");
                    report.applied += 1;
                    continue;
                }
                let script = serde_json::json!({
                    "serialNumber": serial,
                    "timeout": 30,
                    "type": "diagnostic",
                    "script": format!("rrm-steer {} {station}", action.as_str()),
                });
                match self.gateway.run_script(serial, script).await {
                    Ok(_) => {
                        info!("Device {serial}: issued {action} for client {station}");
                        report.applied += 1;
                    }
                    Err(e) => {
                        warn!(
                            "Device {serial}: failed to issue {action} for client {station}: {e}"
                        );
                        report.failed += 1;
                    }
                }
            }
        }
        report
    }

    /// Mutate `field` on the radios of the targeted bands and push the
    /// resulting configuration.
    async fn apply_radio_field(
        &self,
        serial: &str,
        updates: &BTreeMap<Band, serde_json::Value>,
        field: &str,
        dry_run: bool,
    ) -> Result<()> {
        let Some(mut radios) = self
            .modeler
            .with_data_model(|model| model.latest_device_status_radios.get(serial).cloned())
        else {
            return Err(Error::NoDeviceData(serial.to_string()));
        };

        let mut touched = false;
        for radio in &mut radios {
            let Some(band) = radio
                .get("band")
                .and_then(|b| b.as_str())
                .and_then(|b| b.parse::<Band>().ok())
            else {
                continue;
            };
            if let Some(value) = updates.get(&band) {
                radio[field] = value.clone();
                touched = true;
            }
        }
        if !touched {
            return Err(Error::NoDeviceData(format!(
                "{serial}: no configured radio on targeted band(s)"
            )));
        }

        if dry_run {
            debug!("Device {serial}: dry run, skipping configure ({field})");
            return Ok(());
        }

        let configuration = serde_json::json!({ "radios": &radios });
        self.gateway.configure(serial, configuration).await?;
        // keep the model's view of configured radios current
        self.modeler.update_device_status_radios(serial, radios);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelerParams;
    use crate::gateway::{
        CommandInfo, DeviceCapabilities, DeviceWithStatus, InventoryTag, StatisticsRecords,
    };
    use crate::optimizers::clientsteering::ClientAction;
    use crate::registry::DeviceRegistry;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records configure/script calls; fails for serials in `fail_for`.
    #[derive(Default)]
    struct RecordingGateway {
        configures: Mutex<Vec<(String, serde_json::Value)>>,
        scripts: Mutex<Vec<(String, serde_json::Value)>>,
        fail_for: Vec<String>,
    }

    #[async_trait]
    impl GatewayClient for RecordingGateway {
        fn is_initialized(&self) -> bool {
            true
        }
        async fn get_devices(&self) -> Result<Vec<DeviceWithStatus>> {
            Ok(vec![])
        }
        async fn get_latest_stats(&self, _: &str, _: usize) -> Result<StatisticsRecords> {
            Ok(StatisticsRecords::default())
        }
        async fn get_capabilities(&self, serial: &str) -> Result<DeviceCapabilities> {
            Err(Error::NoDeviceData(serial.to_string()))
        }
        async fn wifi_scan(&self, _: &str, _: bool) -> Result<CommandInfo> {
            Ok(CommandInfo::default())
        }
        async fn configure(
            &self,
            serial: &str,
            configuration: serde_json::Value,
        ) -> Result<CommandInfo> {
            if self.fail_for.iter().any(|s| s == serial) {
                return Err(Error::GenericRequest("boom".to_string()));
            }
            self.configures
                .lock()
                .unwrap()
                .push((serial.to_string(), configuration));
            Ok(CommandInfo::default())
        }
        async fn run_script(
            &self,
            serial: &str,
            script: serde_json::Value,
        ) -> Result<CommandInfo> {
            self.scripts
                .lock()
                .unwrap()
                .push((serial.to_string(), script));
            Ok(CommandInfo::default())
        }
        async fn get_prov_inventory_for_rrm(&self) -> Result<Vec<InventoryTag>> {
            Ok(vec![])
        }
    }

    fn applier_with(
        gateway: Arc<RecordingGateway>,
        radios: &[(&str, Vec<serde_json::Value>)],
    ) -> ConfigApplier {
        let registry = Arc::new(DeviceRegistry::new());
        let modeler = Arc::new(Modeler::new(
            ModelerParams::default(),
            registry,
            gateway.clone(),
        ));
        for (serial, radio_list) in radios {
            modeler.update_device_status_radios(serial, radio_list.clone());
        }
        ConfigApplier::new(modeler, gateway)
    }

    fn two_band_radios() -> Vec<serde_json::Value> {
        vec![
            serde_json::json!({"band": "2G", "channel": 1, "tx-power": 20}),
            serde_json::json!({"band": "5G", "channel": 36, "tx-power": 24}),
        ]
    }

    #[tokio::test]
    async fn channel_push_touches_only_the_targeted_band() {
        let gateway = Arc::new(RecordingGateway::default());
        let applier = applier_with(gateway.clone(), &[("ap-1", two_band_radios())]);

        let mut channel_map = ChannelMap::new();
        channel_map
            .entry("ap-1".to_string())
            .or_default()
            .insert(Band::Band2G, 11);

        let report = applier.apply_channel_map(&channel_map, false).await;
        assert_eq!(report.applied, 1);
        assert_eq!(report.failed, 0);

        let configures = gateway.configures.lock().unwrap();
        let (_, configuration) = &configures[0];
        let radios = configuration["radios"].as_array().unwrap();
        assert_eq!(radios[0]["channel"], 11);
        // 5G radio untouched
        assert_eq!(radios[1]["channel"], 36);
        assert_eq!(radios[1]["tx-power"], 24);
    }

    #[tokio::test]
    async fn one_device_failure_does_not_abort_the_batch() {
        let gateway = Arc::new(RecordingGateway {
            fail_for: vec!["ap-bad".to_string()],
            ..Default::default()
        });
        let applier = applier_with(
            gateway.clone(),
            &[("ap-bad", two_band_radios()), ("ap-good", two_band_radios())],
        );

        let mut tx_power_map = TxPowerMap::new();
        for serial in ["ap-bad", "ap-good"] {
            tx_power_map
                .entry(serial.to_string())
                .or_default()
                .insert(Band::Band5G, 18);
        }

        let report = applier.apply_tx_power_map(&tx_power_map, false).await;
        assert_eq!(report.applied, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(gateway.configures.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn dry_run_pushes_nothing() {
        let gateway = Arc::new(RecordingGateway::default());
        let applier = applier_with(gateway.clone(), &[("ap-1", two_band_radios())]);

        let mut channel_map = ChannelMap::new();
        channel_map
            .entry("ap-1".to_string())
            .or_default()
            .insert(Band::Band2G, 11);

        let report = applier.apply_channel_map(&channel_map, true).await;
        assert_eq!(report.applied, 1);
        assert!(gateway.configures.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_device_counts_as_failure() {
        let gateway = Arc::new(RecordingGateway::default());
        let applier = applier_with(gateway.clone(), &[]);

        let mut channel_map = ChannelMap::new();
        channel_map
            .entry("ap-missing".to_string())
            .or_default()
            .insert(Band::Band2G, 11);

        let report = applier.apply_channel_map(&channel_map, false).await;
        assert_eq!(report.failed, 1);
    }

    #[tokio::test]
    async fn steering_actions_issue_one_script_per_client() {
        let gateway = Arc::new(RecordingGateway::default());
        let applier = applier_with(gateway.clone(), &[]);

        let mut action_map = ClientActionMap::new();
        let clients = action_map.entry("ap-1".to_string()).or_default();
        clients.insert("11:22:33:44:55:66".to_string(), ClientAction::Deauthenticate);
        clients.insert("11:22:33:44:55:77".to_string(), ClientAction::SteerUp);

        let report = applier.apply_client_actions(&action_map, false).await;
        assert_eq!(report.applied, 2);
        let scripts = gateway.scripts.lock().unwrap();
        assert_eq!(scripts.len(), 2);
        assert!(scripts[0].1["script"]
            .as_str()
            .unwrap()
            .contains("DEAUTHENTICATE"));
    }
}
