//! Periodic reconciliation of the device registry from the provisioning
//! service.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::ProvMonitorParams;
use crate::gateway::{GatewayClient, InventoryTag};
use crate::modeler::Modeler;
use crate::registry::{DeviceRegistry, Topology};

/// Devices without a venue land in this zone.
const DEFAULT_ZONE: &str = "default";

/// Provisioning monitor: keeps zone topology and per-AP RRM flags in sync
/// with the provisioning inventory.
pub struct ProvMonitor {
    params: ProvMonitorParams,
    registry: Arc<DeviceRegistry>,
    gateway: Arc<dyn GatewayClient>,
    modeler: Arc<Modeler>,
}

impl ProvMonitor {
    pub fn new(
        params: ProvMonitorParams,
        registry: Arc<DeviceRegistry>,
        gateway: Arc<dyn GatewayClient>,
        modeler: Arc<Modeler>,
    ) -> Self {
        Self {
            params,
            registry,
            gateway,
            modeler,
        }
    }

    /// Reconcile until shutdown. Fetch failures are transient: log and try
    /// again next tick.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut interval =
            tokio::time::interval(Duration::from_secs(self.params.interval_secs.max(1)));
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = interval.tick() => {
                    if let Err(e) = self.reconcile_once().await {
                        warn!("Provisioning reconciliation failed: {e}");
                    }
                }
            }
        }
        info!("Provisioning monitor terminated");
    }

    /// One reconciliation pass: rebuild the topology from the inventory,
    /// update per-AP RRM flags, then purge stale model entries.
    pub async fn reconcile_once(&self) -> crate::prelude::Result<()> {
        let tags = self.gateway.get_prov_inventory_for_rrm().await?;
        self.apply_inventory(&tags);
        Ok(())
    }

    fn apply_inventory(&self, tags: &[InventoryTag]) {
        let mut topology = Topology::new();
        for tag in tags {
            let zone = tag
                .venue
                .clone()
                .filter(|venue| !venue.is_empty())
                .unwrap_or_else(|| DEFAULT_ZONE.to_string());
            topology
                .entry(zone)
                .or_insert_with(BTreeSet::new)
                .insert(tag.serial_number.clone());
        }
        debug!(
            "Provisioning inventory: {} device(s) across {} zone(s)",
            tags.len(),
            topology.len()
        );

        self.registry.set_topology(topology);
        for tag in tags {
            self.registry
                .set_ap_rrm_enabled(&tag.serial_number, tag.rrm_enabled());
        }
        self.modeler.revalidate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelerParams;
    use crate::gateway::{
        CommandInfo, DeviceCapabilities, DeviceWithStatus, StatisticsRecords,
    };
    use crate::modeler::{InputData, InputDataType, KafkaRecord};
    use crate::prelude::Result;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct InventoryGateway {
        tags: Mutex<Vec<InventoryTag>>,
    }

    #[async_trait]
    impl GatewayClient for InventoryGateway {
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
            Err(crate::Error::NoDeviceData(serial.to_string()))
        }
        async fn wifi_scan(&self, _: &str, _: bool) -> Result<CommandInfo> {
            Ok(CommandInfo::default())
        }
        async fn configure(&self, _: &str, _: serde_json::Value) -> Result<CommandInfo> {
            Ok(CommandInfo::default())
        }
        async fn run_script(&self, _: &str, _: serde_json::Value) -> Result<CommandInfo> {
            Ok(CommandInfo::default())
        }
        async fn get_prov_inventory_for_rrm(&self) -> Result<Vec<InventoryTag>> {
            Ok(self.tags.lock().unwrap().clone())
        }
    }

    fn tag(serial: &str, venue: Option<&str>, rrm: Option<&str>) -> InventoryTag {
        serde_json::from_value(serde_json::json!({
            "serialNumber": serial,
            "venue": venue,
            "rrm": rrm,
        }))
        .unwrap()
    }

    fn monitor_with_tags(
        tags: Vec<InventoryTag>,
    ) -> (Arc<ProvMonitor>, Arc<DeviceRegistry>, Arc<InventoryGateway>) {
        let registry = Arc::new(DeviceRegistry::new());
        let gateway = Arc::new(InventoryGateway {
            tags: Mutex::new(tags),
        });
        let modeler = Arc::new(Modeler::new(
            ModelerParams::default(),
            registry.clone(),
            gateway.clone(),
        ));
        let monitor = Arc::new(ProvMonitor::new(
            ProvMonitorParams::default(),
            registry.clone(),
            gateway.clone(),
            modeler,
        ));
        (monitor, registry, gateway)
    }

    #[tokio::test]
    async fn inventory_builds_topology_and_flags() {
        let (monitor, registry, _) = monitor_with_tags(vec![
            tag("ap-1", Some("hq"), None),
            tag("ap-2", Some("hq"), Some("off")),
            tag("ap-3", None, None),
        ]);
        monitor.reconcile_once().await.unwrap();

        assert_eq!(registry.device_zone("ap-1").as_deref(), Some("hq"));
        assert_eq!(registry.device_zone("ap-3").as_deref(), Some("default"));
        assert!(registry.is_rrm_enabled("ap-1"));
        assert!(!registry.is_rrm_enabled("ap-2"));
    }

    #[tokio::test]
    async fn deprovisioned_devices_are_purged_from_the_model() {
        let (monitor, _registry, gateway) =
            monitor_with_tags(vec![tag("ap-1", Some("hq"), None)]);
        monitor.reconcile_once().await.unwrap();

        monitor.modeler.ingest(InputData {
            kind: InputDataType::State,
            records: vec![KafkaRecord {
                serial_number: "ap-1".to_string(),
                timestamp_ms: 0,
                payload: serde_json::json!({"state": {"radios": []}}),
            }],
        });
        assert!(!monitor.modeler.data_model_copy().latest_states.is_empty());

        // device disappears from the inventory
        gateway.tags.lock().unwrap().clear();
        monitor.reconcile_once().await.unwrap();
        assert!(monitor.modeler.data_model_copy().latest_states.is_empty());
    }
}
