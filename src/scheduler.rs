//! Per-zone scheduling and dispatch of optimization runs.
//!
//! One periodic job per zone fires all three categories; manual operator
//! triggers share the same per-(zone, category) single-flight locks, so at
//! most one run per key is ever in flight. Duplicate triggers are rejected,
//! not queued.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::applier::{ApplyReport, ConfigApplier};
use crate::config::{AlgorithmSelection, SchedulerParams, ZoneSchedule};
use crate::modeler::Modeler;
use crate::optimizers::{
    clientsteering::ClientSteeringState, AlgorithmCategory, AlgorithmContext, AlgorithmInstance,
    AlgorithmRegistry,
};
use crate::prelude::*;
use crate::registry::DeviceRegistry;
use crate::Error;

/// Result of one algorithm run, as returned to operators.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunOutcome {
    pub zone: String,
    pub category: AlgorithmCategory,
    pub algorithm_id: String,
    pub dry_run: bool,
    /// The computed action map, category-shaped
    pub actions: serde_json::Value,
    pub report: ApplyReport,
}

/// RRM scheduler and dispatcher.
pub struct RrmScheduler {
    params: SchedulerParams,
    modeler: Arc<Modeler>,
    registry: Arc<DeviceRegistry>,
    algorithms: Arc<AlgorithmRegistry>,
    steering_state: Arc<ClientSteeringState>,
    applier: Arc<ConfigApplier>,
    /// Single-flight locks, one per (zone, category)
    locks: Mutex<HashMap<(String, AlgorithmCategory), Arc<tokio::sync::Mutex<()>>>>,
}

impl RrmScheduler {
    pub fn new(
        params: SchedulerParams,
        modeler: Arc<Modeler>,
        registry: Arc<DeviceRegistry>,
        algorithms: Arc<AlgorithmRegistry>,
        steering_state: Arc<ClientSteeringState>,
        applier: Arc<ConfigApplier>,
    ) -> Self {
        Self {
            params,
            modeler,
            registry,
            algorithms,
            steering_state,
            applier,
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn lock_for(&self, zone: &str, category: AlgorithmCategory) -> Arc<tokio::sync::Mutex<()>> {
        self.locks
            .lock()
            .expect("scheduler lock poisoned")
            .entry((zone.to_string(), category))
            .or_default()
            .clone()
    }

    fn configured_selection(
        &self,
        zone: &str,
        category: AlgorithmCategory,
    ) -> Option<AlgorithmSelection> {
        let schedule = self.params.zones.iter().find(|z| z.zone == zone)?;
        match category {
            AlgorithmCategory::Tpc => schedule.tpc.clone(),
            AlgorithmCategory::Channel => schedule.channel.clone(),
            AlgorithmCategory::ClientSteering => schedule.client_steering.clone(),
        }
    }

    /// Run one category for a zone: resolve the algorithm, take the
    /// single-flight lock, compute over a fresh snapshot, and hand the
    /// result to the applier. `mode` and `args` override the zone's
    /// configured selection (operator triggers).
    pub async fn trigger(
        &self,
        zone: &str,
        category: AlgorithmCategory,
        mode: Option<&str>,
        args: Option<BTreeMap<String, String>>,
        dry_run: bool,
    ) -> Result<RunOutcome> {
        if !self.registry.has_zone(zone) {
            return Err(Error::UnknownZone(zone.to_string()));
        }

        let configured = self.configured_selection(zone, category);
        let algorithm_id = mode
            .map(str::to_string)
            .or_else(|| configured.as_ref().map(|s| s.mode.clone()))
            .unwrap_or_else(|| AlgorithmRegistry::default_id(category).to_string());
        let args = args
            .or_else(|| configured.map(|s| s.args))
            .unwrap_or_default();

        let descriptor = self
            .algorithms
            .descriptor(&algorithm_id)
            .ok_or_else(|| Error::UnknownAlgorithm(algorithm_id.clone()))?;
        if descriptor.category != category {
            return Err(Error::UnknownAlgorithm(format!(
                "{algorithm_id} is a {} algorithm, not {category}",
                descriptor.category
            )));
        }

        let lock = self.lock_for(zone, category);
        let Ok(_guard) = lock.try_lock() else {
            warn!("Zone {zone}: {category} optimization already running, dropping trigger");
            return Err(Error::AlreadyRunning {
                zone: zone.to_string(),
                category: category.to_string(),
            });
        };

        info!("Zone {zone}: running {category} algorithm '{algorithm_id}' (dry_run={dry_run})");
        let ctx = AlgorithmContext {
            model: self.modeler.data_model_copy(),
            zone: zone.to_string(),
            registry: self.registry.clone(),
            steering_state: self.steering_state.clone(),
            args,
        };
        let instance = self
            .algorithms
            .build(&algorithm_id, ctx)
            .ok_or_else(|| Error::UnknownAlgorithm(algorithm_id.clone()))?;

        let (actions, report) = match instance {
            AlgorithmInstance::Tpc(algorithm) => {
                let map = algorithm.compute_tx_power_map();
                let report = self.applier.apply_tx_power_map(&map, dry_run).await;
                (serde_json::to_value(&map)?, report)
            }
            AlgorithmInstance::Channel(algorithm) => {
                let map = algorithm.compute_channel_map();
                let report = self.applier.apply_channel_map(&map, dry_run).await;
                (serde_json::to_value(&map)?, report)
            }
            AlgorithmInstance::ClientSteering(algorithm) => {
                let map = algorithm.compute_ap_client_action_map(dry_run);
                let report = self.applier.apply_client_actions(&map, dry_run).await;
                (serde_json::to_value(&map)?, report)
            }
        };

        info!(
            "Zone {zone}: {category} run complete, {} applied / {} failed",
            report.applied, report.failed
        );
        Ok(RunOutcome {
            zone: zone.to_string(),
            category,
            algorithm_id,
            dry_run,
            actions,
            report,
        })
    }

    /// Run all three categories for a zone (the `runRRM` operation).
    /// Per-category failures are reported inline, not propagated.
    pub async fn run_all(&self, zone: &str, dry_run: bool) -> Result<Vec<RunOutcome>> {
        if !self.registry.has_zone(zone) {
            return Err(Error::UnknownZone(zone.to_string()));
        }
        let mut outcomes = Vec::new();
        for category in [
            AlgorithmCategory::Channel,
            AlgorithmCategory::Tpc,
            AlgorithmCategory::ClientSteering,
        ] {
            match self.trigger(zone, category, None, None, dry_run).await {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => warn!("Zone {zone}: {category} run skipped: {e}"),
            }
        }
        Ok(outcomes)
    }

    /// Spawn the periodic per-zone jobs. Each zone gets its own interval
    /// task firing all categories; the single-flight locks serialize
    /// against manual triggers.
    pub fn spawn_jobs(self: Arc<Self>, shutdown: watch::Receiver<bool>) {
        for schedule in self.params.zones.clone() {
            let scheduler = self.clone();
            let mut shutdown = shutdown.clone();
            tokio::spawn(async move {
                let ZoneSchedule { zone, interval_secs, .. } = schedule;
                let mut interval =
                    tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
                interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                // consume the immediate first tick; first run happens one
                // interval after startup, once the model has data
                interval.tick().await;
                loop {
                    tokio::select! {
                        _ = shutdown.changed() => break,
                        _ = interval.tick() => {
                            if let Err(e) = scheduler.run_all(&zone, false).await {
                                error!("Zone {zone}: scheduled run failed: {e}");
                            }
                        }
                    }
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelerParams;
    use crate::gateway::{
        CommandInfo, DeviceCapabilities, DeviceWithStatus, GatewayClient, InventoryTag,
        StatisticsRecords,
    };
    use crate::registry::Topology;
    use async_trait::async_trait;
    use std::collections::BTreeSet;

    struct NullGateway;

    #[async_trait]
    impl GatewayClient for NullGateway {
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
        async fn configure(&self, _: &str, _: serde_json::Value) -> Result<CommandInfo> {
            Ok(CommandInfo::default())
        }
        async fn run_script(&self, _: &str, _: serde_json::Value) -> Result<CommandInfo> {
            Ok(CommandInfo::default())
        }
        async fn get_prov_inventory_for_rrm(&self) -> Result<Vec<InventoryTag>> {
            Ok(vec![])
        }
    }

    fn scheduler_with_zone(zone: &str) -> Arc<RrmScheduler> {
        let registry = Arc::new(DeviceRegistry::new());
        let mut topology = Topology::new();
        topology.insert(zone.to_string(), BTreeSet::new());
        registry.set_topology(topology);

        let gateway: Arc<dyn GatewayClient> = Arc::new(NullGateway);
        let modeler = Arc::new(Modeler::new(
            ModelerParams::default(),
            registry.clone(),
            gateway.clone(),
        ));
        let applier = Arc::new(ConfigApplier::new(modeler.clone(), gateway));
        Arc::new(RrmScheduler::new(
            SchedulerParams::default(),
            modeler,
            registry,
            Arc::new(AlgorithmRegistry::standard()),
            Arc::new(ClientSteeringState::new()),
            applier,
        ))
    }

    #[tokio::test]
    async fn trigger_rejects_unknown_zone() {
        let scheduler = scheduler_with_zone("zone-a");
        let result = scheduler
            .trigger("nowhere", AlgorithmCategory::Channel, None, None, true)
            .await;
        assert!(matches!(result, Err(Error::UnknownZone(_))));
    }

    #[tokio::test]
    async fn trigger_rejects_unknown_algorithm() {
        let scheduler = scheduler_with_zone("zone-a");
        let result = scheduler
            .trigger(
                "zone-a",
                AlgorithmCategory::Channel,
                Some("not_an_algorithm"),
                None,
                true,
            )
            .await;
        assert!(matches!(result, Err(Error::UnknownAlgorithm(_))));
    }

    #[tokio::test]
    async fn trigger_rejects_category_mismatch() {
        let scheduler = scheduler_with_zone("zone-a");
        // "band" is a client steering algorithm, not a channel one
        let result = scheduler
            .trigger("zone-a", AlgorithmCategory::Channel, Some("band"), None, true)
            .await;
        assert!(matches!(result, Err(Error::UnknownAlgorithm(_))));
    }

    #[tokio::test]
    async fn overlapping_triggers_single_flight() {
        let scheduler = scheduler_with_zone("zone-a");
        // hold the (zone, category) lock as an in-flight run would
        let lock = scheduler.lock_for("zone-a", AlgorithmCategory::Tpc);
        let _guard = lock.lock().await;

        let result = scheduler
            .trigger("zone-a", AlgorithmCategory::Tpc, None, None, true)
            .await;
        assert!(matches!(result, Err(Error::AlreadyRunning { .. })));

        // a different category in the same zone is unaffected
        let result = scheduler
            .trigger("zone-a", AlgorithmCategory::Channel, None, None, true)
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn lock_released_after_run() {
        let scheduler = scheduler_with_zone("zone-a");
        for _ in 0..2 {
            let outcome = scheduler
                .trigger("zone-a", AlgorithmCategory::Channel, None, None, true)
                .await
                .unwrap();
            assert_eq!(outcome.algorithm_id, "least_used");
        }
    }

    #[tokio::test]
    async fn run_all_covers_every_category() {
        let scheduler = scheduler_with_zone("zone-a");
        let outcomes = scheduler.run_all("zone-a", true).await.unwrap();
        let categories: Vec<AlgorithmCategory> =
            outcomes.iter().map(|o| o.category).collect();
        assert_eq!(
            categories,
            vec![
                AlgorithmCategory::Channel,
                AlgorithmCategory::Tpc,
                AlgorithmCategory::ClientSteering,
            ]
        );
    }
}
