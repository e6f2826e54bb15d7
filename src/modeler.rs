//! Single-writer ingest loop maintaining the rolling RF data model.
//!
//! The Kafka listener only enqueues records; one worker task drains the
//! queue and applies them, so ingest latency is decoupled from parse cost
//! and backpressure shows up as queue growth.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::sync::watch;
use tracing::{debug, error, info, trace};

use crate::config::ModelerParams;
use crate::gateway::GatewayClient;
use crate::registry::DeviceRegistry;
use crate::types::{parse_wifi_scan_entries, PhyCapabilityMap, State, WifiScanEntry};

/// Kafka input record kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputDataType {
    State,
    WifiScan,
}

/// One record off the `state` or `wifiscan` topic.
#[derive(Clone, Debug)]
pub struct KafkaRecord {
    pub serial_number: String,
    pub timestamp_ms: i64,
    pub payload: serde_json::Value,
}

/// A batch of records of one kind, as handed over by the Kafka listener.
#[derive(Clone, Debug)]
pub struct InputData {
    pub kind: InputDataType,
    pub records: Vec<KafkaRecord>,
}

/// The rolling per-device view of the RF environment.
///
/// `Clone` is the deep structural copy handed to algorithms; every contained
/// type is owned.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataModel {
    /// Bounded FIFO of the most recent states per device, newest at the tail.
    pub latest_states: BTreeMap<String, VecDeque<State>>,
    /// Bounded FIFO of the most recent wifi scan results per device. Each
    /// result is itself a list of entries, one per observed neighbor.
    pub latest_wifi_scans: BTreeMap<String, VecDeque<Vec<WifiScanEntry>>>,
    /// Per-band phy capabilities per device.
    pub latest_device_capabilities_phy: BTreeMap<String, PhyCapabilityMap>,
    /// Raw configured radios per device, as last confirmed by the gateway.
    pub latest_device_status_radios: BTreeMap<String, Vec<serde_json::Value>>,
}

/// Sender half of the ingest queue, handed to the Kafka listener.
#[derive(Clone)]
pub struct IngestSender {
    tx: UnboundedSender<InputData>,
}

impl IngestSender {
    pub fn push_state_records(&self, records: Vec<KafkaRecord>) {
        let _ = self.tx.send(InputData {
            kind: InputDataType::State,
            records,
        });
    }

    pub fn push_wifi_scan_records(&self, records: Vec<KafkaRecord>) {
        let _ = self.tx.send(InputData {
            kind: InputDataType::WifiScan,
            records,
        });
    }
}

/// Modeler module: exclusive writer of the [`DataModel`].
pub struct Modeler {
    params: ModelerParams,
    registry: Arc<DeviceRegistry>,
    gateway: Arc<dyn GatewayClient>,
    data_model: RwLock<DataModel>,
    tx: UnboundedSender<InputData>,
    rx: tokio::sync::Mutex<Option<UnboundedReceiver<InputData>>>,
}

impl Modeler {
    pub fn new(
        params: ModelerParams,
        registry: Arc<DeviceRegistry>,
        gateway: Arc<dyn GatewayClient>,
    ) -> Self {
        let (tx, rx) = unbounded_channel();
        Self {
            params,
            registry,
            gateway,
            data_model: RwLock::new(DataModel::default()),
            tx,
            rx: tokio::sync::Mutex::new(Some(rx)),
        }
    }

    /// Queue sender for the Kafka listener. May be cloned freely.
    pub fn ingest_sender(&self) -> IngestSender {
        IngestSender {
            tx: self.tx.clone(),
        }
    }

    /// Deep structural snapshot. All algorithms must use this, never the
    /// live model.
    pub fn data_model_copy(&self) -> DataModel {
        self.data_model.read().expect("model lock poisoned").clone()
    }

    /// Run `f` against the live model without copying. Caller must not hold
    /// the result beyond the closure.
    pub fn with_data_model<T>(&self, f: impl FnOnce(&DataModel) -> T) -> T {
        f(&self.data_model.read().expect("model lock poisoned"))
    }

    /// Drain the ingest queue until shutdown. Consumes the queue receiver;
    /// calling this twice is a programming error.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!("Fetching initial data...");
        self.backfill(&mut shutdown).await;

        let mut rx = self
            .rx
            .lock()
            .await
            .take()
            .expect("modeler run() called twice");

        info!("Modeler awaiting data...");
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                input = rx.recv() => {
                    let Some(input) = input else { break };
                    self.ingest(input);
                }
            }
        }
        info!("Modeler terminated");
    }

    /// Seed `latest_states` from the gateway. Called once at startup (and
    /// directly by one-shot runs); waits for the gateway client to become
    /// ready first.
    pub async fn backfill(&self, shutdown: &mut watch::Receiver<bool>) {
        while !self.gateway.is_initialized() {
            trace!("Waiting for gateway client");
            tokio::select! {
                _ = shutdown.changed() => return,
                _ = tokio::time::sleep(std::time::Duration::from_secs(2)) => {}
            }
        }

        let devices = match self.gateway.get_devices().await {
            Ok(devices) => devices,
            Err(e) => {
                error!("Failed to fetch devices: {e}");
                return;
            }
        };
        debug!("Received device list of size = {}", devices.len());

        for device in devices {
            if !self.registry.is_rrm_enabled(&device.serial_number) {
                debug!(
                    "Skipping data for non-RRM-enabled device {}",
                    device.serial_number
                );
                continue;
            }
            match self.gateway.get_capabilities(&device.serial_number).await {
                Ok(capabilities) => {
                    self.update_device_capabilities(
                        &device.serial_number,
                        capabilities.capabilities.wifi,
                    );
                }
                Err(e) => {
                    debug!(
                        "Device {}: failed to fetch capabilities: {e}",
                        device.serial_number
                    );
                }
            }

            let records = match self.gateway.get_latest_stats(&device.serial_number, 1).await {
                Ok(records) => records,
                Err(_) => continue,
            };
            if records.data.len() != 1 {
                continue;
            }
            match serde_json::from_value::<State>(records.data[0].data.clone()) {
                Ok(state) => {
                    let mut model = self.data_model.write().expect("model lock poisoned");
                    model
                        .latest_states
                        .entry(device.serial_number.clone())
                        .or_default()
                        .push_back(state);
                    debug!(
                        "Device {}: added initial state from gateway",
                        device.serial_number
                    );
                }
                Err(e) => {
                    error!(
                        "Device {}: failed to deserialize state: {e}",
                        device.serial_number
                    );
                }
            }
        }
    }

    /// Filter out records for non-RRM-enabled devices, then apply the batch.
    pub fn ingest(&self, mut input: InputData) {
        let record_count = input.records.len();
        input
            .records
            .retain(|record| self.registry.is_rrm_enabled(&record.serial_number));
        if input.records.len() < record_count {
            debug!(
                "Dropping {} Kafka record(s) for non-RRM-enabled devices",
                record_count - input.records.len()
            );
        }
        self.process_data(input);
    }

    /// Apply one batch of records to the model.
    fn process_data(&self, input: InputData) {
        // for logging only
        let mut state_updates = BTreeSet::new();
        let mut wifi_scan_updates = BTreeSet::new();

        let mut model = self.data_model.write().expect("model lock poisoned");
        match input.kind {
            InputDataType::State => {
                for record in input.records {
                    let Some(state) = record.payload.get("state") else {
                        continue;
                    };
                    match serde_json::from_value::<State>(state.clone()) {
                        Ok(state) => {
                            let buffer = model
                                .latest_states
                                .entry(record.serial_number.clone())
                                .or_default();
                            while buffer.len() >= self.params.state_buffer_size {
                                buffer.pop_front();
                            }
                            buffer.push_back(state);
                            state_updates.insert(record.serial_number);
                        }
                        Err(e) => {
                            error!(
                                "Device {}: failed to deserialize state: {e}",
                                record.serial_number
                            );
                        }
                    }
                }
            }
            InputDataType::WifiScan => {
                for record in input.records {
                    let Some(entries) =
                        parse_wifi_scan_entries(&record.payload, record.timestamp_ms)
                    else {
                        continue;
                    };
                    let buffer = model
                        .latest_wifi_scans
                        .entry(record.serial_number.clone())
                        .or_default();
                    while buffer.len() >= self.params.wifi_scan_buffer_size {
                        buffer.pop_front();
                    }
                    buffer.push_back(entries);
                    wifi_scan_updates.insert(record.serial_number);
                }
            }
        }
        drop(model);

        if !state_updates.is_empty() {
            debug!(
                "Received state updates for {} device(s): [{}]",
                state_updates.len(),
                state_updates.iter().cloned().collect::<Vec<_>>().join(", ")
            );
        }
        if !wifi_scan_updates.is_empty() {
            debug!(
                "Received wifi scan results for {} device(s): [{}]",
                wifi_scan_updates.len(),
                wifi_scan_updates
                    .iter()
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }
    }

    /// Store refreshed capabilities for a device.
    pub fn update_device_capabilities(&self, serial: &str, capabilities: PhyCapabilityMap) {
        self.data_model
            .write()
            .expect("model lock poisoned")
            .latest_device_capabilities_phy
            .insert(serial.to_string(), capabilities);
    }

    /// Store a device's confirmed radio configuration, logging band changes.
    pub fn update_device_status_radios(&self, serial: &str, radios: Vec<serde_json::Value>) {
        let new_bands = radio_bands(&radios);
        let old = self
            .data_model
            .write()
            .expect("model lock poisoned")
            .latest_device_status_radios
            .insert(serial.to_string(), radios);
        let old_bands = old.as_deref().map(radio_bands).unwrap_or_default();
        if old_bands != new_bands {
            info!("Device {serial}: the new radios list is: {new_bands:?} (was {old_bands:?})");
        }
    }

    /// Purge entries for devices that are no longer RRM-enabled.
    pub fn revalidate(&self) {
        let mut model = self.data_model.write().expect("model lock poisoned");
        let enabled = |serial: &String| self.registry.is_rrm_enabled(serial);

        let before = model.latest_wifi_scans.len();
        model.latest_wifi_scans.retain(|serial, _| enabled(serial));
        if model.latest_wifi_scans.len() < before {
            debug!("Removed some wifi scan entries from data model");
        }

        let before = model.latest_states.len();
        model.latest_states.retain(|serial, _| enabled(serial));
        if model.latest_states.len() < before {
            debug!("Removed some state entries from data model");
        }

        let before = model.latest_device_status_radios.len();
        model
            .latest_device_status_radios
            .retain(|serial, _| enabled(serial));
        if model.latest_device_status_radios.len() < before {
            debug!("Removed some status entries from data model");
        }

        let before = model.latest_device_capabilities_phy.len();
        model
            .latest_device_capabilities_phy
            .retain(|serial, _| enabled(serial));
        if model.latest_device_capabilities_phy.len() < before {
            debug!("Removed some capabilities entries from data model");
        }
    }
}

fn radio_bands(radios: &[serde_json::Value]) -> BTreeSet<String> {
    radios
        .iter()
        .filter_map(|radio| radio.get("band").and_then(|b| b.as_str()))
        .map(str::to_string)
        .collect()
}
