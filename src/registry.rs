//! Authoritative device registry: zone topology plus layered per-device
//! configuration (network base ← zone overlay ← per-AP overlay).
//!
//! Mutated by the provisioning monitor and the operator API under a single
//! writer lock; a generation counter lets readers detect churn across
//! multi-step reads and retry once.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::consts::Band;

/// Per-device RRM configuration. All fields are optional so configs can be
/// layered; `None` inherits from the layer below.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
pub struct DeviceConfig {
    /// Whether RRM manages this device
    #[serde(default)]
    pub enable_rrm: Option<bool>,
    /// Channels an algorithm may assign, per band
    #[serde(default)]
    pub allowed_channels: Option<BTreeMap<Band, Vec<u32>>>,
    /// Tx powers (dBm) an algorithm may assign, per band
    #[serde(default)]
    pub allowed_tx_powers: Option<BTreeMap<Band, Vec<i32>>>,
    /// Operator-pinned channel per band; honored by channel algorithms
    #[serde(default)]
    pub user_channels: Option<BTreeMap<Band, u32>>,
}

impl DeviceConfig {
    /// The network-layer base: RRM on, everything else inherited.
    pub fn default_enabled() -> Self {
        Self {
            enable_rrm: Some(true),
            ..Default::default()
        }
    }

    /// Overlay `other` onto `self`: set fields win, `None` inherits.
    pub fn apply_over(&mut self, other: &DeviceConfig) {
        if other.enable_rrm.is_some() {
            self.enable_rrm = other.enable_rrm;
        }
        if other.allowed_channels.is_some() {
            self.allowed_channels = other.allowed_channels.clone();
        }
        if other.allowed_tx_powers.is_some() {
            self.allowed_tx_powers = other.allowed_tx_powers.clone();
        }
        if other.user_channels.is_some() {
            self.user_channels = other.user_channels.clone();
        }
    }
}

/// Zone → member serial numbers.
pub type Topology = BTreeMap<String, BTreeSet<String>>;

#[derive(Debug, Default)]
struct RegistryInner {
    network_config: DeviceConfig,
    zone_configs: BTreeMap<String, DeviceConfig>,
    ap_configs: BTreeMap<String, DeviceConfig>,
    topology: Topology,
}

/// Shared device registry. Devices not present in the topology are unknown
/// and never RRM-enabled.
#[derive(Debug)]
pub struct DeviceRegistry {
    inner: RwLock<RegistryInner>,
    generation: AtomicU64,
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(RegistryInner {
                network_config: DeviceConfig::default_enabled(),
                ..Default::default()
            }),
            generation: AtomicU64::new(0),
        }
    }

    /// Current write generation. Bumped on every mutation.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    fn write<T>(&self, f: impl FnOnce(&mut RegistryInner) -> T) -> T {
        let mut inner = self.inner.write().expect("registry lock poisoned");
        let result = f(&mut inner);
        self.generation.fetch_add(1, Ordering::AcqRel);
        result
    }

    fn read<T>(&self, f: impl FnOnce(&RegistryInner) -> T) -> T {
        f(&self.inner.read().expect("registry lock poisoned"))
    }

    /// Run `f` under the read lock, retrying once if a writer slipped in
    /// between the generation snapshot and lock acquisition.
    pub fn read_consistent<T>(&self, f: impl Fn(&DeviceRegistry) -> T) -> T {
        let generation = self.generation();
        let result = f(self);
        if self.generation() == generation {
            return result;
        }
        f(self)
    }

    pub fn topology(&self) -> Topology {
        self.read(|inner| inner.topology.clone())
    }

    pub fn set_topology(&self, topology: Topology) {
        self.write(|inner| inner.topology = topology);
    }

    pub fn zones(&self) -> Vec<String> {
        self.read(|inner| inner.topology.keys().cloned().collect())
    }

    pub fn has_zone(&self, zone: &str) -> bool {
        self.read(|inner| inner.topology.contains_key(zone))
    }

    /// The zone a device belongs to, if provisioned.
    pub fn device_zone(&self, serial: &str) -> Option<String> {
        self.read(|inner| {
            inner
                .topology
                .iter()
                .find(|(_, serials)| serials.contains(serial))
                .map(|(zone, _)| zone.clone())
        })
    }

    pub fn serials_in_zone(&self, zone: &str) -> BTreeSet<String> {
        self.read(|inner| inner.topology.get(zone).cloned().unwrap_or_default())
    }

    /// The merged configuration for a device, or `None` for unknown serials.
    pub fn effective_config(&self, serial: &str) -> Option<DeviceConfig> {
        self.read(|inner| {
            let zone = inner
                .topology
                .iter()
                .find(|(_, serials)| serials.contains(serial))
                .map(|(zone, _)| zone)?;
            let mut config = inner.network_config.clone();
            if let Some(overlay) = inner.zone_configs.get(zone) {
                config.apply_over(overlay);
            }
            if let Some(overlay) = inner.ap_configs.get(serial) {
                config.apply_over(overlay);
            }
            Some(config)
        })
    }

    /// Whether a device is known and RRM-enabled.
    pub fn is_rrm_enabled(&self, serial: &str) -> bool {
        self.effective_config(serial)
            .and_then(|config| config.enable_rrm)
            .unwrap_or(false)
    }

    pub fn network_config(&self) -> DeviceConfig {
        self.read(|inner| inner.network_config.clone())
    }

    pub fn set_network_config(&self, config: DeviceConfig) {
        self.write(|inner| inner.network_config = config);
    }

    pub fn zone_config(&self, zone: &str) -> Option<DeviceConfig> {
        self.read(|inner| inner.zone_configs.get(zone).cloned())
    }

    pub fn set_zone_config(&self, zone: &str, config: DeviceConfig) {
        self.write(|inner| {
            inner.zone_configs.insert(zone.to_string(), config);
        });
    }

    pub fn ap_config(&self, serial: &str) -> Option<DeviceConfig> {
        self.read(|inner| inner.ap_configs.get(serial).cloned())
    }

    pub fn set_ap_config(&self, serial: &str, config: DeviceConfig) {
        self.write(|inner| {
            inner.ap_configs.insert(serial.to_string(), config);
        });
    }

    /// Set only the per-AP RRM flag, preserving other overlay fields. Used
    /// by provisioning reconciliation.
    pub fn set_ap_rrm_enabled(&self, serial: &str, enabled: bool) {
        self.write(|inner| {
            inner
                .ap_configs
                .entry(serial.to_string())
                .or_default()
                .enable_rrm = Some(enabled);
        });
    }
}
