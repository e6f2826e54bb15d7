//! RRM optimization algorithms.
//!
//! Each algorithm category is a trait with a single `compute_*` operation;
//! concrete algorithms are registered by stable string ID in
//! [`AlgorithmRegistry`]. Algorithms are pure over a [`DataModel`] snapshot:
//! they never perform I/O and never see the live model.

pub mod channel;
pub mod clientsteering;
pub mod tpc;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::Serialize;
use tracing::error;

use crate::consts::Band;
use crate::modeler::DataModel;
use crate::registry::DeviceRegistry;

use self::clientsteering::{ClientAction, ClientSteeringState};

/// serial → band → tx power (dBm)
pub type TxPowerMap = BTreeMap<String, BTreeMap<Band, i32>>;
/// serial → band → channel
pub type ChannelMap = BTreeMap<String, BTreeMap<Band, u32>>;
/// serial → client MAC → steering action
pub type ClientActionMap = BTreeMap<String, BTreeMap<String, ClientAction>>;

/// Algorithm category; determines the output shape.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlgorithmCategory {
    Tpc,
    Channel,
    ClientSteering,
}

impl AlgorithmCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlgorithmCategory::Tpc => "TPC",
            AlgorithmCategory::Channel => "CHANNEL",
            AlgorithmCategory::ClientSteering => "CLIENT_STEERING",
        }
    }
}

impl fmt::Display for AlgorithmCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transmit-power control algorithms.
pub trait TpcAlgorithm: Send {
    fn compute_tx_power_map(&self) -> TxPowerMap;
}

/// Channel assignment algorithms.
pub trait ChannelAlgorithm: Send {
    fn compute_channel_map(&self) -> ChannelMap;
}

/// Client steering algorithms. `dry_run` reports intended actions without
/// recording them against the back-off state.
pub trait ClientSteeringAlgorithm: Send {
    fn compute_ap_client_action_map(&self, dry_run: bool) -> ClientActionMap;
}

/// Everything a factory needs to build an algorithm instance.
pub struct AlgorithmContext {
    /// Deep snapshot of the data model
    pub model: DataModel,
    /// Zone whose devices this run assigns values for
    pub zone: String,
    pub registry: Arc<DeviceRegistry>,
    /// Shared back-off state; only client steering algorithms use it
    pub steering_state: Arc<ClientSteeringState>,
    /// Raw string args; unknown keys are ignored, malformed values fall
    /// back to defaults
    pub args: BTreeMap<String, String>,
}

impl AlgorithmContext {
    /// Serials this run assigns values for: the zone's members.
    pub fn zone_serials(&self) -> BTreeSet<String> {
        self.registry.serials_in_zone(&self.zone)
    }
}

/// A built algorithm, tagged by category.
pub enum AlgorithmInstance {
    Tpc(Box<dyn TpcAlgorithm>),
    Channel(Box<dyn ChannelAlgorithm>),
    ClientSteering(Box<dyn ClientSteeringAlgorithm>),
}

impl AlgorithmInstance {
    pub fn category(&self) -> AlgorithmCategory {
        match self {
            AlgorithmInstance::Tpc(_) => AlgorithmCategory::Tpc,
            AlgorithmInstance::Channel(_) => AlgorithmCategory::Channel,
            AlgorithmInstance::ClientSteering(_) => AlgorithmCategory::ClientSteering,
        }
    }
}

/// An accepted argument, for the operator-facing registry listing.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct ArgSpec {
    pub name: &'static str,
    pub description: &'static str,
}

/// Registry entry metadata.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct AlgorithmDescriptor {
    pub id: &'static str,
    pub category: AlgorithmCategory,
    pub description: &'static str,
    pub args: &'static [ArgSpec],
}

type Factory = fn(AlgorithmContext) -> AlgorithmInstance;

/// Name → factory table for all known algorithms.
pub struct AlgorithmRegistry {
    entries: Vec<(AlgorithmDescriptor, Factory)>,
}

impl AlgorithmRegistry {
    /// The standard algorithm set.
    pub fn standard() -> Self {
        Self {
            entries: vec![
                (tpc::MEASUREMENT_DESCRIPTOR, |ctx| {
                    AlgorithmInstance::Tpc(Box::new(tpc::MeasurementBasedApApTpc::make_with_args(
                        ctx,
                    )))
                }),
                (tpc::RANDOM_DESCRIPTOR, |ctx| {
                    AlgorithmInstance::Tpc(Box::new(tpc::RandomTxPowerInitializer::make_with_args(
                        ctx,
                    )))
                }),
                (channel::LEAST_USED_DESCRIPTOR, |ctx| {
                    AlgorithmInstance::Channel(Box::new(
                        channel::LeastUsedChannelOptimizer::make_with_args(ctx),
                    ))
                }),
                (channel::UNMANAGED_AWARE_DESCRIPTOR, |ctx| {
                    AlgorithmInstance::Channel(Box::new(
                        channel::UnmanagedApAwareChannelOptimizer::make_with_args(ctx),
                    ))
                }),
                (channel::RANDOM_DESCRIPTOR, |ctx| {
                    AlgorithmInstance::Channel(Box::new(
                        channel::RandomChannelInitializer::make_with_args(ctx),
                    ))
                }),
                (clientsteering::BAND_STEERING_DESCRIPTOR, |ctx| {
                    AlgorithmInstance::ClientSteering(Box::new(
                        clientsteering::SingleApBandSteering::make_with_args(ctx),
                    ))
                }),
            ],
        }
    }

    /// Build the algorithm registered under `id`.
    pub fn build(&self, id: &str, ctx: AlgorithmContext) -> Option<AlgorithmInstance> {
        let (_, factory) = self.entries.iter().find(|(d, _)| d.id == id)?;
        Some(factory(ctx))
    }

    /// Descriptor for `id`, if registered.
    pub fn descriptor(&self, id: &str) -> Option<&AlgorithmDescriptor> {
        self.entries.iter().map(|(d, _)| d).find(|d| d.id == id)
    }

    /// All registered descriptors.
    pub fn descriptors(&self) -> impl Iterator<Item = &AlgorithmDescriptor> {
        self.entries.iter().map(|(d, _)| d)
    }

    /// The algorithm run for a category when the zone config names none.
    pub fn default_id(category: AlgorithmCategory) -> &'static str {
        match category {
            AlgorithmCategory::Tpc => tpc::MeasurementBasedApApTpc::ALGORITHM_ID,
            AlgorithmCategory::Channel => channel::LeastUsedChannelOptimizer::ALGORITHM_ID,
            AlgorithmCategory::ClientSteering => clientsteering::SingleApBandSteering::ALGORITHM_ID,
        }
    }
}

/// Parse one typed arg out of the raw map. Malformed values are logged and
/// yield `None`, so callers fall back to their defaults; absent keys are
/// silent.
pub(crate) fn parse_arg<T: FromStr>(
    args: &BTreeMap<String, String>,
    key: &str,
) -> Option<T> {
    let raw = args.get(key)?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            error!("Invalid value '{raw}' passed to parameter {key}, using default value");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_context(zone: &str) -> AlgorithmContext {
        AlgorithmContext {
            model: DataModel::default(),
            zone: zone.to_string(),
            registry: Arc::new(DeviceRegistry::new()),
            steering_state: Arc::new(ClientSteeringState::new()),
            args: BTreeMap::new(),
        }
    }

    #[test]
    fn registry_knows_all_standard_ids() {
        let registry = AlgorithmRegistry::standard();
        for id in [
            "measure_ap_ap",
            "random_tx",
            "least_used",
            "unmanaged_aware",
            "random",
            "band",
        ] {
            assert!(registry.descriptor(id).is_some(), "missing {id}");
        }
        assert!(registry.descriptor("nope").is_none());
    }

    #[test]
    fn build_returns_matching_category() {
        let registry = AlgorithmRegistry::standard();
        let instance = registry.build("band", empty_context("z")).unwrap();
        assert_eq!(instance.category(), AlgorithmCategory::ClientSteering);
        let instance = registry.build("least_used", empty_context("z")).unwrap();
        assert_eq!(instance.category(), AlgorithmCategory::Channel);
    }

    #[test]
    fn parse_arg_falls_back_on_garbage() {
        let mut args = BTreeMap::new();
        args.insert("threshold".to_string(), "abc".to_string());
        assert_eq!(parse_arg::<i32>(&args, "threshold"), None);
        args.insert("threshold".to_string(), "-70".to_string());
        assert_eq!(parse_arg::<i32>(&args, "threshold"), Some(-70));
        assert_eq!(parse_arg::<i32>(&args, "absent"), None);
    }
}
