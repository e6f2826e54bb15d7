//! Channel assignment that also weighs how loud unmanaged interferers are.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::error;

use crate::modeler::DataModel;
use crate::optimizers::{
    parse_arg, AlgorithmCategory, AlgorithmContext, AlgorithmDescriptor, ArgSpec,
    ChannelAlgorithm, ChannelMap,
};
use crate::registry::DeviceRegistry;

use super::{assign_channels, LeastUsedChannelOptimizer};

pub const UNMANAGED_AWARE_DESCRIPTOR: AlgorithmDescriptor = AlgorithmDescriptor {
    id: UnmanagedApAwareChannelOptimizer::ALGORITHM_ID,
    category: AlgorithmCategory::Channel,
    description: "Least-used assignment penalizing strong unmanaged interferers",
    args: &[ArgSpec {
        name: "obssWeight",
        description: "Weight of one unmanaged neighbor relative to a managed AP",
    }],
};

/// Like [`LeastUsedChannelOptimizer`], but each candidate channel is further
/// penalized by the strongest unmanaged-neighbor RSSI observed on it: a
/// stronger interferer costs more to share a channel with.
pub struct UnmanagedApAwareChannelOptimizer {
    model: DataModel,
    zone_serials: BTreeSet<String>,
    registry: Arc<DeviceRegistry>,
    obss_weight: f64,
}

impl UnmanagedApAwareChannelOptimizer {
    pub const ALGORITHM_ID: &'static str = "unmanaged_aware";

    pub fn make_with_args(ctx: AlgorithmContext) -> Self {
        let mut obss_weight = LeastUsedChannelOptimizer::DEFAULT_OBSS_WEIGHT;
        if let Some(parsed) = parse_arg::<f64>(&ctx.args, "obssWeight") {
            if parsed < 0.0 {
                error!("Invalid value passed for obssWeight - must be non-negative. Using default value.");
            } else {
                obss_weight = parsed;
            }
        }
        Self {
            zone_serials: ctx.zone_serials(),
            model: ctx.model,
            registry: ctx.registry,
            obss_weight,
        }
    }
}

impl ChannelAlgorithm for UnmanagedApAwareChannelOptimizer {
    fn compute_channel_map(&self) -> ChannelMap {
        assign_channels(
            &self.model,
            &self.zone_serials,
            &self.registry,
            self.obss_weight,
            true,
        )
    }
}
