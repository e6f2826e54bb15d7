//! Least-used channel assignment.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::error;

use crate::modeler::DataModel;
use crate::optimizers::{
    parse_arg, AlgorithmCategory, AlgorithmContext, AlgorithmDescriptor, ArgSpec,
    ChannelAlgorithm, ChannelMap,
};
use crate::registry::DeviceRegistry;

use super::assign_channels;

pub const LEAST_USED_DESCRIPTOR: AlgorithmDescriptor = AlgorithmDescriptor {
    id: LeastUsedChannelOptimizer::ALGORITHM_ID,
    category: AlgorithmCategory::Channel,
    description: "Assign the channel with the fewest co-channel APs",
    args: &[ArgSpec {
        name: "obssWeight",
        description: "Weight of one unmanaged neighbor relative to a managed AP",
    }],
};

/// Least-used channel optimizer: per (device, band), pick the allowed
/// channel with the fewest managed co-channel APs plus weighted unmanaged
/// neighbors.
pub struct LeastUsedChannelOptimizer {
    model: DataModel,
    zone_serials: BTreeSet<String>,
    registry: Arc<DeviceRegistry>,
    obss_weight: f64,
}

impl LeastUsedChannelOptimizer {
    pub const ALGORITHM_ID: &'static str = "least_used";

    /// Weight of one unmanaged neighbor relative to a managed co-channel AP.
    pub const DEFAULT_OBSS_WEIGHT: f64 = 0.5;

    pub fn make_with_args(ctx: AlgorithmContext) -> Self {
        let mut obss_weight = Self::DEFAULT_OBSS_WEIGHT;
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

impl ChannelAlgorithm for LeastUsedChannelOptimizer {
    fn compute_channel_map(&self) -> ChannelMap {
        assign_channels(
            &self.model,
            &self.zone_serials,
            &self.registry,
            self.obss_weight,
            false,
        )
    }
}
