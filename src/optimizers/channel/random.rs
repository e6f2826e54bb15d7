//! Random channel initializer, for seeding a fresh deployment.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::consts::Band;
use crate::modeler::DataModel;
use crate::optimizers::{
    parse_arg, AlgorithmCategory, AlgorithmContext, AlgorithmDescriptor, ArgSpec,
    ChannelAlgorithm, ChannelMap,
};
use crate::registry::DeviceRegistry;
use crate::types::band_for_channel;

use super::{allowed_channels, user_channel};

pub const RANDOM_DESCRIPTOR: AlgorithmDescriptor = AlgorithmDescriptor {
    id: RandomChannelInitializer::ALGORITHM_ID,
    category: AlgorithmCategory::Channel,
    description: "Random channel assignment (deployment bootstrap)",
    args: &[
        ArgSpec {
            name: "setDifferentChannelPerAp",
            description: "Pick per-AP channels instead of one channel per band",
        },
        ArgSpec {
            name: "seed",
            description: "RNG seed for reproducible assignments",
        },
    ],
};

/// Random channel initializer.
pub struct RandomChannelInitializer {
    model: DataModel,
    zone_serials: BTreeSet<String>,
    registry: Arc<DeviceRegistry>,
    per_ap: bool,
    rng: Mutex<StdRng>,
}

impl RandomChannelInitializer {
    pub const ALGORITHM_ID: &'static str = "random";

    pub fn make_with_args(ctx: AlgorithmContext) -> Self {
        let per_ap = parse_arg(&ctx.args, "setDifferentChannelPerAp").unwrap_or(false);
        let rng = match parse_arg::<u64>(&ctx.args, "seed") {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            zone_serials: ctx.zone_serials(),
            model: ctx.model,
            registry: ctx.registry,
            per_ap,
            rng: Mutex::new(rng),
        }
    }

    fn pick(&self, choices: &[u32]) -> u32 {
        let mut rng = self.rng.lock().expect("rng lock poisoned");
        choices[rng.gen_range(0..choices.len())]
    }
}

impl ChannelAlgorithm for RandomChannelInitializer {
    fn compute_channel_map(&self) -> ChannelMap {
        let mut channel_map = ChannelMap::new();
        let mut band_values: BTreeMap<Band, u32> = BTreeMap::new();

        for serial in &self.zone_serials {
            let Some(states) = self.model.latest_states.get(serial) else {
                continue;
            };
            let Some(state) = states.back() else { continue };
            let Some(capabilities) = self.model.latest_device_capabilities_phy.get(serial)
            else {
                continue;
            };

            let mut bands_done = BTreeSet::new();
            for radio in &state.radios {
                let Some(band) = band_for_channel(radio.channel, capabilities) else {
                    continue;
                };
                if !bands_done.insert(band) {
                    continue;
                }
                let allowed = allowed_channels(&self.registry, serial, band);
                let channel = if let Some(pinned) = user_channel(&self.registry, serial, band)
                    .filter(|pinned| allowed.contains(pinned))
                {
                    pinned
                } else if self.per_ap {
                    self.pick(&allowed)
                } else {
                    *band_values
                        .entry(band)
                        .or_insert_with(|| self.pick(&allowed))
                };
                channel_map
                    .entry(serial.clone())
                    .or_default()
                    .insert(band, channel);
            }
        }
        channel_map
    }
}
