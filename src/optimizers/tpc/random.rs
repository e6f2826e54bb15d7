//! Random tx power initializer, for seeding a fresh deployment before
//! measurements exist.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::modeler::DataModel;
use crate::optimizers::{
    parse_arg, AlgorithmCategory, AlgorithmContext, AlgorithmDescriptor, ArgSpec, TpcAlgorithm,
    TxPowerMap,
};
use crate::registry::DeviceRegistry;

use super::{aps_per_channel, tx_power_choices};

pub const RANDOM_DESCRIPTOR: AlgorithmDescriptor = AlgorithmDescriptor {
    id: RandomTxPowerInitializer::ALGORITHM_ID,
    category: AlgorithmCategory::Tpc,
    description: "Random tx power assignment (deployment bootstrap)",
    args: &[
        ArgSpec {
            name: "setDifferentTxPowerPerAp",
            description: "Pick per-AP values instead of one value per band",
        },
        ArgSpec {
            name: "seed",
            description: "RNG seed for reproducible assignments",
        },
    ],
};

/// Random tx power initializer.
pub struct RandomTxPowerInitializer {
    model: DataModel,
    zone_serials: BTreeSet<String>,
    registry: Arc<DeviceRegistry>,
    per_ap: bool,
    rng: Mutex<StdRng>,
}

impl RandomTxPowerInitializer {
    pub const ALGORITHM_ID: &'static str = "random_tx";

    pub fn make_with_args(ctx: AlgorithmContext) -> Self {
        let per_ap = parse_arg(&ctx.args, "setDifferentTxPowerPerAp").unwrap_or(false);
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

    fn pick(&self, choices: &[i32]) -> i32 {
        let mut rng = self.rng.lock().expect("rng lock poisoned");
        choices[rng.gen_range(0..choices.len())]
    }
}

impl TpcAlgorithm for RandomTxPowerInitializer {
    fn compute_tx_power_map(&self) -> TxPowerMap {
        let mut tx_power_map = TxPowerMap::new();
        // one value per band unless per-AP randomization was requested
        let mut band_values = BTreeMap::new();

        for (band, channel_to_aps) in aps_per_channel(&self.model, &self.zone_serials) {
            for serial_numbers in channel_to_aps.values() {
                for serial_number in serial_numbers {
                    let choices = tx_power_choices(&self.registry, serial_number, band);
                    let tx_power = if self.per_ap {
                        self.pick(&choices)
                    } else {
                        *band_values
                            .entry(band)
                            .or_insert_with(|| self.pick(&choices))
                    };
                    tx_power_map
                        .entry(serial_number.clone())
                        .or_default()
                        .insert(band, tx_power);
                }
            }
        }
        tx_power_map
    }
}
