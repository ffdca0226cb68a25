//! Random genome generation for initial populations and immigrant injection.

use crate::domain::descriptor::{
    DescriptorId, Indicator, IndicatorKind, StrategyDescriptor, Timeframe, TrailingStop,
};
use crate::domain::ports::DescriptorGenerator;
use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// Samples fresh genomes uniformly from the catalog. Fresh genomes use a
/// narrower stop-loss band and timeframe set than the full mutation space,
/// so early generations start from reasonable defaults.
pub struct RandomDescriptorGenerator {
    rng: StdRng,
}

impl RandomDescriptorGenerator {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self { rng }
    }
}

impl DescriptorGenerator for RandomDescriptorGenerator {
    fn generate(&mut self, generation: u32, ordinal: u32) -> Result<StrategyDescriptor> {
        let rng = &mut self.rng;

        let count = rng.random_range(2..=6);
        let kinds: Vec<IndicatorKind> = IndicatorKind::ALL
            .choose_multiple(rng, count)
            .copied()
            .collect();
        let indicators: Vec<Indicator> = kinds
            .into_iter()
            .map(|kind| Indicator::random(kind, rng))
            .collect();

        let stop_loss = round3(rng.random_range(-0.15..=-0.05));
        let timeframe = *Timeframe::GENERATED
            .choose(rng)
            .unwrap_or(&Timeframe::M5);
        let trailing_stop = if rng.random_bool(0.5) {
            Some(TrailingStop {
                positive: round3(rng.random_range(0.005..=0.02)),
                positive_offset: round3(rng.random_range(0.01..=0.03)),
            })
        } else {
            None
        };
        let buy_conditions = rng.random_range(1..=4);
        let sell_conditions = rng.random_range(1..=4);

        StrategyDescriptor::new(
            DescriptorId::new(generation, ordinal),
            indicators,
            stop_loss,
            timeframe,
            trailing_stop,
            buy_conditions,
            sell_conditions,
        )
        .context("generated descriptor failed validation")
    }
}
