//! Genetic operators: mutation, crossover and parent selection.
//!
//! Operators never mutate a descriptor in place. They build a draft, adjust
//! it, and re-validate on `finish`, so an invalid genome can never escape
//! into the population.

use crate::domain::descriptor::{
    DescriptorDraft, DescriptorId, Indicator, IndicatorKind, MAX_CONDITIONS, MAX_INDICATORS,
    MIN_CONDITIONS, MIN_INDICATORS, STOP_LOSS_MAX, STOP_LOSS_MIN, StrategyDescriptor, Timeframe,
    TrailingStop,
};
use crate::domain::errors::DescriptorError;
use rand::Rng;
use rand::seq::IndexedRandom;

/// A descriptor paired with its fitness, as seen by the selection operators.
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    pub descriptor: &'a StrategyDescriptor,
    pub fitness: f64,
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// Stateless operator set. Randomness comes from the caller so a seeded run
/// replays identically.
pub struct GeneticOps {
    mutation_strength: f64,
}

impl GeneticOps {
    pub fn new(mutation_strength: f64) -> Self {
        Self { mutation_strength }
    }

    /// Produces a mutated copy of `parent` under a fresh identity. Each of
    /// the three gene groups mutates independently; a draw that touches no
    /// group returns an unchanged clone.
    pub fn mutate<R: Rng + ?Sized>(
        &self,
        parent: &StrategyDescriptor,
        id: DescriptorId,
        rng: &mut R,
    ) -> Result<StrategyDescriptor, DescriptorError> {
        let mut draft = DescriptorDraft::from(parent);
        draft.id = id;

        if rng.random_bool(0.5) {
            self.mutate_parameters(&mut draft, rng);
        }
        if rng.random_bool(0.3) {
            mutate_indicators(&mut draft, rng);
        }
        if rng.random_bool(0.2) {
            mutate_conditions(&mut draft, rng);
        }

        draft.finish()
    }

    fn mutate_parameters<R: Rng + ?Sized>(&self, draft: &mut DescriptorDraft, rng: &mut R) {
        if rng.random_bool(0.5) {
            let factor = 1.0 + rng.random_range(-self.mutation_strength..=self.mutation_strength);
            draft.stop_loss = round3((draft.stop_loss * factor).clamp(STOP_LOSS_MIN, STOP_LOSS_MAX));
        }
        if rng.random_bool(0.3) {
            draft.trailing_stop = match draft.trailing_stop {
                Some(_) => None,
                None => Some(TrailingStop {
                    positive: round3(rng.random_range(0.005..=0.02)),
                    positive_offset: round3(rng.random_range(0.01..=0.03)),
                }),
            };
        }
        if rng.random_bool(0.2) {
            // Mutation may reach H4 even though fresh genomes never start there.
            if let Some(tf) = Timeframe::ALL.choose(rng) {
                draft.timeframe = *tf;
            }
        }
    }

    /// Crosses two parents into two children. The concrete scheme is drawn
    /// uniformly per call.
    pub fn crossover<R: Rng + ?Sized>(
        &self,
        first: &StrategyDescriptor,
        second: &StrategyDescriptor,
        first_id: DescriptorId,
        second_id: DescriptorId,
        rng: &mut R,
    ) -> Result<(StrategyDescriptor, StrategyDescriptor), DescriptorError> {
        let mut a = DescriptorDraft::from(first);
        let mut b = DescriptorDraft::from(second);
        a.id = first_id;
        b.id = second_id;

        match rng.random_range(0..3) {
            0 => single_point_crossover(&mut a, &mut b, rng),
            1 => uniform_crossover(&mut a, &mut b, rng),
            _ => indicator_swap_crossover(&mut a, &mut b, rng),
        }

        let pool: Vec<Indicator> = first
            .indicators()
            .iter()
            .chain(second.indicators())
            .cloned()
            .collect();
        repair_indicators(&mut a.indicators, &pool, rng);
        repair_indicators(&mut b.indicators, &pool, rng);

        Ok((a.finish()?, b.finish()?))
    }
}

fn mutate_indicators<R: Rng + ?Sized>(draft: &mut DescriptorDraft, rng: &mut R) {
    let present: Vec<IndicatorKind> = draft.indicators.iter().map(Indicator::kind).collect();
    let absent: Vec<IndicatorKind> = IndicatorKind::ALL
        .iter()
        .copied()
        .filter(|kind| !present.contains(kind))
        .collect();

    let mut actions = Vec::with_capacity(3);
    if draft.indicators.len() < MAX_INDICATORS && !absent.is_empty() {
        actions.push(0);
    }
    if draft.indicators.len() > MIN_INDICATORS {
        actions.push(1);
    }
    if !absent.is_empty() {
        actions.push(2);
    }

    match actions.choose(rng).copied() {
        Some(0) => {
            if let Some(kind) = absent.choose(rng) {
                draft.indicators.push(Indicator::random(*kind, rng));
            }
        }
        Some(1) => {
            let index = rng.random_range(0..draft.indicators.len());
            draft.indicators.remove(index);
        }
        Some(2) => {
            if let Some(kind) = absent.choose(rng) {
                let index = rng.random_range(0..draft.indicators.len());
                draft.indicators[index] = Indicator::random(*kind, rng);
            }
        }
        _ => {}
    }
}

fn mutate_conditions<R: Rng + ?Sized>(draft: &mut DescriptorDraft, rng: &mut R) {
    for count in [&mut draft.buy_conditions, &mut draft.sell_conditions] {
        if rng.random_bool(0.5) {
            let delta: i8 = if rng.random_bool(0.5) { 1 } else { -1 };
            *count = (*count as i8 + delta).clamp(MIN_CONDITIONS as i8, MAX_CONDITIONS as i8) as u8;
        }
    }
}

/// Splits each parent's indicator list at its own random index and swaps the
/// tails, so children can end up longer or shorter than either parent.
/// Scalars may swap as a block.
fn single_point_crossover<R: Rng + ?Sized>(
    a: &mut DescriptorDraft,
    b: &mut DescriptorDraft,
    rng: &mut R,
) {
    if !a.indicators.is_empty() && !b.indicators.is_empty() {
        let cut_a = rng.random_range(1..=a.indicators.len());
        let cut_b = rng.random_range(1..=b.indicators.len());
        let a_tail: Vec<Indicator> = a.indicators.split_off(cut_a);
        let b_tail: Vec<Indicator> = b.indicators.split_off(cut_b);
        a.indicators.extend(b_tail);
        b.indicators.extend(a_tail);
    }
    if rng.random_bool(0.5) {
        std::mem::swap(&mut a.stop_loss, &mut b.stop_loss);
    }
    if rng.random_bool(0.5) {
        std::mem::swap(&mut a.timeframe, &mut b.timeframe);
    }
}

/// Assigns every gene to a child by coin flip. Indicator kinds from both
/// parents form a shared pool that is partitioned between the children.
fn uniform_crossover<R: Rng + ?Sized>(
    a: &mut DescriptorDraft,
    b: &mut DescriptorDraft,
    rng: &mut R,
) {
    if rng.random_bool(0.5) {
        std::mem::swap(&mut a.stop_loss, &mut b.stop_loss);
    }
    if rng.random_bool(0.5) {
        std::mem::swap(&mut a.timeframe, &mut b.timeframe);
    }
    if rng.random_bool(0.5) {
        std::mem::swap(&mut a.trailing_stop, &mut b.trailing_stop);
    }
    if rng.random_bool(0.5) {
        std::mem::swap(&mut a.buy_conditions, &mut b.buy_conditions);
    }
    if rng.random_bool(0.5) {
        std::mem::swap(&mut a.sell_conditions, &mut b.sell_conditions);
    }

    let mut pool: Vec<Indicator> = Vec::new();
    for indicator in a.indicators.drain(..).chain(b.indicators.drain(..)) {
        if !pool.iter().any(|other| other.kind() == indicator.kind()) {
            pool.push(indicator);
        }
    }
    for indicator in pool {
        if rng.random_bool(0.5) {
            a.indicators.push(indicator);
        } else {
            b.indicators.push(indicator);
        }
    }
}

/// Children stay close to their parents: only one or two indicators trade
/// places, and only when the swap introduces no duplicate kind.
fn indicator_swap_crossover<R: Rng + ?Sized>(
    a: &mut DescriptorDraft,
    b: &mut DescriptorDraft,
    rng: &mut R,
) {
    let swaps = rng.random_range(1..=2);
    for _ in 0..swaps {
        if a.indicators.is_empty() || b.indicators.is_empty() {
            break;
        }
        let i = rng.random_range(0..a.indicators.len());
        let j = rng.random_range(0..b.indicators.len());
        let from_a = a.indicators[i].kind();
        let from_b = b.indicators[j].kind();
        let a_accepts = from_a == from_b
            || !a.indicators.iter().any(|ind| ind.kind() == from_b);
        let b_accepts = from_a == from_b
            || !b.indicators.iter().any(|ind| ind.kind() == from_a);
        if a_accepts && b_accepts {
            std::mem::swap(&mut a.indicators[i], &mut b.indicators[j]);
        }
    }
}

/// Brings an indicator list back inside the genome invariants: duplicates
/// collapse to the first occurrence, overlong lists truncate, short lists
/// top up from the parents' pool and then from the full catalog.
fn repair_indicators<R: Rng + ?Sized>(
    indicators: &mut Vec<Indicator>,
    pool: &[Indicator],
    rng: &mut R,
) {
    let mut seen: Vec<IndicatorKind> = Vec::with_capacity(indicators.len());
    indicators.retain(|indicator| {
        let kind = indicator.kind();
        if seen.contains(&kind) {
            false
        } else {
            seen.push(kind);
            true
        }
    });

    indicators.truncate(MAX_INDICATORS);

    while indicators.len() < MIN_INDICATORS {
        let missing: Vec<&Indicator> = pool
            .iter()
            .filter(|candidate| {
                !indicators
                    .iter()
                    .any(|present| present.kind() == candidate.kind())
            })
            .collect();
        if let Some(candidate) = missing.choose(rng) {
            indicators.push((*candidate).clone());
            continue;
        }
        let absent: Vec<IndicatorKind> = IndicatorKind::ALL
            .iter()
            .copied()
            .filter(|kind| !indicators.iter().any(|present| present.kind() == *kind))
            .collect();
        match absent.choose(rng) {
            Some(kind) => indicators.push(Indicator::random(*kind, rng)),
            None => break,
        }
    }
}

/// Tournament selection: best of `k` uniformly sampled candidates. Ties go
/// to the first sampled candidate, and `k` is capped at the pool size.
pub fn tournament_select<'a, R: Rng + ?Sized>(
    candidates: &[Candidate<'a>],
    k: usize,
    rng: &mut R,
) -> Option<&'a StrategyDescriptor> {
    if candidates.is_empty() {
        return None;
    }
    let k = k.min(candidates.len()).max(1);
    let mut best: Option<&Candidate<'a>> = None;
    for index in rand::seq::index::sample(rng, candidates.len(), k) {
        let contender = &candidates[index];
        match best {
            Some(current) if contender.fitness <= current.fitness => {}
            _ => best = Some(contender),
        }
    }
    best.map(|c| c.descriptor)
}

/// Fitness-proportionate selection. Non-positive total mass degenerates to
/// a uniform draw.
pub fn roulette_select<'a, R: Rng + ?Sized>(
    candidates: &[Candidate<'a>],
    rng: &mut R,
) -> Option<&'a StrategyDescriptor> {
    if candidates.is_empty() {
        return None;
    }
    let total: f64 = candidates.iter().map(|c| c.fitness.max(0.0)).sum();
    if total <= 0.0 {
        return candidates.choose(rng).map(|c| c.descriptor);
    }
    let mut spin = rng.random_range(0.0..total);
    for candidate in candidates {
        spin -= candidate.fitness.max(0.0);
        if spin <= 0.0 {
            return Some(candidate.descriptor);
        }
    }
    candidates.last().map(|c| c.descriptor)
}

/// Rank-based selection: the best candidate carries weight `n`, the worst
/// weight 1, independent of the fitness magnitudes.
pub fn rank_select<'a, R: Rng + ?Sized>(
    candidates: &[Candidate<'a>],
    rng: &mut R,
) -> Option<&'a StrategyDescriptor> {
    if candidates.is_empty() {
        return None;
    }
    let mut order: Vec<usize> = (0..candidates.len()).collect();
    order.sort_by(|&i, &j| {
        candidates[j]
            .fitness
            .total_cmp(&candidates[i].fitness)
            .then_with(|| candidates[i].descriptor.id().cmp(&candidates[j].descriptor.id()))
    });

    let n = order.len();
    let total = n * (n + 1) / 2;
    let mut spin = rng.random_range(0..total);
    for (position, &index) in order.iter().enumerate() {
        let weight = n - position;
        if spin < weight {
            return Some(candidates[index].descriptor);
        }
        spin -= weight;
    }
    order.last().map(|&i| candidates[i].descriptor)
}

/// The `n` fittest candidates, descending by fitness with the older id
/// winning exact ties. Deterministic for a given candidate set.
pub fn elite<'a>(candidates: &[Candidate<'a>], n: usize) -> Vec<&'a StrategyDescriptor> {
    let mut sorted: Vec<&Candidate<'a>> = candidates.iter().collect();
    sorted.sort_by(|a, b| {
        b.fitness
            .total_cmp(&a.fitness)
            .then_with(|| a.descriptor.id().cmp(&b.descriptor.id()))
    });
    sorted
        .into_iter()
        .take(n)
        .map(|c| c.descriptor)
        .collect()
}
