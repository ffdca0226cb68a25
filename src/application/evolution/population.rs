//! Population lifecycle: initialization, fitness bookkeeping and the
//! generational evolve step.

use crate::application::evolution::genetic_ops::{Candidate, GeneticOps, elite, tournament_select};
use crate::config::EvolveParams;
use crate::domain::descriptor::{DescriptorId, StrategyDescriptor};
use crate::domain::errors::EvolutionError;
use crate::domain::metrics::{FitnessRecord, Genealogy, GenerationSnapshot};
use crate::domain::ports::DescriptorGenerator;
use chrono::Utc;
use rand::Rng;
use std::collections::BTreeMap;
use tracing::warn;

/// One generation of candidate strategies. `size` is the target headcount
/// and stays constant across evolve steps; the live descriptor list may
/// shrink below it when evaluation failures drop members.
pub struct Population {
    generation: u32,
    size: usize,
    descriptors: Vec<StrategyDescriptor>,
    records: BTreeMap<DescriptorId, FitnessRecord>,
    genealogy: Genealogy,
}

impl Population {
    /// Builds generation zero from freshly sampled genomes.
    pub fn initialize_random(
        size: usize,
        generator: &mut dyn DescriptorGenerator,
    ) -> Result<Self, EvolutionError> {
        let mut descriptors = Vec::with_capacity(size);
        let mut genealogy = Genealogy::new();
        for ordinal in 0..size {
            let descriptor = generator.generate(0, ordinal as u32).map_err(|e| {
                EvolutionError::GenerationInit {
                    requested: size,
                    reason: e.to_string(),
                }
            })?;
            genealogy.insert(descriptor.id(), Vec::new());
            descriptors.push(descriptor);
        }
        Ok(Self {
            generation: 0,
            size,
            descriptors,
            records: BTreeMap::new(),
            genealogy,
        })
    }

    pub fn from_snapshot(snapshot: GenerationSnapshot) -> Self {
        Self {
            generation: snapshot.generation,
            size: snapshot.size,
            descriptors: snapshot.descriptors,
            records: snapshot.records,
            genealogy: snapshot.genealogy,
        }
    }

    pub fn snapshot(&self) -> GenerationSnapshot {
        GenerationSnapshot {
            generation: self.generation,
            size: self.size,
            descriptors: self.descriptors.clone(),
            records: self.records.clone(),
            genealogy: self.genealogy.clone(),
            created_at: Utc::now(),
        }
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn target_size(&self) -> usize {
        self.size
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub fn descriptors(&self) -> &[StrategyDescriptor] {
        &self.descriptors
    }

    pub fn records(&self) -> &BTreeMap<DescriptorId, FitnessRecord> {
        &self.records
    }

    pub fn genealogy(&self) -> &Genealogy {
        &self.genealogy
    }

    pub fn parents_of(&self, id: DescriptorId) -> &[DescriptorId] {
        self.genealogy.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Members still awaiting a fitness record. Elite carry-overs keep their
    /// record from the previous generation and never show up here.
    pub fn pending_evaluation(&self) -> Vec<StrategyDescriptor> {
        self.descriptors
            .iter()
            .filter(|d| !self.records.contains_key(&d.id()))
            .cloned()
            .collect()
    }

    pub fn fitness_of(&self, id: DescriptorId) -> f64 {
        self.records.get(&id).map(|r| r.fitness).unwrap_or(0.0)
    }

    /// Attaches an evaluation result. A result for an id no longer in the
    /// population is logged and discarded.
    pub fn update_fitness(&mut self, id: DescriptorId, record: FitnessRecord) {
        if !self.descriptors.iter().any(|d| d.id() == id) {
            warn!(%id, "fitness result for unknown descriptor, ignoring");
            return;
        }
        self.records.insert(id, record);
    }

    /// Drops a member, typically after a failed evaluation.
    pub fn remove(&mut self, id: DescriptorId) -> bool {
        let before = self.descriptors.len();
        self.descriptors.retain(|d| d.id() != id);
        if self.descriptors.len() == before {
            return false;
        }
        self.records.remove(&id);
        self.genealogy.remove(&id);
        true
    }

    /// Best `n` members, descending by fitness with the older id first on
    /// exact ties. Unevaluated members count as fitness 0.0.
    pub fn top_n(&self, n: usize) -> Vec<(&StrategyDescriptor, f64)> {
        let candidates = self.candidates();
        elite(&candidates, n)
            .into_iter()
            .map(|d| (d, self.fitness_of(d.id())))
            .collect()
    }

    fn candidates(&self) -> Vec<Candidate<'_>> {
        self.descriptors
            .iter()
            .map(|descriptor| Candidate {
                descriptor,
                fitness: self.fitness_of(descriptor.id()),
            })
            .collect()
    }

    /// Produces the next generation: elites survive unchanged, the bulk of
    /// the offspring comes from tournament-selected crossover and mutation,
    /// and a slice of fresh random genomes keeps the gene pool open.
    ///
    /// The returned population always has exactly `target_size` members.
    pub fn evolve_generation<R: Rng + ?Sized>(
        &self,
        params: &EvolveParams,
        ops: &GeneticOps,
        generator: &mut dyn DescriptorGenerator,
        rng: &mut R,
    ) -> Result<Population, EvolutionError> {
        if self.descriptors.is_empty() {
            return Err(EvolutionError::EmptyPopulation {
                generation: self.generation,
            });
        }

        let next_gen = self.generation + 1;
        let candidates = self.candidates();
        let init_err = |reason: String| EvolutionError::GenerationInit {
            requested: self.size,
            reason,
        };

        let mut descriptors: Vec<StrategyDescriptor> = Vec::with_capacity(self.size);
        let mut records = BTreeMap::new();
        let mut genealogy = Genealogy::new();

        for survivor in elite(&candidates, params.elite_size.min(candidates.len())) {
            if let Some(record) = self.records.get(&survivor.id()) {
                records.insert(survivor.id(), record.clone());
            }
            genealogy.insert(survivor.id(), vec![survivor.id()]);
            descriptors.push(survivor.clone());
        }

        let offspring_quota = self.size.saturating_sub(descriptors.len());
        let random_quota = (offspring_quota as f64 * params.new_random_rate).floor() as usize;
        let evolved_quota = offspring_quota - random_quota;

        let mut ordinal: u32 = 0;
        let mut fresh_id = || {
            let id = DescriptorId::new(next_gen, ordinal);
            ordinal += 1;
            id
        };

        let mut evolved: Vec<(StrategyDescriptor, Vec<DescriptorId>)> =
            Vec::with_capacity(evolved_quota);
        while evolved.len() < evolved_quota {
            let first = tournament_select(&candidates, params.tournament_size, rng)
                .ok_or(EvolutionError::EmptyPopulation {
                    generation: self.generation,
                })?;
            let second = tournament_select(&candidates, params.tournament_size, rng)
                .ok_or(EvolutionError::EmptyPopulation {
                    generation: self.generation,
                })?;

            if first.id() != second.id() && rng.random_bool(params.crossover_rate) {
                let (c1, c2) = ops
                    .crossover(first, second, fresh_id(), fresh_id(), rng)
                    .map_err(|e| init_err(e.to_string()))?;
                let parents = vec![first.id(), second.id()];
                for child in [c1, c2] {
                    if evolved.len() >= evolved_quota {
                        break;
                    }
                    let child = if rng.random_bool(params.mutation_rate) {
                        ops.mutate(&child, child.id(), rng)
                            .map_err(|e| init_err(e.to_string()))?
                    } else {
                        child
                    };
                    evolved.push((child, parents.clone()));
                }
            } else {
                for parent in [first, second] {
                    if evolved.len() >= evolved_quota {
                        break;
                    }
                    let id = fresh_id();
                    let child = if rng.random_bool(params.mutation_rate) {
                        ops.mutate(parent, id, rng)
                            .map_err(|e| init_err(e.to_string()))?
                    } else {
                        parent.with_id(id)
                    };
                    evolved.push((child, vec![parent.id()]));
                }
            }
        }

        for (child, parents) in evolved {
            genealogy.insert(child.id(), parents);
            descriptors.push(child);
        }

        while descriptors.len() < self.size {
            let id = fresh_id();
            let immigrant = generator
                .generate(id.generation, id.ordinal)
                .map_err(|e| init_err(e.to_string()))?;
            genealogy.insert(immigrant.id(), Vec::new());
            descriptors.push(immigrant);
        }
        descriptors.truncate(self.size);

        Ok(Population {
            generation: next_gen,
            size: self.size,
            descriptors,
            records,
            genealogy,
        })
    }
}
