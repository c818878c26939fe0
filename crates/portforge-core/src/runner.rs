use crate::channel::CommandChannel;
use crate::config::Config;
use crate::population::{Individual, Origin, Population, RankedFitness};
use crate::rng::RngPool;
use crate::util::unix_stamp;
use rayon::prelude::*;
use std::cmp::Ordering;
use std::io::{self, Write};
use tracing::{debug, warn};

/// Compute and journal the population diversity each generation.
/// Quadratic in the population size, so off by default.
const PRINT_DIVERSITY: bool = false;

pub struct RunnerOptions {
    /// How many of the best parents to print at the end.
    pub num_to_print: usize,
    pub print_json: bool,
}

/// The evolution driver: bootstraps the population from seeds plus random
/// individuals, then runs epochs of shuffle/reproduce/sort/luck/purge
/// generations, with an optional hill climb at each epoch's end.
pub struct Runner<'r, C: Sync, I: Individual<C>> {
    config: &'r Config,
    rng: &'r RngPool,
    ctx: &'r C,
    population: Population<C, I>,
    options: RunnerOptions,
    journal: Option<Box<dyn Write + 'r>>,
    channel: Option<CommandChannel>,
}

impl<'r, C: Sync, I: Individual<C>> Runner<'r, C, I> {
    pub fn new(
        config: &'r Config,
        rng: &'r RngPool,
        ctx: &'r C,
        seeds: Vec<I>,
        options: RunnerOptions,
        journal: Option<Box<dyn Write + 'r>>,
        mut channel: Option<CommandChannel>,
    ) -> Self {
        if let Some(channel) = channel.as_mut() {
            channel.register("print best");
            channel.register("print all");
        }

        let mut population = Population::new(config.population_size, config.max_child_num());
        let num_seeds = seeds.len();
        for seed in seeds {
            let entry = population.insert_pop(Origin::Initialization);
            entry.elem = seed;
        }
        for _ in num_seeds..config.population_size {
            let entry = population.insert_pop(Origin::Initialization);
            entry.elem.init_randomly(rng, ctx);
        }
        population.finalize();

        let mut runner = Self {
            config,
            rng,
            ctx,
            population,
            options,
            journal,
            channel,
        };
        runner.evaluate_population();
        runner
    }

    pub fn population(&self) -> &Population<C, I> {
        &self.population
    }

    /// Run all epochs and leave the population sorted for reporting.
    pub fn run(&mut self) {
        self.perform_evolution();
        self.sort_population();
    }

    /// Print the top parents, as JSON or in the mapping file format.
    pub fn print_winners(&self, out: &mut dyn Write) -> io::Result<()> {
        let count = self.options.num_to_print.min(self.population.pop_size());
        for pos in 0..count {
            let entry = self.population.entry_at(pos);
            if self.options.print_json {
                serde_json::to_writer_pretty(&mut *out, &entry.elem.to_json(self.ctx))?;
                writeln!(out)?;
            } else {
                entry.write_plain(self.ctx, out)?;
            }
        }
        Ok(())
    }

    fn sort_population(&mut self) {
        if self.config.enable_ratio_combination {
            self.population.ratio_sort();
        } else {
            self.population.rank_sort();
        }
    }

    fn evaluate_population(&mut self) {
        let ctx = self.ctx;
        self.population.par_for_parents(|entry| entry.evaluate(ctx));
    }

    fn perform_evolution(&mut self) {
        for epoch in 0..self.config.num_epochs {
            debug!(epoch, "starting epoch");
            self.journal(|out| writeln!(out, "starting epoch {epoch} {}", unix_stamp()));

            if epoch > 0 {
                // Re-randomize everything but the elite.
                let keep = (self.config.keep_ratio * self.config.population_size as f64).ceil()
                    as usize
                    + 1;
                for idx in keep..self.config.population_size {
                    let rng = self.rng;
                    let ctx = self.ctx;
                    let entry = self.population.replace_pop(idx, Origin::Initialization);
                    entry.elem.init_randomly(rng, ctx);
                }
                self.evaluate_population();
            }

            self.sort_population();
            self.journal_snapshot("  initial population:");

            for gen_idx in 0..self.config.num_iterations {
                self.journal(|out| writeln!(out, "  generation {gen_idx} {}:", unix_stamp()));
                self.population.shuffle(self.rng);
                self.reproduce();
                let curr_gen = self.population.generation();
                self.sort_population();
                self.population.apply_luck(
                    self.rng,
                    self.config.luck_chance,
                    self.config.bad_luck_protection,
                );
                self.population.purge();
                self.sort_population();
                self.journal_generation(curr_gen);
                self.pump_channel();

                let best = self.population.entry_at(0).fitness.clone();
                let worst = self
                    .population
                    .entry_at(self.population.pop_size() - 1)
                    .fitness
                    .clone();
                if fitness_eq::<I::Fitness>(&best, &worst) {
                    debug!(epoch, gen_idx, "population stagnated, ending epoch");
                    break;
                }
                if best.is_optimal() {
                    return;
                }
            }

            if self.config.enable_local_optimization {
                self.journal(|out| writeln!(out, "optimizing locally {}", unix_stamp()));
                let ctx = self.ctx;
                self.population.par_for_parents(|entry| {
                    entry.fitness = entry.elem.optimize_locally(ctx);
                    entry.evaluated = true;
                });
            }

            self.sort_population();
            self.journal_snapshot("  after epoch:");
        }
    }

    /// One generation of reproduction: the shuffled parent slab is split
    /// into per-worker chunks, and each chunk breeds from its own parents
    /// only. Children go through the atomic child cursor and are evaluated
    /// in place.
    fn reproduce(&mut self) {
        let pop_size = self.config.population_size;
        let chunk_size = pop_size.div_ceil(rayon::current_num_threads());
        let chunks: Vec<(usize, usize)> = (0..pop_size)
            .step_by(chunk_size)
            .map(|start| (start, (start + chunk_size).min(pop_size)))
            .collect();

        let population = &self.population;
        let rng = self.rng;
        let ctx = self.ctx;
        let recomb_factor = self.config.max_recombination_factor;
        let mut_factor = self.config.max_mutation_factor;

        chunks.into_par_iter().for_each(|(start, end)| {
            debug_assert!(end > start, "empty reproduction chunk");
            let pairs = (end - start) / 2;
            let num_mutations = (mut_factor * pairs as f64) as usize;
            let num_recomb = (recomb_factor * pairs as f64) as usize;

            for _ in 0..num_mutations {
                let parent_pos = rng.with(|r| r.usize(start..end));
                let parent = &population.entry_at(parent_pos).elem;
                let child = population.insert_child(Origin::Mutation);
                I::mutate(rng, &mut child.elem, parent, ctx);
                child.evaluate(ctx);
            }

            for _ in 0..num_recomb {
                let (pos_a, pos_b) = rng.with(|r| (r.usize(start..end), r.usize(start..end)));
                let parent_a = &population.entry_at(pos_a).elem;
                let parent_b = &population.entry_at(pos_b).elem;
                let child_a = population.insert_child(Origin::Recombination);
                let child_b = population.insert_child(Origin::Recombination);
                I::recombine(
                    rng,
                    &mut child_a.elem,
                    &mut child_b.elem,
                    parent_a,
                    parent_b,
                    ctx,
                );
                child_a.evaluate(ctx);
                child_b.evaluate(ctx);
            }
        });
    }

    fn pump_channel(&mut self) {
        let Some(channel) = self.channel.as_mut() else {
            return;
        };
        let population = &self.population;
        let ctx = self.ctx;
        let result = channel.check_commands(|name, _line, out| match name {
            "print best" => population.entry_at(0).write_plain(ctx, out),
            "print all" => {
                for pos in 0..population.pop_size() {
                    population.entry_at(pos).write_plain(ctx, out)?;
                }
                Ok(())
            }
            _ => Ok(()),
        });
        if let Err(err) = result {
            warn!("command channel error: {err}");
        }
    }

    fn journal(&mut self, f: impl FnOnce(&mut dyn Write) -> io::Result<()>) {
        if let Some(out) = self.journal.as_mut() {
            if let Err(err) = f(out.as_mut()) {
                warn!("journal write failed: {err}");
            }
        }
    }

    fn journal_snapshot(&mut self, header: &str) {
        if self.journal.is_none() {
            return;
        }
        let best = self.population.entry_at(0).fitness.clone();
        let worst = self
            .population
            .entry_at(self.population.pop_size() - 1)
            .fitness
            .clone();
        let diversity = PRINT_DIVERSITY.then(|| self.population.compute_diversity());
        self.journal(|out| {
            writeln!(out, "{header}")?;
            writeln!(out, "    best:      {best}")?;
            writeln!(out, "    worst:     {worst}")?;
            if let Some(diversity) = diversity {
                writeln!(out, "    diversity: {diversity}")?;
            }
            Ok(())
        });
    }

    fn journal_generation(&mut self, curr_gen: u64) {
        if self.journal.is_none() {
            return;
        }
        let pop_size = self.population.pop_size();
        let mut new_survivors = 0usize;
        let mut recomb_survivors = 0usize;
        let mut mut_survivors = 0usize;
        for pos in 0..pop_size {
            let entry = self.population.entry_at(pos);
            if entry.birth_generation == curr_gen {
                new_survivors += 1;
                match entry.origin {
                    Origin::Recombination => recomb_survivors += 1,
                    Origin::Mutation => mut_survivors += 1,
                    Origin::Initialization => {}
                }
            }
        }
        let pct = |n: usize| n as f64 / pop_size as f64 * 100.0;
        let (old_pct, recomb_pct, mut_pct) =
            (100.0 - pct(new_survivors), pct(recomb_survivors), pct(mut_survivors));

        let best = self.population.entry_at(0).fitness.clone();
        let worst = self.population.entry_at(pop_size - 1).fitness.clone();
        let diversity = PRINT_DIVERSITY.then(|| self.population.compute_diversity());
        self.journal(|out| {
            writeln!(out, "    best:      {best}")?;
            writeln!(out, "    worst:     {worst}")?;
            if let Some(diversity) = diversity {
                writeln!(out, "    diversity: {diversity}")?;
            }
            writeln!(out, "    composition:")?;
            writeln!(out, "      old generation:   {old_pct}%")?;
            writeln!(out, "      newly recombined: {recomb_pct}%")?;
            writeln!(out, "      newly mutated:    {mut_pct}%")?;
            Ok(())
        });
    }
}

fn fitness_eq<F: RankedFitness>(a: &F, b: &F) -> bool {
    (0..=F::max_group()).all(|g| F::compare(a, b, g) == Ordering::Equal)
}
