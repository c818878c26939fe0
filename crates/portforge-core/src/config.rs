use serde::{Deserialize, Serialize};

/// Search parameters, read from the `configuration:` file format or left
/// at their defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Size of the parent slab of the population.
    pub population_size: usize,
    /// Recombined children per parent pair and generation.
    pub max_recombination_factor: f64,
    /// Mutated children per parent pair and generation.
    pub max_mutation_factor: f64,
    /// Generations per epoch.
    pub num_iterations: usize,
    /// Number of epochs; all but an elite are re-randomized in between.
    pub num_epochs: usize,
    /// Fraction of the population preserved across an epoch restart.
    pub keep_ratio: f64,
    /// Chance for a doomed child to be swapped into the parent slab.
    pub luck_chance: f64,
    /// Fraction of top parents that can never be exiled by a luck swap.
    pub bad_luck_protection: f64,
    pub mut_add_uop_chance: f64,
    pub mut_change_uop_chance: f64,
    pub mut_change_num_chance: f64,
    /// Run the per-instruction hill climb at the end of each epoch.
    pub enable_local_optimization: bool,
    /// Sort by rescaled component sums instead of mean rank.
    pub enable_ratio_combination: bool,
    /// Default port count; the CLI may override it.
    pub num_ports: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            population_size: 200,
            max_recombination_factor: 1.0,
            max_mutation_factor: 1.0,
            num_iterations: 100,
            num_epochs: 3,
            keep_ratio: 0.1,
            luck_chance: 0.1,
            bad_luck_protection: 0.05,
            mut_add_uop_chance: 0.04,
            mut_change_uop_chance: 0.04,
            mut_change_num_chance: 0.04,
            enable_local_optimization: true,
            enable_ratio_combination: false,
            num_ports: 8,
        }
    }
}

impl Config {
    /// Capacity of the child slab: enough for every chunk to emit its full
    /// quota of recombined and mutated children in one generation.
    pub fn max_child_num(&self) -> usize {
        (self.population_size as f64 * (self.max_recombination_factor + self.max_mutation_factor))
            .ceil() as usize
    }
}
