use std::sync::Mutex;

/// Deterministic random source for the search.
///
/// One generator per rayon worker, generator `i` seeded with `seed + i`.
/// Outside a worker pool the first generator is used, so a
/// single-threaded run consumes exactly one stream.
pub struct RngPool {
    rngs: Vec<Mutex<fastrand::Rng>>,
}

impl RngPool {
    pub fn new(seed: u64, num_workers: usize) -> Self {
        let n = num_workers.max(1);
        let rngs = (0..n)
            .map(|i| Mutex::new(fastrand::Rng::with_seed(seed + i as u64)))
            .collect();
        Self { rngs }
    }

    /// Pool sized for the current rayon thread pool.
    pub fn seeded(seed: u64) -> Self {
        Self::new(seed, rayon::current_num_threads())
    }

    /// Run `f` with the calling worker's generator.
    pub fn with<T>(&self, f: impl FnOnce(&mut fastrand::Rng) -> T) -> T {
        let idx = rayon::current_thread_index().unwrap_or(0);
        let cell = self.rngs.get(idx).unwrap_or(&self.rngs[0]);
        let mut rng = match cell.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut rng)
    }

    /// Bernoulli trial with the given chance for `true`.
    pub fn flip(&self, chance: f64) -> bool {
        self.with(|rng| rng.f64() < chance)
    }
}
