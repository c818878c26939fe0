use crate::rng::RngPool;
use rayon::prelude::*;
use serde_json::Value;
use std::cell::UnsafeCell;
use std::cmp::Ordering;
use std::fmt;
use std::io::{self, Write};
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

/// How an individual entered the population.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Initialization,
    Recombination,
    Mutation,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Origin::Initialization => "Initialization",
            Origin::Recombination => "Recombination",
            Origin::Mutation => "Mutation",
        })
    }
}

/// Multi-group fitness ordering used by the population sorts.
pub trait RankedFitness: Clone + Default + Send + Sync + fmt::Display {
    /// Three-way comparison within one ordering group; lower is better.
    fn compare(a: &Self, b: &Self, group: usize) -> Ordering;
    /// Largest declared group index.
    fn max_group() -> usize;
    /// Sum of the component values in `group`, for ratio sorting.
    fn component_value(&self, group: usize) -> f64;
    fn is_optimal(&self) -> bool;
}

/// Capability set the search engine needs from an individual, together
/// with its fitness type. `C` is the immutable evaluation context shared
/// by all operators.
pub trait Individual<C>: Clone + Default + Send + Sync {
    type Fitness: RankedFitness;

    fn init_randomly(&mut self, rng: &RngPool, ctx: &C);
    fn evaluate(&self, ctx: &C) -> Self::Fitness;
    fn recombine(
        rng: &RngPool,
        child_a: &mut Self,
        child_b: &mut Self,
        parent_a: &Self,
        parent_b: &Self,
        ctx: &C,
    );
    fn mutate(rng: &RngPool, child: &mut Self, parent: &Self, ctx: &C);
    fn optimize_locally(&mut self, ctx: &C) -> Self::Fitness;
    fn distance(a: &Self, b: &Self) -> f64;
    fn write_plain(&self, ctx: &C, out: &mut dyn Write) -> io::Result<()>;
    fn to_json(&self, ctx: &C) -> Value;
}

/// One population slot: the individual, its fitness, provenance, and the
/// scratch fields the sorts accumulate into.
pub struct Entry<C, I: Individual<C>> {
    pub elem: I,
    pub fitness: I::Fitness,
    pub evaluated: bool,
    pub birth_generation: u64,
    pub origin: Origin,
    accumulated_position: usize,
    accumulated_value: f64,
}

impl<C, I: Individual<C>> Entry<C, I> {
    fn new(birth_generation: u64, origin: Origin) -> Self {
        Self {
            elem: I::default(),
            fitness: I::Fitness::default(),
            evaluated: false,
            birth_generation,
            origin,
            accumulated_position: 0,
            accumulated_value: 0.0,
        }
    }

    pub fn evaluate(&mut self, ctx: &C) {
        if !self.evaluated {
            self.fitness = self.elem.evaluate(ctx);
            self.evaluated = true;
        }
    }

    pub fn write_plain(&self, ctx: &C, out: &mut dyn Write) -> io::Result<()> {
        self.elem.write_plain(ctx, out)?;
        writeln!(out, "# with fitness value {}", self.fitness)?;
        writeln!(
            out,
            "# created in generation {} from {}",
            self.birth_generation, self.origin
        )
    }
}

struct Slot<E>(UnsafeCell<Option<E>>);

// The atomic cursors hand out each slot index at most once per
// generation, so concurrent writers never share a slot.
unsafe impl<E: Send> Sync for Slot<E> {}

/// Fixed-capacity arena of individuals.
///
/// Positions `[0, pop_size)` are the parent slab, positions behind it the
/// child slab. Children may be inserted (and their slots initialized)
/// concurrently through the atomic child cursor; every other operation
/// requires exclusive access. `order` is a permutation of slot indices:
/// shuffling, sorting and swapping move handles, never entries.
pub struct Population<C, I: Individual<C>> {
    slots: Box<[Slot<Entry<C, I>>]>,
    order: Vec<usize>,
    pop_size: usize,
    first_free_pop: AtomicUsize,
    first_free_child: AtomicUsize,
    finalized: bool,
    generation: u64,
}

impl<C, I: Individual<C>> Population<C, I> {
    pub fn new(pop_size: usize, max_child_num: usize) -> Self {
        assert!(pop_size > 0, "empty parent slab");
        assert!(max_child_num > 0, "population needs room for children");
        let capacity = pop_size + max_child_num;
        let slots: Box<[Slot<Entry<C, I>>]> = (0..capacity)
            .map(|_| Slot(UnsafeCell::new(None)))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            slots,
            order: (0..capacity).collect(),
            pop_size,
            first_free_pop: AtomicUsize::new(0),
            first_free_child: AtomicUsize::new(pop_size),
            finalized: false,
            generation: 0,
        }
    }

    pub fn pop_size(&self) -> usize {
        self.pop_size
    }

    /// One past the last live position (parents plus current children).
    pub fn children_end(&self) -> usize {
        self.first_free_child.load(AtomicOrdering::Acquire)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    fn slot(&self, storage: usize) -> &Entry<C, I> {
        // Live positions always reference initialized slots.
        unsafe { (*self.slots[storage].0.get()).as_ref() }.expect("read of an empty population slot")
    }

    fn slot_mut(&mut self, storage: usize) -> &mut Entry<C, I> {
        self.slots[storage]
            .0
            .get_mut()
            .as_mut()
            .expect("write to an empty population slot")
    }

    pub fn entry_at(&self, pos: usize) -> &Entry<C, I> {
        debug_assert!(pos < self.children_end());
        self.slot(self.order[pos])
    }

    pub fn entry_at_mut(&mut self, pos: usize) -> &mut Entry<C, I> {
        debug_assert!(pos < self.children_end());
        let storage = self.order[pos];
        self.slot_mut(storage)
    }

    /// Reserve the next parent slot during bootstrap.
    pub fn insert_pop(&mut self, origin: Origin) -> &mut Entry<C, I> {
        assert!(!self.finalized, "parent slab is sealed after finalize");
        let pos = self.first_free_pop.fetch_add(1, AtomicOrdering::AcqRel);
        assert!(pos < self.pop_size, "parent slab overflow");
        let generation = self.generation;
        let storage = self.order[pos];
        let cell = self.slots[storage].0.get_mut();
        *cell = Some(Entry::new(generation, origin));
        cell.as_mut().expect("slot was just filled")
    }

    /// Drop the entry at parent position `idx` and start a fresh one in
    /// its place; used by epoch restarts.
    pub fn replace_pop(&mut self, idx: usize, origin: Origin) -> &mut Entry<C, I> {
        debug_assert!(idx < self.pop_size);
        let generation = self.generation;
        let storage = self.order[idx];
        let cell = self.slots[storage].0.get_mut();
        *cell = Some(Entry::new(generation, origin));
        cell.as_mut().expect("slot was just filled")
    }

    /// Reserve an exclusive child slot; safe to call from multiple rayon
    /// workers at once. The returned entry is freshly initialized and not
    /// visible to any other caller until the next sort.
    #[allow(clippy::mut_from_ref)]
    pub fn insert_child(&self, origin: Origin) -> &mut Entry<C, I> {
        assert!(self.finalized, "children require a finalized population");
        let pos = self.first_free_child.fetch_add(1, AtomicOrdering::AcqRel);
        assert!(pos < self.order.len(), "child slab overflow");
        let storage = self.order[pos];
        // The fetch_add above made `pos`, and therefore `storage`,
        // exclusive to this caller until the next purge.
        unsafe {
            let cell = &mut *self.slots[storage].0.get();
            *cell = Some(Entry::new(self.generation, origin));
            cell.as_mut().expect("slot was just filled")
        }
    }

    /// Seal the parent slab. Valid only once the slab is exactly full and
    /// no children exist yet.
    pub fn finalize(&mut self) {
        assert!(self.order.len() > self.pop_size);
        assert_eq!(
            self.first_free_pop.load(AtomicOrdering::Acquire),
            self.pop_size,
            "finalize before the parent slab was full"
        );
        assert_eq!(
            self.first_free_child.load(AtomicOrdering::Acquire),
            self.pop_size
        );
        self.generation += 1;
        self.finalized = true;
    }

    /// Uniformly permute the parent slab, so that chunked reproduction
    /// sees random mate pairings.
    pub fn shuffle(&mut self, rng: &RngPool) {
        debug_assert!(self.finalized);
        let pop = self.pop_size;
        let order = &mut self.order[..pop];
        rng.with(|r| r.shuffle(order));
    }

    pub fn swap(&mut self, a: usize, b: usize) {
        debug_assert!(a < self.children_end() && b < self.children_end());
        self.order.swap(a, b);
    }

    /// Luck: each child position survives with probability `luck_chance`
    /// by trading places with a random parent outside the protected top
    /// `bad_luck_protection` fraction. The exiled parent lands in the
    /// child slab, which is about to be purged.
    pub fn apply_luck(&mut self, rng: &RngPool, luck_chance: f64, bad_luck_protection: f64) {
        let pop_end = self.pop_size;
        let children_end = self.children_end();
        let first_unprotected =
            ((bad_luck_protection * pop_end as f64) as usize).min(pop_end - 1);
        for pos in pop_end..children_end {
            if rng.flip(luck_chance) {
                let partner = rng.with(|r| r.usize(first_unprotected..pop_end));
                self.swap(pos, partner);
            }
        }
    }

    /// Drop every child and advance the generation counter.
    pub fn purge(&mut self) {
        debug_assert!(self.finalized);
        let end = self.children_end();
        for pos in self.pop_size..end {
            let storage = self.order[pos];
            *self.slots[storage].0.get_mut() = None;
        }
        self.first_free_child
            .store(self.pop_size, AtomicOrdering::Release);
        self.generation += 1;
    }

    /// Mean-rank sort over parents and children: sort once per fitness
    /// group, accumulate each entry's position, then order by the
    /// accumulated positions.
    pub fn rank_sort(&mut self) {
        debug_assert!(self.finalized);
        let end = self.children_end();
        for pos in 0..end {
            self.entry_at_mut(pos).accumulated_position = 0;
        }
        for group in 0..=I::Fitness::max_group() {
            self.sort_region_by(end, |a, b| {
                I::Fitness::compare(&a.fitness, &b.fitness, group)
            });
            for pos in 0..end {
                self.entry_at_mut(pos).accumulated_position += pos;
            }
        }
        self.sort_region_by(end, |a, b| {
            a.accumulated_position.cmp(&b.accumulated_position)
        });
    }

    /// Like `rank_sort`, but per group each entry accumulates its
    /// component-value sum linearly rescaled into `[1, 1001]`, which
    /// weighs the magnitude of fitness differences, not just their order.
    pub fn ratio_sort(&mut self) {
        debug_assert!(self.finalized);
        let end = self.children_end();
        for pos in 0..end {
            self.entry_at_mut(pos).accumulated_value = 0.0;
        }
        for group in 0..=I::Fitness::max_group() {
            let mut min_val = f64::INFINITY;
            let mut max_val = f64::NEG_INFINITY;
            for pos in 0..end {
                let val = self.entry_at(pos).fitness.component_value(group);
                if val.is_finite() {
                    min_val = min_val.min(val);
                    max_val = max_val.max(val);
                }
            }
            for pos in 0..end {
                let val = self.entry_at(pos).fitness.component_value(group);
                let rescaled = if !val.is_finite() {
                    1001.0
                } else if max_val <= min_val {
                    1.0
                } else {
                    (1000.0 * (val - min_val)) / (max_val - min_val) + 1.0
                };
                self.entry_at_mut(pos).accumulated_value += rescaled;
            }
        }
        self.sort_region_by(end, |a, b| {
            a.accumulated_value.total_cmp(&b.accumulated_value)
        });
    }

    fn sort_region_by(
        &mut self,
        end: usize,
        cmp: impl Fn(&Entry<C, I>, &Entry<C, I>) -> Ordering,
    ) {
        let mut region: Vec<usize> = self.order[..end].to_vec();
        region.sort_by(|&a, &b| cmp(self.slot(a), self.slot(b)));
        self.order[..end].copy_from_slice(&region);
    }

    /// Mean pairwise distance between parents. Quadratic; reporting only.
    pub fn compute_diversity(&self) -> f64 {
        let mut result = 0.0;
        for a in 0..self.pop_size {
            for b in (a + 1)..self.pop_size {
                result += I::distance(&self.entry_at(a).elem, &self.entry_at(b).elem);
            }
        }
        result / self.pop_size as f64
    }

    /// Run `f` over every parent entry in parallel.
    pub fn par_for_parents<F>(&mut self, f: F)
    where
        F: Fn(&mut Entry<C, I>) + Sync,
        Entry<C, I>: Send,
    {
        let slots = &self.slots;
        self.order[..self.pop_size].par_iter().for_each(|&storage| {
            // Parent storage indices are distinct, so every worker holds
            // an exclusive entry.
            let entry = unsafe { (*slots[storage].0.get()).as_mut() }
                .expect("read of an empty population slot");
            f(entry);
        });
    }
}
