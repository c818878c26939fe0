use super::{EntryVec, Mapping};
use crate::arch::{Uop, UopCount};
use crate::eval::EvalInfo;
use crate::fitness::Fitness;
use crate::rng::RngPool;
use std::cmp::Ordering;

impl Mapping {
    /// Fill the mapping with random entries for every instruction.
    ///
    /// Counts are scaled by the measured singleton cycles, which is not a
    /// formal bound but keeps initial volumes in a plausible range. The
    /// result is normalized.
    pub fn init_randomly(&mut self, pool: &RngPool, eval: &EvalInfo) {
        let num_ports = eval.arch.num_ports();
        pool.with(|rng| {
            for insn in eval.arch.insns() {
                let id = insn.id();
                let t = eval.singleton_cycles_of(id);
                let num_distinct = rng.usize(1..=num_ports);
                for _ in 0..num_distinct {
                    let num_used = rng.usize(1..=num_ports);
                    let mut ports: Vec<usize> = (0..num_ports).collect();
                    rng.shuffle(&mut ports);
                    let uop: Uop = ports[..num_used].iter().fold(0, |m, &p| m | (1 << p));
                    let max_instances = (t * num_used as f64) as UopCount + 1;
                    let count = rng.u32(1..=max_instances);
                    self.add_entry(id, uop, count);
                }
            }
        });
        self.normalize();
    }

    /// One-point crossover, independently per instruction, over the
    /// shuffled concatenation of both parents' entries. Both children are
    /// normalized; duplicate uops lose to the earlier entry.
    pub fn recombine(
        pool: &RngPool,
        child_a: &mut Mapping,
        child_b: &mut Mapping,
        parent_a: &Mapping,
        parent_b: &Mapping,
        eval: &EvalInfo,
    ) {
        pool.with(|rng| {
            for insn in eval.arch.insns() {
                let id = insn.id();
                let mut pooled: EntryVec =
                    Vec::with_capacity(parent_a.entries(id).len() + parent_b.entries(id).len());
                pooled.extend_from_slice(parent_a.entries(id));
                pooled.extend_from_slice(parent_b.entries(id));
                rng.shuffle(&mut pooled);
                match pooled.len() {
                    0 => {}
                    1 => {
                        let (uop, count) = pooled[0];
                        child_a.add_entry(id, uop, count);
                    }
                    len => {
                        let split = rng.usize(1..len);
                        for &(uop, count) in &pooled[..split] {
                            child_a.add_entry(id, uop, count);
                        }
                        for &(uop, count) in &pooled[split..] {
                            child_b.add_entry(id, uop, count);
                        }
                    }
                }
            }
        });
        child_a.normalize();
        child_b.normalize();
    }

    /// Point mutations per inherited entry (swap the uop for one found
    /// elsewhere in the parent, or nudge the count), plus a geometric
    /// number of freshly adopted entries. The child is normalized.
    pub fn mutate(pool: &RngPool, child: &mut Mapping, parent: &Mapping, eval: &EvalInfo) {
        let add_uop = eval.config.mut_add_uop_chance;
        let change_uop = eval.config.mut_change_uop_chance;
        let change_num = eval.config.mut_change_num_chance;
        pool.with(|rng| {
            for insn in eval.arch.insns() {
                let id = insn.id();
                let parent_vec = parent.entries(id);
                let mut total: u64 = parent_vec.iter().map(|&(_, n)| u64::from(n)).sum();
                for &(uop, count) in parent_vec {
                    let mut this_uop = uop;
                    let mut this_count = count;
                    if rng.f64() < change_uop {
                        if let Some((new_uop, _)) = random_parent_entry(rng, parent, eval) {
                            // Rescale the count so the port volume stays
                            // roughly constant under the swap.
                            this_count =
                                (this_count * new_uop.count_ones()) / this_uop.count_ones();
                            this_uop = new_uop;
                        }
                    } else if rng.f64() < change_num {
                        if rng.bool() {
                            this_count += 1;
                            total += 1;
                        } else if total > 1 {
                            this_count = this_count.saturating_sub(1);
                            total -= 1;
                        }
                    }
                    if this_count == 0 {
                        this_count = 1;
                    }
                    child.add_entry(id, this_uop, this_count);
                }
                while rng.f64() < add_uop {
                    if let Some((new_uop, max_count)) = random_parent_entry(rng, parent, eval) {
                        child.add_entry(id, new_uop, rng.u32(1..=max_count));
                    }
                }
            }
        });
        child.normalize();
    }

    /// Hill climb on the entry counts, one instruction at a time, judged
    /// by the fitness over that instruction's relevant experiments.
    /// Returns the re-evaluated global fitness.
    ///
    /// Instructions whose counts end up unchanged keep sharing their entry
    /// vector with whatever the mapping was cloned from.
    pub fn optimize_locally(&mut self, eval: &EvalInfo) -> Fitness {
        for insn in eval.arch.insns() {
            let id = insn.id();
            let mut prev_fitness = self.evaluate_insn(eval, id);
            let shared = self.entries_handle(id);
            let mut changed = false;

            for idx in 0..shared.len() {
                let n_before = self.entries(id)[idx].1;
                if n_before == 0 {
                    continue;
                }

                // Shrinking is tried first; equal fitness still accepts,
                // which biases toward smaller counts.
                self.entries_mut(id)[idx].1 = n_before - 1;
                let mut new_fitness = self.evaluate_insn(eval, id);
                if Fitness::compare(&new_fitness, &prev_fitness, 0) != Ordering::Greater {
                    changed = true;
                    prev_fitness = new_fitness;
                    while self.entries(id)[idx].1 > 0 {
                        let n = self.entries(id)[idx].1;
                        self.entries_mut(id)[idx].1 = n - 1;
                        new_fitness = self.evaluate_insn(eval, id);
                        if Fitness::compare(&new_fitness, &prev_fitness, 0) == Ordering::Greater {
                            self.entries_mut(id)[idx].1 = n;
                            break;
                        }
                        prev_fitness = new_fitness;
                    }
                    continue;
                }

                // Growing must improve strictly.
                self.entries_mut(id)[idx].1 = n_before + 1;
                new_fitness = self.evaluate_insn(eval, id);
                if Fitness::compare(&new_fitness, &prev_fitness, 0) == Ordering::Less {
                    changed = true;
                    prev_fitness = new_fitness;
                    loop {
                        let n = self.entries(id)[idx].1;
                        self.entries_mut(id)[idx].1 = n + 1;
                        new_fitness = self.evaluate_insn(eval, id);
                        if Fitness::compare(&new_fitness, &prev_fitness, 0) != Ordering::Less {
                            self.entries_mut(id)[idx].1 = n;
                            break;
                        }
                        prev_fitness = new_fitness;
                    }
                    continue;
                }

                self.entries_mut(id)[idx].1 = n_before;
            }

            if !changed {
                self.set_entries(id, shared);
            }
        }

        self.normalize();
        self.evaluate(eval)
    }
}

fn random_parent_entry(
    rng: &mut fastrand::Rng,
    parent: &Mapping,
    eval: &EvalInfo,
) -> Option<(Uop, UopCount)> {
    let insns = eval.arch.insns();
    let vec = parent.entries(insns[rng.usize(0..insns.len())].id());
    if vec.is_empty() {
        None
    } else {
        Some(vec[rng.usize(0..vec.len())])
    }
}
