use super::Mapping;
use crate::arch::{Architecture, InsnId, Uop};
use crate::eval::EvalInfo;
use crate::experiment::Experiment;
use crate::fitness::Fitness;
use std::collections::HashMap;

impl Mapping {
    /// Predicted cycles per iteration for one experiment.
    ///
    /// This is the closed form of the LP that spreads each uop's count
    /// over its allowed ports so that the most loaded port is minimal: the
    /// bottleneck is the maximum, over non-empty port subsets `q`, of the
    /// count mass confined to `q` divided by `|q|`.
    pub fn simulate_experiment(&self, arch: &Architecture, exp: &Experiment) -> f64 {
        let mut agg: HashMap<Uop, u64> = HashMap::new();
        for &insn in exp.insn_seq() {
            for &(uop, count) in self.entries(insn) {
                *agg.entry(uop).or_insert(0) += u64::from(count);
            }
        }
        if agg.is_empty() {
            return 0.0;
        }
        let uops: Vec<(Uop, f64)> = agg.into_iter().map(|(u, n)| (u, n as f64)).collect();

        let mut max_load = 0.0_f64;
        for q in 1..=arch.largest_uop() {
            let mut load = 0.0;
            for &(uop, count) in &uops {
                if uop & !q == 0 {
                    load += count;
                }
            }
            load /= f64::from(q.count_ones());
            if load > max_load {
                max_load = load;
            }
        }
        max_load
    }

    /// Fitness against the full experiment set.
    pub fn evaluate(&self, eval: &EvalInfo) -> Fitness {
        self.evaluate_over(eval.arch, eval.exps.iter())
    }

    /// Fitness restricted to the experiments containing `insn`; drives the
    /// local hill climb.
    pub(crate) fn evaluate_insn(&self, eval: &EvalInfo, insn: InsnId) -> Fitness {
        self.evaluate_over(
            eval.arch,
            eval.relevant_exps(insn).iter().map(|&idx| &eval.exps[idx]),
        )
    }

    fn evaluate_over<'e>(
        &self,
        arch: &Architecture,
        exps: impl Iterator<Item = &'e Experiment>,
    ) -> Fitness {
        let mut max_err = 0.0_f64;
        let mut sum_err = 0.0_f64;
        let mut singleton_sum_err = 0.0_f64;
        let mut num_exps = 0usize;
        let mut num_singletons = 0usize;

        for exp in exps {
            num_exps += 1;
            let simulated = self.simulate_experiment(arch, exp);
            if simulated == 0.0 {
                // Nothing to schedule means the mapping cannot explain the
                // measurement at all.
                return Fitness::infinity();
            }
            let mut rel_err = (exp.measured_cycles() - simulated).abs() / exp.measured_cycles();
            if rel_err < 0.1 {
                rel_err = 0.0;
            }
            if rel_err > max_err {
                max_err = rel_err;
            }
            sum_err += rel_err;
            if exp.is_singleton() {
                singleton_sum_err += rel_err;
                num_singletons += 1;
            }
        }

        let avg_err = if num_exps > 0 {
            sum_err / num_exps as f64
        } else {
            0.0
        };
        let singleton_avg_err = if num_singletons > 0 {
            singleton_sum_err / num_singletons as f64
        } else {
            0.0
        };

        Fitness {
            avg_err,
            singleton_avg_err,
            max_err,
            uop_number: self.uop_number() as u64,
            uop_volume: self.uop_volume(),
            avg_num_diff_uops: self.avg_num_diff_uops(),
            is_infinity: false,
        }
    }
}
