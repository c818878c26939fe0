use crate::arch::{Architecture, InsnId};
use crate::config::Config;
use crate::experiment::Experiment;

/// Immutable bundle handed to every search operator: the architecture,
/// the experiments, the per-instruction singleton cycles, the config, and
/// an index from instruction to the experiments containing it.
pub struct EvalInfo<'a> {
    pub arch: &'a Architecture,
    pub exps: &'a [Experiment],
    pub config: &'a Config,
    singleton_cycles: &'a [f64],
    relevant_exps: Vec<Vec<usize>>,
}

impl<'a> EvalInfo<'a> {
    pub fn new(
        arch: &'a Architecture,
        exps: &'a [Experiment],
        singleton_cycles: &'a [f64],
        config: &'a Config,
    ) -> Self {
        let mut relevant_exps = vec![Vec::new(); arch.num_insns()];
        for (idx, e) in exps.iter().enumerate() {
            // One index per occurrence: the per-instruction evaluation
            // weights an experiment by how often the instruction appears
            // in it.
            for &insn in e.insn_seq() {
                relevant_exps[insn].push(idx);
            }
        }
        Self {
            arch,
            exps,
            config,
            singleton_cycles,
            relevant_exps,
        }
    }

    /// Measured cycles of the length-1 experiment for `insn`, or 0.0 when
    /// none was given.
    pub fn singleton_cycles_of(&self, insn: InsnId) -> f64 {
        self.singleton_cycles.get(insn).copied().unwrap_or(0.0)
    }

    /// Indices into `exps` of the experiments containing `insn`, listed
    /// once per occurrence of the instruction.
    pub fn relevant_exps(&self, insn: InsnId) -> &[usize] {
        &self.relevant_exps[insn]
    }
}
