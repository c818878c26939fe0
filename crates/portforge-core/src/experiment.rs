use crate::arch::{Architecture, InsnId};
use std::io::{self, Write};

/// One throughput measurement: an instruction sequence and the observed
/// cycles per iteration. Experiments do not change after parsing.
#[derive(Debug, Clone)]
pub struct Experiment {
    insns: Vec<InsnId>,
    measured_cycles: f64,
    evaluated: bool,
}

impl Experiment {
    pub fn new(insns: Vec<InsnId>) -> Self {
        Self {
            insns,
            measured_cycles: 0.0,
            evaluated: false,
        }
    }

    pub fn insn_seq(&self) -> &[InsnId] {
        &self.insns
    }

    pub fn is_singleton(&self) -> bool {
        self.insns.len() == 1
    }

    pub fn set_measured_cycles(&mut self, cycles: f64) {
        self.measured_cycles = cycles;
        self.evaluated = true;
    }

    pub fn is_evaluated(&self) -> bool {
        self.evaluated
    }

    pub fn measured_cycles(&self) -> f64 {
        debug_assert!(self.evaluated, "cycles read before they were assigned");
        self.measured_cycles
    }

    /// Write the experiment in its input file format.
    pub fn write_text(&self, arch: &Architecture, out: &mut dyn Write) -> io::Result<()> {
        writeln!(out, "experiment:")?;
        writeln!(out, "  instructions:")?;
        for &i in &self.insns {
            writeln!(out, "    {}", arch.insn(i).name())?;
        }
        if self.evaluated {
            writeln!(out, "  cycles: {}", self.measured_cycles)
        } else {
            writeln!(out, "  cycles: none")
        }
    }
}
