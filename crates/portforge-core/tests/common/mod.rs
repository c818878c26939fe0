#![allow(dead_code)]

use portforge_core::arch::uop_from_letters;
use portforge_core::{Architecture, Config, Experiment, Mapping};

/// Architecture with the given port count and instruction names.
pub fn arch_with(ports: usize, names: &[&str]) -> Architecture {
    let mut arch = Architecture::new(ports);
    for name in names {
        arch.intern(name);
    }
    arch
}

/// Experiment over named instructions with measured cycles.
pub fn experiment(arch: &mut Architecture, names: &[&str], cycles: f64) -> Experiment {
    let seq = names.iter().map(|n| arch.intern(n)).collect();
    let mut exp = Experiment::new(seq);
    exp.set_measured_cycles(cycles);
    exp
}

/// Mapping from a literal table of `(insn, [(uop letters, count)])`.
pub fn mapping_of(arch: &mut Architecture, table: &[(&str, &[(&str, u32)])]) -> Mapping {
    let mut mapping = Mapping::default();
    for (name, entries) in table {
        let insn = arch.intern(name);
        mapping.ensure_insn(insn);
        for (letters, count) in *entries {
            let uop = uop_from_letters(letters).expect("bad uop literal in test");
            assert!(mapping.add_entry(insn, uop, *count));
        }
    }
    mapping
}

/// Small config suitable for fast search tests.
pub fn small_config(population_size: usize) -> Config {
    Config {
        population_size,
        num_iterations: 3,
        num_epochs: 1,
        enable_local_optimization: false,
        ..Config::default()
    }
}

/// Run `f` on a dedicated single-threaded rayon pool, which pins the
/// whole search to one RNG stream.
pub fn single_threaded<T: Send>(f: impl FnOnce() -> T + Send) -> T {
    rayon::ThreadPoolBuilder::new()
        .num_threads(1)
        .build()
        .expect("failed to build test thread pool")
        .install(f)
}
