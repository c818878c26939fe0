mod common;

use common::{arch_with, experiment, mapping_of};
use portforge_core::{Config, EvalInfo, Experiment, Fitness, Mapping, RngPool};

fn setup(
    ports: usize,
    names: &[&str],
) -> (portforge_core::Architecture, Vec<Experiment>, Vec<f64>, Config) {
    let mut arch = arch_with(ports, names);
    let exps: Vec<Experiment> = names
        .iter()
        .map(|n| experiment(&mut arch, &[n], 1.0))
        .collect();
    let singletons = vec![1.0; names.len()];
    (arch, exps, singletons, Config::default())
}

fn is_normalized(mapping: &Mapping) -> bool {
    (0..mapping.num_insns()).all(|insn| {
        let entries = mapping.entries(insn);
        entries.iter().all(|&(_, n)| n > 0)
            && entries.windows(2).all(|w| w[0].0 < w[1].0)
    })
}

#[test]
fn init_randomly_covers_every_instruction() {
    let (arch, exps, singletons, config) = setup(4, &["a", "b", "c"]);
    let info = EvalInfo::new(&arch, &exps, &singletons, &config);
    let rng = RngPool::new(99, 1);
    for _ in 0..20 {
        let mut mapping = Mapping::default();
        mapping.init_randomly(&rng, &info);
        assert!(is_normalized(&mapping));
        for insn in arch.insns() {
            let entries = mapping.entries(insn.id());
            assert!(!entries.is_empty());
            for &(uop, count) in entries {
                assert!(uop >= 1 && uop <= arch.largest_uop());
                assert!(count >= 1);
            }
        }
    }
}

#[test]
fn recombine_splits_parent_entries_between_children() {
    let (arch, exps, singletons, config) = setup(3, &["a", "b"]);
    let info = EvalInfo::new(&arch, &exps, &singletons, &config);
    let rng = RngPool::new(7, 1);

    let mut scratch = arch_with(3, &["a", "b"]);
    let parent_a = mapping_of(&mut scratch, &[("a", &[("A", 2), ("B", 1)]), ("b", &[("C", 4)])]);
    let parent_b = mapping_of(&mut scratch, &[("a", &[("AB", 3)]), ("b", &[("AC", 2)])]);

    for _ in 0..20 {
        let mut child_a = Mapping::default();
        let mut child_b = Mapping::default();
        Mapping::recombine(&rng, &mut child_a, &mut child_b, &parent_a, &parent_b, &info);
        assert!(is_normalized(&child_a));
        assert!(is_normalized(&child_b));
        for insn in arch.insns() {
            let id = insn.id();
            let pool_len = parent_a.entries(id).len() + parent_b.entries(id).len();
            let child_total = child_a.entries(id).len() + child_b.entries(id).len();
            // Duplicate uops can be rejected, never invented.
            assert!(child_total <= pool_len);
            assert!(child_total >= 1);
            // Every child entry's uop exists in one of the parents.
            for child in [&child_a, &child_b] {
                for &(uop, _) in child.entries(id) {
                    let known = parent_a.entries(id).iter().any(|&(u, _)| u == uop)
                        || parent_b.entries(id).iter().any(|&(u, _)| u == uop);
                    assert!(known);
                }
            }
        }
    }
}

#[test]
fn recombine_with_single_pooled_entry_degrades_gracefully() {
    let (arch, exps, singletons, config) = setup(2, &["a"]);
    let info = EvalInfo::new(&arch, &exps, &singletons, &config);
    let rng = RngPool::new(11, 1);

    let mut scratch = arch_with(2, &["a"]);
    let parent_a = mapping_of(&mut scratch, &[("a", &[("A", 2)])]);
    let parent_b = Mapping::default();

    let mut child_a = Mapping::default();
    let mut child_b = Mapping::default();
    Mapping::recombine(&rng, &mut child_a, &mut child_b, &parent_a, &parent_b, &info);
    assert_eq!(child_a.entries(0), &[(0b1, 2)]);
    assert!(child_b.entries(0).is_empty());
}

#[test]
fn mutate_produces_normalized_children_with_positive_counts() {
    let (arch, exps, singletons, config) = setup(3, &["a", "b"]);
    let mut config = config;
    config.mut_add_uop_chance = 0.3;
    config.mut_change_uop_chance = 0.3;
    config.mut_change_num_chance = 0.3;
    let info = EvalInfo::new(&arch, &exps, &singletons, &config);
    let rng = RngPool::new(3, 1);

    let mut scratch = arch_with(3, &["a", "b"]);
    let parent = mapping_of(&mut scratch, &[("a", &[("A", 2), ("BC", 1)]), ("b", &[("C", 3)])]);

    for _ in 0..50 {
        let mut child = Mapping::default();
        Mapping::mutate(&rng, &mut child, &parent, &info);
        assert!(is_normalized(&child));
        for insn in arch.insns() {
            assert!(!child.entries(insn.id()).is_empty());
        }
    }
}

#[test]
fn optimize_locally_reduces_oversized_counts() {
    // Measured 1.0 for a single a, but the mapping schedules three copies
    // of A: the climb must shrink the count back to one.
    let mut arch = arch_with(1, &[]);
    let mapping_src = mapping_of(&mut arch, &[("x", &[("A", 3)])]);
    let exps = vec![experiment(&mut arch, &["x"], 1.0)];
    let singletons = vec![1.0];
    let config = Config::default();
    let info = EvalInfo::new(&arch, &exps, &singletons, &config);

    let mut mapping = mapping_src.clone();
    let fitness = mapping.optimize_locally(&info);
    assert_eq!(mapping.entries(0), &[(0b1, 1)]);
    assert_eq!(fitness.avg_err, 0.0);
    assert!(!fitness.is_infinity);
}

#[test]
fn optimize_locally_leaves_optimal_counts_unchanged() {
    let mut arch = arch_with(2, &[]);
    let parent = mapping_of(&mut arch, &[("x", &[("A", 1)])]);
    let exps = vec![experiment(&mut arch, &["x"], 1.0)];
    let singletons = vec![1.0];
    let config = Config::default();
    let info = EvalInfo::new(&arch, &exps, &singletons, &config);

    let mut child = parent.clone();
    let fitness = child.optimize_locally(&info);
    assert_eq!(child.entries(0), parent.entries(0));
    assert!(!fitness.is_infinity);
}

#[test]
fn optimize_locally_never_worsens_global_fitness() {
    let (arch, exps, singletons, config) = setup(3, &["a", "b", "c"]);
    let info = EvalInfo::new(&arch, &exps, &singletons, &config);
    let rng = RngPool::new(21, 1);
    for _ in 0..10 {
        let mut mapping = Mapping::default();
        mapping.init_randomly(&rng, &info);
        let before = mapping.evaluate(&info);
        let after = mapping.optimize_locally(&info);
        assert_ne!(
            Fitness::compare(&after, &before, 0),
            std::cmp::Ordering::Greater,
            "hill climb made the mapping worse: {before} -> {after}"
        );
    }
}
