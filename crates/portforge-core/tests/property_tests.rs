mod common;

use common::arch_with;
use portforge_core::{Architecture, Experiment, Mapping};
use proptest::prelude::*;

#[derive(Debug, Clone)]
struct MappingSpec {
    ports: usize,
    entries: Vec<Vec<(u32, u32)>>,
}

fn arb_mapping(max_ports: usize, max_insns: usize) -> impl Strategy<Value = MappingSpec> {
    (2..=max_ports).prop_flat_map(move |ports| {
        let largest = (1u32 << ports) - 1;
        let entry = (1..=largest, 1u32..6);
        let insn_entries = proptest::collection::vec(entry, 0..4);
        proptest::collection::vec(insn_entries, 1..=max_insns)
            .prop_map(move |entries| MappingSpec { ports, entries })
    })
}

fn build(spec: &MappingSpec) -> (Architecture, Mapping) {
    let names: Vec<String> = (0..spec.entries.len()).map(|i| format!("i{i}")).collect();
    let name_refs: Vec<&str> = names.iter().map(String::as_str).collect();
    let arch = arch_with(spec.ports, &name_refs);
    let mut mapping = Mapping::default();
    for (insn, entries) in spec.entries.iter().enumerate() {
        mapping.ensure_insn(insn);
        for &(uop, count) in entries {
            // Duplicate uops are rejected, same as everywhere else.
            mapping.add_entry(insn, uop, count);
        }
    }
    (arch, mapping)
}

fn exp_over(arch: &Architecture, seq: &[usize], cycles: f64) -> Experiment {
    let ids: Vec<usize> = seq.iter().map(|&i| i % arch.num_insns()).collect();
    let mut exp = Experiment::new(ids);
    exp.set_measured_cycles(cycles);
    exp
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn normalized_mappings_are_strictly_sorted_with_positive_counts(
        spec in arb_mapping(4, 4)
    ) {
        let (_arch, mut mapping) = build(&spec);
        mapping.normalize();
        for insn in 0..mapping.num_insns() {
            let entries = mapping.entries(insn);
            prop_assert!(entries.iter().all(|&(_, n)| n > 0));
            prop_assert!(entries.windows(2).all(|w| w[0].0 < w[1].0));
        }
    }

    #[test]
    fn normalize_is_idempotent(spec in arb_mapping(4, 4)) {
        let (_arch, mut mapping) = build(&spec);
        mapping.normalize();
        let once: Vec<Vec<(u32, u32)>> =
            (0..mapping.num_insns()).map(|i| mapping.entries(i).to_vec()).collect();
        mapping.normalize();
        let twice: Vec<Vec<(u32, u32)>> =
            (0..mapping.num_insns()).map(|i| mapping.entries(i).to_vec()).collect();
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn simulation_ignores_instruction_order(
        spec in arb_mapping(4, 4),
        seq in proptest::collection::vec(0usize..4, 1..8),
        rotation in 0usize..8
    ) {
        let (arch, mut mapping) = build(&spec);
        mapping.normalize();
        let exp = exp_over(&arch, &seq, 1.0);
        let mut rotated = exp.insn_seq().to_vec();
        let rotated_len = rotated.len();
        rotated.rotate_left(rotation % rotated_len);
        let exp_rotated = {
            let mut e = Experiment::new(rotated);
            e.set_measured_cycles(1.0);
            e
        };
        let lhs = mapping.simulate_experiment(&arch, &exp);
        let rhs = mapping.simulate_experiment(&arch, &exp_rotated);
        prop_assert!((lhs - rhs).abs() < 1e-9);
    }

    #[test]
    fn simulation_is_linear_under_self_concatenation(
        spec in arb_mapping(4, 4),
        seq in proptest::collection::vec(0usize..4, 1..6)
    ) {
        let (arch, mut mapping) = build(&spec);
        mapping.normalize();
        let exp = exp_over(&arch, &seq, 1.0);
        let mut doubled_seq = exp.insn_seq().to_vec();
        doubled_seq.extend_from_slice(exp.insn_seq());
        let doubled = {
            let mut e = Experiment::new(doubled_seq);
            e.set_measured_cycles(2.0);
            e
        };
        let single = mapping.simulate_experiment(&arch, &exp);
        let twice = mapping.simulate_experiment(&arch, &doubled);
        prop_assert!((twice - 2.0 * single).abs() < 1e-9 * twice.max(1.0));
    }

    #[test]
    fn distance_laws_hold(
        spec_a in arb_mapping(4, 3),
        spec_b in arb_mapping(4, 3)
    ) {
        let (_arch, mut a) = build(&spec_a);
        let (_arch_b, mut b) = build(&spec_b);
        a.normalize();
        b.normalize();
        prop_assert_eq!(Mapping::distance(&a, &a), 0.0);
        prop_assert_eq!(Mapping::distance(&b, &b), 0.0);
        let ab = Mapping::distance(&a, &b);
        let ba = Mapping::distance(&b, &a);
        prop_assert!((ab - ba).abs() < 1e-12);
        prop_assert!(ab >= 0.0);
    }

    #[test]
    fn simulation_never_goes_negative(
        spec in arb_mapping(5, 4),
        seq in proptest::collection::vec(0usize..4, 1..6)
    ) {
        let (arch, mut mapping) = build(&spec);
        mapping.normalize();
        let exp = exp_over(&arch, &seq, 1.0);
        prop_assert!(mapping.simulate_experiment(&arch, &exp) >= 0.0);
    }
}
