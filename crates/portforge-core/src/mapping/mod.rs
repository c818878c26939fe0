pub mod ops;
pub mod simulate;

use crate::arch::{uop_letters, Architecture, InsnId, Uop, UopCount, MAX_PORTS};
use crate::eval::EvalInfo;
use crate::fitness::Fitness;
use crate::population::Individual;
use crate::rng::RngPool;
use itertools::Itertools;
use serde_json::{json, Value};
use std::io::{self, Write};
use std::sync::Arc;

/// Entries of one instruction, sorted by uop after normalization.
pub type EntryVec = Vec<(Uop, UopCount)>;

/// A candidate port mapping: for each instruction, a multiset of uops
/// given as `(mask, count)` entries.
///
/// Entry vectors are reference-counted so a locally optimized copy can
/// alias its parent's vectors until one of them is written; writers go
/// through `Arc::make_mut`, which clones a shared vector first.
#[derive(Debug, Clone, Default)]
pub struct Mapping {
    entries: Vec<Arc<EntryVec>>,
}

impl Mapping {
    /// Make sure `insn` has an entry slot, growing the table as needed.
    pub fn ensure_insn(&mut self, insn: InsnId) {
        while self.entries.len() <= insn {
            self.entries.push(Arc::new(Vec::new()));
        }
    }

    pub fn num_insns(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self, insn: InsnId) -> &[(Uop, UopCount)] {
        self.entries.get(insn).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub(crate) fn entries_handle(&self, insn: InsnId) -> Arc<EntryVec> {
        Arc::clone(&self.entries[insn])
    }

    pub(crate) fn set_entries(&mut self, insn: InsnId, vec: Arc<EntryVec>) {
        self.ensure_insn(insn);
        self.entries[insn] = vec;
    }

    pub(crate) fn entries_mut(&mut self, insn: InsnId) -> &mut EntryVec {
        self.ensure_insn(insn);
        Arc::make_mut(&mut self.entries[insn])
    }

    /// Insert `(uop, count)` keeping the vector sorted by uop. An entry
    /// with the same uop already present is rejected; merging is
    /// `normalize`'s job. A zero count is accepted and dropped.
    pub fn add_entry(&mut self, insn: InsnId, uop: Uop, count: UopCount) -> bool {
        self.ensure_insn(insn);
        let vec = Arc::make_mut(&mut self.entries[insn]);
        match vec.binary_search_by_key(&uop, |&(u, _)| u) {
            Ok(_) => false,
            Err(pos) => {
                if count > 0 {
                    vec.insert(pos, (uop, count));
                }
                true
            }
        }
    }

    /// Restore the normal form for every instruction: entries sorted by
    /// uop, runs of equal uops merged into the last run member, zero
    /// counts dropped. Idempotent; already-normal vectors are left shared.
    pub fn normalize(&mut self) {
        for slot in &mut self.entries {
            if is_normal(slot) {
                continue;
            }
            let vec = Arc::make_mut(slot);
            vec.sort_by_key(|&(u, _)| u);
            for i in 1..vec.len() {
                if vec[i - 1].0 == vec[i].0 {
                    vec[i].1 += vec[i - 1].1;
                    vec[i - 1].1 = 0;
                }
            }
            vec.retain(|&(_, n)| n > 0);
        }
    }

    /// Distance metric between two normalized mappings: per instruction,
    /// the count mass found on one side only over the total count mass,
    /// summed across instructions.
    pub fn distance(a: &Mapping, b: &Mapping) -> f64 {
        let num_insns = a.entries.len().max(b.entries.len());
        let mut result = 0.0;
        for insn in 0..num_insns {
            let va = a.entries(insn);
            let vb = b.entries(insn);
            let mut accum = 0u64;
            let mut total = 0u64;
            let mut ia = 0;
            let mut ib = 0;
            while ia < va.len() && ib < vb.len() {
                let (ua, na) = va[ia];
                let (ub, nb) = vb[ib];
                if ua < ub {
                    accum += u64::from(na);
                    total += u64::from(na);
                    ia += 1;
                } else if ub < ua {
                    accum += u64::from(nb);
                    total += u64::from(nb);
                    ib += 1;
                } else {
                    accum += u64::from(na.max(nb) - na.min(nb));
                    total += u64::from(na) + u64::from(nb);
                    ia += 1;
                    ib += 1;
                }
            }
            for &(_, na) in &va[ia..] {
                accum += u64::from(na);
                total += u64::from(na);
            }
            for &(_, nb) in &vb[ib..] {
                accum += u64::from(nb);
                total += u64::from(nb);
            }
            if total > 0 {
                result += accum as f64 / total as f64;
            }
        }
        result
    }

    /// Number of distinct uop masks across the whole mapping.
    pub fn uop_number(&self) -> usize {
        self.entries
            .iter()
            .flat_map(|v| v.iter().map(|&(u, _)| u))
            .sorted_unstable()
            .dedup()
            .count()
    }

    /// Sum of `popcount(uop) * count` over all entries.
    pub fn uop_volume(&self) -> u64 {
        self.entries
            .iter()
            .flat_map(|v| v.iter())
            .map(|&(u, n)| u64::from(u.count_ones()) * u64::from(n))
            .sum()
    }

    /// Mean number of entries per instruction.
    pub fn avg_num_diff_uops(&self) -> f64 {
        if self.entries.is_empty() {
            return 0.0;
        }
        let total: usize = self.entries.iter().map(|v| v.len()).sum();
        total as f64 / self.entries.len() as f64
    }

    /// Write the mapping in its input file format, with fold markers in
    /// the comments.
    pub fn write_text(&self, arch: &Architecture, out: &mut dyn Write) -> io::Result<()> {
        writeln!(out, "mapping: # {{{{{{")?;
        for insn in arch.insns() {
            writeln!(out, "  {}: # {{{{{{", insn.name())?;
            for &(uop, count) in self.entries(insn.id()) {
                writeln!(out, "    {}: {}", uop_letters(uop), count)?;
            }
            writeln!(out, "  # }}}}}}")?;
            writeln!(out)?;
        }
        writeln!(out, "# }}}}}}")
    }

    /// The `Mapping3` JSON form: the architecture plus, per instruction,
    /// one port-list entry per uop instance (multiplicity flattened).
    pub fn to_json(&self, arch: &Architecture) -> Value {
        let insns: Vec<&str> = arch.insns().iter().map(|i| i.name()).collect();
        let ports: Vec<String> = (0..arch.num_ports()).map(|p| p.to_string()).collect();
        let mut assignment = serde_json::Map::new();
        for insn in arch.insns() {
            let mut uops = Vec::new();
            for &(uop, count) in self.entries(insn.id()) {
                let port_indices: Vec<String> = (0..MAX_PORTS)
                    .filter(|k| uop & (1 << k) != 0)
                    .map(|k| k.to_string())
                    .collect();
                for _ in 0..count {
                    uops.push(json!(port_indices));
                }
            }
            assignment.insert(insn.name().to_string(), Value::Array(uops));
        }
        json!({
            "kind": "Mapping3",
            "arch": {
                "kind": "Architecture",
                "insns": insns,
                "ports": ports,
            },
            "assignment": assignment,
        })
    }
}

fn is_normal(entries: &[(Uop, UopCount)]) -> bool {
    entries.iter().all(|&(_, n)| n > 0) && entries.windows(2).all(|w| w[0].0 < w[1].0)
}

impl<'a> Individual<EvalInfo<'a>> for Mapping {
    type Fitness = Fitness;

    fn init_randomly(&mut self, rng: &RngPool, ctx: &EvalInfo<'a>) {
        Mapping::init_randomly(self, rng, ctx);
    }

    fn evaluate(&self, ctx: &EvalInfo<'a>) -> Fitness {
        Mapping::evaluate(self, ctx)
    }

    fn recombine(
        rng: &RngPool,
        child_a: &mut Self,
        child_b: &mut Self,
        parent_a: &Self,
        parent_b: &Self,
        ctx: &EvalInfo<'a>,
    ) {
        Mapping::recombine(rng, child_a, child_b, parent_a, parent_b, ctx);
    }

    fn mutate(rng: &RngPool, child: &mut Self, parent: &Self, ctx: &EvalInfo<'a>) {
        Mapping::mutate(rng, child, parent, ctx);
    }

    fn optimize_locally(&mut self, ctx: &EvalInfo<'a>) -> Fitness {
        Mapping::optimize_locally(self, ctx)
    }

    fn distance(a: &Self, b: &Self) -> f64 {
        Mapping::distance(a, b)
    }

    fn write_plain(&self, ctx: &EvalInfo<'a>, out: &mut dyn Write) -> io::Result<()> {
        self.write_text(ctx.arch, out)
    }

    fn to_json(&self, ctx: &EvalInfo<'a>) -> Value {
        Mapping::to_json(self, ctx.arch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_entry_keeps_sorted_order_and_rejects_duplicates() {
        let mut m = Mapping::default();
        assert!(m.add_entry(0, 0b100, 2));
        assert!(m.add_entry(0, 0b001, 1));
        assert!(m.add_entry(0, 0b010, 3));
        assert!(!m.add_entry(0, 0b010, 7));
        assert_eq!(m.entries(0), &[(0b001, 1), (0b010, 3), (0b100, 2)]);
    }

    #[test]
    fn add_entry_drops_zero_counts() {
        let mut m = Mapping::default();
        assert!(m.add_entry(0, 0b1, 0));
        assert!(m.entries(0).is_empty());
    }

    #[test]
    fn normalize_merges_runs_and_drops_zeroes() {
        let mut m = Mapping::default();
        m.ensure_insn(0);
        // Bypass add_entry's duplicate rejection to exercise the merge.
        let vec = m.entries_mut(0);
        vec.push((0b10, 2));
        vec.push((0b01, 3));
        vec.push((0b10, 4));
        vec.push((0b11, 0));
        m.normalize();
        assert_eq!(m.entries(0), &[(0b01, 3), (0b10, 6)]);
    }

    #[test]
    fn normalize_is_idempotent() {
        let mut m = Mapping::default();
        m.add_entry(0, 0b01, 2);
        m.add_entry(0, 0b11, 1);
        m.add_entry(1, 0b10, 4);
        m.normalize();
        let before: Vec<_> = (0..m.num_insns()).map(|i| m.entries(i).to_vec()).collect();
        m.normalize();
        let after: Vec<_> = (0..m.num_insns()).map(|i| m.entries(i).to_vec()).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn normalize_preserves_shared_vectors() {
        let mut parent = Mapping::default();
        parent.add_entry(0, 0b01, 2);
        let mut child = parent.clone();
        child.normalize();
        assert!(Arc::ptr_eq(&parent.entries[0], &child.entries[0]));
    }

    #[test]
    fn distance_laws() {
        let mut a = Mapping::default();
        a.add_entry(0, 0b01, 2);
        a.add_entry(0, 0b10, 1);
        let mut b = Mapping::default();
        b.add_entry(0, 0b01, 2);
        b.add_entry(0, 0b11, 3);
        assert_eq!(Mapping::distance(&a, &a), 0.0);
        assert_eq!(Mapping::distance(&a, &b), Mapping::distance(&b, &a));
        assert!(Mapping::distance(&a, &b) > 0.0);
        // shared AB mass: |2-2| = 0 over 4; one-sided: 1 + 3 over 4.
        assert!((Mapping::distance(&a, &b) - 4.0 / 8.0).abs() < 1e-12);
    }

    #[test]
    fn uop_statistics() {
        let mut m = Mapping::default();
        m.add_entry(0, 0b011, 2);
        m.add_entry(0, 0b100, 1);
        m.add_entry(1, 0b011, 5);
        assert_eq!(m.uop_number(), 2);
        assert_eq!(m.uop_volume(), 2 * 2 + 1 + 2 * 5);
        assert!((m.avg_num_diff_uops() - 1.5).abs() < 1e-12);
    }

    #[test]
    fn json_flattens_multiplicity() {
        let mut arch = Architecture::new(2);
        let a = arch.intern("a");
        let mut m = Mapping::default();
        m.add_entry(a, 0b11, 2);
        let val = m.to_json(&arch);
        assert_eq!(val["kind"], "Mapping3");
        assert_eq!(val["arch"]["ports"], json!(["0", "1"]));
        assert_eq!(val["assignment"]["a"], json!([["0", "1"], ["0", "1"]]));
    }
}
