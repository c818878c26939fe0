use crate::population::RankedFitness;
use std::cmp::Ordering;
use std::fmt;

/// One reported quality aspect of a mapping.
///
/// Components carrying a group index participate in that group's
/// comparator; `group: None` components are reported but never compared.
pub struct Component {
    pub name: &'static str,
    pub get: fn(&Fitness) -> f64,
    pub tolerance: f64,
    pub group: Option<usize>,
}

/// All fitness components, in comparison order. The comparator, the
/// per-group accumulator and the printer are all derived from this table.
pub const COMPONENTS: &[Component] = &[
    Component {
        name: "avg_err",
        get: |f| f.avg_err,
        tolerance: 0.01,
        group: Some(0),
    },
    Component {
        name: "singleton_avg_err",
        get: |f| f.singleton_avg_err,
        tolerance: 0.01,
        group: Some(0),
    },
    Component {
        name: "max_err",
        get: |f| f.max_err,
        tolerance: 0.01,
        group: Some(0),
    },
    Component {
        name: "uop_number",
        get: |f| f.uop_number as f64,
        tolerance: 0.0,
        group: None,
    },
    Component {
        name: "uop_volume",
        get: |f| f.uop_volume as f64,
        tolerance: 0.0,
        group: None,
    },
    Component {
        name: "avg_num_diff_uops",
        get: |f| f.avg_num_diff_uops,
        tolerance: 0.01,
        group: None,
    },
];

/// Quality vector of a candidate mapping. `is_infinity` marks a mapping
/// that produced an infeasible simulation result; it is worse than any
/// finite fitness under every group.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Fitness {
    /// Mean relative error over all experiments.
    pub avg_err: f64,
    /// Mean relative error over the length-1 experiments.
    pub singleton_avg_err: f64,
    /// Largest relative error over all experiments.
    pub max_err: f64,
    /// Distinct uop masks across the whole mapping.
    pub uop_number: u64,
    /// Sum of `popcount(uop) * count` over all entries.
    pub uop_volume: u64,
    /// Mean number of entries per instruction.
    pub avg_num_diff_uops: f64,
    pub is_infinity: bool,
}

impl Fitness {
    pub fn infinity() -> Self {
        Self {
            is_infinity: true,
            ..Self::default()
        }
    }

    /// Largest group index declared in the component table.
    pub fn max_group() -> usize {
        COMPONENTS.iter().filter_map(|c| c.group).max().unwrap_or(0)
    }

    /// Three-way comparison within one ordering group; lower is better.
    /// Components whose difference stays within their tolerance are
    /// considered ties and the next component decides.
    pub fn compare(a: &Fitness, b: &Fitness, group: usize) -> Ordering {
        match (a.is_infinity, b.is_infinity) {
            (true, true) => return Ordering::Equal,
            (true, false) => return Ordering::Greater,
            (false, true) => return Ordering::Less,
            (false, false) => {}
        }
        for comp in COMPONENTS {
            if comp.group != Some(group) {
                continue;
            }
            let va = (comp.get)(a);
            let vb = (comp.get)(b);
            if (va - vb).abs() > comp.tolerance {
                return if va < vb {
                    Ordering::Less
                } else {
                    Ordering::Greater
                };
            }
        }
        Ordering::Equal
    }

    /// Equality under every ordering group.
    pub fn approx_eq(a: &Fitness, b: &Fitness) -> bool {
        (0..=Self::max_group()).all(|g| Self::compare(a, b, g) == Ordering::Equal)
    }

    /// Sum of the component values in `group`, used by the ratio sort.
    pub fn component_value(&self, group: usize) -> f64 {
        if self.is_infinity {
            return f64::INFINITY;
        }
        COMPONENTS
            .iter()
            .filter(|c| c.group == Some(group))
            .map(|c| (c.get)(self))
            .sum()
    }

    /// Hook for short-circuiting a whole run on a perfect candidate. No
    /// criterion is wired up.
    pub fn is_optimal(&self) -> bool {
        false
    }
}

impl RankedFitness for Fitness {
    fn compare(a: &Self, b: &Self, group: usize) -> Ordering {
        Fitness::compare(a, b, group)
    }

    fn max_group() -> usize {
        Fitness::max_group()
    }

    fn component_value(&self, group: usize) -> f64 {
        Fitness::component_value(self, group)
    }

    fn is_optimal(&self) -> bool {
        Fitness::is_optimal(self)
    }
}

impl fmt::Display for Fitness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_infinity {
            return f.write_str("infinity");
        }
        f.write_str("(")?;
        for comp in COMPONENTS {
            match comp.group {
                Some(g) => write!(f, " {}(G{}): {} ", comp.name, g, (comp.get)(self))?,
                None => write!(f, " {}(D): {} ", comp.name, (comp.get)(self))?,
            }
        }
        f.write_str(")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compare_is_reflexive() {
        let fit = Fitness {
            avg_err: 0.5,
            singleton_avg_err: 0.2,
            max_err: 0.9,
            ..Fitness::default()
        };
        for g in 0..=Fitness::max_group() {
            assert_eq!(Fitness::compare(&fit, &fit, g), Ordering::Equal);
        }
        assert_eq!(
            Fitness::compare(&Fitness::infinity(), &Fitness::infinity(), 0),
            Ordering::Equal
        );
    }

    #[test]
    fn infinity_is_worst() {
        let finite = Fitness {
            avg_err: 100.0,
            max_err: 100.0,
            ..Fitness::default()
        };
        for g in 0..=Fitness::max_group() {
            assert_eq!(
                Fitness::compare(&Fitness::infinity(), &finite, g),
                Ordering::Greater
            );
            assert_eq!(
                Fitness::compare(&finite, &Fitness::infinity(), g),
                Ordering::Less
            );
        }
    }

    #[test]
    fn differences_within_tolerance_tie() {
        let a = Fitness {
            avg_err: 0.100,
            ..Fitness::default()
        };
        let b = Fitness {
            avg_err: 0.105,
            ..Fitness::default()
        };
        assert_eq!(Fitness::compare(&a, &b, 0), Ordering::Equal);
        let c = Fitness {
            avg_err: 0.2,
            ..Fitness::default()
        };
        assert_eq!(Fitness::compare(&a, &c, 0), Ordering::Less);
        assert_eq!(Fitness::compare(&c, &a, 0), Ordering::Greater);
    }

    #[test]
    fn disabled_components_never_decide() {
        let a = Fitness {
            uop_number: 1,
            uop_volume: 1,
            avg_num_diff_uops: 1.0,
            ..Fitness::default()
        };
        let b = Fitness {
            uop_number: 50,
            uop_volume: 500,
            avg_num_diff_uops: 9.0,
            ..Fitness::default()
        };
        assert!(Fitness::approx_eq(&a, &b));
    }

    #[test]
    fn component_value_sums_group() {
        let fit = Fitness {
            avg_err: 0.25,
            singleton_avg_err: 0.5,
            max_err: 1.0,
            uop_number: 99,
            ..Fitness::default()
        };
        assert!((fit.component_value(0) - 1.75).abs() < 1e-12);
        assert!(Fitness::infinity().component_value(0).is_infinite());
    }
}
