//! Feasibility queries over the oracle-assigned ("big") part of a job multiset.

use rustc_hash::FxHashMap;

use crate::rational::{common_denominator, scale, Rational, RationalError};

use super::policy::AdmissionPolicy;

/// All jobs of one distinct size.
#[derive(Clone, Debug, PartialEq)]
pub struct SizeGroup {
    /// Exact size.
    pub size: Rational,
    /// `size * scale_factor`.
    pub scaled: i64,
    /// Number of jobs of this size.
    pub count: usize,
}

/// Integer query handed to the oracle.
///
/// A solution assigns each group a count per machine such that the counts of a
/// group sum to its `count` and no machine's scaled load exceeds `capacity`.
#[derive(Clone, Debug, PartialEq)]
pub struct PackingQuery {
    pub machines: usize,
    pub capacity: i64,
    /// Groups sorted by descending size.
    pub groups: Vec<SizeGroup>,
}

impl PackingQuery {
    /// Build a query from already scaled sizes.
    pub fn from_scaled(machines: usize, capacity: i64, sizes: &[i64]) -> Self {
        let mut counts: FxHashMap<i64, usize> = FxHashMap::default();
        for &size in sizes {
            *counts.entry(size).or_insert(0) += 1;
        }
        let mut groups: Vec<SizeGroup> = counts
            .into_iter()
            .map(|(scaled, count)| SizeGroup {
                size: Rational::from_integer(scaled as i128),
                scaled,
                count,
            })
            .collect();
        groups.sort_by(|a, b| b.scaled.cmp(&a.scaled));
        Self {
            machines,
            capacity,
            groups,
        }
    }

    /// No oracle work to do.
    pub fn is_trivial(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn total_jobs(&self) -> usize {
        self.groups.iter().map(|g| g.count).sum()
    }

    /// Total scaled load, widened so it cannot overflow.
    pub fn total_load(&self) -> i128 {
        self.groups
            .iter()
            .map(|g| g.scaled as i128 * g.count as i128)
            .sum()
    }
}

/// Result of building a query: the oracle part plus the jobs left for greedy placement.
#[derive(Clone, Debug)]
pub struct BuiltQuery {
    pub query: PackingQuery,
    pub small: Vec<Rational>,
    pub scale_factor: i128,
}

/// Partition `jobs` with `policy`, scale the big jobs and group them by size.
///
/// The scale factor covers the competitive ratio, every big job and the ceiling, so
/// each scaled value divides back to its original exactly.
pub fn build_query<P: AdmissionPolicy + ?Sized>(
    jobs: &[Rational],
    machines: usize,
    ceiling: &Rational,
    ratio: &Rational,
    policy: &P,
    is_final: bool,
) -> Result<BuiltQuery, RationalError> {
    let partition = policy.partition(jobs, ceiling, is_final);
    // Small jobs never reach the oracle, but greedy placement still sums them exactly
    common_denominator(jobs.iter().chain(std::iter::once(ceiling)), ratio)?;

    let scale_factor =
        common_denominator(partition.big.iter().chain(std::iter::once(ceiling)), ratio)?;
    let capacity = scale(ceiling, scale_factor)?;

    let mut by_size: FxHashMap<Rational, usize> = FxHashMap::default();
    for job in &partition.big {
        *by_size.entry(*job).or_insert(0) += 1;
    }

    let mut groups = Vec::with_capacity(by_size.len());
    for (size, count) in by_size {
        groups.push(SizeGroup {
            scaled: scale(&size, scale_factor)?,
            size,
            count,
        });
    }
    groups.sort_by(|a, b| b.scaled.cmp(&a.scaled));

    Ok(BuiltQuery {
        query: PackingQuery {
            machines,
            capacity,
            groups,
        },
        small: partition.small,
        scale_factor,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packing::policy::{CapScope, ThresholdPolicy};
    use crate::rational::unscale;

    fn r(n: i128, d: i128) -> Rational {
        Rational::new(n, d)
    }

    #[test]
    fn test_groups_and_scaling() {
        let jobs = vec![r(1, 2), r(1, 2), r(2, 3), r(1, 1)];
        let built = build_query(
            &jobs,
            3,
            &r(5, 4),
            &r(3, 2),
            &ThresholdPolicy::oracle_only(),
            false,
        )
        .unwrap();

        assert_eq!(built.scale_factor, 12);
        assert_eq!(built.query.capacity, 15);
        assert!(built.small.is_empty());
        let summary: Vec<(i64, usize)> = built
            .query
            .groups
            .iter()
            .map(|g| (g.scaled, g.count))
            .collect();
        assert_eq!(summary, vec![(12, 1), (8, 1), (6, 2)]);
        for group in &built.query.groups {
            assert_eq!(unscale(group.scaled, built.scale_factor), group.size);
        }
        assert_eq!(built.query.total_jobs(), 4);
        assert_eq!(built.query.total_load(), 32);
    }

    #[test]
    fn test_small_jobs_are_excluded_from_scale_factor() {
        let policy = ThresholdPolicy {
            ratio: r(1, 4),
            per_size_cap: None,
            cap_scope: CapScope::AllRounds,
        };
        // 1/7 is small under ceiling 1, so 7 never enters the common denominator
        let jobs = vec![r(1, 7), r(1, 2)];
        let built = build_query(&jobs, 2, &r(1, 1), &r(2, 1), &policy, false).unwrap();
        assert_eq!(built.small, vec![r(1, 7)]);
        assert_eq!(built.scale_factor, 2);
        assert_eq!(built.query.groups.len(), 1);
    }

    #[test]
    fn test_small_jobs_still_need_a_safe_denominator() {
        let policy = ThresholdPolicy {
            ratio: r(1, 2),
            per_size_cap: None,
            cap_scope: CapScope::AllRounds,
        };
        let base = 1i128 << 40;
        let jobs = vec![r(1, base + 1), r(1, base + 3)];
        let err = build_query(&jobs, 1, &r(1, 1), &r(2, 1), &policy, false).unwrap_err();
        assert!(matches!(err, RationalError::ScaleOverflow(_)));
    }

    #[test]
    fn test_empty_big_set_is_trivial() {
        let policy = ThresholdPolicy {
            ratio: r(1, 2),
            per_size_cap: None,
            cap_scope: CapScope::AllRounds,
        };
        let jobs = vec![r(1, 10), r(1, 10)];
        let built = build_query(&jobs, 2, &r(1, 1), &r(2, 1), &policy, false).unwrap();
        assert!(built.query.is_trivial());
        assert_eq!(built.small.len(), 2);
    }

    #[test]
    fn test_from_scaled_sorts_descending() {
        let query = PackingQuery::from_scaled(2, 10, &[3, 5, 3, 1]);
        let sizes: Vec<i64> = query.groups.iter().map(|g| g.scaled).collect();
        assert_eq!(sizes, vec![5, 3, 1]);
        assert_eq!(query.groups[1].count, 2);
    }
}
