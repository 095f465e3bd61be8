//! Small/big job admission policy.
//!
//! Decides which jobs of a query are left out of the oracle call and placed
//! greedily afterwards. The rule is injected into the pipeline instead of being
//! inlined, so alternative rules can be swapped in without touching the search.

use num_traits::CheckedMul;

use crate::rational::Rational;

/// Where the per-size consecutive cap applies.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CapScope {
    /// The cap bounds small jobs in every query.
    AllRounds,
    /// The cap bounds small jobs only in the final subround; other queries are uncapped.
    FinalOnly,
}

impl CapScope {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "all_rounds" => Some(Self::AllRounds),
            "final_only" => Some(Self::FinalOnly),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AllRounds => "all_rounds",
            Self::FinalOnly => "final_only",
        }
    }
}

/// Query-scoped split of a job multiset.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Partition {
    /// Jobs placed greedily after the oracle call.
    pub small: Vec<Rational>,
    /// Jobs handed to the oracle.
    pub big: Vec<Rational>,
}

/// Classifies jobs as small (greedy) or big (oracle).
pub trait AdmissionPolicy {
    fn partition(&self, jobs: &[Rational], ceiling: &Rational, is_final: bool) -> Partition;
}

/// Threshold rule: `job / ceiling < ratio` is small, optionally capping how many
/// equal-size jobs in a row may be admitted as small.
#[derive(Clone, Debug)]
pub struct ThresholdPolicy {
    pub ratio: Rational,
    pub per_size_cap: Option<usize>,
    pub cap_scope: CapScope,
}

impl ThresholdPolicy {
    /// Everything goes to the oracle.
    pub fn oracle_only() -> Self {
        Self {
            ratio: Rational::from_integer(0),
            per_size_cap: None,
            cap_scope: CapScope::AllRounds,
        }
    }

    fn cap_for(&self, is_final: bool) -> Option<usize> {
        match self.cap_scope {
            CapScope::AllRounds => self.per_size_cap,
            CapScope::FinalOnly if is_final => self.per_size_cap,
            CapScope::FinalOnly => None,
        }
    }
}

impl AdmissionPolicy for ThresholdPolicy {
    fn partition(&self, jobs: &[Rational], ceiling: &Rational, is_final: bool) -> Partition {
        let mut partition = Partition::default();
        // A non-positive ceiling admits nothing; every job goes to the oracle
        if *ceiling <= Rational::from_integer(0) {
            partition.big = jobs.to_vec();
            return partition;
        }

        // job / ceiling < ratio, compared without dividing
        let Some(threshold) = self.ratio.checked_mul(ceiling) else {
            partition.big = jobs.to_vec();
            return partition;
        };
        let cap = self.cap_for(is_final);
        let mut run_size: Option<&Rational> = None;
        let mut run_len = 0usize;

        for job in jobs {
            if run_size != Some(job) {
                run_size = Some(job);
                run_len = 0;
            }
            let below_threshold = *job < threshold;
            let under_cap = cap.map_or(true, |c| run_len < c);
            if below_threshold && under_cap {
                run_len += 1;
                partition.small.push(*job);
            } else {
                partition.big.push(*job);
            }
        }

        partition
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(n: i128, d: i128) -> Rational {
        Rational::new(n, d)
    }

    fn policy(ratio: Rational, cap: Option<usize>, scope: CapScope) -> ThresholdPolicy {
        ThresholdPolicy {
            ratio,
            per_size_cap: cap,
            cap_scope: scope,
        }
    }

    #[test]
    fn test_zero_ratio_sends_everything_to_oracle() {
        let jobs = vec![r(1, 10), r(1, 2), r(1, 1)];
        let p = ThresholdPolicy::oracle_only().partition(&jobs, &r(2, 1), false);
        assert!(p.small.is_empty());
        assert_eq!(p.big, jobs);
    }

    #[test]
    fn test_threshold_is_strict() {
        // ceiling 2, ratio 1/4 -> jobs below 1/2 are small, exactly 1/2 is big
        let jobs = vec![r(1, 4), r(1, 2), r(3, 1)];
        let p = policy(r(1, 4), None, CapScope::AllRounds).partition(&jobs, &r(2, 1), false);
        assert_eq!(p.small, vec![r(1, 4)]);
        assert_eq!(p.big, vec![r(1, 2), r(3, 1)]);
    }

    #[test]
    fn test_per_size_cap_limits_consecutive_runs() {
        let jobs = vec![r(1, 10), r(1, 10), r(1, 10), r(1, 5), r(1, 5), r(1, 5)];
        let p = policy(r(1, 2), Some(2), CapScope::AllRounds).partition(&jobs, &r(1, 1), false);
        assert_eq!(p.small, vec![r(1, 10), r(1, 10), r(1, 5), r(1, 5)]);
        assert_eq!(p.big, vec![r(1, 10), r(1, 5)]);
    }

    #[test]
    fn test_final_only_scope() {
        let jobs = vec![r(1, 10); 4];
        let capped = policy(r(1, 2), Some(1), CapScope::FinalOnly);

        let ordinary = capped.partition(&jobs, &r(1, 1), false);
        assert_eq!(ordinary.small.len(), 4);

        let last = capped.partition(&jobs, &r(1, 1), true);
        assert_eq!(last.small.len(), 1);
        assert_eq!(last.big.len(), 3);
    }

    #[test]
    fn test_cap_scope_names() {
        assert_eq!(CapScope::parse("all_rounds"), Some(CapScope::AllRounds));
        assert_eq!(CapScope::parse("final_only"), Some(CapScope::FinalOnly));
        assert_eq!(CapScope::parse("sometimes"), None);
        assert_eq!(CapScope::FinalOnly.as_str(), "final_only");
    }
}
