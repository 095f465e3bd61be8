//! Query builder -> oracle -> assembler, with bounded escalation for the final subround.

use thiserror::Error;

use crate::rational::{to_f64, Rational, RationalError};
use crate::{log_changes, log_checks, log_debug};

use super::assembler::{interleave, place_greedily, replay, MachineJobs};
use super::oracle::{Assignment, FeasibilityOracle, InconclusiveReason, OracleVerdict};
use super::policy::AdmissionPolicy;
use super::query::build_query;

/// Hard failures of the pipeline.
///
/// Ordinary rejections (infeasible, inconclusive, greedy failure) are not errors;
/// see [`Rejection`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PackingError {
    #[error("{0}")]
    Scale(#[from] RationalError),
    #[error("Escalation failed for {jobs_left} leftover jobs with multipliers 2..={max_multiplier}")]
    EscalationExhausted {
        jobs_left: usize,
        max_multiplier: usize,
    },
}

/// Why a query did not produce a schedule.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Rejection {
    Infeasible,
    Inconclusive(InconclusiveReason),
    /// The oracle placed the big jobs but some small jobs fit nowhere.
    GreedyFailed { jobs_left: usize },
}

/// A successful placement of the whole job multiset.
#[derive(Clone, Debug, PartialEq)]
pub struct Placement {
    pub schedule: Vec<MachineJobs>,
    pub scale_factor: i128,
    /// 1 unless escalation replicated the instance.
    pub multiplier: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub enum PipelineOutcome {
    Placed(Placement),
    Rejected(Rejection),
}

/// Runs one feasibility attempt end to end.
#[derive(Clone, Debug)]
pub struct FeasibilityPipeline<O, P> {
    oracle: O,
    policy: P,
    ratio: Rational,
    max_escalation: usize,
    verbosity: u8,
}

impl<O: FeasibilityOracle, P: AdmissionPolicy> FeasibilityPipeline<O, P> {
    pub fn new(oracle: O, policy: P, ratio: Rational, max_escalation: usize, verbosity: u8) -> Self {
        Self {
            oracle,
            policy,
            ratio,
            max_escalation,
            verbosity,
        }
    }

    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    pub fn policy(&self) -> &P {
        &self.policy
    }

    /// Try to place `jobs` on `machines` machines under `ceiling`.
    ///
    /// With `is_final`, a greedy failure escalates instead of rejecting.
    pub fn run(
        &self,
        jobs: &[Rational],
        machines: usize,
        ceiling: &Rational,
        is_final: bool,
    ) -> Result<PipelineOutcome, PackingError> {
        self.attempt(jobs, machines, ceiling, is_final, is_final)
    }

    fn attempt(
        &self,
        jobs: &[Rational],
        machines: usize,
        ceiling: &Rational,
        is_final: bool,
        escalate: bool,
    ) -> Result<PipelineOutcome, PackingError> {
        let verbosity = self.verbosity;
        let built = build_query(jobs, machines, ceiling, &self.ratio, &self.policy, is_final)?;
        log_debug!(
            verbosity,
            "    query: {} jobs on {} machines, ceiling {} ({:.4}), {} small, {} big in {} sizes, scale {}, capacity {}",
            jobs.len(),
            machines,
            ceiling,
            to_f64(ceiling),
            built.small.len(),
            built.query.total_jobs(),
            built.query.groups.len(),
            built.scale_factor,
            built.query.capacity
        );

        let assignment = if built.query.is_trivial() {
            Assignment::empty(0, machines)
        } else {
            let verdict = self.oracle.solve(&built.query);
            log_checks!(verbosity, "    oracle: {}", verdict.label());
            match verdict {
                OracleVerdict::Feasible(assignment) => assignment,
                OracleVerdict::Infeasible => {
                    return Ok(PipelineOutcome::Rejected(Rejection::Infeasible));
                }
                OracleVerdict::Inconclusive(reason) => {
                    log_checks!(verbosity, "    oracle gave up: {}", reason);
                    return Ok(PipelineOutcome::Rejected(Rejection::Inconclusive(reason)));
                }
            }
        };

        let mut schedule = replay(&built.query, &assignment);
        let jobs_left = place_greedily(&mut schedule, &built.small, ceiling)?;
        if jobs_left.is_empty() {
            return Ok(PipelineOutcome::Placed(Placement {
                schedule,
                scale_factor: built.scale_factor,
                multiplier: 1,
            }));
        }

        log_checks!(verbosity, "    greedy placement left {} jobs", jobs_left.len());
        if !escalate {
            return Ok(PipelineOutcome::Rejected(Rejection::GreedyFailed {
                jobs_left: jobs_left.len(),
            }));
        }
        self.escalate(&schedule, &jobs_left, machines, ceiling, built.scale_factor)
    }

    /// Replicate the leftover jobs `k` times onto `(k-1) * machines` extra machines.
    fn escalate(
        &self,
        base: &[MachineJobs],
        jobs_left: &[Rational],
        machines: usize,
        ceiling: &Rational,
        scale_factor: i128,
    ) -> Result<PipelineOutcome, PackingError> {
        let verbosity = self.verbosity;
        for multiplier in 2..=self.max_escalation {
            let replicated: Vec<Rational> = (0..multiplier)
                .flat_map(|_| jobs_left.iter().copied())
                .collect();
            let pool = (multiplier - 1) * machines;
            match self.attempt(&replicated, pool, ceiling, true, false)? {
                PipelineOutcome::Placed(escalated) => {
                    log_changes!(
                        verbosity,
                        "  escalated {} leftover jobs with multiplier {} ({} extra machines)",
                        jobs_left.len(),
                        multiplier,
                        pool
                    );
                    return Ok(PipelineOutcome::Placed(Placement {
                        schedule: interleave(base, &escalated.schedule, multiplier),
                        scale_factor: scale_factor.max(escalated.scale_factor),
                        multiplier,
                    }));
                }
                PipelineOutcome::Rejected(rejection) => {
                    log_checks!(
                        verbosity,
                        "    escalation x{} rejected: {:?}",
                        multiplier,
                        rejection
                    );
                }
            }
        }
        Err(PackingError::EscalationExhausted {
            jobs_left: jobs_left.len(),
            max_multiplier: self.max_escalation,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packing::assembler::machine_load;
    use crate::packing::oracle::BranchAndBoundOracle;
    use crate::packing::policy::{CapScope, ThresholdPolicy};
    use crate::packing::query::PackingQuery;
    use std::cell::Cell;
    use std::time::Duration;

    fn r(n: i128, d: i128) -> Rational {
        Rational::new(n, d)
    }

    fn pipeline(ratio: Rational, greedy: Rational) -> FeasibilityPipeline<BranchAndBoundOracle, ThresholdPolicy> {
        FeasibilityPipeline::new(
            BranchAndBoundOracle::new(Duration::from_secs(5)),
            ThresholdPolicy {
                ratio: greedy,
                per_size_cap: None,
                cap_scope: CapScope::AllRounds,
            },
            ratio,
            4,
            0,
        )
    }

    fn placed(outcome: PipelineOutcome) -> Placement {
        match outcome {
            PipelineOutcome::Placed(p) => p,
            PipelineOutcome::Rejected(r) => panic!("expected placement, got {:?}", r),
        }
    }

    /// Oracle that counts calls and always answers the same.
    struct CountingOracle {
        calls: Cell<usize>,
        verdict: OracleVerdict,
    }

    impl FeasibilityOracle for CountingOracle {
        fn solve(&self, _query: &PackingQuery) -> OracleVerdict {
            self.calls.set(self.calls.get() + 1);
            self.verdict.clone()
        }
    }

    #[test]
    fn test_places_two_unit_jobs() {
        let p = pipeline(r(2, 1), r(0, 1));
        let placement = placed(p.run(&[r(1, 1), r(1, 1)], 2, &r(1, 1), false).unwrap());
        assert_eq!(placement.multiplier, 1);
        for machine in &placement.schedule {
            assert_eq!(machine_load(machine), r(1, 1));
        }
    }

    #[test]
    fn test_rejects_when_ceiling_too_low() {
        let p = pipeline(r(3, 1), r(0, 1));
        let outcome = p.run(&[r(1, 1), r(1, 1)], 2, &r(2, 3), false).unwrap();
        assert_eq!(outcome, PipelineOutcome::Rejected(Rejection::Infeasible));
    }

    #[test]
    fn test_all_small_jobs_skip_the_oracle() {
        let oracle = CountingOracle {
            calls: Cell::new(0),
            verdict: OracleVerdict::Infeasible,
        };
        let p = FeasibilityPipeline::new(
            &oracle,
            ThresholdPolicy {
                ratio: r(1, 2),
                per_size_cap: None,
                cap_scope: CapScope::AllRounds,
            },
            r(2, 1),
            4,
            0,
        );
        let placement = placed(p.run(&[r(1, 10), r(1, 10), r(1, 10)], 2, &r(1, 1), false).unwrap());
        assert_eq!(oracle.calls.get(), 0);
        assert_eq!(placement.schedule.iter().map(|m| m.len()).sum::<usize>(), 3);
    }

    #[test]
    fn test_wide_small_jobs_report_overflow() {
        let p = pipeline(r(2, 1), r(1, 2));
        let base = 1i128 << 40;
        let jobs: Vec<Rational> = [1, 3, 7, 9].iter().map(|k| r(1, base + k)).collect();
        let err = p.run(&jobs, 1, &r(1, 1), false).unwrap_err();
        assert!(matches!(
            err,
            PackingError::Scale(RationalError::ScaleOverflow(_))
        ));
    }

    #[test]
    fn test_inconclusive_is_a_rejection() {
        let oracle = CountingOracle {
            calls: Cell::new(0),
            verdict: OracleVerdict::Inconclusive(InconclusiveReason::TimeLimit(
                Duration::from_millis(1),
            )),
        };
        let p = FeasibilityPipeline::new(&oracle, ThresholdPolicy::oracle_only(), r(2, 1), 4, 0);
        let outcome = p.run(&[r(1, 1)], 2, &r(1, 1), false).unwrap();
        assert!(matches!(
            outcome,
            PipelineOutcome::Rejected(Rejection::Inconclusive(_))
        ));
        assert_eq!(oracle.calls.get(), 1);
    }

    #[test]
    fn test_greedy_failure_rejects_ordinary_subround() {
        // 9/10 lands on each machine, so neither small 3/20 job fits under 1
        let p = pipeline(r(2, 1), r(1, 2));
        let jobs = [r(9, 10), r(9, 10), r(3, 20), r(3, 20)];
        let outcome = p.run(&jobs, 2, &r(1, 1), false).unwrap();
        assert_eq!(
            outcome,
            PipelineOutcome::Rejected(Rejection::GreedyFailed { jobs_left: 2 })
        );
    }

    #[test]
    fn test_final_subround_escalates() {
        let p = pipeline(r(2, 1), r(1, 2));
        let jobs = [r(9, 10), r(9, 10), r(3, 20), r(3, 20)];
        let placement = placed(p.run(&jobs, 2, &r(1, 1), true).unwrap());
        // two leftover jobs, doubled, fit on one extra block of two machines
        assert_eq!(placement.multiplier, 2);
        assert_eq!(placement.schedule.len(), 2 * 2 + 2);
        for machine in &placement.schedule {
            assert!(machine_load(machine) <= r(1, 1));
        }
        let small_total: usize = placement
            .schedule
            .iter()
            .map(|m| m.iter().filter(|j| **j == r(3, 20)).count())
            .sum();
        assert_eq!(small_total, 4);
    }

    #[test]
    fn test_escalation_is_bounded() {
        // 3/5 jobs cannot share a machine under ceiling 1, and k copies of the three
        // leftovers always outnumber the (k-1) extra machines
        let p = FeasibilityPipeline::new(
            BranchAndBoundOracle::new(Duration::from_secs(5)),
            ThresholdPolicy {
                ratio: r(1, 1),
                per_size_cap: None,
                cap_scope: CapScope::AllRounds,
            },
            r(2, 1),
            3,
            0,
        );
        let jobs = [r(3, 5), r(3, 5), r(3, 5), r(3, 5)];
        let err = p.run(&jobs, 1, &r(1, 1), true).unwrap_err();
        assert_eq!(
            err,
            PackingError::EscalationExhausted {
                jobs_left: 3,
                max_multiplier: 3
            }
        );
    }
}
