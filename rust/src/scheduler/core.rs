//! Round-by-round construction of the adversarial job sequence.

use thiserror::Error;

use crate::config::SearchParams;
use crate::ledger::{JobLedger, LedgerError};
use crate::models::{Round, Subround};
use crate::packing::{
    AdmissionPolicy, BranchAndBoundOracle, FeasibilityOracle, FeasibilityPipeline, PackingError,
    PipelineOutcome, Placement, ThresholdPolicy,
};
use crate::rational::{
    checked_add, checked_div, common_denominator, grid_ceil, grid_floor, is_positive, to_f64,
    Rational, RationalError,
};
use crate::{log_changes, log_checks, log_debug};

/// Errors that can occur while building rounds.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AdversaryError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("No feasible job size at or above {lower} in round {round}; change the parameters")]
    NoFeasibleJobSize { round: usize, lower: Rational },
    #[error("Size {size} was feasible in the size search but expansion placed no job")]
    ExpansionStalled { size: Rational },
    #[error("Requested {requested} jobs but round {round} has only {jobs_left} left")]
    QuotaExceeded {
        round: usize,
        requested: usize,
        jobs_left: usize,
    },
    #[error("Round {round} still has {jobs_left} jobs left")]
    RoundIncomplete { round: usize, jobs_left: usize },
    #[error("The final subround has already been built")]
    Finished,
    #[error("{0}")]
    Ledger(#[from] LedgerError),
    #[error("{0}")]
    Packing(#[from] PackingError),
}

impl From<RationalError> for AdversaryError {
    fn from(err: RationalError) -> Self {
        AdversaryError::Packing(PackingError::Scale(err))
    }
}

/// Rounds produced by [`RoundScheduler::finish`], with identifiers assigned.
#[derive(Clone, Debug)]
pub struct Construction {
    pub rounds: Vec<Round>,
    pub final_round: Option<Round>,
    /// Machines of the final round (after escalation), or m without one.
    pub final_machine_count: usize,
}

enum RoundState {
    Expanding { size: Rational, after_search: bool },
    SearchingSize { lower: Rational },
    Done,
}

/// Grows the job sequence one subround at a time.
///
/// Owns the job ledger: every query appends speculatively and either commits or
/// rolls back before returning, so the ledger never holds pending jobs between calls.
pub struct RoundScheduler<O, P> {
    params: SearchParams,
    pipeline: FeasibilityPipeline<O, P>,
    ledger: JobLedger,
    rounds: Vec<Round>,
    final_round: Option<Round>,
}

impl RoundScheduler<BranchAndBoundOracle, ThresholdPolicy> {
    /// Scheduler with the bundled oracle and the threshold policy from `params`.
    pub fn from_params(params: SearchParams) -> Self {
        let oracle = params.oracle();
        let policy = params.policy();
        Self::new(params, oracle, policy)
    }
}

impl<O: FeasibilityOracle, P: AdmissionPolicy> RoundScheduler<O, P> {
    pub fn new(params: SearchParams, oracle: O, policy: P) -> Self {
        let pipeline = FeasibilityPipeline::new(
            oracle,
            policy,
            params.ratio,
            params.max_escalation,
            params.verbosity,
        );
        let rounds = vec![Round::new(1, params.machines)];
        Self {
            params,
            pipeline,
            ledger: JobLedger::new(),
            rounds,
            final_round: None,
        }
    }

    pub fn params(&self) -> &SearchParams {
        &self.params
    }

    pub fn ledger(&self) -> &JobLedger {
        &self.ledger
    }

    /// All rounds so far; the last one is the round being filled.
    pub fn rounds(&self) -> &[Round] {
        &self.rounds
    }

    pub fn current_round(&self) -> &Round {
        &self.rounds[self.rounds.len() - 1]
    }

    pub fn final_round(&self) -> Option<&Round> {
        self.final_round.as_ref()
    }

    /// Ceiling for a subround of size `size`, computed on the ledger as it stands.
    ///
    /// `(sum of jobs at positions 0, m, 2m, ... + size) / c`.
    pub fn cutoff_value(&self, size: &Rational) -> Result<Rational, AdversaryError> {
        let leaders = self.ledger.round_leader_sum(self.params.machines)?;
        Ok(checked_div(&checked_add(&leaders, size)?, &self.params.ratio)?)
    }

    /// Place exactly `multiplicity` jobs of `size` as one subround.
    ///
    /// Returns `false` (with the ledger unchanged) when the subround cannot be scheduled.
    pub fn place_subround(
        &mut self,
        size: Rational,
        multiplicity: usize,
    ) -> Result<bool, AdversaryError> {
        self.ensure_open()?;
        check_size(&size)?;
        let round = self.current_round();
        if multiplicity == 0 || multiplicity > round.jobs_left() {
            return Err(AdversaryError::QuotaExceeded {
                round: round.index(),
                requested: multiplicity,
                jobs_left: round.jobs_left(),
            });
        }

        match self.try_subround(size, multiplicity, false)? {
            Some((placement, cutoff)) => {
                self.commit_subround(size, multiplicity, cutoff, placement);
                Ok(true)
            }
            None => {
                log_changes!(
                    self.params.verbosity,
                    "  subround {} x {} could not be scheduled",
                    multiplicity,
                    size
                );
                Ok(false)
            }
        }
    }

    /// Add jobs of `size` one at a time for as long as they fit, then commit them as
    /// one subround.
    ///
    /// Stops at the first rejection or when the round quota (bounded by the
    /// multiplicity cap) is filled. Returns the number of jobs placed.
    pub fn schedule_as_often_as_possible(&mut self, size: Rational) -> Result<usize, AdversaryError> {
        self.ensure_open()?;
        check_size(&size)?;
        let quota = self.subround_quota();
        match self.expand(size, quota) {
            Ok(Some((count, placement, cutoff))) => {
                self.commit_subround(size, count, cutoff, placement);
                Ok(count)
            }
            Ok(None) => Ok(0),
            Err(err) => {
                self.ledger.rollback_pending();
                Err(err)
            }
        }
    }

    fn expand(
        &mut self,
        size: Rational,
        quota: usize,
    ) -> Result<Option<(usize, Placement, Rational)>, AdversaryError> {
        let mut best = None;
        let mut count = 0;
        while count < quota {
            match self.try_subround(size, 1, false)? {
                Some((placement, cutoff)) => {
                    count += 1;
                    log_checks!(
                        self.params.verbosity,
                        "    expansion: {} x {} fits under {}",
                        count,
                        size,
                        cutoff
                    );
                    best = Some((count, placement, cutoff));
                }
                None => break,
            }
        }
        Ok(best)
    }

    /// Smallest grid size at or above `lower` that fits as a single new job.
    ///
    /// Binary search over multiples of `10^-precision` up to `S / (c - 1)` (or the
    /// configured bound). Each candidate is rolled back whatever its result.
    pub fn find_smallest_feasible_job_size(
        &mut self,
        lower: Rational,
    ) -> Result<Option<Rational>, AdversaryError> {
        self.ensure_open()?;
        let verbosity = self.params.verbosity;
        let step = self.params.grid_step;
        let upper = self.size_upper_bound()?;

        let mut lo = grid_ceil(&lower, step)?.max(1);
        let mut hi = grid_floor(&upper, step)?;
        log_debug!(
            verbosity,
            "    size search: grid [{}, {}] / {} (upper bound {})",
            lo,
            hi,
            step,
            upper
        );

        let mut best = None;
        while lo <= hi {
            let mid = lo + (hi - lo) / 2;
            let size = Rational::new(mid, step);
            let feasible = self.try_subround(size, 1, false)?.is_some();
            if feasible {
                self.ledger.rollback(1)?;
                best = Some(size);
                hi = mid - 1;
            } else {
                lo = mid + 1;
            }
            log_checks!(
                verbosity,
                "    candidate {} ({:.4}): {}",
                size,
                to_f64(&size),
                if feasible { "feasible" } else { "rejected" }
            );
        }
        Ok(best)
    }

    /// Fill the current round, starting with jobs of `start_size`.
    ///
    /// Alternates expansion and size search until the round quota is met.
    pub fn complete_round(&mut self, start_size: Rational) -> Result<&Round, AdversaryError> {
        self.ensure_open()?;
        let round_position = self.rounds.len() - 1;
        let round_index = self.current_round().index();
        let mut state = RoundState::Expanding {
            size: start_size,
            after_search: false,
        };

        loop {
            state = match state {
                RoundState::Expanding { size, after_search } => {
                    let quota = self.subround_quota();
                    let placed = self.schedule_as_often_as_possible(size)?;
                    if placed == 0 && after_search {
                        return Err(AdversaryError::ExpansionStalled { size });
                    }
                    if self.rounds.len() - 1 > round_position {
                        RoundState::Done
                    } else if placed == quota {
                        // multiplicity cap reached; the same size may fit again
                        RoundState::Expanding {
                            size,
                            after_search: false,
                        }
                    } else {
                        RoundState::SearchingSize { lower: size }
                    }
                }
                RoundState::SearchingSize { lower } => {
                    match self.find_smallest_feasible_job_size(lower)? {
                        Some(size) => RoundState::Expanding {
                            size,
                            after_search: true,
                        },
                        None => {
                            return Err(AdversaryError::NoFeasibleJobSize {
                                round: round_index,
                                lower,
                            })
                        }
                    }
                }
                RoundState::Done => break,
            };
        }
        Ok(&self.rounds[round_position])
    }

    /// Build the final subround: `multiplicity` jobs of `size`, escalation enabled,
    /// plus the synthetic job on the least-loaded machine.
    ///
    /// Returns `None` (with the ledger unchanged) when it cannot be scheduled.
    pub fn build_final_subround(
        &mut self,
        size: Rational,
        multiplicity: usize,
    ) -> Result<Option<&Round>, AdversaryError> {
        self.ensure_open()?;
        check_size(&size)?;
        let round = self.current_round();
        if !round.is_empty() {
            return Err(AdversaryError::RoundIncomplete {
                round: round.index(),
                jobs_left: round.jobs_left(),
            });
        }
        if multiplicity == 0 || multiplicity > self.params.machines {
            return Err(AdversaryError::QuotaExceeded {
                round: round.index(),
                requested: multiplicity,
                jobs_left: self.params.machines,
            });
        }
        let index = round.index();
        // The synthetic job joins a machine load, so it must share a safe denominator
        let extra = [size, self.params.final_job_size];
        common_denominator(self.ledger.jobs().iter().chain(extra.iter()), &self.params.ratio)?;

        let Some((placement, cutoff)) = self.try_subround(size, multiplicity, true)? else {
            log_changes!(
                self.params.verbosity,
                "  final subround {} x {} could not be scheduled",
                multiplicity,
                size
            );
            return Ok(None);
        };
        self.ledger.commit();

        let subround = Subround::new_final(
            size,
            multiplicity,
            cutoff,
            self.params.ratio,
            placement,
            self.params.final_job_size,
        );
        log_changes!(
            self.params.verbosity,
            "Final subround: {} x {} on {} machines (multiplier {}), makespan {}",
            multiplicity,
            size,
            subround.machine_count(),
            subround.multiplier(),
            subround.makespan()
        );
        let round = self.final_round.insert(Round::new_final(index, subround));
        Ok(Some(&*round))
    }

    /// Snapshot of the construction with identifiers assigned.
    ///
    /// Empty trailing rounds are left out.
    pub fn finish(&self) -> Construction {
        let mut rounds: Vec<Round> = self
            .rounds
            .iter()
            .filter(|round| !round.is_empty())
            .cloned()
            .collect();
        let mut final_round = self.final_round.clone();
        let total = rounds.len() + usize::from(final_round.is_some());
        for round in rounds.iter_mut().chain(final_round.iter_mut()) {
            round.initialize_identifiers(total);
        }
        let final_machine_count = final_round
            .as_ref()
            .map_or(self.params.machines, |round| round.machines());
        Construction {
            rounds,
            final_round,
            final_machine_count,
        }
    }

    /// Append `count` jobs of `size` and query. On success the jobs stay pending;
    /// on rejection or error they are rolled back.
    fn try_subround(
        &mut self,
        size: Rational,
        count: usize,
        is_final: bool,
    ) -> Result<Option<(Placement, Rational)>, AdversaryError> {
        self.ledger.append(size, count);
        let cutoff = match self.cutoff_value(&size) {
            Ok(cutoff) => cutoff,
            Err(err) => {
                self.ledger.rollback(count)?;
                return Err(err);
            }
        };
        let outcome = self.pipeline.run(
            self.ledger.jobs(),
            self.params.machines,
            &cutoff,
            is_final,
        );
        match outcome {
            Ok(PipelineOutcome::Placed(placement)) => Ok(Some((placement, cutoff))),
            Ok(PipelineOutcome::Rejected(rejection)) => {
                log_debug!(
                    self.params.verbosity,
                    "    {} x {} rejected under {}: {:?}",
                    count,
                    size,
                    cutoff,
                    rejection
                );
                self.ledger.rollback(count)?;
                Ok(None)
            }
            Err(err) => {
                self.ledger.rollback(count)?;
                Err(err.into())
            }
        }
    }

    fn commit_subround(
        &mut self,
        size: Rational,
        multiplicity: usize,
        cutoff: Rational,
        placement: Placement,
    ) {
        self.ledger.commit();
        let verbosity = self.params.verbosity;
        let machines = self.params.machines;
        let subround = Subround::new(size, multiplicity, cutoff, self.params.ratio, placement);
        log_changes!(
            verbosity,
            "  subround: {} x {} under cutoff {} ({:.4})",
            multiplicity,
            size,
            cutoff,
            to_f64(&cutoff)
        );

        let last = self.rounds.len() - 1;
        let round = &mut self.rounds[last];
        round.add_subround(subround);
        if round.is_complete() {
            let index = round.index();
            log_changes!(
                verbosity,
                "Round {} complete with {} subrounds",
                index,
                round.subrounds().len()
            );
            self.rounds.push(Round::new(index + 1, machines));
        }
    }

    fn subround_quota(&self) -> usize {
        let jobs_left = self.current_round().jobs_left();
        self.params
            .multiplicity_cap
            .map_or(jobs_left, |cap| jobs_left.min(cap))
    }

    fn size_upper_bound(&self) -> Result<Rational, AdversaryError> {
        if let Some(bound) = self.params.size_upper_bound {
            return Ok(bound);
        }
        let leaders = self.ledger.committed_leader_sum(self.params.machines)?;
        if !is_positive(&leaders) {
            return Err(AdversaryError::InvalidConfig(
                "size search needs a committed job or an explicit size_upper_bound".to_string(),
            ));
        }
        Ok(checked_div(&leaders, &(self.params.ratio - Rational::from_integer(1)))?)
    }

    fn ensure_open(&self) -> Result<(), AdversaryError> {
        if self.final_round.is_some() {
            return Err(AdversaryError::Finished);
        }
        Ok(())
    }
}

fn check_size(size: &Rational) -> Result<(), AdversaryError> {
    if !is_positive(size) {
        return Err(AdversaryError::InvalidConfig(format!(
            "job size must be positive, got {}",
            size
        )));
    }
    Ok(())
}
