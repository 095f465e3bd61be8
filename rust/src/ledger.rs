//! Append-only log of every job placed so far.
//!
//! Jobs enter the log speculatively. A successful feasibility query is followed by
//! [`JobLedger::commit`]. A failed one is followed by [`JobLedger::rollback`], which
//! restores the exact pre-query contents. Committed jobs can never be removed.

use crate::rational::{checked_sum, Rational, RationalError};

/// Errors raised by ledger misuse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Tried to roll back more jobs than are pending.
    RollbackUnderflow { requested: usize, pending: usize },
}

impl std::fmt::Display for LedgerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RollbackUnderflow { requested, pending } => write!(
                f,
                "Cannot roll back {} jobs, only {} are pending",
                requested, pending
            ),
        }
    }
}

impl std::error::Error for LedgerError {}

/// Ordered job multiset with an explicit commit point.
#[derive(Clone, Debug, Default)]
pub struct JobLedger {
    jobs: Vec<Rational>,
    committed: usize,
}

impl JobLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Speculatively append `count` jobs of `size`.
    pub fn append(&mut self, size: Rational, count: usize) {
        self.jobs.extend(std::iter::repeat(size).take(count));
    }

    /// Make every pending job permanent.
    pub fn commit(&mut self) {
        self.committed = self.jobs.len();
    }

    /// Remove the `count` most recent pending jobs.
    pub fn rollback(&mut self, count: usize) -> Result<(), LedgerError> {
        let pending = self.pending();
        if count > pending {
            return Err(LedgerError::RollbackUnderflow {
                requested: count,
                pending,
            });
        }
        self.jobs.truncate(self.jobs.len() - count);
        Ok(())
    }

    /// Drop everything that has not been committed.
    pub fn rollback_pending(&mut self) {
        self.jobs.truncate(self.committed);
    }

    /// All jobs, committed first, then pending.
    #[inline]
    pub fn jobs(&self) -> &[Rational] {
        &self.jobs
    }

    #[inline]
    pub fn committed_jobs(&self) -> &[Rational] {
        &self.jobs[..self.committed]
    }

    #[inline]
    pub fn pending(&self) -> usize {
        self.jobs.len() - self.committed
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Size of the most recently committed job.
    pub fn last_committed(&self) -> Option<&Rational> {
        self.committed_jobs().last()
    }

    /// Sum of the jobs at positions `0, m, 2m, ...` (the first job of every round).
    pub fn round_leader_sum(&self, machines: usize) -> Result<Rational, RationalError> {
        Self::leader_sum(&self.jobs, machines)
    }

    /// Like [`round_leader_sum`](Self::round_leader_sum) but over committed jobs only.
    pub fn committed_leader_sum(&self, machines: usize) -> Result<Rational, RationalError> {
        Self::leader_sum(self.committed_jobs(), machines)
    }

    fn leader_sum(jobs: &[Rational], machines: usize) -> Result<Rational, RationalError> {
        checked_sum(jobs.iter().step_by(machines.max(1)))
    }
}
