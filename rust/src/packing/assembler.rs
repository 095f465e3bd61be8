//! Turns oracle assignments and greedily placed jobs into per-machine schedules.

use std::cmp::Ordering;

use crate::rational::{checked_add, checked_sum, Rational, RationalError};

use super::oracle::Assignment;
use super::query::PackingQuery;

/// Jobs on one machine.
pub type MachineJobs = Vec<Rational>;

/// Total load of one machine.
///
/// Only for schedules built by this module, whose jobs share a denominator that
/// passed the width check.
pub fn machine_load(jobs: &[Rational]) -> Rational {
    jobs.iter()
        .fold(Rational::from_integer(0), |acc, job| acc + job)
}

/// Largest machine load (zero for an empty schedule).
pub fn makespan(schedule: &[MachineJobs]) -> Rational {
    schedule
        .iter()
        .map(|jobs| machine_load(jobs))
        .max()
        .unwrap_or_else(|| Rational::from_integer(0))
}

/// Expand per-group counts into concrete job lists.
pub fn replay(query: &PackingQuery, assignment: &Assignment) -> Vec<MachineJobs> {
    let mut schedule: Vec<MachineJobs> = vec![Vec::new(); query.machines];
    for (g, group) in query.groups.iter().enumerate() {
        for (machine, jobs) in schedule.iter_mut().enumerate() {
            let count = assignment.count(g, machine);
            jobs.extend(std::iter::repeat(group.size).take(count));
        }
    }
    schedule
}

/// Place `small` jobs, largest first, each on the least-loaded machine if it stays
/// within `ceiling`.
///
/// Returns the jobs that fit nowhere.
pub fn place_greedily(
    schedule: &mut [MachineJobs],
    small: &[Rational],
    ceiling: &Rational,
) -> Result<Vec<Rational>, RationalError> {
    let mut loads = schedule
        .iter()
        .map(|jobs| checked_sum(jobs))
        .collect::<Result<Vec<Rational>, _>>()?;
    let mut ordered = small.to_vec();
    ordered.sort_by(|a, b| b.cmp(a));

    let mut jobs_left = Vec::new();
    for job in ordered {
        // first machine with the minimum load
        let target = loads
            .iter()
            .enumerate()
            .min_by(|(i, a), (j, b)| a.cmp(b).then(i.cmp(j)))
            .map(|(i, _)| i);
        let Some(machine) = target else {
            jobs_left.push(job);
            continue;
        };
        let load = checked_add(&loads[machine], &job)?;
        if load <= *ceiling {
            loads[machine] = load;
            schedule[machine].push(job);
        } else {
            jobs_left.push(job);
        }
    }
    Ok(jobs_left)
}

/// Build the escalated schedule: `copies` copies of `base`, with the machines of
/// `escalated` spread between them in blocks of `base.len()`.
pub fn interleave(base: &[MachineJobs], escalated: &[MachineJobs], copies: usize) -> Vec<MachineJobs> {
    let block = base.len().max(1);
    let mut blocks = escalated.chunks(block);
    let mut result = Vec::with_capacity(base.len() * copies + escalated.len());
    for copy in 0..copies {
        result.extend(base.iter().cloned());
        if copy + 1 < copies {
            if let Some(chunk) = blocks.next() {
                result.extend(chunk.iter().cloned());
            }
        }
    }
    for chunk in blocks {
        result.extend(chunk.iter().cloned());
    }
    result
}

fn cmp_machines(a: &(Rational, MachineJobs), b: &(Rational, MachineJobs)) -> Ordering {
    b.0.cmp(&a.0).then_with(|| b.1.cmp(&a.1))
}

/// Deterministic display order: jobs descending on each machine, machines by
/// descending load, then by composition.
pub fn sort_for_display(schedule: &mut Vec<MachineJobs>) {
    let mut keyed: Vec<(Rational, MachineJobs)> = schedule
        .drain(..)
        .map(|mut jobs| {
            jobs.sort_by(|a, b| b.cmp(a));
            (machine_load(&jobs), jobs)
        })
        .collect();
    keyed.sort_by(cmp_machines);
    schedule.extend(keyed.into_iter().map(|(_, jobs)| jobs));
}
