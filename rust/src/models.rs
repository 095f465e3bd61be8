//! Round and subround records produced by the search and read by reporting.

use rustc_hash::FxHashMap;

use crate::packing::{machine_load, makespan, sort_for_display, MachineJobs, Placement};
use crate::rational::Rational;

/// Extra data carried by the final subround.
#[derive(Clone, Debug, PartialEq)]
pub enum SubroundKind {
    Ordinary,
    /// The machine at `worst_case_machine` carries `synthetic_job` on top of its
    /// regular jobs and is exempt from the ceiling.
    Final {
        worst_case_machine: usize,
        synthetic_job: Rational,
    },
}

/// `multiplicity` jobs of `job_size` placed together with every earlier job.
#[derive(Clone, Debug, PartialEq)]
pub struct Subround {
    job_size: Rational,
    multiplicity: usize,
    cutoff_value: Rational,
    ratio: Rational,
    scale_factor: i128,
    schedule: Vec<MachineJobs>,
    multiplier: usize,
    kind: SubroundKind,
    identifier: String,
    name: String,
}

impl Subround {
    pub(crate) fn new(
        job_size: Rational,
        multiplicity: usize,
        cutoff_value: Rational,
        ratio: Rational,
        placement: Placement,
    ) -> Self {
        let Placement {
            mut schedule,
            scale_factor,
            multiplier,
        } = placement;
        sort_for_display(&mut schedule);
        Self {
            job_size,
            multiplicity,
            cutoff_value,
            ratio,
            scale_factor,
            schedule,
            multiplier,
            kind: SubroundKind::Ordinary,
            identifier: String::new(),
            name: String::new(),
        }
    }

    /// Final subround: the least-loaded machine receives `synthetic_job`.
    pub(crate) fn new_final(
        job_size: Rational,
        multiplicity: usize,
        cutoff_value: Rational,
        ratio: Rational,
        placement: Placement,
        synthetic_job: Rational,
    ) -> Self {
        let mut subround = Self::new(job_size, multiplicity, cutoff_value, ratio, placement);
        // Display order puts the least-loaded machine last
        if subround.schedule.is_empty() {
            subround.schedule.push(Vec::new());
        }
        let worst_case_machine = subround.schedule.len() - 1;
        subround.schedule[worst_case_machine].push(synthetic_job);
        subround.kind = SubroundKind::Final {
            worst_case_machine,
            synthetic_job,
        };
        subround
    }

    pub fn job_size(&self) -> Rational {
        self.job_size
    }

    /// Jobs of `job_size` added by this subround (per copy when escalated).
    pub fn multiplicity(&self) -> usize {
        self.multiplicity
    }

    /// Machines in the schedule, including any added by escalation.
    pub fn machine_count(&self) -> usize {
        self.schedule.len()
    }

    /// Competitive ratio `c`.
    pub fn ratio(&self) -> Rational {
        self.ratio
    }

    pub fn cutoff_value(&self) -> Rational {
        self.cutoff_value
    }

    pub fn scale_factor(&self) -> i128 {
        self.scale_factor
    }

    pub fn schedule(&self) -> &[MachineJobs] {
        &self.schedule
    }

    /// Escalation multiplier (1 when no escalation happened).
    pub fn multiplier(&self) -> usize {
        self.multiplier
    }

    /// Jobs of `job_size` across all escalated copies.
    pub fn placed_jobs(&self) -> usize {
        self.multiplicity * self.multiplier
    }

    pub fn kind(&self) -> &SubroundKind {
        &self.kind
    }

    pub fn is_final(&self) -> bool {
        matches!(self.kind, SubroundKind::Final { .. })
    }

    pub fn worst_case_machine(&self) -> Option<usize> {
        match self.kind {
            SubroundKind::Final {
                worst_case_machine, ..
            } => Some(worst_case_machine),
            SubroundKind::Ordinary => None,
        }
    }

    pub fn synthetic_job(&self) -> Option<Rational> {
        match self.kind {
            SubroundKind::Final { synthetic_job, .. } => Some(synthetic_job),
            SubroundKind::Ordinary => None,
        }
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Largest machine load.
    pub fn makespan(&self) -> Rational {
        makespan(&self.schedule)
    }

    pub fn machine_loads(&self) -> Vec<Rational> {
        self.schedule.iter().map(|jobs| machine_load(jobs)).collect()
    }

    /// Every machine except the worst-case one stays within the cutoff.
    pub fn respects_cutoff(&self) -> bool {
        let exempt = self.worst_case_machine();
        self.schedule
            .iter()
            .enumerate()
            .filter(|(machine, _)| Some(*machine) != exempt)
            .all(|(_, jobs)| machine_load(jobs) <= self.cutoff_value)
    }

    /// Number of placed jobs per size, without the synthetic job.
    pub fn job_counts(&self) -> FxHashMap<Rational, usize> {
        let mut counts: FxHashMap<Rational, usize> = FxHashMap::default();
        for jobs in &self.schedule {
            for job in jobs {
                *counts.entry(*job).or_insert(0) += 1;
            }
        }
        if let Some(synthetic) = self.synthetic_job() {
            if let Some(count) = counts.get_mut(&synthetic) {
                *count -= 1;
                if *count == 0 {
                    counts.remove(&synthetic);
                }
            }
        }
        counts
    }

    pub(crate) fn set_identifier(&mut self, identifier: String, name: String) {
        self.identifier = identifier;
        self.name = name;
    }
}

/// Subrounds that together fill the machine quota.
#[derive(Clone, Debug, PartialEq)]
pub struct Round {
    index: usize,
    machines: usize,
    subrounds: Vec<Subround>,
    is_final: bool,
}

impl Round {
    pub fn new(index: usize, machines: usize) -> Self {
        Self {
            index,
            machines,
            subrounds: Vec::new(),
            is_final: false,
        }
    }

    /// Round holding only the final subround; its machine count is the subround's.
    pub(crate) fn new_final(index: usize, subround: Subround) -> Self {
        Self {
            index,
            machines: subround.machine_count(),
            subrounds: vec![subround],
            is_final: true,
        }
    }

    pub(crate) fn add_subround(&mut self, subround: Subround) {
        self.subrounds.push(subround);
    }

    /// 1-based position among all rounds.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn machines(&self) -> usize {
        self.machines
    }

    pub fn is_final(&self) -> bool {
        self.is_final
    }

    pub fn subrounds(&self) -> &[Subround] {
        &self.subrounds
    }

    pub fn subround(&self, index: usize) -> Option<&Subround> {
        self.subrounds.get(index)
    }

    pub fn is_empty(&self) -> bool {
        self.subrounds.is_empty()
    }

    /// Jobs placed by the round's subrounds, counting every escalated copy.
    pub fn placed_jobs(&self) -> usize {
        self.subrounds.iter().map(|s| s.placed_jobs()).sum()
    }

    /// Machines of the quota not yet covered by a subround.
    ///
    /// Always zero for the final round, which is complete once built.
    pub fn jobs_left(&self) -> usize {
        if self.is_final {
            return 0;
        }
        self.machines.saturating_sub(self.placed_jobs())
    }

    pub fn is_complete(&self) -> bool {
        self.is_final || self.jobs_left() == 0
    }

    /// Letter-based identifiers and names for reporting.
    ///
    /// With `total_rounds` rounds, round `i` gets letter `'z' - total_rounds + i`.
    /// A single subround is named `Round<i>`; several are `Subround<i>.<j>` with
    /// identifiers `<letter>_<j>`.
    pub(crate) fn initialize_identifiers(&mut self, total_rounds: usize) {
        let letter = round_letter(self.index, total_rounds);
        let index = self.index;
        if self.subrounds.len() == 1 {
            self.subrounds[0].set_identifier(letter, format!("Round{}", index));
        } else {
            for (i, subround) in self.subrounds.iter_mut().enumerate() {
                subround.set_identifier(
                    format!("{}_{}", letter, i + 1),
                    format!("Subround{}.{}", index, i + 1),
                );
            }
        }
    }
}

/// Letter of round `index` (1-based) among `total_rounds` rounds.
pub fn round_letter(index: usize, total_rounds: usize) -> String {
    let code = (b'z' as usize + index).checked_sub(total_rounds);
    match code {
        Some(c) if c >= b'a' as usize && c <= b'z' as usize => ((c as u8) as char).to_string(),
        _ => format!("r{}", index),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(n: i128, d: i128) -> Rational {
        Rational::new(n, d)
    }

    fn placement(schedule: Vec<MachineJobs>) -> Placement {
        Placement {
            schedule,
            scale_factor: 1,
            multiplier: 1,
        }
    }

    fn unit_subround(multiplicity: usize) -> Subround {
        Subround::new(
            r(1, 1),
            multiplicity,
            r(1, 1),
            r(2, 1),
            placement(vec![vec![r(1, 1)]; multiplicity]),
        )
    }

    #[test]
    fn test_subround_accessors() {
        let sub = Subround::new(
            r(1, 2),
            2,
            r(3, 2),
            r(3, 2),
            placement(vec![vec![r(1, 2)], vec![r(1, 1), r(1, 2)]]),
        );
        assert_eq!(sub.machine_count(), 2);
        assert_eq!(sub.makespan(), r(3, 2));
        // display order: heaviest machine first, jobs descending
        assert_eq!(sub.schedule()[0], vec![r(1, 1), r(1, 2)]);
        assert!(sub.respects_cutoff());
        assert!(!sub.is_final());
        assert_eq!(sub.job_counts().get(&r(1, 2)), Some(&2));
    }

    #[test]
    fn test_final_subround_marks_worst_case_machine() {
        let sub = Subround::new_final(
            r(1, 1),
            2,
            r(1, 1),
            r(2, 1),
            placement(vec![vec![r(1, 1)], vec![r(1, 2)]]),
            r(1, 1),
        );
        assert!(sub.is_final());
        assert_eq!(sub.worst_case_machine(), Some(1));
        assert_eq!(sub.schedule()[1], vec![r(1, 2), r(1, 1)]);
        // the worst-case machine exceeds the cutoff but is exempt
        assert_eq!(sub.makespan(), r(3, 2));
        assert!(sub.respects_cutoff());
        assert_eq!(sub.job_counts().get(&r(1, 1)), Some(&1));
    }

    #[test]
    fn test_final_round_counts_escalated_copies() {
        let escalated = Placement {
            schedule: vec![vec![r(1, 1)], vec![r(1, 2), r(1, 2)], vec![r(1, 1)]],
            scale_factor: 2,
            multiplier: 2,
        };
        let sub = Subround::new_final(r(1, 2), 1, r(1, 1), r(2, 1), escalated, r(1, 1));
        assert_eq!(sub.placed_jobs(), 2);
        let round = Round::new_final(2, sub);
        assert_eq!(round.machines(), 3);
        assert_eq!(round.placed_jobs(), 2);
        assert_eq!(round.jobs_left(), 0);
        assert!(round.is_complete());
    }

    #[test]
    fn test_jobs_left() {
        let mut round = Round::new(1, 4);
        assert_eq!(round.jobs_left(), 4);
        round.add_subround(unit_subround(3));
        assert_eq!(round.jobs_left(), 1);
        assert!(!round.is_complete());
        round.add_subround(unit_subround(1));
        assert!(round.is_complete());
    }

    #[test]
    fn test_identifiers() {
        let mut single = Round::new(1, 2);
        single.add_subround(unit_subround(2));
        single.initialize_identifiers(3);
        assert_eq!(single.subrounds()[0].identifier(), "x");
        assert_eq!(single.subrounds()[0].name(), "Round1");

        let mut split = Round::new(2, 3);
        split.add_subround(unit_subround(2));
        split.add_subround(unit_subround(1));
        split.initialize_identifiers(3);
        assert_eq!(split.subrounds()[0].identifier(), "y_1");
        assert_eq!(split.subrounds()[1].name(), "Subround2.2");
    }

    #[test]
    fn test_round_letter_fallback() {
        assert_eq!(round_letter(3, 3), "z");
        assert_eq!(round_letter(1, 26), "a");
        assert_eq!(round_letter(1, 27), "r1");
    }
}
