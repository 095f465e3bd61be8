//! Feasibility oracle seam and the bundled exact solver.

use std::time::{Duration, Instant};

use super::bound::is_certainly_unpackable;
use super::query::PackingQuery;

/// How often (in search nodes) the solver looks at the clock.
const CLOCK_CHECK_INTERVAL: u64 = 1024;

/// Per-group, per-machine job counts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Assignment {
    counts: Vec<Vec<usize>>,
}

impl Assignment {
    /// All-zero assignment for `groups` sizes on `machines` machines.
    pub fn empty(groups: usize, machines: usize) -> Self {
        Self {
            counts: vec![vec![0; machines]; groups],
        }
    }

    pub fn from_counts(counts: Vec<Vec<usize>>) -> Self {
        Self { counts }
    }

    #[inline]
    pub fn count(&self, group: usize, machine: usize) -> usize {
        self.counts
            .get(group)
            .and_then(|row| row.get(machine))
            .copied()
            .unwrap_or(0)
    }

    /// Scaled load of `machine` under `query`.
    pub fn machine_load(&self, query: &PackingQuery, machine: usize) -> i128 {
        query
            .groups
            .iter()
            .enumerate()
            .map(|(g, group)| group.scaled as i128 * self.count(g, machine) as i128)
            .sum()
    }

    /// Check both query constraints: exact counts per size and capacity per machine.
    pub fn satisfies(&self, query: &PackingQuery) -> bool {
        if self.counts.len() != query.groups.len() {
            return false;
        }
        let exact = query.groups.iter().enumerate().all(|(g, group)| {
            self.counts[g].len() == query.machines
                && self.counts[g].iter().sum::<usize>() == group.count
        });
        exact
            && (0..query.machines)
                .all(|machine| self.machine_load(query, machine) <= query.capacity as i128)
    }
}

/// Why a solver gave up without a verdict.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InconclusiveReason {
    TimeLimit(Duration),
    NodeLimit(u64),
    /// Failure inside an external solver.
    SolverFailure,
}

impl std::fmt::Display for InconclusiveReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TimeLimit(limit) => write!(f, "time limit of {:?} reached", limit),
            Self::NodeLimit(limit) => write!(f, "node limit of {} reached", limit),
            Self::SolverFailure => write!(f, "solver failure"),
        }
    }
}

/// Answer to a feasibility query.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OracleVerdict {
    Feasible(Assignment),
    Infeasible,
    Inconclusive(InconclusiveReason),
}

impl OracleVerdict {
    /// Short label used in logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Feasible(_) => "FEASIBLE",
            Self::Infeasible => "INFEASIBLE",
            Self::Inconclusive(_) => "INCONCLUSIVE",
        }
    }
}

/// Decides whether a [`PackingQuery`] has a solution.
///
/// Calls are blocking. Implementations must enforce their own time budget and
/// report running out of it as [`OracleVerdict::Inconclusive`].
pub trait FeasibilityOracle {
    fn solve(&self, query: &PackingQuery) -> OracleVerdict;
}

impl<O: FeasibilityOracle + ?Sized> FeasibilityOracle for &O {
    fn solve(&self, query: &PackingQuery) -> OracleVerdict {
        (**self).solve(query)
    }
}

/// Exact depth-first solver for identical-machine packing.
///
/// Jobs are placed largest first. Jobs of one size are interchangeable, so each goes
/// on a machine index no lower than the previous job of that size. At each node,
/// machines whose current load equals one already tried are skipped. The search
/// backtracks when the remaining load exceeds the free space on machines that can
/// still take the smallest job, or when the jobs left in the current size do not fit
/// on the machines still open to them.
#[derive(Clone, Debug)]
pub struct BranchAndBoundOracle {
    pub time_limit: Duration,
    pub node_limit: Option<u64>,
}

impl Default for BranchAndBoundOracle {
    fn default() -> Self {
        Self {
            time_limit: Duration::from_secs(10),
            node_limit: None,
        }
    }
}

impl BranchAndBoundOracle {
    pub fn new(time_limit: Duration) -> Self {
        Self {
            time_limit,
            node_limit: None,
        }
    }

    pub fn with_node_limit(mut self, node_limit: u64) -> Self {
        self.node_limit = Some(node_limit);
        self
    }
}

impl FeasibilityOracle for BranchAndBoundOracle {
    fn solve(&self, query: &PackingQuery) -> OracleVerdict {
        if query.is_trivial() {
            return OracleVerdict::Feasible(Assignment::empty(0, query.machines));
        }
        if is_certainly_unpackable(query) {
            return OracleVerdict::Infeasible;
        }

        let mut search = Search::new(query, self);
        if search.place(0) {
            debug_assert!(Assignment::from_counts(search.counts.clone()).satisfies(query));
            return OracleVerdict::Feasible(Assignment::from_counts(search.counts));
        }
        match search.abort {
            Some(reason) => OracleVerdict::Inconclusive(reason),
            None => OracleVerdict::Infeasible,
        }
    }
}

struct Search<'a> {
    query: &'a PackingQuery,
    /// Group index of every job, largest first.
    items: Vec<usize>,
    /// `suffix_load[i]` = scaled load of `items[i..]`.
    suffix_load: Vec<i128>,
    /// One past the last item of each group.
    group_end: Vec<usize>,
    /// Machine holding `items[i]` on the current path.
    chosen: Vec<usize>,
    loads: Vec<i64>,
    counts: Vec<Vec<usize>>,
    nodes: u64,
    deadline: Instant,
    time_limit: Duration,
    node_limit: Option<u64>,
    abort: Option<InconclusiveReason>,
}

impl<'a> Search<'a> {
    fn new(query: &'a PackingQuery, oracle: &BranchAndBoundOracle) -> Self {
        let mut items = Vec::with_capacity(query.total_jobs());
        let mut group_end = Vec::with_capacity(query.groups.len());
        for (g, group) in query.groups.iter().enumerate() {
            items.extend(std::iter::repeat(g).take(group.count));
            group_end.push(items.len());
        }
        let mut suffix_load = vec![0i128; items.len() + 1];
        for i in (0..items.len()).rev() {
            suffix_load[i] = suffix_load[i + 1] + query.groups[items[i]].scaled as i128;
        }
        let chosen = vec![0; items.len()];
        Self {
            query,
            items,
            suffix_load,
            group_end,
            chosen,
            loads: vec![0; query.machines],
            counts: vec![vec![0; query.machines]; query.groups.len()],
            nodes: 0,
            deadline: Instant::now() + oracle.time_limit,
            time_limit: oracle.time_limit,
            node_limit: oracle.node_limit,
            abort: None,
        }
    }

    fn out_of_budget(&mut self) -> bool {
        if self.abort.is_some() {
            return true;
        }
        self.nodes += 1;
        if let Some(limit) = self.node_limit {
            if self.nodes > limit {
                self.abort = Some(InconclusiveReason::NodeLimit(limit));
                return true;
            }
        }
        if self.nodes % CLOCK_CHECK_INTERVAL == 0 && Instant::now() >= self.deadline {
            self.abort = Some(InconclusiveReason::TimeLimit(self.time_limit));
            return true;
        }
        false
    }

    fn place(&mut self, index: usize) -> bool {
        if index == self.items.len() {
            return true;
        }
        if self.out_of_budget() {
            return false;
        }

        let capacity = self.query.capacity;
        let group = self.items[index];
        let size = self.query.groups[group].scaled;

        // items are sorted descending, so the last one is the smallest remaining
        let smallest = match self.items.last() {
            Some(&g) => self.query.groups[g].scaled,
            None => return true,
        };
        let usable: i128 = self
            .loads
            .iter()
            .map(|&load| (capacity - load) as i128)
            .filter(|&free| free >= smallest as i128)
            .sum();
        if self.suffix_load[index] > usable {
            return false;
        }

        let first = match index.checked_sub(1) {
            Some(prev) if self.items[prev] == group => self.chosen[prev],
            _ => 0,
        };
        let slots: usize = self.loads[first..]
            .iter()
            .map(|&load| ((capacity - load) / size) as usize)
            .sum();
        if slots < self.group_end[group] - index {
            return false;
        }

        let mut tried_loads: Vec<i64> = Vec::with_capacity(self.loads.len());
        for machine in first..self.loads.len() {
            let load = self.loads[machine];
            if load + size > capacity || tried_loads.contains(&load) {
                continue;
            }
            tried_loads.push(load);

            self.chosen[index] = machine;
            self.loads[machine] += size;
            self.counts[group][machine] += 1;
            if self.place(index + 1) {
                return true;
            }
            self.loads[machine] -= size;
            self.counts[group][machine] -= 1;

            if self.abort.is_some() {
                return false;
            }
        }
        false
    }
}
