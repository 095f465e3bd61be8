//! Cheap necessary conditions for a query to be packable.

use super::query::PackingQuery;

/// Returns true when `query` can be proven unpackable without searching.
///
/// Checks, in order:
/// - a single job exceeding the capacity
/// - the total load exceeding `machines * capacity`
/// - a lower bound on the space every large job must waste in its own machine
///
/// A `false` answer proves nothing.
pub fn is_certainly_unpackable(query: &PackingQuery) -> bool {
    if query.is_trivial() {
        return false;
    }
    if query.machines == 0 || query.capacity < 0 {
        return true;
    }

    let capacity = query.capacity as i128;
    let machines = query.machines as i128;

    // groups are sorted descending; the first one is the largest job
    if query.groups[0].scaled as i128 > capacity {
        return true;
    }

    let total = query.total_load();
    let job_count = query.total_jobs();
    if job_count <= query.machines {
        return false;
    }
    if total > machines * capacity {
        return true;
    }
    if query.machines == 1 || job_count <= 2 {
        return false;
    }

    let mut jobs: Vec<i128> = Vec::with_capacity(job_count);
    for group in query.groups.iter().rev() {
        jobs.extend(std::iter::repeat(group.scaled as i128).take(group.count));
    }

    if job_count == 3 {
        // three jobs on two machines: the two smallest must share
        return jobs[0] + jobs[1] > capacity;
    }

    let smallest_pair = jobs[2].min(jobs[0] + jobs[1]);
    let mut min_wasted = 0i128;
    for index in (1..jobs.len()).rev() {
        let size = jobs[index];

        if size + jobs[0] > capacity {
            min_wasted += capacity - size;
            continue;
        }
        if index > 1 && size + jobs[1] > capacity {
            min_wasted += capacity - jobs[0] - size;
            continue;
        }
        if index > 2 && size + smallest_pair > capacity {
            min_wasted += capacity - jobs[1] - size;
        }
    }

    total + min_wasted > machines * capacity
}
