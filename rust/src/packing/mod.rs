//! Bin-packing feasibility layer.
//!
//! Splits a job multiset into oracle-assigned and greedily placed jobs, asks the
//! oracle about the former, and assembles a concrete per-machine schedule.

pub mod assembler;
mod bound;
pub mod oracle;
mod pipeline;
pub mod policy;
pub mod query;

pub use assembler::{machine_load, makespan, sort_for_display, MachineJobs};
pub use bound::is_certainly_unpackable;
pub use oracle::{
    Assignment, BranchAndBoundOracle, FeasibilityOracle, InconclusiveReason, OracleVerdict,
};
pub use pipeline::{FeasibilityPipeline, PackingError, Placement, PipelineOutcome, Rejection};
pub use policy::{AdmissionPolicy, CapScope, Partition, ThresholdPolicy};
pub use query::{build_query, BuiltQuery, PackingQuery, SizeGroup};
