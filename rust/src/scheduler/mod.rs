//! Round construction for the adversarial lower bound.
//!
//! The scheduler alternates two searches per round: a linear expansion that adds
//! jobs of one size while they still fit, and a binary search for the smallest size
//! that fits at all. The last subround of the construction is built separately, with
//! escalation enabled.

mod core;

pub use core::{AdversaryError, Construction, RoundScheduler};
