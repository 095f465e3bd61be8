//! Configuration types for the adversary search.

use pyo3::prelude::*;
use std::time::Duration;

use crate::logging::level_name;
use crate::packing::{BranchAndBoundOracle, CapScope, ThresholdPolicy};
use crate::rational::{is_positive, parse_rational, precision_step, Rational};
use crate::scheduler::AdversaryError;

/// Parameters of the lower-bound construction.
///
/// Rational values are given as text (`"3/2"`, `"1.5"`, `"2"`) so that Python callers
/// never pass through floating point.
#[pyclass]
#[derive(Clone, Debug)]
pub struct AdversaryConfig {
    /// Number of machines per round (m)
    #[pyo3(get, set)]
    pub machines: usize,
    /// Target competitive ratio c, must exceed 1
    #[pyo3(get, set)]
    pub competitive_ratio: String,
    /// Jobs with size/ceiling below this ratio are placed greedily, in [0, 1)
    #[pyo3(get, set)]
    pub greedy_ratio: String,
    /// Max consecutive equal-size jobs admitted as greedy
    #[pyo3(get, set)]
    pub per_size_cap: Option<usize>,
    /// Where the per-size cap applies: "all_rounds" or "final_only"
    #[pyo3(get, set)]
    pub cap_scope: String,
    /// Decimal digits of the job-size search grid
    #[pyo3(get, set)]
    pub precision: u32,
    /// Oracle time budget per call, in milliseconds
    #[pyo3(get, set)]
    pub oracle_timeout_ms: u64,
    /// Max jobs a single subround may add
    #[pyo3(get, set)]
    pub multiplicity_cap: Option<usize>,
    /// Largest escalation multiplier tried for the final subround
    #[pyo3(get, set)]
    pub max_escalation: usize,
    /// Explicit upper bound for the job-size search, overrides S/(c-1)
    #[pyo3(get, set)]
    pub size_upper_bound: Option<String>,
    /// Size of the synthetic job on the final worst-case machine
    #[pyo3(get, set)]
    pub final_job_size: String,
    /// Logging verbosity (0-3)
    #[pyo3(get, set)]
    pub verbosity: u8,
}

impl Default for AdversaryConfig {
    fn default() -> Self {
        Self {
            machines: 2,
            competitive_ratio: "3/2".to_string(),
            greedy_ratio: "0".to_string(),
            per_size_cap: None,
            cap_scope: "all_rounds".to_string(),
            precision: 2,
            oracle_timeout_ms: 10_000,
            multiplicity_cap: None,
            max_escalation: 6,
            size_upper_bound: None,
            final_job_size: "1".to_string(),
            verbosity: 0,
        }
    }
}

#[pymethods]
impl AdversaryConfig {
    #[new]
    #[pyo3(signature = (
        machines=None,
        competitive_ratio=None,
        greedy_ratio=None,
        per_size_cap=None,
        cap_scope=None,
        precision=None,
        oracle_timeout_ms=None,
        multiplicity_cap=None,
        max_escalation=None,
        size_upper_bound=None,
        final_job_size=None,
        verbosity=None
    ))]
    #[allow(clippy::too_many_arguments)]
    fn new(
        machines: Option<usize>,
        competitive_ratio: Option<String>,
        greedy_ratio: Option<String>,
        per_size_cap: Option<usize>,
        cap_scope: Option<String>,
        precision: Option<u32>,
        oracle_timeout_ms: Option<u64>,
        multiplicity_cap: Option<usize>,
        max_escalation: Option<usize>,
        size_upper_bound: Option<String>,
        final_job_size: Option<String>,
        verbosity: Option<u8>,
    ) -> Self {
        let defaults = Self::default();
        Self {
            machines: machines.unwrap_or(defaults.machines),
            competitive_ratio: competitive_ratio.unwrap_or(defaults.competitive_ratio),
            greedy_ratio: greedy_ratio.unwrap_or(defaults.greedy_ratio),
            per_size_cap: per_size_cap.or(defaults.per_size_cap),
            cap_scope: cap_scope.unwrap_or(defaults.cap_scope),
            precision: precision.unwrap_or(defaults.precision),
            oracle_timeout_ms: oracle_timeout_ms.unwrap_or(defaults.oracle_timeout_ms),
            multiplicity_cap: multiplicity_cap.or(defaults.multiplicity_cap),
            max_escalation: max_escalation.unwrap_or(defaults.max_escalation),
            size_upper_bound: size_upper_bound.or(defaults.size_upper_bound),
            final_job_size: final_job_size.unwrap_or(defaults.final_job_size),
            verbosity: verbosity.unwrap_or(defaults.verbosity),
        }
    }

    fn __repr__(&self) -> String {
        format!(
            "AdversaryConfig(machines={}, competitive_ratio={:?}, greedy_ratio={:?}, cap_scope={:?}, precision={}, verbosity={})",
            self.machines,
            self.competitive_ratio,
            self.greedy_ratio,
            self.cap_scope,
            self.precision,
            level_name(self.verbosity)
        )
    }
}

fn parse_field(field: &str, text: &str) -> Result<Rational, AdversaryError> {
    parse_rational(text).map_err(|e| AdversaryError::InvalidConfig(format!("{}: {}", field, e)))
}

impl AdversaryConfig {
    /// Validate and convert into typed search parameters.
    pub fn resolve(&self) -> Result<SearchParams, AdversaryError> {
        if self.machines == 0 {
            return Err(AdversaryError::InvalidConfig(
                "machines must be at least 1".to_string(),
            ));
        }

        let ratio = parse_field("competitive_ratio", &self.competitive_ratio)?;
        if ratio <= Rational::from_integer(1) {
            return Err(AdversaryError::InvalidConfig(format!(
                "competitive_ratio must exceed 1, got {}",
                ratio
            )));
        }

        let greedy_ratio = parse_field("greedy_ratio", &self.greedy_ratio)?;
        if greedy_ratio < Rational::from_integer(0) || greedy_ratio >= Rational::from_integer(1) {
            return Err(AdversaryError::InvalidConfig(format!(
                "greedy_ratio must lie in [0, 1), got {}",
                greedy_ratio
            )));
        }

        let cap_scope = CapScope::parse(&self.cap_scope).ok_or_else(|| {
            AdversaryError::InvalidConfig(format!(
                "Unknown cap scope: {:?} (expected \"all_rounds\" or \"final_only\")",
                self.cap_scope
            ))
        })?;

        let grid_step = precision_step(self.precision)
            .map_err(|e| AdversaryError::InvalidConfig(format!("precision: {}", e)))?;

        if self.oracle_timeout_ms == 0 {
            return Err(AdversaryError::InvalidConfig(
                "oracle_timeout_ms must be positive".to_string(),
            ));
        }
        if self.multiplicity_cap == Some(0) {
            return Err(AdversaryError::InvalidConfig(
                "multiplicity_cap must be at least 1".to_string(),
            ));
        }
        // Multiplier 1 is the unescalated attempt
        if self.max_escalation < 2 {
            return Err(AdversaryError::InvalidConfig(format!(
                "max_escalation must be at least 2, got {}",
                self.max_escalation
            )));
        }

        let size_upper_bound = match &self.size_upper_bound {
            Some(text) => {
                let bound = parse_field("size_upper_bound", text)?;
                if !is_positive(&bound) {
                    return Err(AdversaryError::InvalidConfig(format!(
                        "size_upper_bound must be positive, got {}",
                        bound
                    )));
                }
                Some(bound)
            }
            None => None,
        };

        let final_job_size = parse_field("final_job_size", &self.final_job_size)?;
        if !is_positive(&final_job_size) {
            return Err(AdversaryError::InvalidConfig(format!(
                "final_job_size must be positive, got {}",
                final_job_size
            )));
        }

        Ok(SearchParams {
            machines: self.machines,
            ratio,
            greedy_ratio,
            per_size_cap: self.per_size_cap,
            cap_scope,
            precision: self.precision,
            grid_step,
            oracle_timeout: Duration::from_millis(self.oracle_timeout_ms),
            multiplicity_cap: self.multiplicity_cap,
            max_escalation: self.max_escalation,
            size_upper_bound,
            final_job_size,
            verbosity: self.verbosity,
        })
    }
}

/// Validated, typed form of [`AdversaryConfig`].
#[derive(Clone, Debug)]
pub struct SearchParams {
    pub machines: usize,
    pub ratio: Rational,
    pub greedy_ratio: Rational,
    pub per_size_cap: Option<usize>,
    pub cap_scope: CapScope,
    pub precision: u32,
    /// `10^precision`; grid points are `k / grid_step`.
    pub grid_step: i128,
    pub oracle_timeout: Duration,
    pub multiplicity_cap: Option<usize>,
    pub max_escalation: usize,
    pub size_upper_bound: Option<Rational>,
    pub final_job_size: Rational,
    pub verbosity: u8,
}

impl SearchParams {
    pub fn policy(&self) -> ThresholdPolicy {
        ThresholdPolicy {
            ratio: self.greedy_ratio,
            per_size_cap: self.per_size_cap,
            cap_scope: self.cap_scope,
        }
    }

    pub fn oracle(&self) -> BranchAndBoundOracle {
        BranchAndBoundOracle::new(self.oracle_timeout)
    }
}
