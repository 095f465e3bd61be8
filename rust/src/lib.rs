//! Adversarial lower-bound construction for online makespan scheduling.
//!
//! Builds a sequence of rounds of equal-size jobs such that any deterministic online
//! algorithm ends with a makespan above `c` times the offline optimum. The search
//! decides every subround with an exact bin-packing feasibility check.

// Allow clippy warning triggered by PyO3 macro expansion
#![allow(clippy::useless_conversion)]

use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

mod config;
pub mod ledger;
pub mod logging;
mod models;
pub mod packing;
pub mod rational;
pub mod scheduler;

pub use config::{AdversaryConfig, SearchParams};
pub use ledger::{JobLedger, LedgerError};
pub use models::{round_letter, Round, Subround, SubroundKind};
pub use packing::{
    AdmissionPolicy, BranchAndBoundOracle, FeasibilityOracle, OracleVerdict, PackingQuery,
    ThresholdPolicy,
};
pub use rational::{parse_rational, Rational, RationalError};
pub use scheduler::{AdversaryError, Construction, RoundScheduler};

fn to_py_err(err: AdversaryError) -> PyErr {
    PyValueError::new_err(err.to_string())
}

/// Convert to `fractions.Fraction`.
fn to_fraction(py: Python<'_>, value: &Rational) -> PyResult<PyObject> {
    let fraction = py.import_bound("fractions")?.getattr("Fraction")?;
    Ok(fraction.call1((*value.numer(), *value.denom()))?.unbind())
}

/// Accept `str` ("3/2", "1.5"), `int` or `fractions.Fraction`; floats are refused.
fn extract_rational(value: &Bound<'_, PyAny>) -> PyResult<Rational> {
    if let Ok(text) = value.extract::<String>() {
        return parse_rational(&text).map_err(|e| PyValueError::new_err(e.to_string()));
    }
    let numer: i128 = value.getattr("numerator")?.extract()?;
    let denom: i128 = value.getattr("denominator")?.extract()?;
    if denom == 0 {
        return Err(PyValueError::new_err("denominator must not be zero"));
    }
    Ok(Rational::new(numer, denom))
}

/// Read-only view of a subround (PyO3 wrapper).
#[pyclass(name = "Subround")]
#[derive(Clone, Debug)]
pub struct PySubround {
    inner: Subround,
}

#[pymethods]
impl PySubround {
    #[getter]
    fn job_size(&self, py: Python<'_>) -> PyResult<PyObject> {
        to_fraction(py, &self.inner.job_size())
    }

    #[getter]
    fn multiplicity(&self) -> usize {
        self.inner.multiplicity()
    }

    #[getter]
    fn machine_count(&self) -> usize {
        self.inner.machine_count()
    }

    /// Multiplicity times the escalation multiplier.
    #[getter]
    fn placed_jobs(&self) -> usize {
        self.inner.placed_jobs()
    }

    #[getter]
    fn competitive_ratio(&self, py: Python<'_>) -> PyResult<PyObject> {
        to_fraction(py, &self.inner.ratio())
    }

    #[getter]
    fn cutoff_value(&self, py: Python<'_>) -> PyResult<PyObject> {
        to_fraction(py, &self.inner.cutoff_value())
    }

    #[getter]
    fn scale_factor(&self) -> i128 {
        self.inner.scale_factor()
    }

    #[getter]
    fn multiplier(&self) -> usize {
        self.inner.multiplier()
    }

    #[getter]
    fn identifier(&self) -> String {
        self.inner.identifier().to_string()
    }

    #[getter]
    fn name(&self) -> String {
        self.inner.name().to_string()
    }

    #[getter]
    fn is_final(&self) -> bool {
        self.inner.is_final()
    }

    #[getter]
    fn worst_case_machine(&self) -> Option<usize> {
        self.inner.worst_case_machine()
    }

    /// Per-machine job lists, heaviest machine first.
    #[getter]
    fn schedule(&self, py: Python<'_>) -> PyResult<Vec<Vec<PyObject>>> {
        self.inner
            .schedule()
            .iter()
            .map(|jobs| jobs.iter().map(|job| to_fraction(py, job)).collect())
            .collect()
    }

    #[getter]
    fn makespan(&self, py: Python<'_>) -> PyResult<PyObject> {
        to_fraction(py, &self.inner.makespan())
    }

    fn machine_loads(&self, py: Python<'_>) -> PyResult<Vec<PyObject>> {
        self.inner
            .machine_loads()
            .iter()
            .map(|load| to_fraction(py, load))
            .collect()
    }

    fn __repr__(&self) -> String {
        format!(
            "Subround(name={:?}, job_size={}, multiplicity={}, cutoff={}, machines={})",
            self.inner.name(),
            self.inner.job_size(),
            self.inner.multiplicity(),
            self.inner.cutoff_value(),
            self.inner.machine_count()
        )
    }
}

/// Read-only view of a round (PyO3 wrapper).
#[pyclass(name = "Round")]
#[derive(Clone, Debug)]
pub struct PyRound {
    inner: Round,
}

#[pymethods]
impl PyRound {
    #[getter]
    fn index(&self) -> usize {
        self.inner.index()
    }

    #[getter]
    fn machines(&self) -> usize {
        self.inner.machines()
    }

    #[getter]
    fn is_final(&self) -> bool {
        self.inner.is_final()
    }

    #[getter]
    fn jobs_left(&self) -> usize {
        self.inner.jobs_left()
    }

    #[getter]
    fn placed_jobs(&self) -> usize {
        self.inner.placed_jobs()
    }

    #[getter]
    fn subrounds(&self) -> Vec<PySubround> {
        self.inner
            .subrounds()
            .iter()
            .map(|sub| PySubround { inner: sub.clone() })
            .collect()
    }

    fn __repr__(&self) -> String {
        format!(
            "Round(index={}, machines={}, subrounds={}, jobs_left={})",
            self.inner.index(),
            self.inner.machines(),
            self.inner.subrounds().len(),
            self.inner.jobs_left()
        )
    }
}

fn py_round(round: &Round) -> PyRound {
    PyRound {
        inner: round.clone(),
    }
}

/// Finished construction handed to reporting.
#[pyclass(name = "Construction")]
#[derive(Clone, Debug)]
pub struct PyConstruction {
    #[pyo3(get)]
    pub rounds: Vec<PyRound>,
    #[pyo3(get)]
    pub final_round: Option<PyRound>,
    #[pyo3(get)]
    pub final_machine_count: usize,
}

/// Interactive builder for the adversarial job sequence.
///
/// Wraps the round scheduler with the bundled branch-and-bound oracle. Sizes may be
/// passed as `str`, `int` or `fractions.Fraction`.
#[pyclass]
pub struct Adversary {
    scheduler: RoundScheduler<BranchAndBoundOracle, ThresholdPolicy>,
}

#[pymethods]
impl Adversary {
    #[new]
    fn new(config: AdversaryConfig) -> PyResult<Self> {
        let params = config.resolve().map_err(to_py_err)?;
        Ok(Self {
            scheduler: RoundScheduler::from_params(params),
        })
    }

    /// Ceiling a subround of `size` would get if added now.
    fn cutoff_value(&self, py: Python<'_>, size: &Bound<'_, PyAny>) -> PyResult<PyObject> {
        let size = extract_rational(size)?;
        let cutoff = self.scheduler.cutoff_value(&size).map_err(to_py_err)?;
        to_fraction(py, &cutoff)
    }

    /// Place exactly `multiplicity` jobs of `size`; False if they do not fit.
    fn place_subround(&mut self, size: &Bound<'_, PyAny>, multiplicity: usize) -> PyResult<bool> {
        let size = extract_rational(size)?;
        self.scheduler
            .place_subround(size, multiplicity)
            .map_err(to_py_err)
    }

    fn schedule_as_often_as_possible(&mut self, size: &Bound<'_, PyAny>) -> PyResult<usize> {
        let size = extract_rational(size)?;
        self.scheduler
            .schedule_as_often_as_possible(size)
            .map_err(to_py_err)
    }

    fn find_smallest_feasible_job_size(
        &mut self,
        py: Python<'_>,
        lower: &Bound<'_, PyAny>,
    ) -> PyResult<Option<PyObject>> {
        let lower = extract_rational(lower)?;
        match self
            .scheduler
            .find_smallest_feasible_job_size(lower)
            .map_err(to_py_err)?
        {
            Some(size) => Ok(Some(to_fraction(py, &size)?)),
            None => Ok(None),
        }
    }

    fn complete_round(&mut self, start_size: &Bound<'_, PyAny>) -> PyResult<PyRound> {
        let start_size = extract_rational(start_size)?;
        self.scheduler
            .complete_round(start_size)
            .map(py_round)
            .map_err(to_py_err)
    }

    fn build_final_subround(
        &mut self,
        size: &Bound<'_, PyAny>,
        multiplicity: usize,
    ) -> PyResult<Option<PyRound>> {
        let size = extract_rational(size)?;
        self.scheduler
            .build_final_subround(size, multiplicity)
            .map(|round| round.map(py_round))
            .map_err(to_py_err)
    }

    #[getter]
    fn current_round(&self) -> PyRound {
        py_round(self.scheduler.current_round())
    }

    #[getter]
    fn rounds(&self) -> Vec<PyRound> {
        self.scheduler.rounds().iter().map(py_round).collect()
    }

    /// Assign identifiers and return every non-empty round plus the final round.
    fn finish(&self) -> PyConstruction {
        let construction = self.scheduler.finish();
        PyConstruction {
            rounds: construction.rounds.iter().map(py_round).collect(),
            final_round: construction.final_round.as_ref().map(py_round),
            final_machine_count: construction.final_machine_count,
        }
    }

    fn __repr__(&self) -> String {
        let params = self.scheduler.params();
        format!(
            "Adversary(machines={}, competitive_ratio={}, jobs={}, round={})",
            params.machines,
            params.ratio,
            self.scheduler.ledger().len(),
            self.scheduler.current_round().index()
        )
    }
}

/// The lbsched.rust Python module.
#[pymodule]
fn rust(m: &Bound<'_, PyModule>) -> PyResult<()> {
    // Records
    m.add_class::<PySubround>()?;
    m.add_class::<PyRound>()?;
    m.add_class::<PyConstruction>()?;

    // Config types
    m.add_class::<AdversaryConfig>()?;

    // Search
    m.add_class::<Adversary>()?;

    Ok(())
}
