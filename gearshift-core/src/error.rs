//! Module containing the typed error kinds of the calculation core.
//!
//! Fatal errors abort only the affected case; the run-level scheduler in
//! [`crate::runner`] collects an error record per failed case and keeps going.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    /// Malformed input record (non-monotone curve or trace, inconsistent
    /// phase bounds, non-physical vehicle parameters).
    #[error("invalid input data: {0}")]
    Data(String),

    /// A power curve was evaluated outside the engine-speed range covered by
    /// its samples.
    #[error("engine speed {value:.1} 1/min outside power curve domain [{min:.1}, {max:.1}]")]
    Domain { value: f64, min: f64, max: f64 },

    /// The vehicle cannot realize the reference trace even after
    /// downscaling; the rebuilt speed profile would drop below zero.
    #[error("downscaling infeasible in phase `{phase}`: speed would drop below zero at sample {index}")]
    InfeasibleScaling { phase: String, index: usize },

    /// A correction pass was scheduled before one of its declared
    /// prerequisites. Indicates a programming defect, caught at pipeline
    /// construction before any case executes.
    #[error("correction pass `{pass}` requires `{missing}` to run first")]
    OrderingViolation {
        pass: &'static str,
        missing: &'static str,
    },
}

pub type CoreResult<T> = Result<T, CoreError>;
