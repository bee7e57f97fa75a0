//! Module containing the case record and the run-level scheduler that
//! evaluates independent cases, in parallel, with per-case failure
//! isolation.

use rayon::prelude::*;

use crate::corrections::{CorrectionPipeline, PassContext};
use crate::imports::*;
use crate::params::CaseConfig;
use crate::power_curve::PowerCurve;
use crate::scale::downscale_trace;
use crate::solution::{assemble_solution, Diagnostics, Solution};
use crate::solver::{ShiftPointSolver, SolverOutput};
use crate::trace::ReferenceTrace;
use crate::vehicle::VehicleProfile;

/// One vehicle + trace + configuration run through the pipeline, producing
/// one [`Solution`].
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Case {
    pub name: String,
    pub vehicle: VehicleProfile,
    pub trace: ReferenceTrace,
    #[serde(default)]
    pub config: CaseConfig,
}

impl SerdeAPI for Case {}

/// Result record of one case within a run.
#[derive(Debug)]
pub struct CaseOutcome {
    pub name: String,
    pub result: CoreResult<Solution>,
}

/// Run one case through the fixed pipeline: curve model, trace scaler,
/// shift-point solver, correction passes, solution assembly.
pub fn run_case(case: &Case) -> CoreResult<Solution> {
    case.vehicle.validate()?;
    case.trace.validate()?;

    let curve = PowerCurve::new(&case.vehicle)?;
    let scaled = downscale_trace(
        &case.trace,
        &case.vehicle,
        curve.rated_power(),
        case.config.downscale.as_ref(),
    )?;

    let SolverOutput {
        mut gears,
        power_insufficient,
        drive_phases,
    } = ShiftPointSolver::new(&curve, &case.vehicle, &case.config).solve(&scaled);

    let mut diagnostics = Diagnostics {
        power_insufficient,
        ..Default::default()
    };
    let pipeline = CorrectionPipeline::standard()?;
    let mut cx = PassContext {
        drive_phases: &drive_phases,
        config: &case.config,
        diagnostics: &mut diagnostics,
    };
    pipeline.run(&mut gears, &mut cx);

    Ok(assemble_solution(
        &case.name,
        &scaled,
        gears,
        &curve,
        &case.config,
        diagnostics,
    ))
}

/// Evaluate all cases; they are independent, so they run in parallel. A
/// failed case yields an error record without aborting the others.
pub fn run_cases(cases: &[Case]) -> Vec<CaseOutcome> {
    cases
        .par_iter()
        .map(|case| {
            let result = run_case(case);
            if let Err(err) = &result {
                log::warn!("case `{}` failed: {err}", case.name);
            }
            CaseOutcome {
                name: case.name.clone(),
                result,
            }
        })
        .collect()
}
