//! Module containing the per-case result table and the diagnostic records
//! accumulated along the pipeline.

use crate::imports::*;
use crate::params::CaseConfig;
use crate::power_curve::PowerCurve;
use crate::solver::GearSequence;
use crate::trace::ScaledTrace;

/// Gear 0 was inserted at a sample to bridge a large downshift.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Gear0Insertion {
    pub sample: usize,
    pub from_gear: usize,
    pub to_gear: usize,
}

/// A large downshift used the lower target gear directly, as authorized by
/// configuration.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DirectDownshift {
    pub sample: usize,
    pub from_gear: usize,
    pub to_gear: usize,
}

/// One correction pass ran and changed this many samples.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PassAudit {
    pub pass: String,
    pub samples_changed: usize,
}

/// Per-case diagnostic list: non-fatal warnings and the correction audit
/// trail.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Diagnostics {
    /// samples where no gear could deliver the required power
    pub power_insufficient: Vec<usize>,
    pub gear0_insertions: Vec<Gear0Insertion>,
    pub direct_downshifts: Vec<DirectDownshift>,
    pub pass_audits: Vec<PassAudit>,
}

impl SerdeAPI for Diagnostics {}

/// Final per-case result table; immutable once produced.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Solution {
    /// case name
    pub name: String,
    /// sample times \[s\]
    pub time: Array1<f64>,
    /// required vehicle speed \[km/h\]
    pub required_vehicle_speed: Array1<f64>,
    /// gear per sample, 0 = clutch disengaged
    pub gears: Vec<usize>,
    /// required engine speed \[1/min\]; idle where the clutch is disengaged
    pub required_engine_speed: Array1<f64>,
    /// available power \[kW\]; 0 where the clutch is disengaged
    pub available_power: Array1<f64>,
    pub diagnostics: Diagnostics,
}

impl SerdeAPI for Solution {}

/// Project the corrected gear sequence into the final result table.
///
/// Pure recomputation, no eligibility logic: gear 0 reports idle engine
/// speed (no engine-speed constraint while the clutch is disengaged) and
/// zero available power.
pub fn assemble_solution(
    name: &str,
    scaled: &ScaledTrace,
    gears: GearSequence,
    curve: &PowerCurve,
    config: &CaseConfig,
    diagnostics: Diagnostics,
) -> Solution {
    let n = scaled.len();
    let mut engine_speed = Array1::zeros(n);
    let mut available_power = Array1::zeros(n);

    for t in 0..n {
        match gears.0[t] {
            0 => {
                engine_speed[t] = curve.idle_engine_speed();
                available_power[t] = 0.0;
            }
            gear => {
                let v = scaled.speed[t];
                let required = (v * curve.ndv(gear)).max(curve.idle_engine_speed());
                engine_speed[t] = utils::round4(required);
                available_power[t] = utils::round4(
                    curve.available_power_at(required, config.availability_margin),
                );
            }
        }
    }

    Solution {
        name: name.to_string(),
        time: scaled.time.clone(),
        required_vehicle_speed: scaled.speed.clone(),
        gears: gears.0,
        required_engine_speed: engine_speed,
        available_power,
        diagnostics,
    }
}
