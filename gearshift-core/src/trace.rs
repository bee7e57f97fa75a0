//! Module containing the driving-trace data model and the per-sample
//! classification shared by the trace scaler and the gear solver.

use crate::imports::*;
use crate::params::{KMH_PER_MPS, ROTATING_MASS_FACTOR, STANDSTILL_SPEED};
use crate::vehicle::VehicleProfile;

/// Scaling window of a trace phase: the accelerating segment
/// `[start, correction)` is compressed by the downscale factor and the
/// segment `(correction, end]` absorbs the distance correction.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScaleWindow {
    pub start: usize,
    pub correction: usize,
    pub end: usize,
}

/// Named part of a trace (e.g. low/medium/high/extra-high) spanning samples
/// `[start, end)`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Phase {
    pub name: String,
    pub start: usize,
    pub end: usize,
    /// declared scaling window; when absent the scaler uses the phase bounds
    /// with the correction point at the phase's speed peak
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale_window: Option<ScaleWindow>,
}

impl Phase {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }
}

/// Reference speed trace sampled at 1 Hz, partitioned into named phases.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ReferenceTrace {
    /// sample times \[s\], strictly increasing with one-second spacing
    pub time: Array1<f64>,
    /// target vehicle speed \[km/h\]
    pub speed: Array1<f64>,
    /// named phases covering the trace contiguously
    pub phases: Vec<Phase>,
}

impl SerdeAPI for ReferenceTrace {}

impl ReferenceTrace {
    pub fn new(time: Array1<f64>, speed: Array1<f64>, phases: Vec<Phase>) -> CoreResult<Self> {
        let trace = Self {
            time,
            speed,
            phases,
        };
        trace.validate()?;
        Ok(trace)
    }

    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    pub fn validate(&self) -> CoreResult<()> {
        if self.time.len() != self.speed.len() {
            return Err(CoreError::Data(format!(
                "trace has {} time samples but {} speed samples",
                self.time.len(),
                self.speed.len()
            )));
        }
        if self.len() < 2 {
            return Err(CoreError::Data(
                "trace needs at least 2 samples".to_string(),
            ));
        }
        for i in 1..self.len() {
            let dt = self.time[i] - self.time[i - 1];
            if (dt - 1.0).abs() > 1e-9 {
                return Err(CoreError::Data(format!(
                    "trace times must be strictly increasing with 1 s spacing, got dt = {dt} at sample {i}"
                )));
            }
        }
        if self.speed.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(CoreError::Data(
                "trace speeds must be finite and non-negative".to_string(),
            ));
        }
        if self.phases.is_empty() {
            return Err(CoreError::Data("trace declares no phases".to_string()));
        }
        let mut expected_start = 0;
        for phase in &self.phases {
            if phase.start != expected_start || phase.end <= phase.start {
                return Err(CoreError::Data(format!(
                    "phase `{}` bounds [{}, {}) do not tile the trace",
                    phase.name, phase.start, phase.end
                )));
            }
            if let Some(w) = &phase.scale_window {
                if w.start < phase.start
                    || w.end >= phase.end
                    || w.correction <= w.start
                    || w.end <= w.correction
                {
                    return Err(CoreError::Data(format!(
                        "phase `{}` scaling window ({}, {}, {}) is inconsistent",
                        phase.name, w.start, w.correction, w.end
                    )));
                }
            }
            expected_start = phase.end;
        }
        if expected_start != self.len() {
            return Err(CoreError::Data(format!(
                "phases cover {} samples but the trace has {}",
                expected_start,
                self.len()
            )));
        }
        Ok(())
    }
}

/// Trace after per-phase downscaling; same length and phase structure as the
/// input [`ReferenceTrace`].
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ScaledTrace {
    pub time: Array1<f64>,
    /// downscaled vehicle speed \[km/h\]
    pub speed: Array1<f64>,
    pub phases: Vec<Phase>,
    /// downscale factor applied per phase (0 = untouched)
    pub downscale_factors: Vec<f64>,
    /// achieved relative distance reduction per phase
    pub distance_adjustments: Vec<f64>,
    /// samples whose speed differs from the reference
    pub downscaled: Vec<bool>,
}

impl SerdeAPI for ScaledTrace {}

impl ScaledTrace {
    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }
}

/// Per-sample driving condition, derived from the speed profile alone.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum DrivePhase {
    Standstill,
    Acceleration,
    /// acceleration phase that follows a standstill phase
    AccelerationFromStandstill,
    Deceleration,
    /// deceleration phase that precedes a standstill phase
    DecelerationToStandstill,
    ConstantSpeed,
}

impl DrivePhase {
    pub fn is_standstill(&self) -> bool {
        matches!(self, DrivePhase::Standstill)
    }

    pub fn is_acceleration(&self) -> bool {
        matches!(
            self,
            DrivePhase::Acceleration | DrivePhase::AccelerationFromStandstill
        )
    }

    pub fn is_deceleration(&self) -> bool {
        matches!(
            self,
            DrivePhase::Deceleration | DrivePhase::DecelerationToStandstill
        )
    }
}

/// Classify every sample of a speed profile.
///
/// A sample below the standstill threshold is standstill; otherwise its
/// condition is taken from the upcoming speed change. Whole runs are then
/// refined: an acceleration run leaving a standstill run becomes
/// "acceleration from standstill", a deceleration run entering one becomes
/// "deceleration to standstill".
pub fn classify_drive_phases(speed: &Array1<f64>) -> Vec<DrivePhase> {
    const EPS: f64 = 1e-6;
    let n = speed.len();
    let mut phases = Vec::with_capacity(n);
    for i in 0..n {
        let phase = if speed[i] < STANDSTILL_SPEED {
            DrivePhase::Standstill
        } else {
            let dv = if i + 1 < n {
                speed[i + 1] - speed[i]
            } else {
                0.0
            };
            if dv > EPS {
                DrivePhase::Acceleration
            } else if dv < -EPS {
                DrivePhase::Deceleration
            } else {
                DrivePhase::ConstantSpeed
            }
        };
        phases.push(phase);
    }

    // refine whole runs based on the neighbouring run
    let mut i = 0;
    while i < n {
        let mut j = i;
        while j + 1 < n && phases[j + 1] == phases[i] {
            j += 1;
        }
        match phases[i] {
            DrivePhase::Acceleration if i > 0 && phases[i - 1].is_standstill() => {
                for p in phases.iter_mut().take(j + 1).skip(i) {
                    *p = DrivePhase::AccelerationFromStandstill;
                }
            }
            DrivePhase::Deceleration if j + 1 < n && phases[j + 1].is_standstill() => {
                for p in phases.iter_mut().take(j + 1).skip(i) {
                    *p = DrivePhase::DecelerationToStandstill;
                }
            }
            _ => {}
        }
        i = j + 1;
    }
    phases
}

/// Per-sample accelerations \[m/s^2\] from a km/h speed profile; the last
/// sample gets 0.
pub fn accelerations(time: &Array1<f64>, speed: &Array1<f64>) -> Array1<f64> {
    let n = speed.len();
    let mut acc = Array1::zeros(n);
    for i in 0..n - 1 {
        acc[i] = utils::round4((speed[i + 1] - speed[i]) / (KMH_PER_MPS * (time[i + 1] - time[i])));
    }
    acc
}

/// Power \[kW\] required to follow the speed profile: road load plus the
/// inertial term scaled for rotating masses.
pub fn required_powers(
    speed: &Array1<f64>,
    accelerations: &Array1<f64>,
    veh: &VehicleProfile,
) -> Array1<f64> {
    let mut powers = Array1::zeros(speed.len());
    for i in 0..speed.len() {
        let v = speed[i];
        let road_load = veh.f0 * v + veh.f1 * v.powi(2) + veh.f2 * v.powi(3);
        let inertia = ROTATING_MASS_FACTOR * accelerations[i] * v * veh.test_mass;
        powers[i] = utils::round4((road_load + inertia) / 3600.0);
    }
    powers
}

/// Distance \[m\] covered over samples `[start, end)` of a km/h profile at
/// 1 Hz.
pub fn distance(speed: &Array1<f64>, start: usize, end: usize) -> f64 {
    speed.slice(s![start..end]).sum() / KMH_PER_MPS
}
