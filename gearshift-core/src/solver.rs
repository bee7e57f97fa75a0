//! Module containing the shift-point solver: the per-sample gear decision
//! state machine that turns a scaled trace into a raw gear sequence.

use std::collections::VecDeque;

use crate::imports::*;
use crate::params::CaseConfig;
use crate::power_curve::PowerCurve;
use crate::trace::{self, classify_drive_phases, DrivePhase, ScaledTrace};
use crate::vehicle::VehicleProfile;

/// Gear engaged per trace sample; 0 means clutch disengaged / neutral.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct GearSequence(pub Vec<usize>);

impl SerdeAPI for GearSequence {}

impl GearSequence {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.0
    }
}

/// One gear considered at one sample: the engine speed it would demand and
/// the full-load power available there. Recomputed per sample, never stored.
#[derive(Clone, Copy, Debug)]
pub struct GearCandidate {
    pub gear: usize,
    pub engine_speed: f64,
    pub available_power: f64,
}

/// Raw solver result: one gear per sample plus the samples where no gear
/// could deliver the required power.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct SolverOutput {
    pub gears: GearSequence,
    /// sample indices flagged as power-insufficient (non-fatal)
    pub power_insufficient: Vec<usize>,
    /// per-sample driving condition, reused by the correction passes
    pub drive_phases: Vec<DrivePhase>,
}

/// Acceleration sign at the current sample, taken from the rolling history
/// of required speeds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum AccelSign {
    /// accelerating or holding speed
    NonNegative,
    /// decelerating
    Negative,
}

/// Relation of the previous sample's gear to the current eligible set.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PrevGearRelation {
    /// no engaged gear in the previous sample
    None,
    /// the previous gear is itself eligible
    Eligible,
    /// the previous gear is not eligible but eligible gears exist below it
    Above,
    /// all eligible gears are above the previous gear
    Below,
}

/// Rolling per-sample state carried across the trace.
struct SolverState {
    prev_gear: usize,
    /// most recent required speeds \[km/h\], newest last
    recent_speeds: VecDeque<f64>,
}

impl SolverState {
    const HISTORY: usize = 3;

    fn new() -> Self {
        Self {
            prev_gear: 0,
            recent_speeds: VecDeque::with_capacity(Self::HISTORY),
        }
    }

    fn accel_sign(&self, speed: f64) -> AccelSign {
        match self.recent_speeds.back() {
            Some(prev) if speed < prev - 1e-6 => AccelSign::Negative,
            _ => AccelSign::NonNegative,
        }
    }

    fn record(&mut self, gear: usize, speed: f64) {
        self.prev_gear = gear;
        if self.recent_speeds.len() == Self::HISTORY {
            self.recent_speeds.pop_front();
        }
        self.recent_speeds.push_back(speed);
    }
}

pub struct ShiftPointSolver<'a> {
    curve: &'a PowerCurve,
    veh: &'a VehicleProfile,
    config: &'a CaseConfig,
}

impl<'a> ShiftPointSolver<'a> {
    pub fn new(curve: &'a PowerCurve, veh: &'a VehicleProfile, config: &'a CaseConfig) -> Self {
        Self { curve, veh, config }
    }

    /// Assign a gear to every sample of the scaled trace.
    ///
    /// Failure to find an eligible gear at a sample is non-fatal: the sample
    /// falls back to the lowest gear valid by engine speed and is flagged.
    pub fn solve(&self, scaled: &ScaledTrace) -> SolverOutput {
        let n = scaled.len();
        let drive_phases = classify_drive_phases(&scaled.speed);
        let accel = trace::accelerations(&scaled.time, &scaled.speed);
        let required = trace::required_powers(&scaled.speed, &accel, self.veh);

        let mut gears = Vec::with_capacity(n);
        let mut power_insufficient = Vec::new();
        let mut state = SolverState::new();

        for t in 0..n {
            let v = scaled.speed[t];
            if drive_phases[t].is_standstill() {
                gears.push(0);
                state.record(0, v);
                continue;
            }

            let candidates = self.candidates(v, drive_phases[t]);
            let eligible = self.power_eligible_gears(&candidates, required[t]);

            let gear = if eligible.is_empty() {
                let fallback = candidates.first().map(|c| c.gear).unwrap_or(1);
                log::warn!(
                    "sample {t}: no gear delivers {:.3} kW at {v:.1} km/h, falling back to gear {fallback}",
                    required[t]
                );
                power_insufficient.push(t);
                fallback
            } else {
                self.choose(&eligible, state.accel_sign(v), state.prev_gear)
            };

            gears.push(gear);
            state.record(gear, v);
        }

        SolverOutput {
            gears: GearSequence(gears),
            power_insufficient,
            drive_phases,
        }
    }

    /// Candidates whose required engine speed lies inside the allowed
    /// window at this sample, ascending by gear.
    fn candidates(&self, v: f64, phase: DrivePhase) -> Vec<GearCandidate> {
        let mut valid = Vec::new();
        for gear in 1..=self.curve.n_gears() {
            let n = v * self.curve.ndv(gear);
            if n > self.curve.max95_engine_speed() {
                continue;
            }
            // 1st gear stays usable below its bound: the clutch slips when
            // pulling away
            if gear > 1 && n < self.min_drive(gear, phase) {
                continue;
            }
            valid.push(GearCandidate {
                gear,
                engine_speed: n,
                available_power: self
                    .curve
                    .available_power_at(n, self.config.availability_margin),
            });
        }
        valid
    }

    /// Minimum drivable engine speed for `gear` \[1/min\].
    fn min_drive(&self, gear: usize, phase: DrivePhase) -> f64 {
        let idle = self.curve.idle_engine_speed();
        match gear {
            1 => idle.round(),
            2 => {
                if phase == DrivePhase::DecelerationToStandstill {
                    idle.round()
                } else {
                    (0.9 * idle).round()
                }
            }
            _ => (idle + 0.125 * (self.curve.rated_engine_speed() - idle)).round(),
        }
    }

    /// Filter candidates by the power balance. The two lowest gears are
    /// exempt: at launch speeds the full-load curve is not meaningful and
    /// the regulation checks power only from 3rd gear up.
    fn power_eligible_gears(&self, candidates: &[GearCandidate], required: f64) -> Vec<usize> {
        candidates
            .iter()
            .filter(|c| c.gear <= 2 || c.available_power >= required)
            .map(|c| c.gear)
            .collect()
    }

    /// The gear decision table keyed by acceleration sign and the relation
    /// of the previous gear to the eligible set.
    fn choose(&self, eligible: &[usize], sign: AccelSign, prev_gear: usize) -> usize {
        let relation = if prev_gear == 0 {
            PrevGearRelation::None
        } else if eligible.contains(&prev_gear) {
            PrevGearRelation::Eligible
        } else if eligible.iter().any(|&g| g < prev_gear) {
            PrevGearRelation::Above
        } else {
            PrevGearRelation::Below
        };

        match (sign, relation) {
            // pulling away or holding speed: lowest eligible gear keeps the
            // largest power reserve
            (AccelSign::NonNegative, _) | (AccelSign::Negative, PrevGearRelation::None) => {
                eligible[0]
            }
            // decelerating: stay on the engaged gear while it remains
            // eligible to keep the engine speed continuous
            (AccelSign::Negative, PrevGearRelation::Eligible) => prev_gear,
            // otherwise the smallest downshift wins
            (AccelSign::Negative, PrevGearRelation::Above) => eligible
                .iter()
                .copied()
                .filter(|&g| g < prev_gear)
                .max()
                .unwrap(),
            (AccelSign::Negative, PrevGearRelation::Below) => eligible[0],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::power_curve::tests::mock_vehicle;
    use crate::scale::downscale_trace;
    use crate::trace::{Phase, ReferenceTrace};
    use crate::vehicle::FullLoadCurve;

    fn solve_speeds(veh: &VehicleProfile, speed: Array1<f64>) -> SolverOutput {
        let n = speed.len();
        let trace = ReferenceTrace::new(
            Array1::range(0.0, n as f64, 1.0),
            speed,
            vec![Phase {
                name: "total".to_string(),
                start: 0,
                end: n,
                scale_window: None,
            }],
        )
        .unwrap();
        let config = CaseConfig::default();
        let curve = PowerCurve::new(veh).unwrap();
        let scaled = downscale_trace(&trace, veh, curve.rated_power(), None).unwrap();
        ShiftPointSolver::new(&curve, veh, &config).solve(&scaled)
    }

    #[test]
    fn test_constant_speed_is_stable() {
        let veh = mock_vehicle();
        let out = solve_speeds(&veh, Array1::from_elem(100, 50.0));
        // 1st gear would over-rev at 50 km/h; 2nd is the lowest eligible
        assert!(out.gears.as_slice().iter().all(|&g| g == 2));
        assert!(out.power_insufficient.is_empty());
    }

    #[test]
    fn test_standstill_is_neutral() {
        let veh = mock_vehicle();
        let out = solve_speeds(&veh, array![0.0, 0.0, 0.5, 0.0]);
        assert_eq!(out.gears.as_slice(), &[0, 0, 0, 0]);
    }

    #[test]
    fn test_launch_uses_first_gear() {
        let veh = mock_vehicle();
        let out = solve_speeds(&veh, array![0.0, 5.0, 10.0, 15.0, 20.0, 25.0]);
        // below the 2nd-gear minimum engine speed only 1st is valid
        assert_eq!(out.gears.as_slice()[1], 1);
        assert!(out.power_insufficient.is_empty());
    }

    #[test]
    fn test_deceleration_keeps_engaged_gear() {
        let veh = mock_vehicle();
        // decelerate from 50 km/h; 1st gear becomes eligible on the way
        // down but the engaged 2nd gear must be kept (no flutter)
        let speed = array![50.0, 46.0, 42.0, 38.0, 34.0, 30.0, 26.0, 22.0];
        let out = solve_speeds(&veh, speed);
        assert!(out.gears.as_slice().iter().all(|&g| g == 2));
    }

    #[test]
    fn test_power_insufficient_flags_and_falls_back() {
        let mut veh = mock_vehicle();
        // a 10x weaker engine cannot hold 120 km/h in any gear
        veh.full_load_curve = FullLoadCurve::new(
            vec![1000.0, 2000.0, 3000.0, 4000.0, 5000.0, 6000.0],
            vec![2.0, 5.0, 8.0, 10.0, 11.0, 10.0],
        )
        .unwrap();
        let out = solve_speeds(&veh, Array1::from_elem(10, 120.0));
        assert!(!out.power_insufficient.is_empty());
        // run continues with the lowest speed-valid gear
        assert!(out.gears.as_slice().iter().all(|&g| g >= 1));
    }
}
