//! Module containing the interpolated full-load power model and the derived
//! engine-speed ratios per gear.

use crate::imports::*;
use crate::params::KMH_PER_MPS;
use crate::vehicle::VehicleProfile;

/// Continuous view of a vehicle's full-load curve plus the n/v ratios that
/// convert vehicle speed to engine speed per gear.
///
/// Built once per case and read by every pipeline stage; never mutated after
/// construction.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PowerCurve {
    engine_speeds: Vec<f64>,
    powers: Vec<f64>,
    /// engine speed per vehicle speed \[1/min per km/h\], index 0 = 1st gear
    ndv: Vec<f64>,
    idle_engine_speed: f64,
    rated_power: f64,
    rated_engine_speed: f64,
    max95_engine_speed: f64,
}

impl SerdeAPI for PowerCurve {}

impl PowerCurve {
    pub fn new(veh: &VehicleProfile) -> CoreResult<Self> {
        veh.validate()?;
        let curve = &veh.full_load_curve;

        // n/v: engine revolutions per minute per km/h of vehicle speed
        let wheel_circumference = 2.0 * std::f64::consts::PI * veh.wheel_radius;
        let ndv = veh
            .gear_ratios
            .iter()
            .map(|g| 60.0 * g * veh.final_drive_ratio / (KMH_PER_MPS * wheel_circumference))
            .collect();

        // rated point defaults to the curve maximum when not supplied
        let (rated_power, rated_engine_speed) =
            if veh.rated_power > 0.0 && veh.rated_engine_speed > 0.0 {
                (veh.rated_power, veh.rated_engine_speed)
            } else {
                let p_max = utils::arrmax(&curve.powers);
                let idx = curve.powers.iter().position(|p| *p == p_max).unwrap();
                (p_max, curve.engine_speeds[idx])
            };

        let max95_engine_speed = max95_engine_speed(curve.engine_speeds.as_slice(), curve.powers.as_slice(), rated_power)?;

        Ok(Self {
            engine_speeds: curve.engine_speeds.clone(),
            powers: curve.powers.clone(),
            ndv,
            idle_engine_speed: veh.idle_engine_speed,
            rated_power,
            rated_engine_speed,
            max95_engine_speed,
        })
    }

    pub fn n_gears(&self) -> usize {
        self.ndv.len()
    }

    /// Engine speed per vehicle speed for `gear` (1-based).
    pub fn ndv(&self, gear: usize) -> f64 {
        self.ndv[gear - 1]
    }

    pub fn idle_engine_speed(&self) -> f64 {
        self.idle_engine_speed
    }

    pub fn rated_power(&self) -> f64 {
        self.rated_power
    }

    pub fn rated_engine_speed(&self) -> f64 {
        self.rated_engine_speed
    }

    /// Highest engine speed at which at least 95 % of rated power is
    /// available, taken from the descending flank of the curve.
    pub fn max95_engine_speed(&self) -> f64 {
        self.max95_engine_speed
    }

    /// Lowest engine speed covered by the curve.
    pub fn min_curve_speed(&self) -> f64 {
        self.engine_speeds[0]
    }

    /// Interpolated full-load power \[kW\] at engine speed `n` \[1/min\].
    /// Piecewise linear between samples, so values never overshoot the
    /// surrounding curve points. Fails outside the sampled range.
    pub fn power_at(&self, n: f64) -> CoreResult<f64> {
        let min = self.engine_speeds[0];
        let max = *self.engine_speeds.last().unwrap();
        if n < min || n > max {
            return Err(CoreError::Domain { value: n, min, max });
        }
        Ok(utils::interpolate(
            n,
            &self.engine_speeds,
            &self.powers,
            false,
        ))
    }

    /// Full-load power reduced by the availability margin, evaluated for
    /// gear-eligibility checks.
    ///
    /// Engine speeds below the curve start are clamped up to it (launch and
    /// low-gear samples sit below the dynamometer's first sample); speeds
    /// above the curve end extend the last segment linearly. The solver's
    /// engine-speed bounds keep such excursions small.
    pub fn available_power_at(&self, n: f64, margin: f64) -> f64 {
        let n = n.max(self.engine_speeds[0]);
        utils::interpolate(n, &self.engine_speeds, &self.powers, true) * (1.0 - margin)
    }
}

fn max95_engine_speed(engine_speeds: &[f64], powers: &[f64], rated_power: f64) -> CoreResult<f64> {
    let p95 = 0.95 * rated_power;
    if *powers.last().unwrap() >= p95 {
        return Ok(*engine_speeds.last().unwrap());
    }
    // last downward crossing of the 95 % level
    let idx = (0..powers.len() - 1)
        .rev()
        .find(|&i| powers[i] >= p95 && powers[i + 1] < p95)
        .ok_or_else(|| {
            CoreError::Data(
                "95 % rated power level cannot be located on the full load curve".to_string(),
            )
        })?;
    Ok(engine_speeds[idx]
        + (p95 - powers[idx]) / (powers[idx + 1] - powers[idx])
            * (engine_speeds[idx + 1] - engine_speeds[idx]))
}
