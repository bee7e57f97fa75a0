//! Module containing the vehicle data model consumed by the calculation.

use crate::imports::*;

/// Full-load power curve of the engine: ordered samples of
/// (engine speed \[1/min\], maximum power \[kW\]).
///
/// Engine speeds must be strictly increasing and powers non-negative;
/// [`FullLoadCurve::validate`] enforces this before the curve is ever
/// interpolated.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct FullLoadCurve {
    /// engine speed samples \[1/min\]
    pub engine_speeds: Vec<f64>,
    /// maximum power at each engine speed sample \[kW\]
    pub powers: Vec<f64>,
}

impl SerdeAPI for FullLoadCurve {}

impl FullLoadCurve {
    pub fn new(engine_speeds: Vec<f64>, powers: Vec<f64>) -> CoreResult<Self> {
        let curve = Self {
            engine_speeds,
            powers,
        };
        curve.validate()?;
        Ok(curve)
    }

    pub fn len(&self) -> usize {
        self.engine_speeds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.engine_speeds.is_empty()
    }

    pub fn validate(&self) -> CoreResult<()> {
        if self.engine_speeds.len() != self.powers.len() {
            return Err(CoreError::Data(format!(
                "full load curve has {} engine speeds but {} powers",
                self.engine_speeds.len(),
                self.powers.len()
            )));
        }
        if self.len() < 2 {
            return Err(CoreError::Data(
                "full load curve needs at least 2 samples".to_string(),
            ));
        }
        for w in self.engine_speeds.windows(2) {
            if w[1] <= w[0] {
                return Err(CoreError::Data(format!(
                    "full load curve engine speeds not strictly increasing at {} -> {}",
                    w[0], w[1]
                )));
            }
        }
        if let Some(p) = self.powers.iter().find(|p| !p.is_finite() || **p < 0.0) {
            return Err(CoreError::Data(format!(
                "full load curve power {p} is negative or not finite"
            )));
        }
        Ok(())
    }
}

/// Struct containing vehicle attributes. Immutable once loaded; one
/// instance per case.
///
/// Road load follows the coast-down representation
/// `F(v) = f0 + f1*v + f2*v^2` with `v` in km/h, which carries the rolling,
/// speed-proportional and aerodynamic resistance terms.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct VehicleProfile {
    /// Vehicle name
    #[serde(default)]
    pub name: String,
    /// rated engine power \[kW\]; 0 means "derive from the power curve"
    #[serde(default)]
    pub rated_power: f64,
    /// engine speed at rated power \[1/min\]; 0 means "derive from the power curve"
    #[serde(default)]
    pub rated_engine_speed: f64,
    /// idling engine speed \[1/min\]
    pub idle_engine_speed: f64,
    /// test mass of the vehicle \[kg\]
    pub test_mass: f64,
    /// road load coefficient f0 \[N\]
    pub f0: f64,
    /// road load coefficient f1 \[N/(km/h)\]
    pub f1: f64,
    /// road load coefficient f2 \[N/(km/h)^2\]
    pub f2: f64,
    /// gearbox ratio per forward gear, index 0 = 1st gear
    pub gear_ratios: Vec<f64>,
    /// final drive (axle) ratio
    pub final_drive_ratio: f64,
    /// dynamic wheel radius \[m\]
    pub wheel_radius: f64,
    /// full load power curve, owned by the profile
    pub full_load_curve: FullLoadCurve,
}

impl SerdeAPI for VehicleProfile {}

impl VehicleProfile {
    /// Number of forward gears.
    pub fn n_gears(&self) -> usize {
        self.gear_ratios.len()
    }

    pub fn validate(&self) -> CoreResult<()> {
        self.full_load_curve.validate()?;
        if self.gear_ratios.is_empty() {
            return Err(CoreError::Data("vehicle has no gears".to_string()));
        }
        if self.gear_ratios.iter().any(|r| *r <= 0.0) {
            return Err(CoreError::Data(
                "gearbox ratios must be positive".to_string(),
            ));
        }
        if self.final_drive_ratio <= 0.0 || self.wheel_radius <= 0.0 {
            return Err(CoreError::Data(
                "final drive ratio and wheel radius must be positive".to_string(),
            ));
        }
        if self.test_mass <= 0.0 {
            return Err(CoreError::Data("test mass must be positive".to_string()));
        }
        if self.idle_engine_speed <= 0.0 {
            return Err(CoreError::Data(
                "idling engine speed must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
