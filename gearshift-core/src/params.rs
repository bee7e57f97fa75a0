//! Module containing configuration records and regulation constants.

use crate::imports::*;

/// Conversion from km/h to m/s.
pub const KMH_PER_MPS: f64 = 3.6;
/// Factor applied to the inertial term of the required power to account for
/// rotating masses.
pub const ROTATING_MASS_FACTOR: f64 = 1.03;
/// Vehicle speeds below this value \[km/h\] count as standstill.
pub const STANDSTILL_SPEED: f64 = 1.0;
/// Downscale factors at or below this value are snapped to zero.
pub const MIN_DOWNSCALE_FACTOR: f64 = 0.01;

/// Coefficients of the regulation's downscale-factor line
/// `f_dsc = a1 * r_max + b1` applied when `r_max >= r0`.
///
/// The numeric values are fixed per cycle class by the regulation and are
/// supplied by the loader together with the trace; they are deliberately not
/// defaulted here.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct DownscaleCoeffs {
    /// required-to-rated power ratio threshold below which no downscaling occurs
    pub r0: f64,
    /// slope of the downscale-factor line
    pub a1: f64,
    /// intercept of the downscale-factor line
    pub b1: f64,
    /// master switch; when false the trace is passed through unchanged while
    /// the factors are still reported
    pub apply_downscaling: bool,
}

impl SerdeAPI for DownscaleCoeffs {}

/// Per-case options recognized by the calculation core.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CaseConfig {
    /// skip gear-0 insertion during large downshifts and use the lower
    /// target gear directly; the authorization is recorded in the
    /// diagnostics
    pub downshift_direct_use: bool,
    /// minimum duration of a gear engagement \[s\]
    pub min_gear_duration: usize,
    /// number of downshift steps within one sample transition above which
    /// gear 0 is inserted
    pub downshift_limit: usize,
    /// safety margin between required and available power used for gear
    /// eligibility, as a fraction of full-load power
    pub availability_margin: f64,
    /// downscale-factor coefficients for the trace scaler
    pub downscale: Option<DownscaleCoeffs>,
}

impl SerdeAPI for CaseConfig {}

impl Default for CaseConfig {
    fn default() -> Self {
        Self {
            downshift_direct_use: false,
            min_gear_duration: 2,
            downshift_limit: 3,
            availability_margin: 0.10,
            downscale: None,
        }
    }
}
