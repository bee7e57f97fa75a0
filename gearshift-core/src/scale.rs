//! Module containing the trace scaler: per-phase downscaling of the
//! reference trace to the vehicle's power envelope.

use crate::imports::*;
use crate::params::{DownscaleCoeffs, KMH_PER_MPS, MIN_DOWNSCALE_FACTOR};
use crate::trace::{self, Phase, ReferenceTrace, ScaleWindow, ScaledTrace};
use crate::vehicle::VehicleProfile;

/// Downscale the reference trace phase by phase.
///
/// For each phase the maximum required-to-rated power ratio inside its
/// scaling window sets the downscale factor `f_dsc = a1 * r_max + b1`
/// (zero below the threshold `r0`). The accelerating segment of the window
/// is rebuilt with accelerations reduced by `(1 - f_dsc)`; the decelerating
/// segment is rebuilt with a correction factor chosen so that the speed
/// profile rejoins the reference exactly at the window end, which
/// redistributes the distance deficit across the phase instead of cutting
/// speed uniformly.
///
/// With `coeffs` absent (or `apply_downscaling` unset) the trace passes
/// through unchanged while the factors are still computed and reported.
pub fn downscale_trace(
    trace: &ReferenceTrace,
    veh: &VehicleProfile,
    rated_power: f64,
    coeffs: Option<&DownscaleCoeffs>,
) -> CoreResult<ScaledTrace> {
    let accel = trace::accelerations(&trace.time, &trace.speed);
    let powers = trace::required_powers(&trace.speed, &accel, veh);

    let mut speed = trace.speed.clone();
    let mut factors = Vec::with_capacity(trace.phases.len());
    let mut adjustments = Vec::with_capacity(trace.phases.len());

    for phase in &trace.phases {
        let window = effective_window(phase, &trace.speed);
        let factor = match (coeffs, &window) {
            (Some(c), Some(w)) => downscale_factor(&powers, rated_power, c, w),
            _ => 0.0,
        };
        factors.push(factor);

        let apply = coeffs.map(|c| c.apply_downscaling).unwrap_or(false);
        if apply && factor > 0.0 {
            if let Some(w) = &window {
                apply_window(&mut speed, &trace.speed, &accel, factor, w, &phase.name)?;
            }
        }

        let d0 = trace::distance(&trace.speed, phase.start, phase.end);
        let d1 = trace::distance(&speed, phase.start, phase.end);
        adjustments.push(if d0 > 0.0 { (d0 - d1) / d0 } else { 0.0 });
    }

    let downscaled = trace
        .speed
        .iter()
        .zip(speed.iter())
        .map(|(orig, scaled)| orig != scaled)
        .collect::<Vec<bool>>();

    if downscaled.iter().any(|d| *d) {
        log::debug!(
            "downscaled {} of {} samples, factors {:?}",
            downscaled.iter().filter(|d| **d).count(),
            trace.len(),
            factors
        );
    }

    Ok(ScaledTrace {
        time: trace.time.clone(),
        speed,
        phases: trace.phases.clone(),
        downscale_factors: factors,
        distance_adjustments: adjustments,
        downscaled,
    })
}

/// Declared scaling window of the phase, or the default one: phase bounds
/// with the correction point at the phase's speed peak. `None` when the
/// phase is too short or flat to scale.
fn effective_window(phase: &Phase, speed: &Array1<f64>) -> Option<ScaleWindow> {
    if let Some(w) = phase.scale_window {
        return Some(w);
    }
    if phase.len() < 3 {
        return None;
    }
    let mut peak = phase.start;
    for i in phase.start..phase.end {
        if speed[i] > speed[peak] {
            peak = i;
        }
    }
    let end = phase.end - 1;
    if peak <= phase.start || peak >= end {
        return None;
    }
    Some(ScaleWindow {
        start: phase.start,
        correction: peak,
        end,
    })
}

fn downscale_factor(
    powers: &Array1<f64>,
    rated_power: f64,
    coeffs: &DownscaleCoeffs,
    window: &ScaleWindow,
) -> f64 {
    let p_max = utils::arrmax(
        powers
            .slice(s![window.start..=window.end])
            .to_vec()
            .as_slice(),
    );
    let r_max = utils::round4(p_max / rated_power);
    if r_max < coeffs.r0 {
        return 0.0;
    }
    let factor = coeffs.a1 * r_max + coeffs.b1;
    if factor <= MIN_DOWNSCALE_FACTOR {
        0.0
    } else {
        factor
    }
}

/// Rebuild the speeds inside one scaling window.
///
/// Accelerating segment: `v[i+1] = v[i] + a_i * (1 - f) * 3.6`, which
/// telescopes to `v[i] = v_orig[i] - f * (v_orig[i] - v_orig[start])`.
/// Correction factor: `f_corr = (v[corr] - v_orig[end]) / (v_orig[corr] -
/// v_orig[end])`; decelerating segment: `v[i] = v[i-1] + a_{i-1} * f_corr *
/// 3.6`, landing exactly on the reference at the window end.
fn apply_window(
    speed: &mut Array1<f64>,
    orig: &Array1<f64>,
    accel: &Array1<f64>,
    factor: f64,
    w: &ScaleWindow,
    phase_name: &str,
) -> CoreResult<()> {
    for i in w.start..w.correction {
        speed[i + 1] = utils::round4(speed[i] + accel[i] * (1.0 - factor) * KMH_PER_MPS);
        if speed[i + 1] < 0.0 {
            return Err(CoreError::InfeasibleScaling {
                phase: phase_name.to_string(),
                index: i + 1,
            });
        }
    }

    let denominator = orig[w.correction] - orig[w.end];
    let correction_factor = if denominator == 0.0 {
        0.0
    } else {
        (speed[w.correction] - orig[w.end]) / denominator
    };

    for i in w.correction + 1..w.end {
        speed[i] = utils::round4(speed[i - 1] + accel[i - 1] * correction_factor * KMH_PER_MPS);
        if speed[i] < 0.0 {
            return Err(CoreError::InfeasibleScaling {
                phase: phase_name.to_string(),
                index: i,
            });
        }
    }
    // the recursion lands on the reference up to rounding; pin it exactly
    speed[w.end] = orig[w.end];
    Ok(())
}
