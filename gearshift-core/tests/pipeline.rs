//! End-to-end scenarios running complete cases through the pipeline.

use gearshift_core::params::{CaseConfig, DownscaleCoeffs};
use gearshift_core::runner::{run_case, Case};
use gearshift_core::trace::{Phase, ReferenceTrace, ScaleWindow};
use gearshift_core::vehicle::{FullLoadCurve, VehicleProfile};
use ndarray::Array1;

fn test_vehicle() -> VehicleProfile {
    VehicleProfile {
        name: "test".to_string(),
        rated_power: 0.0,
        rated_engine_speed: 0.0,
        idle_engine_speed: 750.0,
        test_mass: 1500.0,
        f0: 100.0,
        f1: 0.5,
        f2: 0.03,
        gear_ratios: vec![3.5, 2.1, 1.4, 1.0, 0.8],
        final_drive_ratio: 4.0,
        wheel_radius: 0.3,
        full_load_curve: FullLoadCurve::new(
            vec![1000.0, 2000.0, 3000.0, 4000.0, 5000.0, 6000.0],
            vec![20.0, 50.0, 80.0, 100.0, 110.0, 100.0],
        )
        .unwrap(),
    }
}

fn single_phase_trace(speed: Array1<f64>) -> ReferenceTrace {
    let n = speed.len();
    ReferenceTrace::new(
        Array1::range(0.0, n as f64, 1.0),
        speed,
        vec![Phase {
            name: "total".to_string(),
            start: 0,
            end: n,
            scale_window: None,
        }],
    )
    .unwrap()
}

/// A trace whose first plateau demands 5th gear, dropping to a crawl speed
/// reachable only in 1st within one sample transition.
fn large_downshift_case(downshift_direct_use: bool) -> Case {
    let speed = Array1::from_vec(vec![
        160.0, 160.0, 160.0, 160.0, 160.0, 6.0, 6.0, 6.0, 12.0, 18.0,
    ]);
    Case {
        name: "downshift".to_string(),
        vehicle: test_vehicle(),
        trace: single_phase_trace(speed),
        config: CaseConfig {
            downshift_direct_use,
            ..Default::default()
        },
    }
}

#[test]
fn constant_speed_trace_yields_one_stable_gear() {
    let case = Case {
        name: "steady-50".to_string(),
        vehicle: test_vehicle(),
        trace: single_phase_trace(Array1::from_elem(100, 50.0)),
        config: CaseConfig::default(),
    };
    let sol = run_case(&case).unwrap();

    assert_eq!(sol.gears.len(), 100);
    let gear = sol.gears[0];
    assert!(gear >= 1 && gear <= 5);
    assert!(sol.gears.iter().all(|&g| g == gear), "gear flutter: {:?}", sol.gears);
    let n0 = sol.required_engine_speed[0];
    assert!(sol
        .required_engine_speed
        .iter()
        .all(|&n| (n - n0).abs() < 1e-9));
    assert!(sol.diagnostics.power_insufficient.is_empty());
}

#[test]
fn large_downshift_inserts_exactly_one_gear0_sample() {
    let sol = run_case(&large_downshift_case(false)).unwrap();

    assert_eq!(sol.gears, vec![5, 5, 5, 5, 5, 0, 1, 1, 1, 1]);
    let zeros = sol.gears.iter().filter(|&&g| g == 0).count();
    assert_eq!(zeros, 1);
    assert_eq!(sol.diagnostics.gear0_insertions.len(), 1);
    let ins = &sol.diagnostics.gear0_insertions[0];
    assert_eq!((ins.sample, ins.from_gear, ins.to_gear), (5, 5, 1));
    // disengaged sample: idle engine speed, no available power
    assert_eq!(sol.required_engine_speed[5], 750.0);
    assert_eq!(sol.available_power[5], 0.0);
}

#[test]
fn authorized_direct_downshift_skips_gear0_and_is_recorded() {
    let sol = run_case(&large_downshift_case(true)).unwrap();

    assert_eq!(sol.gears, vec![5, 5, 5, 5, 5, 1, 1, 1, 1, 1]);
    assert!(sol.gears.iter().all(|&g| g != 0));
    assert!(sol.diagnostics.gear0_insertions.is_empty());
    assert_eq!(sol.diagnostics.direct_downshifts.len(), 1);
    let auth = &sol.diagnostics.direct_downshifts[0];
    assert_eq!((auth.sample, auth.from_gear, auth.to_gear), (5, 5, 1));
}

#[test]
fn final_gears_stay_within_the_vehicle_range() {
    let speed = Array1::from_vec(vec![
        0.0, 0.0, 6.0, 12.0, 20.0, 30.0, 42.0, 55.0, 70.0, 85.0, 100.0, 100.0, 100.0, 80.0,
        60.0, 40.0, 20.0, 8.0, 0.0, 0.0,
    ]);
    let case = Case {
        name: "urban".to_string(),
        vehicle: test_vehicle(),
        trace: single_phase_trace(speed),
        config: CaseConfig::default(),
    };
    let sol = run_case(&case).unwrap();
    assert!(sol.gears.iter().all(|&g| g <= 5));
    assert_eq!(sol.gears.len(), 20);
    // the trace both starts and ends at standstill in neutral
    assert_eq!(sol.gears[0], 0);
    assert_eq!(*sol.gears.last().unwrap(), 0);
}

#[test]
fn downscaled_case_keeps_length_and_never_exceeds_reference() {
    let speed = Array1::from_vec(vec![
        0.0, 10.0, 20.0, 30.0, 40.0, 50.0, 40.0, 30.0, 20.0, 10.0, 0.0,
    ]);
    let n = speed.len();
    let trace = ReferenceTrace::new(
        Array1::range(0.0, n as f64, 1.0),
        speed.clone(),
        vec![Phase {
            name: "low".to_string(),
            start: 0,
            end: n,
            scale_window: Some(ScaleWindow {
                start: 0,
                correction: 5,
                end: 10,
            }),
        }],
    )
    .unwrap();
    let case = Case {
        name: "downscaled".to_string(),
        vehicle: test_vehicle(),
        trace,
        config: CaseConfig {
            downscale: Some(DownscaleCoeffs {
                r0: 0.0,
                a1: 0.0,
                b1: 0.25,
                apply_downscaling: true,
            }),
            ..Default::default()
        },
    };
    let sol = run_case(&case).unwrap();
    assert_eq!(sol.required_vehicle_speed.len(), n);
    for (scaled, orig) in sol.required_vehicle_speed.iter().zip(speed.iter()) {
        assert!(scaled <= &(orig + 2e-3));
    }
}
