//! Module containing the ordered correction passes applied to the raw gear
//! sequence.
//!
//! The regulation fixes the order of the corrections; each pass declares its
//! prerequisites and the pipeline refuses an invalid ordering at
//! construction, before any case executes. Every pass is idempotent on its
//! own output: the corrections are convergent clean-up rules, and applying
//! one twice must not change the sequence further.

use itertools::Itertools;

use crate::imports::*;
use crate::params::CaseConfig;
use crate::solution::{DirectDownshift, Diagnostics, Gear0Insertion, PassAudit};
use crate::solver::GearSequence;
use crate::trace::DrivePhase;

/// Read-only surroundings plus the diagnostics sink shared by all passes.
pub struct PassContext<'a> {
    pub drive_phases: &'a [DrivePhase],
    pub config: &'a CaseConfig,
    pub diagnostics: &'a mut Diagnostics,
}

/// One named, pure transformation of the gear sequence.
pub trait CorrectionPass {
    fn name(&self) -> &'static str;
    /// Names of passes that must already have run.
    fn prerequisites(&self) -> &'static [&'static str] {
        &[]
    }
    fn apply(&self, gears: &mut GearSequence, cx: &mut PassContext);
}

/// Fixed, validated list of correction passes.
pub struct CorrectionPipeline {
    passes: Vec<Box<dyn CorrectionPass>>,
}

impl CorrectionPipeline {
    /// Build a pipeline, rejecting any pass whose prerequisites are not
    /// scheduled before it.
    pub fn new(passes: Vec<Box<dyn CorrectionPass>>) -> CoreResult<Self> {
        let mut seen: Vec<&'static str> = Vec::with_capacity(passes.len());
        for pass in &passes {
            if let Some(&missing) = pass
                .prerequisites()
                .iter()
                .find(|req| !seen.contains(req))
            {
                return Err(CoreError::OrderingViolation {
                    pass: pass.name(),
                    missing,
                });
            }
            seen.push(pass.name());
        }
        Ok(Self { passes })
    }

    /// The regulation's pass order.
    pub fn standard() -> CoreResult<Self> {
        Self::new(vec![
            Box::new(RunLengthSmoothing),
            Box::new(DownshiftLimiting),
            Box::new(BoundaryCorrection),
        ])
    }

    /// Apply all passes in order, appending an audit entry per pass.
    pub fn run(&self, gears: &mut GearSequence, cx: &mut PassContext) {
        for pass in &self.passes {
            let before = gears.0.clone();
            pass.apply(gears, cx);
            let samples_changed = before
                .iter()
                .zip(&gears.0)
                .filter(|(a, b)| a != b)
                .count();
            if samples_changed > 0 {
                log::debug!("correction `{}` changed {samples_changed} samples", pass.name());
            }
            cx.diagnostics.pass_audits.push(PassAudit {
                pass: pass.name().to_string(),
                samples_changed,
            });
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct Run {
    gear: usize,
    start: usize,
    len: usize,
}

fn runs_of(gears: &[usize]) -> Vec<Run> {
    let mut runs = Vec::new();
    for (gear, group) in &gears.iter().enumerate().group_by(|(_, g)| **g) {
        let indices: Vec<usize> = group.map(|(i, _)| i).collect();
        runs.push(Run {
            gear,
            start: indices[0],
            len: indices.len(),
        });
    }
    runs
}

/// Removes gear engagements shorter than the configured minimum duration by
/// merging them into a neighbouring engagement: the common neighbour gear if
/// both sides agree, the lower neighbour during deceleration, the earlier
/// gear otherwise. Iterates to a fixpoint so a single application is
/// idempotent.
pub struct RunLengthSmoothing;

impl CorrectionPass for RunLengthSmoothing {
    fn name(&self) -> &'static str {
        "run-length-smoothing"
    }

    fn apply(&self, gears: &mut GearSequence, cx: &mut PassContext) {
        let min_len = cx.config.min_gear_duration;
        loop {
            let runs = runs_of(&gears.0);
            let mut replacement: Option<(Run, usize)> = None;
            for (i, run) in runs.iter().enumerate() {
                if run.gear == 0 || run.len >= min_len {
                    continue;
                }
                let prev = if i > 0 { Some(&runs[i - 1]) } else { None };
                let next = runs.get(i + 1);
                let target = match (prev, next) {
                    (Some(p), Some(n)) if p.gear == n.gear => p.gear,
                    (Some(p), Some(n)) => {
                        if cx.drive_phases[run.start].is_deceleration() {
                            p.gear.min(n.gear)
                        } else {
                            p.gear
                        }
                    }
                    (Some(p), None) => p.gear,
                    (None, Some(n)) => n.gear,
                    (None, None) => continue,
                };
                if target != run.gear {
                    replacement = Some((*run, target));
                    break;
                }
            }
            match replacement {
                Some((run, target)) => {
                    for t in run.start..run.start + run.len {
                        gears.0[t] = target;
                    }
                }
                None => break,
            }
        }
    }
}

/// Detects downshifts spanning more than the configured number of steps
/// within one sample transition and disengages the clutch (gear 0) for
/// exactly one sample, avoiding the engine-speed spike. When
/// `downshift_direct_use` is set the lower target gear is used directly and
/// the authorization is recorded instead.
pub struct DownshiftLimiting;

impl CorrectionPass for DownshiftLimiting {
    fn name(&self) -> &'static str {
        "downshift-limiting"
    }

    fn prerequisites(&self) -> &'static [&'static str] {
        &["run-length-smoothing"]
    }

    fn apply(&self, gears: &mut GearSequence, cx: &mut PassContext) {
        let limit = cx.config.downshift_limit;
        for t in 1..gears.len() {
            let from = gears.0[t - 1];
            let to = gears.0[t];
            if from == 0 || to == 0 || from <= to || from - to <= limit {
                continue;
            }
            if cx.config.downshift_direct_use {
                cx.diagnostics.direct_downshifts.push(DirectDownshift {
                    sample: t,
                    from_gear: from,
                    to_gear: to,
                });
            } else {
                gears.0[t] = 0;
                cx.diagnostics.gear0_insertions.push(Gear0Insertion {
                    sample: t,
                    from_gear: from,
                    to_gear: to,
                });
            }
        }
    }
}

/// Enforces the idle/engagement constraints at the trace boundaries:
/// standstill samples are neutral, 1st gear engages one sample before each
/// pull-away, and decelerations to standstill end in neutral rather than in
/// 1st gear or in engagement stubs of up to two samples.
pub struct BoundaryCorrection;

impl CorrectionPass for BoundaryCorrection {
    fn name(&self) -> &'static str {
        "boundary-correction"
    }

    fn prerequisites(&self) -> &'static [&'static str] {
        &["downshift-limiting"]
    }

    fn apply(&self, gears: &mut GearSequence, cx: &mut PassContext) {
        let phases = cx.drive_phases;
        let n = gears.len();

        for t in 0..n {
            if phases[t].is_standstill() && gears.0[t] != 0 {
                gears.0[t] = 0;
            }
        }

        // engage 1st gear one sample ahead of every pull-away
        for t in 1..n {
            if phases[t] == DrivePhase::AccelerationFromStandstill && phases[t - 1].is_standstill()
            {
                gears.0[t - 1] = 1;
            }
        }

        // decelerations to standstill: no downshift into 1st, and trailing
        // engagements of up to two samples go to neutral (fixpoint keeps a
        // single application idempotent)
        let mut t = 0;
        while t < n {
            if phases[t] != DrivePhase::DecelerationToStandstill {
                t += 1;
                continue;
            }
            let start = t;
            while t < n && phases[t] == DrivePhase::DecelerationToStandstill {
                t += 1;
            }
            let end = t; // exclusive

            for g in gears.0[start..end].iter_mut() {
                if *g == 1 {
                    *g = 0;
                }
            }

            loop {
                let mut last = end;
                while last > start && gears.0[last - 1] == 0 {
                    last -= 1;
                }
                let mut first = last;
                while first > start && gears.0[first - 1] == gears.0[last - 1] && gears.0[first - 1] > 0
                {
                    first -= 1;
                }
                if last > first && last - first <= 2 && gears.0[first] > 0 {
                    for g in gears.0[first..last].iter_mut() {
                        *g = 0;
                    }
                } else {
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::classify_drive_phases;

    fn context_for<'a>(
        drive_phases: &'a [DrivePhase],
        config: &'a CaseConfig,
        diagnostics: &'a mut Diagnostics,
    ) -> PassContext<'a> {
        PassContext {
            drive_phases,
            config,
            diagnostics,
        }
    }

    fn constant_speed_phases(len: usize) -> Vec<DrivePhase> {
        vec![DrivePhase::ConstantSpeed; len]
    }

    fn decel_phases(len: usize) -> Vec<DrivePhase> {
        vec![DrivePhase::Deceleration; len]
    }

    #[test]
    fn test_pipeline_rejects_invalid_order() {
        let res = CorrectionPipeline::new(vec![
            Box::new(DownshiftLimiting),
            Box::new(RunLengthSmoothing),
        ]);
        assert!(matches!(
            res,
            Err(CoreError::OrderingViolation {
                pass: "downshift-limiting",
                missing: "run-length-smoothing"
            })
        ));
        assert!(CorrectionPipeline::standard().is_ok());
    }

    #[test]
    fn test_run_length_smoothing_merges_blips() {
        let config = CaseConfig::default();
        let phases = constant_speed_phases(6);
        let mut diags = Diagnostics::default();
        let mut cx = context_for(&phases, &config, &mut diags);
        let mut gears = GearSequence(vec![2, 2, 2, 3, 2, 2]);
        RunLengthSmoothing.apply(&mut gears, &mut cx);
        assert_eq!(gears.0, vec![2; 6]);
    }

    #[test]
    fn test_run_length_smoothing_prefers_lower_gear_in_deceleration() {
        let config = CaseConfig::default();
        let phases = decel_phases(7);
        let mut diags = Diagnostics::default();
        let mut cx = context_for(&phases, &config, &mut diags);
        let mut gears = GearSequence(vec![4, 4, 4, 3, 2, 2, 2]);
        RunLengthSmoothing.apply(&mut gears, &mut cx);
        assert_eq!(gears.0, vec![4, 4, 4, 2, 2, 2, 2]);
    }

    #[test]
    fn test_downshift_limit_inserts_single_gear0() {
        let config = CaseConfig::default();
        let phases = decel_phases(6);
        let mut diags = Diagnostics::default();
        let mut cx = context_for(&phases, &config, &mut diags);
        let mut gears = GearSequence(vec![5, 5, 5, 1, 1, 1]);
        DownshiftLimiting.apply(&mut gears, &mut cx);
        assert_eq!(gears.0, vec![5, 5, 5, 0, 1, 1]);
        assert_eq!(diags.gear0_insertions.len(), 1);
        assert_eq!(diags.gear0_insertions[0].from_gear, 5);
        assert_eq!(diags.gear0_insertions[0].to_gear, 1);
    }

    #[test]
    fn test_downshift_within_limit_is_untouched() {
        let config = CaseConfig::default();
        let phases = decel_phases(6);
        let mut diags = Diagnostics::default();
        let mut cx = context_for(&phases, &config, &mut diags);
        let mut gears = GearSequence(vec![5, 5, 5, 2, 2, 2]);
        DownshiftLimiting.apply(&mut gears, &mut cx);
        assert_eq!(gears.0, vec![5, 5, 5, 2, 2, 2]);
        assert!(diags.gear0_insertions.is_empty());
    }

    #[test]
    fn test_downshift_direct_use_records_authorization() {
        let config = CaseConfig {
            downshift_direct_use: true,
            ..Default::default()
        };
        let phases = decel_phases(6);
        let mut diags = Diagnostics::default();
        let mut cx = context_for(&phases, &config, &mut diags);
        let mut gears = GearSequence(vec![5, 5, 5, 1, 1, 1]);
        DownshiftLimiting.apply(&mut gears, &mut cx);
        assert_eq!(gears.0, vec![5, 5, 5, 1, 1, 1]);
        assert!(diags.gear0_insertions.is_empty());
        assert_eq!(diags.direct_downshifts.len(), 1);
    }

    #[test]
    fn test_boundary_correction_engages_first_gear_before_launch() {
        let config = CaseConfig::default();
        let speed = array![0.0, 0.0, 0.0, 5.0, 10.0, 15.0, 20.0];
        let phases = classify_drive_phases(&speed);
        let mut diags = Diagnostics::default();
        let mut cx = context_for(&phases, &config, &mut diags);
        let mut gears = GearSequence(vec![0, 0, 0, 1, 1, 1, 2]);
        BoundaryCorrection.apply(&mut gears, &mut cx);
        assert_eq!(gears.0, vec![0, 0, 1, 1, 1, 1, 2]);
    }

    #[test]
    fn test_boundary_correction_neutralizes_stop_tail() {
        let config = CaseConfig::default();
        let speed = array![30.0, 24.0, 18.0, 12.0, 6.0, 0.0, 0.0];
        let phases = classify_drive_phases(&speed);
        let mut diags = Diagnostics::default();
        let mut cx = context_for(&phases, &config, &mut diags);
        // 1st gear during the final deceleration is not permitted and the
        // 2-sample 2nd-gear stub goes to neutral with it
        let mut gears = GearSequence(vec![3, 3, 3, 2, 1, 0, 0]);
        BoundaryCorrection.apply(&mut gears, &mut cx);
        assert_eq!(gears.0, vec![3, 3, 3, 0, 0, 0, 0]);
    }

    #[test]
    fn test_every_pass_is_idempotent() {
        let config = CaseConfig::default();
        let speed = array![
            0.0, 0.0, 6.0, 12.0, 20.0, 30.0, 40.0, 50.0, 50.0, 50.0, 42.0, 34.0, 26.0, 18.0,
            10.0, 0.0, 0.0
        ];
        let phases = classify_drive_phases(&speed);
        let gears0 = GearSequence(vec![0, 0, 1, 1, 2, 3, 4, 5, 5, 5, 5, 4, 1, 2, 1, 0, 0]);

        let passes: Vec<Box<dyn CorrectionPass>> = vec![
            Box::new(RunLengthSmoothing),
            Box::new(DownshiftLimiting),
            Box::new(BoundaryCorrection),
        ];
        let mut gears = gears0;
        for pass in &passes {
            let mut diags = Diagnostics::default();
            let mut cx = context_for(&phases, &config, &mut diags);
            pass.apply(&mut gears, &mut cx);
            let once = gears.clone();
            let mut diags2 = Diagnostics::default();
            let mut cx2 = context_for(&phases, &config, &mut diags2);
            pass.apply(&mut gears, &mut cx2);
            assert_eq!(gears, once, "pass `{}` is not idempotent", pass.name());
        }
    }

    #[test]
    fn test_audit_trail_records_every_pass() {
        let config = CaseConfig::default();
        let phases = constant_speed_phases(4);
        let mut diags = Diagnostics::default();
        let mut cx = context_for(&phases, &config, &mut diags);
        let mut gears = GearSequence(vec![2, 2, 2, 2]);
        let pipeline = CorrectionPipeline::standard().unwrap();
        pipeline.run(&mut gears, &mut cx);
        let names: Vec<&str> = diags.pass_audits.iter().map(|a| a.pass.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "run-length-smoothing",
                "downshift-limiting",
                "boundary-correction"
            ]
        );
    }
}
