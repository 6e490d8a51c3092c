//! Structural validation for the JSON artifacts.
//!
//! Field-range checks for the diff report and the patch plan: pitches
//! 0-127, durations positive, beats 1-indexed, confidences in [0, 1],
//! non-empty operation ids, and per-kind required parameters. The
//! planner validates a plan before returning it; the applier validates a
//! loaded plan before touching the document.

use crate::models::{DiffReport, PatchOpKind, PatchOperation, PatchPlan};

/// An artifact failed its structural checks.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{artifact} validation failed: {message}")]
pub struct ValidationError {
    /// Which artifact failed ("diff report" or "patch plan").
    pub artifact: &'static str,
    pub message: String,
}

impl ValidationError {
    /// Machine-readable error code for CLI reporting.
    pub fn code(&self) -> &'static str {
        "E_VALIDATION"
    }

    fn report(message: impl Into<String>) -> Self {
        Self {
            artifact: "diff report",
            message: message.into(),
        }
    }

    fn plan(message: impl Into<String>) -> Self {
        Self {
            artifact: "patch plan",
            message: message.into(),
        }
    }
}

/// Result type for validation.
pub type ValidationResult = Result<(), ValidationError>;

/// Check a diff report before it is written or consumed.
pub fn validate_report(report: &DiffReport) -> ValidationResult {
    if !report.tempo_bpm.is_finite() || report.tempo_bpm <= 0.0 {
        return Err(ValidationError::report(format!(
            "tempo_bpm must be positive, got {}",
            report.tempo_bpm
        )));
    }

    let summary = &report.alignment_summary;
    if summary.estimated_beat_error_mean < 0.0 || summary.estimated_beat_error_max < 0.0 {
        return Err(ValidationError::report("beat errors must be non-negative"));
    }

    for (index, diff) in report.diffs.iter().enumerate() {
        if !(0.0..=1.0).contains(&diff.confidence) {
            return Err(ValidationError::report(format!(
                "diff {}: confidence {} outside [0, 1]",
                index, diff.confidence
            )));
        }
        if !diff.beat.is_finite() || diff.beat < 1.0 {
            return Err(ValidationError::report(format!(
                "diff {}: beat {} must be >= 1.0",
                index, diff.beat
            )));
        }
        if diff.measure > report.total_measures {
            return Err(ValidationError::report(format!(
                "diff {}: measure {} beyond total {}",
                index, diff.measure, report.total_measures
            )));
        }
    }

    Ok(())
}

/// Check a patch plan before it is returned by the planner or consumed
/// by the applier.
pub fn validate_plan(plan: &PatchPlan) -> ValidationResult {
    for (index, op) in plan.operations.iter().enumerate() {
        if op.op_id.is_empty() {
            return Err(ValidationError::plan(format!("operation {}: empty op_id", index)));
        }
        if !op.beat.is_finite() || op.beat < 1.0 {
            return Err(ValidationError::plan(format!(
                "operation {} ({}): beat {} must be >= 1.0",
                index, op.op_id, op.beat
            )));
        }
        if op.voice < 1 {
            return Err(ValidationError::plan(format!(
                "operation {} ({}): voice must be >= 1",
                index, op.op_id
            )));
        }
        validate_params(index, op)?;
    }
    Ok(())
}

fn validate_params(index: usize, op: &PatchOperation) -> ValidationResult {
    let params = &op.params;

    for (name, pitch) in [
        ("pitch_midi", params.pitch_midi),
        ("old_pitch_midi", params.old_pitch_midi),
    ] {
        if let Some(pitch) = pitch {
            if pitch > 127 {
                return Err(ValidationError::plan(format!(
                    "operation {} ({}): {} {} outside 0-127",
                    index, op.op_id, name, pitch
                )));
            }
        }
    }

    for (name, duration) in [
        ("duration", params.duration),
        ("old_duration", params.old_duration),
    ] {
        if let Some(duration) = duration {
            if !duration.is_finite() || duration <= 0.0 {
                return Err(ValidationError::plan(format!(
                    "operation {} ({}): {} must be positive, got {}",
                    index, op.op_id, name, duration
                )));
            }
        }
    }

    // Each operation kind needs the fields its application reads.
    let complete = match op.kind {
        PatchOpKind::InsertNote => params.pitch_midi.is_some() && params.duration.is_some(),
        PatchOpKind::DeleteNote => {
            params.old_pitch_midi.is_some() && params.old_duration.is_some()
        }
        PatchOpKind::UpdateDuration => {
            params.duration.is_some() && params.old_duration.is_some()
        }
        PatchOpKind::UpdatePitch => {
            params.pitch_midi.is_some() && params.old_pitch_midi.is_some()
        }
        PatchOpKind::Noop => true,
    };
    if !complete {
        return Err(ValidationError::plan(format!(
            "operation {} ({}): incomplete params for {}",
            index,
            op.op_id,
            op.kind.as_str()
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        AlignmentSummary, ConfidenceTier, PatchParams, Severity, TempoSource,
    };
    use crate::models::{Diff, DiffDetail, DiffKind};

    fn report_with(diffs: Vec<Diff>) -> DiffReport {
        DiffReport {
            source_xml: "score.musicxml".to_string(),
            source_midi: "take.mid".to_string(),
            timestamp: "2026-01-01T00:00:00+00:00".to_string(),
            tempo_bpm: 120.0,
            total_measures: 4,
            alignment_summary: AlignmentSummary {
                tempo_source: TempoSource::Musicxml,
                time_signature_map_used: false,
                has_pickup: false,
                pickup_beats: 0.0,
                alignment_confidence: ConfidenceTier::High,
                estimated_beat_error_mean: 0.0,
                estimated_beat_error_max: 0.0,
                midi_has_tempo_map: false,
                pedal_accounted_for: false,
            },
            unsupported_features: vec![],
            diffs,
            warnings: vec![],
        }
    }

    fn diff(measure: u32, beat: f64, confidence: f64) -> Diff {
        Diff {
            kind: DiffKind::MissingNote,
            measure,
            beat,
            confidence,
            severity: Severity::Error,
            reason: "no_matching_midi_event".to_string(),
            suggestion: String::new(),
            detail: DiffDetail::MissingNote {
                pitch_midi: 60,
                pitch_spelled: "C4".to_string(),
                duration: 1.0,
            },
        }
    }

    fn op(kind: PatchOpKind, params: PatchParams) -> PatchOperation {
        PatchOperation {
            op_id: "op-0123456789ab".to_string(),
            diff_ref: None,
            kind,
            measure: 1,
            beat: 1.0,
            voice: 1,
            params,
        }
    }

    fn plan_with(operations: Vec<PatchOperation>) -> PatchPlan {
        PatchPlan {
            source_file: "score.musicxml".to_string(),
            source_diff_timestamp: "2026-01-01T00:00:00+00:00".to_string(),
            operations,
        }
    }

    #[test]
    fn valid_report_passes() {
        assert!(validate_report(&report_with(vec![diff(1, 1.0, 1.0)])).is_ok());
    }

    #[test]
    fn confidence_outside_unit_range_fails() {
        let err = validate_report(&report_with(vec![diff(1, 1.0, 1.5)])).unwrap_err();
        assert_eq!(err.code(), "E_VALIDATION");
        assert!(err.message.contains("confidence"));
    }

    #[test]
    fn beat_below_one_fails() {
        assert!(validate_report(&report_with(vec![diff(1, 0.5, 1.0)])).is_err());
    }

    #[test]
    fn measure_beyond_total_fails() {
        assert!(validate_report(&report_with(vec![diff(9, 1.0, 1.0)])).is_err());
    }

    #[test]
    fn complete_operations_pass() {
        let plan = plan_with(vec![
            op(
                PatchOpKind::InsertNote,
                PatchParams {
                    pitch_midi: Some(72),
                    duration: Some(1.0),
                    ..Default::default()
                },
            ),
            op(
                PatchOpKind::DeleteNote,
                PatchParams {
                    old_pitch_midi: Some(60),
                    old_duration: Some(1.0),
                    ..Default::default()
                },
            ),
            op(PatchOpKind::Noop, PatchParams::default()),
        ]);
        assert!(validate_plan(&plan).is_ok());
    }

    #[test]
    fn incomplete_params_fail() {
        let plan = plan_with(vec![op(
            PatchOpKind::InsertNote,
            PatchParams {
                pitch_midi: Some(72),
                ..Default::default()
            },
        )]);
        let err = validate_plan(&plan).unwrap_err();
        assert!(err.message.contains("incomplete params"));
    }

    #[test]
    fn out_of_range_pitch_fails() {
        let plan = plan_with(vec![op(
            PatchOpKind::InsertNote,
            PatchParams {
                pitch_midi: Some(200),
                duration: Some(1.0),
                ..Default::default()
            },
        )]);
        assert!(validate_plan(&plan).is_err());
    }

    #[test]
    fn non_positive_duration_fails() {
        let plan = plan_with(vec![op(
            PatchOpKind::UpdateDuration,
            PatchParams {
                duration: Some(0.0),
                old_duration: Some(1.0),
                ..Default::default()
            },
        )]);
        assert!(validate_plan(&plan).is_err());
    }

    #[test]
    fn empty_op_id_fails() {
        let mut operation = op(PatchOpKind::Noop, PatchParams::default());
        operation.op_id = String::new();
        assert!(validate_plan(&plan_with(vec![operation])).is_err());
    }
}
