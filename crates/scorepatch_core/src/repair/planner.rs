//! Patch planning: diff reports to deterministic edit sequences.
//!
//! Planning is pure: identical reports produce byte-identical plans,
//! including operation ids. Candidate operations conflict when they
//! target the same (measure, beat, voice) slot; the stronger diff wins,
//! and an exact priority tie discards both sides rather than guessing.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use sha2::{Digest, Sha256};

use crate::models::{
    Diff, DiffDetail, DiffKind, DiffRef, DiffReport, PatchOpKind, PatchOperation, PatchParams,
    PatchPlan,
};
use crate::validate;

use super::RepairResult;

/// Minimum diff confidence for an automatic repair.
pub const CONFIDENCE_THRESHOLD: f64 = 0.8;

/// Build a patch plan from a diff report.
///
/// Diffs outside the score's measure range, at or below the confidence
/// threshold, or of informational kinds are skipped. The returned plan is
/// structurally validated and ordered by `(measure, beat, op_id)`.
pub fn generate_plan(report: &DiffReport, total_measures: u32) -> RepairResult<PatchPlan> {
    let plan = plan_with_threshold(report, total_measures, CONFIDENCE_THRESHOLD);
    validate::validate_plan(&plan)?;
    tracing::debug!(
        operations = plan.operations.len(),
        diffs = report.diffs.len(),
        "plan generated"
    );
    Ok(plan)
}

/// Threshold-parameterized planning.
///
/// Filtering is monotonic in the threshold: lowering it never removes an
/// operation that passed a higher one.
fn plan_with_threshold(report: &DiffReport, total_measures: u32, threshold: f64) -> PatchPlan {
    // Fixed walk order so conflict resolution sees candidates in a
    // reproducible sequence.
    let mut ordered: Vec<(usize, &Diff)> = report.diffs.iter().enumerate().collect();
    ordered.sort_by(|(ia, a), (ib, b)| {
        a.measure
            .cmp(&b.measure)
            .then_with(|| a.beat.total_cmp(&b.beat))
            .then_with(|| a.kind.as_str().cmp(b.kind.as_str()))
            .then_with(|| ia.cmp(ib))
    });

    let mut candidates: BTreeMap<SlotKey, (Priority, PatchOperation)> = BTreeMap::new();
    for (index, diff) in ordered {
        if diff.measure > total_measures {
            continue;
        }
        if diff.confidence <= threshold {
            continue;
        }
        if diff.kind == DiffKind::UnsupportedFeature {
            continue;
        }
        let Some(op) = diff_to_operation(diff, report.tempo_bpm, index) else {
            continue;
        };

        let key = (op.measure, beat_millis(op.beat), op.voice);
        let priority = Priority {
            severity: diff.severity.rank(),
            confidence: diff.confidence,
            kind: diff.kind.as_str(),
            index,
        };
        match candidates.get(&key).map(|(current, _)| *current) {
            None => {
                candidates.insert(key, (priority, op));
            }
            Some(current) => match priority.cmp(&current) {
                // Ambiguous: applying either could be wrong.
                Ordering::Equal => {
                    candidates.remove(&key);
                }
                Ordering::Greater => {
                    candidates.insert(key, (priority, op));
                }
                Ordering::Less => {}
            },
        }
    }

    let mut operations: Vec<PatchOperation> =
        candidates.into_values().map(|(_, op)| op).collect();
    operations.sort_by(|a, b| {
        a.measure
            .cmp(&b.measure)
            .then_with(|| a.beat.total_cmp(&b.beat))
            .then_with(|| a.op_id.cmp(&b.op_id))
    });

    PatchPlan {
        source_file: report.source_xml.clone(),
        source_diff_timestamp: report.timestamp.clone(),
        operations,
    }
}

/// Conflict key; beats are bucketed at millibeat resolution.
type SlotKey = (u32, i64, u32);

fn beat_millis(beat: f64) -> i64 {
    (beat * 1000.0).round() as i64
}

#[derive(Debug, Clone, Copy)]
struct Priority {
    severity: u8,
    confidence: f64,
    kind: &'static str,
    index: usize,
}

impl Priority {
    fn cmp(&self, other: &Self) -> Ordering {
        self.severity
            .cmp(&other.severity)
            .then_with(|| self.confidence.total_cmp(&other.confidence))
            .then_with(|| self.kind.cmp(other.kind))
            .then_with(|| self.index.cmp(&other.index))
    }
}

/// Map one diff to its candidate operation.
///
/// Returns None when the diff cannot supply the fields its operation
/// needs (including unrecognized opaque payloads).
fn diff_to_operation(diff: &Diff, tempo_bpm: f64, index: usize) -> Option<PatchOperation> {
    let (kind, params) = match (diff.kind, &diff.detail) {
        // Remove the unexpected notation; old values identify the target.
        (DiffKind::MissingNote, DiffDetail::MissingNote { pitch_midi, duration, .. }) => (
            PatchOpKind::DeleteNote,
            PatchParams {
                old_pitch_midi: Some(*pitch_midi),
                old_duration: Some(*duration),
                ..Default::default()
            },
        ),
        (DiffKind::ExtraNote, DiffDetail::ExtraNote { pitch, duration_sec, .. }) => {
            if tempo_bpm <= 0.0 {
                return None;
            }
            let duration = duration_sec * tempo_bpm / 60.0;
            if duration <= 0.0 {
                return None;
            }
            (
                PatchOpKind::InsertNote,
                PatchParams {
                    pitch_midi: Some(*pitch),
                    duration: Some(duration),
                    ..Default::default()
                },
            )
        }
        (
            DiffKind::DurationMismatch | DiffKind::DurationMismatchTie,
            DiffDetail::DurationMismatch { expected_duration, observed_beats, .. },
        ) => {
            if *observed_beats <= 0.0 {
                return None;
            }
            (
                PatchOpKind::UpdateDuration,
                PatchParams {
                    duration: Some(*observed_beats),
                    old_duration: Some(*expected_duration),
                    ..Default::default()
                },
            )
        }
        (
            DiffKind::PitchMismatch,
            DiffDetail::PitchMismatch {
                expected_pitch,
                observed_pitch,
                expected_duration,
                ..
            },
        ) => {
            let duration = (*expected_duration)?;
            (
                PatchOpKind::UpdatePitch,
                PatchParams {
                    pitch_midi: Some(*observed_pitch),
                    old_pitch_midi: Some(*expected_pitch),
                    duration: Some(duration),
                    ..Default::default()
                },
            )
        }
        _ => return None,
    };

    Some(PatchOperation {
        op_id: op_id(diff, index),
        diff_ref: Some(DiffRef {
            kind: diff.kind,
            measure: diff.measure,
            beat: diff.beat,
        }),
        kind,
        measure: diff.measure,
        beat: diff.beat,
        voice: 1,
        params,
    })
}

/// Derive the stable operation id.
///
/// Stable within this implementation only; the truncated hash is not a
/// cross-implementation contract.
fn op_id(diff: &Diff, index: usize) -> String {
    let pitch = diff
        .detail
        .primary_pitch()
        .map_or_else(|| "na".to_string(), |p| p.to_string());
    let raw = format!(
        "{}|{}|{:.3}|{}|{}",
        diff.kind.as_str(),
        diff.measure,
        diff.beat,
        pitch,
        index
    );
    let digest = format!("{:x}", Sha256::digest(raw.as_bytes()));
    format!("op-{}", &digest[..12])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        AlignmentSummary, ConfidenceTier, FeatureKind, Severity, TempoSource,
    };

    fn report_with(diffs: Vec<Diff>) -> DiffReport {
        DiffReport {
            source_xml: "score.musicxml".to_string(),
            source_midi: "take.mid".to_string(),
            timestamp: "2026-01-01T00:00:00+00:00".to_string(),
            tempo_bpm: 120.0,
            total_measures: 8,
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

    fn missing_note(measure: u32, beat: f64) -> Diff {
        Diff {
            kind: DiffKind::MissingNote,
            measure,
            beat,
            confidence: 1.0,
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

    fn extra_note(measure: u32, beat: f64, pitch: u8) -> Diff {
        Diff {
            kind: DiffKind::ExtraNote,
            measure,
            beat,
            confidence: 1.0,
            severity: Severity::Warn,
            reason: "no_matching_score_event".to_string(),
            suggestion: String::new(),
            detail: DiffDetail::ExtraNote {
                pitch,
                duration_sec: 0.5,
                velocity: 80,
            },
        }
    }

    #[test]
    fn extra_note_becomes_insert_with_beat_duration() {
        // Pitch 72 performed for 0.5 s at 120 BPM: one beat.
        let plan = generate_plan(&report_with(vec![extra_note(1, 2.0, 72)]), 8).unwrap();
        assert_eq!(plan.operations.len(), 1);
        let op = &plan.operations[0];
        assert_eq!(op.kind, PatchOpKind::InsertNote);
        assert_eq!(op.params.pitch_midi, Some(72));
        assert!((op.params.duration.unwrap() - 1.0).abs() < 1e-9);
        assert_eq!(op.diff_ref.as_ref().unwrap().kind, DiffKind::ExtraNote);
    }

    #[test]
    fn missing_note_becomes_delete_with_old_params() {
        let plan = generate_plan(&report_with(vec![missing_note(2, 3.0)]), 8).unwrap();
        assert_eq!(plan.operations.len(), 1);
        let op = &plan.operations[0];
        assert_eq!(op.kind, PatchOpKind::DeleteNote);
        assert_eq!(op.params.old_pitch_midi, Some(60));
        assert_eq!(op.params.old_duration, Some(1.0));
    }

    #[test]
    fn duration_mismatch_updates_to_observed_beats() {
        let diff = Diff {
            kind: DiffKind::DurationMismatch,
            measure: 1,
            beat: 1.0,
            confidence: 0.95,
            severity: Severity::Error,
            reason: "duration_differs".to_string(),
            suggestion: String::new(),
            detail: DiffDetail::DurationMismatch {
                pitch_midi: 60,
                pitch_spelled: "C4".to_string(),
                expected_duration: 2.0,
                has_tie: false,
                observed_pitch: 60,
                observed_beats: 1.0,
                observed_sec: 0.5,
            },
        };
        let plan = generate_plan(&report_with(vec![diff]), 8).unwrap();
        let op = &plan.operations[0];
        assert_eq!(op.kind, PatchOpKind::UpdateDuration);
        assert_eq!(op.params.duration, Some(1.0));
        assert_eq!(op.params.old_duration, Some(2.0));
    }

    #[test]
    fn pitch_mismatch_without_duration_is_dropped() {
        let mut diff = missing_note(1, 1.0);
        diff.kind = DiffKind::PitchMismatch;
        diff.detail = DiffDetail::PitchMismatch {
            expected_pitch: 60,
            expected_spelled: "C4".to_string(),
            observed_pitch: 62,
            expected_duration: None,
        };
        let plan = generate_plan(&report_with(vec![diff.clone()]), 8).unwrap();
        assert!(plan.operations.is_empty());

        diff.detail = DiffDetail::PitchMismatch {
            expected_pitch: 60,
            expected_spelled: "C4".to_string(),
            observed_pitch: 62,
            expected_duration: Some(1.0),
        };
        let plan = generate_plan(&report_with(vec![diff]), 8).unwrap();
        assert_eq!(plan.operations[0].kind, PatchOpKind::UpdatePitch);
        assert_eq!(plan.operations[0].params.old_pitch_midi, Some(60));
        assert_eq!(plan.operations[0].params.pitch_midi, Some(62));
    }

    #[test]
    fn low_confidence_and_unsupported_diffs_are_filtered() {
        let mut low = missing_note(1, 1.0);
        low.confidence = 0.8; // at the threshold, not above it
        let info = Diff {
            kind: DiffKind::UnsupportedFeature,
            measure: 1,
            beat: 1.0,
            confidence: 0.5,
            severity: Severity::Info,
            reason: "unsupported_tuplet".to_string(),
            suggestion: String::new(),
            detail: DiffDetail::UnsupportedFeature {
                feature: FeatureKind::Tuplet,
                description: "Tuplet detected".to_string(),
            },
        };
        let out_of_range = missing_note(9, 1.0);
        let plan =
            generate_plan(&report_with(vec![low, info, out_of_range]), 8).unwrap();
        assert!(plan.operations.is_empty());
    }

    #[test]
    fn conflicting_slot_keeps_the_stronger_diff() {
        // A missing note (error) and an extra note (warn) at the same
        // measure/beat/voice: the error wins.
        let plan = generate_plan(
            &report_with(vec![extra_note(1, 4.0, 81), missing_note(1, 4.0)]),
            8,
        )
        .unwrap();
        assert_eq!(plan.operations.len(), 1);
        assert_eq!(plan.operations[0].kind, PatchOpKind::DeleteNote);
    }

    #[test]
    fn operations_sort_by_measure_beat_op_id() {
        let plan = generate_plan(
            &report_with(vec![
                missing_note(3, 1.0),
                extra_note(1, 2.0, 72),
                missing_note(1, 1.0),
            ]),
            8,
        )
        .unwrap();
        let positions: Vec<(u32, f64)> =
            plan.operations.iter().map(|op| (op.measure, op.beat)).collect();
        assert_eq!(positions, vec![(1, 1.0), (1, 2.0), (3, 1.0)]);
    }

    #[test]
    fn op_ids_are_stable_and_well_formed() {
        let report = report_with(vec![missing_note(1, 1.0), extra_note(2, 2.0, 72)]);
        let plan = generate_plan(&report, 8).unwrap();
        for op in &plan.operations {
            assert!(op.op_id.starts_with("op-"));
            assert_eq!(op.op_id.len(), 15);
            assert!(op.op_id[3..].chars().all(|c| c.is_ascii_hexdigit()));
        }
        let again = generate_plan(&report, 8).unwrap();
        assert_eq!(plan, again);
    }

    #[test]
    fn planning_is_deterministic_byte_for_byte() {
        let report = report_with(vec![
            missing_note(1, 1.0),
            extra_note(1, 2.0, 72),
            missing_note(2, 1.0),
        ]);
        let a = serde_json::to_string(&generate_plan(&report, 8).unwrap()).unwrap();
        let b = serde_json::to_string(&generate_plan(&report, 8).unwrap()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn threshold_filtering_is_monotonic() {
        let mut medium = missing_note(1, 1.0);
        medium.confidence = 0.85;
        let mut high = missing_note(2, 1.0);
        high.confidence = 0.95;
        let report = report_with(vec![medium, high]);

        let strict = plan_with_threshold(&report, 8, 0.9);
        let loose = plan_with_threshold(&report, 8, 0.8);
        // Every operation that passed the stricter threshold survives the
        // looser one.
        for op in &strict.operations {
            assert!(loose.operations.contains(op));
        }
        assert_eq!(strict.operations.len(), 1);
        assert_eq!(loose.operations.len(), 2);
    }
}
