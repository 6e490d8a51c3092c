//! Diff classification: aligned pairs to typed discrepancies.

mod report;

pub use report::assemble_report;

use crate::align::AlignmentContext;
use crate::models::{
    AlignedPair, Diff, DiffDetail, DiffKind, Severity, UnsupportedFeature,
};

/// Duration comparison tolerance in beats, scaled to the score's smallest
/// notated value and capped at a quarter beat.
pub fn duration_tolerance(smallest_notated_duration: f64) -> f64 {
    (smallest_notated_duration / 2.0).min(0.25)
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// Classify aligned pairs and reported unsupported features into diffs.
///
/// The `context` carries the resolved tempo, time signature, measure count
/// and smallest notated duration from the alignment run; it is always
/// passed explicitly, never read from shared state.
///
/// A pair yields at most one pitch diff and at most one duration diff;
/// both can co-occur for the same pair.
pub fn classify(
    aligned_pairs: &[AlignedPair],
    unsupported_features: &[UnsupportedFeature],
    context: &AlignmentContext,
) -> Vec<Diff> {
    let tolerance = duration_tolerance(context.smallest_notated_duration);
    let beats_per_sec = context.tempo_bpm / 60.0;
    let beats_per_measure = f64::from(context.time_signature.0);

    let mut diffs: Vec<Diff> = Vec::new();

    for pair in aligned_pairs {
        match (&pair.score_event, &pair.midi_event) {
            // In the score but not in the performance.
            (Some(score_event), None) => {
                diffs.push(Diff {
                    kind: DiffKind::MissingNote,
                    measure: score_event.measure,
                    beat: score_event.beat,
                    confidence: 1.0,
                    severity: Severity::Error,
                    reason: "no_matching_midi_event".to_string(),
                    suggestion: format!(
                        "Note {} at m.{} beat {:.1} not found in MIDI",
                        score_event.pitch_spelled, score_event.measure, score_event.beat
                    ),
                    detail: DiffDetail::MissingNote {
                        pitch_midi: score_event.pitch_midi,
                        pitch_spelled: score_event.pitch_spelled.clone(),
                        duration: score_event.duration,
                    },
                });
            }

            // In the performance but not in the score. The reported
            // position is reconstructed from the start time at the
            // resolved tempo, then clamped into the score's range.
            (None, Some(midi_event)) => {
                let total_beats = midi_event.start_sec * beats_per_sec;
                let measure = ((total_beats / beats_per_measure).floor() as i64 + 1)
                    .clamp(0, i64::from(context.total_measures))
                    as u32;
                let beat = (total_beats % beats_per_measure + 1.0).max(1.0);

                diffs.push(Diff {
                    kind: DiffKind::ExtraNote,
                    measure,
                    beat,
                    confidence: 1.0,
                    severity: Severity::Warn,
                    reason: "no_matching_score_event".to_string(),
                    suggestion: format!(
                        "MIDI pitch {} at ~m.{} not in score",
                        midi_event.pitch, measure
                    ),
                    detail: DiffDetail::ExtraNote {
                        pitch: midi_event.pitch,
                        duration_sec: midi_event.duration_sec(),
                        velocity: midi_event.velocity,
                    },
                });
            }

            // Both present: check pitch, then duration.
            (Some(score_event), Some(midi_event)) => {
                // Matching is per pitch group, so this fires only for
                // hand-built pairs; comparison is strictly numeric.
                if score_event.pitch_midi != midi_event.pitch {
                    diffs.push(Diff {
                        kind: DiffKind::PitchMismatch,
                        measure: score_event.measure,
                        beat: score_event.beat,
                        confidence: pair.confidence,
                        severity: Severity::Error,
                        reason: "pitch_differs".to_string(),
                        suggestion: format!(
                            "Expected {} (MIDI {}), got {}",
                            score_event.pitch_spelled,
                            score_event.pitch_midi,
                            midi_event.pitch
                        ),
                        detail: DiffDetail::PitchMismatch {
                            expected_pitch: score_event.pitch_midi,
                            expected_spelled: score_event.pitch_spelled.clone(),
                            observed_pitch: midi_event.pitch,
                            expected_duration: None,
                        },
                    });
                }

                // Tied notes compare against the chain's logical duration.
                let midi_duration_beats = midi_event.duration_sec() * beats_per_sec;
                let expected_duration = score_event.logical_duration;
                let gap = (midi_duration_beats - expected_duration).abs();

                if gap > tolerance {
                    let has_tie = score_event.tie_start || score_event.tie_end;
                    let (kind, reason) = if has_tie {
                        (DiffKind::DurationMismatchTie, "tie_merge")
                    } else {
                        (DiffKind::DurationMismatch, "duration_differs")
                    };
                    let severity = if gap < tolerance * 2.0 {
                        Severity::Warn
                    } else {
                        Severity::Error
                    };

                    diffs.push(Diff {
                        kind,
                        measure: score_event.measure,
                        beat: score_event.beat,
                        confidence: pair.confidence,
                        severity,
                        reason: reason.to_string(),
                        suggestion: format!(
                            "m.{} beat {:.1}: notated {} beats, performed ~{:.2} beats",
                            score_event.measure,
                            score_event.beat,
                            expected_duration,
                            midi_duration_beats
                        ),
                        detail: DiffDetail::DurationMismatch {
                            pitch_midi: score_event.pitch_midi,
                            pitch_spelled: score_event.pitch_spelled.clone(),
                            expected_duration,
                            has_tie,
                            observed_pitch: midi_event.pitch,
                            observed_beats: round3(midi_duration_beats),
                            observed_sec: round3(midi_event.duration_sec()),
                        },
                    });
                }
            }

            // AlignedPair construction never produces this.
            (None, None) => {}
        }
    }

    for feature in unsupported_features {
        diffs.push(Diff {
            kind: DiffKind::UnsupportedFeature,
            measure: feature.measure,
            beat: 1.0,
            confidence: 0.5,
            severity: Severity::Info,
            reason: format!("unsupported_{}", feature.feature.as_str()),
            suggestion: format!("m.{}: {}", feature.measure, feature.description),
            detail: DiffDetail::UnsupportedFeature {
                feature: feature.feature,
                description: feature.description.clone(),
            },
        });
    }

    tracing::debug!(diffs = diffs.len(), "classification complete");
    diffs
}
