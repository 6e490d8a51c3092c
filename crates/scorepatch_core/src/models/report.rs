//! Report structures: aligned pairs, diffs, and the diff report artifact.
//!
//! Diff detail is a typed union per diff kind. At the JSON boundary it is
//! flattened into the open `expected`/`observed` key-value maps of the
//! report format, and unknown keys survive a round trip untouched.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::enums::{ConfidenceTier, DiffKind, FeatureKind, Severity, TempoSource};
use super::events::{MidiEvent, ScoreEvent};

/// A matched (or half-matched) pair of score event and MIDI event.
///
/// Exactly one of the two sides may be absent, never both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignedPair {
    pub score_event: Option<ScoreEvent>,
    pub midi_event: Option<MidiEvent>,
    /// Match confidence in [0, 1]; 0 for one-sided pairs.
    pub confidence: f64,
    /// Alignment error in beats; 0 for one-sided pairs.
    pub beat_error: f64,
}

impl AlignedPair {
    /// Pair for a matched score/MIDI event couple.
    pub fn matched(
        score_event: ScoreEvent,
        midi_event: MidiEvent,
        confidence: f64,
        beat_error: f64,
    ) -> Self {
        Self {
            score_event: Some(score_event),
            midi_event: Some(midi_event),
            confidence,
            beat_error,
        }
    }

    /// Pair for a score event with no performance counterpart.
    pub fn score_only(score_event: ScoreEvent) -> Self {
        Self {
            score_event: Some(score_event),
            midi_event: None,
            confidence: 0.0,
            beat_error: 0.0,
        }
    }

    /// Pair for a performance event with no notated counterpart.
    pub fn midi_only(midi_event: MidiEvent) -> Self {
        Self {
            score_event: None,
            midi_event: Some(midi_event),
            confidence: 0.0,
            beat_error: 0.0,
        }
    }
}

/// Summary of alignment quality and the assumptions it was built on.
///
/// Always produced, even for empty inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignmentSummary {
    pub tempo_source: TempoSource,
    pub time_signature_map_used: bool,
    pub has_pickup: bool,
    pub pickup_beats: f64,
    pub alignment_confidence: ConfidenceTier,
    pub estimated_beat_error_mean: f64,
    pub estimated_beat_error_max: f64,
    pub midi_has_tempo_map: bool,
    /// Pedal analysis is not performed; always false.
    pub pedal_accounted_for: bool,
}

/// A notation feature detected but not fully supported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnsupportedFeature {
    pub feature: FeatureKind,
    pub measure: u32,
    pub description: String,
}

/// Typed detail payload of a diff, one variant per diff kind.
///
/// The `Opaque` variant carries payloads this implementation does not
/// recognize (forward compatibility at the serialized boundary).
#[derive(Debug, Clone, PartialEq)]
pub enum DiffDetail {
    MissingNote {
        pitch_midi: u8,
        pitch_spelled: String,
        duration: f64,
    },
    ExtraNote {
        pitch: u8,
        duration_sec: f64,
        velocity: u8,
    },
    PitchMismatch {
        expected_pitch: u8,
        expected_spelled: String,
        observed_pitch: u8,
        /// Notated duration, when the producer supplied one. Required for
        /// the planner to emit an update_pitch operation.
        expected_duration: Option<f64>,
    },
    DurationMismatch {
        pitch_midi: u8,
        pitch_spelled: String,
        /// Logical (post tie-merge) notated duration in beats.
        expected_duration: f64,
        has_tie: bool,
        observed_pitch: u8,
        observed_beats: f64,
        observed_sec: f64,
    },
    UnsupportedFeature {
        feature: FeatureKind,
        description: String,
    },
    Opaque {
        expected: Map<String, Value>,
        observed: Map<String, Value>,
    },
}

impl DiffDetail {
    /// The pitch the diff is primarily about: the expected (notated) pitch
    /// when there is one, else the observed pitch. Feeds op_id derivation.
    pub fn primary_pitch(&self) -> Option<u8> {
        match self {
            Self::MissingNote { pitch_midi, .. } => Some(*pitch_midi),
            Self::ExtraNote { pitch, .. } => Some(*pitch),
            Self::PitchMismatch { expected_pitch, .. } => Some(*expected_pitch),
            Self::DurationMismatch { pitch_midi, .. } => Some(*pitch_midi),
            Self::UnsupportedFeature { .. } => None,
            Self::Opaque { expected, observed } => get_u8(expected, "pitch_midi")
                .or_else(|| get_u8(observed, "pitch")),
        }
    }
}

/// A detected mismatch between score and performance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "DiffWire", from = "DiffWire")]
pub struct Diff {
    pub kind: DiffKind,
    /// 0 for pickup, 1+ for normal measures.
    pub measure: u32,
    /// Beat within the measure, 1-indexed.
    pub beat: f64,
    pub confidence: f64,
    pub severity: Severity,
    /// Machine reason code, e.g. "tie_merge".
    pub reason: String,
    /// Human-readable repair hint.
    pub suggestion: String,
    pub detail: DiffDetail,
}

/// Wire form of a diff: typed header plus open expected/observed maps.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct DiffWire {
    #[serde(rename = "type")]
    kind: DiffKind,
    measure: u32,
    beat: f64,
    #[serde(default)]
    expected: Map<String, Value>,
    #[serde(default)]
    observed: Map<String, Value>,
    confidence: f64,
    severity: Severity,
    reason: String,
    suggestion: String,
}

fn num(v: f64) -> Value {
    serde_json::Number::from_f64(v)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

fn get_u8(map: &Map<String, Value>, key: &str) -> Option<u8> {
    map.get(key)?.as_u64().and_then(|v| u8::try_from(v).ok())
}

fn get_f64(map: &Map<String, Value>, key: &str) -> Option<f64> {
    map.get(key)?.as_f64()
}

fn get_str(map: &Map<String, Value>, key: &str) -> Option<String> {
    map.get(key)?.as_str().map(str::to_string)
}

fn get_bool(map: &Map<String, Value>, key: &str) -> Option<bool> {
    map.get(key)?.as_bool()
}

impl From<Diff> for DiffWire {
    fn from(diff: Diff) -> Self {
        let mut expected = Map::new();
        let mut observed = Map::new();

        match diff.detail {
            DiffDetail::MissingNote {
                pitch_midi,
                pitch_spelled,
                duration,
            } => {
                expected.insert("pitch_midi".into(), pitch_midi.into());
                expected.insert("pitch_spelled".into(), pitch_spelled.into());
                expected.insert("duration".into(), num(duration));
            }
            DiffDetail::ExtraNote {
                pitch,
                duration_sec,
                velocity,
            } => {
                observed.insert("pitch".into(), pitch.into());
                observed.insert("duration_sec".into(), num(duration_sec));
                observed.insert("velocity".into(), velocity.into());
            }
            DiffDetail::PitchMismatch {
                expected_pitch,
                expected_spelled,
                observed_pitch,
                expected_duration,
            } => {
                expected.insert("pitch_midi".into(), expected_pitch.into());
                expected.insert("pitch_spelled".into(), expected_spelled.into());
                if let Some(duration) = expected_duration {
                    expected.insert("duration".into(), num(duration));
                }
                observed.insert("pitch".into(), observed_pitch.into());
            }
            DiffDetail::DurationMismatch {
                pitch_midi,
                pitch_spelled,
                expected_duration,
                has_tie,
                observed_pitch,
                observed_beats,
                observed_sec,
            } => {
                expected.insert("pitch_midi".into(), pitch_midi.into());
                expected.insert("pitch_spelled".into(), pitch_spelled.into());
                expected.insert("duration".into(), num(expected_duration));
                expected.insert("has_tie".into(), has_tie.into());
                observed.insert("pitch".into(), observed_pitch.into());
                observed.insert("duration_beats".into(), num(observed_beats));
                observed.insert("duration_sec".into(), num(observed_sec));
            }
            DiffDetail::UnsupportedFeature {
                feature,
                description,
            } => {
                expected.insert("feature".into(), feature.as_str().into());
                observed.insert("description".into(), description.into());
            }
            DiffDetail::Opaque {
                expected: e,
                observed: o,
            } => {
                expected = e;
                observed = o;
            }
        }

        Self {
            kind: diff.kind,
            measure: diff.measure,
            beat: diff.beat,
            expected,
            observed,
            confidence: diff.confidence,
            severity: diff.severity,
            reason: diff.reason,
            suggestion: diff.suggestion,
        }
    }
}

impl From<DiffWire> for Diff {
    fn from(wire: DiffWire) -> Self {
        let detail = detail_from_maps(wire.kind, &wire.expected, &wire.observed)
            .unwrap_or(DiffDetail::Opaque {
                expected: wire.expected,
                observed: wire.observed,
            });
        Self {
            kind: wire.kind,
            measure: wire.measure,
            beat: wire.beat,
            confidence: wire.confidence,
            severity: wire.severity,
            reason: wire.reason,
            suggestion: wire.suggestion,
            detail,
        }
    }
}

/// Try to lift the open maps into the typed detail for the given kind.
///
/// Returns None when a required field is missing; the caller falls back to
/// the opaque representation so unrecognized payloads still round-trip.
fn detail_from_maps(
    kind: DiffKind,
    expected: &Map<String, Value>,
    observed: &Map<String, Value>,
) -> Option<DiffDetail> {
    match kind {
        DiffKind::MissingNote => Some(DiffDetail::MissingNote {
            pitch_midi: get_u8(expected, "pitch_midi")?,
            pitch_spelled: get_str(expected, "pitch_spelled").unwrap_or_default(),
            duration: get_f64(expected, "duration")?,
        }),
        DiffKind::ExtraNote => Some(DiffDetail::ExtraNote {
            pitch: get_u8(observed, "pitch")?,
            duration_sec: get_f64(observed, "duration_sec")?,
            velocity: get_u8(observed, "velocity").unwrap_or(0),
        }),
        DiffKind::PitchMismatch => Some(DiffDetail::PitchMismatch {
            expected_pitch: get_u8(expected, "pitch_midi")?,
            expected_spelled: get_str(expected, "pitch_spelled").unwrap_or_default(),
            observed_pitch: get_u8(observed, "pitch")?,
            expected_duration: get_f64(expected, "duration"),
        }),
        DiffKind::DurationMismatch | DiffKind::DurationMismatchTie => {
            Some(DiffDetail::DurationMismatch {
                pitch_midi: get_u8(expected, "pitch_midi")?,
                pitch_spelled: get_str(expected, "pitch_spelled").unwrap_or_default(),
                expected_duration: get_f64(expected, "duration")?,
                has_tie: get_bool(expected, "has_tie")
                    .unwrap_or(kind == DiffKind::DurationMismatchTie),
                observed_pitch: get_u8(observed, "pitch")?,
                observed_beats: get_f64(observed, "duration_beats")?,
                observed_sec: get_f64(observed, "duration_sec").unwrap_or(0.0),
            })
        }
        DiffKind::UnsupportedFeature => {
            let feature_str = get_str(expected, "feature")?;
            let feature: FeatureKind =
                serde_json::from_value(Value::String(feature_str)).ok()?;
            Some(DiffDetail::UnsupportedFeature {
                feature,
                description: get_str(observed, "description").unwrap_or_default(),
            })
        }
    }
}

/// Complete output of a comparison run.
///
/// `alignment_summary`, `unsupported_features` and `warnings` are always
/// present, even when `diffs` is empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffReport {
    pub source_xml: String,
    pub source_midi: String,
    /// ISO-8601 UTC timestamp of report generation.
    pub timestamp: String,
    /// The tempo actually used for alignment.
    pub tempo_bpm: f64,
    pub total_measures: u32,
    pub alignment_summary: AlignmentSummary,
    #[serde(default)]
    pub unsupported_features: Vec<UnsupportedFeature>,
    #[serde(default)]
    pub diffs: Vec<Diff>,
    #[serde(default)]
    pub warnings: Vec<String>,
}
