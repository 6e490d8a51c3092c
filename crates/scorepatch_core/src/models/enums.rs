//! Enumerations shared across the pipeline.

use serde::{Deserialize, Serialize};

/// Which authority supplied the tempo used for alignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TempoSource {
    /// Tempo taken from the notated metronome mark.
    Musicxml,
    /// Tempo taken from the performance's tempo map.
    MidiTempoMap,
    /// Tempo supplied explicitly by the caller.
    Override,
    /// No tempo information anywhere; constant 120 BPM assumed.
    #[serde(rename = "default_120")]
    Default120,
}

impl TempoSource {
    /// Stable string form, matching the serialized value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Musicxml => "musicxml",
            Self::MidiTempoMap => "midi_tempo_map",
            Self::Override => "override",
            Self::Default120 => "default_120",
        }
    }
}

/// Overall alignment quality tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceTier {
    High,
    Medium,
    Low,
}

impl ConfidenceTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

/// Kind of discrepancy between score and performance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffKind {
    DurationMismatch,
    DurationMismatchTie,
    MissingNote,
    ExtraNote,
    PitchMismatch,
    UnsupportedFeature,
}

impl DiffKind {
    /// Stable string form, matching the serialized value.
    ///
    /// Also used as the tiebreak component of planner priority tuples, so
    /// the ordering of kinds is the lexicographic ordering of these strings.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DurationMismatch => "duration_mismatch",
            Self::DurationMismatchTie => "duration_mismatch_tie",
            Self::MissingNote => "missing_note",
            Self::ExtraNote => "extra_note",
            Self::PitchMismatch => "pitch_mismatch",
            Self::UnsupportedFeature => "unsupported_feature",
        }
    }
}

/// Severity of a diff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warn,
    Error,
}

impl Severity {
    /// Numeric rank for priority comparisons (error > warn > info).
    pub fn rank(&self) -> u8 {
        match self {
            Self::Info => 0,
            Self::Warn => 1,
            Self::Error => 2,
        }
    }
}

/// Notation feature the pipeline detects but does not resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureKind {
    Tuplet,
    GraceNote,
    Tremolo,
    Fermata,
    MultiVoice,
    TimeSigChange,
    KeySigChange,
    CueNote,
}

impl FeatureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tuplet => "tuplet",
            Self::GraceNote => "grace_note",
            Self::Tremolo => "tremolo",
            Self::Fermata => "fermata",
            Self::MultiVoice => "multi_voice",
            Self::TimeSigChange => "time_sig_change",
            Self::KeySigChange => "key_sig_change",
            Self::CueNote => "cue_note",
        }
    }

    /// Whether this feature undermines the beat grid badly enough to force
    /// the alignment tier to low.
    pub fn is_significant(&self) -> bool {
        matches!(self, Self::TimeSigChange | Self::KeySigChange)
    }
}

/// Kind of edit a patch operation performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatchOpKind {
    InsertNote,
    DeleteNote,
    UpdateDuration,
    UpdatePitch,
    Noop,
}

impl PatchOpKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InsertNote => "insert_note",
            Self::DeleteNote => "delete_note",
            Self::UpdateDuration => "update_duration",
            Self::UpdatePitch => "update_pitch",
            Self::Noop => "noop",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tempo_source_serializes_to_contract_strings() {
        let json = serde_json::to_string(&TempoSource::Default120).unwrap();
        assert_eq!(json, "\"default_120\"");
        let json = serde_json::to_string(&TempoSource::MidiTempoMap).unwrap();
        assert_eq!(json, "\"midi_tempo_map\"");
    }

    #[test]
    fn severity_ranks_order_correctly() {
        assert!(Severity::Error.rank() > Severity::Warn.rank());
        assert!(Severity::Warn.rank() > Severity::Info.rank());
    }

    #[test]
    fn diff_kind_roundtrips_through_json() {
        for kind in [
            DiffKind::DurationMismatch,
            DiffKind::DurationMismatchTie,
            DiffKind::MissingNote,
            DiffKind::ExtraNote,
            DiffKind::PitchMismatch,
            DiffKind::UnsupportedFeature,
        ] {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
            let back: DiffKind = serde_json::from_str(&json).unwrap();
            assert_eq!(back, kind);
        }
    }
}
