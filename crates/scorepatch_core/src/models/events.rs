//! Event structures produced by the score and performance readers.

use serde::{Deserialize, Serialize};

/// A note event extracted from notation.
///
/// A tie chain of N notes contributes N individual events plus exactly one
/// synthetic merged event whose `logical_duration` is the chain's summed
/// duration and whose `tie_start`, `tie_end` and `is_logical_merged` flags
/// are all set. Alignment uses individual events for non-tied notes and the
/// single merged event for any tied chain, never both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreEvent {
    /// Measure number (0 for a pickup measure).
    pub measure: u32,
    /// Beat within the measure, 1-indexed.
    pub beat: f64,
    /// MIDI pitch number, the only pitch used for comparison.
    pub pitch_midi: u8,
    /// Notated spelling, e.g. "C#4". Display only, never compared.
    pub pitch_spelled: String,
    /// Duration of this individual note in beats.
    pub duration: f64,
    /// Duration including tied continuations, in beats.
    ///
    /// Equals `duration` unless this event represents a tie chain.
    pub logical_duration: f64,
    /// Voice number, 1-indexed.
    pub voice: u32,
    /// This note starts (or continues into) a tie.
    pub tie_start: bool,
    /// This note ends (or continues out of) a tie.
    pub tie_end: bool,
    /// True for the synthetic event representing a whole tie chain.
    pub is_logical_merged: bool,
}

impl ScoreEvent {
    /// Whether this event is an individual member of a tie chain, as
    /// opposed to the merged representative.
    pub fn is_tie_member(&self) -> bool {
        (self.tie_start || self.tie_end) && !self.is_logical_merged
    }
}

/// A note event extracted from a recorded performance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MidiEvent {
    /// Start time in seconds.
    pub start_sec: f64,
    /// End time in seconds, always greater than `start_sec`.
    pub end_sec: f64,
    /// MIDI pitch number.
    pub pitch: u8,
    /// Note-on velocity.
    pub velocity: u8,
    /// MIDI channel (0-15).
    pub channel: u8,
}

impl MidiEvent {
    /// Sounding duration in seconds, always positive.
    pub fn duration_sec(&self) -> f64 {
        self.end_sec - self.start_sec
    }
}

/// One point of a piecewise-constant tempo map.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TempoEvent {
    /// Time of the tempo change in seconds.
    pub time_sec: f64,
    /// Tempo from this point on, in beats per minute.
    pub tempo_bpm: f64,
}

/// Metadata extracted from the notation document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreMetadata {
    /// Number of measures in the score (pickup excluded from numbering).
    pub total_measures: u32,
    /// Notated metronome mark, if the score carries one.
    pub tempo_bpm: Option<f64>,
    /// First time signature as (beats per measure, beat unit).
    pub time_signature: (u32, u32),
    /// Time signature changes after the first, as (measure, signature).
    #[serde(default)]
    pub time_signature_changes: Vec<(u32, (u32, u32))>,
    /// Whether the score opens with a pickup measure.
    pub has_pickup: bool,
    /// Length of the pickup measure in beats (0 when there is none).
    pub pickup_beats: f64,
    /// Smallest notated note duration in beats, for tolerance scaling.
    pub smallest_notated_duration: f64,
    /// Work title, if present.
    pub title: Option<String>,
    /// Name of the part the events were read from.
    pub part_name: Option<String>,
}

/// Metadata extracted from the performance file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MidiMetadata {
    /// Whether the file carries any tempo changes.
    pub has_tempo_map: bool,
    /// Tempo map ordered by time, deduplicated by time (last wins).
    #[serde(default)]
    pub tempo_events: Vec<TempoEvent>,
    /// Tempo in effect at time zero.
    pub initial_tempo_bpm: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn midi_event_duration_is_positive() {
        let ev = MidiEvent {
            start_sec: 0.5,
            end_sec: 1.25,
            pitch: 60,
            velocity: 80,
            channel: 0,
        };
        assert!((ev.duration_sec() - 0.75).abs() < 1e-9);
    }

    #[test]
    fn tie_member_excludes_merged_representative() {
        let individual = ScoreEvent {
            measure: 1,
            beat: 1.0,
            pitch_midi: 60,
            pitch_spelled: "C4".to_string(),
            duration: 2.0,
            logical_duration: 2.0,
            voice: 1,
            tie_start: true,
            tie_end: false,
            is_logical_merged: false,
        };
        let merged = ScoreEvent {
            logical_duration: 4.0,
            tie_end: true,
            is_logical_merged: true,
            ..individual.clone()
        };
        assert!(individual.is_tie_member());
        assert!(!merged.is_tie_member());
    }
}
