//! Tempo resolution and beat-grid conversions.
//!
//! The resolver picks the authoritative tempo source for a comparison run
//! and converts between performance time (seconds) and the score's absolute
//! beat timeline, including piecewise tempo-map integration and the pickup
//! offset.

use crate::models::{MidiMetadata, ScoreMetadata, TempoEvent, TempoSource};

/// Tempo assumed when neither score, performance nor caller supplies one.
pub const DEFAULT_TEMPO_BPM: f64 = 120.0;

/// Resolved tempo context for one comparison run.
///
/// Source priority: explicit override > MIDI tempo map > notated tempo >
/// constant 120 BPM default.
#[derive(Debug, Clone)]
pub struct TempoResolver {
    tempo_bpm: f64,
    source: TempoSource,
    /// Tempo map, ordered by time and deduplicated by time (last wins).
    /// Consulted only when the map is the resolved source.
    tempo_events: Vec<TempoEvent>,
    beats_per_measure: f64,
    has_pickup: bool,
    pickup_beats: f64,
}

impl TempoResolver {
    /// Select the tempo source and build the conversion context.
    pub fn resolve(
        score: &ScoreMetadata,
        midi: &MidiMetadata,
        tempo_override: Option<f64>,
    ) -> Self {
        let (tempo_bpm, source) = if let Some(bpm) = tempo_override {
            (bpm, TempoSource::Override)
        } else if midi.has_tempo_map && !midi.tempo_events.is_empty() {
            let bpm = if midi.initial_tempo_bpm > 0.0 {
                midi.initial_tempo_bpm
            } else {
                score.tempo_bpm.unwrap_or(DEFAULT_TEMPO_BPM)
            };
            (bpm, TempoSource::MidiTempoMap)
        } else if let Some(bpm) = score.tempo_bpm.filter(|bpm| *bpm > 0.0) {
            (bpm, TempoSource::Musicxml)
        } else {
            (DEFAULT_TEMPO_BPM, TempoSource::Default120)
        };

        let tempo_events = if source == TempoSource::MidiTempoMap {
            normalize_tempo_map(&midi.tempo_events)
        } else {
            Vec::new()
        };

        tracing::debug!(
            tempo_bpm,
            source = source.as_str(),
            map_points = tempo_events.len(),
            "resolved tempo"
        );

        Self {
            tempo_bpm,
            source,
            tempo_events,
            beats_per_measure: f64::from(score.time_signature.0),
            has_pickup: score.has_pickup,
            pickup_beats: score.pickup_beats,
        }
    }

    /// The tempo actually used for flat conversions, in BPM.
    pub fn tempo_bpm(&self) -> f64 {
        self.tempo_bpm
    }

    /// Which authority supplied the tempo.
    pub fn source(&self) -> TempoSource {
        self.source
    }

    /// Beats per measure of the governing time signature.
    pub fn beats_per_measure(&self) -> f64 {
        self.beats_per_measure
    }

    /// Convert a time in seconds to beats from time zero.
    ///
    /// With a tempo map, beats accumulate segment by segment at each
    /// segment's tempo; the resolved flat tempo applies before the first
    /// map point. Without a map this is a flat conversion.
    pub fn seconds_to_beats(&self, time_sec: f64) -> f64 {
        if self.tempo_events.is_empty() {
            return time_sec * self.tempo_bpm / 60.0;
        }

        let mut total_beats = 0.0;
        let mut prev_time = 0.0;
        let mut prev_tempo = self.tempo_bpm;

        for event in &self.tempo_events {
            if time_sec <= event.time_sec {
                break;
            }
            total_beats += (event.time_sec - prev_time) * (prev_tempo / 60.0);
            prev_time = event.time_sec;
            prev_tempo = event.tempo_bpm;
        }

        if time_sec > prev_time {
            total_beats += (time_sec - prev_time) * (prev_tempo / 60.0);
        }

        total_beats
    }

    /// Convert a duration in seconds to beats at the resolved flat tempo.
    pub fn duration_sec_to_beats(&self, duration_sec: f64) -> f64 {
        duration_sec * self.tempo_bpm / 60.0
    }

    /// Offset subtracted from performance beats so that a pickup and the
    /// first full measure share one absolute timeline.
    fn pickup_offset(&self) -> f64 {
        if self.has_pickup && self.pickup_beats > 0.0 {
            self.beats_per_measure - self.pickup_beats
        } else {
            0.0
        }
    }

    /// Convert a performance time to an absolute beat position.
    pub fn midi_time_to_absolute_beat(&self, time_sec: f64) -> f64 {
        self.seconds_to_beats(time_sec) - self.pickup_offset()
    }

    /// Convert a score position (measure, 1-indexed beat) to an absolute
    /// beat position.
    ///
    /// Measure 1 beat 1.0 maps to 0.0. Pickup beats (measure 0) land at
    /// negative positions so they precede the first full measure.
    pub fn score_to_absolute_beat(&self, measure: u32, beat: f64) -> f64 {
        if measure == 0 {
            return (beat - 1.0) - (self.beats_per_measure - self.pickup_beats);
        }
        f64::from(measure - 1) * self.beats_per_measure + (beat - 1.0)
    }
}

/// Sort a tempo map by time and drop duplicate times, keeping the last
/// value at each time.
fn normalize_tempo_map(events: &[TempoEvent]) -> Vec<TempoEvent> {
    let mut sorted: Vec<TempoEvent> = events.to_vec();
    sorted.sort_by(|a, b| a.time_sec.total_cmp(&b.time_sec));

    let mut deduped: Vec<TempoEvent> = Vec::with_capacity(sorted.len());
    for event in sorted {
        match deduped.last_mut() {
            Some(last) if last.time_sec == event.time_sec => *last = event,
            _ => deduped.push(event),
        }
    }
    deduped
}
