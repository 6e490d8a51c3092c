//! Performance reading: Standard MIDI Files to alignment input.
//!
//! Decodes an SMF with `midly`, extracts the tempo map (sorted by tick,
//! deduplicated per tick with the last value winning), pairs note-on/off
//! messages per pitch and channel, and converts tick times to seconds by
//! integrating the tempo map.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

use midly::{MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};

use crate::models::{MidiEvent, MidiMetadata, TempoEvent};

/// Tempo assumed before the first tempo event, per the SMF default.
const FALLBACK_TEMPO_BPM: f64 = 120.0;

/// Errors that can occur reading a performance file.
#[derive(Debug, thiserror::Error)]
pub enum MidiError {
    /// Input file does not exist.
    #[error("MIDI file not found: {0}")]
    NotFound(PathBuf),

    /// Failed to read the input file.
    #[error("Failed to read file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The file is not a valid Standard MIDI File.
    #[error("Failed to parse MIDI: {0}")]
    Malformed(String),
}

impl MidiError {
    /// Machine-readable error code for CLI reporting.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "E_NOT_FOUND",
            Self::ReadError { .. } => "E_IO",
            Self::Malformed(_) => "E_MIDI_PARSE",
        }
    }
}

/// Result type for performance reading.
pub type MidiResult<T> = Result<T, MidiError>;

/// Read and parse a Standard MIDI File from disk.
pub fn read_midi(path: &Path) -> MidiResult<(Vec<MidiEvent>, MidiMetadata)> {
    if !path.exists() {
        return Err(MidiError::NotFound(path.to_path_buf()));
    }
    let bytes = std::fs::read(path).map_err(|source| MidiError::ReadError {
        path: path.to_path_buf(),
        source,
    })?;
    parse_midi(&bytes)
}

/// Parse SMF bytes into performance events and metadata.
pub fn parse_midi(bytes: &[u8]) -> MidiResult<(Vec<MidiEvent>, MidiMetadata)> {
    let smf = Smf::parse(bytes).map_err(|e| MidiError::Malformed(e.to_string()))?;

    // SMPTE division encodes wall-clock ticks; tempo events do not apply.
    let timing = match smf.header.timing {
        Timing::Metrical(ticks) => TickTiming::Metrical {
            ticks_per_beat: f64::from(ticks.as_int()),
        },
        Timing::Timecode(fps, subframe) => TickTiming::Timecode {
            ticks_per_sec: f64::from(fps.as_f32()) * f64::from(subframe),
        },
    };

    // First pass: tempo map in ticks, across all tracks.
    let mut tempo_ticks: Vec<(u64, f64)> = Vec::new();
    if matches!(timing, TickTiming::Metrical { .. }) {
        for track in &smf.tracks {
            let mut abs_ticks: u64 = 0;
            for event in track {
                abs_ticks += u64::from(event.delta.as_int());
                if let TrackEventKind::Meta(MetaMessage::Tempo(us_per_beat)) = event.kind {
                    let bpm = 60_000_000.0 / f64::from(us_per_beat.as_int());
                    tempo_ticks.push((abs_ticks, bpm));
                }
            }
        }
        tempo_ticks.sort_by_key(|(tick, _)| *tick);
        tempo_ticks = dedupe_tempo_ticks(tempo_ticks);
    }

    let tempo_events = tempo_ticks_to_events(&tempo_ticks, &timing);
    let has_tempo_map = !tempo_ticks.is_empty();
    let initial_tempo_bpm = match tempo_ticks.first() {
        Some((0, bpm)) => *bpm,
        _ => FALLBACK_TEMPO_BPM,
    };

    // Second pass: pair note-on/off per (pitch, channel) per track.
    let mut events: Vec<MidiEvent> = Vec::new();
    for track in &smf.tracks {
        let mut abs_ticks: u64 = 0;
        let mut active: HashMap<(u8, u8), (f64, u8)> = HashMap::new();

        for event in track {
            abs_ticks += u64::from(event.delta.as_int());
            let time_sec = ticks_to_seconds(abs_ticks, &timing, &tempo_ticks);

            if let TrackEventKind::Midi { channel, message } = event.kind {
                let channel = channel.as_int();
                match message {
                    MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
                        active.insert((key.as_int(), channel), (time_sec, vel.as_int()));
                    }
                    MidiMessage::NoteOff { key, .. }
                    | MidiMessage::NoteOn { key, vel: _ } => {
                        if let Some((start_sec, velocity)) =
                            active.remove(&(key.as_int(), channel))
                        {
                            // Zero-length notes are clamped to a millisecond.
                            let end_sec = if time_sec <= start_sec {
                                start_sec + 0.001
                            } else {
                                time_sec
                            };
                            events.push(MidiEvent {
                                start_sec,
                                end_sec,
                                pitch: key.as_int(),
                                velocity,
                                channel,
                            });
                        }
                    }
                    _ => {}
                }
            }
        }
    }

    events.sort_by(|a, b| {
        a.start_sec
            .total_cmp(&b.start_sec)
            .then_with(|| a.pitch.cmp(&b.pitch))
    });

    tracing::debug!(
        events = events.len(),
        tempo_points = tempo_events.len(),
        has_tempo_map,
        "midi parsed"
    );

    let metadata = MidiMetadata {
        has_tempo_map,
        tempo_events,
        initial_tempo_bpm,
    };
    Ok((events, metadata))
}

enum TickTiming {
    Metrical { ticks_per_beat: f64 },
    Timecode { ticks_per_sec: f64 },
}

/// Keep the last tempo value at each tick.
fn dedupe_tempo_ticks(sorted: Vec<(u64, f64)>) -> Vec<(u64, f64)> {
    let mut deduped: Vec<(u64, f64)> = Vec::with_capacity(sorted.len());
    for (tick, bpm) in sorted {
        match deduped.last_mut() {
            Some((last_tick, last_bpm)) if *last_tick == tick => *last_bpm = bpm,
            _ => deduped.push((tick, bpm)),
        }
    }
    deduped
}

/// Convert the tick-based tempo map to wall-clock tempo events.
fn tempo_ticks_to_events(tempo_ticks: &[(u64, f64)], timing: &TickTiming) -> Vec<TempoEvent> {
    let TickTiming::Metrical { ticks_per_beat } = timing else {
        return Vec::new();
    };

    let mut events: Vec<TempoEvent> = Vec::with_capacity(tempo_ticks.len());
    let mut prev_tick: u64 = 0;
    let mut prev_bpm = FALLBACK_TEMPO_BPM;
    let mut elapsed_sec = 0.0;

    for (tick, bpm) in tempo_ticks {
        let delta_ticks = tick - prev_tick;
        if delta_ticks > 0 {
            elapsed_sec += delta_ticks as f64 * 60.0 / (prev_bpm * ticks_per_beat);
        }
        events.push(TempoEvent {
            time_sec: elapsed_sec,
            tempo_bpm: *bpm,
        });
        prev_tick = *tick;
        prev_bpm = *bpm;
    }

    events
}

/// Convert absolute ticks to seconds, integrating the tempo map.
fn ticks_to_seconds(ticks: u64, timing: &TickTiming, tempo_ticks: &[(u64, f64)]) -> f64 {
    let ticks_per_beat = match timing {
        TickTiming::Metrical { ticks_per_beat } => *ticks_per_beat,
        TickTiming::Timecode { ticks_per_sec } => return ticks as f64 / ticks_per_sec,
    };

    let mut prev_tick: u64 = 0;
    let mut prev_bpm = FALLBACK_TEMPO_BPM;
    let mut elapsed_sec = 0.0;

    for (tick, bpm) in tempo_ticks {
        if ticks <= *tick {
            break;
        }
        elapsed_sec += (tick - prev_tick) as f64 * 60.0 / (prev_bpm * ticks_per_beat);
        prev_tick = *tick;
        prev_bpm = *bpm;
    }

    if ticks > prev_tick {
        elapsed_sec += (ticks - prev_tick) as f64 * 60.0 / (prev_bpm * ticks_per_beat);
    }

    elapsed_sec
}
