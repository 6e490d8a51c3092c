//! Event alignment between score and performance.
//!
//! The matcher is a bipartite, per-pitch, greedy nearest-onset pairing: for
//! each notated pitch, score and performance events are sorted by absolute
//! beat and paired to the closest unconsumed counterpart within a constant
//! tolerance. It is deterministic and linear in practice but not globally
//! optimal - under contention a different processing order could change
//! which notes match. Exact optimal assignment is out of scope.
//!
//! Iteration order is fixed explicitly (ascending pitch, then ascending
//! absolute beat); no step depends on incidental container ordering.

use std::collections::BTreeMap;

use crate::models::{
    AlignedPair, AlignmentSummary, ConfidenceTier, MidiEvent, MidiMetadata, ScoreEvent,
    ScoreMetadata, TempoSource, UnsupportedFeature,
};
use crate::tempo::TempoResolver;

/// Maximum beat-position error for two events to be considered the same
/// note. Constant by contract.
pub const BEAT_ALIGNMENT_TOLERANCE: f64 = 0.125;

/// Tempo and measure context produced by an alignment run.
///
/// Threaded explicitly into diff classification; the pipeline keeps no
/// process-global state.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignmentContext {
    /// The tempo actually used, in BPM.
    pub tempo_bpm: f64,
    /// Which authority supplied the tempo.
    pub tempo_source: TempoSource,
    /// Governing time signature.
    pub time_signature: (u32, u32),
    /// Number of measures in the score.
    pub total_measures: u32,
    /// Smallest notated duration in beats, for tolerance scaling.
    pub smallest_notated_duration: f64,
}

/// Align performance events to score events on the beat grid.
///
/// Tied notes are matched through their single merged representative, so
/// each tie chain contributes exactly one duration-bearing event.
///
/// Returns the aligned pairs, a quality summary (always produced, even for
/// empty inputs), and the context for diff classification.
pub fn align(
    score_events: &[ScoreEvent],
    midi_events: &[MidiEvent],
    score_metadata: &ScoreMetadata,
    midi_metadata: &MidiMetadata,
    tempo_override: Option<f64>,
) -> (Vec<AlignedPair>, AlignmentSummary, AlignmentContext) {
    let resolver = TempoResolver::resolve(score_metadata, midi_metadata, tempo_override);

    // Group by pitch. BTreeMap gives the ascending pitch order the
    // algorithm requires.
    let mut score_by_pitch: BTreeMap<u8, Vec<&ScoreEvent>> = BTreeMap::new();
    for event in score_events {
        // Individual members of a tie chain are represented by the merged
        // event; matching both would double-count the chain.
        if event.is_tie_member() {
            continue;
        }
        score_by_pitch.entry(event.pitch_midi).or_default().push(event);
    }

    let mut midi_by_pitch: BTreeMap<u8, Vec<(&MidiEvent, f64)>> = BTreeMap::new();
    for event in midi_events {
        let abs_beat = resolver.midi_time_to_absolute_beat(event.start_sec);
        midi_by_pitch.entry(event.pitch).or_default().push((event, abs_beat));
    }

    for group in score_by_pitch.values_mut() {
        group.sort_by(|a, b| {
            resolver
                .score_to_absolute_beat(a.measure, a.beat)
                .total_cmp(&resolver.score_to_absolute_beat(b.measure, b.beat))
        });
    }
    for group in midi_by_pitch.values_mut() {
        group.sort_by(|a, b| a.1.total_cmp(&b.1));
    }

    let mut all_pitches: Vec<u8> = score_by_pitch.keys().copied().collect();
    for pitch in midi_by_pitch.keys() {
        if !score_by_pitch.contains_key(pitch) {
            all_pitches.push(*pitch);
        }
    }
    all_pitches.sort_unstable();

    let mut pairs: Vec<AlignedPair> = Vec::new();
    let mut beat_errors: Vec<f64> = Vec::new();

    for pitch in all_pitches {
        let score_group = score_by_pitch.get(&pitch).map(Vec::as_slice).unwrap_or(&[]);
        let midi_group = midi_by_pitch.get(&pitch).map(Vec::as_slice).unwrap_or(&[]);
        let mut midi_used = vec![false; midi_group.len()];

        for score_event in score_group {
            let score_beat =
                resolver.score_to_absolute_beat(score_event.measure, score_event.beat);

            // Nearest unconsumed onset within tolerance. The group is
            // sorted by absolute beat and the comparison is strict, so
            // ties on minimum error resolve to the earlier onset.
            let mut best: Option<(usize, f64)> = None;
            for (idx, (_, midi_beat)) in midi_group.iter().enumerate() {
                if midi_used[idx] {
                    continue;
                }
                let error = (midi_beat - score_beat).abs();
                if error <= BEAT_ALIGNMENT_TOLERANCE
                    && best.map_or(true, |(_, best_error)| error < best_error)
                {
                    best = Some((idx, error));
                }
            }

            match best {
                Some((idx, error)) => {
                    midi_used[idx] = true;
                    let confidence = (1.0 - error / BEAT_ALIGNMENT_TOLERANCE).max(0.0);
                    beat_errors.push(error);
                    pairs.push(AlignedPair::matched(
                        (*score_event).clone(),
                        midi_group[idx].0.clone(),
                        confidence,
                        error,
                    ));
                }
                None => pairs.push(AlignedPair::score_only((*score_event).clone())),
            }
        }

        for (idx, (midi_event, _)) in midi_group.iter().enumerate() {
            if !midi_used[idx] {
                pairs.push(AlignedPair::midi_only((*midi_event).clone()));
            }
        }
    }

    let (mean_error, max_error) = if beat_errors.is_empty() {
        (0.0, 0.0)
    } else {
        let sum: f64 = beat_errors.iter().sum();
        let max = beat_errors.iter().copied().fold(0.0, f64::max);
        (sum / beat_errors.len() as f64, max)
    };

    let alignment_confidence = if resolver.source() == TempoSource::Default120 {
        ConfidenceTier::Low
    } else if mean_error > BEAT_ALIGNMENT_TOLERANCE * 0.5 {
        ConfidenceTier::Medium
    } else {
        ConfidenceTier::High
    };

    tracing::debug!(
        pairs = pairs.len(),
        matched = beat_errors.len(),
        mean_error,
        max_error,
        tier = alignment_confidence.as_str(),
        "alignment complete"
    );

    let summary = AlignmentSummary {
        tempo_source: resolver.source(),
        time_signature_map_used: false,
        has_pickup: score_metadata.has_pickup,
        pickup_beats: score_metadata.pickup_beats,
        alignment_confidence,
        estimated_beat_error_mean: mean_error,
        estimated_beat_error_max: max_error,
        midi_has_tempo_map: midi_metadata.has_tempo_map,
        pedal_accounted_for: false,
    };

    let context = AlignmentContext {
        tempo_bpm: resolver.tempo_bpm(),
        tempo_source: resolver.source(),
        time_signature: score_metadata.time_signature,
        total_measures: score_metadata.total_measures,
        smallest_notated_duration: score_metadata.smallest_notated_duration,
    };

    (pairs, summary, context)
}

/// Demote the summary tier when notation features the aligner cannot model
/// are present: a time or key signature change invalidates the beat grid
/// (tier low); anything else caps the tier at medium.
pub fn downgrade_for_unsupported(
    summary: &mut AlignmentSummary,
    features: &[UnsupportedFeature],
) {
    if features.is_empty() {
        return;
    }
    if features.iter().any(|f| f.feature.is_significant()) {
        summary.alignment_confidence = ConfidenceTier::Low;
    } else if summary.alignment_confidence == ConfidenceTier::High {
        summary.alignment_confidence = ConfidenceTier::Medium;
    }
}
