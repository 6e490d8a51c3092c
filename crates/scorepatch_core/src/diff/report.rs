//! Diff report assembly.

use chrono::Utc;

use crate::models::{
    AlignmentSummary, Diff, DiffReport, ScoreMetadata, UnsupportedFeature,
};

/// Assemble the final report for JSON output.
///
/// `alignment_summary`, `unsupported_features` and `warnings` are always
/// emitted, even when empty; `tempo_bpm_used` is the tempo the alignment
/// actually ran with, which may differ from the notated one.
#[allow(clippy::too_many_arguments)]
pub fn assemble_report(
    xml_path: &str,
    midi_path: &str,
    diffs: Vec<Diff>,
    metadata: &ScoreMetadata,
    alignment_summary: AlignmentSummary,
    unsupported_features: Vec<UnsupportedFeature>,
    warnings: Vec<String>,
    tempo_bpm_used: f64,
) -> DiffReport {
    DiffReport {
        source_xml: xml_path.to_string(),
        source_midi: midi_path.to_string(),
        timestamp: Utc::now().to_rfc3339(),
        tempo_bpm: tempo_bpm_used,
        total_measures: metadata.total_measures,
        alignment_summary,
        unsupported_features,
        diffs,
        warnings,
    }
}
