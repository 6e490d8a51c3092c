//! Data models for scorepatch.
//!
//! This module contains all core data structures used throughout the
//! pipeline:
//! - Enums for tempo sources, diff kinds, severities, patch operation kinds
//! - Event structures (score events, MIDI events, tempo events, metadata)
//! - Report structures (aligned pairs, alignment summary, diffs, diff report)
//! - Patch structures (operations, params, plans)

mod enums;
mod events;
mod patch;
mod report;

// Re-export all public types
pub use enums::{ConfidenceTier, DiffKind, FeatureKind, PatchOpKind, Severity, TempoSource};
pub use events::{MidiEvent, MidiMetadata, ScoreEvent, ScoreMetadata, TempoEvent};
pub use patch::{DiffRef, PatchOperation, PatchParams, PatchPlan};
pub use report::{
    AlignedPair, AlignmentSummary, Diff, DiffDetail, DiffReport, UnsupportedFeature,
};
