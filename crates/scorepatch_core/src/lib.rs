//! scorepatch core - score/performance comparison and repair.
//!
//! This crate contains the whole pipeline with no CLI dependencies:
//! a MusicXML score reader, an SMF performance reader, the beat-grid
//! aligner, the diff classifier, and the patch planner/applier that
//! edits the score toward the performance under safety invariants.
//!
//! The pipeline is single-threaded and deterministic end to end: every
//! stage's output is an explicit value handed to the next stage, and all
//! iteration orders are fixed (ascending pitch, then ascending absolute
//! beat). Independent runs share no state and may execute concurrently.

pub mod align;
pub mod config;
pub mod diff;
pub mod logging;
pub mod midi;
pub mod models;
pub mod musicxml;
pub mod repair;
pub mod tempo;
pub mod validate;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_returns_value() {
        assert!(!version().is_empty());
    }
}
