//! MusicXML support: score reading and the mutable document model.
//!
//! This module provides:
//! - A score reader producing the events, metadata and unsupported-feature
//!   list the alignment pipeline consumes
//! - A mutable document model with measure-level note/rest editing,
//!   hand-written serialization, and guaranteed re-parseability
//! - Pitch spelling helpers (MIDI number to step/alter/octave and back)

mod document;
mod pitch;
mod score_reader;

pub use document::{
    ElementKind, Measure, Note, Part, ScoreDocument, TimedElement, DURATION_EPS, OFFSET_EPS,
};
pub use pitch::{midi_to_spelling, spelled_name, spelling_to_midi};
pub use score_reader::{parse_score, read_score, ParsedScore};

use std::io;
use std::path::PathBuf;

/// Errors that can occur reading or writing notation documents.
#[derive(Debug, thiserror::Error)]
pub enum ScoreError {
    /// Input file does not exist.
    #[error("MusicXML file not found: {0}")]
    NotFound(PathBuf),

    /// Failed to read the input file.
    #[error("Failed to read file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to write the output file.
    #[error("Failed to write file '{path}': {source}")]
    WriteError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The document is not well-formed MusicXML.
    #[error("Failed to parse MusicXML: {0}")]
    Malformed(String),

    /// The document contains no parts to read.
    #[error("No parts found in MusicXML")]
    NoParts,
}

impl ScoreError {
    /// Machine-readable error code for CLI reporting.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "E_NOT_FOUND",
            Self::ReadError { .. } | Self::WriteError { .. } => "E_IO",
            Self::Malformed(_) | Self::NoParts => "E_XML_PARSE",
        }
    }
}

/// Result type for notation operations.
pub type ScoreResult<T> = Result<T, ScoreError>;
