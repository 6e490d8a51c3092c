//! Repair: patch planning and application.
//!
//! The planner turns a diff report into a deterministic, conflict-free
//! sequence of edit operations; the applier executes them against the
//! mutable document model under safety invariants (no structural
//! shifting, idempotence, guaranteed re-parseability).

mod applier;
mod planner;

pub use applier::{apply_plan, ApplyReport, OpOutcome, SkipReason};
pub use planner::{generate_plan, CONFIDENCE_THRESHOLD};

use crate::musicxml::ScoreError;
use crate::validate::ValidationError;

/// Errors that can occur planning or applying repairs.
///
/// Operational no-ops (already satisfied, target missing) are not
/// errors; they surface as [`SkipReason`] outcomes instead.
#[derive(Debug, thiserror::Error)]
pub enum RepairError {
    /// A generated or loaded artifact failed structural validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The mutated document no longer parses. Fatal for the whole apply
    /// call; no output may be written.
    #[error("Repaired document failed to re-parse: {source}")]
    ParseSurvival {
        #[source]
        source: ScoreError,
    },
}

impl RepairError {
    /// Machine-readable error code for CLI reporting.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(e) => e.code(),
            Self::ParseSurvival { .. } => "E_PARSE_SURVIVAL",
        }
    }
}

/// Result type for repair operations.
pub type RepairResult<T> = Result<T, RepairError>;
