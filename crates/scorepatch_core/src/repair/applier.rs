//! Patch application: score document mutation under safety invariants.
//!
//! Every operation resolves to an explicit outcome: applied, or skipped
//! with a reason. A skip is success with zero effect, never an error;
//! the single fatal condition is a mutated document that no longer
//! parses, which aborts the whole call before any output exists.

use crate::models::{PatchOpKind, PatchOperation, PatchPlan};
use crate::musicxml::{
    midi_to_spelling, ElementKind, Measure, Note, ScoreDocument, TimedElement, DURATION_EPS,
};
use crate::validate;

use super::{RepairError, RepairResult};

/// Why an operation was skipped rather than applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The operation is an explicit no-op.
    Noop,
    /// The targeted measure does not exist in the document.
    MeasureMissing,
    /// The operation's parameters do not describe a complete edit.
    MissingParams,
    /// An equivalent note already sits at the target offset.
    AlreadyPresent,
    /// No note matches the target offset and pitch.
    NoteMissing,
    /// The requested state already holds.
    AlreadyApplied,
    /// The edit would extend past the measure's capacity.
    WouldOverflow,
    /// Lengthening would overlap a later element in the voice.
    WouldOverlap,
}

/// Result of one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpOutcome {
    Applied,
    Skipped(SkipReason),
}

/// Per-operation outcomes of one apply run.
#[derive(Debug, Clone, PartialEq)]
pub struct ApplyReport {
    /// Outcomes in plan order, keyed by op_id.
    pub outcomes: Vec<(String, OpOutcome)>,
}

impl ApplyReport {
    /// Number of operations that changed the document.
    pub fn applied(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| *outcome == OpOutcome::Applied)
            .count()
    }

    /// Number of operations skipped with zero effect.
    pub fn skipped(&self) -> usize {
        self.outcomes.len() - self.applied()
    }
}

/// Apply a plan to the document, mutating it in place.
///
/// The plan is structurally validated first, so malformed caller input
/// fails fast before any mutation. After all operations the document
/// must survive a serialize + re-parse round trip; if it does not, the
/// call fails and the caller must discard the document.
pub fn apply_plan(document: &mut ScoreDocument, plan: &PatchPlan) -> RepairResult<ApplyReport> {
    validate::validate_plan(plan)?;

    let mut outcomes = Vec::with_capacity(plan.operations.len());
    for op in &plan.operations {
        let outcome = apply_operation(document, op);
        tracing::debug!(
            op_id = %op.op_id,
            kind = op.kind.as_str(),
            measure = op.measure,
            ?outcome,
            "operation"
        );
        outcomes.push((op.op_id.clone(), outcome));
    }

    document
        .reparse()
        .map_err(|source| RepairError::ParseSurvival { source })?;

    let report = ApplyReport { outcomes };
    tracing::debug!(
        applied = report.applied(),
        skipped = report.skipped(),
        "apply complete"
    );
    Ok(report)
}

fn apply_operation(document: &mut ScoreDocument, op: &PatchOperation) -> OpOutcome {
    if op.kind == PatchOpKind::Noop {
        return OpOutcome::Skipped(SkipReason::Noop);
    }

    let Some(part) = document.parts.first_mut() else {
        return OpOutcome::Skipped(SkipReason::MeasureMissing);
    };
    let Some(measure) = part.measure_mut(op.measure) else {
        return OpOutcome::Skipped(SkipReason::MeasureMissing);
    };

    let offset = op.beat - 1.0;
    match op.kind {
        PatchOpKind::InsertNote => insert_note(measure, offset, op),
        PatchOpKind::DeleteNote => delete_note(measure, offset, op),
        PatchOpKind::UpdateDuration => update_duration(measure, offset, op),
        PatchOpKind::UpdatePitch => update_pitch(measure, offset, op),
        PatchOpKind::Noop => OpOutcome::Skipped(SkipReason::Noop),
    }
}

fn insert_note(measure: &mut Measure, offset: f64, op: &PatchOperation) -> OpOutcome {
    let (Some(pitch), Some(duration)) = (op.params.pitch_midi, op.params.duration) else {
        return OpOutcome::Skipped(SkipReason::MissingParams);
    };

    if measure.has_note_any_voice(offset, pitch, duration) {
        return OpOutcome::Skipped(SkipReason::AlreadyPresent);
    }

    // An occupied target voice diverts the note to the next free one.
    let voice = if measure.voice_has_note_at(offset, op.voice) {
        measure.next_free_voice()
    } else {
        op.voice
    };

    if offset + duration > measure.capacity_beats() + DURATION_EPS {
        return OpOutcome::Skipped(SkipReason::WouldOverflow);
    }

    // A rest at exactly this slot would re-serialize after the inserted
    // note and shift the rest of the voice.
    for index in measure.rests_at(offset, voice) {
        measure.remove_element(index);
    }

    let (step, alter, octave) = midi_to_spelling(pitch);
    measure.insert_element(TimedElement {
        offset,
        duration,
        voice,
        kind: ElementKind::Note(Note {
            step,
            alter,
            octave,
            tie_start: false,
            tie_end: false,
        }),
    });
    OpOutcome::Applied
}

fn delete_note(measure: &mut Measure, offset: f64, op: &PatchOperation) -> OpOutcome {
    let (Some(old_pitch), Some(_)) = (op.params.old_pitch_midi, op.params.old_duration) else {
        return OpOutcome::Skipped(SkipReason::MissingParams);
    };

    let Some(index) = measure.find_note(offset, Some(old_pitch), op.voice) else {
        return OpOutcome::Skipped(SkipReason::NoteMissing);
    };

    // Replace with an equal-duration rest so no later content shifts and
    // the measure's notated length is unchanged.
    let removed = measure.remove_element(index);
    measure.insert_element(TimedElement {
        offset: removed.offset,
        duration: removed.duration,
        voice: removed.voice,
        kind: ElementKind::Rest,
    });
    OpOutcome::Applied
}

fn update_duration(measure: &mut Measure, offset: f64, op: &PatchOperation) -> OpOutcome {
    let (Some(new_duration), Some(_)) = (op.params.duration, op.params.old_duration) else {
        return OpOutcome::Skipped(SkipReason::MissingParams);
    };

    let Some(index) = measure.find_note(offset, None, op.voice) else {
        return OpOutcome::Skipped(SkipReason::NoteMissing);
    };
    let current = measure.elements[index].duration;
    let elem_offset = measure.elements[index].offset;
    let voice = measure.elements[index].voice;

    if (current - new_duration).abs() <= DURATION_EPS {
        return OpOutcome::Skipped(SkipReason::AlreadyApplied);
    }

    if new_duration > current {
        if elem_offset + new_duration > measure.capacity_beats() + DURATION_EPS {
            return OpOutcome::Skipped(SkipReason::WouldOverflow);
        }
        if measure.has_element_inside(elem_offset + current, elem_offset + new_duration, voice)
        {
            return OpOutcome::Skipped(SkipReason::WouldOverlap);
        }
    }

    measure.elements[index].duration = new_duration;

    // Shortening vacates a span; fill it so nothing shifts.
    if new_duration < current {
        measure.insert_element(TimedElement {
            offset: elem_offset + new_duration,
            duration: current - new_duration,
            voice,
            kind: ElementKind::Rest,
        });
    }
    OpOutcome::Applied
}

fn update_pitch(measure: &mut Measure, offset: f64, op: &PatchOperation) -> OpOutcome {
    let (Some(new_pitch), Some(old_pitch)) = (op.params.pitch_midi, op.params.old_pitch_midi)
    else {
        return OpOutcome::Skipped(SkipReason::MissingParams);
    };

    let Some(index) = measure.find_note(offset, Some(old_pitch), op.voice) else {
        return OpOutcome::Skipped(SkipReason::NoteMissing);
    };

    let ElementKind::Note(note) = &mut measure.elements[index].kind else {
        return OpOutcome::Skipped(SkipReason::NoteMissing);
    };
    if note.midi() == Some(new_pitch) {
        return OpOutcome::Skipped(SkipReason::AlreadyApplied);
    }
    // Duration untouched; only the spelling changes.
    note.set_midi(new_pitch);
    OpOutcome::Applied
}
