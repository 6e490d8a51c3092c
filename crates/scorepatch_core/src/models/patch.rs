//! Patch plan structures.
//!
//! A plan is created once per repair run from a diff set, consumed exactly
//! once by the applier, and never mutated in place.

use serde::{Deserialize, Serialize};

use super::enums::{DiffKind, PatchOpKind};

/// Back-reference from an operation to the diff it repairs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffRef {
    #[serde(rename = "type")]
    pub kind: DiffKind,
    pub measure: u32,
    pub beat: f64,
}

/// Operation parameters.
///
/// `pitch_midi`/`duration` describe the desired state; `old_pitch_midi`/
/// `old_duration` identify and validate the current state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatchParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pitch_midi: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_pitch_midi: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_duration: Option<f64>,
}

/// A single atomic, idempotent edit targeting measure/beat/voice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchOperation {
    /// Stable, deterministically derived identifier.
    pub op_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff_ref: Option<DiffRef>,
    #[serde(rename = "type")]
    pub kind: PatchOpKind,
    pub measure: u32,
    pub beat: f64,
    #[serde(default = "default_voice")]
    pub voice: u32,
    #[serde(default)]
    pub params: PatchParams,
}

fn default_voice() -> u32 {
    1
}

/// Patch plan root object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchPlan {
    /// The notation document the plan was generated against.
    pub source_file: String,
    /// Timestamp of the diff report the plan was generated from.
    pub source_diff_timestamp: String,
    /// Operations in `(measure, beat, op_id)` order.
    pub operations: Vec<PatchOperation>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_omit_absent_fields() {
        let op = PatchOperation {
            op_id: "op-0123456789ab".to_string(),
            diff_ref: None,
            kind: PatchOpKind::InsertNote,
            measure: 1,
            beat: 2.0,
            voice: 1,
            params: PatchParams {
                pitch_midi: Some(72),
                duration: Some(1.0),
                ..Default::default()
            },
        };
        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(json["type"], "insert_note");
        assert_eq!(json["params"]["pitch_midi"], 72);
        assert!(json["params"].get("old_pitch_midi").is_none());
        assert!(json.get("diff_ref").is_none());
    }

    #[test]
    fn voice_defaults_to_one_on_deserialize() {
        let json = serde_json::json!({
            "op_id": "op-abc",
            "type": "noop",
            "measure": 1,
            "beat": 1.0,
        });
        let op: PatchOperation = serde_json::from_value(json).unwrap();
        assert_eq!(op.voice, 1);
        assert_eq!(op.params, PatchParams::default());
    }
}
