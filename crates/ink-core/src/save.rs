use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonToken;

/// One call-stack frame of a saved thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameSave {
    #[serde(rename = "cPath", default, skip_serializing_if = "Option::is_none")]
    pub container_path: Option<String>,
    #[serde(rename = "idx", default)]
    pub index: i32,
    #[serde(rename = "exp")]
    pub in_expression_evaluation: bool,
    #[serde(rename = "type")]
    pub push_pop_type: i32,
    #[serde(rename = "temp", default)]
    pub temporaries: BTreeMap<String, JsonToken>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadSave {
    pub callstack: Vec<FrameSave>,
    pub thread_index: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_content_object: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallStackSave {
    pub threads: Vec<ThreadSave>,
    pub thread_counter: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChoiceSave {
    pub text: String,
    pub index: usize,
    pub original_choice_path: String,
    pub original_thread_index: i32,
    pub target_path: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowSave {
    pub callstack: CallStackSave,
    pub output_stream: Vec<JsonToken>,
    /// Threads of choices whose generating thread is no longer on the call stack.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub choice_threads: BTreeMap<String, ThreadSave>,
    pub current_choices: Vec<ChoiceSave>,
}

/// The save-state document. Field names match the established ink save format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveState {
    pub flows: BTreeMap<String, FlowSave>,
    pub current_flow_name: String,
    pub variables_state: BTreeMap<String, JsonToken>,
    pub eval_stack: Vec<JsonToken>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_divert_target: Option<String>,
    pub visit_counts: BTreeMap<String, i32>,
    pub turn_indices: BTreeMap<String, i32>,
    pub turn_idx: i32,
    pub story_seed: i32,
    #[serde(default)]
    pub previous_random: i32,
    pub ink_save_version: i32,
    pub ink_format_version: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_state_uses_ink_field_names() {
        let state = SaveState {
            flows: BTreeMap::new(),
            current_flow_name: "DEFAULT_FLOW".to_string(),
            variables_state: BTreeMap::new(),
            eval_stack: Vec::new(),
            current_divert_target: None,
            visit_counts: BTreeMap::from([("knot".to_string(), 2)]),
            turn_indices: BTreeMap::new(),
            turn_idx: 3,
            story_seed: 42,
            previous_random: 0,
            ink_save_version: 10,
            ink_format_version: 21,
        };
        let json = serde_json::to_value(&state).expect("state should serialize");
        assert_eq!(json["currentFlowName"], "DEFAULT_FLOW");
        assert_eq!(json["visitCounts"]["knot"], 2);
        assert_eq!(json["turnIdx"], 3);
        assert_eq!(json["inkSaveVersion"], 10);
        assert!(json.get("currentDivertTarget").is_none());
    }

    #[test]
    fn frame_save_reads_compact_keys() {
        let frame: FrameSave = serde_json::from_str(
            r#"{"cPath":"knot.0","idx":2,"exp":false,"type":1,"temp":{"x":5}}"#,
        )
        .expect("frame should parse");
        assert_eq!(frame.container_path.as_deref(), Some("knot.0"));
        assert_eq!(frame.index, 2);
        assert_eq!(frame.push_pop_type, 1);
        assert_eq!(frame.temporaries["x"], 5);
    }

    #[test]
    fn missing_previous_random_defaults_to_zero() {
        let state: SaveState = serde_json::from_str(
            r#"{"flows":{},"currentFlowName":"DEFAULT_FLOW","variablesState":{},"evalStack":[],
                "visitCounts":{},"turnIndices":{},"turnIdx":-1,"storySeed":7,
                "inkSaveVersion":10,"inkFormatVersion":21}"#,
        )
        .expect("state should parse");
        assert_eq!(state.previous_random, 0);
    }
}
