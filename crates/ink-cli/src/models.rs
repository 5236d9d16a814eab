use serde::{Deserialize, Serialize};

pub(crate) const PLAYER_STATE_SCHEMA: &str = "ink-player-state.v1";

/// What an agent invocation leaves on disk between calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PlayerState {
    pub(crate) schema_version: String,
    pub(crate) story_path: String,
    pub(crate) strict_externals: bool,
    /// The runtime's own save document, embedded as JSON.
    pub(crate) story_state: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BoundaryEvent {
    Choices,
    End,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct BoundaryLine {
    pub(crate) text: String,
    pub(crate) tags: Vec<String>,
}

#[derive(Debug, Clone)]
pub(crate) struct BoundaryResult {
    pub(crate) event: BoundaryEvent,
    pub(crate) lines: Vec<BoundaryLine>,
    pub(crate) choices: Vec<(usize, String)>,
}
