use std::fs;
use std::path::Path;

use ink_core::InkError;

use crate::{
    map_cli_state_invalid, map_cli_state_read, map_cli_state_write, PlayerState, Session,
    PLAYER_STATE_SCHEMA,
};

pub(crate) fn save_player_state(path: &Path, state: &PlayerState) -> Result<(), InkError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(map_cli_state_write)?;

    let payload = serde_json::to_string(state).map_err(map_cli_state_invalid)?;
    fs::write(path, payload).map_err(map_cli_state_write)
}

pub(crate) fn load_player_state(path: &Path) -> Result<PlayerState, InkError> {
    if !path.exists() {
        return Err(InkError::new(
            "CLI_STATE_NOT_FOUND",
            format!("State file does not exist: {}", path.display()),
        ));
    }

    let raw = fs::read_to_string(path).map_err(map_cli_state_read)?;
    let state: PlayerState = serde_json::from_str(&raw).map_err(map_cli_state_invalid)?;

    if state.schema_version != PLAYER_STATE_SCHEMA {
        return Err(InkError::new(
            "CLI_STATE_SCHEMA",
            format!("Unsupported player state schema: {}", state.schema_version),
        ));
    }

    Ok(state)
}

pub(crate) fn player_state_for(session: &Session) -> Result<PlayerState, InkError> {
    let saved = session.story.save_state()?;
    let story_state = serde_json::from_str(&saved).map_err(map_cli_state_invalid)?;
    Ok(PlayerState {
        schema_version: PLAYER_STATE_SCHEMA.to_string(),
        story_path: session.story_path.clone(),
        strict_externals: session.strict_externals,
        story_state,
    })
}

/// Reopens the story a state file points at and restores it.
pub(crate) fn resume_session(state: &PlayerState) -> Result<Session, InkError> {
    let mut session = Session::open(&state.story_path, None, state.strict_externals)?;
    session.story.load_state(&state.story_state.to_string())?;
    Ok(session)
}

#[cfg(test)]
mod state_store_tests {
    use super::*;
    use crate::cli_test_support::*;

    #[test]
    fn player_state_round_trips_through_disk() {
        let story_path = temp_path("store.ink.json");
        write_file(&story_path, CHOICE_STORY);
        let mut session =
            Session::open(&story_path.to_string_lossy(), Some(5), false).expect("load");
        session.story.continue_maximally().expect("run to choices");

        let state_path = temp_path("store-state.json");
        let state = player_state_for(&session).expect("state");
        save_player_state(&state_path, &state).expect("save");

        let loaded = load_player_state(&state_path).expect("load state");
        assert_eq!(loaded.story_path, story_path.to_string_lossy());
        let resumed = resume_session(&loaded).expect("resume");
        assert_eq!(resumed.story.current_choices().len(), 2);
    }

    #[test]
    fn load_rejects_missing_and_foreign_files() {
        let missing = load_player_state(&temp_path("nope.json")).expect_err("missing");
        assert_eq!(missing.code, "CLI_STATE_NOT_FOUND");

        let path = temp_path("foreign.json");
        write_file(
            &path,
            r#"{"schemaVersion":"other","storyPath":"x","strictExternals":false,"storyState":{}}"#,
        );
        let foreign = load_player_state(&path).expect_err("schema");
        assert_eq!(foreign.code, "CLI_STATE_SCHEMA");
    }
}
