use std::fmt::Display;

use ink_core::InkError;

fn map_error(code: &'static str, error: impl Display) -> InkError {
    InkError::new(code, error.to_string())
}

pub(crate) fn emit_error(error: InkError) -> i32 {
    println!("RESULT:ERROR");
    println!("ERROR_CODE:{}", error.code);
    println!(
        "ERROR_MSG_JSON:{}",
        serde_json::to_string(&error.message).unwrap_or_else(|_| "\"\"".to_string())
    );
    1
}

pub(crate) fn map_cli_story_read(error: std::io::Error) -> InkError {
    map_error("CLI_STORY_READ", error)
}

pub(crate) fn map_cli_state_write(error: std::io::Error) -> InkError {
    map_error("CLI_STATE_WRITE", error)
}

pub(crate) fn map_cli_state_read(error: std::io::Error) -> InkError {
    map_error("CLI_STATE_READ", error)
}

pub(crate) fn map_cli_state_invalid(error: serde_json::Error) -> InkError {
    map_error("CLI_STATE_INVALID", error)
}

pub(crate) fn map_play_io(error: std::io::Error) -> InkError {
    map_error("PLAY_IO", error)
}

#[cfg(test)]
mod error_map_tests {
    use super::*;

    #[test]
    fn emit_error_returns_non_zero_exit_code() {
        assert_eq!(emit_error(InkError::new("ERR", "failed")), 1);
    }

    #[test]
    fn mapping_helpers_keep_error_codes() {
        assert_eq!(
            map_cli_story_read(std::io::Error::other("read")).code,
            "CLI_STORY_READ"
        );
        assert_eq!(
            map_cli_state_write(std::io::Error::other("write")).code,
            "CLI_STATE_WRITE"
        );
        assert_eq!(
            map_cli_state_read(std::io::Error::other("read")).code,
            "CLI_STATE_READ"
        );
        assert_eq!(map_play_io(std::io::Error::other("io")).code, "PLAY_IO");

        let invalid = serde_json::from_str::<serde_json::Value>("{").expect_err("invalid json");
        assert_eq!(map_cli_state_invalid(invalid).code, "CLI_STATE_INVALID");
    }
}
