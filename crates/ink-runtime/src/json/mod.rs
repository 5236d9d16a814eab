//! The compact JSON token format of compiled stories and saved state.

mod read;
mod write;

pub use read::{read_story, rt_object_from_token, StoryDocument};
pub use write::{rt_object_to_token, value_to_token};

pub(crate) use read::value_from_token;

fn bad_token(token: &serde_json::Value) -> ink_core::InkError {
    ink_core::InkError::new(
        "JSON_BAD_TOKEN",
        format!("Failed to convert token to runtime object: {}", token),
    )
}
