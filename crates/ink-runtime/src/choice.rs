use crate::callstack::Thread;
use crate::path::Path;

/// A choice offered to the player.
#[derive(Debug, Clone, PartialEq)]
pub struct Choice {
    pub text: String,
    /// Position within the current choice list.
    pub index: usize,
    /// Path of the choice point that generated this choice.
    pub source_path: String,
    pub target_path: Path,
    pub is_invisible_default: bool,
    pub tags: Vec<String>,
    pub original_thread_index: i32,
    /// Thread captured when the choice was generated; choosing resumes it.
    pub(crate) thread_at_generation: Thread,
}

impl Choice {
    pub fn path_string_on_choice(&self) -> String {
        self.target_path.to_string()
    }
}
