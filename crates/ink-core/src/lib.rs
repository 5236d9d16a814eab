pub mod error;
pub mod save;

pub use error::{ErrorKind, InkError};
pub use save::*;

/// The current version of the compiled story format.
pub const INK_VERSION_CURRENT: i32 = 21;

/// The oldest compiled story format that can still be loaded.
pub const INK_VERSION_MINIMUM_COMPATIBLE: i32 = 18;

/// The current version of the save-state format.
pub const INK_SAVE_STATE_VERSION: i32 = 10;

/// The oldest save-state format that can still be loaded.
pub const MIN_COMPATIBLE_LOAD_VERSION: i32 = 8;
