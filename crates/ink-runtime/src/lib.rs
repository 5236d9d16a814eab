//! Runtime for compiled ink stories: loads the JSON story format and plays
//! it line by line, with choices, variables, flows and save states.

pub mod callstack;
pub mod choice;
pub mod container;
pub mod json;
pub mod list;
pub mod native;
pub mod object;
pub mod path;
pub mod pointer;
mod rng;
pub mod state;
pub mod story;
pub mod tree;
pub mod value;
pub mod variables;

pub use choice::Choice;
pub use ink_core::{ErrorKind, InkError};
pub use list::{InkList, InkListItem, ListDefinition, ListDefinitionsOrigin};
pub use path::Path;
pub use state::StoryState;
pub use story::{
    ExternalFunction, FunctionEvaluation, ObserverId, Story, StoryCallbacks, StoryOptions,
    VariableObserver,
};
pub use value::{Value, ValueType};
