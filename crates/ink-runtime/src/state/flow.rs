use crate::callstack::CallStack;
use crate::choice::Choice;
use crate::object::RtObject;
use crate::pointer::Pointer;

pub const DEFAULT_FLOW_NAME: &str = "DEFAULT_FLOW";

/// An independent narrative context: its own call stack, output and choices.
#[derive(Debug, Clone, PartialEq)]
pub struct Flow {
    pub name: String,
    pub callstack: CallStack,
    pub output_stream: Vec<RtObject>,
    pub current_choices: Vec<Choice>,
}

impl Flow {
    pub fn new(name: impl Into<String>, start_of_root: Pointer) -> Self {
        Self {
            name: name.into(),
            callstack: CallStack::new(start_of_root),
            output_stream: Vec::new(),
            current_choices: Vec::new(),
        }
    }
}
