use std::fmt;

use crate::callstack::PushPopType;
use crate::container::Container;
use crate::native::NativeOp;
use crate::path::Path;
use crate::value::Value;

/// Stable handle of a node inside a [`crate::tree::Tree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugMetadata {
    pub file_name: Option<String>,
    pub source_name: Option<String>,
    pub start_line_number: u32,
    pub end_line_number: u32,
}

impl fmt::Display for DebugMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.file_name {
            Some(file_name) => write!(f, "line {} of {}", self.start_line_number, file_name),
            None => write!(f, "line {}", self.start_line_number),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlCommand {
    EvalStart,
    EvalOutput,
    EvalEnd,
    Duplicate,
    PopEvaluatedValue,
    PopFunction,
    PopTunnel,
    BeginString,
    EndString,
    NoOp,
    ChoiceCount,
    Turns,
    TurnsSince,
    ReadCount,
    Random,
    SeedRandom,
    VisitIndex,
    SequenceShuffleIndex,
    StartThread,
    Done,
    End,
    ListFromInt,
    ListRange,
    ListRandom,
    BeginTag,
    EndTag,
}

impl ControlCommand {
    const NAMES: [(ControlCommand, &'static str); 26] = [
        (Self::EvalStart, "ev"),
        (Self::EvalOutput, "out"),
        (Self::EvalEnd, "/ev"),
        (Self::Duplicate, "du"),
        (Self::PopEvaluatedValue, "pop"),
        (Self::PopFunction, "~ret"),
        (Self::PopTunnel, "->->"),
        (Self::BeginString, "str"),
        (Self::EndString, "/str"),
        (Self::NoOp, "nop"),
        (Self::ChoiceCount, "choiceCnt"),
        (Self::Turns, "turn"),
        (Self::TurnsSince, "turns"),
        (Self::ReadCount, "readc"),
        (Self::Random, "rnd"),
        (Self::SeedRandom, "srnd"),
        (Self::VisitIndex, "visit"),
        (Self::SequenceShuffleIndex, "seq"),
        (Self::StartThread, "thread"),
        (Self::Done, "done"),
        (Self::End, "end"),
        (Self::ListFromInt, "listInt"),
        (Self::ListRange, "range"),
        (Self::ListRandom, "lrnd"),
        (Self::BeginTag, "#"),
        (Self::EndTag, "/#"),
    ];

    /// Token used by the compiled story format.
    pub fn name(self) -> &'static str {
        Self::NAMES
            .iter()
            .find(|(command, _)| *command == self)
            .map(|(_, name)| *name)
            .unwrap_or("nop")
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::NAMES
            .iter()
            .find(|(_, candidate)| *candidate == name)
            .map(|(command, _)| *command)
    }
}

impl fmt::Display for ControlCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Divert {
    pub target_path: Option<Path>,
    pub variable_divert_name: Option<String>,
    pub pushes_to_stack: bool,
    pub stack_push_type: PushPopType,
    pub is_external: bool,
    pub external_args: usize,
    pub is_conditional: bool,
}

impl Divert {
    pub fn new(target_path: Option<Path>) -> Self {
        Self {
            target_path,
            variable_divert_name: None,
            pushes_to_stack: false,
            stack_push_type: PushPopType::Function,
            is_external: false,
            external_args: 0,
            is_conditional: false,
        }
    }

    pub fn has_variable_target(&self) -> bool {
        self.variable_divert_name.is_some()
    }

    pub fn target_path_string(&self) -> Option<String> {
        self.target_path.as_ref().map(ToString::to_string)
    }
}

impl fmt::Display for Divert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(name) = &self.variable_divert_name {
            return write!(f, "Divert(variable: {})", name);
        }
        match &self.target_path {
            Some(path) => write!(f, "Divert({})", path),
            None => write!(f, "Divert(null)"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChoicePoint {
    pub path_on_choice: Path,
    pub has_condition: bool,
    pub has_start_content: bool,
    pub has_choice_only_content: bool,
    pub is_invisible_default: bool,
    pub once_only: bool,
}

impl ChoicePoint {
    pub fn from_flags(path_on_choice: Path, flags: i64) -> Self {
        Self {
            path_on_choice,
            has_condition: flags & 1 != 0,
            has_start_content: flags & 2 != 0,
            has_choice_only_content: flags & 4 != 0,
            is_invisible_default: flags & 8 != 0,
            once_only: flags & 16 != 0,
        }
    }

    pub fn flags(&self) -> i64 {
        let mut flags = 0;
        if self.has_condition {
            flags |= 1;
        }
        if self.has_start_content {
            flags |= 2;
        }
        if self.has_choice_only_content {
            flags |= 4;
        }
        if self.is_invisible_default {
            flags |= 8;
        }
        if self.once_only {
            flags |= 16;
        }
        flags
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariableReference {
    pub name: Option<String>,
    /// Set for read-count references (`CNT?`).
    pub path_for_count: Option<Path>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariableAssignment {
    pub name: String,
    pub is_new_declaration: bool,
    pub is_global: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Container(Container),
    Value(Value),
    Control(ControlCommand),
    Divert(Divert),
    ChoicePoint(ChoicePoint),
    VariableReference(VariableReference),
    VariableAssignment(VariableAssignment),
    Native(NativeOp),
    Glue,
    Tag(String),
    Void,
}

impl NodeKind {
    pub fn as_container(&self) -> Option<&Container> {
        match self {
            Self::Container(container) => Some(container),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Node {
    pub(crate) parent: Option<NodeId>,
    pub(crate) kind: NodeKind,
    pub(crate) debug: Option<DebugMetadata>,
}

impl Node {
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn own_debug_metadata(&self) -> Option<&DebugMetadata> {
        self.debug.as_ref()
    }
}

/// Runtime content that lives in the output stream or on the evaluation stack,
/// detached from the tree it may have come from.
#[derive(Debug, Clone, PartialEq)]
pub enum RtObject {
    Value(Value),
    Glue,
    Tag(String),
    Command(ControlCommand),
    Void,
}

impl RtObject {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Value(Value::String(text.into()))
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Value(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Value(Value::String(text)) => Some(text),
            _ => None,
        }
    }

    pub fn is_command(&self, command: ControlCommand) -> bool {
        matches!(self, Self::Command(found) if *found == command)
    }
}

impl fmt::Display for RtObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(value) => write!(f, "{}", value),
            Self::Glue => write!(f, "Glue"),
            Self::Tag(text) => write!(f, "# {}", text),
            Self::Command(command) => write!(f, "{}", command),
            Self::Void => write!(f, "Void"),
        }
    }
}

/// Text classification used by the output-stream whitespace rules.
pub(crate) fn is_newline(text: &str) -> bool {
    text == "\n"
}

pub(crate) fn is_inline_whitespace(text: &str) -> bool {
    text.chars().all(|c| c == ' ' || c == '\t')
}

pub(crate) fn is_non_whitespace(text: &str) -> bool {
    !is_newline(text) && !is_inline_whitespace(text)
}
