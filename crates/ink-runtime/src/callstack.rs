use std::collections::BTreeMap;
use std::fmt::Write as _;

use ink_core::InkError;

use crate::list::retain_list_origins_for_assignment;
use crate::pointer::Pointer;
use crate::tree::Tree;
use crate::value::Value;

/// Why a frame was pushed, and therefore what may pop it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PushPopType {
    Tunnel,
    Function,
    FunctionEvaluationFromGame,
}

impl PushPopType {
    pub fn as_int(self) -> i64 {
        match self {
            Self::Tunnel => 0,
            Self::Function => 1,
            Self::FunctionEvaluationFromGame => 2,
        }
    }

    pub fn from_int(value: i64) -> Option<Self> {
        match value {
            0 => Some(Self::Tunnel),
            1 => Some(Self::Function),
            2 => Some(Self::FunctionEvaluationFromGame),
            _ => None,
        }
    }
}

/// One call frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub current_pointer: Pointer,
    pub in_expression_evaluation: bool,
    pub temporary_variables: BTreeMap<String, Value>,
    pub push_pop_type: PushPopType,
    pub evaluation_stack_height_when_pushed: usize,
    pub function_start_in_output_stream: i32,
}

impl Element {
    pub fn new(push_pop_type: PushPopType, pointer: Pointer, in_expression_evaluation: bool) -> Self {
        Self {
            current_pointer: pointer,
            in_expression_evaluation,
            temporary_variables: BTreeMap::new(),
            push_pop_type,
            evaluation_stack_height_when_pushed: 0,
            function_start_in_output_stream: 0,
        }
    }
}

/// A logical thread of execution: its own frame stack, never an OS thread.
#[derive(Debug, Clone, PartialEq)]
pub struct Thread {
    pub callstack: Vec<Element>,
    pub thread_index: i32,
    pub previous_pointer: Pointer,
}

impl Thread {
    pub fn new() -> Self {
        Self {
            callstack: Vec::new(),
            thread_index: 0,
            previous_pointer: Pointer::NULL,
        }
    }
}

impl Default for Thread {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CallStack {
    threads: Vec<Thread>,
    thread_counter: i32,
    start_of_root: Pointer,
}

impl CallStack {
    pub fn new(start_of_root: Pointer) -> Self {
        let mut callstack = Self {
            threads: Vec::new(),
            thread_counter: 0,
            start_of_root,
        };
        callstack.reset();
        callstack
    }

    pub(crate) fn from_parts(threads: Vec<Thread>, thread_counter: i32, start_of_root: Pointer) -> Self {
        Self {
            threads,
            thread_counter,
            start_of_root,
        }
    }

    pub fn reset(&mut self) {
        let mut thread = Thread::new();
        thread
            .callstack
            .push(Element::new(PushPopType::Tunnel, self.start_of_root, false));
        self.threads = vec![thread];
        self.thread_counter = 0;
    }

    pub fn threads(&self) -> &[Thread] {
        &self.threads
    }

    pub fn thread_counter(&self) -> i32 {
        self.thread_counter
    }

    pub fn elements(&self) -> &[Element] {
        &self.current_thread().callstack
    }

    pub fn depth(&self) -> usize {
        self.elements().len()
    }

    /// There is always at least one thread with one frame; an empty stack
    /// means the state was corrupted.
    pub fn current_thread(&self) -> &Thread {
        self.threads.last().expect("call stack always has a thread")
    }

    pub fn current_thread_mut(&mut self) -> &mut Thread {
        self.threads.last_mut().expect("call stack always has a thread")
    }

    /// Replaces the only thread, e.g. when a choice resumes its captured thread.
    pub fn set_current_thread(&mut self, thread: Thread) -> Result<(), InkError> {
        if self.threads.len() != 1 {
            return Err(InkError::new(
                "CALLSTACK_SET_THREAD",
                "Shouldn't be directly setting the current thread when we have a stack of them",
            ));
        }
        self.threads = vec![thread];
        Ok(())
    }

    pub fn current_element(&self) -> &Element {
        self.current_thread()
            .callstack
            .last()
            .expect("thread always has a frame")
    }

    pub fn current_element_mut(&mut self) -> &mut Element {
        self.current_thread_mut()
            .callstack
            .last_mut()
            .expect("thread always has a frame")
    }

    pub fn current_element_index(&self) -> usize {
        self.elements().len() - 1
    }

    pub fn can_pop(&self) -> bool {
        self.elements().len() > 1
    }

    pub fn can_pop_type(&self, push_pop_type: Option<PushPopType>) -> bool {
        if !self.can_pop() {
            return false;
        }
        match push_pop_type {
            None => true,
            Some(expected) => self.current_element().push_pop_type == expected,
        }
    }

    pub fn element_is_evaluate_from_game(&self) -> bool {
        self.current_element().push_pop_type == PushPopType::FunctionEvaluationFromGame
    }

    /// The new frame starts where the caller currently is.
    pub fn push(
        &mut self,
        push_pop_type: PushPopType,
        external_evaluation_stack_height: usize,
        output_stream_length_with_pushed: usize,
    ) {
        let mut element = Element::new(push_pop_type, self.current_element().current_pointer, false);
        element.evaluation_stack_height_when_pushed = external_evaluation_stack_height;
        element.function_start_in_output_stream = output_stream_length_with_pushed as i32;
        self.current_thread_mut().callstack.push(element);
    }

    pub fn pop(&mut self, push_pop_type: Option<PushPopType>) -> Result<(), InkError> {
        if !self.can_pop_type(push_pop_type) {
            return Err(InkError::new(
                "CALLSTACK_MISMATCH",
                "Mismatched push/pop in Callstack",
            ));
        }
        self.current_thread_mut().callstack.pop();
        Ok(())
    }

    pub fn can_pop_thread(&self) -> bool {
        self.threads.len() > 1 && !self.element_is_evaluate_from_game()
    }

    pub fn push_thread(&mut self) {
        let thread = self.fork_thread();
        self.threads.push(thread);
    }

    /// Copy of the current thread with a fresh index, not pushed.
    pub fn fork_thread(&mut self) -> Thread {
        let mut forked = self.current_thread().clone();
        self.thread_counter += 1;
        forked.thread_index = self.thread_counter;
        forked
    }

    pub fn pop_thread(&mut self) -> Result<(), InkError> {
        if !self.can_pop_thread() {
            return Err(InkError::new("CALLSTACK_POP_THREAD", "Can't pop thread"));
        }
        self.threads.pop();
        Ok(())
    }

    pub fn thread_with_index(&self, index: i32) -> Option<&Thread> {
        self.threads.iter().find(|thread| thread.thread_index == index)
    }

    fn context_element_index(&self, context_index: i32) -> Option<usize> {
        let context_index = if context_index == -1 {
            self.current_element_index() as i32 + 1
        } else {
            context_index
        };
        usize::try_from(context_index - 1).ok()
    }

    /// `context_index` of -1 means the current frame; otherwise it is the
    /// frame's depth plus one.
    pub fn get_temporary_variable_with_name(&self, name: &str, context_index: i32) -> Option<&Value> {
        let index = self.context_element_index(context_index)?;
        self.elements().get(index)?.temporary_variables.get(name)
    }

    pub fn set_temporary_variable(
        &mut self,
        name: &str,
        mut value: Value,
        declare_new: bool,
        context_index: i32,
    ) -> Result<(), InkError> {
        let index = self.context_element_index(context_index).ok_or_else(|| {
            InkError::new(
                "CALLSTACK_CONTEXT",
                format!("Invalid variable context index {}", context_index),
            )
        })?;
        let element = self
            .current_thread_mut()
            .callstack
            .get_mut(index)
            .ok_or_else(|| {
                InkError::new(
                    "CALLSTACK_CONTEXT",
                    format!("Invalid variable context index {}", context_index),
                )
            })?;

        let old_value = element.temporary_variables.get(name);
        if !declare_new && old_value.is_none() {
            return Err(InkError::new(
                "CALLSTACK_TEMP_MISSING",
                format!("Could not find temporary variable to set: {}", name),
            ));
        }
        retain_list_origins_for_assignment(old_value, &mut value);
        element.temporary_variables.insert(name.to_string(), value);
        Ok(())
    }

    /// 0 for globals, otherwise the current frame's depth plus one.
    pub fn context_for_variable_named(&self, name: &str) -> i32 {
        if self.current_element().temporary_variables.contains_key(name) {
            self.current_element_index() as i32 + 1
        } else {
            0
        }
    }

    pub fn call_stack_trace(&self, tree: &Tree) -> String {
        let mut trace = String::new();
        let thread_count = self.threads.len();
        for (thread_number, thread) in self.threads.iter().enumerate() {
            let is_current = thread_number == thread_count - 1;
            let _ = writeln!(
                trace,
                "=== THREAD {}/{} {}===",
                thread_number + 1,
                thread_count,
                if is_current { "(current) " } else { "" }
            );
            for element in &thread.callstack {
                let kind = if element.push_pop_type == PushPopType::Function {
                    "  [FUNCTION] "
                } else {
                    "  [TUNNEL] "
                };
                match element.current_pointer.path(tree) {
                    Some(path) => {
                        let _ = writeln!(trace, "{}<SOMEWHERE IN {}>", kind, path);
                    }
                    None => {
                        let _ = writeln!(trace, "{}<null>", kind);
                    }
                }
            }
        }
        trace
    }
}

#[cfg(test)]
mod callstack_tests {
    use super::*;
    use crate::container::Container;
    use crate::object::NodeKind;

    fn callstack() -> (Tree, CallStack) {
        let mut tree = Tree::new();
        let knot = tree.add_node(NodeKind::Container(Container::named("knot")));
        tree.add_content(tree.root(), knot).expect("add knot");
        let callstack = CallStack::new(Pointer::start_of(tree.root()));
        (tree, callstack)
    }

    #[test]
    fn push_and_pop_must_match_types() {
        let (_, mut stack) = callstack();
        assert!(!stack.can_pop());
        stack.push(PushPopType::Function, 0, 0);
        assert_eq!(stack.depth(), 2);

        let error = stack
            .pop(Some(PushPopType::Tunnel))
            .expect_err("mismatched pop");
        assert_eq!(error.code, "CALLSTACK_MISMATCH");
        assert_eq!(stack.depth(), 2);

        stack.pop(Some(PushPopType::Function)).expect("pop function");
        assert!(stack.pop(None).is_err());
    }

    #[test]
    fn temporaries_are_scoped_to_frames() {
        let (_, mut stack) = callstack();
        stack
            .set_temporary_variable("x", Value::Int(1), true, -1)
            .expect("declare x");
        assert_eq!(stack.context_for_variable_named("x"), 1);

        stack.push(PushPopType::Function, 0, 0);
        assert_eq!(stack.get_temporary_variable_with_name("x", -1), None);
        assert_eq!(stack.get_temporary_variable_with_name("x", 1), Some(&Value::Int(1)));
        assert_eq!(stack.context_for_variable_named("x"), 0);

        let error = stack
            .set_temporary_variable("y", Value::Int(2), false, -1)
            .expect_err("undeclared temp");
        assert_eq!(error.code, "CALLSTACK_TEMP_MISSING");
    }

    #[test]
    fn threads_fork_with_fresh_indices() {
        let (tree, mut stack) = callstack();
        stack.push_thread();
        assert_eq!(stack.threads().len(), 2);
        assert_eq!(stack.current_thread().thread_index, 1);
        assert!(stack.can_pop_thread());

        let forked = stack.fork_thread();
        assert_eq!(forked.thread_index, 2);
        assert_eq!(stack.threads().len(), 2);
        assert!(stack.thread_with_index(1).is_some());

        assert!(stack.set_current_thread(forked.clone()).is_err());
        stack.pop_thread().expect("pop thread");
        assert!(stack.pop_thread().is_err());
        stack.set_current_thread(forked).expect("single thread");
        assert!(stack.call_stack_trace(&tree).contains("THREAD 1/1"));
    }

    #[test]
    fn evaluation_from_game_blocks_thread_pop() {
        let (_, mut stack) = callstack();
        stack.push_thread();
        stack.push(PushPopType::FunctionEvaluationFromGame, 3, 0);
        assert!(stack.element_is_evaluate_from_game());
        assert!(!stack.can_pop_thread());
        assert_eq!(stack.current_element().evaluation_stack_height_when_pushed, 3);
    }
}
