//! Everything that changes while a story runs.

pub mod flow;
pub(crate) mod output;
pub mod patch;
mod save;

use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use ink_core::InkError;

use crate::callstack::{CallStack, PushPopType};
use crate::choice::Choice;
use crate::list::ListDefinitionsOrigin;
use crate::object::{NodeId, RtObject};
use crate::pointer::Pointer;
use crate::tree::Tree;
use crate::value::Value;
use crate::variables::VariablesState;

use flow::{Flow, DEFAULT_FLOW_NAME};
use patch::StatePatch;

#[derive(Debug, Clone)]
pub struct StoryState {
    current_flow: Flow,
    /// Flows other than the current one, by name.
    other_flows: BTreeMap<String, Flow>,
    pub(crate) variables: VariablesState,
    evaluation_stack: Vec<RtObject>,
    pub(crate) diverted_pointer: Pointer,
    visit_counts: Rc<HashMap<String, i32>>,
    turn_indices: Rc<HashMap<String, i32>>,
    current_turn_index: i32,
    pub(crate) story_seed: i32,
    pub(crate) previous_random: i32,
    pub(crate) did_safe_exit: bool,
    patch: Option<StatePatch>,
    current_errors: Vec<String>,
    current_warnings: Vec<String>,
    start_of_root: Pointer,
}

impl StoryState {
    pub fn new(start_of_root: Pointer, lists: Rc<ListDefinitionsOrigin>, story_seed: i32) -> Self {
        Self {
            current_flow: Flow::new(DEFAULT_FLOW_NAME, start_of_root),
            other_flows: BTreeMap::new(),
            variables: VariablesState::new(lists),
            evaluation_stack: Vec::new(),
            diverted_pointer: Pointer::NULL,
            visit_counts: Rc::new(HashMap::new()),
            turn_indices: Rc::new(HashMap::new()),
            current_turn_index: -1,
            story_seed,
            previous_random: 0,
            did_safe_exit: false,
            patch: None,
            current_errors: Vec::new(),
            current_warnings: Vec::new(),
            start_of_root,
        }
    }

    pub fn variables(&self) -> &VariablesState {
        &self.variables
    }

    pub fn patch(&self) -> Option<&StatePatch> {
        self.patch.as_ref()
    }

    pub fn callstack(&self) -> &CallStack {
        &self.current_flow.callstack
    }

    pub fn callstack_mut(&mut self) -> &mut CallStack {
        &mut self.current_flow.callstack
    }

    /// Host write of a global, routed through the patch when one is active.
    pub fn set_global_variable(&mut self, name: &str, value: Value) -> Result<(), InkError> {
        self.variables.set(name, value, self.patch.as_mut())
    }

    pub fn global_variable(&self, name: &str) -> Option<Value> {
        self.variables.get(name, self.patch.as_ref())
    }

    /// Resolves a variable through pointers; context -1 means current scope.
    pub fn variable_value(&self, name: &str, context_index: i32) -> Option<Value> {
        self.variables.get_variable_with_name(
            name,
            context_index,
            &self.current_flow.callstack,
            self.patch.as_ref(),
        )
    }

    pub fn assign_variable(
        &mut self,
        assignment: &crate::object::VariableAssignment,
        value: Value,
    ) -> Result<(), InkError> {
        self.variables.assign(
            assignment,
            value,
            &mut self.current_flow.callstack,
            self.patch.as_mut(),
        )
    }

    pub fn resolve_variable_pointer(&self, pointer: &Value) -> Value {
        self.variables.resolve_variable_pointer(
            pointer,
            &self.current_flow.callstack,
            self.patch.as_ref(),
        )
    }

    pub fn set_global(&mut self, name: &str, value: Value) {
        self.variables.set_global(name, value, self.patch.as_mut());
    }

    pub fn current_pointer(&self) -> Pointer {
        self.callstack().current_element().current_pointer
    }

    pub fn set_current_pointer(&mut self, pointer: Pointer) {
        self.callstack_mut().current_element_mut().current_pointer = pointer;
    }

    pub fn previous_pointer(&self) -> Pointer {
        self.callstack().current_thread().previous_pointer
    }

    pub fn set_previous_pointer(&mut self, pointer: Pointer) {
        self.callstack_mut().current_thread_mut().previous_pointer = pointer;
    }

    pub fn in_expression_evaluation(&self) -> bool {
        self.callstack().current_element().in_expression_evaluation
    }

    pub fn set_in_expression_evaluation(&mut self, value: bool) {
        self.callstack_mut().current_element_mut().in_expression_evaluation = value;
    }

    pub fn can_continue(&self) -> bool {
        !self.current_pointer().is_null() && !self.has_error()
    }

    pub fn current_turn_index(&self) -> i32 {
        self.current_turn_index
    }

    pub fn story_seed(&self) -> i32 {
        self.story_seed
    }

    pub fn set_story_seed(&mut self, seed: i32) {
        self.story_seed = seed;
    }

    pub fn previous_random(&self) -> i32 {
        self.previous_random
    }

    /// Choices are only presented once the story can no longer continue.
    pub fn current_choices(&self) -> &[Choice] {
        if self.can_continue() {
            &[]
        } else {
            &self.current_flow.current_choices
        }
    }

    pub fn generated_choices(&self) -> &[Choice] {
        &self.current_flow.current_choices
    }

    pub(crate) fn generated_choices_mut(&mut self) -> &mut Vec<Choice> {
        &mut self.current_flow.current_choices
    }

    // Evaluation stack

    pub fn evaluation_stack(&self) -> &[RtObject] {
        &self.evaluation_stack
    }

    /// List values resolve their origins by name on use, so nothing extra
    /// needs attaching here.
    pub fn push_evaluation_stack(&mut self, object: RtObject) {
        self.evaluation_stack.push(object);
    }

    pub fn pop_evaluation_stack(&mut self) -> Result<RtObject, InkError> {
        self.evaluation_stack.pop().ok_or_else(|| {
            InkError::new("STATE_EVAL_STACK_EMPTY", "Evaluation stack is empty")
        })
    }

    /// Pops `count` objects, returned in the order they were pushed.
    pub fn pop_evaluation_stack_n(&mut self, count: usize) -> Result<Vec<RtObject>, InkError> {
        if count > self.evaluation_stack.len() {
            return Err(InkError::new(
                "STATE_EVAL_STACK_EMPTY",
                "trying to pop too many objects",
            ));
        }
        let start = self.evaluation_stack.len() - count;
        Ok(self.evaluation_stack.split_off(start))
    }

    pub fn peek_evaluation_stack(&self) -> Option<&RtObject> {
        self.evaluation_stack.last()
    }

    // Errors

    pub fn current_errors(&self) -> &[String] {
        &self.current_errors
    }

    pub fn current_warnings(&self) -> &[String] {
        &self.current_warnings
    }

    pub fn has_error(&self) -> bool {
        !self.current_errors.is_empty()
    }

    pub fn has_warning(&self) -> bool {
        !self.current_warnings.is_empty()
    }

    pub(crate) fn add_error(&mut self, message: String, is_warning: bool) {
        if is_warning {
            self.current_warnings.push(message);
        } else {
            self.current_errors.push(message);
        }
    }

    pub fn reset_errors(&mut self) {
        self.current_errors.clear();
        self.current_warnings.clear();
    }

    // Flow control

    /// Unwinds everything and marks the run as a safe exit.
    pub fn force_end(&mut self) {
        self.callstack_mut().reset();
        self.current_flow.current_choices.clear();
        self.set_current_pointer(Pointer::NULL);
        self.set_previous_pointer(Pointer::NULL);
        self.did_safe_exit = true;
    }

    pub fn pop_callstack(&mut self, push_pop_type: Option<PushPopType>) -> Result<(), InkError> {
        if self.callstack().current_element().push_pop_type == PushPopType::Function {
            self.trim_whitespace_from_function_end();
        }
        self.callstack_mut().pop(push_pop_type)
    }

    pub fn set_chosen_path(&mut self, pointer: Pointer, incrementing_turn_index: bool) {
        self.current_flow.current_choices.clear();
        let mut pointer = pointer;
        if !pointer.is_null() && pointer.index == -1 {
            pointer.index = 0;
        }
        self.set_current_pointer(pointer);
        if incrementing_turn_index {
            self.current_turn_index += 1;
        }
    }

    pub fn start_function_evaluation_from_game(
        &mut self,
        function_container: NodeId,
        arguments: &[Value],
    ) -> Result<(), InkError> {
        let height = self.evaluation_stack.len();
        self.callstack_mut()
            .push(PushPopType::FunctionEvaluationFromGame, height, 0);
        self.set_current_pointer(Pointer::start_of(function_container));
        self.pass_arguments_to_evaluation_stack(arguments)
    }

    pub fn pass_arguments_to_evaluation_stack(&mut self, arguments: &[Value]) -> Result<(), InkError> {
        if let Some(bad) = arguments.iter().find(|argument| {
            matches!(
                argument,
                Value::DivertTarget(_) | Value::VariablePointer { .. }
            )
        }) {
            return Err(InkError::new(
                "STATE_BAD_ARGUMENT",
                format!(
                    "ink arguments when calling EvaluateFunction / ChoosePathStringWithParameters must be int, float, string, bool or InkList. Argument was {}",
                    bad.value_type()
                ),
            ));
        }
        for argument in arguments {
            self.push_evaluation_stack(RtObject::Value(argument.clone()));
        }
        Ok(())
    }

    pub fn try_exit_function_evaluation_from_game(&mut self) -> bool {
        if self.callstack().element_is_evaluate_from_game() {
            self.set_current_pointer(Pointer::NULL);
            self.did_safe_exit = true;
            return true;
        }
        false
    }

    /// Pops the game-evaluation frame and whatever it left on the stack.
    /// Divert targets and variable pointers come back as strings.
    pub fn complete_function_evaluation_from_game(&mut self, tree: &Tree) -> Result<Option<Value>, InkError> {
        if !self.callstack().element_is_evaluate_from_game() {
            return Err(InkError::new(
                "STORY_FUNCTION_EVALUATION",
                format!(
                    "Expected external function evaluation to be complete. Stack trace: {}",
                    self.callstack().call_stack_trace(tree)
                ),
            ));
        }

        let original_height = self
            .callstack()
            .current_element()
            .evaluation_stack_height_when_pushed;
        let mut returned = None;
        while self.evaluation_stack.len() > original_height {
            let popped = self.pop_evaluation_stack()?;
            if returned.is_none() {
                returned = Some(popped);
            }
        }

        self.pop_callstack(Some(PushPopType::FunctionEvaluationFromGame))?;

        Ok(match returned {
            Some(RtObject::Value(Value::DivertTarget(path))) => Some(Value::String(path.to_string())),
            Some(RtObject::Value(Value::VariablePointer { name, .. })) => Some(Value::String(name)),
            Some(RtObject::Value(value)) => Some(value),
            _ => None,
        })
    }

    // Visit and turn counts

    pub fn visit_counts(&self) -> &HashMap<String, i32> {
        &self.visit_counts
    }

    pub fn turn_indices(&self) -> &HashMap<String, i32> {
        &self.turn_indices
    }

    pub fn visit_count_at_path_string(&self, path: &str) -> i32 {
        if let Some(count) = self.patch.as_ref().and_then(|patch| patch.try_get_visit_count(path)) {
            return count;
        }
        self.visit_counts.get(path).copied().unwrap_or(0)
    }

    pub fn visit_count_for_container(&self, tree: &Tree, container: NodeId) -> Result<i32, InkError> {
        let counted = tree
            .container(container)
            .is_some_and(|found| found.visits_should_be_counted);
        if !counted {
            return Err(InkError::new(
                "STORY_READ_COUNT_UNKNOWN",
                format!(
                    "Read count for target ({}{}) unknown.",
                    container_label(tree, container),
                    debug_suffix(tree, container)
                ),
            ));
        }
        Ok(self.visit_count_at_path_string(&tree.path_string(container)))
    }

    pub fn increment_visit_count_for_container(&mut self, tree: &Tree, container: NodeId) {
        let path = tree.path_string(container);
        let count = self.visit_count_at_path_string(&path) + 1;
        match &mut self.patch {
            Some(patch) => patch.set_visit_count(&path, count),
            None => {
                Rc::make_mut(&mut self.visit_counts).insert(path, count);
            }
        }
    }

    pub fn record_turn_index_visit_to_container(&mut self, tree: &Tree, container: NodeId) {
        let path = tree.path_string(container);
        match &mut self.patch {
            Some(patch) => patch.set_turn_index(&path, self.current_turn_index),
            None => {
                Rc::make_mut(&mut self.turn_indices).insert(path, self.current_turn_index);
            }
        }
    }

    /// -1 when the container was never visited.
    pub fn turns_since_for_container(&self, tree: &Tree, container: NodeId) -> Result<i32, InkError> {
        let counted = tree
            .container(container)
            .is_some_and(|found| found.turn_index_should_be_counted);
        if !counted {
            return Err(InkError::new(
                "STORY_TURNS_SINCE_UNKNOWN",
                format!(
                    "TURNS_SINCE() for target ({}{}) unknown.",
                    container_label(tree, container),
                    debug_suffix(tree, container)
                ),
            ));
        }

        let path = tree.path_string(container);
        let index = self
            .patch
            .as_ref()
            .and_then(|patch| patch.try_get_turn_index(&path))
            .or_else(|| self.turn_indices.get(&path).copied());
        Ok(match index {
            Some(index) => self.current_turn_index - index,
            None => -1,
        })
    }

    // Lookahead patching

    /// Copy used as the live state during lookahead. Flows and stacks are
    /// copied; counts and globals stay shared and all writes go to the patch.
    pub fn copy_and_start_patching(&self) -> StoryState {
        let mut copy = self.clone();
        copy.patch = Some(self.patch.clone().unwrap_or_default());
        copy
    }

    /// Folds the patch into the base maps. The snapshot sharing them must
    /// already be dropped so the maps are written in place.
    pub fn apply_any_patch(&mut self) {
        let Some(patch) = self.patch.take() else {
            return;
        };
        self.variables.apply_patch(&patch);
        if !patch.visit_counts().is_empty() {
            let counts = Rc::make_mut(&mut self.visit_counts);
            for (path, count) in patch.visit_counts() {
                counts.insert(path.clone(), *count);
            }
        }
        if !patch.turn_indices().is_empty() {
            let indices = Rc::make_mut(&mut self.turn_indices);
            for (path, index) in patch.turn_indices() {
                indices.insert(path.clone(), *index);
            }
        }
    }

    /// Drops a pending overlay without folding it in. Used on the state a
    /// snapshot is restored to.
    pub fn restore_after_patch(&mut self) {
        self.patch = None;
    }

    // Flows

    pub fn current_flow_name(&self) -> &str {
        &self.current_flow.name
    }

    pub fn current_flow_is_default_flow(&self) -> bool {
        self.current_flow.name == DEFAULT_FLOW_NAME
    }

    /// Named flows in use, excluding the default flow.
    pub fn alive_flow_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .other_flows
            .keys()
            .chain(std::iter::once(&self.current_flow.name))
            .filter(|name| name.as_str() != DEFAULT_FLOW_NAME)
            .cloned()
            .collect();
        names.sort();
        names
    }

    pub fn switch_flow(&mut self, name: &str) {
        if name == self.current_flow.name {
            return;
        }
        let start_of_root = self.start_of_root;
        let flow = self
            .other_flows
            .remove(name)
            .unwrap_or_else(|| Flow::new(name, start_of_root));
        let previous = std::mem::replace(&mut self.current_flow, flow);
        self.other_flows.insert(previous.name.clone(), previous);
    }

    pub fn switch_to_default_flow(&mut self) {
        self.switch_flow(DEFAULT_FLOW_NAME);
    }

    pub fn remove_flow(&mut self, name: &str) -> Result<(), InkError> {
        if name == DEFAULT_FLOW_NAME {
            return Err(InkError::new(
                "STATE_REMOVE_DEFAULT_FLOW",
                "Cannot destroy default flow",
            ));
        }
        if self.current_flow.name == name {
            self.switch_to_default_flow();
        }
        self.other_flows.remove(name);
        Ok(())
    }
}

fn container_label(tree: &Tree, container: NodeId) -> String {
    tree.container(container)
        .and_then(|found| found.name.clone())
        .unwrap_or_else(|| tree.path_string(container))
}

fn debug_suffix(tree: &Tree, container: NodeId) -> String {
    tree.debug_metadata_of(container)
        .map(|metadata| format!(" - on {}", metadata))
        .unwrap_or_default()
}

#[cfg(test)]
mod state_tests;
