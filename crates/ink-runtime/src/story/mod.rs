//! The story driver: owns the compiled tree and runs it step by step.

mod callbacks;
mod choices;
mod control_flow;
mod external;
mod step;

use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use ink_core::InkError;

use crate::choice::Choice;
use crate::json::{read_story, StoryDocument};
use crate::list::ListDefinitionsOrigin;
use crate::native::NativeFunctionTable;
use crate::object::{ControlCommand, DebugMetadata, NodeKind};
use crate::path::{Component, Path};
use crate::pointer::Pointer;
use crate::rng::clock_seed;
use crate::state::StoryState;
use crate::tree::Tree;
use crate::value::Value;

pub use callbacks::{ObserverId, StoryCallbacks, VariableObserver};
pub use external::{ExternalFunction, FunctionEvaluation};

use callbacks::ObserverEntry;
use external::ExternalFunctionDef;

/// Name of the root container holding global variable declarations.
const GLOBAL_DECL: &str = "global decl";

#[derive(Debug, Clone, Default)]
pub struct StoryOptions {
    /// Divert into a same-named ink function when an external is unbound.
    pub allow_external_function_fallbacks: bool,
    /// Seed for `RANDOM` and shuffles; derived from the clock when unset.
    pub random_seed: Option<i32>,
    /// Errors out of a continue that runs more steps than this.
    pub max_steps_per_continue: Option<usize>,
}

pub struct Story {
    tree: Rc<Tree>,
    lists: Rc<ListDefinitionsOrigin>,
    natives: NativeFunctionTable,
    state: StoryState,
    ink_version: i32,
    options: StoryOptions,
    state_snapshot_at_last_newline: Option<StoryState>,
    saw_lookahead_unsafe_function_after_newline: bool,
    recursive_continue_count: u32,
    async_continue_active: bool,
    has_validated_externals: bool,
    externals: HashMap<String, ExternalFunctionDef>,
    observers: BTreeMap<String, Vec<ObserverEntry>>,
    next_observer_id: u64,
    callbacks: Option<Box<dyn StoryCallbacks>>,
}

impl Story {
    pub fn new(json: &str) -> Result<Self, InkError> {
        Self::with_options(json, StoryOptions::default())
    }

    pub fn with_options(json: &str, options: StoryOptions) -> Result<Self, InkError> {
        Self::from_document(read_story(json)?, options)
    }

    pub fn from_document(document: StoryDocument, options: StoryOptions) -> Result<Self, InkError> {
        let tree = Rc::new(document.tree);
        let lists = Rc::new(document.lists);
        let state = Self::fresh_state(&tree, &lists, &options);
        let mut story = Self {
            tree,
            lists,
            natives: NativeFunctionTable::build(),
            state,
            ink_version: document.ink_version,
            options,
            state_snapshot_at_last_newline: None,
            saw_lookahead_unsafe_function_after_newline: false,
            recursive_continue_count: 0,
            async_continue_active: false,
            has_validated_externals: false,
            externals: HashMap::new(),
            observers: BTreeMap::new(),
            next_observer_id: 0,
            callbacks: None,
        };
        story.reset_globals()?;
        Ok(story)
    }

    fn fresh_state(tree: &Tree, lists: &Rc<ListDefinitionsOrigin>, options: &StoryOptions) -> StoryState {
        let seed = options.random_seed.unwrap_or_else(clock_seed);
        StoryState::new(Pointer::start_of(tree.root()), Rc::clone(lists), seed)
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn ink_version(&self) -> i32 {
        self.ink_version
    }

    pub fn list_definitions(&self) -> &ListDefinitionsOrigin {
        &self.lists
    }

    pub fn state(&self) -> &StoryState {
        &self.state
    }

    pub fn options(&self) -> &StoryOptions {
        &self.options
    }

    /// Once callbacks are installed, errors go to `on_error` instead of
    /// being returned from continue calls.
    pub fn set_callbacks(&mut self, callbacks: Box<dyn StoryCallbacks>) {
        self.callbacks = Some(callbacks);
    }

    pub fn take_callbacks(&mut self) -> Option<Box<dyn StoryCallbacks>> {
        self.callbacks.take()
    }

    // Output

    pub fn can_continue(&self) -> bool {
        self.state.can_continue()
    }

    pub fn async_continue_complete(&self) -> bool {
        !self.async_continue_active
    }

    pub fn current_text(&self) -> Result<String, InkError> {
        self.if_async_we_cant("call current_text since it's a work in progress")?;
        Ok(self.state.current_text())
    }

    pub fn current_tags(&self) -> Result<Vec<String>, InkError> {
        self.if_async_we_cant("call current_tags since it's a work in progress")?;
        Ok(self.state.current_tags())
    }

    /// Choices the player can pick from, without invisible defaults.
    pub fn current_choices(&self) -> Vec<Choice> {
        self.state
            .current_choices()
            .iter()
            .filter(|choice| !choice.is_invisible_default)
            .cloned()
            .enumerate()
            .map(|(index, mut choice)| {
                choice.index = index;
                choice
            })
            .collect()
    }

    pub fn current_errors(&self) -> &[String] {
        self.state.current_errors()
    }

    pub fn current_warnings(&self) -> &[String] {
        self.state.current_warnings()
    }

    pub fn has_error(&self) -> bool {
        self.state.has_error()
    }

    pub fn has_warning(&self) -> bool {
        self.state.has_warning()
    }

    pub fn reset_errors(&mut self) {
        self.state.reset_errors();
    }

    // Navigation

    pub fn choose_choice_index(&mut self, index: usize) -> Result<(), InkError> {
        let choice = self.current_choices().get(index).cloned().ok_or_else(|| {
            InkError::new(
                "STORY_CHOICE_OUT_OF_RANGE",
                format!("choice out of range: {}", index),
            )
        })?;
        if let Some(callbacks) = self.callbacks.as_mut() {
            callbacks.on_make_choice(&choice);
        }
        self.state
            .callstack_mut()
            .set_current_thread(choice.thread_at_generation.clone())?;
        self.choose_path(&choice.target_path, true)
    }

    /// Jumps to a knot or stitch by name, passing `arguments` to it.
    pub fn choose_path_string(
        &mut self,
        path: &str,
        reset_callstack: bool,
        arguments: &[Value],
    ) -> Result<(), InkError> {
        self.if_async_we_cant("call choose_path_string right now")?;
        if let Some(callbacks) = self.callbacks.as_mut() {
            callbacks.on_choose_path_string(path, arguments);
        }

        if reset_callstack {
            self.reset_callstack()?;
        } else if self.state.callstack().current_element().push_pop_type
            == crate::callstack::PushPopType::Function
        {
            let detail = self
                .state
                .callstack()
                .current_element()
                .current_pointer
                .container
                .map(|container| format!("({}) ", self.tree.path_string(container)))
                .unwrap_or_default();
            return Err(InkError::new(
                "STORY_CHOOSE_IN_FUNCTION",
                format!(
                    "Story was running a function {}when you called choose_path_string({}) - this is almost certainly not what you want! Full stack trace: \n{}",
                    detail,
                    path,
                    self.state.callstack().call_stack_trace(&self.tree)
                ),
            ));
        }

        self.state.pass_arguments_to_evaluation_stack(arguments)?;
        self.choose_path(&Path::parse(path), true)
    }

    pub(crate) fn choose_path(&mut self, path: &Path, incrementing_turn_index: bool) -> Result<(), InkError> {
        let pointer = self.pointer_at_path(path)?;
        self.state.set_chosen_path(pointer, incrementing_turn_index);
        self.visit_changed_containers_due_to_divert();
        Ok(())
    }

    /// Pointer for an absolute path. Unresolvable paths are errors and
    /// approximated ones are warnings.
    pub(crate) fn pointer_at_path(&mut self, path: &Path) -> Result<Pointer, InkError> {
        if path.is_empty() {
            return Ok(Pointer::NULL);
        }

        let (pointer, result) = self.tree.pointer_at_path(path);
        let searched_length = match path.last_component() {
            Some(Component::Index(_)) => path.len() - 1,
            _ => path.len(),
        };
        let hit_root = result.obj == Some(self.tree.root()) && searched_length > 0;
        let Some(found) = result.obj.filter(|_| !hit_root) else {
            return Err(InkError::new(
                "STORY_PATH_NOT_FOUND",
                format!(
                    "Failed to find content at path '{}', and no approximation of it was possible.",
                    path
                ),
            ));
        };
        if result.approximate {
            let approximation = self.tree.path_string(found);
            self.warning(format!(
                "Failed to find content at path '{}', so it was approximated to: '{}'.",
                path, approximation
            ));
        }
        Ok(pointer)
    }

    // Counts and tags

    pub fn visit_count_at_path_string(&self, path: &str) -> i32 {
        self.state.visit_count_at_path_string(path)
    }

    /// Tags written at the very top of the story.
    pub fn global_tags(&self) -> Result<Vec<String>, InkError> {
        self.tags_at_start_of_flow_container_with_path_string("")
    }

    /// Tags at the start of a knot or stitch, e.g. `"knot.stitch"`.
    pub fn tags_for_content_at_path(&self, path: &str) -> Result<Vec<String>, InkError> {
        self.tags_at_start_of_flow_container_with_path_string(path)
    }

    fn tags_at_start_of_flow_container_with_path_string(&self, path: &str) -> Result<Vec<String>, InkError> {
        let path = Path::parse(path);
        let mut flow_container = self
            .tree
            .content_at_path(self.tree.root(), &path, 0, None)
            .container(&self.tree)
            .ok_or_else(|| {
                InkError::new(
                    "STORY_PATH_NOT_FOUND",
                    format!("Content at path not found: {}", path),
                )
            })?;

        // Descend to the first real content.
        while let Some(first) = self
            .tree
            .container(flow_container)
            .and_then(|container| container.content.first().copied())
            .filter(|first| self.tree.container(*first).is_some())
        {
            flow_container = first;
        }

        let mut tags = Vec::new();
        let mut in_tag = false;
        let content = self
            .tree
            .container(flow_container)
            .map(|container| container.content.as_slice())
            .unwrap_or_default();
        for child in content {
            match self.tree.kind(*child) {
                NodeKind::Control(ControlCommand::BeginTag) => in_tag = true,
                NodeKind::Control(ControlCommand::EndTag) => in_tag = false,
                NodeKind::Control(_) => {}
                NodeKind::Value(Value::String(text)) if in_tag => tags.push(text.clone()),
                _ if in_tag => {
                    return Err(InkError::new(
                        "STORY_DYNAMIC_TAG",
                        "Tag contained non-text content. Only plain text is allowed when using global_tags or tags_for_content_at_path. If you want to evaluate dynamic content, you need to use continue_story.",
                    ))
                }
                NodeKind::Tag(text) => tags.push(text.clone()),
                _ => break,
            }
        }
        Ok(tags)
    }

    // Variables

    pub fn variable(&self, name: &str) -> Option<Value> {
        self.state.global_variable(name)
    }

    /// Host write of a declared global. Observers hear about it at once
    /// unless a continue is collecting changes.
    pub fn set_variable(&mut self, name: &str, value: Value) -> Result<(), InkError> {
        self.state.set_global_variable(name, value)?;
        if self.recursive_continue_count == 0 && !self.async_continue_active {
            let changed = self.state.variables.stop_variable_observation();
            self.notify_variable_observers(changed);
        }
        Ok(())
    }

    // Flows

    pub fn current_flow_name(&self) -> &str {
        self.state.current_flow_name()
    }

    pub fn current_flow_is_default_flow(&self) -> bool {
        self.state.current_flow_is_default_flow()
    }

    pub fn alive_flow_names(&self) -> Vec<String> {
        self.state.alive_flow_names()
    }

    pub fn switch_flow(&mut self, name: &str) -> Result<(), InkError> {
        self.if_async_we_cant("switch flow")?;
        self.state.switch_flow(name);
        Ok(())
    }

    pub fn switch_to_default_flow(&mut self) -> Result<(), InkError> {
        self.if_async_we_cant("switch flow")?;
        self.state.switch_to_default_flow();
        Ok(())
    }

    pub fn remove_flow(&mut self, name: &str) -> Result<(), InkError> {
        self.if_async_we_cant("remove flow")?;
        self.state.remove_flow(name)
    }

    // Reset and persistence

    pub fn reset_state(&mut self) -> Result<(), InkError> {
        self.if_async_we_cant("reset state")?;
        self.state = Self::fresh_state(&self.tree, &self.lists, &self.options);
        self.reset_globals()
    }

    /// Unwinds every flow frame so the story can be pointed somewhere new.
    pub fn reset_callstack(&mut self) -> Result<(), InkError> {
        self.if_async_we_cant("reset callstack")?;
        self.state.force_end();
        Ok(())
    }

    /// Runs the global declarations once so their values become defaults.
    fn reset_globals(&mut self) -> Result<(), InkError> {
        let has_global_decl = self
            .tree
            .container(self.tree.root())
            .is_some_and(|root| root.named_content.contains_key(GLOBAL_DECL));
        if has_global_decl {
            let original_pointer = self.state.current_pointer();
            self.choose_path(&Path::parse(GLOBAL_DECL), false)?;
            self.continue_internal(0)?;
            self.state.set_current_pointer(original_pointer);
        }
        self.state.variables.snapshot_default_globals();
        Ok(())
    }

    pub fn save_state(&self) -> Result<String, InkError> {
        self.if_async_we_cant("save state")?;
        self.state.to_json(&self.tree)
    }

    pub fn load_state(&mut self, json: &str) -> Result<(), InkError> {
        self.if_async_we_cant("load state")?;
        self.state.load_json(&self.tree, json)
    }

    // Errors

    pub(crate) fn if_async_we_cant(&self, activity: &str) -> Result<(), InkError> {
        if self.async_continue_active {
            return Err(InkError::new(
                "STORY_ASYNC_ACTIVE",
                format!(
                    "Can't {}. Story is in the middle of a continue_async(). Make more continue_async() calls or a single continue_story() call beforehand.",
                    activity
                ),
            ));
        }
        Ok(())
    }

    pub(crate) fn warning(&mut self, message: impl Into<String>) {
        self.add_error(message, true);
    }

    /// Records an error or warning decorated with the best known source
    /// location. Errors also end the current run.
    pub(crate) fn add_error(&mut self, message: impl Into<String>, is_warning: bool) {
        let message = message.into();
        let kind = if is_warning { "WARNING" } else { "ERROR" };
        let pointer = self.state.current_pointer();
        let decorated = match self.current_debug_metadata() {
            Some(metadata) => format!(
                "RUNTIME {}: '{}' line {}: {}",
                kind,
                metadata.file_name.as_deref().unwrap_or_default(),
                metadata.start_line_number,
                message
            ),
            None => match pointer.path(&self.tree) {
                Some(path) => format!("RUNTIME {}: ({}): {}", kind, path, message),
                None => format!("RUNTIME {}: {}", kind, message),
            },
        };

        if is_warning {
            log::warn!("{}", decorated);
        } else {
            log::error!("{}", decorated);
        }
        self.state.add_error(decorated, is_warning);
        if !is_warning {
            self.state.force_end();
        }
    }

    fn current_debug_metadata(&self) -> Option<DebugMetadata> {
        let current = self.state.current_pointer();
        if let Some(metadata) = current
            .resolve(&self.tree)
            .and_then(|node| self.tree.debug_metadata_of(node))
        {
            return Some(metadata.clone());
        }
        self.state
            .callstack()
            .elements()
            .iter()
            .rev()
            .filter_map(|element| element.current_pointer.resolve(&self.tree))
            .find_map(|node| self.tree.debug_metadata_of(node))
            .cloned()
    }
}

#[cfg(test)]
mod story_tests;
