use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use ink_core::{
    CallStackSave, ChoiceSave, FlowSave, FrameSave, InkError, SaveState, ThreadSave,
    INK_SAVE_STATE_VERSION, INK_VERSION_CURRENT, MIN_COMPATIBLE_LOAD_VERSION,
};
use serde_json::Value as JsonToken;

use crate::callstack::{CallStack, Element, PushPopType, Thread};
use crate::choice::Choice;
use crate::json::{rt_object_from_token, rt_object_to_token, value_from_token, value_to_token};
use crate::path::Path;
use crate::pointer::Pointer;
use crate::tree::Tree;
use crate::value::Value;

use super::flow::Flow;
use super::StoryState;

impl StoryState {
    pub fn to_save(&self, tree: &Tree) -> SaveState {
        let mut flows = BTreeMap::new();
        for flow in self.other_flows.values().chain(std::iter::once(&self.current_flow)) {
            flows.insert(flow.name.clone(), flow_to_save(tree, flow));
        }

        let variables_state = self
            .variables
            .globals_differing_from_defaults()
            .map(|(name, value)| (name.clone(), value_to_token(value)))
            .collect();

        let current_divert_target = if self.diverted_pointer.is_null() {
            None
        } else {
            self.diverted_pointer
                .path(tree)
                .map(|path| path.components_string())
        };

        SaveState {
            flows,
            current_flow_name: self.current_flow.name.clone(),
            variables_state,
            eval_stack: self.evaluation_stack.iter().map(rt_object_to_token).collect(),
            current_divert_target,
            visit_counts: self.visit_counts.iter().map(|(k, v)| (k.clone(), *v)).collect(),
            turn_indices: self.turn_indices.iter().map(|(k, v)| (k.clone(), *v)).collect(),
            turn_idx: self.current_turn_index,
            story_seed: self.story_seed,
            previous_random: self.previous_random,
            ink_save_version: INK_SAVE_STATE_VERSION,
            ink_format_version: INK_VERSION_CURRENT,
        }
    }

    pub fn to_json(&self, tree: &Tree) -> Result<String, InkError> {
        serde_json::to_string(&self.to_save(tree)).map_err(|error| {
            InkError::new(
                "STATE_SERIALIZE",
                format!("State could not be serialized: {}", error),
            )
        })
    }

    /// Replaces this state with a saved one. Locations are resolved against
    /// `tree`; approximated locations are recorded as warnings.
    pub fn load_json(&mut self, tree: &Tree, json: &str) -> Result<(), InkError> {
        let token: JsonToken = serde_json::from_str(json).map_err(|error| {
            InkError::new(
                "STATE_PARSE",
                format!("Save state could not be parsed: {}", error),
            )
        })?;

        let version = token
            .get("inkSaveVersion")
            .and_then(JsonToken::as_i64)
            .ok_or_else(|| InkError::new("STATE_VERSION", "ink save format incorrect, can't load."))?;
        if version < i64::from(MIN_COMPATIBLE_LOAD_VERSION) {
            return Err(InkError::new(
                "STATE_VERSION",
                format!(
                    "Ink save format isn't compatible with the current version (saw '{}', but minimum is {}), so can't load.",
                    version, MIN_COMPATIBLE_LOAD_VERSION
                ),
            ));
        }
        if token.get("flows").is_none() {
            return Err(InkError::new(
                "STATE_LEGACY_FORMAT",
                "Save state has no flows; the single-flow legacy layout is not supported.",
            ));
        }

        let save: SaveState = serde_json::from_value(token).map_err(|error| {
            InkError::new(
                "STATE_PARSE",
                format!("Save state is malformed: {}", error),
            )
        })?;
        self.load_save(tree, save)
    }

    pub fn load_save(&mut self, tree: &Tree, save: SaveState) -> Result<(), InkError> {
        let mut loader = Loader {
            tree,
            warnings: Vec::new(),
        };

        let mut flows = BTreeMap::new();
        for (name, flow_save) in save.flows {
            let flow = loader.flow(&name, flow_save, self.start_of_root)?;
            flows.insert(name, flow);
        }
        let current_flow = flows.remove(&save.current_flow_name).ok_or_else(|| {
            InkError::new(
                "STATE_PARSE",
                format!("Save state has no flow named '{}'", save.current_flow_name),
            )
        })?;

        let mut globals = HashMap::new();
        for (name, token) in &save.variables_state {
            globals.insert(name.clone(), value_token(token)?);
        }

        let mut evaluation_stack = Vec::with_capacity(save.eval_stack.len());
        for token in &save.eval_stack {
            evaluation_stack.push(rt_object_from_token(token)?);
        }

        let diverted_pointer = match &save.current_divert_target {
            Some(path) => loader.pointer_at_path(&Path::parse(path))?,
            None => Pointer::NULL,
        };

        self.current_flow = current_flow;
        self.other_flows = flows;
        self.variables.load_globals(globals);
        self.evaluation_stack = evaluation_stack;
        self.diverted_pointer = diverted_pointer;
        self.visit_counts = Rc::new(save.visit_counts.into_iter().collect());
        self.turn_indices = Rc::new(save.turn_indices.into_iter().collect());
        self.current_turn_index = save.turn_idx;
        self.story_seed = save.story_seed;
        self.previous_random = save.previous_random;
        self.patch = None;

        for warning in loader.warnings {
            log::warn!("{}", warning);
            self.current_warnings.push(warning);
        }
        Ok(())
    }
}

fn value_token(token: &JsonToken) -> Result<Value, InkError> {
    value_from_token(token)?.ok_or_else(|| {
        InkError::new(
            "JSON_BAD_TOKEN",
            format!("Expected a value token, got {}", token),
        )
    })
}

fn flow_to_save(tree: &Tree, flow: &Flow) -> FlowSave {
    let mut choice_threads = BTreeMap::new();
    for choice in &flow.current_choices {
        let index = choice.thread_at_generation.thread_index;
        if flow.callstack.thread_with_index(index).is_none() {
            choice_threads.insert(index.to_string(), thread_to_save(tree, &choice.thread_at_generation));
        }
    }

    FlowSave {
        callstack: CallStackSave {
            threads: flow
                .callstack
                .threads()
                .iter()
                .map(|thread| thread_to_save(tree, thread))
                .collect(),
            thread_counter: flow.callstack.thread_counter(),
        },
        output_stream: flow.output_stream.iter().map(rt_object_to_token).collect(),
        choice_threads,
        current_choices: flow
            .current_choices
            .iter()
            .map(|choice| ChoiceSave {
                text: choice.text.clone(),
                index: choice.index,
                original_choice_path: choice.source_path.clone(),
                original_thread_index: choice.thread_at_generation.thread_index,
                target_path: choice.path_string_on_choice(),
                tags: choice.tags.clone(),
            })
            .collect(),
    }
}

fn thread_to_save(tree: &Tree, thread: &Thread) -> ThreadSave {
    ThreadSave {
        callstack: thread
            .callstack
            .iter()
            .map(|element| {
                let container_path = element
                    .current_pointer
                    .container
                    .map(|container| tree.path_of(container).components_string());
                FrameSave {
                    container_path,
                    index: element.current_pointer.index,
                    in_expression_evaluation: element.in_expression_evaluation,
                    push_pop_type: element.push_pop_type.as_int() as i32,
                    temporaries: element
                        .temporary_variables
                        .iter()
                        .map(|(name, value)| (name.clone(), value_to_token(value)))
                        .collect(),
                }
            })
            .collect(),
        thread_index: thread.thread_index,
        previous_content_object: thread
            .previous_pointer
            .resolve(tree)
            .map(|node| tree.path_string(node)),
    }
}

struct Loader<'a> {
    tree: &'a Tree,
    warnings: Vec<String>,
}

impl Loader<'_> {
    fn flow(&mut self, name: &str, save: FlowSave, start_of_root: Pointer) -> Result<Flow, InkError> {
        if save.callstack.threads.is_empty() {
            return Err(InkError::new(
                "STATE_PARSE",
                format!("Flow '{}' has no threads in its call stack", name),
            ));
        }
        let mut threads = Vec::with_capacity(save.callstack.threads.len());
        for thread in &save.callstack.threads {
            threads.push(self.thread(thread)?);
        }
        let callstack = CallStack::from_parts(threads, save.callstack.thread_counter, start_of_root);

        let mut output_stream = Vec::with_capacity(save.output_stream.len());
        for token in &save.output_stream {
            output_stream.push(rt_object_from_token(token)?);
        }

        let mut current_choices = Vec::with_capacity(save.current_choices.len());
        for choice in save.current_choices {
            let thread_at_generation = match callstack.thread_with_index(choice.original_thread_index) {
                Some(thread) => thread.clone(),
                None => {
                    let saved = save
                        .choice_threads
                        .get(&choice.original_thread_index.to_string())
                        .ok_or_else(|| {
                            InkError::new(
                                "STATE_PARSE",
                                format!(
                                    "Save state has no thread {} for choice '{}'",
                                    choice.original_thread_index, choice.text
                                ),
                            )
                        })?;
                    self.thread(saved)?
                }
            };
            current_choices.push(Choice {
                text: choice.text,
                index: choice.index,
                source_path: choice.original_choice_path,
                target_path: Path::parse(&choice.target_path),
                is_invisible_default: false,
                tags: choice.tags,
                original_thread_index: choice.original_thread_index,
                thread_at_generation,
            });
        }

        Ok(Flow {
            name: name.to_string(),
            callstack,
            output_stream,
            current_choices,
        })
    }

    fn thread(&mut self, save: &ThreadSave) -> Result<Thread, InkError> {
        if save.callstack.is_empty() {
            return Err(InkError::new(
                "STATE_PARSE",
                format!("Thread {} has an empty call stack", save.thread_index),
            ));
        }
        let mut callstack = Vec::with_capacity(save.callstack.len());
        for frame in &save.callstack {
            let push_pop_type = PushPopType::from_int(i64::from(frame.push_pop_type)).ok_or_else(|| {
                InkError::new(
                    "STATE_PARSE",
                    format!("Unknown call stack frame type {}", frame.push_pop_type),
                )
            })?;

            let pointer = match &frame.container_path {
                Some(path_string) => {
                    let path = Path::parse(path_string);
                    let result = self.tree.content_at_path(self.tree.root(), &path, 0, None);
                    let container = result.container(self.tree).ok_or_else(|| {
                        InkError::new(
                            "STATE_LOCATION_MISSING",
                            format!(
                                "When loading state, internal story location couldn't be found: {}. Has the story changed since this save data was created?",
                                path_string
                            ),
                        )
                    })?;
                    if result.approximate {
                        self.warnings.push(format!(
                            "When loading state, exact internal story location couldn't be found: '{}', so it was approximated to '{}' to recover. Has the story changed since this save data was created?",
                            path_string,
                            self.tree.path_string(container)
                        ));
                    }
                    Pointer::new(container, frame.index)
                }
                None => Pointer::NULL,
            };

            let mut element = Element::new(push_pop_type, pointer, frame.in_expression_evaluation);
            for (name, token) in &frame.temporaries {
                element
                    .temporary_variables
                    .insert(name.clone(), value_token(token)?);
            }
            callstack.push(element);
        }

        let previous_pointer = match &save.previous_content_object {
            Some(path) => self.pointer_at_path(&Path::parse(path))?,
            None => Pointer::NULL,
        };

        Ok(Thread {
            callstack,
            thread_index: save.thread_index,
            previous_pointer,
        })
    }

    fn pointer_at_path(&mut self, path: &Path) -> Result<Pointer, InkError> {
        let (pointer, result) = self.tree.pointer_at_path(path);
        if pointer.is_null() {
            return Err(InkError::new(
                "STATE_LOCATION_MISSING",
                format!(
                    "Failed to find content at path '{}', and no approximation of it was possible.",
                    path
                ),
            ));
        }
        if result.approximate {
            self.warnings.push(format!(
                "Failed to find content at path '{}', so it was approximated.",
                path
            ));
        }
        Ok(pointer)
    }
}
