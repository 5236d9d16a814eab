use std::rc::Rc;
use std::time::{Duration, Instant};

use ink_core::{ErrorKind, InkError};

use crate::callstack::PushPopType;
use crate::object::{ControlCommand, NodeId, NodeKind, RtObject};
use crate::pointer::Pointer;
use crate::value::Value;

use super::Story;

/// How the output moved on while looking ahead past a newline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OutputStateChange {
    NoChange,
    ExtendedBeyondNewline,
    NewlineRemoved,
}

impl Story {
    /// Runs until the next line of output and returns it.
    pub fn continue_story(&mut self) -> Result<String, InkError> {
        self.continue_async(0)?;
        Ok(self.state.current_text())
    }

    /// Continues for at most `millis_limit` milliseconds; 0 means no limit.
    /// Check [`Story::async_continue_complete`] to see whether the line is done.
    pub fn continue_async(&mut self, millis_limit: u64) -> Result<(), InkError> {
        if !self.has_validated_externals {
            self.validate_external_bindings()?;
        }
        self.continue_internal(millis_limit)
    }

    pub fn continue_maximally(&mut self) -> Result<String, InkError> {
        self.if_async_we_cant("continue_maximally")?;
        let mut text = String::new();
        while self.can_continue() {
            text.push_str(&self.continue_story()?);
        }
        Ok(text)
    }

    pub(crate) fn continue_internal(&mut self, millis_limit: u64) -> Result<(), InkError> {
        let is_async_time_limited = millis_limit > 0;
        self.recursive_continue_count += 1;

        if !self.async_continue_active {
            self.async_continue_active = is_async_time_limited;
            if !self.can_continue() {
                self.recursive_continue_count -= 1;
                self.async_continue_active = false;
                return Err(InkError::new(
                    "STORY_CANNOT_CONTINUE",
                    "Can't continue - should check can_continue before calling continue_story",
                ));
            }
            self.state.did_safe_exit = false;
            self.state.reset_output(None);
            if self.recursive_continue_count == 1 {
                // Issues from the previous line were already reported.
                self.state.reset_errors();
                self.state.variables.start_variable_observation();
            }
        } else if !is_async_time_limited {
            self.async_continue_active = false;
        }

        let started = Instant::now();
        let limit = Duration::from_millis(millis_limit);
        let mut output_stream_ends_in_newline = false;
        let mut steps = 0usize;
        self.saw_lookahead_unsafe_function_after_newline = false;
        loop {
            match self.continue_single_step() {
                Ok(ends_in_newline) => output_stream_ends_in_newline = ends_in_newline,
                Err(error) => {
                    self.add_error(error.message, false);
                    break;
                }
            }
            if output_stream_ends_in_newline {
                break;
            }
            if self.async_continue_active && started.elapsed() > limit {
                break;
            }
            steps += 1;
            if let Some(max_steps) = self.options.max_steps_per_continue {
                if steps >= max_steps {
                    self.add_error(
                        format!(
                            "Exceeded {} steps in a single continue. The story may be stuck in a loop.",
                            max_steps
                        ),
                        false,
                    );
                    break;
                }
            }
            if !self.can_continue() {
                break;
            }
        }

        let mut changed_variables = Vec::new();
        if output_stream_ends_in_newline || !self.can_continue() {
            if self.state_snapshot_at_last_newline.is_some() {
                self.restore_state_snapshot();
            }

            if !self.can_continue() {
                if self.state.callstack().can_pop_thread() {
                    self.add_error(
                        "Thread available to pop, threads should always be flat by the end of evaluation?",
                        false,
                    );
                }
                if self.state.generated_choices().is_empty() && !self.state.did_safe_exit {
                    let callstack = self.state.callstack();
                    let message = if callstack.can_pop_type(Some(PushPopType::Tunnel)) {
                        "unexpectedly reached end of content. Do you need a '->->' to return from a tunnel?"
                    } else if callstack.can_pop_type(Some(PushPopType::Function)) {
                        "unexpectedly reached end of content. Do you need a '~ return'?"
                    } else if !callstack.can_pop() {
                        "ran out of content. Do you need a '-> DONE' or '-> END'?"
                    } else {
                        "unexpectedly reached end of content for unknown reason."
                    };
                    self.add_error(message, false);
                }
            }

            self.state.did_safe_exit = false;
            self.saw_lookahead_unsafe_function_after_newline = false;
            if self.recursive_continue_count == 1 {
                changed_variables = self.state.variables.stop_variable_observation();
            }
            self.async_continue_active = false;
            if let Some(callbacks) = self.callbacks.as_mut() {
                callbacks.on_did_continue();
            }
        }

        self.recursive_continue_count -= 1;

        if self.state.has_error() || self.state.has_warning() {
            match self.callbacks.as_mut() {
                Some(callbacks) => {
                    for error in self.state.current_errors() {
                        callbacks.on_error(error, ErrorKind::Error);
                    }
                    for warning in self.state.current_warnings() {
                        callbacks.on_error(warning, ErrorKind::Warning);
                    }
                    self.state.reset_errors();
                }
                None => return Err(self.aggregated_error()),
            }
        }

        self.notify_variable_observers(changed_variables);
        Ok(())
    }

    fn aggregated_error(&self) -> InkError {
        let errors = self.state.current_errors();
        let warnings = self.state.current_warnings();
        let mut summary = String::from("Ink had ");
        if !errors.is_empty() {
            summary.push_str(&plural(errors.len(), "error"));
            if !warnings.is_empty() {
                summary.push_str(" and ");
            }
        }
        if !warnings.is_empty() {
            summary.push_str(&plural(warnings.len(), "warning"));
        }
        summary.push_str(
            ". It is strongly suggested that you install callbacks to handle errors. The first issue was: ",
        );
        if let Some(first) = errors.first().or_else(|| warnings.first()) {
            summary.push_str(first);
        }

        if errors.is_empty() {
            InkError::warning("STORY_RUNTIME_WARNINGS", summary)
        } else {
            InkError::new("STORY_RUNTIME_ERRORS", summary)
        }
    }

    /// One step plus the newline lookahead bookkeeping. `true` when a
    /// complete line is ready.
    fn continue_single_step(&mut self) -> Result<bool, InkError> {
        self.step()?;

        if !self.can_continue() && !self.state.callstack().element_is_evaluate_from_game() {
            self.try_follow_default_invisible_choice()?;
        }

        if self.state.in_string_evaluation() {
            return Ok(false);
        }

        if let Some(snapshot) = &self.state_snapshot_at_last_newline {
            let change = calculate_newline_output_state_change(
                &snapshot.current_text(),
                &self.state.current_text(),
                snapshot.current_tags().len(),
                self.state.current_tags().len(),
            );
            if change == OutputStateChange::ExtendedBeyondNewline
                || self.saw_lookahead_unsafe_function_after_newline
            {
                self.restore_state_snapshot();
                return Ok(true);
            }
            if change == OutputStateChange::NewlineRemoved {
                self.discard_snapshot();
            }
        }

        if self.state.output_stream_ends_in_newline() {
            if self.can_continue() {
                if self.state_snapshot_at_last_newline.is_none() {
                    self.state_snapshot();
                }
            } else {
                self.discard_snapshot();
            }
        }

        Ok(false)
    }

    fn step(&mut self) -> Result<(), InkError> {
        let tree = Rc::clone(&self.tree);
        let mut pointer = self.state.current_pointer();
        if pointer.is_null() {
            return Ok(());
        }

        // Entering a container descends to its first leaf, counting each level.
        let is_container = |id: &NodeId| tree.container(*id).is_some();
        let mut container_to_enter = pointer.resolve(&tree).filter(is_container);
        while let Some(container) = container_to_enter {
            self.visit_container(container, true);
            if tree.container(container).is_some_and(|found| found.content.is_empty()) {
                break;
            }
            pointer = Pointer::start_of(container);
            container_to_enter = pointer.resolve(&tree).filter(is_container);
        }
        self.state.set_current_pointer(pointer);

        let Some(current) = pointer.resolve(&tree) else {
            return self.next_content();
        };
        log::trace!("step {} {:?}", tree.path_string(current), tree.kind(current));

        let is_logic_or_flow_control = self.perform_logic_and_flow_control(current)?;
        if self.state.current_pointer().is_null() {
            return Ok(());
        }

        let output = match tree.kind(current) {
            NodeKind::ChoicePoint(choice_point) => {
                if let Some(choice) = self.process_choice(current, choice_point)? {
                    self.state.generated_choices_mut().push(choice);
                }
                None
            }
            NodeKind::Container(_) => None,
            _ if is_logic_or_flow_control => None,
            NodeKind::Value(Value::VariablePointer {
                name,
                context_index: -1,
            }) => {
                let context_index = self.state.callstack().context_for_variable_named(name);
                Some(RtObject::Value(Value::variable_pointer(name.clone(), context_index)))
            }
            NodeKind::Value(value) => Some(RtObject::Value(value.clone())),
            NodeKind::Glue => Some(RtObject::Glue),
            NodeKind::Tag(text) => Some(RtObject::Tag(text.clone())),
            NodeKind::Void => Some(RtObject::Void),
            _ => None,
        };

        if let Some(object) = output {
            if self.state.in_expression_evaluation() {
                self.state.push_evaluation_stack(object);
            } else {
                self.state.push_to_output_stream(object);
            }
        }

        self.next_content()?;

        // Threads start after moving past the command, so the fork resumes there.
        if let NodeKind::Control(ControlCommand::StartThread) = tree.kind(current) {
            self.state.callstack_mut().push_thread();
        }
        Ok(())
    }

    fn next_content(&mut self) -> Result<(), InkError> {
        let current = self.state.current_pointer();
        self.state.set_previous_pointer(current);

        if !self.state.diverted_pointer.is_null() {
            let diverted = self.state.diverted_pointer;
            self.state.set_current_pointer(diverted);
            self.state.diverted_pointer = Pointer::NULL;
            self.visit_changed_containers_due_to_divert();
            if !self.state.current_pointer().is_null() {
                return Ok(());
            }
        }

        if self.increment_content_pointer() {
            return Ok(());
        }

        let mut did_pop = false;
        if self
            .state
            .callstack()
            .can_pop_type(Some(PushPopType::Function))
        {
            self.state.pop_callstack(Some(PushPopType::Function))?;
            // A function that ran off its end inside an expression still yields a value.
            if self.state.in_expression_evaluation() {
                self.state.push_evaluation_stack(RtObject::Void);
            }
            did_pop = true;
        } else if self.state.callstack().can_pop_thread() {
            self.state.callstack_mut().pop_thread()?;
            did_pop = true;
        } else {
            self.state.try_exit_function_evaluation_from_game();
        }

        if did_pop && !self.state.current_pointer().is_null() {
            self.next_content()?;
        }
        Ok(())
    }

    /// Moves to the next sibling, climbing out of finished containers.
    fn increment_content_pointer(&mut self) -> bool {
        let mut pointer = self.state.current_pointer();
        let Some(mut container) = pointer.container else {
            return false;
        };

        let mut successful = true;
        pointer.index += 1;
        loop {
            let length = self
                .tree
                .container(container)
                .map_or(0, |found| found.content.len());
            if (pointer.index as usize) < length {
                break;
            }
            successful = false;
            let (Some(ancestor), Some(index_in_ancestor)) =
                (self.tree.parent(container), self.tree.index_in_parent(container))
            else {
                break;
            };
            container = ancestor;
            pointer = Pointer::new(ancestor, index_in_ancestor as i32 + 1);
            successful = true;
        }

        if !successful {
            pointer = Pointer::NULL;
        }
        self.state.set_current_pointer(pointer);
        successful
    }

    pub(crate) fn visit_container(&mut self, container: NodeId, at_start: bool) {
        let Some(found) = self.tree.container(container) else {
            return;
        };
        if found.counting_at_start_only && !at_start {
            return;
        }
        if found.visits_should_be_counted {
            self.state
                .increment_visit_count_for_container(&self.tree, container);
        }
        if found.turn_index_should_be_counted {
            self.state
                .record_turn_index_visit_to_container(&self.tree, container);
        }
    }

    /// Counts containers newly entered by a jump: every ancestor of the new
    /// position up to the first one shared with the previous position.
    pub(crate) fn visit_changed_containers_due_to_divert(&mut self) {
        let tree = Rc::clone(&self.tree);
        let previous = self.state.previous_pointer();
        let pointer = self.state.current_pointer();
        if pointer.is_null() || pointer.index == -1 {
            return;
        }

        let mut previous_containers = Vec::new();
        if !previous.is_null() {
            let mut ancestor = previous
                .resolve(&tree)
                .filter(|id| tree.container(*id).is_some())
                .or(previous.container);
            while let Some(id) = ancestor {
                previous_containers.push(id);
                ancestor = tree.parent(id);
            }
        }

        let Some(mut current_child) = pointer.resolve(&tree) else {
            return;
        };
        let mut ancestor = tree.parent(current_child);
        let mut all_children_entered_at_start = true;
        while let Some(container_id) = ancestor {
            let Some(container) = tree.container(container_id) else {
                break;
            };
            if previous_containers.contains(&container_id) && !container.counting_at_start_only {
                break;
            }
            let entering_at_start = all_children_entered_at_start
                && container.content.first() == Some(&current_child);
            if !entering_at_start {
                all_children_entered_at_start = false;
            }
            self.visit_container(container_id, entering_at_start);
            current_child = container_id;
            ancestor = tree.parent(container_id);
        }
    }

    /// Follows a lone invisible default choice without asking the player.
    fn try_follow_default_invisible_choice(&mut self) -> Result<bool, InkError> {
        let choices = self.state.generated_choices();
        let Some(choice) = choices.iter().find(|choice| choice.is_invisible_default) else {
            return Ok(false);
        };
        if choices.iter().any(|choice| !choice.is_invisible_default) {
            return Ok(false);
        }
        let choice = choice.clone();

        self.state
            .callstack_mut()
            .set_current_thread(choice.thread_at_generation.clone())?;
        // Keep the captured thread intact in case the lookahead is rolled back.
        if self.state_snapshot_at_last_newline.is_some() {
            let forked = self.state.callstack_mut().fork_thread();
            self.state.callstack_mut().set_current_thread(forked)?;
        }
        self.choose_path(&choice.target_path, false)?;
        Ok(true)
    }

    // Lookahead snapshot

    fn state_snapshot(&mut self) {
        let patched = self.state.copy_and_start_patching();
        let base = std::mem::replace(&mut self.state, patched);
        self.state_snapshot_at_last_newline = Some(base);
    }

    fn restore_state_snapshot(&mut self) {
        if let Some(mut snapshot) = self.state_snapshot_at_last_newline.take() {
            snapshot.restore_after_patch();
            self.state = snapshot;
        }
    }

    fn discard_snapshot(&mut self) {
        // Dropped first so the shared maps are patched in place.
        self.state_snapshot_at_last_newline = None;
        self.state.apply_any_patch();
    }
}

fn plural(count: usize, noun: &str) -> String {
    if count == 1 {
        format!("{} {}", count, noun)
    } else {
        format!("{} {}s", count, noun)
    }
}

pub(crate) fn calculate_newline_output_state_change(
    previous_text: &str,
    current_text: &str,
    previous_tag_count: usize,
    current_tag_count: usize,
) -> OutputStateChange {
    let newline_still_exists = !previous_text.is_empty()
        && current_text.len() >= previous_text.len()
        && current_text.as_bytes()[previous_text.len() - 1] == b'\n';
    if previous_tag_count == current_tag_count
        && previous_text.len() == current_text.len()
        && newline_still_exists
    {
        return OutputStateChange::NoChange;
    }
    if !newline_still_exists {
        return OutputStateChange::NewlineRemoved;
    }
    if current_tag_count > previous_tag_count {
        return OutputStateChange::ExtendedBeyondNewline;
    }
    let extended = current_text.as_bytes()[previous_text.len()..]
        .iter()
        .any(|byte| *byte != b' ' && *byte != b'\t');
    if extended {
        OutputStateChange::ExtendedBeyondNewline
    } else {
        OutputStateChange::NoChange
    }
}
