use std::rc::Rc;

use ink_core::InkError;

use crate::callstack::PushPopType;
use crate::list::InkList;
use crate::object::{ControlCommand, Divert, NodeId, NodeKind, RtObject};
use crate::pointer::Pointer;
use crate::rng::SeededRandom;
use crate::state::output::clean_output_whitespace;
use crate::tree::Tree;
use crate::value::Value;

use super::Story;

impl Story {
    /// Executes logic and flow-control content in place. Returns `false`
    /// for ordinary content that the caller should emit.
    pub(crate) fn perform_logic_and_flow_control(&mut self, current: NodeId) -> Result<bool, InkError> {
        let tree = Rc::clone(&self.tree);
        match tree.kind(current) {
            NodeKind::Divert(divert) => self.perform_divert(&tree, current, divert),
            NodeKind::Control(command) => {
                self.perform_control_command(&tree, *command)?;
                Ok(true)
            }
            NodeKind::VariableAssignment(assignment) => {
                let assigned = match self.state.pop_evaluation_stack()? {
                    RtObject::Value(value) => value,
                    other => {
                        return Err(InkError::new(
                            "STORY_ASSIGN_NON_VALUE",
                            format!(
                                "Tried to assign {} to variable '{}', which is not a value",
                                other, assignment.name
                            ),
                        ))
                    }
                };
                self.state.assign_variable(assignment, assigned)?;
                Ok(true)
            }
            NodeKind::VariableReference(reference) => {
                let found = if let Some(path) = &reference.path_for_count {
                    let counted = tree.count_target(current).filter(|container| {
                        tree.container(*container)
                            .is_some_and(|found| found.visits_should_be_counted)
                    });
                    match counted {
                        Some(container) => {
                            Value::Int(self.state.visit_count_for_container(&tree, container)?)
                        }
                        None => {
                            self.warning(format!(
                                "Read count for target ({}) unknown. Using 0.",
                                path
                            ));
                            Value::Int(0)
                        }
                    }
                } else {
                    let name = reference.name.as_deref().unwrap_or_default();
                    match self.state.variable_value(name, -1) {
                        Some(value) => value,
                        None => {
                            self.warning(format!(
                                "Variable not found: '{}'. Using default value of 0 (false). This can happen with temporary variables if the declaration hasn't yet been hit. Globals are always given a default value on load if a value doesn't exist in the save state.",
                                name
                            ));
                            Value::Int(0)
                        }
                    }
                };
                self.state.push_evaluation_stack(RtObject::Value(found));
                Ok(true)
            }
            NodeKind::Native(op) => {
                let params = self.state.pop_evaluation_stack_n(op.number_of_parameters())?;
                let result = self.natives.call(*op, &params, &self.lists)?;
                self.state.push_evaluation_stack(RtObject::Value(result));
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn perform_divert(&mut self, tree: &Tree, current: NodeId, divert: &Divert) -> Result<bool, InkError> {
        if divert.is_conditional {
            let condition = self.state.pop_evaluation_stack()?;
            if !truthy(&condition)? {
                return Ok(true);
            }
        }

        if let Some(name) = &divert.variable_divert_name {
            match self.state.variable_value(name, -1) {
                Some(Value::DivertTarget(path)) => {
                    self.state.diverted_pointer = self.pointer_at_path(&path)?;
                }
                Some(other) => {
                    let contents = match other {
                        Value::Int(0) => "was empty/null (the value 0).".to_string(),
                        other => format!("contained '{}'.", other),
                    };
                    return Err(InkError::new(
                        "STORY_DIVERT_VARIABLE",
                        format!(
                            "Tried to divert to a target from a variable, but the variable ({}) didn't contain a divert target, it {}",
                            name, contents
                        ),
                    ));
                }
                None => {
                    return Err(InkError::new(
                        "STORY_DIVERT_VARIABLE",
                        format!(
                            "Tried to divert using a target from a variable that could not be found ({})",
                            name
                        ),
                    ))
                }
            }
        } else if divert.is_external {
            let name = divert.target_path_string().unwrap_or_default();
            self.call_external_function(&name, divert.external_args)?;
            return Ok(true);
        } else {
            self.state.diverted_pointer = tree.divert_target_pointer(current);
        }

        if divert.pushes_to_stack {
            let output_length = self.state.output_stream().len();
            self.state
                .callstack_mut()
                .push(divert.stack_push_type, 0, output_length);
        }

        if self.state.diverted_pointer.is_null() {
            let message = match tree
                .debug_metadata_of(current)
                .and_then(|metadata| metadata.source_name.as_ref())
            {
                Some(source_name) => format!("Divert target doesn't exist: {}", source_name),
                None => format!("Divert resolution failed: {}", divert),
            };
            return Err(InkError::new("STORY_DIVERT_TARGET", message));
        }
        Ok(true)
    }

    fn perform_control_command(&mut self, tree: &Tree, command: ControlCommand) -> Result<(), InkError> {
        match command {
            ControlCommand::EvalStart => {
                if self.state.in_expression_evaluation() {
                    return Err(contract_error("Already in expression evaluation?"));
                }
                self.state.set_in_expression_evaluation(true);
            }
            ControlCommand::EvalEnd => {
                if !self.state.in_expression_evaluation() {
                    return Err(contract_error("Not in expression evaluation mode"));
                }
                self.state.set_in_expression_evaluation(false);
            }
            ControlCommand::EvalOutput => {
                if !self.state.evaluation_stack().is_empty() {
                    let output = self.state.pop_evaluation_stack()?;
                    if output != RtObject::Void {
                        self.state.push_to_output_stream(RtObject::text(output.to_string()));
                    }
                }
            }
            ControlCommand::NoOp | ControlCommand::StartThread => {}
            ControlCommand::Duplicate => {
                let top = self
                    .state
                    .peek_evaluation_stack()
                    .cloned()
                    .ok_or_else(|| contract_error("Nothing to duplicate on the evaluation stack"))?;
                self.state.push_evaluation_stack(top);
            }
            ControlCommand::PopEvaluatedValue => {
                self.state.pop_evaluation_stack()?;
            }
            ControlCommand::PopFunction | ControlCommand::PopTunnel => {
                self.perform_pop(command)?;
            }
            ControlCommand::BeginString => {
                self.state
                    .push_to_output_stream(RtObject::Command(ControlCommand::BeginString));
                if !self.state.in_expression_evaluation() {
                    return Err(contract_error(
                        "Expected to be in an expression when evaluating a string",
                    ));
                }
                self.state.set_in_expression_evaluation(false);
            }
            ControlCommand::BeginTag => {
                self.state
                    .push_to_output_stream(RtObject::Command(ControlCommand::BeginTag));
            }
            ControlCommand::EndTag => {
                if self.state.in_string_evaluation() {
                    self.end_tag_in_string_evaluation()?;
                } else {
                    self.state
                        .push_to_output_stream(RtObject::Command(ControlCommand::EndTag));
                }
            }
            ControlCommand::EndString => self.end_string_evaluation(),
            ControlCommand::ChoiceCount => {
                let count = self.state.generated_choices().len() as i32;
                self.state.push_evaluation_stack(RtObject::Value(Value::Int(count)));
            }
            ControlCommand::Turns => {
                let turns = self.state.current_turn_index() + 1;
                self.state.push_evaluation_stack(RtObject::Value(Value::Int(turns)));
            }
            ControlCommand::TurnsSince | ControlCommand::ReadCount => {
                self.perform_count_lookup(tree, command)?;
            }
            ControlCommand::Random => self.perform_random()?,
            ControlCommand::SeedRandom => {
                let seed = pop_int(self, "Invalid value passed to SEED_RANDOM")?;
                self.state.story_seed = seed;
                self.state.previous_random = 0;
                self.state.push_evaluation_stack(RtObject::Void);
            }
            ControlCommand::VisitIndex => {
                let container = self
                    .state
                    .current_pointer()
                    .container
                    .ok_or_else(|| contract_error("Visit index read with no current container"))?;
                let count = self.state.visit_count_for_container(tree, container)? - 1;
                self.state.push_evaluation_stack(RtObject::Value(Value::Int(count)));
            }
            ControlCommand::SequenceShuffleIndex => {
                let index = self.next_sequence_shuffle_index(tree)?;
                self.state.push_evaluation_stack(RtObject::Value(Value::Int(index)));
            }
            ControlCommand::Done => {
                if self.state.callstack().can_pop_thread() {
                    self.state.callstack_mut().pop_thread()?;
                } else {
                    self.state.did_safe_exit = true;
                    self.state.set_current_pointer(Pointer::NULL);
                }
            }
            ControlCommand::End => self.state.force_end(),
            ControlCommand::ListFromInt => self.perform_list_from_int()?,
            ControlCommand::ListRange => {
                let max = pop_value(self, "Expected list, minimum and maximum for LIST_RANGE")?;
                let min = pop_value(self, "Expected list, minimum and maximum for LIST_RANGE")?;
                let target = match pop_value(self, "Expected list, minimum and maximum for LIST_RANGE")? {
                    Value::List(list) => list,
                    _ => {
                        return Err(InkError::new(
                            "STORY_LIST_RANGE",
                            "Expected list, minimum and maximum for LIST_RANGE",
                        ))
                    }
                };
                let result = target.list_with_sub_range(&min, &max)?;
                self.state.push_evaluation_stack(RtObject::Value(Value::List(result)));
            }
            ControlCommand::ListRandom => self.perform_list_random()?,
        }
        Ok(())
    }

    fn perform_pop(&mut self, command: ControlCommand) -> Result<(), InkError> {
        let pop_type = if command == ControlCommand::PopFunction {
            PushPopType::Function
        } else {
            PushPopType::Tunnel
        };

        // `->-> target` leaves an override on the stack; plain `->->` leaves void.
        let mut override_tunnel_return = None;
        if pop_type == PushPopType::Tunnel {
            match self.state.pop_evaluation_stack()? {
                RtObject::Value(Value::DivertTarget(path)) => override_tunnel_return = Some(path),
                RtObject::Void => {}
                _ => return Err(contract_error("Expected void if ->-> doesn't override target")),
            }
        }

        if self.state.try_exit_function_evaluation_from_game() {
            return Ok(());
        }

        let callstack = self.state.callstack();
        let current_type = callstack.current_element().push_pop_type;
        if current_type != pop_type || !callstack.can_pop() {
            let expected = if !callstack.can_pop() {
                "end of flow (-> END or choice)"
            } else {
                pop_statement_name(current_type)
            };
            return Err(InkError::new(
                "STORY_POP_MISMATCH",
                format!("Found {}, when expected {}", pop_statement_name(pop_type), expected),
            ));
        }

        self.state.pop_callstack(None)?;
        if let Some(path) = override_tunnel_return {
            self.state.diverted_pointer = self.pointer_at_path(&path)?;
        }
        Ok(())
    }

    /// Collapses the text since the matching begin-tag into one tag value
    /// on the evaluation stack, for choice tags.
    fn end_tag_in_string_evaluation(&mut self) -> Result<(), InkError> {
        let mut pieces = Vec::new();
        let mut consumed = 0;
        for object in self.state.output_stream().iter().rev() {
            consumed += 1;
            match object {
                RtObject::Command(ControlCommand::BeginTag) => break,
                RtObject::Command(_) => {
                    return Err(InkError::new(
                        "STORY_TAG_CONTENT",
                        "Unexpected ControlCommand while extracting tag from choice",
                    ))
                }
                RtObject::Value(Value::String(text)) => pieces.push(text.clone()),
                _ => {}
            }
        }
        self.state.pop_from_output_stream(consumed);

        pieces.reverse();
        let tag = clean_output_whitespace(&pieces.concat());
        self.state.push_evaluation_stack(RtObject::Tag(tag));
        Ok(())
    }

    /// Turns the output since the matching begin-string into a string value.
    /// Tags produced inside are moved back to the output.
    fn end_string_evaluation(&mut self) {
        let mut pieces = Vec::new();
        let mut retained_tags = Vec::new();
        let mut consumed = 0;
        for object in self.state.output_stream().iter().rev() {
            consumed += 1;
            match object {
                RtObject::Command(ControlCommand::BeginString) => break,
                RtObject::Tag(_) => retained_tags.push(object.clone()),
                RtObject::Value(Value::String(text)) => pieces.push(text.clone()),
                _ => {}
            }
        }
        self.state.pop_from_output_stream(consumed);

        for tag in retained_tags.into_iter().rev() {
            self.state.push_to_output_stream(tag);
        }
        pieces.reverse();
        self.state.set_in_expression_evaluation(true);
        self.state
            .push_evaluation_stack(RtObject::Value(Value::String(pieces.concat())));
    }

    fn perform_count_lookup(&mut self, tree: &Tree, command: ControlCommand) -> Result<(), InkError> {
        let target = self.state.pop_evaluation_stack()?;
        let path = match target {
            RtObject::Value(Value::DivertTarget(path)) => path,
            other => {
                let note = if matches!(other, RtObject::Value(Value::Int(_))) {
                    ". Did you accidentally pass a read count ('knot_name') instead of a target ('-> knot_name')?"
                } else {
                    ""
                };
                return Err(InkError::new(
                    "STORY_COUNT_TARGET",
                    format!(
                        "TURNS_SINCE / READ_COUNT expected a divert target (knot, stitch, label name), but saw {}{}",
                        other, note
                    ),
                ));
            }
        };

        let container = tree
            .content_at_path(tree.root(), &path, 0, None)
            .correct_obj()
            .filter(|id| tree.container(*id).is_some());
        let count = match container {
            Some(container) if command == ControlCommand::TurnsSince => {
                self.state.turns_since_for_container(tree, container)?
            }
            Some(container) => self.state.visit_count_for_container(tree, container)?,
            None => {
                self.warning(format!(
                    "Failed to find container for {} lookup at {}",
                    command, path
                ));
                if command == ControlCommand::TurnsSince {
                    -1
                } else {
                    0
                }
            }
        };
        self.state.push_evaluation_stack(RtObject::Value(Value::Int(count)));
        Ok(())
    }

    /// `RANDOM(min, max)`: reseeds from the story seed and the last draw.
    fn perform_random(&mut self) -> Result<(), InkError> {
        let max = pop_int(self, "Invalid value for maximum parameter of RANDOM(min, max)")?;
        let min = pop_int(self, "Invalid value for minimum parameter of RANDOM(min, max)")?;

        let (range, min) = if max == i32::MAX && min == i32::MIN {
            (i64::from(i32::MAX), i64::from(min) + 1)
        } else {
            (i64::from(max) - i64::from(min) + 1, i64::from(min))
        };
        if range <= 0 || range > i64::from(i32::MAX) {
            return Err(InkError::new(
                "STORY_RANDOM_RANGE",
                format!(
                    "RANDOM was called with minimum as {} and maximum as {}. The maximum must be larger",
                    min, max
                ),
            ));
        }

        let seed = self.state.story_seed.wrapping_add(self.state.previous_random);
        let next_random = SeededRandom::new(seed).next();
        let chosen = (i64::from(next_random) % range + min) as i32;
        self.state.push_evaluation_stack(RtObject::Value(Value::Int(chosen)));
        self.state.previous_random = next_random;
        Ok(())
    }

    /// Index for a shuffle sequence. Stable for one pass over the elements;
    /// each loop through the sequence draws a new order.
    fn next_sequence_shuffle_index(&mut self, tree: &Tree) -> Result<i32, InkError> {
        let element_count = pop_int(self, "expected number of elements in sequence for shuffle index")?;
        let sequence_count = pop_int(self, "expected sequence count for shuffle index")?;
        if element_count <= 0 {
            return Err(contract_error("shuffle sequence has no elements"));
        }
        let sequence_container = self
            .state
            .current_pointer()
            .container
            .ok_or_else(|| contract_error("shuffle index read with no current container"))?;

        let loop_index = sequence_count / element_count;
        let iteration_index = sequence_count % element_count;
        let sequence_hash = tree
            .path_string(sequence_container)
            .chars()
            .fold(0i32, |hash, c| hash.wrapping_add(c as i32));
        let seed = sequence_hash
            .wrapping_add(loop_index)
            .wrapping_add(self.state.story_seed);

        let mut random = SeededRandom::new(seed);
        let mut unpicked: Vec<i32> = (0..element_count).collect();
        for iteration in 0..=iteration_index {
            let chosen = random.next() as usize % unpicked.len();
            let chosen_index = unpicked.remove(chosen);
            if iteration == iteration_index {
                return Ok(chosen_index);
            }
        }
        Err(contract_error("shuffle index out of range"))
    }

    fn perform_list_from_int(&mut self) -> Result<(), InkError> {
        let value = pop_int(
            self,
            "Passed non-integer when creating a list element from a numerical value.",
        )?;
        let list_name = match self.state.pop_evaluation_stack()? {
            RtObject::Value(Value::String(name)) => name,
            other => {
                return Err(InkError::new(
                    "STORY_LIST_FROM_INT",
                    format!("Expected a list name when creating a list element, got {}", other),
                ))
            }
        };
        let definition = self.lists.list_definition(&list_name).ok_or_else(|| {
            InkError::new(
                "STORY_LIST_FROM_INT",
                format!("Failed to find LIST called {}", list_name),
            )
        })?;
        let generated = InkList::from_origin_value(definition, value);
        self.state
            .push_evaluation_stack(RtObject::Value(Value::List(generated)));
        Ok(())
    }

    fn perform_list_random(&mut self) -> Result<(), InkError> {
        let list = match self.state.pop_evaluation_stack()? {
            RtObject::Value(Value::List(list)) => list,
            _ => {
                return Err(InkError::new(
                    "STORY_LIST_RANDOM",
                    "Expected list for LIST_RANDOM",
                ))
            }
        };

        let picked = if list.is_empty() {
            InkList::new()
        } else {
            let seed = self.state.story_seed.wrapping_add(self.state.previous_random);
            let next_random = SeededRandom::new(seed).next();
            let item_index = next_random as usize % list.len();
            let mut picked = InkList::new();
            if let Some((item, value)) = list.items().nth(item_index) {
                picked.set_initial_origin_names(vec![item.origin_name.clone()]);
                picked.insert(item.clone(), value);
            }
            self.state.previous_random = next_random;
            picked
        };
        self.state
            .push_evaluation_stack(RtObject::Value(Value::List(picked)));
        Ok(())
    }
}

pub(crate) fn truthy(object: &RtObject) -> Result<bool, InkError> {
    match object {
        RtObject::Value(value) => value.is_truthy(),
        other => Err(InkError::new(
            "STORY_TRUTHINESS",
            format!("Shouldn't be checking the truthiness of {}", other),
        )),
    }
}

fn pop_value(story: &mut Story, message: &str) -> Result<Value, InkError> {
    match story.state.pop_evaluation_stack()? {
        RtObject::Value(value) => Ok(value),
        _ => Err(InkError::new("STORY_BAD_OPERAND", message)),
    }
}

fn pop_int(story: &mut Story, message: &str) -> Result<i32, InkError> {
    match story.state.pop_evaluation_stack()? {
        RtObject::Value(Value::Int(value)) => Ok(value),
        _ => Err(InkError::new("STORY_BAD_OPERAND", message)),
    }
}

fn pop_statement_name(push_pop_type: PushPopType) -> &'static str {
    match push_pop_type {
        PushPopType::Function => "function return statement (~ return)",
        PushPopType::Tunnel => "tunnel onwards statement (->->)",
        PushPopType::FunctionEvaluationFromGame => "end of a game-initiated function evaluation",
    }
}

fn contract_error(message: &str) -> InkError {
    InkError::new("STORY_INTERNAL", message)
}
