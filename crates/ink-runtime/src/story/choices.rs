use std::rc::Rc;

use ink_core::InkError;

use crate::choice::Choice;
use crate::object::{ChoicePoint, NodeId, RtObject};
use crate::value::Value;

use super::control_flow::truthy;
use super::Story;

impl Story {
    /// Turns a choice point into a choice, consuming its condition and
    /// text from the evaluation stack. `None` when the choice is hidden.
    pub(crate) fn process_choice(
        &mut self,
        id: NodeId,
        choice_point: &ChoicePoint,
    ) -> Result<Option<Choice>, InkError> {
        let tree = Rc::clone(&self.tree);
        let mut show_choice = true;

        if choice_point.has_condition {
            let condition = self.state.pop_evaluation_stack()?;
            if !truthy(&condition)? {
                show_choice = false;
            }
        }

        let mut tags = Vec::new();
        let mut choice_only_text = String::new();
        let mut start_text = String::new();
        if choice_point.has_choice_only_content {
            choice_only_text = self.pop_choice_string_and_tags(&mut tags)?;
        }
        if choice_point.has_start_content {
            start_text = self.pop_choice_string_and_tags(&mut tags)?;
        }

        let target = tree.choice_target(id).ok_or_else(|| {
            InkError::new(
                "STORY_CHOICE_TARGET",
                format!("Choice target not found: {}", choice_point.path_on_choice),
            )
        })?;

        if choice_point.once_only && self.state.visit_count_for_container(&tree, target)? > 0 {
            show_choice = false;
        }
        if !show_choice {
            return Ok(None);
        }

        let thread_at_generation = self.state.callstack_mut().fork_thread();
        let index = self
            .state
            .generated_choices()
            .iter()
            .filter(|choice| !choice.is_invisible_default)
            .count();
        let text = format!("{}{}", start_text, choice_only_text)
            .trim_matches([' ', '\t'])
            .to_string();

        Ok(Some(Choice {
            text,
            index,
            source_path: tree.path_string(id),
            target_path: tree.path_of(target),
            is_invisible_default: choice_point.is_invisible_default,
            tags,
            original_thread_index: thread_at_generation.thread_index,
            thread_at_generation,
        }))
    }

    /// Pops one piece of choice text, then any tags evaluated just before
    /// it. Tags keep their source order.
    fn pop_choice_string_and_tags(&mut self, tags: &mut Vec<String>) -> Result<String, InkError> {
        let text = match self.state.pop_evaluation_stack()? {
            RtObject::Value(Value::String(text)) => text,
            other => {
                return Err(InkError::new(
                    "STORY_CHOICE_TEXT",
                    format!("Expected choice text on the evaluation stack, found {}", other),
                ))
            }
        };
        while let Some(RtObject::Tag(_)) = self.state.peek_evaluation_stack() {
            if let RtObject::Tag(tag) = self.state.pop_evaluation_stack()? {
                tags.insert(0, tag);
            }
        }
        Ok(text)
    }
}
