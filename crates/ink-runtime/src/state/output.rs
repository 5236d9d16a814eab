use crate::callstack::PushPopType;
use crate::object::{is_inline_whitespace, is_newline, is_non_whitespace, ControlCommand, RtObject};
use crate::value::Value;

use super::StoryState;

impl StoryState {
    pub fn output_stream(&self) -> &[RtObject] {
        &self.current_flow.output_stream
    }

    pub fn reset_output(&mut self, objects: Option<Vec<RtObject>>) {
        self.current_flow.output_stream = objects.unwrap_or_default();
    }

    /// Appends to the output, splitting strings with leading or trailing
    /// newlines so that whitespace rules apply to each piece.
    pub fn push_to_output_stream(&mut self, object: RtObject) {
        if let RtObject::Value(Value::String(text)) = &object {
            if let Some(pieces) = split_head_tail_whitespace(text) {
                for piece in pieces {
                    self.push_to_output_stream_individual(RtObject::text(piece));
                }
                return;
            }
        }
        self.push_to_output_stream_individual(object);
    }

    pub fn pop_from_output_stream(&mut self, count: usize) {
        let stream = &mut self.current_flow.output_stream;
        let keep = stream.len().saturating_sub(count);
        stream.truncate(keep);
    }

    fn push_to_output_stream_individual(&mut self, object: RtObject) {
        let mut include = true;

        match &object {
            RtObject::Glue => self.trim_newlines_from_output_stream(),
            RtObject::Value(Value::String(text)) => {
                let current = self.callstack().current_element();
                let mut function_trim_index = if current.push_pop_type == PushPopType::Function {
                    current.function_start_in_output_stream
                } else {
                    -1
                };

                // Latest glue, without trimming past the start of a string evaluation.
                let mut glue_trim_index: i32 = -1;
                for (index, item) in self.current_flow.output_stream.iter().enumerate().rev() {
                    match item {
                        RtObject::Glue => {
                            glue_trim_index = index as i32;
                            break;
                        }
                        RtObject::Command(ControlCommand::BeginString) => {
                            if index as i32 >= function_trim_index {
                                function_trim_index = -1;
                            }
                            break;
                        }
                        _ => {}
                    }
                }

                let trim_index = match (glue_trim_index, function_trim_index) {
                    (-1, function) => function,
                    (glue, -1) => glue,
                    (glue, function) => glue.min(function),
                };

                if trim_index != -1 {
                    if is_newline(text) {
                        include = false;
                    } else if is_non_whitespace(text) {
                        if glue_trim_index > -1 {
                            self.remove_existing_glue();
                        }
                        if function_trim_index > -1 {
                            // Real text has been seen, so function-start trimming is over.
                            for element in self.callstack_mut().current_thread_mut().callstack.iter_mut().rev() {
                                if element.push_pop_type == PushPopType::Function {
                                    element.function_start_in_output_stream = -1;
                                } else {
                                    break;
                                }
                            }
                        }
                    }
                } else if is_newline(text)
                    && (self.output_stream_ends_in_newline() || !self.output_stream_contains_content())
                {
                    include = false;
                }
            }
            _ => {}
        }

        if include {
            self.current_flow.output_stream.push(object);
        }
    }

    /// Removes trailing whitespace strings back to the first newline of the
    /// final whitespace run.
    fn trim_newlines_from_output_stream(&mut self) {
        let stream = &mut self.current_flow.output_stream;
        let mut remove_from = None;
        for (index, item) in stream.iter().enumerate().rev() {
            match item {
                RtObject::Command(_) => break,
                RtObject::Value(Value::String(text)) if is_non_whitespace(text) => break,
                RtObject::Value(Value::String(text)) if is_newline(text) => remove_from = Some(index),
                _ => {}
            }
        }

        if let Some(start) = remove_from {
            let mut index = start;
            while index < stream.len() {
                if matches!(stream[index], RtObject::Value(Value::String(_))) {
                    stream.remove(index);
                } else {
                    index += 1;
                }
            }
        }
    }

    fn remove_existing_glue(&mut self) {
        let stream = &mut self.current_flow.output_stream;
        let mut index = stream.len();
        while index > 0 {
            index -= 1;
            match stream[index] {
                RtObject::Glue => {
                    stream.remove(index);
                }
                RtObject::Command(_) => break,
                _ => {}
            }
        }
    }

    pub(crate) fn trim_whitespace_from_function_end(&mut self) {
        let start = self.callstack().current_element().function_start_in_output_stream;
        let start = usize::try_from(start).unwrap_or(0);
        let stream = &mut self.current_flow.output_stream;

        let mut index = stream.len();
        while index > start {
            index -= 1;
            let RtObject::Value(Value::String(text)) = &stream[index] else {
                continue;
            };
            if is_newline(text) || is_inline_whitespace(text) {
                stream.remove(index);
            } else {
                break;
            }
        }
    }

    pub fn output_stream_ends_in_newline(&self) -> bool {
        for item in self.current_flow.output_stream.iter().rev() {
            match item {
                RtObject::Command(_) => break,
                RtObject::Value(Value::String(text)) if is_newline(text) => return true,
                RtObject::Value(Value::String(text)) if is_non_whitespace(text) => break,
                _ => {}
            }
        }
        false
    }

    pub fn output_stream_contains_content(&self) -> bool {
        self.current_flow
            .output_stream
            .iter()
            .any(|item| matches!(item, RtObject::Value(Value::String(_))))
    }

    pub fn in_string_evaluation(&self) -> bool {
        self.current_flow
            .output_stream
            .iter()
            .rev()
            .any(|item| item.is_command(ControlCommand::BeginString))
    }

    /// Output text with inline whitespace collapsed; tag text is excluded.
    pub fn current_text(&self) -> String {
        let mut text = String::new();
        let mut in_tag = false;
        for item in &self.current_flow.output_stream {
            match item {
                RtObject::Value(Value::String(piece)) if !in_tag => text.push_str(piece),
                RtObject::Command(ControlCommand::BeginTag) => in_tag = true,
                RtObject::Command(ControlCommand::EndTag) => in_tag = false,
                _ => {}
            }
        }
        clean_output_whitespace(&text)
    }

    pub fn current_tags(&self) -> Vec<String> {
        let mut tags = Vec::new();
        let mut in_tag = false;
        let mut pending = String::new();
        for item in &self.current_flow.output_stream {
            match item {
                RtObject::Command(ControlCommand::BeginTag) => {
                    if in_tag && !pending.is_empty() {
                        tags.push(clean_output_whitespace(&pending));
                        pending.clear();
                    }
                    in_tag = true;
                }
                RtObject::Command(ControlCommand::EndTag) => {
                    if !pending.is_empty() {
                        tags.push(clean_output_whitespace(&pending));
                        pending.clear();
                    }
                    in_tag = false;
                }
                RtObject::Value(Value::String(piece)) if in_tag => pending.push_str(piece),
                RtObject::Tag(text) if !in_tag && !text.is_empty() => tags.push(text.clone()),
                _ => {}
            }
        }
        if !pending.is_empty() {
            tags.push(clean_output_whitespace(&pending));
        }
        tags
    }
}

/// Splits `"  \n\nText \n  "` into leading spaces, one newline, the inner
/// text, one newline and trailing spaces. `None` when there is nothing to split.
pub(crate) fn split_head_tail_whitespace(text: &str) -> Option<Vec<String>> {
    let bytes = text.as_bytes();

    let mut head_first_newline = None;
    let mut head_last_newline = None;
    for (index, byte) in bytes.iter().enumerate() {
        match byte {
            b'\n' => {
                head_first_newline.get_or_insert(index);
                head_last_newline = Some(index);
            }
            b' ' | b'\t' => continue,
            _ => break,
        }
    }

    let mut tail_last_newline = None;
    let mut tail_first_newline = None;
    for (index, byte) in bytes.iter().enumerate().rev() {
        match byte {
            b'\n' => {
                tail_last_newline.get_or_insert(index);
                tail_first_newline = Some(index);
            }
            b' ' | b'\t' => continue,
            _ => break,
        }
    }

    if head_first_newline.is_none() && tail_last_newline.is_none() {
        return None;
    }

    let mut pieces = Vec::new();
    let mut inner_start = 0;
    let mut inner_end = text.len();

    if let (Some(first), Some(last)) = (head_first_newline, head_last_newline) {
        if first > 0 {
            pieces.push(text[..first].to_string());
        }
        pieces.push("\n".to_string());
        inner_start = last + 1;
    }

    if let Some(first) = tail_first_newline {
        inner_end = first;
    }

    if inner_end > inner_start {
        pieces.push(text[inner_start..inner_end].to_string());
    }

    if let (Some(first), Some(last)) = (tail_first_newline, tail_last_newline) {
        let after_head = head_last_newline.map_or(true, |head_last| first > head_last);
        if after_head {
            pieces.push("\n".to_string());
            if last < text.len() - 1 {
                pieces.push(text[last + 1..].to_string());
            }
        }
    }

    Some(pieces)
}

/// Drops inline whitespace at line starts and ends, and collapses runs of
/// spaces and tabs into a single space.
pub(crate) fn clean_output_whitespace(text: &str) -> String {
    let mut cleaned = String::with_capacity(text.len());
    let mut whitespace_start: Option<usize> = None;
    let mut start_of_line = 0;

    for (index, c) in text.char_indices() {
        let is_inline_whitespace = c == ' ' || c == '\t';
        if is_inline_whitespace && whitespace_start.is_none() {
            whitespace_start = Some(index);
        }
        if !is_inline_whitespace {
            if let Some(start) = whitespace_start {
                if c != '\n' && start > 0 && start != start_of_line {
                    cleaned.push(' ');
                }
            }
            whitespace_start = None;
        }
        if c == '\n' {
            start_of_line = index + 1;
        }
        if !is_inline_whitespace {
            cleaned.push(c);
        }
    }
    cleaned
}
