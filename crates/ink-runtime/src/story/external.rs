use std::collections::BTreeSet;
use std::rc::Rc;

use ink_core::InkError;

use crate::callstack::PushPopType;
use crate::object::{NodeKind, RtObject};
use crate::pointer::Pointer;
use crate::value::Value;

use super::Story;

/// Host function callable from ink. Returning `None` pushes nothing useful
/// back into the story (a void result).
pub type ExternalFunction = Box<dyn FnMut(&[Value]) -> Result<Option<Value>, InkError>>;

pub(crate) struct ExternalFunctionDef {
    function: ExternalFunction,
    arity: usize,
    /// Safe to run again when the engine rewinds a lookahead.
    lookahead_safe: bool,
}

/// Outcome of [`Story::evaluate_function`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FunctionEvaluation {
    pub result: Option<Value>,
    pub text_output: String,
}

impl Story {
    pub fn bind_external_function<F>(
        &mut self,
        name: &str,
        arity: usize,
        lookahead_safe: bool,
        function: F,
    ) -> Result<(), InkError>
    where
        F: FnMut(&[Value]) -> Result<Option<Value>, InkError> + 'static,
    {
        self.if_async_we_cant("bind an external function")?;
        if self.externals.contains_key(name) {
            return Err(InkError::new(
                "STORY_EXTERNAL_ALREADY_BOUND",
                format!("Function '{}' has already been bound.", name),
            ));
        }
        self.externals.insert(
            name.to_string(),
            ExternalFunctionDef {
                function: Box::new(function),
                arity,
                lookahead_safe,
            },
        );
        Ok(())
    }

    pub fn unbind_external_function(&mut self, name: &str) -> Result<(), InkError> {
        self.if_async_we_cant("unbind an external a function")?;
        if self.externals.remove(name).is_none() {
            return Err(InkError::new(
                "STORY_EXTERNAL_NOT_BOUND",
                format!("Function '{}' has not been bound.", name),
            ));
        }
        Ok(())
    }

    /// Checks every external call site has a binding, or an ink fallback
    /// when fallbacks are allowed. Runs before the first continue.
    pub fn validate_external_bindings(&mut self) -> Result<(), InkError> {
        let tree = Rc::clone(&self.tree);
        let allow_fallbacks = self.options.allow_external_function_fallbacks;
        let mut missing = BTreeSet::new();
        for (_, node) in tree.nodes() {
            let NodeKind::Divert(divert) = node.kind() else {
                continue;
            };
            if !divert.is_external {
                continue;
            }
            let name = divert.target_path_string().unwrap_or_default();
            if self.externals.contains_key(&name) {
                continue;
            }
            if !allow_fallbacks || tree.knot_container_with_name(&name).is_none() {
                missing.insert(name);
            }
        }
        self.has_validated_externals = true;

        if missing.is_empty() {
            return Ok(());
        }
        let names: Vec<String> = missing.into_iter().collect();
        Err(InkError::new(
            "STORY_EXTERNAL_MISSING",
            format!(
                "ERROR: Missing function binding for external{}: '{}' {}",
                if names.len() > 1 { "s" } else { "" },
                names.join("', '"),
                if allow_fallbacks {
                    ", and no fallback ink function found."
                } else {
                    " (ink fallbacks disabled)"
                }
            ),
        ))
    }

    pub(crate) fn call_external_function(&mut self, name: &str, argument_count: usize) -> Result<(), InkError> {
        let found = self.externals.get(name).map(|def| (def.lookahead_safe, def.arity));

        let Some((lookahead_safe, arity)) = found else {
            if !self.options.allow_external_function_fallbacks {
                return Err(InkError::new(
                    "STORY_EXTERNAL_NOT_BOUND",
                    format!(
                        "Trying to call EXTERNAL function '{}' which has not been bound (and ink fallbacks disabled).",
                        name
                    ),
                ));
            }
            let fallback = self.tree.knot_container_with_name(name).ok_or_else(|| {
                InkError::new(
                    "STORY_EXTERNAL_NOT_BOUND",
                    format!(
                        "Trying to call EXTERNAL function '{}' which has not been bound, and fallback ink function could not be found.",
                        name
                    ),
                )
            })?;
            let output_length = self.state.output_stream().len();
            self.state
                .callstack_mut()
                .push(PushPopType::Function, 0, output_length);
            self.state.diverted_pointer = Pointer::start_of(fallback);
            return Ok(());
        };

        // The lookahead will be rewound, so the call happens for real later.
        if !lookahead_safe && self.state_snapshot_at_last_newline.is_some() {
            self.saw_lookahead_unsafe_function_after_newline = true;
            return Ok(());
        }

        if arity != argument_count {
            return Err(InkError::new(
                "STORY_EXTERNAL_ARITY",
                format!(
                    "External function '{}' expects {} argument(s) but was called with {}",
                    name, arity, argument_count
                ),
            ));
        }

        let mut arguments = Vec::with_capacity(argument_count);
        for object in self.state.pop_evaluation_stack_n(argument_count)? {
            match object {
                RtObject::Value(value) => arguments.push(value),
                other => {
                    return Err(InkError::new(
                        "STORY_EXTERNAL_ARGUMENT",
                        format!(
                            "Expected a value argument for external function '{}', found {}",
                            name, other
                        ),
                    ))
                }
            }
        }

        log::debug!("calling external function {} with {} argument(s)", name, arguments.len());
        let result = match self.externals.get_mut(name) {
            Some(def) => (def.function)(&arguments)?,
            None => None,
        };
        self.state.push_evaluation_stack(match result {
            Some(value) => RtObject::Value(value),
            None => RtObject::Void,
        });
        Ok(())
    }

    pub fn has_function(&self, name: &str) -> bool {
        self.tree.knot_container_with_name(name).is_some()
    }

    /// Runs an ink function to completion from the host, capturing its
    /// text separately from the story's own output.
    pub fn evaluate_function(&mut self, name: &str, arguments: &[Value]) -> Result<FunctionEvaluation, InkError> {
        if let Some(callbacks) = self.callbacks.as_mut() {
            callbacks.on_evaluate_function(name, arguments);
        }
        self.if_async_we_cant("evaluate a function")?;

        if name.trim().is_empty() {
            return Err(InkError::new(
                "STORY_FUNCTION_NAME",
                "Function is empty or white space.",
            ));
        }
        let function_container = self.tree.knot_container_with_name(name).ok_or_else(|| {
            InkError::new(
                "STORY_FUNCTION_MISSING",
                format!("Function doesn't exist: '{}'", name),
            )
        })?;

        let output_before = self.state.output_stream().to_vec();
        self.state.reset_output(None);
        let evaluated = self
            .state
            .start_function_evaluation_from_game(function_container, arguments)
            .and_then(|()| self.continue_function_evaluation());
        self.state.reset_output(Some(output_before));
        let text_output = match evaluated {
            Ok(text) => text,
            Err(error) => {
                // A fatal error already cleared the call stack; a warning leaves the frame.
                if self.state.callstack().element_is_evaluate_from_game() {
                    self.state.complete_function_evaluation_from_game(&self.tree)?;
                }
                return Err(error);
            }
        };
        let result = self.state.complete_function_evaluation_from_game(&self.tree)?;

        if let Some(callbacks) = self.callbacks.as_mut() {
            callbacks.on_complete_evaluate_function(name, arguments, &text_output, result.as_ref());
        }
        Ok(FunctionEvaluation {
            result,
            text_output,
        })
    }

    fn continue_function_evaluation(&mut self) -> Result<String, InkError> {
        let mut text_output = String::new();
        while self.can_continue() {
            text_output.push_str(&self.continue_story()?);
        }
        Ok(text_output)
    }
}
