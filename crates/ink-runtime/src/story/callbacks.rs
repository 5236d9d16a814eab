use ink_core::{ErrorKind, InkError};

use crate::choice::Choice;
use crate::value::Value;

use super::Story;

/// Host hooks into a running story. Every method defaults to doing
/// nothing, so implementors pick the events they care about.
pub trait StoryCallbacks {
    /// Receives decorated runtime errors and warnings. Installing callbacks
    /// stops continue calls from returning them as `Err`.
    fn on_error(&mut self, _message: &str, _kind: ErrorKind) {}

    fn on_did_continue(&mut self) {}

    fn on_make_choice(&mut self, _choice: &Choice) {}

    fn on_evaluate_function(&mut self, _name: &str, _arguments: &[Value]) {}

    fn on_complete_evaluate_function(
        &mut self,
        _name: &str,
        _arguments: &[Value],
        _text_output: &str,
        _result: Option<&Value>,
    ) {
    }

    fn on_choose_path_string(&mut self, _path: &str, _arguments: &[Value]) {}
}

pub type VariableObserver = Box<dyn FnMut(&str, &Value)>;

/// Handle returned by [`Story::observe_variable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

pub(crate) struct ObserverEntry {
    id: ObserverId,
    observer: VariableObserver,
}

impl Story {
    /// Calls `observer` with the new value whenever the global `name`
    /// changes. Changes during a continue are batched until it returns.
    pub fn observe_variable<F>(&mut self, name: &str, observer: F) -> Result<ObserverId, InkError>
    where
        F: FnMut(&str, &Value) + 'static,
    {
        self.if_async_we_cant("observe a new variable")?;
        if !self.state.variables.global_variable_exists_with_name(name) {
            return Err(InkError::new(
                "STORY_OBSERVE_UNKNOWN",
                format!(
                    "Cannot observe variable '{}' because it wasn't declared in the ink story.",
                    name
                ),
            ));
        }

        self.next_observer_id += 1;
        let id = ObserverId(self.next_observer_id);
        self.observers
            .entry(name.to_string())
            .or_default()
            .push(ObserverEntry {
                id,
                observer: Box::new(observer),
            });
        Ok(id)
    }

    /// Removes one observer, every observer of a variable, or both filters
    /// combined. With neither, removes all observers.
    pub fn remove_variable_observer(&mut self, id: Option<ObserverId>, name: Option<&str>) {
        match (id, name) {
            (None, None) => self.observers.clear(),
            (None, Some(name)) => {
                self.observers.remove(name);
            }
            (Some(id), name) => {
                for (variable, entries) in self.observers.iter_mut() {
                    if name.map_or(true, |name| name == variable) {
                        entries.retain(|entry| entry.id != id);
                    }
                }
                self.observers.retain(|_, entries| !entries.is_empty());
            }
        }
    }

    pub(crate) fn notify_variable_observers(&mut self, changed: Vec<String>) {
        for name in changed {
            let Some(entries) = self.observers.get_mut(&name) else {
                continue;
            };
            let Some(value) = self.state.global_variable(&name) else {
                continue;
            };
            log::trace!("notifying {} observer(s) of {}", entries.len(), name);
            for entry in entries.iter_mut() {
                (entry.observer)(&name, &value);
            }
        }
    }
}
