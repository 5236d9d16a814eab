use std::collections::{BTreeSet, HashMap};
use std::rc::Rc;

use ink_core::InkError;

use crate::callstack::CallStack;
use crate::list::{retain_list_origins_for_assignment, ListDefinitionsOrigin};
use crate::object::VariableAssignment;
use crate::state::patch::StatePatch;
use crate::value::{Value, ValueType};

/// Global variables of a story. Temporaries live on the call stack, so
/// lookups that may reach them take the call stack explicitly, along with
/// the lookahead patch when one is active.
#[derive(Debug, Clone)]
pub struct VariablesState {
    globals: Rc<HashMap<String, Value>>,
    default_globals: Rc<HashMap<String, Value>>,
    lists: Rc<ListDefinitionsOrigin>,
    changed_for_observers: BTreeSet<String>,
}

impl VariablesState {
    pub fn new(lists: Rc<ListDefinitionsOrigin>) -> Self {
        Self {
            globals: Rc::new(HashMap::new()),
            default_globals: Rc::new(HashMap::new()),
            lists,
            changed_for_observers: BTreeSet::new(),
        }
    }

    pub fn globals(&self) -> &HashMap<String, Value> {
        &self.globals
    }

    pub fn default_globals(&self) -> &HashMap<String, Value> {
        &self.default_globals
    }

    pub fn global_variable_exists_with_name(&self, name: &str) -> bool {
        self.globals.contains_key(name) || self.default_globals.contains_key(name)
    }

    /// Host read of a global, patch first.
    pub fn get(&self, name: &str, patch: Option<&StatePatch>) -> Option<Value> {
        if let Some(value) = patch.and_then(|patch| patch.try_get_global(name)) {
            return Some(value.clone());
        }
        self.globals
            .get(name)
            .or_else(|| self.default_globals.get(name))
            .cloned()
    }

    /// Host write of a declared global.
    pub fn set(
        &mut self,
        name: &str,
        value: Value,
        patch: Option<&mut StatePatch>,
    ) -> Result<(), InkError> {
        let Some(declared) = self.default_globals.get(name) else {
            return Err(InkError::new(
                "STATE_UNDECLARED_VARIABLE",
                format!(
                    "Cannot assign to a variable ({}) that hasn't been declared in the story",
                    name
                ),
            ));
        };
        if let Value::VariablePointer { .. } = value {
            return Err(InkError::new(
                "STATE_INVALID_VALUE",
                format!("Invalid value passed to VariableState: {}", value),
            ));
        }
        if !assignable_from_host(declared.value_type(), value.value_type()) {
            return Err(InkError::new(
                "STATE_INVALID_VALUE",
                format!(
                    "Cannot assign a {} to variable '{}', which was declared as a {}",
                    value.value_type(),
                    name,
                    declared.value_type()
                ),
            ));
        }
        self.set_global(name, value, patch);
        Ok(())
    }

    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.globals.keys()
    }

    /// Resolves through variable pointers to the value they address.
    pub fn get_variable_with_name(
        &self,
        name: &str,
        context_index: i32,
        callstack: &CallStack,
        patch: Option<&StatePatch>,
    ) -> Option<Value> {
        let value = self.get_raw_variable_with_name(name, context_index, callstack, patch)?;
        match value {
            Value::VariablePointer {
                name,
                context_index,
            } => self.get_variable_with_name(&name, context_index, callstack, patch),
            value => Some(value),
        }
    }

    fn get_raw_variable_with_name(
        &self,
        name: &str,
        context_index: i32,
        callstack: &CallStack,
        patch: Option<&StatePatch>,
    ) -> Option<Value> {
        if context_index == 0 || context_index == -1 {
            if let Some(value) = patch.and_then(|patch| patch.try_get_global(name)) {
                return Some(value.clone());
            }
            if let Some(value) = self.globals.get(name) {
                return Some(value.clone());
            }
            // A global added after the save was made has no stored value yet.
            if let Some(value) = self.default_globals.get(name) {
                return Some(value.clone());
            }
            if let Some(list) = self.lists.find_single_item_list_with_name(name) {
                return Some(Value::List(list));
            }
        }
        callstack
            .get_temporary_variable_with_name(name, context_index)
            .cloned()
    }

    pub fn assign(
        &mut self,
        assignment: &VariableAssignment,
        value: Value,
        callstack: &mut CallStack,
        mut patch: Option<&mut StatePatch>,
    ) -> Result<(), InkError> {
        let mut name = assignment.name.clone();
        let mut context_index = -1;
        let mut value = value;

        let mut set_global = if assignment.is_new_declaration {
            assignment.is_global
        } else {
            self.global_variable_exists_with_name(&name)
        };

        if assignment.is_new_declaration {
            if let Value::VariablePointer { .. } = value {
                value = self.resolve_variable_pointer(&value, callstack, patch.as_deref());
            }
        } else {
            while let Some(Value::VariablePointer {
                name: target,
                context_index: target_context,
            }) =
                self.get_raw_variable_with_name(&name, context_index, callstack, patch.as_deref())
            {
                name = target;
                context_index = target_context;
                set_global = context_index == 0;
            }
        }

        if set_global {
            self.set_global(&name, value, patch.as_deref_mut());
            Ok(())
        } else {
            callstack.set_temporary_variable(
                &name,
                value,
                assignment.is_new_declaration,
                context_index,
            )
        }
    }

    /// Pins a by-name pointer to the exact global or call stack frame.
    /// Pointers to pointers collapse to the final target.
    pub fn resolve_variable_pointer(
        &self,
        pointer: &Value,
        callstack: &CallStack,
        patch: Option<&StatePatch>,
    ) -> Value {
        let Value::VariablePointer {
            name,
            context_index,
        } = pointer
        else {
            return pointer.clone();
        };

        let context_index = if *context_index == -1 {
            self.context_index_of_variable_named(name, callstack)
        } else {
            *context_index
        };

        match self.get_raw_variable_with_name(name, context_index, callstack, patch) {
            Some(double_redirection @ Value::VariablePointer { .. }) => double_redirection,
            _ => Value::variable_pointer(name.clone(), context_index),
        }
    }

    /// 0 for globals; otherwise the caller's frame, since pointers are
    /// resolved after the callee frame has been pushed.
    fn context_index_of_variable_named(&self, name: &str, callstack: &CallStack) -> i32 {
        if self.global_variable_exists_with_name(name) {
            0
        } else {
            callstack.current_element_index() as i32
        }
    }

    pub fn set_global(&mut self, name: &str, mut value: Value, patch: Option<&mut StatePatch>) {
        let old_value = match patch.as_deref() {
            Some(patch) => patch
                .try_get_global(name)
                .or_else(|| self.globals.get(name))
                .cloned(),
            None => self.globals.get(name).cloned(),
        };
        retain_list_origins_for_assignment(old_value.as_ref(), &mut value);
        let changed = old_value.as_ref() != Some(&value);

        match patch {
            Some(patch) => {
                if changed {
                    patch.add_changed_variable(name);
                }
                patch.set_global(name, value);
            }
            None => {
                if changed {
                    self.changed_for_observers.insert(name.to_string());
                }
                Rc::make_mut(&mut self.globals).insert(name.to_string(), value);
            }
        }
    }

    /// Current globals become the defaults that saves are diffed against.
    pub fn snapshot_default_globals(&mut self) {
        self.default_globals = Rc::new((*self.globals).clone());
    }

    pub(crate) fn apply_patch(&mut self, patch: &StatePatch) {
        if !patch.globals().is_empty() {
            let globals = Rc::make_mut(&mut self.globals);
            for (name, value) in patch.globals() {
                globals.insert(name.clone(), value.clone());
            }
        }
        self.changed_for_observers
            .extend(patch.changed_variables().iter().cloned());
    }

    /// Starts collecting changed names for one batched notification.
    pub fn start_variable_observation(&mut self) {
        self.changed_for_observers.clear();
    }

    /// Names changed since observation started, in name order.
    pub fn stop_variable_observation(&mut self) -> Vec<String> {
        std::mem::take(&mut self.changed_for_observers)
            .into_iter()
            .collect()
    }

    /// Replaces globals from a save; names missing from it take their defaults.
    pub(crate) fn load_globals(&mut self, mut loaded: HashMap<String, Value>) {
        let mut globals = HashMap::new();
        for (name, default_value) in self.default_globals.iter() {
            let value = loaded
                .remove(name)
                .unwrap_or_else(|| default_value.clone());
            globals.insert(name.clone(), value);
        }
        self.globals = Rc::new(globals);
    }

    /// Globals whose value differs from the declared default.
    pub(crate) fn globals_differing_from_defaults(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.globals.iter().filter(|(name, value)| {
            self.default_globals
                .get(*name)
                .map_or(true, |default_value| default_value != *value)
        })
    }
}

/// Numbers coerce into one another; every other kind must keep its type.
fn assignable_from_host(declared: ValueType, assigned: ValueType) -> bool {
    let numeric = |kind: ValueType| matches!(kind, ValueType::Bool | ValueType::Int | ValueType::Float);
    declared == assigned || (numeric(declared) && numeric(assigned))
}

#[cfg(test)]
mod variables_tests {
    use super::*;
    use crate::callstack::PushPopType;
    use crate::list::ListDefinition;
    use crate::pointer::Pointer;

    fn variables() -> (VariablesState, CallStack) {
        let items = [("small", 1), ("large", 2)]
            .iter()
            .map(|(name, value)| (name.to_string(), *value))
            .collect();
        let lists = ListDefinitionsOrigin::new(vec![ListDefinition::new("sizes", items)]);
        let mut variables = VariablesState::new(Rc::new(lists));
        variables.set_global("gold", Value::Int(5), None);
        variables.snapshot_default_globals();
        variables.stop_variable_observation();
        (variables, CallStack::new(Pointer::NULL))
    }

    fn assignment(name: &str, is_new_declaration: bool, is_global: bool) -> VariableAssignment {
        VariableAssignment {
            name: name.to_string(),
            is_new_declaration,
            is_global,
        }
    }

    #[test]
    fn lookup_falls_back_to_list_items() {
        let (variables, callstack) = variables();
        assert_eq!(variables.get_variable_with_name("gold", -1, &callstack, None), Some(Value::Int(5)));
        let large = variables
            .get_variable_with_name("large", -1, &callstack, None)
            .expect("list item");
        assert_eq!(large.cast(crate::value::ValueType::Int).expect("int"), Value::Int(2));
        assert_eq!(variables.get_variable_with_name("missing", -1, &callstack, None), None);
    }

    #[test]
    fn patch_shadows_globals_until_applied() {
        let (mut variables, mut callstack) = variables();
        let mut patch = StatePatch::new();
        variables
            .assign(&assignment("gold", false, true), Value::Int(9), &mut callstack, Some(&mut patch))
            .expect("assign");
        assert_eq!(variables.get("gold", None), Some(Value::Int(5)));
        assert_eq!(variables.get("gold", Some(&patch)), Some(Value::Int(9)));

        variables.apply_patch(&patch);
        assert_eq!(variables.get("gold", None), Some(Value::Int(9)));
        assert_eq!(variables.stop_variable_observation(), vec!["gold".to_string()]);
    }

    #[test]
    fn assignment_through_pointer_reaches_target() {
        let (mut variables, mut callstack) = variables();
        callstack.push(PushPopType::Function, 0, 0);
        let pointer = variables.resolve_variable_pointer(&Value::variable_pointer("gold", -1), &callstack, None);
        assert_eq!(pointer, Value::variable_pointer("gold", 0));

        variables
            .assign(&assignment("ref", true, false), pointer, &mut callstack, None)
            .expect("declare ref");
        variables
            .assign(&assignment("ref", false, false), Value::Int(11), &mut callstack, None)
            .expect("assign through ref");
        assert_eq!(variables.get("gold", None), Some(Value::Int(11)));
        assert_eq!(
            variables.get_variable_with_name("ref", -1, &callstack, None),
            Some(Value::Int(11))
        );
    }

    #[test]
    fn host_set_requires_declared_name() {
        let (mut variables, _) = variables();
        let error = variables
            .set("silver", Value::Int(1), None)
            .expect_err("undeclared");
        assert_eq!(error.code, "STATE_UNDECLARED_VARIABLE");
        variables.set("gold", Value::Int(6), None).expect("declared");
        assert_eq!(variables.globals_differing_from_defaults().count(), 1);
    }

    #[test]
    fn host_set_keeps_the_declared_kind() {
        let (mut variables, _) = variables();
        variables
            .set("gold", Value::Float(2.5), None)
            .expect("numbers are interchangeable");
        let error = variables
            .set("gold", Value::String("lots".to_string()), None)
            .expect_err("string into a number");
        assert_eq!(error.code, "STATE_INVALID_VALUE");
        assert_eq!(variables.get("gold", None), Some(Value::Float(2.5)));
    }

    #[test]
    fn load_fills_missing_globals_with_defaults() {
        let (mut variables, _) = variables();
        variables.load_globals(HashMap::new());
        assert_eq!(variables.get("gold", None), Some(Value::Int(5)));
    }
}
