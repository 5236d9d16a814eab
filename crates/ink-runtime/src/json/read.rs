use std::collections::BTreeMap;

use ink_core::{InkError, INK_VERSION_CURRENT, INK_VERSION_MINIMUM_COMPATIBLE};
use serde_json::{Map, Value as JsonToken};

use super::bad_token;
use crate::callstack::PushPopType;
use crate::container::Container;
use crate::list::{InkList, InkListItem, ListDefinition, ListDefinitionsOrigin};
use crate::native::NativeFunctionTable;
use crate::object::{
    ChoicePoint, ControlCommand, Divert, NodeId, NodeKind, RtObject, VariableAssignment,
    VariableReference,
};
use crate::path::Path;
use crate::tree::Tree;
use crate::value::Value;

/// A loaded compiled story: the content tree and its list definitions.
#[derive(Debug, Clone)]
pub struct StoryDocument {
    pub ink_version: i32,
    pub tree: Tree,
    pub lists: ListDefinitionsOrigin,
}

pub fn read_story(json: &str) -> Result<StoryDocument, InkError> {
    let root: JsonToken = serde_json::from_str(json).map_err(|error| {
        InkError::new(
            "JSON_PARSE",
            format!("Story JSON could not be parsed: {}", error),
        )
    })?;
    let object = root.as_object().ok_or_else(|| {
        InkError::new("JSON_PARSE", "Story JSON must be an object.")
    })?;

    let ink_version = object
        .get("inkVersion")
        .and_then(JsonToken::as_i64)
        .ok_or_else(|| InkError::new("JSON_VERSION", "Story JSON has no inkVersion."))?;
    let ink_version = i32::try_from(ink_version).map_err(|_| {
        InkError::new(
            "JSON_VERSION",
            format!("Story inkVersion {} is out of range", ink_version),
        )
    })?;
    if ink_version > INK_VERSION_CURRENT {
        return Err(InkError::new(
            "JSON_VERSION",
            "Version of ink used to build story was newer than the current version of the engine",
        ));
    }
    if ink_version < INK_VERSION_MINIMUM_COMPATIBLE {
        return Err(InkError::new(
            "JSON_VERSION",
            "Version of ink used to build story is too old to be loaded by this version of the engine",
        ));
    }
    if ink_version != INK_VERSION_CURRENT {
        log::warn!(
            "Version of ink used to build story ({}) doesn't match current version of engine ({}). Non-critical, but recommend synchronising.",
            ink_version,
            INK_VERSION_CURRENT
        );
    }

    let root_token = object.get("root").and_then(JsonToken::as_array).ok_or_else(|| {
        InkError::new(
            "JSON_NO_ROOT",
            "Root node for ink not found. Are you sure it's a valid .ink.json file?",
        )
    })?;

    let lists = match object.get("listDefs") {
        Some(JsonToken::Object(definitions)) => read_list_definitions(definitions)?,
        Some(JsonToken::Null) | None => ListDefinitionsOrigin::default(),
        Some(other) => return Err(bad_token(other)),
    };

    let natives = NativeFunctionTable::build();
    let mut tree = Tree::new();
    let root_id = tree.root();
    let mut reader = TreeReader {
        tree: &mut tree,
        natives: &natives,
    };
    reader.fill_container(root_id, root_token)?;

    Ok(StoryDocument {
        ink_version,
        tree,
        lists,
    })
}

fn read_list_definitions(definitions: &Map<String, JsonToken>) -> Result<ListDefinitionsOrigin, InkError> {
    let mut lists = Vec::with_capacity(definitions.len());
    for (name, items) in definitions {
        let items = items.as_object().ok_or_else(|| bad_token(items))?;
        let mut values = BTreeMap::new();
        for (item_name, value) in items {
            values.insert(item_name.clone(), int_token(value)?);
        }
        lists.push(ListDefinition::new(name.clone(), values));
    }
    Ok(ListDefinitionsOrigin::new(lists))
}

struct TreeReader<'a> {
    tree: &'a mut Tree,
    natives: &'a NativeFunctionTable,
}

impl TreeReader<'_> {
    /// A container is an array of content whose final element is either
    /// null or a dictionary of named-only content, `#f` flags and `#n` name.
    fn fill_container(&mut self, id: NodeId, array: &[JsonToken]) -> Result<(), InkError> {
        let Some((terminator, content)) = array.split_last() else {
            return Err(InkError::new(
                "JSON_BAD_CONTAINER",
                "Container array must end with a terminator.",
            ));
        };

        let mut named_only = Vec::new();
        if let JsonToken::Object(entries) = terminator {
            for (key, token) in entries {
                match key.as_str() {
                    "#f" => {
                        let flags = token.as_i64().ok_or_else(|| bad_token(token))?;
                        self.tree.container_mut(id)?.set_count_flags(flags);
                    }
                    "#n" => {
                        let name = token.as_str().ok_or_else(|| bad_token(token))?;
                        self.tree.container_mut(id)?.name = Some(name.to_string());
                    }
                    _ => named_only.push((key, token)),
                }
            }
        } else if !terminator.is_null() {
            return Err(bad_token(terminator));
        }

        for token in content {
            let child = self.read_node(token)?;
            self.tree.add_content(id, child)?;
        }

        for (name, token) in named_only {
            let child = self.read_node(token)?;
            match self.tree.container_mut(child) {
                Ok(container) => container.name = Some(name.clone()),
                Err(_) => {
                    return Err(InkError::new(
                        "JSON_BAD_CONTAINER",
                        format!("Named content '{}' must be a container.", name),
                    ))
                }
            }
            self.tree.add_named_only(id, child)?;
        }
        Ok(())
    }

    fn read_node(&mut self, token: &JsonToken) -> Result<NodeId, InkError> {
        if let JsonToken::Array(array) = token {
            let id = self.tree.add_node(NodeKind::Container(Container::default()));
            self.fill_container(id, array)?;
            return Ok(id);
        }
        let kind = self.read_kind(token)?;
        Ok(self.tree.add_node(kind))
    }

    fn read_kind(&self, token: &JsonToken) -> Result<NodeKind, InkError> {
        if let Some(value) = value_from_token(token)? {
            return Ok(NodeKind::Value(value));
        }

        match token {
            JsonToken::String(text) => self.read_string_kind(text).ok_or_else(|| bad_token(token)),
            JsonToken::Object(object) => read_object_kind(object).ok_or_else(|| bad_token(token)),
            _ => Err(bad_token(token)),
        }
    }

    fn read_string_kind(&self, text: &str) -> Option<NodeKind> {
        if text == "<>" {
            return Some(NodeKind::Glue);
        }
        if text == "void" {
            return Some(NodeKind::Void);
        }
        if let Some(command) = ControlCommand::from_name(text) {
            return Some(NodeKind::Control(command));
        }
        // "^" alone would read as a string, so intersection is spelled "L^".
        let native_name = if text == "L^" { "^" } else { text };
        self.natives.lookup(native_name).map(NodeKind::Native)
    }
}

fn read_object_kind(object: &Map<String, JsonToken>) -> Option<NodeKind> {
    let divert_keys = [
        ("->", false, PushPopType::Function, false),
        ("f()", true, PushPopType::Function, false),
        ("->t->", true, PushPopType::Tunnel, false),
        ("x()", false, PushPopType::Function, true),
    ];
    for (key, pushes_to_stack, stack_push_type, is_external) in divert_keys {
        let Some(target) = object.get(key) else {
            continue;
        };
        let target = target.as_str()?;
        let mut divert = Divert::new(None);
        divert.pushes_to_stack = pushes_to_stack;
        divert.stack_push_type = stack_push_type;
        divert.is_external = is_external;
        if object.contains_key("var") {
            divert.variable_divert_name = Some(target.to_string());
        } else {
            divert.target_path = Some(Path::parse(target));
        }
        divert.is_conditional = object.contains_key("c");
        if is_external {
            divert.external_args = object
                .get("exArgs")
                .and_then(JsonToken::as_u64)
                .unwrap_or(0) as usize;
        }
        return Some(NodeKind::Divert(divert));
    }

    if let Some(path) = object.get("*") {
        let flags = object.get("flg").and_then(JsonToken::as_i64).unwrap_or(0);
        return Some(NodeKind::ChoicePoint(ChoicePoint::from_flags(
            Path::parse(path.as_str()?),
            flags,
        )));
    }

    if let Some(name) = object.get("VAR?") {
        return Some(NodeKind::VariableReference(VariableReference {
            name: Some(name.as_str()?.to_string()),
            path_for_count: None,
        }));
    }
    if let Some(path) = object.get("CNT?") {
        return Some(NodeKind::VariableReference(VariableReference {
            name: None,
            path_for_count: Some(Path::parse(path.as_str()?)),
        }));
    }

    for (key, is_global) in [("VAR=", true), ("temp=", false)] {
        if let Some(name) = object.get(key) {
            return Some(NodeKind::VariableAssignment(VariableAssignment {
                name: name.as_str()?.to_string(),
                is_new_declaration: !object.contains_key("re"),
                is_global,
            }));
        }
    }

    if let Some(text) = object.get("#") {
        return Some(NodeKind::Tag(text.as_str()?.to_string()));
    }
    None
}

fn int_token(token: &JsonToken) -> Result<i32, InkError> {
    token
        .as_i64()
        .and_then(|value| i32::try_from(value).ok())
        .ok_or_else(|| bad_token(token))
}

/// Reads the tokens that denote values; `Ok(None)` for any other token.
pub(crate) fn value_from_token(token: &JsonToken) -> Result<Option<Value>, InkError> {
    match token {
        JsonToken::Bool(value) => Ok(Some(Value::Bool(*value))),
        JsonToken::Number(number) => {
            if number.is_i64() {
                Ok(Some(Value::Int(int_token(token)?)))
            } else {
                let value = number.as_f64().ok_or_else(|| bad_token(token))?;
                Ok(Some(Value::Float(value as f32)))
            }
        }
        JsonToken::String(text) => {
            if let Some(rest) = text.strip_prefix('^') {
                Ok(Some(Value::String(rest.to_string())))
            } else if text == "\n" {
                Ok(Some(Value::String("\n".to_string())))
            } else {
                Ok(None)
            }
        }
        JsonToken::Object(object) => {
            if let Some(path) = object.get("^->") {
                let path = path.as_str().ok_or_else(|| bad_token(token))?;
                return Ok(Some(Value::DivertTarget(Path::parse(path))));
            }
            if let Some(name) = object.get("^var") {
                let name = name.as_str().ok_or_else(|| bad_token(token))?;
                let context_index = match object.get("ci") {
                    Some(index) => int_token(index)?,
                    None => -1,
                };
                return Ok(Some(Value::variable_pointer(name, context_index)));
            }
            if let Some(items) = object.get("list") {
                let items = items.as_object().ok_or_else(|| bad_token(token))?;
                let mut list = InkList::new();
                if let Some(JsonToken::Array(origins)) = object.get("origins") {
                    list.set_initial_origin_names(
                        origins
                            .iter()
                            .filter_map(JsonToken::as_str)
                            .map(str::to_string)
                            .collect(),
                    );
                }
                for (full_name, value) in items {
                    list.insert(InkListItem::from_full_name(full_name), int_token(value)?);
                }
                return Ok(Some(Value::List(list)));
            }
            Ok(None)
        }
        _ => Ok(None),
    }
}

/// Reads a token of the output stream or evaluation stack.
pub fn rt_object_from_token(token: &JsonToken) -> Result<RtObject, InkError> {
    if let Some(value) = value_from_token(token)? {
        return Ok(RtObject::Value(value));
    }
    match token {
        JsonToken::String(text) if text == "<>" => Ok(RtObject::Glue),
        JsonToken::String(text) if text == "void" => Ok(RtObject::Void),
        JsonToken::String(text) => ControlCommand::from_name(text)
            .map(RtObject::Command)
            .ok_or_else(|| bad_token(token)),
        JsonToken::Object(object) => match object.get("#").and_then(JsonToken::as_str) {
            Some(text) => Ok(RtObject::Tag(text.to_string())),
            None => Err(bad_token(token)),
        },
        _ => Err(bad_token(token)),
    }
}

#[cfg(test)]
mod read_tests {
    use super::*;

    const HELLO: &str = r##"{"inkVersion":21,"root":[["^Hello world","\n",["done",{"#f":5,"#n":"g-0"}],null],"done",{"#f":1}],"listDefs":{}}"##;

    #[test]
    fn reads_nested_containers_and_names() {
        let document = read_story(HELLO).expect("story should load");
        let tree = &document.tree;
        let root = tree.container(tree.root()).expect("root container");
        assert_eq!(root.content.len(), 2);
        assert!(root.visits_should_be_counted);

        let first = root.content[0];
        let inner = tree.container(first).expect("inner container");
        assert_eq!(inner.content.len(), 3);
        let gather = inner.named_content.get("g-0").copied().expect("named gather");
        assert_eq!(tree.path_string(gather), "0.g-0");
        let gather_container = tree.container(gather).expect("gather");
        assert!(gather_container.counting_at_start_only);
    }

    #[test]
    fn rejects_incompatible_versions() {
        let newer = HELLO.replace("\"inkVersion\":21", "\"inkVersion\":22");
        assert_eq!(read_story(&newer).expect_err("too new").code, "JSON_VERSION");
        let older = HELLO.replace("\"inkVersion\":21", "\"inkVersion\":17");
        assert_eq!(read_story(&older).expect_err("too old").code, "JSON_VERSION");
        let accepted = HELLO.replace("\"inkVersion\":21", "\"inkVersion\":20");
        assert_eq!(read_story(&accepted).expect("in range").ink_version, 20);
        assert_eq!(read_story("{}").expect_err("no version").code, "JSON_VERSION");
        let wrapped = HELLO.replace("\"inkVersion\":21", "\"inkVersion\":4294967317");
        assert_eq!(read_story(&wrapped).expect_err("out of range").code, "JSON_VERSION");
    }

    #[test]
    fn reads_object_tokens() {
        let json = r##"{"inkVersion":21,"root":[
            {"->":"knot"},{"f()":"fn"},{"->t->":"t"},{"x()":"ext","exArgs":2},
            {"->":"$r","var":true,"c":true},{"*":".^.c-0","flg":20},
            {"VAR?":"x"},{"CNT?":".^"},{"VAR=":"x","re":true},{"temp=":"y"},
            {"#":"tag"},{"^->":"knot"},{"^var":"x","ci":0},"L^","MIN","void",
            {"knot":["done",null],"fn":["~ret",null],"t":["->->",null],"c-0":["done",null]}],
            "listDefs":{"colours":{"red":1,"blue":2}}}"##;
        let document = read_story(json).expect("story should load");
        let tree = &document.tree;
        let root = tree.container(tree.root()).expect("root");
        let kinds: Vec<&NodeKind> = root.content.iter().map(|id| tree.kind(*id)).collect();

        match kinds[3] {
            NodeKind::Divert(divert) => {
                assert!(divert.is_external);
                assert_eq!(divert.external_args, 2);
            }
            other => panic!("expected external divert, got {:?}", other),
        }
        match kinds[4] {
            NodeKind::Divert(divert) => {
                assert_eq!(divert.variable_divert_name.as_deref(), Some("$r"));
                assert!(divert.is_conditional);
            }
            other => panic!("expected variable divert, got {:?}", other),
        }
        match kinds[5] {
            NodeKind::ChoicePoint(choice) => {
                assert!(choice.has_choice_only_content);
                assert!(choice.once_only);
            }
            other => panic!("expected choice point, got {:?}", other),
        }
        match kinds[8] {
            NodeKind::VariableAssignment(assignment) => {
                assert!(!assignment.is_new_declaration);
                assert!(assignment.is_global);
            }
            other => panic!("expected assignment, got {:?}", other),
        }
        assert!(matches!(kinds[13], NodeKind::Native(op) if op.name() == "^"));
        assert!(matches!(kinds[15], NodeKind::Void));
        assert!(tree.knot_container_with_name("knot").is_some());
        assert!(document.lists.list_definition("colours").is_some());
    }

    #[test]
    fn reads_runtime_objects_for_saved_state() {
        let token: JsonToken = serde_json::from_str(r#"{"list":{},"origins":["colours"]}"#)
            .expect("json");
        match rt_object_from_token(&token).expect("list") {
            RtObject::Value(Value::List(list)) => {
                assert!(list.is_empty());
                assert_eq!(list.origin_names(), vec!["colours".to_string()]);
            }
            other => panic!("expected list, got {:?}", other),
        }
        let token: JsonToken = serde_json::from_str(r#""/str""#).expect("json");
        assert_eq!(
            rt_object_from_token(&token).expect("command"),
            RtObject::Command(ControlCommand::EndString)
        );
        let token: JsonToken = serde_json::from_str("2.5").expect("json");
        assert_eq!(rt_object_from_token(&token).expect("float"), RtObject::Value(Value::Float(2.5)));
    }
}
