use serde_json::{json, Map, Number, Value as JsonToken};

use crate::object::RtObject;
use crate::value::Value;

pub fn rt_object_to_token(object: &RtObject) -> JsonToken {
    match object {
        RtObject::Value(value) => value_to_token(value),
        RtObject::Glue => JsonToken::from("<>"),
        RtObject::Tag(text) => json!({ "#": text }),
        RtObject::Command(command) => JsonToken::from(command.name()),
        RtObject::Void => JsonToken::from("void"),
    }
}

pub fn value_to_token(value: &Value) -> JsonToken {
    match value {
        Value::Bool(value) => JsonToken::Bool(*value),
        Value::Int(value) => JsonToken::from(*value),
        Value::Float(value) => float_token(*value),
        Value::String(text) if text == "\n" => JsonToken::from("\n"),
        Value::String(text) => JsonToken::from(format!("^{}", text)),
        Value::DivertTarget(path) => json!({ "^->": path.components_string() }),
        Value::VariablePointer {
            name,
            context_index,
        } => json!({ "^var": name, "ci": context_index }),
        Value::List(list) => {
            let mut items = Map::new();
            for (item, value) in list.items() {
                let origin = if item.origin_name.is_empty() {
                    "?"
                } else {
                    item.origin_name.as_str()
                };
                items.insert(format!("{}.{}", origin, item.item_name), JsonToken::from(value));
            }
            let mut object = Map::new();
            object.insert("list".to_string(), JsonToken::Object(items));
            let origins = list.origin_names();
            if list.is_empty() && !origins.is_empty() {
                object.insert("origins".to_string(), JsonToken::from(origins));
            }
            JsonToken::Object(object)
        }
    }
}

/// Written through the shortest decimal form of the f32 so `0.1` stays `0.1`.
fn float_token(value: f32) -> JsonToken {
    let widened = value.to_string().parse::<f64>().unwrap_or(value as f64);
    Number::from_f64(widened)
        .map(JsonToken::Number)
        .unwrap_or(JsonToken::Null)
}
