use std::collections::HashMap;
use std::fmt;

use ink_core::InkError;

use crate::list::{InkList, InkListItem, ListDefinitionsOrigin};
use crate::object::RtObject;
use crate::value::{Value, ValueType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NativeOp {
    Add,
    Subtract,
    Divide,
    Multiply,
    Mod,
    Negate,
    Equal,
    Greater,
    Less,
    GreaterThanOrEquals,
    LessThanOrEquals,
    NotEquals,
    Not,
    And,
    Or,
    Min,
    Max,
    Pow,
    Floor,
    Ceiling,
    Int,
    Float,
    Has,
    Hasnt,
    Intersect,
    ListMin,
    ListMax,
    All,
    Count,
    ValueOfList,
    Invert,
}

const OPS: [(NativeOp, &str, usize); 31] = [
    (NativeOp::Add, "+", 2),
    (NativeOp::Subtract, "-", 2),
    (NativeOp::Divide, "/", 2),
    (NativeOp::Multiply, "*", 2),
    (NativeOp::Mod, "%", 2),
    (NativeOp::Negate, "_", 1),
    (NativeOp::Equal, "==", 2),
    (NativeOp::Greater, ">", 2),
    (NativeOp::Less, "<", 2),
    (NativeOp::GreaterThanOrEquals, ">=", 2),
    (NativeOp::LessThanOrEquals, "<=", 2),
    (NativeOp::NotEquals, "!=", 2),
    (NativeOp::Not, "!", 1),
    (NativeOp::And, "&&", 2),
    (NativeOp::Or, "||", 2),
    (NativeOp::Min, "MIN", 2),
    (NativeOp::Max, "MAX", 2),
    (NativeOp::Pow, "POW", 2),
    (NativeOp::Floor, "FLOOR", 1),
    (NativeOp::Ceiling, "CEILING", 1),
    (NativeOp::Int, "INT", 1),
    (NativeOp::Float, "FLOAT", 1),
    (NativeOp::Has, "?", 2),
    (NativeOp::Hasnt, "!?", 2),
    (NativeOp::Intersect, "^", 2),
    (NativeOp::ListMin, "LIST_MIN", 1),
    (NativeOp::ListMax, "LIST_MAX", 1),
    (NativeOp::All, "LIST_ALL", 1),
    (NativeOp::Count, "LIST_COUNT", 1),
    (NativeOp::ValueOfList, "LIST_VALUE", 1),
    (NativeOp::Invert, "LIST_INVERT", 1),
];

impl NativeOp {
    pub fn name(self) -> &'static str {
        OPS.iter()
            .find(|(op, _, _)| *op == self)
            .map(|(_, name, _)| *name)
            .unwrap_or("?")
    }

    pub fn number_of_parameters(self) -> usize {
        OPS.iter()
            .find(|(op, _, _)| *op == self)
            .map(|(_, _, arity)| *arity)
            .unwrap_or(2)
    }
}

impl fmt::Display for NativeOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Native '{}'", self.name())
    }
}

use NativeOp::*;

const NUMERIC_OPS: &[NativeOp] = &[
    Add, Subtract, Divide, Multiply, Mod, Negate, Equal, Greater, Less,
    GreaterThanOrEquals, LessThanOrEquals, NotEquals, Not, And, Or, Min, Max, Pow, Floor,
    Ceiling, Int, Float,
];
const STRING_OPS: &[NativeOp] = &[Add, Equal, NotEquals, Has, Hasnt];
const LIST_OPS: &[NativeOp] = &[
    Add, Subtract, Has, Hasnt, Intersect, Equal, Greater, Less, GreaterThanOrEquals,
    LessThanOrEquals, NotEquals, And, Or, Not, ListMin, ListMax, All, Count, ValueOfList,
    Invert,
];
const DIVERT_TARGET_OPS: &[NativeOp] = &[Equal, NotEquals];

/// Operator table built once per story: names to ops, and the value types
/// each op has an implementation for.
#[derive(Debug, Clone)]
pub struct NativeFunctionTable {
    by_name: HashMap<&'static str, NativeOp>,
    implementations: HashMap<NativeOp, Vec<ValueType>>,
}

impl NativeFunctionTable {
    pub fn build() -> Self {
        let by_name = OPS.iter().map(|(op, name, _)| (*name, *op)).collect();
        let mut implementations: HashMap<NativeOp, Vec<ValueType>> = HashMap::new();
        let per_type = [
            (ValueType::Int, NUMERIC_OPS),
            (ValueType::Float, NUMERIC_OPS),
            (ValueType::String, STRING_OPS),
            (ValueType::List, LIST_OPS),
            (ValueType::DivertTarget, DIVERT_TARGET_OPS),
        ];
        for (value_type, ops) in per_type {
            for op in ops {
                implementations.entry(*op).or_default().push(value_type);
            }
        }
        Self {
            by_name,
            implementations,
        }
    }

    pub fn lookup(&self, name: &str) -> Option<NativeOp> {
        self.by_name.get(name).copied()
    }

    pub fn exists(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    fn supports(&self, op: NativeOp, value_type: ValueType) -> bool {
        self.implementations
            .get(&op)
            .is_some_and(|types| types.contains(&value_type))
    }

    /// Applies `op` to operands in push order.
    pub fn call(
        &self,
        op: NativeOp,
        params: &[RtObject],
        lists: &ListDefinitionsOrigin,
    ) -> Result<Value, InkError> {
        if params.len() != op.number_of_parameters() {
            return Err(InkError::new(
                "NATIVE_ARITY",
                format!(
                    "Unexpected number of parameters to {}: {}",
                    op,
                    params.len()
                ),
            ));
        }

        let mut values = Vec::with_capacity(params.len());
        for param in params {
            match param {
                RtObject::Value(value) => values.push(value.clone()),
                RtObject::Void => {
                    return Err(InkError::new(
                        "NATIVE_VOID_OPERAND",
                        "Attempting to perform operation on a void value. Did you forget to 'return' a value from a function you called here?",
                    ))
                }
                other => {
                    return Err(InkError::new(
                        "NATIVE_BAD_OPERAND",
                        format!("Cannot perform {} on {}", op, other),
                    ))
                }
            }
        }

        if let [left, right] = values.as_slice() {
            if left.value_type() == ValueType::List || right.value_type() == ValueType::List {
                return self.call_binary_list_operation(op, left, right, lists);
            }
        }

        let coerced = coerce_to_single_type(&values, lists)?;
        self.call_coerced(op, &coerced, lists)
    }

    fn call_binary_list_operation(
        &self,
        op: NativeOp,
        left: &Value,
        right: &Value,
        lists: &ListDefinitionsOrigin,
    ) -> Result<Value, InkError> {
        match (op, left, right) {
            (Add | Subtract, Value::List(list), Value::Int(delta)) => {
                Ok(Value::List(list_increment(op, list, *delta, lists)))
            }
            (And | Or, _, _)
                if left.value_type() != ValueType::List
                    || right.value_type() != ValueType::List =>
            {
                let left = left.is_truthy()?;
                let right = right.is_truthy()?;
                Ok(Value::Bool(if op == And {
                    left && right
                } else {
                    left || right
                }))
            }
            (_, Value::List(_), Value::List(_)) => {
                self.call_coerced(op, &[left.clone(), right.clone()], lists)
            }
            (_, Value::List(_), Value::Int(_)) | (_, Value::Int(_), Value::List(_)) => {
                let coerced = coerce_to_single_type(&[left.clone(), right.clone()], lists)?;
                self.call_coerced(op, &coerced, lists)
            }
            _ => Err(InkError::new(
                "NATIVE_MIXED_TYPES",
                format!(
                    "Can not call use '{}' operation on {} and {}",
                    op.name(),
                    left.value_type(),
                    right.value_type()
                ),
            )),
        }
    }

    fn call_coerced(
        &self,
        op: NativeOp,
        values: &[Value],
        lists: &ListDefinitionsOrigin,
    ) -> Result<Value, InkError> {
        let value_type = values
            .first()
            .map(Value::value_type)
            .unwrap_or(ValueType::Int);
        if !self.supports(op, value_type) {
            return Err(InkError::new(
                "NATIVE_UNSUPPORTED",
                format!("Cannot perform operation '{}' on {}", op.name(), value_type),
            ));
        }

        match values {
            [Value::Int(x)] => int_unary(op, *x),
            [Value::Int(x), Value::Int(y)] => int_binary(op, *x, *y),
            [Value::Float(x)] => float_unary(op, *x),
            [Value::Float(x), Value::Float(y)] => float_binary(op, *x, *y),
            [Value::String(x), Value::String(y)] => string_binary(op, x, y),
            [Value::List(x)] => list_unary(op, x, lists),
            [Value::List(x), Value::List(y)] => list_binary(op, x, y),
            [Value::DivertTarget(x), Value::DivertTarget(y)] => match op {
                Equal => Ok(Value::Bool(x == y)),
                _ => Ok(Value::Bool(x != y)),
            },
            _ => Err(InkError::new(
                "NATIVE_UNSUPPORTED",
                format!("Cannot perform operation '{}' on {}", op.name(), value_type),
            )),
        }
    }
}

/// Casts every operand to the widest type present, never narrower than Int.
/// Ints mixed with a list become single-item lists of the list's origin.
fn coerce_to_single_type(
    values: &[Value],
    lists: &ListDefinitionsOrigin,
) -> Result<Vec<Value>, InkError> {
    let mut target = ValueType::Int;
    let mut special_list: Option<&InkList> = None;
    for value in values {
        if value.value_type() > target {
            target = value.value_type();
        }
        if let Value::List(list) = value {
            special_list = Some(list);
        }
    }

    if target != ValueType::List {
        return values.iter().map(|value| value.cast(target)).collect();
    }

    let mut coerced = Vec::with_capacity(values.len());
    for value in values {
        match value {
            Value::List(_) => coerced.push(value.clone()),
            Value::Int(int_value) => {
                let origin = special_list
                    .and_then(|list| list.max_item())
                    .and_then(|(item, _)| lists.list_definition(&item.origin_name));
                let item = origin.and_then(|origin| origin.item_with_value(*int_value));
                match item {
                    Some(item) => coerced.push(Value::List(InkList::from_single_item(item, *int_value))),
                    None => {
                        return Err(InkError::new(
                            "NATIVE_LIST_ITEM",
                            format!(
                                "Could not find List item with the value {} in {}",
                                int_value,
                                origin.map(|origin| origin.name.as_str()).unwrap_or("?")
                            ),
                        ))
                    }
                }
            }
            other => {
                return Err(InkError::new(
                    "NATIVE_MIXED_TYPES",
                    format!(
                        "Cannot mix Lists and {} values in this operation",
                        other.value_type()
                    ),
                ))
            }
        }
    }
    Ok(coerced)
}

/// `list + n` moves each item n steps within its own origin, dropping items
/// that fall off the end.
fn list_increment(op: NativeOp, list: &InkList, delta: i32, lists: &ListDefinitionsOrigin) -> InkList {
    let mut result = InkList::new();
    for (item, value) in list.items() {
        let target = if op == Add {
            value.wrapping_add(delta)
        } else {
            value.wrapping_sub(delta)
        };
        let incremented = lists
            .list_definition(&item.origin_name)
            .and_then(|origin| origin.item_with_value(target));
        if let Some(incremented) = incremented {
            result.insert(incremented, target);
        }
    }
    result
}

fn divide_by_zero() -> InkError {
    InkError::new("NATIVE_DIVIDE_BY_ZERO", "Attempted to divide by zero")
}

fn int_binary(op: NativeOp, x: i32, y: i32) -> Result<Value, InkError> {
    Ok(match op {
        Add => Value::Int(x.wrapping_add(y)),
        Subtract => Value::Int(x.wrapping_sub(y)),
        Multiply => Value::Int(x.wrapping_mul(y)),
        Divide | Mod if y == 0 => return Err(divide_by_zero()),
        Divide => Value::Int(x.wrapping_div(y)),
        Mod => Value::Int(x.wrapping_rem(y)),
        Equal => Value::Bool(x == y),
        Greater => Value::Bool(x > y),
        Less => Value::Bool(x < y),
        GreaterThanOrEquals => Value::Bool(x >= y),
        LessThanOrEquals => Value::Bool(x <= y),
        NotEquals => Value::Bool(x != y),
        And => Value::Bool(x != 0 && y != 0),
        Or => Value::Bool(x != 0 || y != 0),
        Min => Value::Int(x.min(y)),
        Max => Value::Int(x.max(y)),
        Pow => Value::Float((x as f64).powf(y as f64) as f32),
        _ => return Err(unsupported(op, ValueType::Int)),
    })
}

fn int_unary(op: NativeOp, x: i32) -> Result<Value, InkError> {
    Ok(match op {
        Negate => Value::Int(x.wrapping_neg()),
        Not => Value::Bool(x == 0),
        Floor | Ceiling | Int => Value::Int(x),
        Float => Value::Float(x as f32),
        _ => return Err(unsupported(op, ValueType::Int)),
    })
}

fn float_binary(op: NativeOp, x: f32, y: f32) -> Result<Value, InkError> {
    Ok(match op {
        Add => Value::Float(x + y),
        Subtract => Value::Float(x - y),
        Multiply => Value::Float(x * y),
        Divide => Value::Float(x / y),
        Mod => Value::Float(x % y),
        Equal => Value::Bool(x == y),
        Greater => Value::Bool(x > y),
        Less => Value::Bool(x < y),
        GreaterThanOrEquals => Value::Bool(x >= y),
        LessThanOrEquals => Value::Bool(x <= y),
        NotEquals => Value::Bool(x != y),
        And => Value::Bool(x != 0.0 && y != 0.0),
        Or => Value::Bool(x != 0.0 || y != 0.0),
        Min => Value::Float(x.min(y)),
        Max => Value::Float(x.max(y)),
        Pow => Value::Float((x as f64).powf(y as f64) as f32),
        _ => return Err(unsupported(op, ValueType::Float)),
    })
}

fn float_unary(op: NativeOp, x: f32) -> Result<Value, InkError> {
    Ok(match op {
        Negate => Value::Float(-x),
        Not => Value::Bool(x == 0.0),
        Floor => Value::Float(x.floor()),
        Ceiling => Value::Float(x.ceil()),
        Int => Value::Int(x as i32),
        Float => Value::Float(x),
        _ => return Err(unsupported(op, ValueType::Float)),
    })
}

fn string_binary(op: NativeOp, x: &str, y: &str) -> Result<Value, InkError> {
    Ok(match op {
        Add => Value::String(format!("{}{}", x, y)),
        Equal => Value::Bool(x == y),
        NotEquals => Value::Bool(x != y),
        Has => Value::Bool(x.contains(y)),
        Hasnt => Value::Bool(!x.contains(y)),
        _ => return Err(unsupported(op, ValueType::String)),
    })
}

fn list_binary(op: NativeOp, x: &InkList, y: &InkList) -> Result<Value, InkError> {
    Ok(match op {
        Add => Value::List(x.union(y)),
        Subtract => Value::List(x.without(y)),
        Has => Value::Bool(x.contains(y)),
        Hasnt => Value::Bool(!x.contains(y)),
        Intersect => Value::List(x.intersect(y)),
        Equal => Value::Bool(x == y),
        NotEquals => Value::Bool(x != y),
        Greater => Value::Bool(x.greater_than(y)),
        Less => Value::Bool(x.less_than(y)),
        GreaterThanOrEquals => Value::Bool(x.greater_than_or_equals(y)),
        LessThanOrEquals => Value::Bool(x.less_than_or_equals(y)),
        And => Value::Bool(!x.is_empty() && !y.is_empty()),
        Or => Value::Bool(!x.is_empty() || !y.is_empty()),
        _ => return Err(unsupported(op, ValueType::List)),
    })
}

fn list_unary(op: NativeOp, x: &InkList, lists: &ListDefinitionsOrigin) -> Result<Value, InkError> {
    let single = |entry: Option<(&InkListItem, i32)>| {
        let mut list = InkList::new();
        if let Some((item, value)) = entry {
            list.insert(item.clone(), value);
        }
        Value::List(list)
    };
    Ok(match op {
        Not => Value::Int(i32::from(x.is_empty())),
        ListMin => single(x.min_item()),
        ListMax => single(x.max_item()),
        All => Value::List(x.all(lists)),
        Count => Value::Int(x.len() as i32),
        ValueOfList => Value::Int(x.max_item().map(|(_, value)| value).unwrap_or(0)),
        Invert => Value::List(x.inverse(lists)),
        _ => return Err(unsupported(op, ValueType::List)),
    })
}

fn unsupported(op: NativeOp, value_type: ValueType) -> InkError {
    InkError::new(
        "NATIVE_UNSUPPORTED",
        format!("Cannot perform operation '{}' on {}", op.name(), value_type),
    )
}
