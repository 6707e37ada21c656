//! Runtime argument validation against a resolved parameter tree

use serde_json::{Map, Value};

use crate::Arguments;

/// Resolved type of a value
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Shape {
    String,
    Integer,
    Number,
    Boolean,
    Array(Box<Shape>),
    Enum(Vec<String>),
    Nullable(Box<Shape>),
    Object(ObjectShape),
}

impl Shape {
    fn label(&self) -> &'static str {
        match self {
            Self::String | Self::Enum(_) => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Array(_) => "array",
            Self::Nullable(inner) => inner.label(),
            Self::Object(_) => "object",
        }
    }
}

/// Resolved field of a record
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct FieldShape {
    pub name: String,
    pub shape: Shape,
    pub description: Option<String>,
    pub required: bool,
    pub default: Option<Value>,
}

/// Resolved record
#[derive(Debug, Clone, PartialEq, Default)]
pub(crate) struct ObjectShape {
    pub description: Option<String>,
    pub fields: Vec<FieldShape>,
}

/// Checks decoded tool arguments before the tool body runs
///
/// Rejects unknown parameters, missing required parameters and values of
/// the wrong type, and fills in declared defaults. Errors name the offending
/// parameter path (`filter.tags[2]`).
///
/// Validation is strict and never coerces. An integer parameter accepts only
/// a JSON integer, so `5.0` and `"5"` are rejected. A number parameter
/// accepts integers too. Unknown keys fail at every nesting level, matching
/// the `additionalProperties: false` the declared schema advertises.
#[derive(Debug, Clone, PartialEq)]
pub struct ArgumentValidator {
    root: ObjectShape,
}

impl ArgumentValidator {
    pub(crate) fn new(root: ObjectShape) -> Self {
        Self { root }
    }

    /// Validate `args`, returning them with defaults applied
    pub fn validate(&self, args: Arguments) -> Result<Arguments, String> {
        check_object(&self.root, args, "")
    }
}

fn join(path: &str, name: &str) -> String {
    if path.is_empty() {
        name.to_string()
    } else {
        format!("{path}.{name}")
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn check_object(shape: &ObjectShape, mut input: Map<String, Value>, path: &str) -> Result<Map<String, Value>, String> {
    if let Some(unknown) = input
        .keys()
        .find(|key| !shape.fields.iter().any(|f| &f.name == *key))
    {
        return Err(format!("unexpected parameter '{}'", join(path, unknown)));
    }

    let mut output = Map::new();
    for field in &shape.fields {
        let field_path = join(path, &field.name);
        match input.remove(&field.name) {
            Some(value) => {
                let checked = check_value(&field.shape, value, &field_path)?;
                output.insert(field.name.clone(), checked);
            }
            None => {
                if let Some(default) = &field.default {
                    output.insert(field.name.clone(), default.clone());
                } else if field.required {
                    return Err(format!("missing required parameter '{field_path}'"));
                }
            }
        }
    }
    Ok(output)
}

fn check_value(shape: &Shape, value: Value, path: &str) -> Result<Value, String> {
    match (shape, value) {
        (Shape::Nullable(_), Value::Null) => Ok(Value::Null),
        (Shape::Nullable(inner), value) => check_value(inner, value, path),
        (Shape::String, value @ Value::String(_)) => Ok(value),
        (Shape::Integer, Value::Number(n)) if n.is_i64() || n.is_u64() => Ok(Value::Number(n)),
        (Shape::Number, value @ Value::Number(_)) => Ok(value),
        (Shape::Boolean, value @ Value::Bool(_)) => Ok(value),
        (Shape::Enum(allowed), Value::String(s)) => {
            if allowed.contains(&s) {
                Ok(Value::String(s))
            } else {
                Err(format!(
                    "parameter '{path}' must be one of [{}], got '{s}'",
                    allowed.join(", ")
                ))
            }
        }
        (Shape::Array(item), Value::Array(items)) => items
            .into_iter()
            .enumerate()
            .map(|(i, v)| check_value(item, v, &format!("{path}[{i}]")))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        (Shape::Object(record), Value::Object(map)) => check_object(record, map, path).map(Value::Object),
        (expected, actual) => Err(format!(
            "parameter '{path}' expected {}, got {}",
            expected.label(),
            kind_of(&actual)
        )),
    }
}
