//! Schema derivation
//!
//! Turns a [`ToolSpec`] into a self-contained JSON schema plus an
//! [`ArgumentValidator`]. Nested records are expanded inline so the schema
//! carries no `$ref`/`$defs` indirection and no type names. Explicit
//! schemas supplied by the caller go through [`sanitize_schema`], which
//! applies the same normalization to hand-written or generated JSON.

use serde_json::{Map, Value, json};

use crate::error::{Result, ToolError};
use crate::schema::{ObjectSpec, ParamKind, ParamSpec, ParamType, ToolSpec};
use crate::validator::{ArgumentValidator, FieldShape, ObjectShape, Shape};

/// Maximum nesting of records and arrays in a parameter schema
pub const MAX_SCHEMA_DEPTH: usize = 32;

/// Keys removed from explicit schemas
const STRIPPED_KEYS: &[&str] = &["$defs", "definitions", "$schema", "$id", "title"];

/// Output of [`derive`]
#[derive(Debug, Clone)]
pub struct DerivedSchema {
    /// Tool description, trimmed
    pub description: String,
    /// JSON schema of the parameter object
    pub parameters: Value,
    /// Runtime validator built from the same tree
    pub validator: ArgumentValidator,
}

/// Derive the parameter schema and validator for `spec`
///
/// # Errors
///
/// * [`ToolError::Validation`] if the tool or a top-level parameter has no
///   description, a parameter is variadic, a name repeats, or a record
///   refers back to itself
/// * [`ToolError::SchemaDepthExceeded`] if nesting passes [`MAX_SCHEMA_DEPTH`]
pub fn derive(spec: &ToolSpec) -> Result<DerivedSchema> {
    let description = check_tool_metadata(&spec.name, spec.description.as_deref())?;

    for param in &spec.params {
        if param.description.as_deref().is_none_or(|d| d.trim().is_empty()) {
            return Err(ToolError::Validation(format!(
                "Parameter '{}' in tool '{}' is missing a description",
                param.name, spec.name
            )));
        }
    }

    let mut resolver = Resolver {
        tool: &spec.name,
        stack: Vec::new(),
    };
    let root = resolver.record(&spec.params, None, 0)?;
    let parameters = Value::Object(render_object(&root));

    Ok(DerivedSchema {
        description,
        parameters,
        validator: ArgumentValidator::new(root),
    })
}

/// Check the tool name and description, returning the trimmed description
pub(crate) fn check_tool_metadata(name: &str, description: Option<&str>) -> Result<String> {
    if name.trim().is_empty() {
        return Err(ToolError::Validation("tool name must not be empty".to_string()));
    }
    match description.map(str::trim) {
        Some(d) if !d.is_empty() => Ok(d.to_string()),
        _ => Err(ToolError::Validation(format!(
            "Tool '{name}' is missing a description"
        ))),
    }
}

struct Resolver<'a> {
    tool: &'a str,
    stack: Vec<&'static str>,
}

impl Resolver<'_> {
    fn record(&mut self, params: &[ParamSpec], description: Option<String>, depth: usize) -> Result<ObjectShape> {
        let mut fields: Vec<FieldShape> = Vec::with_capacity(params.len());
        for param in params {
            if param.kind == ParamKind::Variadic {
                return Err(ToolError::Validation(format!(
                    "Parameter '{}' in tool '{}' is variadic; only named parameters are supported",
                    param.name, self.tool
                )));
            }
            if fields.iter().any(|f| f.name == param.name) {
                return Err(ToolError::Validation(format!(
                    "Parameter '{}' is declared twice in tool '{}'",
                    param.name, self.tool
                )));
            }
            fields.push(FieldShape {
                name: param.name.clone(),
                shape: self.shape(&param.param_type, depth + 1)?,
                description: param.description.clone(),
                required: param.required && param.default.is_none(),
                default: param.default.clone(),
            });
        }
        Ok(ObjectShape { description, fields })
    }

    fn shape(&mut self, param_type: &ParamType, depth: usize) -> Result<Shape> {
        if depth > MAX_SCHEMA_DEPTH {
            return Err(ToolError::SchemaDepthExceeded {
                tool: self.tool.to_string(),
                limit: MAX_SCHEMA_DEPTH,
            });
        }
        let shape = match param_type {
            ParamType::String => Shape::String,
            ParamType::Integer => Shape::Integer,
            ParamType::Number => Shape::Number,
            ParamType::Boolean => Shape::Boolean,
            ParamType::Array(item) => Shape::Array(Box::new(self.shape(item, depth + 1)?)),
            ParamType::Optional(inner) => Shape::Nullable(Box::new(self.shape(inner, depth)?)),
            ParamType::Enum(values) => {
                if values.is_empty() {
                    return Err(ToolError::Validation(format!(
                        "Enum parameter in tool '{}' has no values",
                        self.tool
                    )));
                }
                Shape::Enum(values.clone())
            }
            ParamType::Object(object) => {
                if self.stack.contains(&object.name) {
                    return Err(ToolError::Validation(format!(
                        "Tool '{}' uses recursive structure '{}'; self-referential types cannot be expressed inline",
                        self.tool, object.name
                    )));
                }
                self.stack.push(object.name);
                let ObjectSpec { description, fields } = (object.build)();
                let record = self.record(&fields, description, depth);
                self.stack.pop();
                Shape::Object(record?)
            }
        };
        Ok(shape)
    }
}

fn render_shape(shape: &Shape) -> Map<String, Value> {
    let mut out = Map::new();
    match shape {
        Shape::String => {
            out.insert("type".into(), json!("string"));
        }
        Shape::Integer => {
            out.insert("type".into(), json!("integer"));
        }
        Shape::Number => {
            out.insert("type".into(), json!("number"));
        }
        Shape::Boolean => {
            out.insert("type".into(), json!("boolean"));
        }
        Shape::Enum(values) => {
            out.insert("type".into(), json!("string"));
            out.insert("enum".into(), json!(values));
        }
        Shape::Array(item) => {
            out.insert("type".into(), json!("array"));
            out.insert("items".into(), Value::Object(render_shape(item)));
        }
        // Nullability is carried by `required`, not by a union type
        Shape::Nullable(inner) => return render_shape(inner),
        Shape::Object(record) => return render_object(record),
    }
    out
}

fn render_object(record: &ObjectShape) -> Map<String, Value> {
    let mut properties = Map::new();
    let mut required = Vec::new();
    for field in &record.fields {
        let mut property = render_shape(&field.shape);
        if let Some(description) = &field.description {
            property.insert("description".into(), json!(description));
        }
        if let Some(default) = &field.default {
            property.insert("default".into(), default.clone());
        }
        properties.insert(field.name.clone(), Value::Object(property));
        if field.required {
            required.push(Value::String(field.name.clone()));
        }
    }

    let mut schema = Map::new();
    schema.insert("type".into(), json!("object"));
    if let Some(description) = &record.description {
        schema.insert("description".into(), json!(description));
    }
    schema.insert("properties".into(), Value::Object(properties));
    if !required.is_empty() {
        schema.insert("required".into(), Value::Array(required));
    }
    schema.insert("additionalProperties".into(), Value::Bool(false));
    schema
}

/// Normalize a caller-supplied parameter schema
///
/// Inlines local `$ref`s, collapses `anyOf`/`oneOf` unions of a type with
/// `null`, drops `$defs`, `$schema`, `$id` and `title`, closes every object
/// with `additionalProperties: false` and prunes `required` entries that
/// name no property.
pub fn sanitize_schema(tool: &str, schema: &Value) -> Result<Value> {
    let Value::Object(root) = schema else {
        return Err(ToolError::Validation(format!(
            "Parameters schema for tool '{tool}' must be a JSON object"
        )));
    };
    let defs = root
        .get("$defs")
        .or_else(|| root.get("definitions"))
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    let mut sanitizer = Sanitizer {
        tool,
        defs: &defs,
        stack: Vec::new(),
    };
    let mut cleaned = sanitizer.clean(schema, 0)?;
    if let Value::Object(map) = &mut cleaned {
        map.entry("type").or_insert_with(|| json!("object"));
        if !map.contains_key("properties") {
            map.insert("properties".into(), Value::Object(Map::new()));
            map.entry("additionalProperties").or_insert(Value::Bool(false));
        }
    }
    Ok(cleaned)
}

struct Sanitizer<'a> {
    tool: &'a str,
    defs: &'a Map<String, Value>,
    stack: Vec<String>,
}

impl Sanitizer<'_> {
    fn clean(&mut self, value: &Value, depth: usize) -> Result<Value> {
        if depth > MAX_SCHEMA_DEPTH {
            return Err(ToolError::SchemaDepthExceeded {
                tool: self.tool.to_string(),
                limit: MAX_SCHEMA_DEPTH,
            });
        }
        match value {
            Value::Object(map) => self.clean_map(map, depth),
            Value::Array(items) => items
                .iter()
                .map(|item| self.clean(item, depth + 1))
                .collect::<Result<Vec<_>>>()
                .map(Value::Array),
            other => Ok(other.clone()),
        }
    }

    fn clean_map(&mut self, map: &Map<String, Value>, depth: usize) -> Result<Value> {
        if let Some(reference) = map.get("$ref").and_then(Value::as_str) {
            let resolved = self.resolve_ref(reference, depth)?;
            return self.merge_siblings(resolved, map, &["$ref"], depth);
        }
        if let Some(inner) = nullable_variant(map) {
            let collapsed = self.clean(inner, depth)?;
            return self.merge_siblings(collapsed, map, &["anyOf", "oneOf"], depth);
        }

        let mut out = Map::new();
        for (key, value) in map {
            if STRIPPED_KEYS.contains(&key.as_str()) {
                continue;
            }
            let cleaned = if key == "properties" {
                self.clean_properties(value, depth)?
            } else {
                self.clean(value, depth + 1)?
            };
            out.insert(key.clone(), cleaned);
        }

        let defined: Option<Vec<String>> = out
            .get("properties")
            .and_then(Value::as_object)
            .map(|properties| properties.keys().cloned().collect());
        if let Some(defined) = defined {
            if let Some(Value::Array(required)) = out.get_mut("required") {
                required.retain(|r| r.as_str().is_some_and(|r| defined.iter().any(|d| d.as_str() == r)));
            }
            if out.get("required").and_then(Value::as_array).is_some_and(Vec::is_empty) {
                out.remove("required");
            }
            out.entry("additionalProperties").or_insert(Value::Bool(false));
        }
        Ok(Value::Object(out))
    }

    fn clean_properties(&mut self, value: &Value, depth: usize) -> Result<Value> {
        let Value::Object(properties) = value else {
            return Err(ToolError::Validation(format!(
                "'properties' in tool '{}' must be an object",
                self.tool
            )));
        };
        let mut out = Map::new();
        for (name, property) in properties {
            out.insert(name.clone(), self.clean(property, depth + 1)?);
        }
        Ok(Value::Object(out))
    }

    fn resolve_ref(&mut self, reference: &str, depth: usize) -> Result<Value> {
        let name = reference.rsplit('/').next().unwrap_or(reference).to_string();
        if self.stack.contains(&name) {
            return Err(ToolError::Validation(format!(
                "Tool '{}' uses recursive structure '{name}'; self-referential types cannot be expressed inline",
                self.tool
            )));
        }
        let defs = self.defs;
        let target = defs.get(&name).ok_or_else(|| {
            ToolError::Validation(format!(
                "Tool '{}' refers to undefined schema '{reference}'",
                self.tool
            ))
        })?;
        self.stack.push(name);
        let resolved = self.clean(target, depth + 1);
        self.stack.pop();
        resolved
    }

    /// Copy keys such as `description` that sit next to a `$ref` or union
    fn merge_siblings(&mut self, mut base: Value, map: &Map<String, Value>, skip: &[&str], depth: usize) -> Result<Value> {
        if let Value::Object(target) = &mut base {
            for (key, value) in map {
                if skip.contains(&key.as_str()) || STRIPPED_KEYS.contains(&key.as_str()) {
                    continue;
                }
                target.insert(key.clone(), self.clean(value, depth + 1)?);
            }
        }
        Ok(base)
    }
}

/// The non-null member of a two-member union with `null`
fn nullable_variant(map: &Map<String, Value>) -> Option<&Value> {
    ["anyOf", "oneOf"].iter().find_map(|key| {
        let options = map.get(*key)?.as_array()?;
        if options.len() != 2 {
            return None;
        }
        let is_null = |v: &Value| v.get("type").and_then(Value::as_str) == Some("null");
        match (is_null(&options[0]), is_null(&options[1])) {
            (true, false) => Some(&options[1]),
            (false, true) => Some(&options[0]),
            _ => None,
        }
    })
}
