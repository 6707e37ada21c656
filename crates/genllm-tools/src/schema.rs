//! Typed descriptors for tool parameters
//!
//! A tool is described by a [`ToolSpec`]: a name, a description and an
//! ordered list of [`ParamSpec`]s. Nested structured parameters are
//! described by an [`ObjectType`], whose fields are produced lazily so that
//! self-referential types can be declared (and then rejected by the deriver
//! instead of overflowing the stack).
//!
//! # Example
//!
//! ```
//! use genllm_tools::schema::{ParamSpec, ToolSpec};
//!
//! let spec = ToolSpec::new("add_numbers")
//!     .description("Add two integers")
//!     .param(ParamSpec::new::<i64>("a", "First operand"))
//!     .param(ParamSpec::new::<i64>("b", "Second operand"));
//! assert_eq!(spec.params.len(), 2);
//! ```

use serde_json::Value;

/// Type of a single parameter or field
#[derive(Debug, Clone, PartialEq)]
pub enum ParamType {
    /// JSON string
    String,
    /// JSON integer
    Integer,
    /// JSON number
    Number,
    /// JSON boolean
    Boolean,
    /// Homogeneous list
    Array(Box<ParamType>),
    /// String restricted to a fixed set of values
    Enum(Vec<String>),
    /// Value that may also be null
    Optional(Box<ParamType>),
    /// Structured record
    Object(ObjectType),
}

impl ParamType {
    /// List of `item`
    pub fn array(item: ParamType) -> Self {
        Self::Array(Box::new(item))
    }

    /// Nullable `inner`
    pub fn optional(inner: ParamType) -> Self {
        Self::Optional(Box::new(inner))
    }

    /// String enum over `values`
    pub fn enumeration<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Enum(values.into_iter().map(Into::into).collect())
    }

    /// Whether null is an accepted value
    pub fn is_nullable(&self) -> bool {
        matches!(self, Self::Optional(_))
    }
}

/// Named structured type with lazily built fields
///
/// Two `ObjectType`s are the same type when their names match.
#[derive(Debug, Clone, Copy)]
pub struct ObjectType {
    /// Type name, used only for recursion detection and error messages
    pub name: &'static str,
    /// Produces the field list
    pub build: fn() -> ObjectSpec,
}

impl PartialEq for ObjectType {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

/// Fields of a structured type
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ObjectSpec {
    /// Optional description of the record
    pub description: Option<String>,
    /// Fields in declaration order
    pub fields: Vec<ParamSpec>,
}

impl ObjectSpec {
    /// Empty record
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the record description
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Append a field
    pub fn field(mut self, field: ParamSpec) -> Self {
        self.fields.push(field);
        self
    }
}

/// How a parameter is passed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParamKind {
    /// Named parameter
    #[default]
    Regular,
    /// Catch-all positional or keyword list; not expressible as a schema
    Variadic,
}

/// One parameter (or one field of a nested record)
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    /// Parameter name
    pub name: String,
    /// Parameter type
    pub param_type: ParamType,
    /// Human-readable description
    pub description: Option<String>,
    /// Whether the caller must supply the value
    pub required: bool,
    /// Value used when the caller omits the parameter
    pub default: Option<Value>,
    /// Parameter kind
    pub kind: ParamKind,
}

impl ParamSpec {
    /// Parameter whose type is inferred from `T`
    ///
    /// `Option<T>` parameters are optional; everything else is required.
    pub fn new<T: SchemaType>(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::typed(name, T::param_type()).describe(description)
    }

    /// Parameter with an explicit type and no description
    pub fn typed(name: impl Into<String>, param_type: ParamType) -> Self {
        let required = !param_type.is_nullable();
        Self {
            name: name.into(),
            param_type,
            description: None,
            required,
            default: None,
            kind: ParamKind::Regular,
        }
    }

    /// Catch-all parameter, which the deriver rejects
    pub fn variadic(name: impl Into<String>) -> Self {
        let mut spec = Self::typed(name, ParamType::array(ParamType::String));
        spec.kind = ParamKind::Variadic;
        spec
    }

    /// Set the description
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set a default value, which makes the parameter optional
    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self.required = false;
        self
    }

    /// Mark the parameter optional without a default
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }
}

/// Everything the deriver needs to know about a tool
#[derive(Debug, Clone, PartialEq)]
pub struct ToolSpec {
    /// Unique tool name
    pub name: String,
    /// What the tool does; required
    pub description: Option<String>,
    /// Parameters in declaration order
    pub params: Vec<ParamSpec>,
}

impl ToolSpec {
    /// Spec with no description and no parameters
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            params: Vec::new(),
        }
    }

    /// Set the description
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Append a parameter
    pub fn param(mut self, param: ParamSpec) -> Self {
        self.params.push(param);
        self
    }
}

/// Rust types that map onto a parameter type
///
/// Implement this for your own records by returning
/// [`ParamType::Object`] with an [`ObjectType`].
pub trait SchemaType {
    /// Parameter type for `Self`
    fn param_type() -> ParamType;
}

macro_rules! impl_schema_type {
    ($variant:ident => $($ty:ty),+) => {
        $(
            impl SchemaType for $ty {
                fn param_type() -> ParamType {
                    ParamType::$variant
                }
            }
        )+
    };
}

impl_schema_type!(String => String, &str, char);
impl_schema_type!(Integer => i8, i16, i32, i64, u8, u16, u32, u64, isize, usize);
impl_schema_type!(Number => f32, f64);
impl_schema_type!(Boolean => bool);

impl<T: SchemaType> SchemaType for Vec<T> {
    fn param_type() -> ParamType {
        ParamType::array(T::param_type())
    }
}

impl<T: SchemaType> SchemaType for Option<T> {
    fn param_type() -> ParamType {
        ParamType::optional(T::param_type())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_inferred_types() {
        assert_eq!(<u32 as SchemaType>::param_type(), ParamType::Integer);
        assert_eq!(
            <Vec<Option<f64>> as SchemaType>::param_type(),
            ParamType::array(ParamType::optional(ParamType::Number))
        );
    }

    #[test]
    fn test_optional_params_are_not_required() {
        assert!(ParamSpec::new::<String>("q", "query").required);
        assert!(!ParamSpec::new::<Option<String>>("q", "query").required);
        let with_default = ParamSpec::new::<i64>("n", "count").with_default(json!(3));
        assert!(!with_default.required);
        assert_eq!(with_default.default, Some(json!(3)));
    }
}
