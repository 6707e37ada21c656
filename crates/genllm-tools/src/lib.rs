//! Tool definitions, schema derivation and the tool registry for genllm
//!
//! Tools are declared with a static descriptor ([`schema::ToolSpec`]) or a
//! [`Tool`] implementation. The registry derives a self-contained JSON schema
//! and an argument validator for each one and keeps them in registration
//! order. The call protocol types in [`call`] are what vendor sessions and
//! the execution loop exchange.

pub mod call;
pub mod deriver;
pub mod error;
pub mod registry;
pub mod schema;
pub mod tool;
pub mod validator;

/// Decoded tool arguments
pub type Arguments = serde_json::Map<String, serde_json::Value>;

pub use call::{FailureKind, RawArguments, ToolCallRequest, ToolCallResult, ToolOutcome};
pub use error::{Result, ToolError};
pub use registry::{ToolBuilder, ToolRegistry};
pub use schema::{ObjectSpec, ObjectType, ParamSpec, ParamType, SchemaType, ToolSpec};
pub use tool::{Tool, ToolDefinition, ToolHandler};
pub use validator::ArgumentValidator;
