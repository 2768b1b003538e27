pub mod delegation;
pub mod executor;
pub mod registry;
pub mod schema;

pub use delegation::{is_clarification, DelegationTool};
pub use executor::ToolExecutor;
pub use registry::{Tool, ToolEntry, ToolKind, ToolOutput, Toolset, MAX_TOOLS};
pub use schema::{tool_call_schema_json, ParamSpec, ParamType, ToolArgs, ToolSpec};
