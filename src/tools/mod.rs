pub mod builtin;
pub mod handler;
pub mod pipeline;
pub mod registry;
pub mod result;
pub mod validate;

pub use handler::{ArgMap, ParamSpec, ParamType, ToolDefinition, ToolHandler};
pub use pipeline::ToolPipeline;
pub use registry::{RegisteredTool, ToolRegistry};
pub use result::{ToolResult, ToolValue};
pub use validate::validate_args;
