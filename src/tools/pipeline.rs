use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};

use super::registry::ToolRegistry;
use super::result::ToolResult;
use super::validate::validate_args;
use crate::error::ToolError;

/// Executes a single tool call: validate, look up, run under a timeout.
///
/// Every failure mode (bad arguments, unknown tool, handler error, panic,
/// timeout) comes back as `Err(ToolError)`; nothing here can abort the loop.
pub struct ToolPipeline {
    registry: ToolRegistry,
    timeout: Option<Duration>,
}

impl ToolPipeline {
    pub fn new(registry: ToolRegistry) -> Self {
        Self {
            registry,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run a call and fold any error into a failed [`ToolResult`].
    pub async fn dispatch(&self, name: &str, input: &Value) -> ToolResult {
        match self.execute(name, input).await {
            Ok(result) => result,
            Err(e) => {
                warn!(tool = name, kind = e.kind(), error = %e, "tool call failed");
                ToolResult::failure(&e)
            }
        }
    }

    /// Execute a tool by name.
    pub async fn execute(&self, name: &str, input: &Value) -> Result<ToolResult, ToolError> {
        let tool = self.registry.lookup(name)?;
        let args = validate_args(&tool.definition, input)?;

        debug!(tool = name, "dispatching tool call");

        // Spawned so a panicking handler surfaces as a JoinError instead of
        // unwinding through the loop. Awaited immediately: calls stay sequential.
        let handler = tool.handler.clone();
        let mut task = tokio::spawn(async move { handler.execute(&args).await });

        let joined = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, &mut task).await {
                Ok(joined) => joined,
                Err(_) => {
                    task.abort();
                    return Err(ToolError::Execution(format!(
                        "tool `{name}` timed out after {limit:?}"
                    )));
                }
            },
            None => task.await,
        };

        match joined {
            Ok(result) => result,
            Err(e) if e.is_panic() => Err(ToolError::Execution(format!(
                "tool `{name}` panicked"
            ))),
            Err(e) => Err(ToolError::Execution(e.to_string())),
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }
}
