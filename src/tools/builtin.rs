//! The code-assistant tool set: run JavaScript, replace the preview, read
//! the current document.

use std::sync::Arc;

use async_trait::async_trait;

use super::handler::{ArgMap, ParamSpec, ParamType, ToolDefinition, ToolHandler};
use super::registry::ToolRegistry;
use super::result::ToolResult;
use crate::error::ToolError;
use crate::sandbox::{PreviewRenderer, SandboxedExecutor};

pub const EXECUTE_CODE: &str = "execute_code";
pub const UPDATE_PREVIEW: &str = "update_preview";
pub const GET_CURRENT_CODE: &str = "get_current_code";

/// System prompt for a session with the code tools registered.
pub const CODE_ASSISTANT_PROMPT: &str = "\
You are an expert coding assistant. You help users write, debug, and improve code.
You have access to tools to execute JavaScript, update the live preview, and get the current code.
When users ask you to create or modify web pages, use the update_preview tool.
When users ask you to calculate or test JavaScript, use the execute_code tool.
Be concise but helpful. Show code examples when relevant.";

fn string_arg<'a>(args: &'a ArgMap, name: &str) -> &'a str {
    args.get(name).and_then(|v| v.as_str()).unwrap_or_default()
}

/// Evaluates JavaScript in the sandbox.
pub struct ExecuteCode {
    executor: SandboxedExecutor,
}

impl ExecuteCode {
    pub fn new(executor: SandboxedExecutor) -> Self {
        Self { executor }
    }

    pub fn definition() -> ToolDefinition {
        ToolDefinition::new(EXECUTE_CODE, "Execute JavaScript code and return the result").param(
            ParamSpec::required("code", ParamType::String, "JavaScript code to execute"),
        )
    }
}

#[async_trait]
impl ToolHandler for ExecuteCode {
    async fn execute(&self, args: &ArgMap) -> Result<ToolResult, ToolError> {
        let outcome = self.executor.execute(string_arg(args, "code")).await;
        Ok(ToolResult::new()
            .with("success", outcome.success)
            .with("result", outcome.result)
            .with("error", outcome.error))
    }
}

/// Replaces the live preview with a complete document.
pub struct UpdatePreview {
    renderer: Arc<PreviewRenderer>,
}

impl UpdatePreview {
    pub fn new(renderer: Arc<PreviewRenderer>) -> Self {
        Self { renderer }
    }

    pub fn definition() -> ToolDefinition {
        ToolDefinition::new(
            UPDATE_PREVIEW,
            "Update the live HTML/CSS/JS preview with new code",
        )
        .param(ParamSpec::required(
            "html",
            ParamType::String,
            "Complete HTML code with CSS and JS",
        ))
    }
}

#[async_trait]
impl ToolHandler for UpdatePreview {
    async fn execute(&self, args: &ArgMap) -> Result<ToolResult, ToolError> {
        self.renderer
            .render(string_arg(args, "html"))
            .await
            .map_err(|e| ToolError::Execution(e.to_string()))?;
        Ok(ToolResult::new()
            .with("success", true)
            .with("message", "Preview updated successfully"))
    }
}

/// Returns the document currently in the workspace.
pub struct GetCurrentCode {
    renderer: Arc<PreviewRenderer>,
}

impl GetCurrentCode {
    pub fn new(renderer: Arc<PreviewRenderer>) -> Self {
        Self { renderer }
    }

    pub fn definition() -> ToolDefinition {
        ToolDefinition::new(GET_CURRENT_CODE, "Get the current code in the editor")
    }
}

#[async_trait]
impl ToolHandler for GetCurrentCode {
    async fn execute(&self, _args: &ArgMap) -> Result<ToolResult, ToolError> {
        Ok(ToolResult::new().with("code", self.renderer.workspace().current_code()))
    }
}

/// Register all three code tools against one renderer. Re-registering
/// replaces the previous handlers.
pub fn register_code_tools(
    registry: &ToolRegistry,
    executor: SandboxedExecutor,
    renderer: Arc<PreviewRenderer>,
) {
    registry.register(ExecuteCode::definition(), ExecuteCode::new(executor));
    registry.register(
        UpdatePreview::definition(),
        UpdatePreview::new(renderer.clone()),
    );
    registry.register(GetCurrentCode::definition(), GetCurrentCode::new(renderer));
}

/// Remove the code tools, e.g. when the editor goes away.
pub fn unregister_code_tools(registry: &ToolRegistry) {
    for name in [EXECUTE_CODE, UPDATE_PREVIEW, GET_CURRENT_CODE] {
        registry.unregister(name);
    }
}
