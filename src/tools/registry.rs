use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::debug;

use super::handler::{ToolDefinition, ToolHandler};
use crate::error::ToolError;

/// A registered tool: definition for the model, handler for execution.
#[derive(Clone)]
pub struct RegisteredTool {
    pub definition: Arc<ToolDefinition>,
    pub handler: Arc<dyn ToolHandler>,
}

/// Catalog of available tools, shared between the code that registers them
/// and the agent that dispatches to them.
///
/// Cloning is cheap and every clone sees the same entries. Names are unique:
/// registering an existing name replaces the entry in place, so the order
/// tools are advertised in stays stable across re-registration.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Arc<RwLock<Vec<RegisteredTool>>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<RegisteredTool>> {
        self.tools.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<RegisteredTool>> {
        self.tools.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a tool. Last writer wins; no error on overwrite.
    pub fn register(&self, definition: ToolDefinition, handler: impl ToolHandler + 'static) {
        self.register_arc(definition, Arc::new(handler));
    }

    pub fn register_arc(&self, definition: ToolDefinition, handler: Arc<dyn ToolHandler>) {
        let entry = RegisteredTool {
            definition: Arc::new(definition),
            handler,
        };
        let mut tools = self.write();
        match tools
            .iter_mut()
            .find(|t| t.definition.name == entry.definition.name)
        {
            Some(existing) => {
                debug!(tool = %entry.definition.name, "tool re-registered");
                *existing = entry;
            }
            None => {
                debug!(tool = %entry.definition.name, "tool registered");
                tools.push(entry);
            }
        }
    }

    /// Builder form of [`register`](Self::register).
    pub fn with(self, definition: ToolDefinition, handler: impl ToolHandler + 'static) -> Self {
        self.register(definition, handler);
        self
    }

    /// Remove a tool. Returns whether anything was removed.
    pub fn unregister(&self, name: &str) -> bool {
        let mut tools = self.write();
        let before = tools.len();
        tools.retain(|t| t.definition.name != name);
        let removed = tools.len() != before;
        if removed {
            debug!(tool = name, "tool unregistered");
        }
        removed
    }

    pub fn lookup(&self, name: &str) -> Result<RegisteredTool, ToolError> {
        self.read()
            .iter()
            .find(|t| t.definition.name == name)
            .cloned()
            .ok_or_else(|| ToolError::NotFound(name.to_string()))
    }

    /// Snapshot of the definitions currently advertised to the model.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.read()
            .iter()
            .map(|t| t.definition.as_ref().clone())
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.read().iter().any(|t| t.definition.name == name)
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.read()
            .iter()
            .map(|t| t.definition.name.clone())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }
}
