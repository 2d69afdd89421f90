use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::GenerationConfig;
use crate::tools::{ToolDefinition, ToolResult};
use crate::types::{InferenceRequest, InferenceResponse, ToolCallRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    Tool,
}

/// One entry in the conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Turn {
    User {
        content: String,
    },
    Assistant {
        content: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCallRequest>,
    },
    Tool {
        call_id: String,
        name: String,
        content: ToolResult,
    },
}

impl Turn {
    pub fn role(&self) -> Role {
        match self {
            Turn::User { .. } => Role::User,
            Turn::Assistant { .. } => Role::Assistant,
            Turn::Tool { .. } => Role::Tool,
        }
    }
}

/// Everything the model sees during one agent run. Append-only.
///
/// Tool turns are only accepted for calls the latest assistant turn made,
/// so results always sit between their call and the next model request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationContext {
    system: Option<String>,
    turns: Vec<Turn>,
}

impl ConversationContext {
    pub fn new(system: Option<String>) -> Self {
        Self {
            system,
            turns: Vec::new(),
        }
    }

    pub fn system(&self) -> Option<&str> {
        self.system.as_deref()
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn add_prompt(&mut self, prompt: &str) {
        self.turns.push(Turn::User {
            content: prompt.to_string(),
        });
    }

    /// Record what the model said, including any calls it asked for.
    pub fn record_response(&mut self, response: &InferenceResponse) {
        self.turns.push(Turn::Assistant {
            content: response.text(),
            tool_calls: response.tool_calls(),
        });
    }

    /// Record only the text of a response, dropping its calls. Used when the
    /// calls will never run, so no unanswered call is left in the history.
    pub fn record_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        self.turns.push(Turn::Assistant {
            content: text.to_string(),
            tool_calls: Vec::new(),
        });
    }

    /// Record a tool result. Returns false (and records nothing) if the call
    /// is not an unanswered call from the latest assistant turn.
    pub fn record_tool_result(&mut self, call: &ToolCallRequest, result: ToolResult) -> bool {
        if !self.unanswered_calls().iter().any(|c| c.id == call.id) {
            debug!(call_id = %call.id, tool = %call.name, "dropping out-of-order tool result");
            return false;
        }
        self.turns.push(Turn::Tool {
            call_id: call.id.clone(),
            name: call.name.clone(),
            content: result,
        });
        true
    }

    /// Calls in the latest assistant turn that have no result yet.
    pub fn unanswered_calls(&self) -> Vec<ToolCallRequest> {
        let Some(pos) = self
            .turns
            .iter()
            .rposition(|t| matches!(t, Turn::Assistant { .. }))
        else {
            return Vec::new();
        };
        let Turn::Assistant { tool_calls, .. } = &self.turns[pos] else {
            return Vec::new();
        };

        let answered: HashSet<&str> = self.turns[pos + 1..]
            .iter()
            .filter_map(|t| match t {
                Turn::Tool { call_id, .. } => Some(call_id.as_str()),
                _ => None,
            })
            .collect();

        tool_calls
            .iter()
            .filter(|c| !answered.contains(c.id.as_str()))
            .cloned()
            .collect()
    }

    /// Results recorded for a given tool, oldest first.
    pub fn tool_results(&self, name: &str) -> Vec<&ToolResult> {
        self.turns
            .iter()
            .filter_map(|t| match t {
                Turn::Tool {
                    name: n, content, ..
                } if n == name => Some(content),
                _ => None,
            })
            .collect()
    }

    /// Build the request for the next model call.
    pub fn build_request(
        &self,
        config: &GenerationConfig,
        tools: Vec<ToolDefinition>,
    ) -> InferenceRequest {
        InferenceRequest {
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            system: self.system.clone(),
            tools,
            turns: self.turns.clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}
