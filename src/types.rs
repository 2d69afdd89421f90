use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::Turn;
use crate::tools::ToolDefinition;

/// Fully-formed request. The provider just sends it.
#[derive(Debug, Clone)]
pub struct InferenceRequest {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub system: Option<String>,
    /// Empty when tools are withheld for a text-only completion.
    pub tools: Vec<ToolDefinition>,
    pub turns: Vec<Turn>,
}

/// What came back from the model.
#[derive(Debug, Clone)]
pub struct InferenceResponse {
    pub stop_reason: StopReason,
    pub content: Vec<ContentBlock>,
    pub usage: Usage,
}

impl InferenceResponse {
    /// All text blocks joined by newlines.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::Text(t) => Some(t.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Tool call requests, in the order the model emitted them.
    pub fn tool_calls(&self) -> Vec<ToolCallRequest> {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::ToolUse(call) => Some(call.clone()),
                _ => None,
            })
            .collect()
    }

    /// Rename repeated or empty call ids so each call in this response can
    /// be paired with exactly one result. Returns how many ids changed.
    pub fn make_call_ids_unique(&mut self) -> usize {
        let mut seen = HashSet::new();
        let mut renamed = 0;
        for block in &mut self.content {
            let ContentBlock::ToolUse(call) = block else {
                continue;
            };
            if !call.id.is_empty() && seen.insert(call.id.clone()) {
                continue;
            }
            let base = if call.id.is_empty() {
                format!("call_{}", call.name)
            } else {
                call.id.clone()
            };
            let mut n = 1;
            while seen.contains(&format!("{base}_{n}")) {
                n += 1;
            }
            call.id = format!("{base}_{n}");
            seen.insert(call.id.clone());
            renamed += 1;
        }
        renamed
    }
}

/// Why the model stopped generating.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    EndTurn,
    ToolUse,
    MaxTokens,
}

/// A content block in the model's response.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentBlock {
    Text(String),
    ToolUse(ToolCallRequest),
}

/// A model's request to run one tool. Arguments are raw until validated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

impl ToolCallRequest {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// Token usage for a single inference call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl Usage {
    pub fn accumulate(&mut self, other: &Usage) {
        self.input_tokens = self.input_tokens.saturating_add(other.input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(other.output_tokens);
    }
}
