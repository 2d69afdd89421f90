use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use super::InferenceProvider;
use crate::context::Turn;
use crate::error::InferenceError;
use crate::tools::ToolDefinition;
use crate::types::{
    ContentBlock, InferenceRequest, InferenceResponse, StopReason, ToolCallRequest, Usage,
};

/// Ollama provider using the native `/api/chat` endpoint.
pub struct OllamaProvider {
    client: reqwest::Client,
    base_url: String,
}

impl OllamaProvider {
    /// Connect to a local Ollama instance at the default address.
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: "http://localhost:11434".into(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    /// Ollama uses the same tool shape as OpenAI function-calling.
    fn convert_tools(tools: &[ToolDefinition]) -> Vec<Value> {
        tools
            .iter()
            .map(|tool| {
                json!({
                    "type": "function",
                    "function": {
                        "name": tool.name,
                        "description": tool.description,
                        "parameters": tool.input_schema(),
                    }
                })
            })
            .collect()
    }

    fn convert_turns(system: Option<&str>, turns: &[Turn]) -> Vec<Value> {
        let mut out = Vec::new();

        if let Some(sys) = system {
            out.push(json!({ "role": "system", "content": sys }));
        }

        for turn in turns {
            match turn {
                Turn::User { content } => {
                    out.push(json!({ "role": "user", "content": content }));
                }
                Turn::Assistant {
                    content,
                    tool_calls,
                } => {
                    let mut msg = json!({ "role": "assistant", "content": content });
                    if !tool_calls.is_empty() {
                        msg["tool_calls"] = tool_calls
                            .iter()
                            .map(|c| {
                                json!({
                                    "function": {
                                        "name": c.name,
                                        "arguments": c.arguments,
                                    }
                                })
                            })
                            .collect();
                    }
                    out.push(msg);
                }
                Turn::Tool { name, content, .. } => {
                    out.push(json!({
                        "role": "tool",
                        "tool_name": name,
                        "content": content.to_json().to_string(),
                    }));
                }
            }
        }

        out
    }

    fn parse_response(parsed: &Value) -> InferenceResponse {
        let message = &parsed["message"];
        let mut content = Vec::new();

        if let Some(text) = message["content"].as_str() {
            if !text.is_empty() {
                content.push(ContentBlock::Text(text.to_string()));
            }
        }

        let mut has_tool_calls = false;
        if let Some(tool_calls) = message["tool_calls"].as_array() {
            for (i, tc) in tool_calls.iter().enumerate() {
                let name = tc["function"]["name"].as_str().unwrap_or("").to_string();
                let arguments = tc["function"]["arguments"].clone();
                // Ollama does not return tool call IDs, so generate one
                let id = format!("ollama_{i}_{name}");
                content.push(ContentBlock::ToolUse(ToolCallRequest {
                    id,
                    name,
                    arguments,
                }));
                has_tool_calls = true;
            }
        }

        let stop_reason = if has_tool_calls {
            StopReason::ToolUse
        } else if parsed["done_reason"].as_str() == Some("length") {
            StopReason::MaxTokens
        } else {
            StopReason::EndTurn
        };

        let usage = Usage {
            input_tokens: parsed["prompt_eval_count"].as_u64().unwrap_or(0) as u32,
            output_tokens: parsed["eval_count"].as_u64().unwrap_or(0) as u32,
        };

        InferenceResponse {
            stop_reason,
            content,
            usage,
        }
    }
}

impl Default for OllamaProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InferenceProvider for OllamaProvider {
    async fn infer(&self, request: InferenceRequest) -> Result<InferenceResponse, InferenceError> {
        let messages = Self::convert_turns(request.system.as_deref(), &request.turns);

        let mut body = json!({
            "model": request.model,
            "messages": messages,
            "stream": false,
            "options": {
                "num_predict": request.max_tokens,
                "temperature": request.temperature,
            },
        });

        if !request.tools.is_empty() {
            body["tools"] = Value::Array(Self::convert_tools(&request.tools));
        }

        debug!(
            model = %request.model,
            messages = body["messages"].as_array().map(|a| a.len()).unwrap_or(0),
            tools = request.tools.len(),
            "ollama inference request"
        );

        let resp = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| InferenceError::Request(e.to_string()))?;

        let status = resp.status().as_u16();
        let text = resp
            .text()
            .await
            .map_err(|e| InferenceError::Request(e.to_string()))?;

        if status != 200 {
            return Err(InferenceError::ApiError { status, body: text });
        }

        let parsed: Value =
            serde_json::from_str(&text).map_err(|e| InferenceError::Parse(e.to_string()))?;

        Ok(Self::parse_response(&parsed))
    }
}
