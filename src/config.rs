use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::tools::builtin::CODE_ASSISTANT_PROMPT;

/// Per-run generation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub model: String,
    pub system_prompt: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Upper bound on tool handler invocations in one run.
    pub max_tool_calls: usize,
    /// When false, tool calls are handed back to the caller instead of run.
    pub auto_execute: bool,
    /// Per-call limit for tool handlers, in milliseconds. `None` waits indefinitely.
    pub tool_timeout_ms: Option<u64>,
    /// Limit for each model call, in milliseconds. `None` waits indefinitely.
    pub model_timeout_ms: Option<u64>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: "llama3.2".into(),
            system_prompt: None,
            max_tokens: 1024,
            temperature: 0.7,
            max_tool_calls: 5,
            auto_execute: true,
            tool_timeout_ms: Some(30_000),
            model_timeout_ms: None,
        }
    }
}

impl GenerationConfig {
    /// Preset for the code assistant: short answers, low temperature,
    /// at most three tool calls per request.
    pub fn code_assistant(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            system_prompt: Some(CODE_ASSISTANT_PROMPT.into()),
            max_tokens: 500,
            temperature: 0.4,
            max_tool_calls: 3,
            auto_execute: true,
            ..Self::default()
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_max_tool_calls(mut self, n: usize) -> Self {
        self.max_tool_calls = n;
        self
    }

    pub fn with_auto_execute(mut self, auto: bool) -> Self {
        self.auto_execute = auto;
        self
    }

    pub fn with_tool_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.tool_timeout_ms = timeout.map(duration_ms);
        self
    }

    pub fn with_model_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.model_timeout_ms = timeout.map(duration_ms);
        self
    }

    pub fn tool_timeout(&self) -> Option<Duration> {
        self.tool_timeout_ms.map(Duration::from_millis)
    }

    pub fn model_timeout(&self) -> Option<Duration> {
        self.model_timeout_ms.map(Duration::from_millis)
    }
}

/// Whole milliseconds, at least one so a tiny limit never means "no limit".
fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX).max(1)
}
