use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ToolError;

/// A single field in a tool result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolValue {
    Boolean(bool),
    Number(f64),
    String(String),
}

impl ToolValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ToolValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ToolValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ToolValue::Number(n) => Some(*n),
            _ => None,
        }
    }
}

impl From<bool> for ToolValue {
    fn from(v: bool) -> Self {
        ToolValue::Boolean(v)
    }
}

impl From<f64> for ToolValue {
    fn from(v: f64) -> Self {
        ToolValue::Number(v)
    }
}

impl From<i64> for ToolValue {
    fn from(v: i64) -> Self {
        ToolValue::Number(v as f64)
    }
}

impl From<String> for ToolValue {
    fn from(v: String) -> Self {
        ToolValue::String(v)
    }
}

impl From<&str> for ToolValue {
    fn from(v: &str) -> Self {
        ToolValue::String(v.to_string())
    }
}

/// Structured output of a tool, returned to the model as a JSON object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ToolResult {
    fields: BTreeMap<String, ToolValue>,
}

impl ToolResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<ToolValue>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// The result recorded when a call fails before or during execution.
    pub fn failure(error: &ToolError) -> Self {
        Self::new()
            .with("success", false)
            .with("error", error.to_string())
            .with("error_kind", error.kind())
    }

    pub fn get(&self, key: &str) -> Option<&ToolValue> {
        self.fields.get(key)
    }

    /// A result is an error if it carries `success: false`.
    pub fn is_error(&self) -> bool {
        self.get("success").and_then(ToolValue::as_bool) == Some(false)
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(&self.fields).unwrap_or(Value::Null)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
