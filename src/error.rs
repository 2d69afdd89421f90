#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("an agent run is already in progress")]
    Busy,
    #[error("prompt is empty")]
    EmptyPrompt,
}

#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("API returned {status}: {body}")]
    ApiError { status: u16, body: String },
    #[error("failed to parse response: {0}")]
    Parse(String),
    #[error("model did not respond within {0:?}")]
    Timeout(std::time::Duration),
}

/// Why a tool call did not produce a normal result. Never fatal to the loop.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("invalid arguments: {0}")]
    Validation(#[from] ValidationError),
    #[error("unknown tool: {0}")]
    NotFound(String),
    #[error("{0}")]
    Execution(String),
    #[error("tool call budget exhausted")]
    BudgetExhausted,
}

impl ToolError {
    /// Short tag recorded alongside the error message in the tool result.
    pub fn kind(&self) -> &'static str {
        match self {
            ToolError::Validation(_) => "validation",
            ToolError::NotFound(_) => "not_found",
            ToolError::Execution(_) => "execution",
            ToolError::BudgetExhausted => "budget_exhausted",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("missing required argument `{0}`")]
    Missing(String),
    #[error("argument `{name}` must be a {expected}, got {found}")]
    WrongType {
        name: String,
        expected: &'static str,
        found: &'static str,
    },
    #[error("arguments must be an object, got {0}")]
    NotAnObject(&'static str),
}

#[derive(Debug, thiserror::Error)]
pub enum PreviewError {
    #[error("failed to write preview: {0}")]
    Io(#[from] std::io::Error),
}
