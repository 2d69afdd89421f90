use serde_json::Value;

use crate::LoopState;

/// Events emitted during agent execution, for UI streaming.
#[derive(Debug, Clone)]
pub enum AgentEvent {
    RoundStart { round: usize },
    StateChanged { state: LoopState },
    Text { content: String },
    ToolCall { name: String, input: Value },
    ToolResult { name: String, output: Value, is_error: bool },
    BudgetExhausted { requested: usize },
    Suspended { pending: usize },
    Finished { rounds: usize, tool_calls: usize },
    Failed { message: String },
}
