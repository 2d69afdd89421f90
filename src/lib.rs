pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod inference;
pub mod sandbox;
pub mod tools;
pub mod types;
pub mod workspace;

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub use config::GenerationConfig;
pub use context::{ConversationContext, Role, Turn};
pub use error::{AgentError, InferenceError, PreviewError, ToolError, ValidationError};
pub use events::AgentEvent;
pub use inference::{InferenceProvider, OllamaProvider, OpenAiProvider};
pub use sandbox::{
    ExecutionOutcome, FileSink, NullSink, PreviewRenderer, PreviewSink, SandboxedExecutor,
};
pub use tools::builtin::{register_code_tools, unregister_code_tools, CODE_ASSISTANT_PROMPT};
pub use tools::{
    ArgMap, ParamSpec, ParamType, ToolDefinition, ToolHandler, ToolPipeline, ToolRegistry,
    ToolResult, ToolValue,
};
pub use types::{
    ContentBlock, InferenceRequest, InferenceResponse, StopReason, ToolCallRequest, Usage,
};
pub use workspace::{CodeTemplate, CodeWorkspace};

/// Where a run is in its generate → execute cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    AwaitingModel,
    ExecutingTools,
    Done,
    Suspended,
    Failed,
}

/// A run that ended with a final answer.
#[derive(Debug)]
pub struct AgentResult {
    pub text: String,
    pub rounds: usize,
    /// Tool handlers actually dispatched, including ones that failed.
    pub tool_calls: usize,
    pub usage: Usage,
    pub context: ConversationContext,
}

/// A run stopped because the model asked for tools and `auto_execute` is off.
/// The pending calls are recorded in `context` without results.
#[derive(Debug)]
pub struct SuspendedRun {
    pub pending: Vec<ToolCallRequest>,
    pub remaining_budget: usize,
    pub rounds: usize,
    pub tool_calls: usize,
    pub usage: Usage,
    pub context: ConversationContext,
}

/// A run ended by a model-runtime failure.
#[derive(Debug)]
pub struct LoopFailure {
    /// Human-readable notice for the caller to show.
    pub message: String,
    pub error: InferenceError,
    pub rounds: usize,
    pub tool_calls: usize,
    pub usage: Usage,
}

/// How a run ended.
#[derive(Debug)]
pub enum AgentOutcome {
    Done(AgentResult),
    Suspended(SuspendedRun),
    Failed(LoopFailure),
}

impl AgentOutcome {
    pub fn state(&self) -> LoopState {
        match self {
            AgentOutcome::Done(_) => LoopState::Done,
            AgentOutcome::Suspended(_) => LoopState::Suspended,
            AgentOutcome::Failed(_) => LoopState::Failed,
        }
    }

    /// Final answer, if the run completed.
    pub fn text(&self) -> Option<&str> {
        match self {
            AgentOutcome::Done(r) => Some(&r.text),
            _ => None,
        }
    }

    /// Number of tool handlers dispatched during the run.
    pub fn tool_calls(&self) -> usize {
        match self {
            AgentOutcome::Done(r) => r.tool_calls,
            AgentOutcome::Suspended(s) => s.tool_calls,
            AgentOutcome::Failed(f) => f.tool_calls,
        }
    }
}

/// Clears the in-flight flag when a run ends, however it ends.
struct RunGuard<'a>(&'a AtomicBool);

impl<'a> RunGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self, AgentError> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| AgentError::Busy)?;
        Ok(Self(flag))
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Current loop state plus the optional event channel.
struct Tracker<'a> {
    state: LoopState,
    tx: Option<&'a mpsc::Sender<AgentEvent>>,
}

impl Tracker<'_> {
    async fn emit(&self, event: AgentEvent) {
        if let Some(tx) = self.tx {
            let _ = tx.send(event).await;
        }
    }

    async fn enter(&mut self, next: LoopState) {
        if self.state == next {
            return;
        }
        debug!(from = ?self.state, to = ?next, "loop state");
        self.state = next;
        self.emit(AgentEvent::StateChanged { state: next }).await;
    }
}

/// The agent. Wire up a provider, a tool registry, and go.
///
/// One run at a time: a second `invoke` while one is in flight returns
/// [`AgentError::Busy`]. The registry may be changed between or during runs;
/// each model call advertises whatever is registered at that moment.
pub struct Agent {
    provider: Box<dyn InferenceProvider>,
    registry: ToolRegistry,
    config: GenerationConfig,
    running: AtomicBool,
}

impl Agent {
    pub fn new(
        provider: impl InferenceProvider + 'static,
        registry: ToolRegistry,
        config: GenerationConfig,
    ) -> Self {
        Self {
            provider: Box::new(provider),
            registry,
            config,
            running: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Simple invocation. Runs until the model answers, suspends, or fails.
    pub async fn invoke(&self, prompt: &str) -> Result<AgentOutcome, AgentError> {
        self.start(prompt, None).await
    }

    /// Invocation with streaming events.
    pub async fn invoke_streaming(
        &self,
        prompt: &str,
        tx: mpsc::Sender<AgentEvent>,
    ) -> Result<AgentOutcome, AgentError> {
        self.start(prompt, Some(&tx)).await
    }

    async fn start(
        &self,
        prompt: &str,
        tx: Option<&mpsc::Sender<AgentEvent>>,
    ) -> Result<AgentOutcome, AgentError> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(AgentError::EmptyPrompt);
        }
        let _guard = RunGuard::acquire(&self.running)?;
        Ok(self.run_loop(prompt, tx).await)
    }

    async fn call_model(
        &self,
        request: InferenceRequest,
    ) -> Result<InferenceResponse, InferenceError> {
        match self.config.model_timeout() {
            Some(limit) => tokio::time::timeout(limit, self.provider.infer(request))
                .await
                .map_err(|_| InferenceError::Timeout(limit))?,
            None => self.provider.infer(request).await,
        }
    }

    async fn run_loop(
        &self,
        prompt: &str,
        tx: Option<&mpsc::Sender<AgentEvent>>,
    ) -> AgentOutcome {
        let pipeline =
            ToolPipeline::new(self.registry.clone()).with_timeout(self.config.tool_timeout());
        let mut tracker = Tracker {
            state: LoopState::AwaitingModel,
            tx,
        };
        let mut context = ConversationContext::new(self.config.system_prompt.clone());
        context.add_prompt(prompt);

        let mut remaining = self.config.max_tool_calls;
        let mut executed = 0usize;
        let mut usage = Usage::default();
        let mut round = 0usize;

        loop {
            tracker.emit(AgentEvent::RoundStart { round }).await;
            info!(round, remaining, "agent round");

            let request = context.build_request(&self.config, self.registry.definitions());
            let mut response = match self.call_model(request).await {
                Ok(response) => response,
                Err(e) => return fail(&mut tracker, e, round + 1, executed, usage).await,
            };
            usage.accumulate(&response.usage);

            let renamed = response.make_call_ids_unique();
            if renamed > 0 {
                warn!(renamed, "model repeated tool call ids, renamed duplicates");
            }

            let text = response.text();
            if !text.is_empty() {
                tracker
                    .emit(AgentEvent::Text {
                        content: text.clone(),
                    })
                    .await;
            }

            let calls = response.tool_calls();
            if calls.is_empty() {
                context.record_response(&response);
                return finish(&mut tracker, text, round + 1, executed, usage, context).await;
            }

            if remaining == 0 {
                warn!(
                    requested = calls.len(),
                    max_tool_calls = self.config.max_tool_calls,
                    "tool call budget exhausted, requesting final answer"
                );
                tracker
                    .emit(AgentEvent::BudgetExhausted {
                        requested: calls.len(),
                    })
                    .await;

                // The calls never run, so keep only the text.
                context.record_text(&text);
                let request = context.build_request(&self.config, Vec::new());
                let response = match self.call_model(request).await {
                    Ok(response) => response,
                    Err(e) => return fail(&mut tracker, e, round + 1, executed, usage).await,
                };
                usage.accumulate(&response.usage);

                let text = response.text();
                if !text.is_empty() {
                    tracker
                        .emit(AgentEvent::Text {
                            content: text.clone(),
                        })
                        .await;
                }
                context.record_text(&text);
                return finish(&mut tracker, text, round + 1, executed, usage, context).await;
            }

            context.record_response(&response);

            if !self.config.auto_execute {
                info!(pending = calls.len(), "auto-execute off, suspending");
                tracker.enter(LoopState::Suspended).await;
                tracker
                    .emit(AgentEvent::Suspended {
                        pending: calls.len(),
                    })
                    .await;
                return AgentOutcome::Suspended(SuspendedRun {
                    pending: calls,
                    remaining_budget: remaining,
                    rounds: round + 1,
                    tool_calls: executed,
                    usage,
                    context,
                });
            }

            tracker.enter(LoopState::ExecutingTools).await;
            for call in &calls {
                let result = if remaining == 0 {
                    debug!(tool = %call.name, "skipping call beyond budget");
                    ToolResult::failure(&ToolError::BudgetExhausted)
                } else {
                    tracker
                        .emit(AgentEvent::ToolCall {
                            name: call.name.clone(),
                            input: call.arguments.clone(),
                        })
                        .await;
                    remaining -= 1;
                    executed += 1;
                    pipeline.dispatch(&call.name, &call.arguments).await
                };

                tracker
                    .emit(AgentEvent::ToolResult {
                        name: call.name.clone(),
                        output: result.to_json(),
                        is_error: result.is_error(),
                    })
                    .await;
                if !context.record_tool_result(call, result) {
                    warn!(tool = %call.name, call_id = %call.id, "tool result had no matching call");
                }
            }

            tracker.enter(LoopState::AwaitingModel).await;
            round += 1;
        }
    }
}

async fn finish(
    tracker: &mut Tracker<'_>,
    text: String,
    rounds: usize,
    tool_calls: usize,
    usage: Usage,
    context: ConversationContext,
) -> AgentOutcome {
    tracker.enter(LoopState::Done).await;
    tracker
        .emit(AgentEvent::Finished { rounds, tool_calls })
        .await;
    info!(rounds, tool_calls, "agent finished");
    AgentOutcome::Done(AgentResult {
        text,
        rounds,
        tool_calls,
        usage,
        context,
    })
}

async fn fail(
    tracker: &mut Tracker<'_>,
    error: InferenceError,
    rounds: usize,
    tool_calls: usize,
    usage: Usage,
) -> AgentOutcome {
    let message = format!("Failed to generate response: {error}");
    warn!(rounds, error = %error, "model call failed, ending run");
    tracker.enter(LoopState::Failed).await;
    tracker
        .emit(AgentEvent::Failed {
            message: message.clone(),
        })
        .await;
    AgentOutcome::Failed(LoopFailure {
        message,
        error,
        rounds,
        tool_calls,
        usage,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::{Mutex, Notify};

    // --- Mock Provider ---

    #[derive(Default)]
    struct MockState {
        responses: Mutex<VecDeque<Result<InferenceResponse, InferenceError>>>,
        requests: Mutex<Vec<InferenceRequest>>,
    }

    #[derive(Clone, Default)]
    struct MockProvider {
        state: Arc<MockState>,
    }

    impl MockProvider {
        fn new(responses: Vec<InferenceResponse>) -> Self {
            Self::scripted(responses.into_iter().map(Ok).collect())
        }

        fn scripted(responses: Vec<Result<InferenceResponse, InferenceError>>) -> Self {
            Self {
                state: Arc::new(MockState {
                    responses: Mutex::new(responses.into()),
                    requests: Mutex::new(Vec::new()),
                }),
            }
        }

        async fn requests(&self) -> Vec<InferenceRequest> {
            self.state.requests.lock().await.clone()
        }
    }

    #[async_trait]
    impl InferenceProvider for MockProvider {
        async fn infer(
            &self,
            request: InferenceRequest,
        ) -> Result<InferenceResponse, InferenceError> {
            self.state.requests.lock().await.push(request);
            self.state
                .responses
                .lock()
                .await
                .pop_front()
                .unwrap_or(Err(InferenceError::Request(
                    "no more mock responses".into(),
                )))
        }
    }

    /// Blocks every call until released.
    struct GatedProvider {
        gate: Arc<Notify>,
    }

    #[async_trait]
    impl InferenceProvider for GatedProvider {
        async fn infer(
            &self,
            _request: InferenceRequest,
        ) -> Result<InferenceResponse, InferenceError> {
            self.gate.notified().await;
            Ok(text_response("released"))
        }
    }

    // --- Tools ---

    struct CountingTool {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ToolHandler for CountingTool {
        async fn execute(&self, _args: &ArgMap) -> Result<ToolResult, ToolError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(ToolResult::new().with("count", n as i64))
        }
    }

    struct Tagged(&'static str);

    #[async_trait]
    impl ToolHandler for Tagged {
        async fn execute(&self, _args: &ArgMap) -> Result<ToolResult, ToolError> {
            Ok(ToolResult::new().with("handler", self.0))
        }
    }

    struct FailingTool;

    #[async_trait]
    impl ToolHandler for FailingTool {
        async fn execute(&self, _args: &ArgMap) -> Result<ToolResult, ToolError> {
            Err(ToolError::Execution("disk on fire".into()))
        }
    }

    // --- Helpers ---

    fn text_response(text: &str) -> InferenceResponse {
        InferenceResponse {
            stop_reason: StopReason::EndTurn,
            content: vec![ContentBlock::Text(text.into())],
            usage: Usage {
                input_tokens: 10,
                output_tokens: 5,
            },
        }
    }

    fn calls_response(calls: &[(&str, serde_json::Value)]) -> InferenceResponse {
        InferenceResponse {
            stop_reason: StopReason::ToolUse,
            content: calls
                .iter()
                .enumerate()
                .map(|(i, (name, args))| {
                    ContentBlock::ToolUse(ToolCallRequest::new(
                        format!("call_{i}"),
                        *name,
                        args.clone(),
                    ))
                })
                .collect(),
            usage: Usage {
                input_tokens: 20,
                output_tokens: 8,
            },
        }
    }

    fn counter_registry() -> (ToolRegistry, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let registry = ToolRegistry::new().with(
            ToolDefinition::new("count", "Increment a counter"),
            CountingTool {
                calls: calls.clone(),
            },
        );
        (registry, calls)
    }

    fn config(max_tool_calls: usize) -> GenerationConfig {
        GenerationConfig {
            model: "test-model".into(),
            system_prompt: Some("You are a test.".into()),
            max_tool_calls,
            ..GenerationConfig::default()
        }
    }

    fn expect_done(outcome: AgentOutcome) -> AgentResult {
        match outcome {
            AgentOutcome::Done(result) => result,
            other => panic!("expected Done, got {other:?}"),
        }
    }

    fn last_tool_result<'a>(ctx: &'a ConversationContext, name: &str) -> &'a ToolResult {
        ctx.tool_results(name)
            .last()
            .copied()
            .unwrap_or_else(|| panic!("no result for {name}"))
    }

    // --- Tests ---

    #[tokio::test]
    async fn plain_text_finishes_immediately() {
        let provider = MockProvider::new(vec![text_response("Hello!")]);
        let (registry, calls) = counter_registry();
        let agent = Agent::new(provider.clone(), registry, config(3));

        let result = expect_done(agent.invoke("Say hello").await.unwrap());
        assert_eq!(result.text, "Hello!");
        assert_eq!(result.rounds, 1);
        assert_eq!(result.tool_calls, 0);
        assert_eq!(result.usage.input_tokens, 10);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let requests = provider.requests().await;
        assert_eq!(requests[0].system.as_deref(), Some("You are a test."));
        assert_eq!(requests[0].tools[0].name, "count");
        assert_eq!(requests[0].turns.len(), 1);
    }

    #[tokio::test]
    async fn tool_results_are_fed_back_before_next_request() {
        let provider = MockProvider::new(vec![
            calls_response(&[("count", json!({}))]),
            text_response("Counted."),
        ]);
        let (registry, calls) = counter_registry();
        let agent = Agent::new(provider.clone(), registry, config(3));

        let result = expect_done(agent.invoke("Count once").await.unwrap());
        assert_eq!(result.text, "Counted.");
        assert_eq!(result.rounds, 2);
        assert_eq!(result.tool_calls, 1);
        assert_eq!(result.usage.input_tokens, 30);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let second = &provider.requests().await[1];
        let roles: Vec<Role> = second.turns.iter().map(Turn::role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant, Role::Tool]);
    }

    #[tokio::test]
    async fn budget_caps_handler_invocations() {
        let provider = MockProvider::new(vec![
            calls_response(&[
                ("count", json!({})),
                ("count", json!({})),
                ("count", json!({})),
            ]),
            calls_response(&[("count", json!({}))]),
            text_response("Out of calls."),
        ]);
        let (registry, calls) = counter_registry();
        let agent = Agent::new(provider.clone(), registry, config(2));

        let result = expect_done(agent.invoke("Count forever").await.unwrap());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(result.tool_calls, 2);
        assert_eq!(result.text, "Out of calls.");

        // The third call in the first round is answered without running.
        let results = result.context.tool_results("count");
        assert_eq!(results.len(), 3);
        assert_eq!(
            results[2].get("error_kind").and_then(ToolValue::as_str),
            Some("budget_exhausted")
        );
        assert!(result.context.unanswered_calls().is_empty());

        // Final completion is requested with tools withheld.
        let requests = provider.requests().await;
        assert_eq!(requests.len(), 3);
        assert!(!requests[1].tools.is_empty());
        assert!(requests[2].tools.is_empty());
    }

    #[tokio::test]
    async fn repeated_call_ids_each_get_a_result() {
        let provider = MockProvider::new(vec![
            InferenceResponse {
                stop_reason: StopReason::ToolUse,
                content: vec![
                    ContentBlock::ToolUse(ToolCallRequest::new("call_0", "count", json!({}))),
                    ContentBlock::ToolUse(ToolCallRequest::new("call_0", "count", json!({}))),
                ],
                usage: Usage::default(),
            },
            text_response("Counted twice."),
        ]);
        let (registry, calls) = counter_registry();
        let agent = Agent::new(provider.clone(), registry, config(5));

        let result = expect_done(agent.invoke("Count twice").await.unwrap());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(result.tool_calls, 2);
        assert_eq!(result.context.tool_results("count").len(), 2);
        assert!(result.context.unanswered_calls().is_empty());

        // The follow-up request pairs each call with its own result.
        let second = &provider.requests().await[1];
        let Turn::Assistant { tool_calls, .. } = &second.turns[1] else {
            panic!("expected assistant turn");
        };
        let call_ids: Vec<&str> = tool_calls.iter().map(|c| c.id.as_str()).collect();
        let result_ids: Vec<&str> = second.turns[2..]
            .iter()
            .filter_map(|t| match t {
                Turn::Tool { call_id, .. } => Some(call_id.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(call_ids, vec!["call_0", "call_0_1"]);
        assert_eq!(result_ids, call_ids);
    }

    #[tokio::test]
    async fn zero_budget_never_dispatches() {
        let provider = MockProvider::new(vec![
            calls_response(&[("count", json!({}))]),
            text_response("No tools for me."),
        ]);
        let (registry, calls) = counter_registry();
        let agent = Agent::new(provider, registry, config(0));

        let result = expect_done(agent.invoke("Count").await.unwrap());
        assert_eq!(result.text, "No tools for me.");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn auto_execute_off_suspends_with_pending_calls() {
        let provider = MockProvider::new(vec![calls_response(&[
            ("count", json!({})),
            ("count", json!({"n": 2})),
        ])]);
        let (registry, calls) = counter_registry();
        let agent = Agent::new(provider, registry, config(3).with_auto_execute(false));

        let outcome = agent.invoke("Count twice").await.unwrap();
        assert_eq!(outcome.state(), LoopState::Suspended);
        let AgentOutcome::Suspended(run) = outcome else {
            unreachable!()
        };
        assert_eq!(run.pending.len(), 2);
        assert_eq!(run.remaining_budget, 3);
        assert_eq!(run.context.unanswered_calls(), run.pending);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn model_error_fails_without_dispatch() {
        let provider = MockProvider::scripted(vec![Err(InferenceError::ApiError {
            status: 500,
            body: "engine fault".into(),
        })]);
        let (registry, calls) = counter_registry();
        let agent = Agent::new(provider.clone(), registry, config(3));

        let outcome = agent.invoke("anything").await.unwrap();
        let AgentOutcome::Failed(failure) = outcome else {
            panic!("expected Failed");
        };
        assert!(failure.message.contains("500"));
        assert_eq!(failure.tool_calls, 0);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(provider.requests().await.len(), 1, "no retry");
    }

    #[tokio::test]
    async fn model_error_mid_run_stops_further_calls() {
        let provider = MockProvider::scripted(vec![
            Ok(calls_response(&[("count", json!({}))])),
            Err(InferenceError::Request("connection reset".into())),
        ]);
        let (registry, calls) = counter_registry();
        let agent = Agent::new(provider, registry, config(5));

        let outcome = agent.invoke("Count").await.unwrap();
        assert_eq!(outcome.state(), LoopState::Failed);
        assert_eq!(outcome.tool_calls(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn model_timeout_is_a_model_error() {
        let gate = Arc::new(Notify::new());
        let agent = Agent::new(
            GatedProvider { gate },
            ToolRegistry::new(),
            config(1).with_model_timeout(Some(Duration::from_millis(200))),
        );

        let outcome = agent.invoke("hang").await.unwrap();
        let AgentOutcome::Failed(failure) = outcome else {
            panic!("expected Failed");
        };
        assert!(matches!(
            failure.error,
            InferenceError::Timeout(limit) if limit == Duration::from_millis(200)
        ));
    }

    #[tokio::test]
    async fn invalid_arguments_are_reported_and_consume_budget() {
        let provider = MockProvider::new(vec![
            calls_response(&[("execute_code", json!({"code": 12}))]),
            calls_response(&[("execute_code", json!({"code": "12"}))]),
            text_response("Gave up."),
        ]);
        let registry = ToolRegistry::new();
        let renderer = Arc::new(PreviewRenderer::new(CodeWorkspace::default()));
        register_code_tools(&registry, SandboxedExecutor::new(), renderer);
        let agent = Agent::new(provider, registry, config(1));

        let result = expect_done(agent.invoke("Run 12").await.unwrap());
        assert_eq!(result.tool_calls, 1);
        let first = last_tool_result(&result.context, "execute_code");
        assert!(first.is_error());
        assert_eq!(first.get("error_kind").and_then(ToolValue::as_str), Some("validation"));
        assert_eq!(result.text, "Gave up.");
    }

    #[tokio::test]
    async fn handler_errors_do_not_end_the_run() {
        let provider = MockProvider::new(vec![
            calls_response(&[("fail", json!({})), ("count", json!({}))]),
            text_response("Handled the error."),
        ]);
        let (registry, calls) = counter_registry();
        registry.register(ToolDefinition::new("fail", "Always fails"), FailingTool);
        let agent = Agent::new(provider, registry, config(5));

        let result = expect_done(agent.invoke("Try both").await.unwrap());
        assert_eq!(result.text, "Handled the error.");
        assert_eq!(result.tool_calls, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let failed = last_tool_result(&result.context, "fail");
        assert_eq!(
            failed.get("error").and_then(ToolValue::as_str),
            Some("disk on fire")
        );
    }

    #[tokio::test]
    async fn unregistered_tool_yields_not_found_result() {
        let provider = MockProvider::new(vec![
            calls_response(&[("count", json!({}))]),
            text_response("It was gone."),
        ]);
        let (registry, calls) = counter_registry();
        registry.unregister("count");
        let agent = Agent::new(provider, registry, config(3));

        let result = expect_done(agent.invoke("Count").await.unwrap());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        let missing = last_tool_result(&result.context, "count");
        assert_eq!(
            missing.get("error_kind").and_then(ToolValue::as_str),
            Some("not_found")
        );
    }

    #[tokio::test]
    async fn reregistration_dispatches_latest_handler() {
        let provider = MockProvider::new(vec![
            calls_response(&[("which", json!({}))]),
            text_response("ok"),
        ]);
        let registry = ToolRegistry::new();
        registry.register(ToolDefinition::new("which", "Which handler"), Tagged("h1"));
        let agent = Agent::new(provider, registry.clone(), config(3));
        registry.register(ToolDefinition::new("which", "Which handler"), Tagged("h2"));

        let result = expect_done(agent.invoke("Which?").await.unwrap());
        let out = last_tool_result(&result.context, "which");
        assert_eq!(out.get("handler").and_then(ToolValue::as_str), Some("h2"));
    }

    #[tokio::test]
    async fn preview_update_is_visible_to_later_call_in_same_round() {
        let provider = MockProvider::new(vec![
            calls_response(&[
                ("update_preview", json!({"html": "<html>X</html>"})),
                ("get_current_code", json!({})),
            ]),
            text_response("Updated."),
        ]);
        let workspace = CodeWorkspace::default();
        let registry = ToolRegistry::new();
        register_code_tools(
            &registry,
            SandboxedExecutor::new(),
            Arc::new(PreviewRenderer::new(workspace.clone())),
        );
        let agent = Agent::new(provider, registry, GenerationConfig::code_assistant("test"));

        let result = expect_done(agent.invoke("Make X").await.unwrap());
        let code = last_tool_result(&result.context, "get_current_code");
        assert_eq!(
            code.get("code").and_then(ToolValue::as_str),
            Some("<html>X</html>")
        );
        assert_eq!(workspace.current_code(), "<html>X</html>");
    }

    #[tokio::test]
    async fn execute_code_round_trip() {
        let provider = MockProvider::new(vec![
            calls_response(&[
                ("execute_code", json!({"code": "1+1"})),
                ("execute_code", json!({"code": "throw new Error('boom')"})),
            ]),
            text_response("1+1 is 2."),
        ]);
        let registry = ToolRegistry::new();
        register_code_tools(
            &registry,
            SandboxedExecutor::new(),
            Arc::new(PreviewRenderer::new(CodeWorkspace::default())),
        );
        let agent = Agent::new(provider, registry, config(3));

        let result = expect_done(agent.invoke("What is 1+1?").await.unwrap());
        let results = result.context.tool_results("execute_code");
        assert_eq!(results[0].get("success").and_then(ToolValue::as_bool), Some(true));
        assert_eq!(results[0].get("result").and_then(ToolValue::as_str), Some("2"));
        assert_eq!(results[1].get("success").and_then(ToolValue::as_bool), Some(false));
        assert_eq!(results[1].get("error").and_then(ToolValue::as_str), Some("boom"));
    }

    #[tokio::test]
    async fn second_run_while_busy_is_rejected() {
        let gate = Arc::new(Notify::new());
        let agent = Arc::new(Agent::new(
            GatedProvider { gate: gate.clone() },
            ToolRegistry::new(),
            config(1),
        ));

        let first = {
            let agent = agent.clone();
            tokio::spawn(async move { agent.invoke("first").await })
        };
        while !agent.is_running() {
            tokio::task::yield_now().await;
        }

        assert!(matches!(agent.invoke("second").await, Err(AgentError::Busy)));

        gate.notify_one();
        let outcome = first.await.unwrap().unwrap();
        assert_eq!(outcome.text(), Some("released"));
        assert!(!agent.is_running());
    }

    #[tokio::test]
    async fn empty_prompt_is_rejected() {
        let agent = Agent::new(MockProvider::default(), ToolRegistry::new(), config(1));
        assert!(matches!(
            agent.invoke("   ").await,
            Err(AgentError::EmptyPrompt)
        ));
        assert!(!agent.is_running());
    }

    #[tokio::test]
    async fn streaming_emits_events() {
        let provider = MockProvider::new(vec![
            InferenceResponse {
                stop_reason: StopReason::ToolUse,
                content: vec![
                    ContentBlock::Text("Working...".into()),
                    ContentBlock::ToolUse(ToolCallRequest::new("c1", "count", json!({}))),
                ],
                usage: Usage::default(),
            },
            text_response("Done!"),
        ]);
        let (registry, _) = counter_registry();
        let agent = Agent::new(provider, registry, config(3));

        let (tx, mut rx) = mpsc::channel(32);
        let outcome = agent.invoke_streaming("Test", tx).await.unwrap();
        assert_eq!(outcome.text(), Some("Done!"));

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }

        assert!(matches!(events[0], AgentEvent::RoundStart { round: 0 }));
        assert!(matches!(events[1], AgentEvent::Text { .. }));
        assert!(matches!(
            events[2],
            AgentEvent::StateChanged {
                state: LoopState::ExecutingTools
            }
        ));
        assert!(matches!(events[3], AgentEvent::ToolCall { .. }));
        assert!(matches!(
            events[4],
            AgentEvent::ToolResult {
                is_error: false,
                ..
            }
        ));
        assert!(matches!(
            events[5],
            AgentEvent::StateChanged {
                state: LoopState::AwaitingModel
            }
        ));
        assert!(matches!(events[6], AgentEvent::RoundStart { round: 1 }));
        assert!(matches!(events[7], AgentEvent::Text { .. }));
        assert!(matches!(
            events[8],
            AgentEvent::StateChanged {
                state: LoopState::Done
            }
        ));
        assert!(matches!(
            events[9],
            AgentEvent::Finished {
                rounds: 2,
                tool_calls: 1
            }
        ));
    }
}
