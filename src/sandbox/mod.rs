//! Isolated surfaces for model-triggered side effects.
//!
//! [`SandboxedExecutor`] evaluates JavaScript in a fresh engine context that
//! only knows the language built-ins. [`PreviewRenderer`] pushes complete
//! documents to a presentation sink that has no path back into the host.

pub mod preview;

use std::time::Duration;

use boa_engine::script::Script;
use boa_engine::{Context, JsError, Source};
use serde::Serialize;
use tracing::{debug, warn};

pub use preview::{FileSink, NullSink, PreviewRenderer, PreviewSink};

/// Outcome of one evaluation, shaped for the `execute_code` tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionOutcome {
    pub success: bool,
    pub result: String,
    pub error: String,
}

impl ExecutionOutcome {
    fn ok(result: String) -> Self {
        Self {
            success: true,
            result,
            error: String::new(),
        }
    }

    fn failed(error: String) -> Self {
        Self {
            success: false,
            result: String::new(),
            error,
        }
    }
}

/// Instructions Boa runs between checks of the evaluation deadline.
const INSTRUCTION_BUDGET: u32 = 10_000;

/// Extra wait after the deadline before giving up on a script stuck inside a
/// single native call.
const STOP_GRACE: Duration = Duration::from_secs(1);

/// Runs untrusted code with no bindings to host state.
///
/// Each call builds a new engine context on a blocking thread, so nothing
/// leaks between evaluations and a busy script never stalls the async runtime.
/// The script yields every few thousand instructions so the deadline can
/// interrupt it; when `execute` reports a timeout the engine has stopped.
/// Loop and recursion limits turn runaway scripts into ordinary failures sooner.
///
/// Code is first evaluated as a single expression, so `{a: 1}` is an object
/// literal. Anything that does not parse as an expression (statements,
/// declarations) runs as a strict-mode script and yields its completion value.
#[derive(Debug, Clone)]
pub struct SandboxedExecutor {
    loop_iteration_limit: u64,
    recursion_limit: usize,
    timeout: Duration,
}

impl Default for SandboxedExecutor {
    fn default() -> Self {
        Self {
            loop_iteration_limit: 1_000_000,
            recursion_limit: 512,
            timeout: Duration::from_secs(10),
        }
    }
}

impl SandboxedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_loop_iteration_limit(mut self, limit: u64) -> Self {
        self.loop_iteration_limit = limit;
        self
    }

    pub fn with_recursion_limit(mut self, limit: usize) -> Self {
        self.recursion_limit = limit;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn execute(&self, code: &str) -> ExecutionOutcome {
        if code.trim().is_empty() {
            return ExecutionOutcome::failed("no code to execute".into());
        }
        let code = code.to_string();
        let limits = self.clone();

        let task = tokio::task::spawn_blocking(move || limits.evaluate(&code));

        match tokio::time::timeout(self.timeout + STOP_GRACE, task).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => ExecutionOutcome::failed(format!("evaluation aborted: {e}")),
            Err(_) => {
                warn!(timeout = ?self.timeout, "sandboxed evaluation ignored its deadline");
                ExecutionOutcome::failed(format!(
                    "evaluation did not stop within {:?}",
                    self.timeout
                ))
            }
        }
    }

    /// Runs on the blocking thread. The engine context is `!Send`, so it is
    /// created and dropped here, driven by a single-threaded timer runtime.
    fn evaluate(&self, code: &str) -> ExecutionOutcome {
        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
        {
            Ok(runtime) => runtime,
            Err(e) => return ExecutionOutcome::failed(format!("evaluator unavailable: {e}")),
        };

        let mut context = Context::default();
        context
            .runtime_limits_mut()
            .set_loop_iteration_limit(self.loop_iteration_limit);
        context
            .runtime_limits_mut()
            .set_recursion_limit(self.recursion_limit);

        let script = match parse(code, &mut context) {
            Ok(script) => script,
            Err(e) => {
                let message = error_message(&e, &mut context);
                debug!(error = %message, "sandboxed code did not parse");
                return ExecutionOutcome::failed(message);
            }
        };

        let run = script.evaluate_async_with_budget(&mut context, INSTRUCTION_BUDGET);
        let value = match runtime.block_on(tokio::time::timeout(self.timeout, run)) {
            Ok(Ok(value)) => value,
            Ok(Err(e)) => {
                let message = error_message(&e, &mut context);
                debug!(error = %message, "sandboxed evaluation threw");
                return ExecutionOutcome::failed(message);
            }
            Err(_) => {
                debug!(timeout = ?self.timeout, "sandboxed evaluation interrupted");
                return ExecutionOutcome::failed(format!(
                    "evaluation exceeded {:?}",
                    self.timeout
                ));
            }
        };

        // String(value) semantics. Symbols refuse conversion and land here too.
        match value.to_string(&mut context) {
            Ok(s) => ExecutionOutcome::ok(s.to_std_string_escaped()),
            Err(e) => ExecutionOutcome::failed(error_message(&e, &mut context)),
        }
    }
}

/// Parse as a parenthesised expression, falling back to a script.
fn parse(code: &str, context: &mut Context) -> Result<Script, JsError> {
    let expression = format!("\"use strict\";\n(\n{code}\n)");
    if let Ok(script) = Script::parse(Source::from_bytes(expression.as_str()), None, context) {
        return Ok(script);
    }
    let statements = format!("\"use strict\";\n{code}");
    Script::parse(Source::from_bytes(statements.as_str()), None, context)
}

/// The `message` of a thrown Error, or the string form of any other thrown value.
fn error_message(error: &JsError, context: &mut Context) -> String {
    if let Ok(native) = error.try_native(context) {
        return native.message().to_string();
    }
    error
        .as_opaque()
        .and_then(|v| v.to_string(context).ok())
        .map(|s| s.to_std_string_escaped())
        .unwrap_or_else(|| error.to_string())
}
