//! Interactive code assistant REPL.
//!
//! Usage:
//!   cargo run --example code_assistant
//!   cargo run --example code_assistant -- --model qwen2.5-coder --template counter
//!   cargo run --example code_assistant -- --provider openai --base-url http://localhost:8080
//!
//! The preview page is written to `--preview` (default `preview/index.html`);
//! open it in a browser and reload after each update.
//!
//! Commands: `/code` prints the buffer, `/template <name>` loads a template,
//! `exit` or `quit` leaves.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use nexus_code_agent::{
    register_code_tools, Agent, AgentEvent, AgentOutcome, CodeTemplate, CodeWorkspace, FileSink,
    GenerationConfig, InferenceProvider, OllamaProvider, OpenAiProvider, PreviewRenderer,
    SandboxedExecutor, ToolRegistry,
};

#[derive(Parser)]
#[command(name = "code_assistant", about = "Build web pages with a local model")]
struct Cli {
    /// Provider: "ollama" or "openai"
    #[arg(long, default_value = "ollama")]
    provider: String,

    /// Model to use
    #[arg(long, default_value = "llama3.2")]
    model: String,

    /// API base URL (defaults depend on provider)
    #[arg(long)]
    base_url: Option<String>,

    /// Max tool calls per message
    #[arg(long, default_value_t = 3)]
    max_tool_calls: usize,

    /// Hand tool calls back instead of running them
    #[arg(long)]
    manual: bool,

    /// Where the preview page is written
    #[arg(long, default_value = "preview/index.html")]
    preview: PathBuf,

    /// Starting template: blank, hello, counter, or animation
    #[arg(long, default_value = "hello")]
    template: String,
}

fn build_provider(cli: &Cli) -> Box<dyn InferenceProvider> {
    match cli.provider.as_str() {
        "ollama" => {
            let mut p = OllamaProvider::new();
            if let Some(ref url) = cli.base_url {
                p = p.with_base_url(url);
            }
            Box::new(p)
        }
        "openai" => {
            let base = cli
                .base_url
                .clone()
                .unwrap_or_else(|| "http://localhost:8080".into());
            let mut p = OpenAiProvider::new(base);
            if let Ok(key) = std::env::var("OPENAI_API_KEY") {
                p = p.with_api_key(key);
            }
            Box::new(p)
        }
        other => {
            eprintln!("error: unknown provider '{other}'. Use 'ollama' or 'openai'.");
            std::process::exit(1);
        }
    }
}

fn template_names() -> String {
    CodeTemplate::ALL
        .iter()
        .map(|t| t.key())
        .collect::<Vec<_>>()
        .join(", ")
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let provider = build_provider(&cli);

    let template = CodeTemplate::from_key(&cli.template).unwrap_or_else(|| {
        eprintln!(
            "error: unknown template '{}'. Use one of: {}",
            cli.template,
            template_names()
        );
        std::process::exit(1);
    });
    let workspace = CodeWorkspace::from_template(template);

    let renderer = Arc::new(
        PreviewRenderer::new(workspace.clone()).with_sink(FileSink::new(&cli.preview)),
    );
    let registry = ToolRegistry::new();
    register_code_tools(&registry, SandboxedExecutor::new(), renderer.clone());

    // Write the starting page so there is something to open.
    if let Err(e) = renderer.render(&workspace.current_code()).await {
        eprintln!("warning: {e}");
    }

    let config = GenerationConfig::code_assistant(&cli.model)
        .with_max_tool_calls(cli.max_tool_calls)
        .with_auto_execute(!cli.manual);
    let agent = Agent::new(provider, registry, config);

    eprintln!("nexus code assistant");
    eprintln!("provider: {}", cli.provider);
    eprintln!("model: {}", cli.model);
    eprintln!("preview: {}", cli.preview.display());
    eprintln!("---");

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();

    loop {
        eprint!("\x1b[1;36myou>\x1b[0m ");
        io::stderr().flush().ok();

        let line = match lines.next() {
            Some(Ok(line)) => line,
            _ => break,
        };

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if matches!(trimmed, "exit" | "quit" | "/q") {
            break;
        }
        if trimmed == "/code" {
            println!("{}", workspace.current_code());
            continue;
        }
        if let Some(key) = trimmed.strip_prefix("/template") {
            match CodeTemplate::from_key(key.trim()) {
                Some(t) => {
                    workspace.load_template(t);
                    if let Err(e) = renderer.render(&workspace.current_code()).await {
                        eprintln!("warning: {e}");
                    }
                    eprintln!("\x1b[2m  loaded {}\x1b[0m", t.name());
                }
                None => eprintln!("templates: {}", template_names()),
            }
            continue;
        }

        let (tx, mut rx) = tokio::sync::mpsc::channel::<AgentEvent>(64);

        let printer = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                match event {
                    AgentEvent::Text { content } => {
                        eprint!("\x1b[1;32magent>\x1b[0m ");
                        println!("{content}");
                    }
                    AgentEvent::ToolCall { name, input } => {
                        eprintln!("\x1b[33m  [tool: {name}]\x1b[0m {input}");
                    }
                    AgentEvent::ToolResult {
                        name,
                        output,
                        is_error,
                    } => {
                        let tag = if is_error { "error" } else { "result" };
                        let output = output.to_string();
                        let truncated = match output.char_indices().nth(200) {
                            Some((cut, _)) => format!("{}...", &output[..cut]),
                            None => output,
                        };
                        eprintln!("\x1b[33m  [{tag}: {name}]\x1b[0m {truncated}");
                    }
                    AgentEvent::BudgetExhausted { requested } => {
                        eprintln!(
                            "\x1b[35m  [tool budget spent, {requested} call(s) dropped]\x1b[0m"
                        );
                    }
                    AgentEvent::Finished { rounds, tool_calls } => {
                        if rounds > 1 {
                            eprintln!("\x1b[2m  ({rounds} rounds, {tool_calls} tool calls)\x1b[0m");
                        }
                    }
                    _ => {}
                }
            }
        });

        let outcome = agent.invoke_streaming(trimmed, tx).await;
        printer.await.ok();

        match outcome {
            Ok(AgentOutcome::Done(result)) => {
                eprintln!(
                    "\x1b[2m  [{}in / {}out tokens]\x1b[0m",
                    result.usage.input_tokens, result.usage.output_tokens
                );
            }
            Ok(AgentOutcome::Suspended(run)) => {
                eprintln!("\x1b[35m  model requested {} tool call(s):\x1b[0m", run.pending.len());
                for call in &run.pending {
                    eprintln!("    {} {}", call.name, call.arguments);
                }
            }
            Ok(AgentOutcome::Failed(failure)) => {
                eprintln!("\x1b[1;31merror:\x1b[0m {}", failure.message);
            }
            Err(e) => {
                eprintln!("\x1b[1;31merror:\x1b[0m {e}");
            }
        }
    }

    eprintln!("bye.");
}
