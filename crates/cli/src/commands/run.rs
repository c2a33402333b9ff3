//! `toolmark run`: Execute an agent on a task.

use std::path::Path;
use toolmark_config::AppConfig;
use toolmark_core::ExecutionContext;
use toolmark_core::tool::ToolOutcome;

use crate::runtime::Runtime;

/// Read the execution context from an inline JSON string or a file.
/// Neither given means an empty context.
pub fn parse_context(
    inline: Option<&str>,
    file: Option<&Path>,
) -> Result<ExecutionContext, Box<dyn std::error::Error>> {
    let raw = match (inline, file) {
        (Some(text), _) => text.to_string(),
        (None, Some(path)) => std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read context file {}: {e}", path.display()))?,
        (None, None) => return Ok(ExecutionContext::new()),
    };
    match serde_json::from_str::<serde_json::Value>(&raw)? {
        serde_json::Value::Object(map) => Ok(map),
        _ => Err("Execution context must be a JSON object".into()),
    }
}

pub async fn run(
    config: AppConfig,
    agent: &str,
    task: &str,
    context: ExecutionContext,
    json: bool,
    verbose: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let runtime = Runtime::bootstrap(config).await?;
    let executor = runtime.executor().await;

    if verbose {
        let mut events = executor.event_bus().subscribe();
        tokio::spawn(async move {
            while let Ok(event) = events.recv().await {
                tracing::debug!(event = ?event, "Execution event");
            }
        });
    }

    let result = executor.run(agent, task, &context).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    if !result.tool_results.is_empty() {
        eprintln!();
        for outcome in &result.tool_results {
            match outcome {
                ToolOutcome::Success { tool, .. } => eprintln!("  ✅ {tool}"),
                ToolOutcome::Failure { tool, error } => eprintln!("  ❌ {tool}: {error}"),
            }
        }
        if result.synthesized {
            eprintln!("  (tool call synthesized from the task)");
        }
        eprintln!();
    }
    println!("{}", result.answer);
    Ok(())
}
