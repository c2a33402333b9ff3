//! `toolmark status`: Show an agent's status.

use toolmark_agent::AgentStatusReport;
use toolmark_config::AppConfig;

use crate::runtime::Runtime;

pub async fn run(config: AppConfig, agent: &str) -> Result<(), Box<dyn std::error::Error>> {
    let runtime = Runtime::bootstrap(config).await?;
    let report = AgentStatusReport::collect(
        runtime.memory.as_ref(),
        agent,
        runtime.config.max_agent_memory_entries,
    )
    .await?;

    println!("Agent: {}", report.name);
    println!("==================");
    println!("  Status:   {}", serde_json::to_value(report.status)?.as_str().unwrap_or("unknown"));
    println!("  Role:     {}", report.role);
    println!("  Tools:    {}", if report.tools.is_empty() { "(none)".to_string() } else { report.tools.join(", ") });
    println!("  Model:    {}", report.model.as_deref().unwrap_or(&runtime.config.default_model));
    println!("  Memory:   {} / {} entries", report.total_memory_entries, report.memory_limit);
    println!("  Updated:  {}", report.last_update.format("%Y-%m-%d %H:%M:%S UTC"));

    if !report.recent_activity.is_empty() {
        println!("\n  Recent activity:");
        for entry in &report.recent_activity {
            let first_line = entry.preview.lines().next().unwrap_or_default();
            println!(
                "    {} [{}] {}",
                entry.timestamp.format("%H:%M:%S"),
                entry.role.as_str(),
                first_line
            );
        }
    }
    Ok(())
}
