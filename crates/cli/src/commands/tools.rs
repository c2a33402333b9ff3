//! `toolmark tools`: List registered tools and their rate limits.

use toolmark_config::AppConfig;

use crate::runtime::Runtime;

pub async fn run(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let runtime = Runtime::bootstrap(config).await?;

    for tool in runtime.memory.list_tools().await? {
        let flag = if tool.enabled { "" } else { " (disabled)" };
        println!("{}{flag}", tool.name);
        println!("    {}", tool.description);
        if let Some(required) = tool.parameters.get("required").and_then(|r| r.as_array()) {
            let names: Vec<&str> = required.iter().filter_map(|v| v.as_str()).collect();
            println!("    required: {}", names.join(", "));
        }
    }

    println!("\nRate limits:");
    for (name, stats) in runtime.limits.all_stats() {
        println!(
            "  {name:<16} {}/{} per {}s",
            stats.current_requests, stats.max_requests, stats.window_secs
        );
    }
    Ok(())
}
