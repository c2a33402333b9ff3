//! `toolmark agents`: List agents in the store.

use toolmark_config::AppConfig;

use crate::runtime::Runtime;

pub async fn run(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let runtime = Runtime::bootstrap(config).await?;
    let agents = runtime.memory.list_agents().await?;

    if agents.is_empty() {
        println!("No agents configured. Add [[agents]] entries to your config file.");
        return Ok(());
    }

    for agent in agents {
        let state = if agent.enabled { "active" } else { "disabled" };
        println!("{:<20} {:<9} {}", agent.name, state, agent.role);
        if agent.has_tools() {
            println!("{:<20} tools: {}", "", agent.tools.join(", "));
        }
    }
    Ok(())
}
