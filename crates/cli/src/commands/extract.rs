//! `toolmark extract`: Show the tool calls a piece of model text contains.

use std::io::Read;
use toolmark_agent::{Candidate, ToolCallExtractor};
use toolmark_config::AppConfig;

use crate::runtime::Runtime;

pub async fn run(config: AppConfig, text: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let text = match text {
        Some(text) => text,
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };

    let runtime = Runtime::bootstrap(config).await?;
    let catalogue = runtime.memory.list_tools().await?;
    let extractor = ToolCallExtractor::from_definitions(&catalogue);

    let candidates = extractor.scan(&text);
    if candidates.is_empty() {
        println!("No TOOL_CALL markers found.");
    }
    for candidate in candidates {
        match candidate {
            Candidate::Accepted(call) => println!("accepted  {call}"),
            Candidate::Rejected { tool_name, reason } => println!("rejected  {tool_name}: {reason}"),
        }
    }
    Ok(())
}
