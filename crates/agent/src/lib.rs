//! The toolmark execution loop.
//!
//! An agent is a persona (role, goals, rules, declared tools) stored by the
//! memory collaborator. Executing it on a task:
//!
//! 1. **Filter** the caller's context down to what this agent may see
//! 2. **Build** a system prompt from the agent and the filtered context
//! 3. **Generate** a reply and **extract** `TOOL_CALL:` markers from it
//! 4. **Escalate** once if an agent with tools named none
//! 5. **Execute** the calls, then ask for a final answer
//!
//! Generation and tool execution are collaborators behind the traits in
//! `toolmark-core`, so everything here runs against test doubles too.

pub mod context;
pub mod escalation;
pub mod executor;
pub mod extract;
pub mod status;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use context::{BuiltPrompt, ContextFilter, ContextRule, PromptBuilder, PromptInput, PromptMetadata};
pub use escalation::{Escalation, TaskKind};
pub use executor::{
    AgentExecutor, ExecutionPhase, ExecutionResult, ExecutorSettings, FINAL_ANSWER_INSTRUCTION,
    MAX_ITERATIONS_CEILING,
};
pub use extract::{Candidate, Rejection, ToolCallExtractor};
pub use status::{ActivityEntry, AgentState, AgentStatusReport};
