//! Execution context handling: per-agent filtering and prompt assembly.
//!
//! | Stage | Module | Output |
//! |-------|--------|--------|
//! | 1. Filter | [`filter`] | The subset of the context one agent may see |
//! | 2. Render | [`prompt`] | One bounded system prompt |

pub mod filter;
pub mod prompt;

pub use filter::{ContextFilter, ContextRule, SMALL_CONTEXT_LIMIT, is_oversized};
pub use prompt::{BuiltPrompt, PromptBuilder, PromptInput, PromptMetadata};
