//! LLM provider implementations for toolmark.
//!
//! All backends implement the `toolmark_core::Provider` trait.
//! The router resolves model names and is the `Generator` handed to the
//! execution loop.

pub mod openai_compat;
pub mod router;

pub use openai_compat::OpenAiCompatProvider;
pub use router::{ProviderRouter, build_from_config};
