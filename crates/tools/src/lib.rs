//! Built-in tools for toolmark.
//!
//! The network tools (`website_monitor`, `http_client`) share one
//! [`RateLimiterRegistry`]. The [`ToolManager`] wraps a registry and is
//! what the execution loop calls through the `ToolExecutor` seam.

pub mod http_client;
pub mod manager;
pub mod rate_limit;
pub mod website_monitor;

use std::sync::Arc;
use toolmark_core::tool::ToolRegistry;

pub use http_client::HttpClientTool;
pub use manager::{ToolManager, validate_parameters};
pub use rate_limit::{RateLimitStats, RateLimiter, RateLimiterRegistry};
pub use website_monitor::WebsiteMonitorTool;

/// Create a registry with every built-in tool, sharing `limits`.
pub fn default_registry(limits: Arc<RateLimiterRegistry>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(WebsiteMonitorTool::new(limits.clone())));
    registry.register(Box::new(HttpClientTool::new(limits)));
    registry
}
