//! Website monitor: checks that a URL answers with the expected status
//! and, optionally, that its body contains a given string.
//!
//! Unreachable sites are a normal outcome here, so timeouts and connection
//! failures come back as a result object with `status` set to `"timeout"`
//! or `"error"` rather than as a tool error.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::{Duration, Instant};
use toolmark_core::error::ToolError;
use toolmark_core::tool::{Tool, ToolParameters};
use tracing::{debug, info};

use crate::rate_limit::RateLimiterRegistry;

const DEFAULT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_EXPECTED_STATUS: u16 = 200;

pub struct WebsiteMonitorTool {
    client: reqwest::Client,
    limits: Arc<RateLimiterRegistry>,
}

impl WebsiteMonitorTool {
    pub fn new(limits: Arc<RateLimiterRegistry>) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(concat!("toolmark-website-monitor/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client, limits }
    }
}

/// What a single check observed, before it is rendered as JSON.
struct Observation<'a> {
    url: &'a str,
    status_code: u16,
    expected_status: u16,
    response_time_ms: u64,
    check_content: &'a str,
    body: Option<&'a str>,
}

fn summarize(obs: &Observation<'_>) -> Value {
    let status_ok = obs.status_code == obs.expected_status;
    let content_ok = obs.check_content.is_empty()
        || obs.body.is_some_and(|body| body.contains(obs.check_content));
    let online = status_ok && content_ok;

    let message = if online {
        format!(
            "Website {} is online (HTTP {}, {}ms)",
            obs.url, obs.status_code, obs.response_time_ms
        )
    } else {
        let mut issues = Vec::new();
        if !status_ok {
            issues.push(format!(
                "HTTP {} (expected {})",
                obs.status_code, obs.expected_status
            ));
        }
        if !content_ok {
            issues.push("Content check failed".to_string());
        }
        format!("Website {} has issues: {}", obs.url, issues.join(", "))
    };

    let mut result = json!({
        "url": obs.url,
        "status": if online { "online" } else { "offline" },
        "status_code": obs.status_code,
        "response_time_ms": obs.response_time_ms,
        "expected_status": obs.expected_status,
        "status_ok": status_ok,
        "content_ok": content_ok,
        "timestamp": Utc::now().to_rfc3339(),
        "error": null,
        "message": message,
    });
    if !obs.check_content.is_empty() {
        result["content_check"] = json!(obs.check_content);
        result["content_found"] = json!(content_ok);
    }
    result
}

fn unreachable(url: &str, status: &str, error: String, expected_status: u16, elapsed: Duration) -> Value {
    let message = match status {
        "timeout" => format!("Website {url} timed out"),
        _ => format!("Website {url} is unreachable: {error}"),
    };
    json!({
        "url": url,
        "status": status,
        "status_code": null,
        "response_time_ms": elapsed.as_millis() as u64,
        "expected_status": expected_status,
        "status_ok": false,
        "content_ok": false,
        "timestamp": Utc::now().to_rfc3339(),
        "error": error,
        "message": message,
    })
}

#[async_trait]
impl Tool for WebsiteMonitorTool {
    fn name(&self) -> &str {
        "website_monitor"
    }

    fn description(&self) -> &str {
        "Check whether a website is online: reports HTTP status, response time, \
         and optionally whether the page contains a given string."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "The URL to check"
                },
                "timeout": {
                    "type": "integer",
                    "description": "Request timeout in seconds (default 10)",
                    "default": DEFAULT_TIMEOUT_SECS
                },
                "expected_status": {
                    "type": "integer",
                    "description": "HTTP status that counts as healthy (default 200)",
                    "default": DEFAULT_EXPECTED_STATUS
                },
                "check_content": {
                    "type": "string",
                    "description": "Text the response body must contain",
                    "default": ""
                }
            },
            "required": ["url"]
        })
    }

    async fn execute(&self, parameters: &ToolParameters, _config: &Value) -> Result<Value, ToolError> {
        let url = parameters
            .get("url")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'url' argument".into()))?;
        let timeout_secs = parameters
            .get("timeout")
            .and_then(Value::as_u64)
            .unwrap_or(DEFAULT_TIMEOUT_SECS);
        let expected_status = parameters
            .get("expected_status")
            .and_then(Value::as_u64)
            .and_then(|s| u16::try_from(s).ok())
            .unwrap_or(DEFAULT_EXPECTED_STATUS);
        let check_content = parameters
            .get("check_content")
            .and_then(Value::as_str)
            .unwrap_or("");

        let waited = self.limits.wait_for_slot(self.name()).await;
        if !waited.is_zero() {
            debug!(url, waited_ms = waited.as_millis() as u64, "Website check was rate limited");
        }

        let started = Instant::now();
        let response = self
            .client
            .get(url)
            .timeout(Duration::from_secs(timeout_secs))
            .send()
            .await;

        let result = match response {
            Ok(response) => {
                let status_code = response.status().as_u16();
                let body = if check_content.is_empty() {
                    None
                } else {
                    response.text().await.ok()
                };
                summarize(&Observation {
                    url,
                    status_code,
                    expected_status,
                    response_time_ms: started.elapsed().as_millis() as u64,
                    check_content,
                    body: body.as_deref(),
                })
            }
            Err(e) if e.is_timeout() => unreachable(
                url,
                "timeout",
                format!("Request timed out after {timeout_secs}s"),
                expected_status,
                started.elapsed(),
            ),
            Err(e) => unreachable(url, "error", e.to_string(), expected_status, started.elapsed()),
        };

        info!(url, status = %result["status"], "Website check finished");
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool() -> WebsiteMonitorTool {
        WebsiteMonitorTool::new(Arc::new(RateLimiterRegistry::new()))
    }

    fn obs<'a>(status_code: u16, check_content: &'a str, body: Option<&'a str>) -> Observation<'a> {
        Observation {
            url: "https://example.org",
            status_code,
            expected_status: 200,
            response_time_ms: 42,
            check_content,
            body,
        }
    }

    #[test]
    fn healthy_site_is_online() {
        let result = summarize(&obs(200, "", None));
        assert_eq!(result["status"], "online");
        assert_eq!(result["status_ok"], true);
        assert_eq!(result["message"], "Website https://example.org is online (HTTP 200, 42ms)");
        assert!(result.get("content_check").is_none());
    }

    #[test]
    fn unexpected_status_and_missing_content_are_reported() {
        let result = summarize(&obs(503, "Welcome", Some("maintenance page")));
        assert_eq!(result["status"], "offline");
        assert_eq!(result["content_found"], false);
        assert_eq!(
            result["message"],
            "Website https://example.org has issues: HTTP 503 (expected 200), Content check failed"
        );
    }

    #[test]
    fn content_check_passes_when_found() {
        let result = summarize(&obs(200, "Welcome", Some("<h1>Welcome</h1>")));
        assert_eq!(result["status"], "online");
        assert_eq!(result["content_check"], "Welcome");
        assert_eq!(result["content_found"], true);
    }

    #[test]
    fn schema_requires_url() {
        let schema = tool().parameters_schema();
        assert_eq!(schema["required"], json!(["url"]));
        assert_eq!(schema["properties"]["expected_status"]["type"], "integer");
    }

    #[tokio::test]
    async fn missing_url_is_invalid() {
        let result = tool().execute(&ToolParameters::new(), &Value::Null).await;
        assert!(matches!(result, Err(ToolError::InvalidArguments(_))));
    }

    #[tokio::test]
    async fn refused_connection_is_a_result_not_an_error() {
        let mut params = ToolParameters::new();
        params.insert("url".into(), json!("http://127.0.0.1:1/"));
        params.insert("timeout".into(), json!(2));

        let result = tool().execute(&params, &Value::Null).await.unwrap();
        assert!(matches!(result["status"].as_str(), Some("error" | "timeout")));
        assert_eq!(result["status_ok"], false);
        assert!(result["status_code"].is_null());
    }
}
