//! HTTP client tool: sends a request and reports status, headers, and body.
//!
//! Authentication comes from the calling agent's tool config, never from
//! the model's arguments:
//!
//! ```toml
//! [agents.tool_configs.http_client]
//! bearer_token = "..."          # Authorization: Bearer ...
//! api_key = "..."               # sent as X-API-Key (or api_key_header)
//! basic_username = "..."
//! basic_password = "..."
//! custom_headers = { X-Team = "sre" }
//! ```

use async_trait::async_trait;
use reqwest::Method;
use reqwest::redirect::Policy;
use serde_json::{Map, Value, json};
use std::sync::Arc;
use std::time::Duration;
use toolmark_core::error::ToolError;
use toolmark_core::tool::{Tool, ToolParameters};
use tracing::{debug, info};

use crate::rate_limit::RateLimiterRegistry;

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const MAX_REDIRECTS: usize = 10;

pub struct HttpClientTool {
    limits: Arc<RateLimiterRegistry>,
}

impl HttpClientTool {
    pub fn new(limits: Arc<RateLimiterRegistry>) -> Self {
        Self { limits }
    }
}

/// Parsed, validated request arguments.
#[derive(Debug)]
struct RequestSpec {
    url: String,
    method: Method,
    headers: Vec<(String, String)>,
    query: Vec<(String, String)>,
    data: Option<Value>,
    timeout_secs: u64,
    follow_redirects: bool,
    verify_ssl: bool,
}

fn string_pairs(value: Option<&Value>) -> Vec<(String, String)> {
    value
        .and_then(Value::as_object)
        .map(|map| {
            map.iter()
                .map(|(k, v)| {
                    let v = match v {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    (k.clone(), v)
                })
                .collect()
        })
        .unwrap_or_default()
}

fn parse_request(parameters: &ToolParameters) -> Result<RequestSpec, ToolError> {
    let url = parameters
        .get("url")
        .and_then(Value::as_str)
        .ok_or_else(|| ToolError::InvalidArguments("Missing 'url' argument".into()))?;
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(ToolError::InvalidArguments(
            "URL must start with http:// or https://".into(),
        ));
    }

    let method = parameters
        .get("method")
        .and_then(Value::as_str)
        .unwrap_or("GET")
        .to_uppercase();
    let method = match method.as_str() {
        "GET" => Method::GET,
        "POST" => Method::POST,
        "PUT" => Method::PUT,
        "PATCH" => Method::PATCH,
        "DELETE" => Method::DELETE,
        "HEAD" => Method::HEAD,
        "OPTIONS" => Method::OPTIONS,
        other => {
            return Err(ToolError::InvalidArguments(format!(
                "Invalid HTTP method: {other}"
            )));
        }
    };

    Ok(RequestSpec {
        url: url.to_string(),
        method,
        headers: string_pairs(parameters.get("headers")),
        query: string_pairs(parameters.get("params")),
        data: parameters.get("data").filter(|d| !d.is_null()).cloned(),
        timeout_secs: parameters
            .get("timeout")
            .and_then(Value::as_u64)
            .unwrap_or(DEFAULT_TIMEOUT_SECS),
        follow_redirects: parameters
            .get("follow_redirects")
            .and_then(Value::as_bool)
            .unwrap_or(true),
        verify_ssl: parameters
            .get("verify_ssl")
            .and_then(Value::as_bool)
            .unwrap_or(true),
    })
}

/// Headers contributed by the agent's tool config. Later entries win.
fn auth_headers(config: &Value) -> Vec<(String, String)> {
    let mut headers = Vec::new();
    if let Some(key) = config.get("api_key").and_then(Value::as_str) {
        let header = config
            .get("api_key_header")
            .and_then(Value::as_str)
            .unwrap_or("X-API-Key");
        headers.push((header.to_string(), key.to_string()));
    }
    if let Some(token) = config.get("bearer_token").and_then(Value::as_str) {
        headers.push(("Authorization".to_string(), format!("Bearer {token}")));
    }
    headers.extend(string_pairs(config.get("custom_headers")));
    headers
}

fn basic_auth(config: &Value) -> Option<(&str, &str)> {
    let user = config.get("basic_username").and_then(Value::as_str)?;
    let pass = config.get("basic_password").and_then(Value::as_str)?;
    Some((user, pass))
}

fn response_headers(headers: &reqwest::header::HeaderMap) -> Map<String, Value> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), Value::String(v.to_string())))
        })
        .collect()
}

fn parse_content(content_type: &str, text: String) -> Value {
    if content_type.contains("application/json")
        && let Ok(json) = serde_json::from_str::<Value>(&text)
    {
        return json;
    }
    Value::String(text)
}

#[async_trait]
impl Tool for HttpClientTool {
    fn name(&self) -> &str {
        "http_client"
    }

    fn description(&self) -> &str {
        "Make an HTTP request to a URL. Supports GET, POST, PUT, PATCH, DELETE, HEAD and OPTIONS. \
         Returns the status code, headers, and body (parsed as JSON when possible)."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "The URL to send the request to"
                },
                "method": {
                    "type": "string",
                    "description": "HTTP method. Defaults to GET.",
                    "enum": ["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD", "OPTIONS"],
                    "default": "GET"
                },
                "headers": {
                    "type": "object",
                    "description": "Extra request headers"
                },
                "data": {
                    "description": "Request body: an object is sent as JSON, anything else as text"
                },
                "params": {
                    "type": "object",
                    "description": "Query string parameters"
                },
                "timeout": {
                    "type": "integer",
                    "description": "Request timeout in seconds (default 30)",
                    "default": DEFAULT_TIMEOUT_SECS
                },
                "follow_redirects": {
                    "type": "boolean",
                    "default": true
                },
                "verify_ssl": {
                    "type": "boolean",
                    "default": true
                }
            },
            "required": ["url"]
        })
    }

    async fn execute(&self, parameters: &ToolParameters, config: &Value) -> Result<Value, ToolError> {
        let spec = parse_request(parameters)?;

        self.limits.wait_for_slot(self.name()).await;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(spec.timeout_secs))
            .redirect(if spec.follow_redirects {
                Policy::limited(MAX_REDIRECTS)
            } else {
                Policy::none()
            })
            .danger_accept_invalid_certs(!spec.verify_ssl)
            .build()
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: self.name().into(),
                reason: format!("Failed to build HTTP client: {e}"),
            })?;

        let mut request = client.request(spec.method.clone(), &spec.url);
        if !spec.query.is_empty() {
            request = request.query(&spec.query);
        }
        for (name, value) in auth_headers(config).into_iter().chain(spec.headers) {
            request = request.header(name, value);
        }
        if let Some((user, pass)) = basic_auth(config) {
            request = request.basic_auth(user, Some(pass));
        }
        let sends_body = matches!(spec.method, Method::POST | Method::PUT | Method::PATCH);
        request = match spec.data {
            Some(data @ Value::Object(_)) if sends_body => request.json(&data),
            Some(Value::String(text)) => request.body(text),
            Some(other) => request.body(other.to_string()),
            None => request,
        };

        debug!(method = %spec.method, url = %spec.url, "Sending HTTP request");

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ToolError::Timeout {
                    tool_name: self.name().into(),
                    timeout_secs: spec.timeout_secs,
                }
            } else {
                ToolError::ExecutionFailed {
                    tool_name: self.name().into(),
                    reason: format!("HTTP request failed: {e}"),
                }
            }
        })?;

        let status = response.status();
        let final_url = response.url().to_string();
        let headers = response_headers(response.headers());
        let content_type = headers
            .get("content-type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let text = response.text().await.map_err(|e| ToolError::ExecutionFailed {
            tool_name: self.name().into(),
            reason: format!("Failed to read response body: {e}"),
        })?;
        let content_length = text.len();
        let success = status.is_success();

        info!(method = %spec.method, url = %spec.url, status = status.as_u16(), "HTTP request finished");

        Ok(json!({
            "url": final_url,
            "method": spec.method.as_str(),
            "status_code": status.as_u16(),
            "status_text": status.canonical_reason().unwrap_or(""),
            "headers": headers,
            "content": parse_content(&content_type, text),
            "content_type": content_type,
            "content_length": content_length,
            "success": success,
            "redirected": final_url != spec.url,
            "message": format!(
                "HTTP {} to {} {} (status {})",
                spec.method,
                spec.url,
                if success { "successful" } else { "failed" },
                status.as_u16()
            ),
        }))
    }
}
