//! Tool manager: the [`ToolExecutor`] the execution loop talks to.
//!
//! Resolves the tool, refuses disabled catalogue entries, checks the
//! arguments against the tool's JSON schema (required keys and basic
//! types), looks up the calling agent's per-tool config, then runs it.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use toolmark_core::error::{MemoryError, ToolError};
use toolmark_core::memory::MemoryStore;
use toolmark_core::tool::{ToolDefinition, ToolExecutor, ToolParameters, ToolRegistry};
use tracing::{debug, info, warn};

pub struct ToolManager {
    registry: ToolRegistry,
    memory: Option<Arc<dyn MemoryStore>>,
}

impl ToolManager {
    pub fn new(registry: ToolRegistry) -> Self {
        Self {
            registry,
            memory: None,
        }
    }

    /// Consult a store for catalogue flags and agent tool configs.
    pub fn with_memory(mut self, memory: Arc<dyn MemoryStore>) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.registry.definitions()
    }

    /// Publish every registered tool to the store's catalogue. Entries
    /// already present keep their `enabled` flag.
    pub async fn sync_catalog(&self) -> Result<usize, MemoryError> {
        let Some(memory) = &self.memory else {
            return Ok(0);
        };
        let mut count = 0;
        for mut definition in self.registry.definitions() {
            if let Some(existing) = memory.get_tool(&definition.name).await? {
                definition.enabled = existing.enabled;
            }
            memory.register_tool(definition).await?;
            count += 1;
        }
        debug!(count, "Tool catalogue synced");
        Ok(count)
    }

    async fn tool_config(&self, tool_name: &str, caller: Option<&str>) -> Result<Value, ToolError> {
        let (Some(memory), Some(caller)) = (&self.memory, caller) else {
            return Ok(Value::Null);
        };
        let agent = memory
            .get_agent(caller)
            .await
            .map_err(|e| lookup_failed(tool_name, e))?;
        Ok(agent
            .and_then(|a| a.tool_configs.get(tool_name).cloned())
            .unwrap_or(Value::Null))
    }

    async fn ensure_enabled(&self, tool_name: &str) -> Result<(), ToolError> {
        let Some(memory) = &self.memory else {
            return Ok(());
        };
        let definition = memory
            .get_tool(tool_name)
            .await
            .map_err(|e| lookup_failed(tool_name, e))?;
        match definition {
            Some(def) if !def.enabled => Err(ToolError::Disabled(tool_name.to_string())),
            _ => Ok(()),
        }
    }
}

fn lookup_failed(tool_name: &str, e: MemoryError) -> ToolError {
    ToolError::ExecutionFailed {
        tool_name: tool_name.to_string(),
        reason: format!("memory lookup failed: {e}"),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn matches_type(value: &Value, expected: &str) -> bool {
    match expected {
        "string" => value.is_string(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        // Unknown schema types are not enforced
        _ => true,
    }
}

/// Check `parameters` against a JSON schema's `required` list and the
/// `type` of each declared property.
pub fn validate_parameters(schema: &Value, parameters: &ToolParameters) -> Result<(), ToolError> {
    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for param in required.iter().filter_map(Value::as_str) {
            if !parameters.contains_key(param) {
                return Err(ToolError::InvalidArguments(format!(
                    "Required parameter '{param}' is missing"
                )));
            }
        }
    }

    let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
        return Ok(());
    };
    for (param, value) in parameters {
        let expected = properties
            .get(param)
            .and_then(|p| p.get("type"))
            .and_then(Value::as_str);
        if let Some(expected) = expected
            && !matches_type(value, expected)
        {
            return Err(ToolError::InvalidArguments(format!(
                "Parameter '{param}' should be of type {expected}, got {}",
                type_name(value)
            )));
        }
    }
    Ok(())
}

#[async_trait]
impl ToolExecutor for ToolManager {
    async fn execute_tool(
        &self,
        tool_name: &str,
        parameters: &ToolParameters,
        caller: Option<&str>,
    ) -> Result<Value, ToolError> {
        let tool = self
            .registry
            .get(tool_name)
            .ok_or_else(|| ToolError::NotFound(tool_name.to_string()))?;

        self.ensure_enabled(tool_name).await?;
        validate_parameters(&tool.parameters_schema(), parameters)?;
        let config = self.tool_config(tool_name, caller).await?;

        let started = Instant::now();
        let result = tool.execute(parameters, &config).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        match &result {
            Ok(_) => info!(tool = tool_name, caller, duration_ms, "Tool executed"),
            Err(e) => warn!(tool = tool_name, caller, duration_ms, error = %e, "Tool failed"),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use toolmark_core::AgentDefinition;
    use toolmark_core::tool::Tool;
    use toolmark_memory::InMemoryStore;

    /// Echoes its parameters and the config it was handed.
    struct ProbeTool;

    #[async_trait]
    impl Tool for ProbeTool {
        fn name(&self) -> &str {
            "probe"
        }
        fn description(&self) -> &str {
            "Echoes parameters and config"
        }
        fn parameters_schema(&self) -> Value {
            json!({
                "type": "object",
                "properties": {
                    "target": {"type": "string"},
                    "count": {"type": "integer"},
                    "ratio": {"type": "number"},
                    "opts": {"type": "object"}
                },
                "required": ["target"]
            })
        }
        async fn execute(&self, parameters: &ToolParameters, config: &Value) -> Result<Value, ToolError> {
            Ok(json!({"parameters": parameters, "config": config}))
        }
    }

    fn params(v: Value) -> ToolParameters {
        v.as_object().cloned().unwrap()
    }

    fn manager() -> ToolManager {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(ProbeTool));
        ToolManager::new(registry)
    }

    #[test]
    fn missing_required_parameter() {
        let schema = ProbeTool.parameters_schema();
        let err = validate_parameters(&schema, &params(json!({"count": 1}))).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid tool arguments: Required parameter 'target' is missing"
        );
    }

    #[test]
    fn type_mismatch_is_reported() {
        let schema = ProbeTool.parameters_schema();
        let err = validate_parameters(&schema, &params(json!({"target": "a", "count": "three"}))).unwrap_err();
        assert!(err.to_string().contains("Parameter 'count' should be of type integer, got string"));

        let err = validate_parameters(&schema, &params(json!({"target": "a", "count": 1.5}))).unwrap_err();
        assert!(err.to_string().contains("got number"));
    }

    #[test]
    fn integers_satisfy_number_and_unknown_keys_pass() {
        let schema = ProbeTool.parameters_schema();
        validate_parameters(&schema, &params(json!({"target": "a", "ratio": 2, "extra": [1]}))).unwrap();
        validate_parameters(&json!({}), &params(json!({"anything": true}))).unwrap();
    }

    #[tokio::test]
    async fn unknown_tool_is_not_found() {
        let err = manager().execute_tool("nope", &ToolParameters::new(), None).await.unwrap_err();
        assert!(matches!(err, ToolError::NotFound(name) if name == "nope"));
    }

    #[tokio::test]
    async fn passes_caller_tool_config() {
        let memory = Arc::new(InMemoryStore::new());
        let mut agent = AgentDefinition::new("prober", "Prober").with_tools(["probe"]);
        agent.tool_configs.insert("probe".into(), json!({"token": "abc"}));
        memory.upsert_agent(agent).await.unwrap();

        let manager = manager().with_memory(memory);
        let out = manager
            .execute_tool("probe", &params(json!({"target": "x"})), Some("prober"))
            .await
            .unwrap();
        assert_eq!(out["config"]["token"], "abc");
        assert_eq!(out["parameters"]["target"], "x");

        let anonymous = manager
            .execute_tool("probe", &params(json!({"target": "x"})), None)
            .await
            .unwrap();
        assert!(anonymous["config"].is_null());
    }

    #[tokio::test]
    async fn disabled_catalogue_entry_is_refused() {
        let memory = Arc::new(InMemoryStore::new());
        let manager = manager().with_memory(memory.clone());
        assert_eq!(manager.sync_catalog().await.unwrap(), 1);

        let mut def = memory.get_tool("probe").await.unwrap().unwrap();
        def.enabled = false;
        memory.register_tool(def).await.unwrap();

        // A re-sync keeps the operator's flag
        manager.sync_catalog().await.unwrap();

        let err = manager
            .execute_tool("probe", &params(json!({"target": "x"})), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Disabled(_)));
    }
}
