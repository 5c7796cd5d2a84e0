//! Tool trait, argument handling and the registry that turns connector
//! results into tool output.
//!
//! Tool errors never escape as faults. [`ToolRegistry::invoke`] always
//! returns a [`ToolOutput`], and failures carry only the generic message
//! for their error kind.

use async_trait::async_trait;
use sb_connectors::{ConnectorError, ConnectorResult};
use sb_observability::{tool_span, Redactor};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn, Instrument};

/// Parameter types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterType {
    String,
    Integer,
    Boolean,
}

/// Definition of a tool parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDef {
    /// Parameter name.
    pub name: String,
    /// Parameter description.
    pub description: String,
    /// Parameter type.
    #[serde(rename = "type")]
    pub param_type: ParameterType,
    /// Whether the parameter is required.
    pub required: bool,
    /// Default value (if any).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl ParameterDef {
    /// Creates a new required parameter definition.
    pub fn required(name: &str, description: &str, param_type: ParameterType) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            param_type,
            required: true,
            default: None,
        }
    }

    /// Creates a new optional parameter definition.
    pub fn optional(
        name: &str,
        description: &str,
        param_type: ParameterType,
        default: Value,
    ) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            param_type,
            required: false,
            default: Some(default),
        }
    }
}

/// Arguments of one invocation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolArguments {
    values: Map<String, Value>,
}

fn wrong_type(key: &str, expected: &str) -> ConnectorError {
    ConnectorError::Validation(format!("{} must be {}", key, expected))
}

impl ToolArguments {
    /// Wraps a JSON object. `null` is treated as no arguments.
    pub fn from_value(value: Value) -> ConnectorResult<Self> {
        match value {
            Value::Object(values) => Ok(Self { values }),
            Value::Null => Ok(Self::default()),
            _ => Err(ConnectorError::Validation(
                "arguments must be a JSON object".to_string(),
            )),
        }
    }

    /// Sets an argument.
    pub fn with(mut self, key: &str, value: Value) -> Self {
        self.values.insert(key.to_string(), value);
        self
    }

    /// Gets a raw argument. Explicit `null` counts as absent.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key).filter(|v| !v.is_null())
    }

    /// Gets a string argument or the default.
    pub fn string_or(&self, key: &str, default: &str) -> ConnectorResult<String> {
        match self.get(key) {
            None => Ok(default.to_string()),
            Some(Value::String(s)) => Ok(s.clone()),
            Some(_) => Err(wrong_type(key, "a string")),
        }
    }

    /// Gets a required string argument.
    pub fn require_string(&self, key: &str) -> ConnectorResult<String> {
        match self.get(key) {
            None => Err(ConnectorError::Validation(format!("{} is required", key))),
            Some(Value::String(s)) => Ok(s.clone()),
            Some(_) => Err(wrong_type(key, "a string")),
        }
    }

    /// Gets an integer argument or the default.
    pub fn integer_or(&self, key: &str, default: i64) -> ConnectorResult<i64> {
        match self.get(key) {
            None => Ok(default),
            Some(v) => v.as_i64().ok_or_else(|| wrong_type(key, "an integer")),
        }
    }

    /// Gets an optional boolean argument.
    pub fn optional_bool(&self, key: &str) -> ConnectorResult<Option<bool>> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(*b)),
            Some(_) => Err(wrong_type(key, "a boolean")),
        }
    }
}

/// A named operation exposed to tool callers.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Returns the tool name.
    fn name(&self) -> &str;

    /// Returns the tool description.
    fn description(&self) -> &str;

    /// Returns the parameters this tool accepts.
    fn parameters(&self) -> Vec<ParameterDef>;

    /// Runs the tool.
    async fn call(&self, args: &ToolArguments) -> ConnectorResult<Vec<Value>>;
}

/// Tool metadata for listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Vec<ParameterDef>,
}

impl ToolDefinition {
    /// JSON Schema describing the tool's arguments.
    pub fn input_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for param in &self.parameters {
            let mut prop = Map::new();
            prop.insert("type".into(), json!(param.param_type));
            prop.insert("description".into(), json!(param.description));
            if let Some(default) = &param.default {
                prop.insert("default".into(), default.clone());
            }
            properties.insert(param.name.clone(), Value::Object(prop));
            if param.required {
                required.push(json!(param.name));
            }
        }
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

/// Result of an invocation: the records, or a generic error object.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ToolOutput {
    Records(Vec<Value>),
    Error { error: String },
}

impl ToolOutput {
    /// Creates an error output.
    pub fn error(message: impl Into<String>) -> Self {
        ToolOutput::Error {
            error: message.into(),
        }
    }

    /// Returns true for error outputs.
    pub fn is_error(&self) -> bool {
        matches!(self, ToolOutput::Error { .. })
    }

    /// Converts the output to JSON.
    pub fn to_value(&self) -> Value {
        match self {
            ToolOutput::Records(records) => Value::Array(records.clone()),
            ToolOutput::Error { error } => json!({ "error": error }),
        }
    }
}

/// Registry of the tools served by one adapter.
#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
    redactor: Redactor,
}

impl ToolRegistry {
    /// Creates a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry that redacts the given secrets from logged errors.
    pub fn with_redactor(redactor: Redactor) -> Self {
        Self {
            tools: BTreeMap::new(),
            redactor,
        }
    }

    /// Registers a tool.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        info!("Registering tool: {}", name);
        self.tools.insert(name, tool);
    }

    /// Gets a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Returns true if a tool with this name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Lists all registered tool names.
    pub fn list(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    /// Definitions of all registered tools, sorted by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .values()
            .map(|tool| ToolDefinition {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters(),
            })
            .collect()
    }

    /// Invokes a tool by name.
    pub async fn invoke(&self, name: &str, arguments: Value) -> ToolOutput {
        let Some(tool) = self.get(name) else {
            warn!(tool = %name, "Unknown tool requested");
            return ToolOutput::error(format!("Unknown tool: {}", name));
        };

        let span = tool_span!(name);
        async move {
            let started = Instant::now();
            let result = match ToolArguments::from_value(arguments) {
                Ok(args) => tool.call(&args).await,
                Err(e) => Err(e),
            };

            match result {
                Ok(records) => {
                    info!(
                        results = records.len(),
                        duration_ms = started.elapsed().as_millis() as u64,
                        "Tool invocation succeeded"
                    );
                    ToolOutput::Records(records)
                }
                Err(e) => {
                    warn!(
                        error_kind = e.kind(),
                        error = %self.redactor.redact(&e.to_string()),
                        duration_ms = started.elapsed().as_millis() as u64,
                        "Tool invocation failed"
                    );
                    ToolOutput::error(e.public_message())
                }
            }
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "Returns its arguments"
        }

        fn parameters(&self) -> Vec<ParameterDef> {
            vec![
                ParameterDef::required("text", "Text to echo", ParameterType::String),
                ParameterDef::optional("times", "Repetitions", ParameterType::Integer, json!(1)),
            ]
        }

        async fn call(&self, args: &ToolArguments) -> ConnectorResult<Vec<Value>> {
            let text = args.require_string("text")?;
            let times = args.integer_or("times", 1)?;
            Ok((0..times).map(|_| json!({ "text": text })).collect())
        }
    }

    struct FailingTool(ConnectorError);

    #[async_trait]
    impl Tool for FailingTool {
        fn name(&self) -> &str {
            "fail"
        }

        fn description(&self) -> &str {
            "Always fails"
        }

        fn parameters(&self) -> Vec<ParameterDef> {
            vec![]
        }

        async fn call(&self, _args: &ToolArguments) -> ConnectorResult<Vec<Value>> {
            Err(self.0.clone())
        }
    }

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        registry
    }

    #[tokio::test]
    async fn test_invoke_returns_records() {
        let output = registry()
            .invoke("echo", json!({"text": "hi", "times": 2}))
            .await;
        assert_eq!(
            output,
            ToolOutput::Records(vec![json!({"text": "hi"}), json!({"text": "hi"})])
        );
    }

    #[tokio::test]
    async fn test_unknown_tool_is_error_object() {
        let output = registry().invoke("nope", json!({})).await;
        assert!(output.is_error());
        assert_eq!(output.to_value(), json!({"error": "Unknown tool: nope"}));
    }

    #[tokio::test]
    async fn test_wrong_argument_type_is_error_object() {
        let output = registry()
            .invoke("echo", json!({"text": "hi", "times": "two"}))
            .await;
        assert_eq!(
            output,
            ToolOutput::error("Invalid parameters: times must be an integer")
        );

        let output = registry().invoke("echo", json!(["hi"])).await;
        assert!(output.is_error());
    }

    #[tokio::test]
    async fn test_backend_detail_never_returned() {
        let mut registry = ToolRegistry::with_redactor(Redactor::new(["sess-secret"]));
        registry.register(Arc::new(FailingTool(ConnectorError::Search(
            "job failed: <msg>disk full on idx-3, key sess-secret</msg>".into(),
        ))));

        let output = registry.invoke("fail", Value::Null).await;
        let text = output.to_value().to_string();
        assert!(output.is_error());
        assert!(!text.contains("idx-3"));
        assert!(!text.contains("sess-secret"));
        assert_eq!(
            output,
            ToolOutput::error("Search operation failed. Please check your query and try again.")
        );
    }

    #[test]
    fn test_tool_output_serialization() {
        let records = ToolOutput::Records(vec![json!({"id": 1})]);
        assert_eq!(serde_json::to_value(&records).unwrap(), json!([{"id": 1}]));
        let error = ToolOutput::error("bad");
        assert_eq!(serde_json::to_value(&error).unwrap(), json!({"error": "bad"}));
    }

    #[test]
    fn test_arguments_defaults_and_nulls() {
        let args = ToolArguments::default()
            .with("published", Value::Null)
            .with("limit", json!(5));
        assert_eq!(args.optional_bool("published").unwrap(), None);
        assert_eq!(args.integer_or("limit", 100).unwrap(), 5);
        assert_eq!(args.string_or("query", "").unwrap(), "");
        assert!(args.require_string("query").is_err());
        assert!(ToolArguments::from_value(json!("x")).is_err());
    }

    #[test]
    fn test_input_schema() {
        let definition = registry().definitions().remove(0);
        let schema = definition.input_schema();
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["properties"]["text"]["type"], "string");
        assert_eq!(schema["properties"]["times"]["default"], 1);
        assert_eq!(schema["required"], json!(["text"]));
    }
}
