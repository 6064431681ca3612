//! Tool trait and registry shared by the HTTP API and the MCP bridge.
//!
//! Every operation an agent can call is a [`Tool`]: it describes its
//! parameters as JSON Schema and executes against a [`ToolContext`]. The
//! same [`ToolRegistry`] backs `GET /tools/list`, `POST /tools/{name}`, and
//! the MCP `tools/list` / `tools/call` methods.
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │              ToolRegistry                │
//! │  search_jobs        list_available_docs  │
//! │  add_job_description        reindex      │
//! └──────────────┬───────────────────────────┘
//!                ▼
//!    /tools/* (REST)   and   /mcp (rmcp)
//! ```

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::context::AppContext;

/// A tool that agents can discover and call.
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use anyhow::Result;
/// use serde_json::{json, Value};
/// use job_finder_rag::traits::{Tool, ToolContext};
///
/// pub struct ChunkCountTool;
///
/// #[async_trait]
/// impl Tool for ChunkCountTool {
///     fn name(&self) -> &str { "chunk_count" }
///     fn description(&self) -> &str { "Number of indexed chunks" }
///
///     fn parameters_schema(&self) -> Value {
///         json!({ "type": "object", "properties": {} })
///     }
///
///     async fn execute(&self, _params: Value, ctx: &ToolContext) -> Result<Value> {
///         Ok(json!({ "chunks": ctx.app().rag().index_status().chunks }))
///     }
/// }
/// ```
#[async_trait]
pub trait Tool: Send + Sync {
    /// Route name (`POST /tools/{name}`) and MCP tool name.
    fn name(&self) -> &str;

    /// One-line description for agent discovery.
    fn description(&self) -> &str;

    /// Whether this tool ships with the service. Reported as `"builtin"`
    /// in `GET /tools/list`.
    fn is_builtin(&self) -> bool {
        false
    }

    /// JSON Schema (`type: "object"`) for the parameters.
    fn parameters_schema(&self) -> Value;

    /// Executes the tool. The returned value is wrapped as
    /// `{ "result": ... }` by the HTTP layer.
    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value>;
}

/// What a tool can reach while executing.
pub struct ToolContext {
    app: Arc<AppContext>,
}

impl ToolContext {
    pub fn new(app: Arc<AppContext>) -> Self {
        Self { app }
    }

    pub fn app(&self) -> &AppContext {
        &self.app
    }
}

/// Entry in the `GET /tools/list` response.
#[derive(Debug, Clone, Serialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    pub builtin: bool,
    pub parameters: Value,
}

impl ToolInfo {
    pub fn from_tool(tool: &dyn Tool) -> Self {
        Self {
            name: tool.name().to_string(),
            description: tool.description().to_string(),
            builtin: tool.is_builtin(),
            parameters: tool.parameters_schema(),
        }
    }
}

/// Checks `params` against a tool's schema: the body must be an object,
/// required keys must be present, and declared property types must match.
pub fn validate_params(schema: &Value, params: &Value) -> Result<Value> {
    let params_obj = match params {
        Value::Object(map) => map.clone(),
        Value::Null => serde_json::Map::new(),
        other => bail!("parameters must be a JSON object, got {}", json_type_name(other)),
    };

    if let Some(required) = schema.get("required").and_then(|r| r.as_array()) {
        for field in required.iter().filter_map(|v| v.as_str()) {
            if !params_obj.contains_key(field) {
                bail!("missing required parameter: {}", field);
            }
        }
    }

    if let Some(properties) = schema.get("properties").and_then(|p| p.as_object()) {
        for (name, prop) in properties {
            let (Some(value), Some(expected)) =
                (params_obj.get(name), prop.get("type").and_then(|t| t.as_str()))
            else {
                continue;
            };
            let type_ok = match expected {
                "string" => value.is_string(),
                "integer" => value.is_i64() || value.is_u64(),
                "number" => value.is_number(),
                "boolean" => value.is_boolean(),
                "array" => value.is_array(),
                "object" => value.is_object(),
                _ => true,
            };
            if !type_ok {
                bail!(
                    "parameter '{}' must be of type '{}', got {}",
                    name,
                    expected,
                    json_type_name(value)
                );
            }
        }
    }

    Ok(Value::Object(params_obj))
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn required_str<'a>(params: &'a Value, key: &str) -> Result<&'a str> {
    let value = params[key].as_str().unwrap_or("");
    if value.trim().is_empty() {
        bail!("{} must not be empty", key);
    }
    Ok(value)
}

/// Answers a question from the indexed job descriptions and resumes.
pub struct SearchJobsTool;

#[async_trait]
impl Tool for SearchJobsTool {
    fn name(&self) -> &str {
        "search_jobs"
    }

    fn description(&self) -> &str {
        "Search for jobs or resumes using semantic search. Provides relevant context from indexed documents."
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Question about jobs, resumes, or career matching" }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let query = ctx.app().check_query(required_str(&params, "query")?)?;
        let response = ctx.app().search_and_record(None, query).await;
        Ok(Value::String(response.result))
    }
}

/// Lists stored documents with their upload dates.
pub struct ListDocumentsTool;

#[async_trait]
impl Tool for ListDocumentsTool {
    fn name(&self) -> &str {
        "list_available_documents"
    }

    fn description(&self) -> &str {
        "List all documents (resumes, job descriptions) currently in the system."
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {}
        })
    }

    async fn execute(&self, _params: Value, ctx: &ToolContext) -> Result<Value> {
        Ok(Value::String(ctx.app().document_listing().await?))
    }
}

/// Stores a job description and re-indexes.
pub struct AddJobDescriptionTool;

#[async_trait]
impl Tool for AddJobDescriptionTool {
    fn name(&self) -> &str {
        "add_job_description"
    }

    fn description(&self) -> &str {
        "Add a new job description or career information. The document is indexed for future searches."
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "title": { "type": "string", "description": "Document title" },
                "content": { "type": "string", "description": "Full text of the job description" }
            },
            "required": ["title", "content"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        // Failures are reported in the message text rather than as a tool error.
        let title = params["title"].as_str().unwrap_or("");
        let content = params["content"].as_str().unwrap_or("");
        let outcome = ctx.app().add_document(title, content, "mcp").await;
        Ok(Value::String(outcome.message))
    }
}

/// Deletes and rebuilds the vector index.
pub struct ReindexTool;

#[async_trait]
impl Tool for ReindexTool {
    fn name(&self) -> &str {
        "reindex"
    }

    fn description(&self) -> &str {
        "Rebuild the vector index from all stored documents"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {}
        })
    }

    async fn execute(&self, _params: Value, ctx: &ToolContext) -> Result<Value> {
        let outcome = ctx.app().reindex().await;
        Ok(json!({
            "success": outcome.is_success(),
            "message": outcome.message,
        }))
    }
}

/// Registry of callable tools.
///
/// # Example
///
/// ```rust
/// use job_finder_rag::traits::ToolRegistry;
///
/// let tools = ToolRegistry::with_builtins();
/// assert!(tools.find("search_jobs").is_some());
/// ```
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// Registry holding the four service tools.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(SearchJobsTool));
        registry.register(Box::new(ListDocumentsTool));
        registry.register(Box::new(AddJobDescriptionTool));
        registry.register(Box::new(ReindexTool));
        registry
    }

    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.push(tool);
    }

    pub fn tools(&self) -> &[Box<dyn Tool>] {
        &self.tools
    }

    pub fn find(&self, name: &str) -> Option<&dyn Tool> {
        self.tools
            .iter()
            .find(|t| t.name() == name)
            .map(|t| t.as_ref())
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_registered() {
        let registry = ToolRegistry::with_builtins();
        let names: Vec<&str> = registry.tools().iter().map(|t| t.name()).collect();
        assert_eq!(
            names,
            vec![
                "search_jobs",
                "list_available_documents",
                "add_job_description",
                "reindex"
            ]
        );
        assert!(registry.tools().iter().all(|t| t.is_builtin()));
        assert!(registry.find("nope").is_none());
    }

    #[test]
    fn test_schemas_are_objects() {
        for tool in ToolRegistry::with_builtins().tools() {
            let schema = tool.parameters_schema();
            assert_eq!(schema["type"], "object", "{}", tool.name());
            assert!(schema["properties"].is_object(), "{}", tool.name());
        }
    }

    #[test]
    fn test_validate_params() {
        let schema = SearchJobsTool.parameters_schema();
        assert!(validate_params(&schema, &json!({ "query": "rust" })).is_ok());

        let missing = validate_params(&schema, &json!({})).unwrap_err();
        assert!(missing.to_string().contains("missing required parameter: query"));

        let wrong_type = validate_params(&schema, &json!({ "query": 5 })).unwrap_err();
        assert!(wrong_type.to_string().contains("must be of type 'string'"));

        assert!(validate_params(&schema, &json!([1, 2])).is_err());
        let empty = ListDocumentsTool.parameters_schema();
        assert_eq!(validate_params(&empty, &Value::Null).unwrap(), json!({}));
    }

    #[test]
    fn test_required_str() {
        let params = json!({ "query": "  rust  ", "blank": " " });
        assert_eq!(required_str(&params, "query").unwrap(), "  rust  ");
        assert!(required_str(&params, "blank").is_err());
        assert!(required_str(&params, "missing").is_err());
    }
}
