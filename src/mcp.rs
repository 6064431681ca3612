//! MCP bridge.
//!
//! Exposes the [`ToolRegistry`] as MCP tools over rmcp's Streamable HTTP
//! transport, mounted at `/mcp` by the server. Each MCP session gets a clone
//! of [`McpBridge`]; everything inside is behind `Arc`.

use std::borrow::Cow;
use std::sync::Arc;

use rmcp::model::*;
use rmcp::{ErrorData as McpError, ServerHandler};
use tracing::info;

use crate::context::AppContext;
use crate::traits::{ToolContext, ToolRegistry};

/// Tools that only read state.
const READ_ONLY_TOOLS: &[&str] = &["search_jobs", "list_available_documents"];

#[derive(Clone)]
pub struct McpBridge {
    app: Arc<AppContext>,
    tools: Arc<ToolRegistry>,
}

impl McpBridge {
    pub fn new(app: Arc<AppContext>, tools: Arc<ToolRegistry>) -> Self {
        Self { app, tools }
    }

    fn to_mcp_tool(tool: &dyn crate::traits::Tool) -> Tool {
        let input_schema: Arc<serde_json::Map<String, serde_json::Value>> =
            match tool.parameters_schema() {
                serde_json::Value::Object(map) => Arc::new(map),
                _ => Arc::new(serde_json::Map::new()),
            };

        Tool {
            name: Cow::Owned(tool.name().to_string()),
            title: None,
            description: Some(Cow::Owned(tool.description().to_string())),
            input_schema,
            output_schema: None,
            annotations: Some(
                ToolAnnotations::new().read_only(READ_ONLY_TOOLS.contains(&tool.name())),
            ),
            execution: None,
            icons: None,
            meta: None,
        }
    }
}

/// Plain strings are returned as-is; structured results as pretty JSON.
fn result_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_default(),
    }
}

impl ServerHandler for McpBridge {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "job-finder-rag".to_string(),
                title: Some("Job Finder RAG".to_string()),
                version: env!("CARGO_PKG_VERSION").to_string(),
                description: None,
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Job and resume matching over indexed documents. Use search_jobs to ask \
                 questions, list_available_documents to see what is indexed, and \
                 add_job_description to index new material."
                    .to_string(),
            ),
        }
    }

    fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: rmcp::service::RequestContext<rmcp::RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListToolsResult, McpError>> + Send + '_ {
        let tools: Vec<Tool> = self
            .tools
            .tools()
            .iter()
            .map(|t| Self::to_mcp_tool(t.as_ref()))
            .collect();
        std::future::ready(Ok(ListToolsResult::with_all_items(tools)))
    }

    fn get_tool(&self, name: &str) -> Option<Tool> {
        self.tools.find(name).map(Self::to_mcp_tool)
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParams,
        _context: rmcp::service::RequestContext<rmcp::RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let tool = self.tools.find(&request.name).ok_or_else(|| {
            McpError::new(
                ErrorCode::METHOD_NOT_FOUND,
                format!("no tool registered with name: {}", request.name),
                None,
            )
        })?;

        info!(tool = %request.name, "mcp tool call");
        let params = request
            .arguments
            .map(serde_json::Value::Object)
            .unwrap_or(serde_json::Value::Object(serde_json::Map::new()));

        let ctx = ToolContext::new(self.app.clone());
        match tool.execute(params, &ctx).await {
            Ok(result) => Ok(CallToolResult::success(vec![Content::text(result_text(
                &result,
            ))])),
            Err(e) => Ok(CallToolResult::error(vec![Content::text(e.to_string())])),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::ToolRegistry;
    use serde_json::json;

    #[test]
    fn test_result_text() {
        assert_eq!(result_text(&json!("plain answer")), "plain answer");
        assert!(result_text(&json!({ "success": true })).contains("\"success\": true"));
    }

    #[test]
    fn test_tool_descriptors() {
        let registry = ToolRegistry::with_builtins();
        let search = McpBridge::to_mcp_tool(registry.find("search_jobs").unwrap());
        assert_eq!(search.name, "search_jobs");
        assert_eq!(search.input_schema["required"], json!(["query"]));
        assert_eq!(search.annotations.unwrap().read_only_hint, Some(true));

        let add = McpBridge::to_mcp_tool(registry.find("add_job_description").unwrap());
        assert_eq!(add.annotations.unwrap().read_only_hint, Some(false));
    }
}
