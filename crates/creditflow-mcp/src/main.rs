use creditflow_core::{
    catalog, Diagnostic, FlowGraph, GraphStore, NodeKind, Position, StorageError,
};
use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, Content, ServerCapabilities, ServerInfo},
    schemars, tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler, ServiceExt,
};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

// --- Request types ---

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct FlowRequest {
    /// Name of the flow
    name: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct ImportDocumentRequest {
    /// Name of the flow to create or replace
    name: String,
    /// The rule document as a JSON string: {"ratings": {"AA": {"common_conditions": {...}, "score_adjustment": [...], "paynet": {...}}}}
    data: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct AddNodeRequest {
    /// Name of the flow
    flow: String,
    /// Node kind: root, rating, conditionGroup, condition, bureauGroup or scoreCondition
    kind: NodeKind,
    /// Initial data as a JSON object merged over the kind's defaults, e.g. {"name": "fico", "value": 680, "operator": ">="}
    data: Option<String>,
    /// X position on canvas. Default: 100.
    x: Option<f64>,
    /// Y position on canvas. Default: 100.
    y: Option<f64>,
    /// Explicit node ID. Default: next free "node-N".
    id: Option<String>,
    /// If set, also connect this parent to the new node
    parent_id: Option<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct DeleteNodesRequest {
    /// Name of the flow
    flow: String,
    /// IDs of nodes to delete. Connected edges are also removed.
    node_ids: Vec<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct UpdateNodeDataRequest {
    /// Name of the flow
    flow: String,
    /// ID of the node to update
    node_id: String,
    /// JSON object of fields to replace in the node's data; other fields are kept
    data: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct MoveNodeRequest {
    /// Name of the flow
    flow: String,
    /// ID of the node to move
    node_id: String,
    /// New position
    position: Position,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct ConnectRequest {
    /// Name of the flow
    flow: String,
    /// Source (parent) node ID
    source: String,
    /// Target (child) node ID
    target: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct SetLayoutRequest {
    /// JSON object of layout settings to change, e.g. {"bureauColumns": 2, "ratingSpacing": 260}. Other settings are kept. Omit to read the current settings.
    settings: Option<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct DisconnectRequest {
    /// Name of the flow
    flow: String,
    /// IDs of edges to remove
    edge_ids: Vec<String>,
}

// --- Server ---

#[derive(Clone)]
pub struct CreditFlowServer {
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl CreditFlowServer {
    pub fn new() -> Self {
        Self {
            tool_router: Self::tool_router(),
        }
    }

    #[tool(description = "List all stored credit rating flows")]
    fn list_flows(&self) -> Result<CallToolResult, McpError> {
        match creditflow_core::list_flows() {
            Ok(names) => {
                let text = if names.is_empty() {
                    "No flows found. Use import_document or load_sample to create one.".to_string()
                } else {
                    names.join("\n")
                };
                Ok(CallToolResult::success(vec![Content::text(text)]))
            }
            Err(e) => Ok(CallToolResult::error(vec![Content::text(e.to_string())])),
        }
    }

    #[tool(description = "Delete a stored flow")]
    fn delete_flow(
        &self,
        Parameters(req): Parameters<FlowRequest>,
    ) -> Result<CallToolResult, McpError> {
        match creditflow_core::delete_flow(&req.name) {
            Ok(()) => {
                info!(flow = %req.name, "flow deleted");
                Ok(CallToolResult::success(vec![Content::text(format!(
                    "Deleted flow '{}'",
                    req.name
                ))]))
            }
            Err(e) => Ok(CallToolResult::error(vec![Content::text(e.to_string())])),
        }
    }

    #[tool(
        description = "Show or change the layout settings used by import_document and load_sample. Without settings, returns the current values."
    )]
    fn set_layout(
        &self,
        Parameters(req): Parameters<SetLayoutRequest>,
    ) -> Result<CallToolResult, McpError> {
        let patch = match req.settings.as_deref().map(parse_object).transpose() {
            Ok(p) => p.unwrap_or_default(),
            Err(e) => return Ok(CallToolResult::error(vec![Content::text(e)])),
        };
        let layout = match creditflow_core::read_layout().merged(&patch) {
            Ok(l) => l,
            Err(e) => {
                return Ok(CallToolResult::error(vec![Content::text(format!(
                    "Invalid layout settings: {}",
                    e
                ))]));
            }
        };
        if !patch.is_empty() {
            if let Err(e) = creditflow_core::write_layout(&layout) {
                return Ok(CallToolResult::error(vec![Content::text(e.to_string())]));
            }
        }
        let json = serde_json::to_string_pretty(&layout)
            .unwrap_or_else(|e| format!("Serialization error: {}", e));
        Ok(CallToolResult::success(vec![Content::text(json)]))
    }

    #[tool(description = "Create or replace a flow from the built-in sample rule set (ratings AA and A)")]
    fn load_sample(
        &self,
        Parameters(req): Parameters<FlowRequest>,
    ) -> Result<CallToolResult, McpError> {
        let layout = creditflow_core::read_layout();
        let (store, diagnostics) = GraphStore::from_document(&catalog::sample_document(), &layout);
        finish(&req.name, &store, &diagnostics, format!("Loaded sample into '{}'", req.name))
    }

    #[tool(
        description = "Import a rule document, fully replacing the flow's graph. Malformed parts are imported as empty and reported as warnings. Bureau keys other than paynet/dnb/experian/equifax are kept as generic bureau groups."
    )]
    fn import_document(
        &self,
        Parameters(req): Parameters<ImportDocumentRequest>,
    ) -> Result<CallToolResult, McpError> {
        let decoded = match creditflow_core::parse_document(&req.data) {
            Ok(d) => d,
            Err(e) => {
                return Ok(CallToolResult::error(vec![Content::text(format!(
                    "Invalid JSON: {}",
                    e
                ))]));
            }
        };

        let layout = creditflow_core::read_layout();
        let (store, mut diagnostics) = GraphStore::from_document(&decoded.value, &layout);
        let mut all = decoded.diagnostics;
        all.append(&mut diagnostics);

        let summary = format!(
            "Imported {} rating(s) into '{}': {} node(s), {} edge(s)",
            decoded.value.ratings.len(),
            req.name,
            store.node_count(),
            store.edge_count()
        );
        finish(&req.name, &store, &all, summary)
    }

    #[tool(
        description = "Get the flow's graph as JSON: {nodes: [{id, type, position, data, parentRef?}], edges: [{id, source, target}]}"
    )]
    fn get_graph(
        &self,
        Parameters(req): Parameters<FlowRequest>,
    ) -> Result<CallToolResult, McpError> {
        match creditflow_core::read_graph(&req.name) {
            Ok(graph) => {
                let json = serde_json::to_string_pretty(&graph)
                    .unwrap_or_else(|e| format!("Serialization error: {}", e));
                Ok(CallToolResult::success(vec![Content::text(json)]))
            }
            Err(e) => Ok(read_error(&req.name, e)),
        }
    }

    #[tool(
        description = "Add a node. Data not given falls back to the kind's defaults. Pass parent_id to connect it in the same call."
    )]
    fn add_node(
        &self,
        Parameters(req): Parameters<AddNodeRequest>,
    ) -> Result<CallToolResult, McpError> {
        let mut store = match open(&req.flow) {
            Ok(s) => s,
            Err(result) => return Ok(result),
        };
        let initial = match req.data.as_deref().map(parse_object).transpose() {
            Ok(d) => d,
            Err(e) => return Ok(CallToolResult::error(vec![Content::text(e)])),
        };

        let position = Position::new(req.x.unwrap_or(100.0), req.y.unwrap_or(100.0));
        let id = match store.insert_node(req.kind, initial.as_ref(), position, req.id) {
            Ok(id) => id,
            Err(e) => return Ok(CallToolResult::error(vec![Content::text(e.to_string())])),
        };
        if let Some(parent) = &req.parent_id {
            if let Err(e) = store.connect(parent, &id) {
                return Ok(CallToolResult::error(vec![Content::text(e.to_string())]));
            }
        }

        save(&req.flow, &store, format!("Added {} '{}'", req.kind, id))
    }

    #[tool(description = "Delete one or more nodes. Edges touching them are also removed.")]
    fn delete_nodes(
        &self,
        Parameters(req): Parameters<DeleteNodesRequest>,
    ) -> Result<CallToolResult, McpError> {
        let mut store = match open(&req.flow) {
            Ok(s) => s,
            Err(result) => return Ok(result),
        };
        for id in &req.node_ids {
            if let Err(e) = store.delete_node(id) {
                return Ok(CallToolResult::error(vec![Content::text(e.to_string())]));
            }
        }
        save(&req.flow, &store, format!("Deleted {} node(s)", req.node_ids.len()))
    }

    #[tool(
        description = "Replace some fields of a node's data, e.g. {\"value\": 650} on a condition or {\"operation\": \"OR\"} on a group. Other fields are kept."
    )]
    fn update_node_data(
        &self,
        Parameters(req): Parameters<UpdateNodeDataRequest>,
    ) -> Result<CallToolResult, McpError> {
        let mut store = match open(&req.flow) {
            Ok(s) => s,
            Err(result) => return Ok(result),
        };
        let patch = match parse_object(&req.data) {
            Ok(p) => p,
            Err(e) => return Ok(CallToolResult::error(vec![Content::text(e)])),
        };
        if let Err(e) = store.patch_node_data(&req.node_id, &patch) {
            return Ok(CallToolResult::error(vec![Content::text(e.to_string())]));
        }
        save(&req.flow, &store, format!("Updated node '{}'", req.node_id))
    }

    #[tool(description = "Move a node. Sibling order on export follows position (x, then y).")]
    fn move_node(
        &self,
        Parameters(req): Parameters<MoveNodeRequest>,
    ) -> Result<CallToolResult, McpError> {
        let mut store = match open(&req.flow) {
            Ok(s) => s,
            Err(result) => return Ok(result),
        };
        if let Err(e) = store.move_node(&req.node_id, req.position) {
            return Ok(CallToolResult::error(vec![Content::text(e.to_string())]));
        }
        save(&req.flow, &store, format!("Moved node '{}'", req.node_id))
    }

    #[tool(description = "Connect a parent node to a child node. Self-loops are rejected.")]
    fn connect(
        &self,
        Parameters(req): Parameters<ConnectRequest>,
    ) -> Result<CallToolResult, McpError> {
        let mut store = match open(&req.flow) {
            Ok(s) => s,
            Err(result) => return Ok(result),
        };
        match store.connect(&req.source, &req.target) {
            Ok(id) => save(&req.flow, &store, format!("Added edge '{}'", id)),
            Err(e) => Ok(CallToolResult::error(vec![Content::text(e.to_string())])),
        }
    }

    #[tool(description = "Remove one or more edges")]
    fn disconnect(
        &self,
        Parameters(req): Parameters<DisconnectRequest>,
    ) -> Result<CallToolResult, McpError> {
        let mut store = match open(&req.flow) {
            Ok(s) => s,
            Err(result) => return Ok(result),
        };
        for id in &req.edge_ids {
            if let Err(e) = store.disconnect(id) {
                return Ok(CallToolResult::error(vec![Content::text(e.to_string())]));
            }
        }
        save(&req.flow, &store, format!("Removed {} edge(s)", req.edge_ids.len()))
    }

    #[tool(
        description = "Rebuild the rule document from the flow's graph. Nodes attached under the wrong kind of parent, or not connected to the root, are left out and listed as warnings."
    )]
    fn export_document(
        &self,
        Parameters(req): Parameters<FlowRequest>,
    ) -> Result<CallToolResult, McpError> {
        let store = match open(&req.name) {
            Ok(s) => s,
            Err(result) => return Ok(result),
        };
        let raised = store.raise();
        let json = match serde_json::to_string_pretty(&raised.document) {
            Ok(j) => j,
            Err(e) => {
                return Ok(CallToolResult::error(vec![Content::text(format!(
                    "Serialization error: {}",
                    e
                ))]));
            }
        };
        let mut content = vec![Content::text(json)];
        if !raised.diagnostics.is_empty() {
            content.push(Content::text(format_diagnostics(&raised.diagnostics)));
        }
        Ok(CallToolResult::success(content))
    }
}

#[tool_handler]
impl ServerHandler for CreditFlowServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(INSTRUCTIONS.into()),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

// --- Helpers ---

/// Load a flow into a fresh store owned by this call.
fn open(name: &str) -> Result<GraphStore, CallToolResult> {
    creditflow_core::read_graph(name)
        .map(GraphStore::from_graph)
        .map_err(|e| read_error(name, e))
}

fn save(name: &str, store: &GraphStore, message: String) -> Result<CallToolResult, McpError> {
    finish(name, store, &[], message)
}

fn finish(
    name: &str,
    store: &GraphStore,
    diagnostics: &[Diagnostic],
    message: String,
) -> Result<CallToolResult, McpError> {
    let graph: FlowGraph = store.to_graph();
    match creditflow_core::write_graph(name, &graph) {
        Ok(()) => {
            info!(flow = name, "{message}");
            let mut text = message;
            if !diagnostics.is_empty() {
                text.push('\n');
                text.push_str(&format_diagnostics(diagnostics));
            }
            Ok(CallToolResult::success(vec![Content::text(text)]))
        }
        Err(e) => {
            error!(flow = name, "write failed: {e}");
            Ok(CallToolResult::error(vec![Content::text(e.to_string())]))
        }
    }
}

fn read_error(name: &str, e: StorageError) -> CallToolResult {
    CallToolResult::error(vec![Content::text(format!(
        "Failed to read flow '{}': {}",
        name, e
    ))])
}

fn parse_object(raw: &str) -> Result<Map<String, Value>, String> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err("data must be a JSON object".to_string()),
        Err(e) => Err(format!("Invalid JSON: {}", e)),
    }
}

fn format_diagnostics(diagnostics: &[Diagnostic]) -> String {
    let mut out = format!("{} warning(s):", diagnostics.len());
    for d in diagnostics {
        out.push_str("\n- ");
        out.push_str(&d.to_string());
    }
    out
}

const INSTRUCTIONS: &str = r#"CreditFlow edits credit rating rules as a graph.

A rule document maps rating labels (AA, A, B, ...) to ratings. Each rating has common conditions (an AND/OR group of named threshold tests), optional score adjustments by years in business, and one condition group per credit bureau (paynet, dnb, experian, equifax, or any other key).

## Workflow
1. `import_document` (or `load_sample`) to build a flow's graph from a rule document. Importing always replaces the whole graph.
2. Edit with `add_node`, `update_node_data`, `move_node`, `connect`, `disconnect`, `delete_nodes`. The graph is a tree: root -> rating -> condition group / bureau group -> condition / score condition.
3. `export_document` to get the rule document back. Siblings are exported in position order, left to right.
4. `set_layout` tunes node spacing for later imports; `delete_flow` removes a flow."#;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let service = CreditFlowServer::new()
        .serve(rmcp::transport::io::stdio())
        .await
        .inspect_err(|e| error!("MCP server error: {}", e))?;
    service.waiting().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_object_requires_an_object() {
        assert_eq!(parse_object(r#"{"value": 1}"#).unwrap().len(), 1);
        assert_eq!(parse_object("[1]").unwrap_err(), "data must be a JSON object");
        assert!(parse_object("{").unwrap_err().starts_with("Invalid JSON"));
    }

    #[test]
    fn diagnostics_are_listed_one_per_line() {
        let text = format_diagnostics(&[
            Diagnostic::MissingRoot,
            Diagnostic::DanglingEdge {
                edge_id: "e1".to_string(),
            },
        ]);
        assert_eq!(
            text,
            "2 warning(s):\n- graph has no root node\n- edge 'e1' points at a missing node"
        );
    }

    #[test]
    fn set_layout_request_carries_a_json_object() {
        let req: SetLayoutRequest = serde_json::from_value(serde_json::json!({
            "settings": "{\"bureauColumns\": 2}"
        }))
        .unwrap();
        let patch = parse_object(req.settings.as_deref().unwrap()).unwrap();
        let layout = creditflow_core::LayoutConfig::default().merged(&patch).unwrap();
        assert_eq!(layout.bureau_columns, 2);
    }

    #[test]
    fn add_node_request_accepts_kind_names() {
        let req: AddNodeRequest = serde_json::from_value(serde_json::json!({
            "flow": "rules",
            "kind": "scoreCondition",
            "parent_id": "aa-paynet"
        }))
        .unwrap();
        assert_eq!(req.kind, NodeKind::ScoreCondition);
        assert_eq!(req.parent_id.as_deref(), Some("aa-paynet"));
    }
}
