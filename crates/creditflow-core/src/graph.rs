//! Positioned node/edge model handed to renderers. Matches ReactFlow's
//! `Node`/`Edge` structure.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::document::{Operation, Operator, ScoreAdjustment};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, schemars::JsonSchema)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum NodeKind {
    Root,
    Rating,
    ConditionGroup,
    Condition,
    BureauGroup,
    ScoreCondition,
}

impl NodeKind {
    /// Whether a `child` node may hang directly off a node of this kind.
    pub fn accepts_child(&self, child: NodeKind) -> bool {
        matches!(
            (self, child),
            (NodeKind::Root, NodeKind::Rating)
                | (NodeKind::Rating, NodeKind::ConditionGroup)
                | (NodeKind::Rating, NodeKind::BureauGroup)
                | (NodeKind::ConditionGroup, NodeKind::Condition)
                | (NodeKind::BureauGroup, NodeKind::ScoreCondition)
        )
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NodeKind::Root => "root",
            NodeKind::Rating => "rating",
            NodeKind::ConditionGroup => "condition group",
            NodeKind::Condition => "condition",
            NodeKind::BureauGroup => "bureau group",
            NodeKind::ScoreCondition => "score condition",
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct RootData {
    pub label: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct RatingData {
    pub label: String,
    /// The rating label as it appears in the rule document.
    pub rating: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub color: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub score_adjustment: Vec<ScoreAdjustment>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ConditionGroupData {
    pub label: String,
    #[serde(default)]
    pub operation: Operation,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ConditionData {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub value: f64,
    #[serde(default)]
    pub operator: Operator,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apply_score_adjustment: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct BureauData {
    pub label: String,
    /// Bureau key as it appears in the rule document.
    pub bureau: String,
    #[serde(default)]
    pub operation: Operation,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Per-kind node payload. The `type` tag picks the shape of `data`, and
/// renderers and property editors dispatch on it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data")]
pub enum NodeData {
    #[serde(rename = "flowRoot")]
    Root(RootData),
    #[serde(rename = "ratingNode")]
    Rating(RatingData),
    #[serde(rename = "conditionGroupNode")]
    ConditionGroup(ConditionGroupData),
    #[serde(rename = "conditionNode")]
    Condition(ConditionData),
    #[serde(rename = "bureauNode")]
    BureauGroup(BureauData),
    #[serde(rename = "scoreNode")]
    ScoreCondition(ConditionData),
}

impl NodeData {
    pub fn kind(&self) -> NodeKind {
        match self {
            NodeData::Root(_) => NodeKind::Root,
            NodeData::Rating(_) => NodeKind::Rating,
            NodeData::ConditionGroup(_) => NodeKind::ConditionGroup,
            NodeData::Condition(_) => NodeKind::Condition,
            NodeData::BureauGroup(_) => NodeKind::BureauGroup,
            NodeData::ScoreCondition(_) => NodeKind::ScoreCondition,
        }
    }

    /// Merge `patch` into the payload, replacing only the keys it provides.
    /// The kind never changes; a patch that no longer fits the kind's shape
    /// is an error and leaves `self` untouched.
    pub fn merge(&mut self, patch: &Map<String, Value>) -> Result<(), serde_json::Error> {
        let mut tagged = serde_json::to_value(&*self)?;
        if let Some(Value::Object(data)) = tagged.get_mut("data") {
            for (key, value) in patch {
                data.insert(key.clone(), value.clone());
            }
        }
        *self = serde_json::from_value(tagged)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FlowNode {
    pub id: String,
    #[serde(default)]
    pub position: Position,
    #[serde(flatten)]
    pub data: NodeData,
    /// Id of the logical parent this node was lowered from. A lookup key only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_ref: Option<String>,
}

impl FlowNode {
    pub fn kind(&self) -> NodeKind {
        self.data.kind()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct EdgeStyle {
    pub stroke: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EdgeMarker {
    #[serde(rename = "type")]
    pub marker_type: String,
}

impl EdgeMarker {
    pub fn arrow_closed() -> Self {
        Self {
            marker_type: "arrowclosed".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FlowEdge {
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(rename = "type", default = "default_edge_type")]
    pub edge_type: String,
    #[serde(default)]
    pub animated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<EdgeStyle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marker_end: Option<EdgeMarker>,
}

fn default_edge_type() -> String {
    "smoothstep".to_string()
}

impl FlowEdge {
    /// An animated smoothstep edge with an arrow head, as drawn by the canvas.
    pub fn new(source: &str, target: &str, stroke: &str) -> Self {
        Self {
            id: make_edge_id(source, target),
            source: source.to_string(),
            target: target.to_string(),
            edge_type: default_edge_type(),
            animated: true,
            style: Some(EdgeStyle {
                stroke: stroke.to_string(),
            }),
            marker_end: Some(EdgeMarker::arrow_closed()),
        }
    }
}

/// The serialized form of a graph: what gets persisted and rendered.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct FlowGraph {
    #[serde(default)]
    pub nodes: Vec<FlowNode>,
    #[serde(default)]
    pub edges: Vec<FlowEdge>,
}

impl FlowGraph {
    pub fn node(&self, id: &str) -> Option<&FlowNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn edge_between(&self, source: &str, target: &str) -> Option<&FlowEdge> {
        self.edges
            .iter()
            .find(|e| e.source == source && e.target == target)
    }
}

/// Generate an edge ID from source and target node IDs.
pub fn make_edge_id(source: &str, target: &str) -> String {
    format!("edge-{}-{}", source, target)
}

/// Generate the next free node ID among `ids`: "node-{N}" with N one past
/// the highest existing "node-N".
pub fn next_node_id<'a>(ids: impl IntoIterator<Item = &'a str>) -> String {
    let max = ids
        .into_iter()
        .filter_map(|id| id.strip_prefix("node-").and_then(|s| s.parse::<u64>().ok()))
        .max()
        .unwrap_or(0);
    format!("node-{}", max + 1)
}
