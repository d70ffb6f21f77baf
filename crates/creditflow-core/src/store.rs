//! Mutable node/edge store seeded from a lowered document and edited in place.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::catalog;
use crate::diagnostics::Diagnostic;
use crate::document::RuleDocument;
use crate::error::StoreError;
use crate::graph::{
    make_edge_id, next_node_id, FlowEdge, FlowGraph, FlowNode, NodeKind, Position,
};
use crate::layout::LayoutConfig;
use crate::lower::lower;
use crate::raise::{raise, Raised};

/// A node delta as emitted by the canvas.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum NodeChange {
    Position { id: String, position: Position },
    Remove { id: String },
    Add { item: FlowNode },
    Replace { id: String, item: FlowNode },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EdgeChange {
    Remove { id: String },
    Add { item: FlowEdge },
    Replace { id: String, item: FlowEdge },
}

/// The graph being edited. Owned by exactly one session; a re-import
/// replaces everything rather than merging.
#[derive(Debug, Clone, Default)]
pub struct GraphStore {
    nodes: IndexMap<String, FlowNode>,
    edges: IndexMap<String, FlowEdge>,
}

impl GraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_graph(graph: FlowGraph) -> Self {
        let mut store = Self::new();
        store.replace_all(graph.nodes, graph.edges);
        store
    }

    pub fn from_document(doc: &RuleDocument, layout: &LayoutConfig) -> (Self, Vec<Diagnostic>) {
        let mut store = Self::new();
        let diagnostics = store.replace_from_document(doc, layout);
        (store, diagnostics)
    }

    /// Drop the current contents and reseed. Later duplicates of an id win.
    pub fn replace_all(&mut self, nodes: Vec<FlowNode>, edges: Vec<FlowEdge>) {
        self.nodes = nodes.into_iter().map(|n| (n.id.clone(), n)).collect();
        self.edges = edges.into_iter().map(|e| (e.id.clone(), e)).collect();
        debug!(nodes = self.nodes.len(), edges = self.edges.len(), "graph replaced");
    }

    pub fn replace_from_document(&mut self, doc: &RuleDocument, layout: &LayoutConfig) -> Vec<Diagnostic> {
        let lowered = lower(doc, layout);
        self.replace_all(lowered.graph.nodes, lowered.graph.edges);
        lowered.diagnostics
    }

    pub fn node(&self, id: &str) -> Option<&FlowNode> {
        self.nodes.get(id)
    }

    pub fn edge(&self, id: &str) -> Option<&FlowEdge> {
        self.edges.get(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &FlowNode> {
        self.nodes.values()
    }

    pub fn edges(&self) -> impl Iterator<Item = &FlowEdge> {
        self.edges.values()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn to_graph(&self) -> FlowGraph {
        FlowGraph {
            nodes: self.nodes.values().cloned().collect(),
            edges: self.edges.values().cloned().collect(),
        }
    }

    pub fn raise(&self) -> Raised {
        raise(self.nodes.values(), self.edges.values())
    }

    /// Apply canvas deltas. Changes naming unknown ids are skipped; returns
    /// how many were applied.
    pub fn apply_node_changes(&mut self, changes: impl IntoIterator<Item = NodeChange>) -> usize {
        let mut applied = 0;
        for change in changes {
            let ok = match change {
                NodeChange::Position { id, position } => self.move_node(&id, position).is_ok(),
                NodeChange::Remove { id } => self.delete_node(&id).is_ok(),
                NodeChange::Add { item } => {
                    let id = item.id.clone();
                    self.add_node(item).map_err(|e| warn!(id = %id, "{e}")).is_ok()
                }
                NodeChange::Replace { id, item } => match self.nodes.get_mut(&id) {
                    Some(node) if item.id == id => {
                        *node = item;
                        true
                    }
                    _ => false,
                },
            };
            applied += usize::from(ok);
        }
        applied
    }

    /// Edge adds and replacements follow the same endpoint rules as
    /// [`connect`](Self::connect); a change that breaks them is skipped.
    pub fn apply_edge_changes(&mut self, changes: impl IntoIterator<Item = EdgeChange>) -> usize {
        let mut applied = 0;
        for change in changes {
            let ok = match change {
                EdgeChange::Remove { id } => self.disconnect(&id).is_ok(),
                EdgeChange::Add { item } => {
                    let id = item.id.clone();
                    self.add_edge(item).map_err(|e| warn!(id = %id, "{e}")).is_ok()
                }
                EdgeChange::Replace { id, item } => {
                    if item.id != id || !self.edges.contains_key(&id) {
                        false
                    } else if let Err(e) = self.check_endpoints(&item.source, &item.target) {
                        warn!(id = %id, "{e}");
                        false
                    } else {
                        self.edges.insert(id, item);
                        true
                    }
                }
            };
            applied += usize::from(ok);
        }
        applied
    }

    /// Insert a node built from `kind`'s template with `initial` merged over
    /// it. Without an explicit id a fresh `node-N` id is generated.
    pub fn insert_node(
        &mut self,
        kind: NodeKind,
        initial: Option<&Map<String, Value>>,
        position: Position,
        id: Option<String>,
    ) -> Result<String, StoreError> {
        let id = id.unwrap_or_else(|| next_node_id(self.nodes.keys().map(|k| k.as_str())));
        let mut data = catalog::template(kind);
        if let Some(initial) = initial {
            data.merge(initial).map_err(|e| StoreError::InvalidPatch {
                node_id: id.clone(),
                message: e.to_string(),
            })?;
        }
        self.add_node(FlowNode {
            id: id.clone(),
            position,
            data,
            parent_ref: None,
        })?;
        Ok(id)
    }

    fn add_node(&mut self, node: FlowNode) -> Result<(), StoreError> {
        if self.nodes.contains_key(&node.id) {
            return Err(StoreError::DuplicateId(node.id));
        }
        debug!(id = %node.id, kind = %node.kind(), "node inserted");
        self.nodes.insert(node.id.clone(), node);
        Ok(())
    }

    /// Remove a node together with every edge touching it.
    pub fn delete_node(&mut self, id: &str) -> Result<FlowNode, StoreError> {
        let node = self
            .nodes
            .shift_remove(id)
            .ok_or_else(|| StoreError::UnknownNode(id.to_string()))?;
        self.edges.retain(|_, e| e.source != id && e.target != id);
        debug!(id, "node deleted");
        Ok(node)
    }

    pub fn move_node(&mut self, id: &str, position: Position) -> Result<(), StoreError> {
        let node = self
            .nodes
            .get_mut(id)
            .ok_or_else(|| StoreError::UnknownNode(id.to_string()))?;
        node.position = position;
        Ok(())
    }

    /// Merge `partial` into the node's data, replacing only the keys given.
    pub fn patch_node_data(&mut self, id: &str, partial: &Map<String, Value>) -> Result<(), StoreError> {
        let Some(node) = self.nodes.get_mut(id) else {
            debug!(id, "patch for unknown node ignored");
            return Err(StoreError::UnknownNode(id.to_string()));
        };
        node.data.merge(partial).map_err(|e| StoreError::InvalidPatch {
            node_id: id.to_string(),
            message: e.to_string(),
        })?;
        debug!(id, keys = partial.len(), "node data patched");
        Ok(())
    }

    /// Edges must join two distinct nodes that exist.
    fn check_endpoints(&self, source: &str, target: &str) -> Result<(), StoreError> {
        if source == target {
            warn!(source, "self-loop rejected");
            return Err(StoreError::SelfLoop(source.to_string()));
        }
        for end in [source, target] {
            if !self.nodes.contains_key(end) {
                return Err(StoreError::UnknownNode(end.to_string()));
            }
        }
        Ok(())
    }

    fn add_edge(&mut self, edge: FlowEdge) -> Result<(), StoreError> {
        if self.edges.contains_key(&edge.id) {
            return Err(StoreError::DuplicateId(edge.id));
        }
        self.check_endpoints(&edge.source, &edge.target)?;
        debug!(id = %edge.id, "edge added");
        self.edges.insert(edge.id.clone(), edge);
        Ok(())
    }

    /// Add an edge from `source` to `target` and return its id.
    pub fn connect(&mut self, source: &str, target: &str) -> Result<String, StoreError> {
        self.check_endpoints(source, target)?;

        let stroke = match self.nodes.get(source).map(FlowNode::kind) {
            Some(NodeKind::Root) => catalog::ROOT_EDGE_COLOR,
            _ => catalog::CHILD_EDGE_COLOR,
        };
        let mut edge = FlowEdge::new(source, target, stroke);
        let base = make_edge_id(source, target);
        let mut n = 2;
        while self.edges.contains_key(&edge.id) {
            edge.id = format!("{base}-{n}");
            n += 1;
        }

        let id = edge.id.clone();
        debug!(id = %id, "edge connected");
        self.edges.insert(id.clone(), edge);
        Ok(id)
    }

    pub fn disconnect(&mut self, edge_id: &str) -> Result<FlowEdge, StoreError> {
        let edge = self
            .edges
            .shift_remove(edge_id)
            .ok_or_else(|| StoreError::UnknownEdge(edge_id.to_string()))?;
        debug!(id = edge_id, "edge disconnected");
        Ok(edge)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Operation;
    use crate::graph::NodeData;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn sample_store() -> GraphStore {
        GraphStore::from_document(&catalog::sample_document(), &LayoutConfig::default()).0
    }

    fn obj(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn self_loop_is_rejected() {
        let mut store = sample_store();
        let before = store.to_graph().edges;
        assert_eq!(
            store.connect("rating-aa", "rating-aa"),
            Err(StoreError::SelfLoop("rating-aa".to_string()))
        );
        assert_eq!(store.to_graph().edges, before);
    }

    #[test]
    fn patch_on_missing_node_is_a_no_op() {
        let mut store = sample_store();
        let before = store.to_graph();
        let result = store.patch_node_data("nonexistent", &obj(json!({"value": 1})));
        assert_eq!(result, Err(StoreError::UnknownNode("nonexistent".to_string())));
        assert_eq!(store.to_graph(), before);
    }

    #[test]
    fn patch_merges_into_existing_data() {
        let mut store = sample_store();
        store
            .patch_node_data("aa-paynet", &obj(json!({"operation": "OR"})))
            .unwrap();
        let NodeData::BureauGroup(data) = &store.node("aa-paynet").unwrap().data else {
            panic!("expected a bureau");
        };
        assert_eq!(data.operation, Operation::Or);
        assert_eq!(data.bureau, "paynet");

        let raised = store.raise();
        assert_eq!(
            raised.document.ratings["AA"].bureau_groups["paynet"].operation,
            Operation::Or
        );
    }

    #[test]
    fn insert_generates_fresh_ids_and_rejects_duplicates() {
        let mut store = sample_store();
        let id = store
            .insert_node(NodeKind::Condition, None, Position::new(100.0, 100.0), None)
            .unwrap();
        assert_eq!(id, "node-1");
        let next = store
            .insert_node(
                NodeKind::ScoreCondition,
                Some(&obj(json!({"name": "fico", "value": 680}))),
                Position::default(),
                None,
            )
            .unwrap();
        assert_eq!(next, "node-2");

        let dup = store.insert_node(NodeKind::Rating, None, Position::default(), Some("root".to_string()));
        assert_eq!(dup, Err(StoreError::DuplicateId("root".to_string())));
    }

    #[test]
    fn connected_insert_round_trips() {
        let mut store = sample_store();
        let score = store
            .insert_node(
                NodeKind::ScoreCondition,
                Some(&obj(json!({"name": "fico", "value": 680, "operator": ">"}))),
                Position::new(200.0, 900.0),
                None,
            )
            .unwrap();
        store.connect("aa-paynet", &score).unwrap();

        let raised = store.raise();
        assert!(raised.diagnostics.is_empty(), "{:?}", raised.diagnostics);
        let names: Vec<&str> = raised.document.ratings["AA"].bureau_groups["paynet"]
            .values
            .iter()
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(names, vec!["master_score", "fico"]);
    }

    #[test]
    fn repeated_connect_gets_unique_ids() {
        let mut store = sample_store();
        let first = store.connect("rating-a", "aa-paynet").unwrap();
        let second = store.connect("rating-a", "aa-paynet").unwrap();
        assert_eq!(first, "edge-rating-a-aa-paynet");
        assert_eq!(second, "edge-rating-a-aa-paynet-2");
        assert_eq!(
            store.connect("rating-a", "ghost"),
            Err(StoreError::UnknownNode("ghost".to_string()))
        );
    }

    #[test]
    fn delete_node_drops_incident_edges() {
        let mut store = sample_store();
        let edges_before = store.edge_count();
        store.delete_node("a-dnb").unwrap();
        assert!(store.node("a-dnb").is_none());
        // rating -> bureau plus two bureau -> score edges
        assert_eq!(store.edge_count(), edges_before - 3);
        assert!(store.edges().all(|e| e.source != "a-dnb" && e.target != "a-dnb"));
    }

    #[test]
    fn node_changes_skip_unknown_ids() {
        let mut store = sample_store();
        let applied = store.apply_node_changes(vec![
            NodeChange::Position {
                id: "rating-aa".to_string(),
                position: Position::new(1.0, 2.0),
            },
            NodeChange::Position {
                id: "missing".to_string(),
                position: Position::new(1.0, 2.0),
            },
            NodeChange::Remove {
                id: "missing".to_string(),
            },
        ]);
        assert_eq!(applied, 1);
        assert_eq!(store.node("rating-aa").unwrap().position, Position::new(1.0, 2.0));
    }

    #[test]
    fn edge_changes_remove_and_add() {
        let mut store = sample_store();
        let removed = store.edge("edge-root-rating-aa").cloned().unwrap();
        let applied = store.apply_edge_changes(vec![
            EdgeChange::Remove {
                id: removed.id.clone(),
            },
            EdgeChange::Remove {
                id: "nope".to_string(),
            },
        ]);
        assert_eq!(applied, 1);
        assert!(!store.raise().document.ratings.contains_key("AA"));

        assert_eq!(store.apply_edge_changes(vec![EdgeChange::Add { item: removed }]), 1);
        assert!(store.raise().document.ratings.contains_key("AA"));
    }

    #[test]
    fn edge_changes_keep_the_self_loop_rule() {
        let mut store = sample_store();
        let before = store.edge_count();
        let applied = store.apply_edge_changes(vec![
            EdgeChange::Add {
                item: FlowEdge::new("rating-aa", "rating-aa", catalog::CHILD_EDGE_COLOR),
            },
            EdgeChange::Add {
                item: FlowEdge::new("rating-aa", "ghost", catalog::CHILD_EDGE_COLOR),
            },
            EdgeChange::Replace {
                id: "edge-root-rating-aa".to_string(),
                item: FlowEdge {
                    id: "edge-root-rating-aa".to_string(),
                    ..FlowEdge::new("root", "root", catalog::ROOT_EDGE_COLOR)
                },
            },
        ]);
        assert_eq!(applied, 0);
        assert_eq!(store.edge_count(), before);
        assert_eq!(store.edge("edge-root-rating-aa").unwrap().target, "rating-aa");
    }

    #[test]
    fn edge_replace_rewires_by_id() {
        let mut store = sample_store();
        let rewired = FlowEdge {
            id: "edge-rating-aa-aa-paynet".to_string(),
            ..FlowEdge::new("rating-a", "aa-paynet", catalog::CHILD_EDGE_COLOR)
        };
        let applied = store.apply_edge_changes(vec![
            EdgeChange::Replace {
                id: "edge-rating-aa-aa-paynet".to_string(),
                item: rewired.clone(),
            },
            EdgeChange::Replace {
                id: "edge-root-rating-a".to_string(),
                item: rewired.clone(),
            },
            EdgeChange::Replace {
                id: "missing".to_string(),
                item: FlowEdge {
                    id: "missing".to_string(),
                    ..rewired.clone()
                },
            },
        ]);
        assert_eq!(applied, 1);
        assert_eq!(store.edge("edge-rating-aa-aa-paynet"), Some(&rewired));

        let raised = store.raise();
        assert!(!raised.document.ratings["AA"].bureau_groups.contains_key("paynet"));
        assert!(raised.document.ratings["A"].bureau_groups.contains_key("paynet"));
    }

    #[test]
    fn node_add_and_replace_changes() {
        let mut store = sample_store();
        let fresh = FlowNode {
            id: "node-7".to_string(),
            position: Position::new(5.0, 5.0),
            data: catalog::template(NodeKind::Condition),
            parent_ref: None,
        };
        let clash = FlowNode {
            id: "rating-aa".to_string(),
            ..fresh.clone()
        };
        let applied = store.apply_node_changes(vec![
            NodeChange::Add { item: fresh.clone() },
            NodeChange::Add { item: clash },
        ]);
        assert_eq!(applied, 1);
        assert_eq!(store.node("node-7"), Some(&fresh));
        assert_eq!(store.node("rating-aa").unwrap().kind(), NodeKind::Rating);

        let moved = FlowNode {
            position: Position::new(50.0, 60.0),
            ..fresh.clone()
        };
        let applied = store.apply_node_changes(vec![
            NodeChange::Replace {
                id: "node-7".to_string(),
                item: moved.clone(),
            },
            NodeChange::Replace {
                id: "root".to_string(),
                item: moved.clone(),
            },
            NodeChange::Replace {
                id: "ghost".to_string(),
                item: FlowNode {
                    id: "ghost".to_string(),
                    ..moved.clone()
                },
            },
        ]);
        assert_eq!(applied, 1);
        assert_eq!(store.node("node-7"), Some(&moved));
        assert_eq!(store.node("root").unwrap().kind(), NodeKind::Root);
        assert!(store.node("ghost").is_none());
    }

    #[test]
    fn reimport_replaces_everything() {
        let mut store = sample_store();
        store
            .insert_node(NodeKind::Rating, None, Position::default(), None)
            .unwrap();
        let diagnostics = store.replace_from_document(&RuleDocument::default(), &LayoutConfig::default());
        assert!(diagnostics.is_empty());
        assert_eq!(store.node_count(), 1);
        assert_eq!(store.edge_count(), 0);
    }
}
