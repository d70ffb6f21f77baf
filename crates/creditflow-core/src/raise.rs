//! Raising: positioned graph back to a rule document.
//!
//! The walk follows edges from the root, never ids or `parentRef`, so nodes
//! reconnected by hand re-serialize under their new parent. Siblings are read
//! back in positional order.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use tracing::warn;

use crate::catalog;
use crate::diagnostics::Diagnostic;
use crate::document::{Condition, ConditionGroup, Rating, RuleDocument};
use crate::graph::{ConditionData, FlowEdge, FlowNode, NodeData, NodeKind};

/// Output of [`raise`]: the recovered document plus structural warnings.
#[derive(Debug, Clone, Default)]
pub struct Raised {
    pub document: RuleDocument,
    pub diagnostics: Vec<Diagnostic>,
}

pub fn raise<'a>(
    nodes: impl IntoIterator<Item = &'a FlowNode>,
    edges: impl IntoIterator<Item = &'a FlowEdge>,
) -> Raised {
    let nodes: Vec<&FlowNode> = nodes.into_iter().collect();
    let mut walk = Walk::new(&nodes, edges);

    let roots: Vec<&FlowNode> = nodes
        .iter()
        .copied()
        .filter(|n| n.kind() == NodeKind::Root)
        .collect();
    if roots.is_empty() {
        walk.diagnostics.push(Diagnostic::MissingRoot);
    }

    let mut document = RuleDocument::default();
    for root in roots {
        walk.reached.insert(root.id.as_str());
        for child in walk.children(root, by_x_then_y) {
            let NodeData::Rating(data) = &child.data else {
                walk.unexpected(child, root);
                continue;
            };
            let rating = walk.rating(child);
            if document.ratings.contains_key(&data.rating) {
                walk.diagnostics.push(Diagnostic::DuplicateRating {
                    label: data.rating.clone(),
                    node_id: child.id.clone(),
                });
                continue;
            }
            document.ratings.insert(data.rating.clone(), rating);
        }
    }

    for node in &nodes {
        if !walk.reached.contains(node.id.as_str()) {
            walk.diagnostics.push(Diagnostic::Unreachable {
                node_id: node.id.clone(),
                kind: node.kind(),
            });
        }
    }

    if !walk.diagnostics.is_empty() {
        warn!(count = walk.diagnostics.len(), "raised graph with structural warnings");
    }

    Raised {
        document,
        diagnostics: walk.diagnostics,
    }
}

struct Walk<'a> {
    children: HashMap<&'a str, Vec<&'a FlowNode>>,
    reached: HashSet<&'a str>,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> Walk<'a> {
    fn new(nodes: &[&'a FlowNode], edges: impl IntoIterator<Item = &'a FlowEdge>) -> Self {
        let by_id: HashMap<&'a str, &'a FlowNode> =
            nodes.iter().map(|&n| (n.id.as_str(), n)).collect();
        let mut children: HashMap<&'a str, Vec<&'a FlowNode>> = HashMap::new();
        let mut diagnostics = Vec::new();

        for edge in edges {
            match (by_id.get(edge.source.as_str()), by_id.get(edge.target.as_str())) {
                (Some(&source), Some(&target)) => {
                    let list = children.entry(source.id.as_str()).or_default();
                    if !list.iter().any(|n| n.id == target.id) {
                        list.push(target);
                    }
                }
                _ => diagnostics.push(Diagnostic::DanglingEdge {
                    edge_id: edge.id.clone(),
                }),
            }
        }

        Self {
            children,
            reached: HashSet::new(),
            diagnostics,
        }
    }

    /// Children of `parent`, marked as reached and sorted with `order`.
    fn children(
        &mut self,
        parent: &FlowNode,
        order: fn(&FlowNode, &FlowNode) -> Ordering,
    ) -> Vec<&'a FlowNode> {
        let mut list = self
            .children
            .get(parent.id.as_str())
            .cloned()
            .unwrap_or_default();
        list.sort_by(|a, b| order(a, b));
        for n in list.iter().copied() {
            self.reached.insert(n.id.as_str());
        }
        list
    }

    fn unexpected(&mut self, child: &FlowNode, parent: &FlowNode) {
        self.diagnostics.push(Diagnostic::UnexpectedChild {
            node_id: child.id.clone(),
            kind: child.kind(),
            parent_id: parent.id.clone(),
            parent_kind: parent.kind(),
        });
    }

    fn rating(&mut self, node: &'a FlowNode) -> Rating {
        let label = match &node.data {
            NodeData::Rating(data) => data.rating.as_str(),
            _ => "",
        };
        let mut rating = Rating {
            score_adjustment: match &node.data {
                NodeData::Rating(data) => data.score_adjustment.clone(),
                _ => Vec::new(),
            },
            ..Default::default()
        };

        for child in self.children(node, by_bureau_then_row) {
            match &child.data {
                NodeData::ConditionGroup(data) => {
                    let group = ConditionGroup {
                        operation: data.operation,
                        values: self.conditions(child),
                    };
                    if rating.common_conditions.is_some() {
                        self.diagnostics.push(Diagnostic::ExtraConditionGroup {
                            rating: label.to_string(),
                            node_id: child.id.clone(),
                        });
                    } else {
                        rating.common_conditions = Some(group);
                    }
                }
                NodeData::BureauGroup(data) => {
                    let group = ConditionGroup {
                        operation: data.operation,
                        values: self.conditions(child),
                    };
                    if rating.bureau_groups.contains_key(&data.bureau) {
                        self.diagnostics.push(Diagnostic::DuplicateBureau {
                            rating: label.to_string(),
                            bureau: data.bureau.clone(),
                            node_id: child.id.clone(),
                        });
                    } else {
                        rating.bureau_groups.insert(data.bureau.clone(), group);
                    }
                }
                _ => self.unexpected(child, node),
            }
        }
        rating
    }

    fn conditions(&mut self, group: &'a FlowNode) -> Vec<Condition> {
        let mut out = Vec::new();
        for child in self.children(group, by_x_then_y) {
            match &child.data {
                NodeData::Condition(data) | NodeData::ScoreCondition(data)
                    if group.kind().accepts_child(child.kind()) =>
                {
                    out.push(condition(data));
                }
                _ => self.unexpected(child, group),
            }
        }
        out
    }
}

fn condition(data: &ConditionData) -> Condition {
    Condition {
        name: data.name.clone(),
        description: data.description.clone(),
        value: data.value,
        operator: data.operator,
        apply_score_adjustment: data.apply_score_adjustment,
    }
}

fn by_x_then_y(a: &FlowNode, b: &FlowNode) -> Ordering {
    a.position
        .x
        .total_cmp(&b.position.x)
        .then(a.position.y.total_cmp(&b.position.y))
}

/// Common conditions first, then bureaus in canonical order, then other
/// bureaus row by row as laid out on the grid.
fn by_bureau_then_row(a: &FlowNode, b: &FlowNode) -> Ordering {
    fn rank(n: &FlowNode) -> usize {
        match &n.data {
            NodeData::ConditionGroup(_) => 0,
            NodeData::BureauGroup(data) => {
                let unknown = catalog::CANONICAL_BUREAUS.len() + 1;
                catalog::bureau_rank(&data.bureau).map_or(unknown, |r| r + 1)
            }
            _ => usize::MAX,
        }
    }
    rank(a)
        .cmp(&rank(b))
        .then(a.position.y.total_cmp(&b.position.y))
        .then(a.position.x.total_cmp(&b.position.x))
}
