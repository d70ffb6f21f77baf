//! Lowering: rule document to positioned graph.

use std::collections::HashSet;

use tracing::warn;

use crate::catalog::{self, CHILD_EDGE_COLOR, COMMON_GROUP_LABEL, ROOT_EDGE_COLOR, ROOT_LABEL};
use crate::diagnostics::Diagnostic;
use crate::document::{Condition, ConditionGroup, Rating, RuleDocument};
use crate::graph::{
    BureauData, ConditionData, ConditionGroupData, FlowEdge, FlowGraph, FlowNode, NodeData,
    Position, RatingData, RootData,
};
use crate::layout::LayoutConfig;

pub const ROOT_ID: &str = "root";

/// Output of [`lower`]: the graph plus anything worth reporting.
#[derive(Debug, Clone, Default)]
pub struct Lowered {
    pub graph: FlowGraph,
    pub diagnostics: Vec<Diagnostic>,
}

pub fn rating_node_id(label: &str) -> String {
    format!("rating-{}", label.to_lowercase())
}

pub fn common_group_id(label: &str) -> String {
    format!("{}-common", label.to_lowercase())
}

pub fn bureau_group_id(label: &str, bureau: &str) -> String {
    format!("{}-{}", label.to_lowercase(), bureau)
}

/// Id of the `index`-th (zero-based) child of `group_id`. Child ids count from 1.
pub fn child_id(group_id: &str, index: usize) -> String {
    format!("{}-{}", group_id, index + 1)
}

/// Bureau keys of `rating` in layout order: canonical bureaus first, then the
/// rest in document order.
pub fn ordered_bureaus(rating: &Rating) -> Vec<&str> {
    let mut keys: Vec<&str> = catalog::CANONICAL_BUREAUS
        .iter()
        .copied()
        .filter(|b| rating.bureau_groups.contains_key(*b))
        .collect();
    keys.extend(
        rating
            .bureau_groups
            .keys()
            .map(|k| k.as_str())
            .filter(|k| catalog::bureau_rank(k).is_none()),
    );
    keys
}

/// Lower `doc` into a node/edge graph. Pure and deterministic: the same
/// document and layout always give the same ids, data and positions.
pub fn lower(doc: &RuleDocument, layout: &LayoutConfig) -> Lowered {
    let mut builder = Builder::default();

    builder.node(
        "$",
        ROOT_ID.to_string(),
        layout.anchor,
        NodeData::Root(RootData {
            label: ROOT_LABEL.to_string(),
            ..Default::default()
        }),
        None,
    );

    let count = doc.ratings.len();
    for (index, (label, rating)) in doc.ratings.iter().enumerate() {
        let x = layout.rating_x(index, count);
        lower_rating(&mut builder, layout, label, rating, x);
    }

    Lowered {
        graph: FlowGraph {
            nodes: builder.nodes,
            edges: builder.edges,
        },
        diagnostics: builder.diagnostics,
    }
}

fn lower_rating(
    b: &mut Builder,
    layout: &LayoutConfig,
    label: &str,
    rating: &Rating,
    x: f64,
) {
    let path = format!("ratings.{label}");
    let rating_id = rating_node_id(label);
    let color = catalog::rating_color(label);
    let placed = b.node(
        &path,
        rating_id.clone(),
        Position::new(x, layout.rating_y),
        NodeData::Rating(RatingData {
            label: format!("Rating {label}"),
            rating: label.to_string(),
            description: catalog::rating_description(label).to_string(),
            color: color.to_string(),
            score_adjustment: rating.score_adjustment.clone(),
            ..Default::default()
        }),
        Some(ROOT_ID),
    );
    if !placed {
        return;
    }
    let rating_id = rating_id.as_str();
    b.edge(ROOT_ID, rating_id, ROOT_EDGE_COLOR);

    let mut cursor = layout.rating_y + layout.group_offset;

    if let Some(group) = &rating.common_conditions {
        let group_path = format!("{path}.common_conditions");
        let group_id = common_group_id(label);
        let at = Position::new(x, cursor);
        let placed = b.node(
            &group_path,
            group_id.clone(),
            at,
            NodeData::ConditionGroup(ConditionGroupData {
                label: COMMON_GROUP_LABEL.to_string(),
                operation: group.operation,
                ..Default::default()
            }),
            Some(rating_id),
        );
        let count = group.values.len();
        if placed {
            b.edge(rating_id, &group_id, color);
            for (j, condition) in group.values.iter().enumerate() {
                let id = child_id(&group_id, j);
                if b.node(
                    &format!("{group_path}.values[{j}]"),
                    id.clone(),
                    layout.condition_position(at, j, count),
                    NodeData::Condition(condition_data(condition)),
                    Some(&group_id),
                ) {
                    b.edge(&group_id, &id, CHILD_EDGE_COLOR);
                }
            }
        }

        cursor += layout.common_block_height(count);
    }

    let bureaus: Vec<(&str, &ConditionGroup)> = ordered_bureaus(rating)
        .into_iter()
        .filter_map(|key| rating.bureau_groups.get(key).map(|group| (key, group)))
        .collect();
    let score_counts: Vec<usize> = bureaus.iter().map(|(_, g)| g.values.len()).collect();
    let spots = layout.bureau_positions(x, cursor, &score_counts);
    for ((bureau, group), at) in bureaus.into_iter().zip(spots) {
        lower_bureau(b, layout, label, rating_id, color, bureau, group, at);
    }
}

#[allow(clippy::too_many_arguments)]
fn lower_bureau(
    b: &mut Builder,
    layout: &LayoutConfig,
    label: &str,
    rating_id: &str,
    color: &str,
    bureau: &str,
    group: &ConditionGroup,
    at: Position,
) {
    let path = format!("ratings.{label}.{bureau}");
    let group_id = bureau_group_id(label, bureau);
    let placed = b.node(
        &path,
        group_id.clone(),
        at,
        NodeData::BureauGroup(BureauData {
            label: catalog::bureau_label(bureau),
            bureau: bureau.to_string(),
            operation: group.operation,
            ..Default::default()
        }),
        Some(rating_id),
    );
    if !placed {
        return;
    }
    b.edge(rating_id, &group_id, color);

    for (k, condition) in group.values.iter().enumerate() {
        let id = child_id(&group_id, k);
        if b.node(
            &format!("{path}.values[{k}]"),
            id.clone(),
            layout.score_position(at, k),
            NodeData::ScoreCondition(condition_data(condition)),
            Some(&group_id),
        ) {
            b.edge(&group_id, &id, CHILD_EDGE_COLOR);
        }
    }
}

fn condition_data(condition: &Condition) -> ConditionData {
    ConditionData {
        name: condition.name.clone(),
        description: condition.description.clone(),
        value: condition.value,
        operator: condition.operator,
        apply_score_adjustment: condition.apply_score_adjustment,
        ..Default::default()
    }
}

/// Collects nodes and edges, keeping every emitted id unique.
#[derive(Default)]
struct Builder {
    nodes: Vec<FlowNode>,
    edges: Vec<FlowEdge>,
    diagnostics: Vec<Diagnostic>,
    node_ids: HashSet<String>,
    edge_ids: HashSet<String>,
}

impl Builder {
    /// Emit a node for the document entry at `path`. Returns false, and
    /// reports the collision, when `id` is already taken.
    fn node(
        &mut self,
        path: &str,
        id: String,
        position: Position,
        data: NodeData,
        parent: Option<&str>,
    ) -> bool {
        if !self.node_ids.insert(id.clone()) {
            warn!(path, id = %id, "node id collision, skipping");
            self.diagnostics.push(Diagnostic::IdCollision {
                path: path.to_string(),
                id,
            });
            return false;
        }
        self.nodes.push(FlowNode {
            id,
            position,
            data,
            parent_ref: parent.map(str::to_string),
        });
        true
    }

    /// Node ids are unique but `edge-{source}-{target}` can still repeat when
    /// ids contain dashes, so later edges get a numeric suffix.
    fn edge(&mut self, source: &str, target: &str, stroke: &str) {
        let mut edge = FlowEdge::new(source, target, stroke);
        let base = edge.id.clone();
        let mut n = 2;
        while !self.edge_ids.insert(edge.id.clone()) {
            edge.id = format!("{base}-{n}");
            n += 1;
        }
        self.edges.push(edge);
    }
}
