use std::collections::{BTreeMap, BTreeSet};

use creditflow_core::catalog::sample_document;
use creditflow_core::{
    decode_document, lower, raise, FlowGraph, GraphStore, LayoutConfig, NodeKind, RuleDocument,
};
use pretty_assertions::assert_eq;
use serde_json::json;

fn wide_document() -> RuleDocument {
    let decoded = decode_document(&json!({
        "ratings": {
            "B": {
                "common_conditions": {
                    "operation": "OR",
                    "values": [
                        {"name": "years_in_business", "value": 3, "operator": ">="},
                        {"name": "number_of_trades", "value": 4, "operator": ">"},
                        {"name": "total_trades_amount", "value": 150000.5, "operator": ">="},
                        {"name": "derogatory_marks", "value": 0, "operator": "=", "description": "Public derogatory records"},
                        {"name": "days_beyond_terms", "value": 30, "operator": "<", "apply_score_adjustment": false}
                    ]
                },
                "score_adjustment": [
                    {"years_range": {"begin": 0, "end": 4}, "score_to_subtract": 0, "string": "None."},
                    {"years_range": {"begin": 5, "end": 9}, "score_to_subtract": 2.5, "string": "Small."}
                ],
                "creditsafe": {"operation": "AND", "values": [
                    {"name": "risk_score", "value": 60, "operator": ">="}
                ]},
                "equifax": {"operation": "OR", "values": [
                    {"name": "commercial_score", "value": 500, "operator": ">=", "apply_score_adjustment": true},
                    {"name": "failure_score", "value": 1200, "operator": ">="}
                ]},
                "experian": {"operation": "AND", "values": []},
                "paynet": {"operation": "AND", "values": [
                    {"name": "master_score", "value": 640, "operator": ">=", "apply_score_adjustment": true}
                ]},
                "dnb": {"operation": "AND", "values": [
                    {"name": "paydex_score", "value": 60, "operator": ">="}
                ]}
            },
            "C": {
                "paynet": {"operation": "AND", "values": []}
            },
            "D": {}
        }
    }));
    assert!(decoded.diagnostics.is_empty(), "{:?}", decoded.diagnostics);
    decoded.value
}

fn assert_same_order(a: &RuleDocument, b: &RuleDocument) {
    assert_eq!(a.labels().collect::<Vec<_>>(), b.labels().collect::<Vec<_>>());
}

#[test]
fn lowering_twice_is_identical() {
    let layout = LayoutConfig::default();
    for doc in [sample_document(), wide_document()] {
        let first = lower(&doc, &layout);
        let second = lower(&doc, &layout);
        assert_eq!(first.graph, second.graph);
        assert!(first.diagnostics.is_empty());
    }
}

#[test]
fn raise_inverts_lower() {
    let layout = LayoutConfig::default();
    for doc in [sample_document(), wide_document()] {
        let graph = lower(&doc, &layout).graph;
        let raised = raise(&graph.nodes, &graph.edges);
        assert!(raised.diagnostics.is_empty(), "{:?}", raised.diagnostics);
        assert_eq!(raised.document, doc);
        assert_same_order(&raised.document, &doc);
    }
}

#[test]
fn round_trip_survives_persisted_json() {
    let doc = wide_document();
    let graph = lower(&doc, &LayoutConfig::default()).graph;
    let text = serde_json::to_string(&graph).unwrap();
    let reloaded: FlowGraph = serde_json::from_str(&text).unwrap();

    let store = GraphStore::from_graph(reloaded);
    assert_eq!(store.raise().document, doc);

    let doc_text = serde_json::to_value(&store.raise().document).unwrap();
    let again = decode_document(&doc_text);
    assert!(again.diagnostics.is_empty());
    assert_eq!(again.value, doc);
}

#[test]
fn ids_depend_on_labels_not_positions() {
    let layout = LayoutConfig::default();
    let doc = sample_document();
    let mut swapped = RuleDocument::default();
    for label in ["A", "AA"] {
        swapped
            .ratings
            .insert(label.to_string(), doc.ratings[label].clone());
    }

    let a = lower(&doc, &layout).graph;
    let b = lower(&swapped, &layout).graph;

    let ids = |g: &FlowGraph| g.nodes.iter().map(|n| n.id.clone()).collect::<BTreeSet<_>>();
    assert_eq!(ids(&a), ids(&b));

    let x = |g: &FlowGraph, id: &str| g.node(id).unwrap().position.x;
    assert_eq!(x(&a, "rating-aa"), x(&b, "rating-a"));
    assert_eq!(x(&a, "rating-a"), x(&b, "rating-aa"));

    let raised = raise(&b.nodes, &b.edges).document;
    assert_same_order(&raised, &swapped);
}

#[test]
fn every_lowered_node_has_one_parent_edge() {
    let graph = lower(&wide_document(), &LayoutConfig::default()).graph;
    let mut incoming: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for edge in &graph.edges {
        incoming.entry(edge.target.as_str()).or_default().push(edge.source.as_str());
    }

    for node in &graph.nodes {
        match node.kind() {
            NodeKind::Root => assert!(!incoming.contains_key(node.id.as_str())),
            _ => {
                let parents = &incoming[node.id.as_str()];
                assert_eq!(parents.len(), 1, "{}", node.id);
                assert_eq!(Some(parents[0]), node.parent_ref.as_deref());
            }
        }
    }
}

#[test]
fn bureaus_fill_a_three_column_grid() {
    let graph = lower(&wide_document(), &LayoutConfig::default()).graph;
    let order = ["b-paynet", "b-dnb", "b-experian", "b-equifax", "b-creditsafe"];
    let positions: Vec<(f64, f64)> = order
        .iter()
        .map(|id| {
            let p = graph.node(id).unwrap().position;
            (p.x, p.y)
        })
        .collect();

    assert_eq!(positions[0].1, positions[1].1);
    assert_eq!(positions[1].1, positions[2].1);
    assert!(positions[0].0 < positions[1].0 && positions[1].0 < positions[2].0);
    assert_eq!(positions[3].0, positions[0].0);
    assert_eq!(positions[4].0, positions[1].0);
    assert!(positions[3].1 > positions[0].1);

    let first = graph.node("b-equifax-1").unwrap().position;
    let second = graph.node("b-equifax-2").unwrap().position;
    assert_eq!(first.x, second.x);
    assert!(second.y > first.y);
}
