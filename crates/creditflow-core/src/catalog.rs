//! Display tables shared by the compiler and the editing surface: bureau
//! ordering and labels, rating presentation, node templates and the sample
//! rule set.

use serde_json::json;

use crate::document::{Operation, Operator, RuleDocument};
use crate::graph::{
    BureauData, ConditionData, ConditionGroupData, NodeData, NodeKind, RatingData, RootData,
};

/// Recognized bureaus in canonical layout order. Other keys follow in
/// document order.
pub const CANONICAL_BUREAUS: [&str; 4] = ["paynet", "dnb", "experian", "equifax"];

pub const ROOT_LABEL: &str = "Credit Rating Rules";
pub const COMMON_GROUP_LABEL: &str = "Common Conditions";

pub const DEFAULT_COLOR: &str = "#64748b";
pub const ROOT_EDGE_COLOR: &str = "#94a3b8";
pub const CHILD_EDGE_COLOR: &str = "#64748b";

/// Position of `key` in the canonical bureau order, if recognized.
pub fn bureau_rank(key: &str) -> Option<usize> {
    CANONICAL_BUREAUS.iter().position(|b| *b == key)
}

pub fn bureau_label(key: &str) -> String {
    match key {
        "paynet" => "PayNet".to_string(),
        "dnb" => "Dun & Bradstreet".to_string(),
        "experian" => "Experian".to_string(),
        "equifax" => "Equifax".to_string(),
        other => other.to_string(),
    }
}

pub fn rating_description(label: &str) -> &'static str {
    match label {
        "AA" => "Prime",
        "A" => "Strong",
        "B" => "Good",
        "C" => "Fair",
        "D" => "Poor",
        _ => "Custom",
    }
}

pub fn rating_color(label: &str) -> &'static str {
    match label {
        "AA" => "#15803d",
        "A" => "#65a30d",
        "B" => "#ca8a04",
        "C" => "#ea580c",
        "D" => "#dc2626",
        _ => DEFAULT_COLOR,
    }
}

/// Payload for a freshly inserted node of `kind`, as offered by the palette.
pub fn template(kind: NodeKind) -> NodeData {
    match kind {
        NodeKind::Root => NodeData::Root(RootData {
            label: ROOT_LABEL.to_string(),
            ..Default::default()
        }),
        NodeKind::Rating => NodeData::Rating(RatingData {
            label: "New Rating".to_string(),
            rating: "Custom".to_string(),
            description: "Custom Rating".to_string(),
            color: DEFAULT_COLOR.to_string(),
            ..Default::default()
        }),
        NodeKind::ConditionGroup => NodeData::ConditionGroup(ConditionGroupData {
            label: "Condition Group".to_string(),
            operation: Operation::And,
            ..Default::default()
        }),
        NodeKind::Condition => NodeData::Condition(ConditionData {
            name: "custom_condition".to_string(),
            description: Some("Custom condition".to_string()),
            value: 0.0,
            operator: Operator::Gte,
            ..Default::default()
        }),
        NodeKind::BureauGroup => NodeData::BureauGroup(BureauData {
            label: "Bureau".to_string(),
            bureau: "custom".to_string(),
            operation: Operation::And,
            ..Default::default()
        }),
        NodeKind::ScoreCondition => NodeData::ScoreCondition(ConditionData {
            name: "custom_score".to_string(),
            value: 0.0,
            operator: Operator::Gte,
            apply_score_adjustment: Some(false),
            ..Default::default()
        }),
    }
}

/// The sample rule set loaded by "Load sample".
pub fn sample_document() -> RuleDocument {
    let raw = json!({
        "ratings": {
            "AA": {
                "common_conditions": {
                    "operation": "AND",
                    "values": [
                        {
                            "name": "years_in_business",
                            "description": "Years in business of the business",
                            "value": 7,
                            "operator": ">="
                        },
                        {
                            "name": "number_of_trades",
                            "description": "Number of trades of the business",
                            "value": 10,
                            "operator": ">="
                        },
                        {
                            "name": "total_trades_amount",
                            "description": "High Credit Amount coming from the bureaus (Cents)",
                            "value": 2500000,
                            "operator": ">="
                        }
                    ]
                },
                "score_adjustment": [
                    {
                        "years_range": {"begin": 0, "end": 9},
                        "score_to_subtract": 0,
                        "string": "No adjustment to bureau threshold scores."
                    },
                    {
                        "years_range": {"begin": 10, "end": 14},
                        "score_to_subtract": 5,
                        "string": "For businesses operating 10 to 14 years, score thresholds except Paydex are reduced by 5 points."
                    }
                ],
                "paynet": {
                    "operation": "AND",
                    "values": [
                        {"name": "master_score", "apply_score_adjustment": true, "value": 700, "operator": ">="}
                    ]
                }
            },
            "A": {
                "common_conditions": {
                    "operation": "AND",
                    "values": [
                        {
                            "name": "years_in_business",
                            "description": "Years in business of the business",
                            "value": 5,
                            "operator": ">="
                        },
                        {
                            "name": "number_of_trades",
                            "description": "Number of trades of the business",
                            "value": 5,
                            "operator": ">="
                        }
                    ]
                },
                "dnb": {
                    "operation": "AND",
                    "values": [
                        {"name": "paydex_score", "apply_score_adjustment": false, "value": 70, "operator": ">="},
                        {"name": "ccs_percentile", "apply_score_adjustment": false, "value": 70, "operator": ">="}
                    ]
                }
            }
        }
    });
    crate::document::decode_document(&raw).value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_decodes_cleanly() {
        let raw = serde_json::to_value(sample_document()).unwrap();
        let decoded = crate::document::decode_document(&raw);
        assert!(decoded.diagnostics.is_empty());
        assert_eq!(decoded.value.labels().collect::<Vec<_>>(), vec!["AA", "A"]);
        assert_eq!(decoded.value.ratings["AA"].score_adjustment.len(), 2);
    }

    #[test]
    fn templates_match_their_kind() {
        let kinds = [
            NodeKind::Root,
            NodeKind::Rating,
            NodeKind::ConditionGroup,
            NodeKind::Condition,
            NodeKind::BureauGroup,
            NodeKind::ScoreCondition,
        ];
        for kind in kinds {
            assert_eq!(template(kind).kind(), kind);
        }
    }

    #[test]
    fn unknown_bureaus_keep_raw_label() {
        assert_eq!(bureau_label("dnb"), "Dun & Bradstreet");
        assert_eq!(bureau_label("creditsafe"), "creditsafe");
        assert_eq!(bureau_rank("experian"), Some(2));
        assert_eq!(bureau_rank("creditsafe"), None);
    }
}
