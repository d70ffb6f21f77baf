use serde::{Deserialize, Serialize};
use std::fmt;

use crate::graph::NodeKind;

/// A recoverable problem found while decoding, lowering or raising.
///
/// Diagnostics never abort the operation that produced them; they travel next
/// to the partial result so callers can surface them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "code", rename_all = "camelCase")]
pub enum Diagnostic {
    /// A document subtree had the wrong shape and was treated as empty.
    MalformedDocument { path: String, message: String },
    /// A document entry lowers to a node id already taken by an earlier one;
    /// the entry and everything under it is skipped.
    IdCollision { path: String, id: String },
    /// No root node was found while raising.
    MissingRoot,
    /// A node hangs off a parent that cannot own its kind.
    #[serde(rename_all = "camelCase")]
    UnexpectedChild {
        node_id: String,
        kind: NodeKind,
        parent_id: String,
        parent_kind: NodeKind,
    },
    /// A node is not reachable from the root and was left out of the document.
    #[serde(rename_all = "camelCase")]
    Unreachable { node_id: String, kind: NodeKind },
    /// Two rating nodes carry the same label; the later one is skipped.
    #[serde(rename_all = "camelCase")]
    DuplicateRating { label: String, node_id: String },
    /// A rating owns more than one common condition group.
    #[serde(rename_all = "camelCase")]
    ExtraConditionGroup { rating: String, node_id: String },
    /// A rating owns two groups for the same bureau; the later one is skipped.
    #[serde(rename_all = "camelCase")]
    DuplicateBureau {
        rating: String,
        bureau: String,
        node_id: String,
    },
    /// An edge references a node that does not exist.
    #[serde(rename_all = "camelCase")]
    DanglingEdge { edge_id: String },
}

impl Diagnostic {
    pub fn malformed(path: &str, message: impl Into<String>) -> Self {
        Diagnostic::MalformedDocument {
            path: path.to_string(),
            message: message.into(),
        }
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, Diagnostic::MalformedDocument { .. })
    }

    /// Whether this is a structural-integrity warning raised while reading a graph.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Diagnostic::MissingRoot
                | Diagnostic::UnexpectedChild { .. }
                | Diagnostic::Unreachable { .. }
                | Diagnostic::DuplicateRating { .. }
                | Diagnostic::ExtraConditionGroup { .. }
                | Diagnostic::DuplicateBureau { .. }
                | Diagnostic::DanglingEdge { .. }
        )
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::MalformedDocument { path, message } => {
                write!(f, "malformed document at {path}: {message}")
            }
            Diagnostic::IdCollision { path, id } => {
                write!(f, "{path} lowers to id '{id}', which is already taken; skipped")
            }
            Diagnostic::MissingRoot => f.write_str("graph has no root node"),
            Diagnostic::UnexpectedChild {
                node_id,
                kind,
                parent_id,
                parent_kind,
            } => write!(
                f,
                "{kind} '{node_id}' cannot be a child of {parent_kind} '{parent_id}'"
            ),
            Diagnostic::Unreachable { node_id, kind } => {
                write!(f, "{kind} '{node_id}' is not connected to the root")
            }
            Diagnostic::DuplicateRating { label, node_id } => {
                write!(f, "rating '{label}' appears again at '{node_id}'")
            }
            Diagnostic::ExtraConditionGroup { rating, node_id } => {
                write!(f, "rating '{rating}' already has common conditions; ignoring '{node_id}'")
            }
            Diagnostic::DuplicateBureau {
                rating,
                bureau,
                node_id,
            } => write!(
                f,
                "rating '{rating}' already has a {bureau} group; ignoring '{node_id}'"
            ),
            Diagnostic::DanglingEdge { edge_id } => {
                write!(f, "edge '{edge_id}' points at a missing node")
            }
        }
    }
}

/// A decoded value plus everything that had to be patched over to get it.
#[derive(Debug, Clone)]
pub struct Decoded<T> {
    pub value: T,
    pub diagnostics: Vec<Diagnostic>,
}

impl<T> Decoded<T> {
    pub fn new(value: T, diagnostics: Vec<Diagnostic>) -> Self {
        Self { value, diagnostics }
    }
}
