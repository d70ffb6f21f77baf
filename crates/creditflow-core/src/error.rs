use std::io;

use thiserror::Error;

/// Rejected graph store operations. The store is left unchanged.
#[derive(Debug, Error, PartialEq)]
pub enum StoreError {
    #[error("node '{0}' not found")]
    UnknownNode(String),
    #[error("edge '{0}' not found")]
    UnknownEdge(String),
    #[error("id '{0}' is already in use")]
    DuplicateId(String),
    #[error("cannot connect '{0}' to itself")]
    SelfLoop(String),
    #[error("invalid data for node '{node_id}': {message}")]
    InvalidPatch { node_id: String, message: String },
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("flow '{0}' not found")]
    NotFound(String),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
