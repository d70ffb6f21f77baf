pub mod catalog;
pub mod diagnostics;
pub mod document;
pub mod error;
pub mod graph;
pub mod layout;
pub mod lower;
pub mod raise;
pub mod store;

use std::fs;
use std::path::{Path, PathBuf};

pub use diagnostics::{Decoded, Diagnostic};
pub use document::{
    decode_document, Condition, ConditionGroup, Operation, Operator, Rating, RuleDocument,
    ScoreAdjustment, YearsRange,
};
pub use error::{StorageError, StoreError};
pub use graph::{FlowEdge, FlowGraph, FlowNode, NodeData, NodeKind, Position};
pub use layout::LayoutConfig;
pub use lower::{lower, Lowered};
pub use raise::{raise, Raised};
pub use store::{EdgeChange, GraphStore, NodeChange};

/// Parse rule document text and decode it leniently.
pub fn parse_document(text: &str) -> Result<Decoded<RuleDocument>, StorageError> {
    let value: serde_json::Value = serde_json::from_str(text)?;
    Ok(decode_document(&value))
}

// --- Storage ---

const FLOW_EXT: &str = ".flow";
const SETTINGS_FILE: &str = "settings.json";

/// Resolve the data directory: `$CREDITFLOW_HOME`, else `~/.creditflow/`.
pub fn data_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os("CREDITFLOW_HOME") {
        return PathBuf::from(dir);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".creditflow")
}

fn flow_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}{FLOW_EXT}"))
}

/// List all stored flow names (without extension), sorted.
pub fn list_flows() -> Result<Vec<String>, StorageError> {
    list_flows_in(&data_dir())
}

pub fn list_flows_in(dir: &Path) -> Result<Vec<String>, StorageError> {
    if !dir.exists() {
        return Ok(vec![]);
    }
    let mut names: Vec<String> = fs::read_dir(dir)?
        .filter_map(|entry| {
            let entry = entry.ok()?;
            let name = entry.file_name().to_string_lossy().to_string();
            name.strip_suffix(FLOW_EXT).map(|n| n.to_string())
        })
        .collect();
    names.sort();
    Ok(names)
}

pub fn read_graph(name: &str) -> Result<FlowGraph, StorageError> {
    read_graph_from(&data_dir(), name)
}

pub fn read_graph_from(dir: &Path, name: &str) -> Result<FlowGraph, StorageError> {
    let path = flow_path(dir, name);
    if !path.exists() {
        return Err(StorageError::NotFound(name.to_string()));
    }
    let raw = fs::read_to_string(&path)?;
    Ok(serde_json::from_str(&raw)?)
}

pub fn write_graph(name: &str, graph: &FlowGraph) -> Result<(), StorageError> {
    write_graph_to(&data_dir(), name, graph)
}

/// Write a graph atomically (temp file + rename) so watchers never see a
/// half-written file.
pub fn write_graph_to(dir: &Path, name: &str, graph: &FlowGraph) -> Result<(), StorageError> {
    fs::create_dir_all(dir)?;
    let json = serde_json::to_string_pretty(graph)?;
    let tmp = dir.join(format!(".{name}{FLOW_EXT}.tmp"));
    fs::write(&tmp, json)?;
    fs::rename(&tmp, flow_path(dir, name))?;
    Ok(())
}

pub fn delete_flow(name: &str) -> Result<(), StorageError> {
    delete_flow_in(&data_dir(), name)
}

pub fn delete_flow_in(dir: &Path, name: &str) -> Result<(), StorageError> {
    let path = flow_path(dir, name);
    if !path.exists() {
        return Err(StorageError::NotFound(name.to_string()));
    }
    fs::remove_file(&path)?;
    Ok(())
}

// --- Settings ---

/// Layout settings, falling back to defaults when the file is missing or
/// unreadable.
pub fn read_layout() -> LayoutConfig {
    read_layout_from(&data_dir())
}

pub fn read_layout_from(dir: &Path) -> LayoutConfig {
    let path = dir.join(SETTINGS_FILE);
    if !path.exists() {
        return LayoutConfig::default();
    }
    fs::read_to_string(&path)
        .ok()
        .and_then(|s| {
            serde_json::from_str(&s)
                .map_err(|e| tracing::warn!(path = %path.display(), "ignoring settings: {e}"))
                .ok()
        })
        .unwrap_or_default()
}

pub fn write_layout(layout: &LayoutConfig) -> Result<(), StorageError> {
    write_layout_to(&data_dir(), layout)
}

pub fn write_layout_to(dir: &Path, layout: &LayoutConfig) -> Result<(), StorageError> {
    fs::create_dir_all(dir)?;
    let json = serde_json::to_string_pretty(layout)?;
    fs::write(dir.join(SETTINGS_FILE), json)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn graphs_round_trip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let graph = lower(&catalog::sample_document(), &LayoutConfig::default()).graph;

        write_graph_to(dir.path(), "sample", &graph).unwrap();
        write_graph_to(dir.path(), "empty", &FlowGraph::default()).unwrap();

        assert_eq!(list_flows_in(dir.path()).unwrap(), vec!["empty", "sample"]);
        assert_eq!(read_graph_from(dir.path(), "sample").unwrap(), graph);

        delete_flow_in(dir.path(), "empty").unwrap();
        assert!(matches!(
            delete_flow_in(dir.path(), "empty"),
            Err(StorageError::NotFound(_))
        ));
        assert!(matches!(
            read_graph_from(dir.path(), "empty"),
            Err(StorageError::NotFound(_))
        ));
        assert_eq!(list_flows_in(dir.path()).unwrap(), vec!["sample"]);
    }

    #[test]
    fn layout_settings_fill_missing_fields() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(read_layout_from(dir.path()), LayoutConfig::default());

        fs::write(dir.path().join(SETTINGS_FILE), r#"{"ratingSpacing": 260}"#).unwrap();
        let layout = read_layout_from(dir.path());
        assert_eq!(layout.rating_spacing, 260.0);
        assert_eq!(layout.bureau_columns, 3);

        fs::write(dir.path().join(SETTINGS_FILE), "not json").unwrap();
        assert_eq!(read_layout_from(dir.path()), LayoutConfig::default());
    }

    #[test]
    fn written_layout_is_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let layout = LayoutConfig {
            bureau_columns: 4,
            ..LayoutConfig::default()
        };
        write_layout_to(dir.path(), &layout).unwrap();
        assert_eq!(read_layout_from(dir.path()), layout);
    }

    #[test]
    fn parse_document_reports_bad_json() {
        assert!(matches!(parse_document("{"), Err(StorageError::Json(_))));
        let decoded = parse_document(r#"{"ratings": {"B": 3}}"#).unwrap();
        assert_eq!(decoded.diagnostics.len(), 1);
        assert!(decoded.value.ratings.contains_key("B"));
    }
}
