use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::graph::Position;

/// Layout constants for lowering. Changing them moves nodes but never
/// changes node ids.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct LayoutConfig {
    pub anchor: Position,
    pub rating_y: f64,
    /// Horizontal distance between neighbouring ratings.
    pub rating_spacing: f64,
    /// Vertical distance from a rating to its first section.
    pub group_offset: f64,
    /// Vertical distance from a group to its first child.
    pub child_offset: f64,
    /// Height of one section (common conditions, one bureau row).
    pub section_height: f64,
    pub column_width: f64,
    /// Vertical distance between stacked children.
    pub stack_spacing: f64,
    pub bureau_columns: usize,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            anchor: Position::new(400.0, 50.0),
            rating_y: 160.0,
            rating_spacing: 200.0,
            group_offset: 120.0,
            child_offset: 100.0,
            section_height: 200.0,
            column_width: 200.0,
            stack_spacing: 80.0,
            bureau_columns: 3,
        }
    }
}

impl LayoutConfig {
    /// A copy with the camelCase keys in `patch` replaced. Unknown keys are
    /// ignored; a wrongly typed value is an error.
    pub fn merged(&self, patch: &Map<String, Value>) -> Result<Self, serde_json::Error> {
        let mut value = serde_json::to_value(self)?;
        if let Value::Object(fields) = &mut value {
            for (key, v) in patch {
                fields.insert(key.clone(), v.clone());
            }
        }
        serde_json::from_value(value)
    }

    /// X of rating `index` out of `count`, centered on the anchor.
    pub fn rating_x(&self, index: usize, count: usize) -> f64 {
        let span = count.saturating_sub(1) as f64 * self.rating_spacing;
        self.anchor.x - span / 2.0 + index as f64 * self.rating_spacing
    }

    /// Condition `index` of `count` under a group at `group`.
    ///
    /// Two columns either side of the group, filled column-major: one or two
    /// conditions sit left and right, longer lists stack down the left column
    /// first. Sorting by x then y gives back the list order.
    pub fn condition_position(&self, group: Position, index: usize, count: usize) -> Position {
        let rows = self.condition_rows(count).max(1);
        let (column, row) = (index / rows, index % rows);
        let half = self.column_width / 2.0;
        Position::new(
            group.x - half + column as f64 * self.column_width,
            group.y + self.child_offset + row as f64 * self.stack_spacing,
        )
    }

    pub fn condition_rows(&self, count: usize) -> usize {
        count.div_ceil(2)
    }

    /// Vertical space taken by a section whose children stack `rows` deep.
    pub fn section_height_for(&self, rows: usize) -> f64 {
        self.section_height + rows.saturating_sub(1) as f64 * self.stack_spacing
    }

    /// Vertical space taken by a common-conditions block of `count` entries.
    pub fn common_block_height(&self, count: usize) -> f64 {
        self.section_height_for(self.condition_rows(count))
    }

    /// Bureau slots on a wrapping grid anchored left of the rating, one per
    /// entry of `score_counts`. Each row is as tall as its longest score stack.
    pub fn bureau_positions(&self, rating_x: f64, cursor_y: f64, score_counts: &[usize]) -> Vec<Position> {
        let columns = self.bureau_columns.max(1);
        let mut y = cursor_y;
        let mut out = Vec::with_capacity(score_counts.len());
        for row in score_counts.chunks(columns) {
            for column in 0..row.len() {
                out.push(Position::new(
                    rating_x - self.column_width + column as f64 * self.column_width,
                    y,
                ));
            }
            y += self.section_height_for(row.iter().copied().max().unwrap_or(0));
        }
        out
    }

    /// Score condition `index` stacked under its bureau.
    pub fn score_position(&self, bureau: Position, index: usize) -> Position {
        Position::new(
            bureau.x,
            bureau.y + self.child_offset + index as f64 * self.stack_spacing,
        )
    }
}
