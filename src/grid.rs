use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::geometry::Rect;

pub const LINE_MIN: f64 = 0.01;
pub const LINE_MAX: f64 = 0.99;
const LINE_GAP: f64 = 1e-4;
const BOUNDARY_SNAP: f64 = 0.01;

/// `Rows` are separated by horizontal lines, `Cols` by vertical ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    Rows,
    Cols,
}

impl Axis {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "rows" | "row" | "horizontal" => Ok(Axis::Rows),
            "cols" | "col" | "columns" | "vertical" => Ok(Axis::Cols),
            other => Err(anyhow!("unknown axis '{}' (expected rows or cols)", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Strategy {
    Lines,
    Text,
    Rects,
    /// Line offsets relative to the table region, boundaries included.
    Explicit(Vec<f64>),
}

impl Strategy {
    pub fn name(&self) -> &'static str {
        match self {
            Strategy::Lines => "lines",
            Strategy::Text => "text",
            Strategy::Rects => "rects",
            Strategy::Explicit(_) => "explicit",
        }
    }

    pub fn is_explicit(&self) -> bool {
        matches!(self, Strategy::Explicit(_))
    }

    /// Parses a detected strategy name; `explicit` needs its lines and is
    /// built through [`Strategy::Explicit`] instead.
    pub fn parse_detected(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "lines" => Ok(Strategy::Lines),
            "text" => Ok(Strategy::Text),
            "rects" => Ok(Strategy::Rects),
            "explicit" => Err(anyhow!("explicit strategy requires line positions")),
            other => Err(anyhow!(
                "unknown table strategy '{}' (expected lines, text or rects)",
                other
            )),
        }
    }

    fn from_wire(name: &str, lines: Option<Vec<f64>>) -> Result<Self> {
        if name.trim().eq_ignore_ascii_case("explicit") {
            let lines = lines.ok_or_else(|| anyhow!("explicit strategy requires line positions"))?;
            return Ok(Strategy::Explicit(lines));
        }
        Strategy::parse_detected(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TableSettingsWire", into = "TableSettingsWire")]
pub struct TableSettings {
    pub vertical: Strategy,
    pub horizontal: Strategy,
    pub snap_tolerance: f64,
    pub join_tolerance: f64,
    pub vertical_locked: bool,
    pub horizontal_locked: bool,
}

impl Default for TableSettings {
    fn default() -> Self {
        Self {
            vertical: Strategy::Text,
            horizontal: Strategy::Text,
            snap_tolerance: 6.0,
            join_tolerance: 3.0,
            vertical_locked: false,
            horizontal_locked: false,
        }
    }
}

impl TableSettings {
    pub fn strategy(&self, axis: Axis) -> &Strategy {
        match axis {
            Axis::Rows => &self.horizontal,
            Axis::Cols => &self.vertical,
        }
    }

    pub fn is_locked(&self, axis: Axis) -> bool {
        match axis {
            Axis::Rows => self.horizontal_locked,
            Axis::Cols => self.vertical_locked,
        }
    }

    pub fn toggle_lock(&mut self, axis: Axis) {
        match axis {
            Axis::Rows => self.horizontal_locked = !self.horizontal_locked,
            Axis::Cols => self.vertical_locked = !self.vertical_locked,
        }
    }

    /// Returns `false` when the axis is locked or the strategy is unchanged.
    pub fn set_strategy(&mut self, axis: Axis, strategy: Strategy) -> bool {
        if self.is_locked(axis) {
            debug!("{:?} axis is locked; strategy change ignored", axis);
            return false;
        }
        let slot = match axis {
            Axis::Rows => &mut self.horizontal,
            Axis::Cols => &mut self.vertical,
        };
        if *slot == strategy {
            return false;
        }
        *slot = strategy;
        true
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TableSettingsWire {
    #[serde(default = "default_strategy_name")]
    vertical_strategy: String,
    #[serde(default = "default_strategy_name")]
    horizontal_strategy: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    explicit_vertical_lines: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    explicit_horizontal_lines: Option<Vec<f64>>,
    #[serde(default = "default_snap_tolerance")]
    snap_tolerance: f64,
    #[serde(default = "default_join_tolerance")]
    join_tolerance: f64,
    #[serde(default)]
    vertical_locked: bool,
    #[serde(default)]
    horizontal_locked: bool,
}

fn default_strategy_name() -> String {
    "text".to_string()
}

fn default_snap_tolerance() -> f64 {
    6.0
}

fn default_join_tolerance() -> f64 {
    3.0
}

impl TryFrom<TableSettingsWire> for TableSettings {
    type Error = anyhow::Error;

    fn try_from(wire: TableSettingsWire) -> Result<Self> {
        Ok(Self {
            vertical: Strategy::from_wire(&wire.vertical_strategy, wire.explicit_vertical_lines)?,
            horizontal: Strategy::from_wire(
                &wire.horizontal_strategy,
                wire.explicit_horizontal_lines,
            )?,
            snap_tolerance: wire.snap_tolerance,
            join_tolerance: wire.join_tolerance,
            vertical_locked: wire.vertical_locked,
            horizontal_locked: wire.horizontal_locked,
        })
    }
}

impl From<TableSettings> for TableSettingsWire {
    fn from(settings: TableSettings) -> Self {
        let split = |strategy: Strategy| match strategy {
            Strategy::Explicit(lines) => ("explicit".to_string(), Some(lines)),
            other => (other.name().to_string(), None),
        };
        let (vertical_strategy, explicit_vertical_lines) = split(settings.vertical);
        let (horizontal_strategy, explicit_horizontal_lines) = split(settings.horizontal);
        Self {
            vertical_strategy,
            horizontal_strategy,
            explicit_vertical_lines,
            explicit_horizontal_lines,
            snap_tolerance: settings.snap_tolerance,
            join_tolerance: settings.join_tolerance,
            vertical_locked: settings.vertical_locked,
            horizontal_locked: settings.horizontal_locked,
        }
    }
}

/// A cell of the derived grid, relative to the table region.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CellRect {
    pub row: usize,
    pub col: usize,
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl CellRect {
    /// Places the cell on the page given the table region's rectangle.
    pub fn on_page(&self, region: &Rect) -> Rect {
        Rect::new(
            region.x + self.x * region.width,
            region.y + self.y * region.height,
            self.w * region.width,
            self.h * region.height,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableRefinement {
    pub region_id: String,
    rows: Vec<f64>,
    cols: Vec<f64>,
    preview: Vec<Vec<Option<String>>>,
    pub settings: TableSettings,
}

impl TableRefinement {
    pub fn new(
        region_id: impl Into<String>,
        rows: &[f64],
        cols: &[f64],
        preview: Vec<Vec<Option<String>>>,
        settings: TableSettings,
    ) -> Self {
        Self {
            region_id: region_id.into(),
            rows: normalize_lines(rows),
            cols: normalize_lines(cols),
            preview,
            settings,
        }
    }

    pub fn rows(&self) -> &[f64] {
        &self.rows
    }

    pub fn cols(&self) -> &[f64] {
        &self.cols
    }

    pub fn lines(&self, axis: Axis) -> &[f64] {
        match axis {
            Axis::Rows => &self.rows,
            Axis::Cols => &self.cols,
        }
    }

    fn lines_mut(&mut self, axis: Axis) -> &mut Vec<f64> {
        match axis {
            Axis::Rows => &mut self.rows,
            Axis::Cols => &mut self.cols,
        }
    }

    pub fn preview(&self) -> &[Vec<Option<String>>] {
        &self.preview
    }

    pub fn cells(&self) -> Vec<CellRect> {
        let mut cells = Vec::new();
        for (row, pair) in self.rows.windows(2).enumerate() {
            for (col, span) in self.cols.windows(2).enumerate() {
                cells.push(CellRect {
                    row,
                    col,
                    x: span[0],
                    y: pair[0],
                    w: span[1] - span[0],
                    h: pair[1] - pair[0],
                });
            }
        }
        cells
    }

    pub fn cell_text(&self, row: usize, col: usize) -> Option<&str> {
        self.preview.get(row)?.get(col)?.as_deref()
    }

    pub fn is_interior(&self, axis: Axis, index: usize) -> bool {
        let len = self.lines(axis).len();
        index > 0 && index + 1 < len
    }

    /// Moves an interior line, clamped into `[0.01, 0.99]` and between its
    /// neighbours. Boundary lines and locked axes never move.
    pub fn move_line(&mut self, axis: Axis, index: usize, offset: f64) -> bool {
        if !offset.is_finite() || !self.is_interior(axis, index) || self.settings.is_locked(axis) {
            return false;
        }
        let lines = self.lines_mut(axis);
        let low = (lines[index - 1] + LINE_GAP).max(LINE_MIN);
        let high = (lines[index + 1] - LINE_GAP).min(LINE_MAX);
        if low > high {
            return false;
        }
        let next = offset.clamp(low, high);
        if lines[index] == next {
            return false;
        }
        lines[index] = next;
        true
    }

    /// Inserts a line at a relative offset strictly inside the table.
    pub fn insert_line(&mut self, axis: Axis, offset: f64) -> bool {
        if !offset.is_finite() || offset <= 0.0 || offset >= 1.0 || self.settings.is_locked(axis) {
            return false;
        }
        let lines = self.lines_mut(axis);
        if lines.iter().any(|line| (line - offset).abs() < LINE_GAP) {
            return false;
        }
        let at = lines.partition_point(|line| *line < offset);
        lines.insert(at, offset);
        self.preview.clear();
        true
    }

    pub fn remove_line(&mut self, axis: Axis, index: usize) -> bool {
        if !self.is_interior(axis, index) || self.settings.is_locked(axis) {
            return false;
        }
        self.lines_mut(axis).remove(index);
        self.preview.clear();
        true
    }

    /// Settings for a re-analysis after a structural edit: unlocked axes
    /// switch to the current explicit lines, locked axes keep their strategy.
    pub fn explicit_settings(&self) -> TableSettings {
        let mut settings = self.settings.clone();
        for axis in [Axis::Rows, Axis::Cols] {
            let keep = settings.is_locked(axis) && !settings.strategy(axis).is_explicit();
            if keep {
                continue;
            }
            let strategy = Strategy::Explicit(self.lines(axis).to_vec());
            match axis {
                Axis::Rows => settings.horizontal = strategy,
                Axis::Cols => settings.vertical = strategy,
            }
        }
        settings
    }
}

/// Cleans line offsets returned by a grid collaborator: keeps finite values
/// in `[0, 1]`, rounds to four decimals, sorts, de-duplicates and makes sure
/// both boundaries are present.
pub fn normalize_lines(values: &[f64]) -> Vec<f64> {
    let mut lines: Vec<f64> = values
        .iter()
        .copied()
        .filter(|value| value.is_finite() && (0.0..=1.0).contains(value))
        .map(|value| (value * 10_000.0).round() / 10_000.0)
        .collect();
    lines.sort_by(|a, b| a.total_cmp(b));
    lines.dedup();

    match lines.first() {
        Some(first) if *first <= BOUNDARY_SNAP => lines[0] = 0.0,
        _ => lines.insert(0, 0.0),
    }
    match lines.last() {
        Some(last) if *last >= 1.0 - BOUNDARY_SNAP && lines.len() > 1 => {
            let end = lines.len() - 1;
            lines[end] = 1.0;
        }
        _ => lines.push(1.0),
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn refinement() -> TableRefinement {
        TableRefinement::new(
            "table_1",
            &[0.0, 0.25, 0.5, 1.0],
            &[0.0, 0.5, 1.0],
            vec![
                vec![Some("Item".into()), Some("Qty".into())],
                vec![Some("Pen".into()), None],
            ],
            TableSettings::default(),
        )
    }

    #[test]
    fn normalize_adds_boundaries_and_dedups() {
        assert_eq!(normalize_lines(&[0.5, 0.25, 0.25004]), vec![0.0, 0.25, 0.5, 1.0]);
        assert_eq!(normalize_lines(&[]), vec![0.0, 1.0]);
        assert_eq!(normalize_lines(&[0.005, 0.995]), vec![0.0, 1.0]);
        assert_eq!(normalize_lines(&[f64::NAN, 1.5, -0.1, 0.5]), vec![0.0, 0.5, 1.0]);
    }

    #[test]
    fn cells_are_derived_from_lines() {
        let table = refinement();
        let cells = table.cells();
        assert_eq!(cells.len(), 3 * 2);
        assert_eq!(
            cells[3],
            CellRect {
                row: 1,
                col: 1,
                x: 0.5,
                y: 0.25,
                w: 0.5,
                h: 0.25
            }
        );
        assert_eq!(table.cell_text(1, 0), Some("Pen"));
        assert_eq!(table.cell_text(1, 1), None);
        assert_eq!(table.cell_text(5, 0), None);

        let page = cells[3].on_page(&Rect::new(0.5, 0.5, 0.5, 0.5));
        assert_eq!(page, Rect::new(0.75, 0.625, 0.25, 0.125));
    }

    #[test]
    fn boundary_lines_are_immutable() {
        let mut table = refinement();
        let before = table.clone();
        for axis in [Axis::Rows, Axis::Cols] {
            let last = table.lines(axis).len() - 1;
            assert!(!table.move_line(axis, 0, 0.3));
            assert!(!table.move_line(axis, last, 0.3));
            assert!(!table.remove_line(axis, 0));
            assert!(!table.remove_line(axis, last));
        }
        assert_eq!(table, before);
    }

    #[test]
    fn move_line_clamps_between_neighbours() {
        let mut table = refinement();
        assert!(table.move_line(Axis::Rows, 1, 0.9));
        assert!(table.rows()[1] < table.rows()[2]);
        assert!(table.move_line(Axis::Cols, 1, 2.0));
        assert_eq!(table.cols()[1], LINE_MAX);
        assert!(table.move_line(Axis::Cols, 1, -1.0));
        assert_eq!(table.cols()[1], LINE_MIN);
    }

    #[test]
    fn insert_and_remove_keep_order_and_drop_preview() {
        let mut table = refinement();
        assert!(table.insert_line(Axis::Cols, 0.75));
        assert_eq!(table.cols(), &[0.0, 0.5, 0.75, 1.0]);
        assert!(table.preview().is_empty());
        assert!(!table.insert_line(Axis::Cols, 0.75));
        assert!(!table.insert_line(Axis::Cols, 1.0));
        assert!(table.remove_line(Axis::Cols, 1));
        assert_eq!(table.cols(), &[0.0, 0.75, 1.0]);
    }

    #[test]
    fn locked_axis_rejects_edits() {
        let mut table = refinement();
        table.settings.toggle_lock(Axis::Rows);
        let before = table.rows().to_vec();
        assert!(!table.move_line(Axis::Rows, 1, 0.3));
        assert!(!table.insert_line(Axis::Rows, 0.75));
        assert!(!table.remove_line(Axis::Rows, 1));
        assert!(!table.settings.set_strategy(Axis::Rows, Strategy::Lines));
        assert_eq!(table.rows(), before.as_slice());
        assert!(table.insert_line(Axis::Cols, 0.25));
    }

    #[test]
    fn explicit_settings_respect_locked_axis() {
        let mut table = refinement();
        table.settings.toggle_lock(Axis::Rows);
        let settings = table.explicit_settings();
        assert_eq!(settings.horizontal, Strategy::Text);
        assert_eq!(settings.vertical, Strategy::Explicit(vec![0.0, 0.5, 1.0]));
    }

    #[test]
    fn settings_use_flat_wire_shape() {
        let settings = TableSettings {
            vertical: Strategy::Explicit(vec![0.25, 0.5, 0.75]),
            snap_tolerance: 4.5,
            join_tolerance: 2.5,
            ..TableSettings::default()
        };
        insta::assert_json_snapshot!(settings, @r###"
        {
          "vertical_strategy": "explicit",
          "horizontal_strategy": "text",
          "explicit_vertical_lines": [
            0.25,
            0.5,
            0.75
          ],
          "snap_tolerance": 4.5,
          "join_tolerance": 2.5,
          "vertical_locked": false,
          "horizontal_locked": false
        }
        "###);

        let parsed: TableSettings = serde_json::from_value(json!({
            "vertical_strategy": "lines",
            "horizontal_strategy": "explicit",
            "explicit_horizontal_lines": [0.0, 1.0]
        }))
        .unwrap();
        assert_eq!(parsed.vertical, Strategy::Lines);
        assert_eq!(parsed.horizontal, Strategy::Explicit(vec![0.0, 1.0]));
        assert_eq!(parsed.snap_tolerance, 6.0);

        let missing = serde_json::from_value::<TableSettings>(json!({
            "vertical_strategy": "explicit"
        }));
        assert!(missing.is_err());
    }
}
