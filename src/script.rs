use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, warn};

use crate::anchor::{Corner, SearchProgress};
use crate::dedup::DedupMode;
use crate::editor::{Editor, EditorMode, Effect};
use crate::geometry::{Point, Rect};
use crate::grid::{Axis, Strategy, TableSettings};
use crate::interaction::Viewport;
use crate::providers::{
    DetectionPreset, DetectionProvider, DetectionRequest, ExtractionProvider, GridProvider,
    GridRequest,
};
use crate::region::RegionType;

/// One scripted editor input. Scripts are JSON arrays of these, e.g.
/// `[{"op": "down", "x": 0.1, "y": 0.1}, {"op": "up"}]`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Command {
    SetMode {
        mode: EditorMode,
    },
    SetViewport {
        left: f64,
        top: f64,
        width: f64,
        height: f64,
    },
    SetFilter {
        #[serde(default)]
        types: Vec<String>,
    },
    SetDedup {
        mode: DedupMode,
    },
    /// Pointer positions are page-relative unless `client` is set, in which
    /// case they go through the viewport first.
    Down {
        x: f64,
        y: f64,
        #[serde(default)]
        client: bool,
    },
    Move {
        x: f64,
        y: f64,
        #[serde(default)]
        client: bool,
    },
    Up,
    Leave,
    Select {
        id: String,
    },
    ClearSelection,
    AddRegion {
        x: f64,
        y: f64,
        width: f64,
        height: f64,
    },
    MoveRegion {
        id: String,
        x: f64,
        y: f64,
    },
    ResizeRegion {
        id: String,
        x: f64,
        y: f64,
        width: f64,
        height: f64,
    },
    SetType {
        id: String,
        #[serde(rename = "type")]
        kind: String,
    },
    SetLabel {
        id: String,
        label: String,
    },
    SetRemarks {
        id: String,
        remarks: String,
    },
    ToggleLock {
        id: String,
    },
    Delete {
        id: String,
    },
    Clear,
    Undo,
    Redo,
    PlaceAnchor {
        id: String,
        corner: Corner,
        #[serde(default)]
        text: String,
        /// `[x0, y0, x1, y1]`
        bounds: [f64; 4],
    },
    DeleteAnchor {
        id: String,
        corner: Corner,
    },
    SearchProgress {
        id: String,
        corner: Corner,
        width: f64,
        height: f64,
    },
    MoveAnchor {
        id: String,
        corner: Corner,
        dx: f64,
        dy: f64,
    },
    EnterTable {
        id: String,
    },
    InsertLine {
        axis: Axis,
        offset: f64,
    },
    DeleteLine {
        axis: Axis,
        index: usize,
    },
    MoveLine {
        axis: Axis,
        index: usize,
        offset: f64,
    },
    ToggleAxisLock {
        axis: Axis,
    },
    SetStrategy {
        axis: Axis,
        strategy: String,
    },
    ApplyTableSettings {
        settings: TableSettings,
    },
    ReanalyzeTable,
    CommitTable,
    ExitTable,
    Analyze {
        filename: String,
        #[serde(default)]
        preset: Option<DetectionPreset>,
        #[serde(default)]
        confidence: Option<f64>,
        #[serde(default)]
        device: Option<String>,
        #[serde(default)]
        refresh: bool,
    },
    Extract,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::SetMode { .. } => "set_mode",
            Command::SetViewport { .. } => "set_viewport",
            Command::SetFilter { .. } => "set_filter",
            Command::SetDedup { .. } => "set_dedup",
            Command::Down { .. } => "down",
            Command::Move { .. } => "move",
            Command::Up => "up",
            Command::Leave => "leave",
            Command::Select { .. } => "select",
            Command::ClearSelection => "clear_selection",
            Command::AddRegion { .. } => "add_region",
            Command::MoveRegion { .. } => "move_region",
            Command::ResizeRegion { .. } => "resize_region",
            Command::SetType { .. } => "set_type",
            Command::SetLabel { .. } => "set_label",
            Command::SetRemarks { .. } => "set_remarks",
            Command::ToggleLock { .. } => "toggle_lock",
            Command::Delete { .. } => "delete",
            Command::Clear => "clear",
            Command::Undo => "undo",
            Command::Redo => "redo",
            Command::PlaceAnchor { .. } => "place_anchor",
            Command::DeleteAnchor { .. } => "delete_anchor",
            Command::SearchProgress { .. } => "search_progress",
            Command::MoveAnchor { .. } => "move_anchor",
            Command::EnterTable { .. } => "enter_table",
            Command::InsertLine { .. } => "insert_line",
            Command::DeleteLine { .. } => "delete_line",
            Command::MoveLine { .. } => "move_line",
            Command::ToggleAxisLock { .. } => "toggle_axis_lock",
            Command::SetStrategy { .. } => "set_strategy",
            Command::ApplyTableSettings { .. } => "apply_table_settings",
            Command::ReanalyzeTable => "reanalyze_table",
            Command::CommitTable => "commit_table",
            Command::ExitTable => "exit_table",
            Command::Analyze { .. } => "analyze",
            Command::Extract => "extract",
        }
    }
}

pub fn parse_script(content: &str) -> Result<Vec<Command>> {
    serde_json::from_str(content).context("invalid editor script")
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandError {
    pub index: usize,
    pub op: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReplayReport {
    /// Commands that changed something.
    pub applied: usize,
    /// Commands the editor rejected as no-ops.
    pub ignored: usize,
    pub errors: Vec<CommandError>,
}

/// Feeds `commands` to the editor in order. Grid re-analysis requested by a
/// command is run right away; collaborator and input errors are collected
/// and replay continues with the next command.
pub async fn replay<P>(editor: &mut Editor, commands: &[Command], provider: &P) -> ReplayReport
where
    P: DetectionProvider + GridProvider + ExtractionProvider + ?Sized,
{
    let mut report = ReplayReport::default();
    for (index, command) in commands.iter().enumerate() {
        match apply(editor, command, provider).await {
            Ok(true) => report.applied += 1,
            Ok(false) => {
                debug!("#{} {} changed nothing", index, command.name());
                report.ignored += 1;
            }
            Err(err) => {
                warn!("#{} {} failed: {:#}", index, command.name(), err);
                report.errors.push(CommandError {
                    index,
                    op: command.name().to_string(),
                    message: format!("{:#}", err),
                });
            }
        }
    }
    report
}

async fn apply<P>(editor: &mut Editor, command: &Command, provider: &P) -> Result<bool>
where
    P: DetectionProvider + GridProvider + ExtractionProvider + ?Sized,
{
    let changed = match command {
        Command::SetMode { mode } => {
            editor.set_mode(*mode);
            true
        }
        Command::SetViewport {
            left,
            top,
            width,
            height,
        } => editor.set_viewport(Viewport {
            left: *left,
            top: *top,
            width: *width,
            height: *height,
        }),
        Command::SetFilter { types } => {
            let types = types
                .iter()
                .map(|name| region_type(name))
                .collect::<Result<BTreeSet<_>>>()?;
            editor.set_filter(types);
            true
        }
        Command::SetDedup { mode } => {
            editor.set_dedup_mode(*mode);
            true
        }
        Command::Down { x, y, client } => {
            let pos = position(editor, *x, *y, *client);
            let effect = editor.pointer_down(pos);
            settle(editor, effect, provider).await?
        }
        Command::Move { x, y, client } => {
            let pos = position(editor, *x, *y, *client);
            let effect = editor.pointer_move(pos);
            settle(editor, effect, provider).await?
        }
        Command::Up => {
            let effect = editor.pointer_up();
            settle(editor, effect, provider).await?
        }
        Command::Leave => {
            let effect = editor.pointer_leave();
            settle(editor, effect, provider).await?
        }
        Command::Select { id } => editor.select(id),
        Command::ClearSelection => {
            let had = editor.selected().is_some();
            editor.clear_selection();
            had
        }
        Command::AddRegion {
            x,
            y,
            width,
            height,
        } => editor.add_region(Rect::new(*x, *y, *width, *height)).is_some(),
        Command::MoveRegion { id, x, y } => editor.move_region(id, *x, *y),
        Command::ResizeRegion {
            id,
            x,
            y,
            width,
            height,
        } => editor.resize_region(id, Rect::new(*x, *y, *width, *height)),
        Command::SetType { id, kind } => editor.set_region_type(id, region_type(kind)?),
        Command::SetLabel { id, label } => editor.set_region_label(id, label),
        Command::SetRemarks { id, remarks } => editor.set_region_remarks(id, remarks),
        Command::ToggleLock { id } => editor.toggle_region_lock(id),
        Command::Delete { id } => editor.delete_region(id),
        Command::Clear => editor.clear_regions(),
        Command::Undo => editor.undo(),
        Command::Redo => editor.redo(),
        Command::PlaceAnchor {
            id,
            corner,
            text,
            bounds,
        } => editor.place_anchor(id, *corner, text, Rect::from_bounds(*bounds)),
        Command::DeleteAnchor { id, corner } => editor.delete_anchor(id, *corner),
        Command::SearchProgress {
            id,
            corner,
            width,
            height,
        } => editor.set_search_progress(id, *corner, SearchProgress::new(*width, *height)),
        Command::MoveAnchor { id, corner, dx, dy } => editor.move_anchor(id, *corner, *dx, *dy),
        Command::EnterTable { id } => {
            editor.enter_table_refine(provider, id).await?;
            editor.is_refining()
        }
        Command::InsertLine { axis, offset } => {
            let request = editor.insert_table_line(*axis, *offset);
            run_optional(editor, request, provider).await?
        }
        Command::DeleteLine { axis, index } => {
            let request = editor.delete_table_line(*axis, *index);
            run_optional(editor, request, provider).await?
        }
        Command::MoveLine {
            axis,
            index,
            offset,
        } => {
            let request = editor.move_table_line(*axis, *index, *offset);
            run_optional(editor, request, provider).await?
        }
        Command::ToggleAxisLock { axis } => editor.toggle_axis_lock(*axis),
        Command::SetStrategy { axis, strategy } => {
            let strategy = Strategy::parse_detected(strategy)?;
            let request = editor.set_axis_strategy(*axis, strategy);
            run_optional(editor, request, provider).await?
        }
        Command::ApplyTableSettings { settings } => {
            let request = editor.apply_table_settings(settings.clone())?;
            editor.run_grid_request(provider, request).await?
        }
        Command::ReanalyzeTable => {
            editor.reanalyze_table(provider).await?;
            true
        }
        Command::CommitTable => editor.commit_table_rules(),
        Command::ExitTable => editor.exit_table_refine(),
        Command::Analyze {
            filename,
            preset,
            confidence,
            device,
            refresh,
        } => {
            let mut params = preset.unwrap_or_default().params().with_device(device.clone());
            if let Some(conf) = confidence {
                params = params.with_confidence(*conf);
            }
            let request = DetectionRequest {
                filename: filename.clone(),
                params,
                refresh: *refresh,
            };
            editor.analyze_page(provider, request).await?;
            true
        }
        Command::Extract => {
            editor.extract_fields(provider).await?;
            true
        }
    };
    Ok(changed)
}

fn region_type(name: &str) -> Result<RegionType> {
    RegionType::parse(name).ok_or_else(|| anyhow!("unknown region type '{}'", name))
}

fn position(editor: &Editor, x: f64, y: f64, client: bool) -> Point {
    let point = Point::new(x, y);
    if client { editor.to_page(point) } else { point }
}

async fn settle<P>(editor: &mut Editor, effect: Effect, provider: &P) -> Result<bool>
where
    P: GridProvider + ?Sized,
{
    match effect {
        Effect::None => Ok(false),
        Effect::Updated | Effect::Committed => Ok(true),
        Effect::Reanalyze(request) => editor.run_grid_request(provider, request).await,
    }
}

async fn run_optional<P>(
    editor: &mut Editor,
    request: Option<GridRequest>,
    provider: &P,
) -> Result<bool>
where
    P: GridProvider + ?Sized,
{
    match request {
        Some(request) => editor.run_grid_request(provider, request).await,
        None => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::FixtureProvider;
    use crate::template::{Template, TemplateMode};

    fn fixtures() -> FixtureProvider {
        FixtureProvider::from_json(
            r#"{
                "detection": {
                    "id": "doc_7",
                    "regions": [
                        {"type": "title", "x": 0.1, "y": 0.05, "width": 0.8, "height": 0.1},
                        {"type": "table", "x": 0.1, "y": 0.3, "width": 0.8, "height": 0.4}
                    ]
                },
                "grids": {"*": {"rows": [0.0, 0.5, 1.0], "cols": [0.0, 0.5, 1.0]}},
                "extraction": [{"region_id": "title_1", "content": "INVOICE"}]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn parses_tagged_commands() {
        let commands = parse_script(
            r#"[
                {"op": "set_mode", "mode": "add"},
                {"op": "down", "x": 100, "y": 200, "client": true},
                {"op": "set_type", "id": "custom_1", "type": "table"},
                {"op": "place_anchor", "id": "table_1", "corner": "br", "bounds": [0.5, 0.5, 0.6, 0.55]},
                {"op": "insert_line", "axis": "rows", "offset": 0.5},
                {"op": "undo"}
            ]"#,
        )
        .unwrap();
        assert_eq!(commands.len(), 6);
        assert_eq!(commands[1], Command::Down { x: 100.0, y: 200.0, client: true });
        assert_eq!(commands[4].name(), "insert_line");
        assert!(parse_script(r#"[{"op": "fly"}]"#).is_err());
    }

    #[tokio::test]
    async fn replay_runs_collaborators_and_collects_errors() {
        let commands = parse_script(
            r#"[
                {"op": "analyze", "filename": "invoice.png", "preset": "fast"},
                {"op": "enter_table", "id": "table_1"},
                {"op": "insert_line", "axis": "cols", "offset": 0.25},
                {"op": "commit_table"},
                {"op": "exit_table"},
                {"op": "set_type", "id": "title_1", "type": "hologram"},
                {"op": "enter_table", "id": "title_1"},
                {"op": "delete", "id": "missing"},
                {"op": "extract"}
            ]"#,
        )
        .unwrap();
        let mut editor = Editor::default();
        let report = replay(&mut editor, &commands, &fixtures()).await;

        assert_eq!(report.applied, 6);
        assert_eq!(report.ignored, 1);
        let failed: Vec<usize> = report.errors.iter().map(|err| err.index).collect();
        assert_eq!(failed, vec![5, 6]);

        let table = editor.region("table_1").unwrap();
        let settings = table.table_settings.as_ref().unwrap();
        assert_eq!(settings.vertical, Strategy::Explicit(vec![0.0, 0.25, 0.5, 1.0]));
        assert_eq!(editor.page().id, "doc_7");
        assert_eq!(editor.extracted().len(), 1);
    }

    #[tokio::test]
    async fn pointer_script_draws_resizes_and_undoes() {
        let commands = parse_script(
            r#"[
                {"op": "set_mode", "mode": "add"},
                {"op": "down", "x": 0.125, "y": 0.125},
                {"op": "move", "x": 0.5, "y": 0.375},
                {"op": "up"},
                {"op": "set_mode", "mode": "view"},
                {"op": "down", "x": 0.5, "y": 0.375},
                {"op": "move", "x": 0.625, "y": 0.5},
                {"op": "up"},
                {"op": "undo"}
            ]"#,
        )
        .unwrap();
        let mut editor = Editor::default();
        editor.load_template(Template::new("blank", TemplateMode::Auto, Vec::new()));
        let report = replay(&mut editor, &commands, &fixtures()).await;
        assert!(report.errors.is_empty());

        let region = editor.region("custom_1").unwrap();
        assert_eq!(region.rect, Rect::new(0.125, 0.125, 0.375, 0.25));
        assert!(editor.can_redo());
    }
}
