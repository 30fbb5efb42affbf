use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::dedup::DedupMode;
use crate::grid::{Strategy, TableSettings};
use crate::history::DEFAULT_HISTORY_LIMIT;
use crate::providers::{DetectionParams, DetectionPreset};

const DEFAULT_SETTINGS_TOML: &str = include_str!("../settings.toml");

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub history_limit: usize,
    pub dedup_mode: DedupMode,
    pub min_draw_size: f64,
    pub min_region_size: f64,
    pub line_hit_tolerance_px: f64,
    pub handle_hit_tolerance_px: f64,
    pub edge_hover_margin: f64,
    pub table_vertical_strategy: Strategy,
    pub table_horizontal_strategy: Strategy,
    pub table_snap_tolerance: f64,
    pub table_join_tolerance: f64,
    pub backend_url: Option<String>,
    pub backend_device: Option<String>,
    pub detection_preset: DetectionPreset,
    pub detection_confidence: Option<f64>,
}

impl Default for Settings {
    fn default() -> Self {
        let table = TableSettings::default();
        Self {
            history_limit: DEFAULT_HISTORY_LIMIT,
            dedup_mode: DedupMode::default(),
            min_draw_size: 0.005,
            min_region_size: 0.001,
            line_hit_tolerance_px: 12.0,
            handle_hit_tolerance_px: 6.0,
            edge_hover_margin: 0.04,
            table_vertical_strategy: table.vertical,
            table_horizontal_strategy: table.horizontal,
            table_snap_tolerance: table.snap_tolerance,
            table_join_tolerance: table.join_tolerance,
            backend_url: None,
            backend_device: None,
            detection_preset: DetectionPreset::default(),
            detection_confidence: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    history: Option<HistorySettings>,
    dedup: Option<DedupSettings>,
    interaction: Option<InteractionSettings>,
    table: Option<TableFileSettings>,
    backend: Option<BackendSettings>,
}

#[derive(Debug, Default, Deserialize)]
struct HistorySettings {
    limit: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct DedupSettings {
    mode: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct InteractionSettings {
    min_draw_size: Option<f64>,
    min_region_size: Option<f64>,
    line_hit_tolerance_px: Option<f64>,
    handle_hit_tolerance_px: Option<f64>,
    edge_hover_margin: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct TableFileSettings {
    vertical_strategy: Option<String>,
    horizontal_strategy: Option<String>,
    snap_tolerance: Option<f64>,
    join_tolerance: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct BackendSettings {
    url: Option<String>,
    device: Option<String>,
    preset: Option<String>,
    confidence: Option<f64>,
}

pub fn load_settings(extra_path: Option<&Path>) -> Result<Settings> {
    let mut settings = Settings::default();
    ensure_home_settings_file()?;

    let mut ordered_paths = Vec::new();
    ordered_paths.push(PathBuf::from("settings.toml"));
    ordered_paths.push(PathBuf::from("settings.local.toml"));

    if let Some(home) = home_dir() {
        ordered_paths.push(home.join("settings.toml"));
        ordered_paths.push(home.join("settings.local.toml"));
    }

    if let Some(extra) = extra_path {
        if !extra.exists() {
            return Err(anyhow!("settings file not found: {}", extra.display()));
        }
        ordered_paths.push(extra.to_path_buf());
    }

    for path in ordered_paths {
        if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("failed to read settings: {}", path.display()))?;
            let parsed: SettingsFile = toml::from_str(&content)
                .with_context(|| format!("failed to parse settings: {}", path.display()))?;
            settings.merge(parsed);
        }
    }

    Ok(settings)
}

impl Settings {
    pub fn table_defaults(&self) -> TableSettings {
        TableSettings {
            vertical: self.table_vertical_strategy.clone(),
            horizontal: self.table_horizontal_strategy.clone(),
            snap_tolerance: self.table_snap_tolerance,
            join_tolerance: self.table_join_tolerance,
            ..TableSettings::default()
        }
    }

    pub fn detection_params(&self) -> DetectionParams {
        let params = self
            .detection_preset
            .params()
            .with_device(self.backend_device.clone());
        match self.detection_confidence {
            Some(conf) => params.with_confidence(conf),
            None => params,
        }
    }

    fn merge(&mut self, incoming: SettingsFile) {
        if let Some(history) = incoming.history
            && let Some(limit) = history.limit
            && limit > 0
        {
            self.history_limit = limit;
        }
        if let Some(dedup) = incoming.dedup
            && let Some(mode) = dedup.mode
        {
            match DedupMode::parse(&mode) {
                Ok(mode) => self.dedup_mode = mode,
                Err(err) => warn!("ignoring [dedup] mode: {}", err),
            }
        }
        if let Some(interaction) = incoming.interaction {
            merge_positive(&mut self.min_draw_size, interaction.min_draw_size);
            merge_positive(&mut self.min_region_size, interaction.min_region_size);
            merge_positive(&mut self.line_hit_tolerance_px, interaction.line_hit_tolerance_px);
            merge_positive(&mut self.handle_hit_tolerance_px, interaction.handle_hit_tolerance_px);
            merge_positive(&mut self.edge_hover_margin, interaction.edge_hover_margin);
        }
        if let Some(table) = incoming.table {
            merge_strategy(&mut self.table_vertical_strategy, table.vertical_strategy);
            merge_strategy(&mut self.table_horizontal_strategy, table.horizontal_strategy);
            merge_positive(&mut self.table_snap_tolerance, table.snap_tolerance);
            merge_positive(&mut self.table_join_tolerance, table.join_tolerance);
        }
        if let Some(backend) = incoming.backend {
            if let Some(url) = backend.url
                && !url.trim().is_empty()
            {
                self.backend_url = Some(url.trim().to_string());
            }
            if let Some(device) = backend.device
                && !device.trim().is_empty()
            {
                self.backend_device = Some(device.trim().to_string());
            }
            if let Some(preset) = backend.preset {
                match DetectionPreset::parse(&preset) {
                    Ok(preset) => self.detection_preset = preset,
                    Err(err) => warn!("ignoring [backend] preset: {}", err),
                }
            }
            if let Some(confidence) = backend.confidence
                && confidence.is_finite()
                && confidence > 0.0
            {
                self.detection_confidence = Some(confidence);
            }
        }
    }
}

fn merge_positive(target: &mut f64, value: Option<f64>) {
    if let Some(value) = value
        && value.is_finite()
        && value > 0.0
    {
        *target = value;
    }
}

fn merge_strategy(target: &mut Strategy, value: Option<String>) {
    let Some(value) = value else {
        return;
    };
    match Strategy::parse_detected(&value) {
        Ok(strategy) => *target = strategy,
        Err(err) => warn!("ignoring [table] strategy: {}", err),
    }
}

fn ensure_home_settings_file() -> Result<()> {
    let Some(home) = home_dir() else {
        return Ok(());
    };
    fs::create_dir_all(&home)
        .with_context(|| format!("failed to create settings directory: {}", home.display()))?;
    let path = home.join("settings.toml");
    if !path.exists() {
        fs::write(&path, DEFAULT_SETTINGS_TOML)
            .with_context(|| format!("failed to write settings: {}", path.display()))?;
    }
    Ok(())
}

fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME").ok().and_then(|home| {
        let home = home.trim();
        if home.is_empty() {
            None
        } else {
            Some(Path::new(home).join(".layout-annotator"))
        }
    })
}
