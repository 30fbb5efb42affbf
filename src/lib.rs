use anyhow::{anyhow, Context, Result};
use serde_json::Value;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

pub mod anchor;
pub mod dedup;
pub mod editor;
pub mod geometry;
pub mod grid;
pub mod history;
pub mod interaction;
pub mod logging;
pub mod providers;
pub mod region;
pub mod script;
pub mod settings;
pub mod template;
#[cfg(test)]
mod test_util;

pub use editor::{Editor, EditorConfig, EditorMode, Effect};
pub use providers::{FixtureProvider, HttpBackend, ProviderImpl};
pub use region::{Region, RegionType};
pub use template::{Template, TemplateMode};

use dedup::DedupMode;
use providers::DetectionResponse;
use settings::Settings;

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub dedup: Option<String>,
    pub script_path: Option<String>,
    pub backend_url: Option<String>,
    pub fixtures_path: Option<String>,
    pub settings_path: Option<String>,
    pub name: Option<String>,
    pub mode: Option<String>,
}

/// Input accepted on stdin or `--data`.
#[derive(Debug, Clone, PartialEq)]
pub enum Document {
    Template(Template),
    Detection(DetectionResponse),
}

/// Objects carrying a `name` are templates; anything else is detector output.
pub fn parse_document(content: &str) -> Result<Document> {
    let value: Value = serde_json::from_str(content).context("input is not valid JSON")?;
    if !value.is_object() {
        return Err(anyhow!("input must be a JSON object"));
    }
    if value.get("name").is_some() {
        let template = serde_json::from_value(value).context("invalid template")?;
        return Ok(Document::Template(template));
    }
    let response = serde_json::from_value(value).context("invalid detection response")?;
    Ok(Document::Detection(response))
}

pub async fn run(config: Config, input: Option<String>) -> Result<String> {
    let settings_path = config.settings_path.as_deref().map(Path::new);
    let settings = settings::load_settings(settings_path)?;
    run_with_settings(config, settings, input).await
}

pub async fn run_with_settings(config: Config, settings: Settings, input: Option<String>) -> Result<String> {
    let input = input.unwrap_or_default();
    let input = input.trim();
    if input.is_empty() {
        return Err(anyhow!("input is empty"));
    }

    let mut editor_config = EditorConfig::from_settings(&settings);
    if let Some(mode) = config.dedup.as_deref() {
        editor_config.dedup_mode = DedupMode::parse(mode)?;
    }
    let mode = match config.mode.as_deref() {
        Some(mode) => Some(TemplateMode::parse(mode)?),
        None => None,
    };

    let mut editor = Editor::new(editor_config);
    let mut name = config.name.clone();
    let mut template_mode = mode;
    match parse_document(input)? {
        Document::Template(template) => {
            name = name.or_else(|| Some(template.name.clone()));
            template_mode = template_mode.or(Some(template.mode));
            editor.load_template(template);
        }
        Document::Detection(response) => {
            let kept = editor.ingest_detection(&response);
            info!("kept {} of {} detected regions", kept, response.regions.len());
        }
    }

    if let Some(path) = config.script_path.as_deref() {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read script: {}", path))?;
        let commands = script::parse_script(&content).with_context(|| format!("in {}", path))?;
        let provider = build_provider(&config, &settings)?;
        let report = script::replay(&mut editor, &commands, &provider).await;
        info!(
            "script: {} applied, {} ignored, {} failed",
            report.applied,
            report.ignored,
            report.errors.len()
        );
        if let Some(first) = report.errors.first() {
            for error in &report.errors {
                warn!("#{} {}: {}", error.index, error.op, error.message);
            }
            return Err(anyhow!(
                "{} script command(s) failed; first: #{} {}: {}",
                report.errors.len(),
                first.index,
                first.op,
                first.message
            ));
        }
    }

    if editor.is_refining() {
        editor.exit_table_refine();
    }
    let name = name
        .filter(|name| !name.trim().is_empty())
        .or_else(|| Some(editor.page().filename.clone()).filter(|name| !name.is_empty()))
        .unwrap_or_else(|| "untitled".to_string());
    let template = editor.to_template(&name, template_mode.unwrap_or_default());
    template.to_json_pretty()
}

fn build_provider(config: &Config, settings: &Settings) -> Result<ProviderImpl> {
    if let Some(path) = config.fixtures_path.as_deref() {
        let provider = FixtureProvider::load(Path::new(path))?;
        return Ok(ProviderImpl::Fixture(provider));
    }
    let url = config
        .backend_url
        .clone()
        .or_else(|| settings.backend_url.clone())
        .unwrap_or_default();
    Ok(ProviderImpl::Http(HttpBackend::new(url)))
}
