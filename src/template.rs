use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::region::Region;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateMode {
    /// Matched automatically against incoming documents by fingerprint.
    #[default]
    Auto,
    /// Applied only when chosen explicitly.
    Custom,
}

impl TemplateMode {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "auto" => Ok(TemplateMode::Auto),
            "custom" => Ok(TemplateMode::Custom),
            other => Err(anyhow!("unknown template mode '{}' (expected auto or custom)", other)),
        }
    }
}

/// Named region layout handed to and received from the template store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub mode: TemplateMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default)]
    pub regions: Vec<Region>,
}

impl Template {
    pub fn new(name: impl Into<String>, mode: TemplateMode, regions: Vec<Region>) -> Self {
        Self {
            id: None,
            name: name.into(),
            mode,
            fingerprint: None,
            filename: None,
            tags: Vec::new(),
            regions,
        }
    }

    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content).context("invalid template")
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("failed to serialize template")
    }
}
