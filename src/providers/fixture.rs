use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use crate::grid::Strategy;

use super::{
    DetectionProvider, DetectionRequest, DetectionResponse, ExtractedField, ExtractionProvider,
    ExtractionRequest, GridProvider, GridRequest, GridResponse, ProviderFuture,
};

#[derive(Debug, Default, Deserialize)]
struct Fixtures {
    #[serde(default)]
    detection: Option<DetectionResponse>,
    /// Canned grids keyed by region id; `"*"` answers any region.
    #[serde(default)]
    grids: HashMap<String, GridResponse>,
    #[serde(default)]
    extraction: Vec<ExtractedField>,
    /// Region ids whose grid requests fail.
    #[serde(default)]
    failing_regions: Vec<String>,
}

/// Serves canned collaborator responses from a JSON document. Explicit
/// strategies are echoed back the way the backend honours them.
#[derive(Debug, Clone, Default)]
pub struct FixtureProvider {
    fixtures: Arc<Fixtures>,
}

impl FixtureProvider {
    pub fn from_json(content: &str) -> Result<Self> {
        let fixtures: Fixtures = serde_json::from_str(content).context("invalid fixtures")?;
        Ok(Self {
            fixtures: Arc::new(fixtures),
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read fixtures: {}", path.display()))?;
        Self::from_json(&content).with_context(|| format!("in {}", path.display()))
    }

    fn grid_for(&self, request: &GridRequest) -> Result<GridResponse> {
        if self.fixtures.failing_regions.contains(&request.region_id) {
            return Err(anyhow!("table analysis failed for {}", request.region_id));
        }
        let mut response = self
            .fixtures
            .grids
            .get(&request.region_id)
            .or_else(|| self.fixtures.grids.get("*"))
            .cloned()
            .unwrap_or_else(|| GridResponse {
                rows: vec![0.0, 1.0],
                cols: vec![0.0, 1.0],
                ..GridResponse::default()
            });

        let mut echoed = false;
        if let Strategy::Explicit(lines) = &request.settings.horizontal {
            response.rows = lines.clone();
            echoed = true;
        }
        if let Strategy::Explicit(lines) = &request.settings.vertical {
            response.cols = lines.clone();
            echoed = true;
        }
        if echoed {
            response.preview = None;
        }
        Ok(response)
    }
}

impl DetectionProvider for FixtureProvider {
    fn detect(&self, request: DetectionRequest) -> ProviderFuture<DetectionResponse> {
        let detection = self.fixtures.detection.clone();
        Box::pin(async move {
            let mut response =
                detection.ok_or_else(|| anyhow!("no detection fixture for {}", request.filename))?;
            if response.filename.is_none() {
                response.filename = Some(request.filename);
            }
            Ok(response)
        })
    }
}

impl GridProvider for FixtureProvider {
    fn analyze_grid(&self, request: GridRequest) -> ProviderFuture<GridResponse> {
        let result = self.grid_for(&request);
        debug!("fixture grid for {}: ok={}", request.region_id, result.is_ok());
        Box::pin(async move { result })
    }
}

impl ExtractionProvider for FixtureProvider {
    fn extract(&self, request: ExtractionRequest) -> ProviderFuture<Vec<ExtractedField>> {
        let fields: Vec<ExtractedField> = self
            .fixtures
            .extraction
            .iter()
            .filter(|field| {
                request
                    .regions
                    .iter()
                    .any(|region| region.region_id == field.region_id)
            })
            .cloned()
            .collect();
        Box::pin(async move { Ok(fields) })
    }
}
