use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;

use crate::anchor::Corner;
use crate::geometry::Rect;
use crate::grid::TableSettings;
use crate::region::{Region, RegionType};

mod fixture;
mod http;

pub use fixture::FixtureProvider;
pub use http::HttpBackend;

pub const MIN_CONFIDENCE: f64 = 0.05;
pub const MAX_CONFIDENCE: f64 = 0.6;

pub type ProviderFuture<T> = Pin<Box<dyn Future<Output = Result<T>> + Send>>;

pub trait DetectionProvider: Send + Sync {
    fn detect(&self, request: DetectionRequest) -> ProviderFuture<DetectionResponse>;
}

pub trait GridProvider: Send + Sync {
    fn analyze_grid(&self, request: GridRequest) -> ProviderFuture<GridResponse>;
}

pub trait ExtractionProvider: Send + Sync {
    fn extract(&self, request: ExtractionRequest) -> ProviderFuture<Vec<ExtractedField>>;
}

/// The document page every collaborator call refers to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageRef {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub filename: String,
}

impl PageRef {
    pub fn new(id: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            filename: filename.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionPreset {
    Fast,
    #[default]
    Balanced,
    Precise,
}

impl DetectionPreset {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "fast" => Ok(DetectionPreset::Fast),
            "balanced" => Ok(DetectionPreset::Balanced),
            "precise" => Ok(DetectionPreset::Precise),
            other => Err(anyhow!(
                "unknown detection preset '{}' (expected fast, balanced or precise)",
                other
            )),
        }
    }

    pub fn params(&self) -> DetectionParams {
        let (conf, imgsz, iou, agnostic_nms) = match self {
            DetectionPreset::Fast => (0.35, 640, 0.5, false),
            DetectionPreset::Balanced => (0.25, 1024, 0.45, false),
            DetectionPreset::Precise => (0.15, 1600, 0.35, true),
        };
        DetectionParams {
            conf,
            imgsz,
            iou,
            agnostic_nms,
            device: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionParams {
    pub conf: f64,
    pub imgsz: u32,
    pub iou: f64,
    pub agnostic_nms: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
}

impl Default for DetectionParams {
    fn default() -> Self {
        DetectionPreset::default().params()
    }
}

impl DetectionParams {
    pub fn with_confidence(mut self, conf: f64) -> Self {
        if conf.is_finite() {
            self.conf = (conf.clamp(MIN_CONFIDENCE, MAX_CONFIDENCE) * 100.0).round() / 100.0;
        }
        self
    }

    pub fn with_device(mut self, device: Option<String>) -> Self {
        self.device = device.filter(|device| !device.trim().is_empty());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectionRequest {
    pub filename: String,
    pub params: DetectionParams,
    /// Skip any stored template match and run the detector again.
    pub refresh: bool,
}

/// Detector output. Regions stay raw until validated by ingestion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionResponse {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub regions: Vec<Value>,
}

impl DetectionResponse {
    pub fn page(&self) -> PageRef {
        PageRef {
            id: self.id.clone().unwrap_or_default(),
            filename: self.filename.clone().unwrap_or_default(),
        }
    }
}

/// Generation counter for grid requests; only the latest one may resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct GridTicket(pub u64);

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GridRequest {
    #[serde(skip)]
    pub ticket: GridTicket,
    #[serde(flatten)]
    pub page: PageRef,
    pub region_id: String,
    #[serde(flatten)]
    pub rect: Rect,
    pub settings: TableSettings,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GridResponse {
    #[serde(default)]
    pub rows: Vec<f64>,
    #[serde(default)]
    pub cols: Vec<f64>,
    #[serde(default)]
    pub preview: Option<Vec<Vec<Option<String>>>>,
    #[serde(default)]
    pub snapped_bbox: Option<Rect>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnchorGeometry {
    pub corner: Corner,
    pub text: String,
    pub bounds: [f64; 4],
    pub search_area: [f64; 4],
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldGeometry {
    pub region_id: String,
    #[serde(rename = "type")]
    pub kind: RegionType,
    #[serde(flatten)]
    pub rect: Rect,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub anchors: Vec<AnchorGeometry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table_settings: Option<TableSettings>,
}

impl FieldGeometry {
    pub fn from_region(region: &Region) -> Self {
        Self {
            region_id: region.id.clone(),
            kind: region.kind,
            rect: region.rect,
            anchors: region
                .anchors()
                .map(|(corner, anchor)| AnchorGeometry {
                    corner,
                    text: anchor.text.clone(),
                    bounds: anchor.bounds,
                    search_area: anchor.search_rect().to_xywh(),
                })
                .collect(),
            table_settings: region.table_settings.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractionRequest {
    #[serde(flatten)]
    pub page: PageRef,
    pub regions: Vec<FieldGeometry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldContent {
    Text(String),
    Grid(Vec<Vec<String>>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedField {
    pub region_id: String,
    pub content: FieldContent,
}

#[derive(Debug, Clone)]
pub enum ProviderImpl {
    Http(HttpBackend),
    Fixture(FixtureProvider),
}

impl DetectionProvider for ProviderImpl {
    fn detect(&self, request: DetectionRequest) -> ProviderFuture<DetectionResponse> {
        match self {
            ProviderImpl::Http(provider) => provider.detect(request),
            ProviderImpl::Fixture(provider) => provider.detect(request),
        }
    }
}

impl GridProvider for ProviderImpl {
    fn analyze_grid(&self, request: GridRequest) -> ProviderFuture<GridResponse> {
        match self {
            ProviderImpl::Http(provider) => provider.analyze_grid(request),
            ProviderImpl::Fixture(provider) => provider.analyze_grid(request),
        }
    }
}

impl ExtractionProvider for ProviderImpl {
    fn extract(&self, request: ExtractionRequest) -> ProviderFuture<Vec<ExtractedField>> {
        match self {
            ProviderImpl::Http(provider) => provider.extract(request),
            ProviderImpl::Fixture(provider) => provider.extract(request),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Strategy;
    use insta::assert_json_snapshot;

    #[test]
    fn presets_match_detector_defaults() {
        let precise = DetectionPreset::Precise.params();
        assert_eq!(precise.imgsz, 1600);
        assert!(precise.agnostic_nms);
        assert_eq!(DetectionParams::default(), DetectionPreset::Balanced.params());
        assert!(DetectionPreset::parse("turbo").is_err());
    }

    #[test]
    fn confidence_is_clamped_and_rounded() {
        let params = DetectionPreset::Fast.params();
        assert_eq!(params.clone().with_confidence(0.9).conf, MAX_CONFIDENCE);
        assert_eq!(params.clone().with_confidence(0.0).conf, MIN_CONFIDENCE);
        assert_eq!(params.clone().with_confidence(0.333).conf, 0.33);
        assert_eq!(params.with_confidence(f64::NAN).conf, 0.35);
    }

    #[test]
    fn grid_request_uses_flat_wire_shape() {
        let request = GridRequest {
            ticket: GridTicket(7),
            page: PageRef::new("3f2a9c", "invoice.pdf"),
            region_id: "table_1".to_string(),
            rect: Rect::new(0.125, 0.25, 0.75, 0.5),
            settings: TableSettings {
                horizontal: Strategy::Lines,
                snap_tolerance: 4.5,
                join_tolerance: 2.5,
                ..TableSettings::default()
            },
        };
        assert_json_snapshot!(request, @r###"
        {
          "id": "3f2a9c",
          "filename": "invoice.pdf",
          "region_id": "table_1",
          "x": 0.125,
          "y": 0.25,
          "width": 0.75,
          "height": 0.5,
          "settings": {
            "vertical_strategy": "text",
            "horizontal_strategy": "lines",
            "snap_tolerance": 4.5,
            "join_tolerance": 2.5,
            "vertical_locked": false,
            "horizontal_locked": false
          }
        }
        "###);
    }

    #[test]
    fn extracted_content_is_text_or_grid() {
        let fields: Vec<ExtractedField> = serde_json::from_value(serde_json::json!([
            {"region_id": "title_1", "content": "INVOICE"},
            {"region_id": "table_1", "content": [["Item", "Qty"], ["Pen", "2"]]}
        ]))
        .unwrap();
        assert_eq!(fields[0].content, FieldContent::Text("INVOICE".to_string()));
        assert!(matches!(&fields[1].content, FieldContent::Grid(rows) if rows.len() == 2));
    }

    #[test]
    fn grid_response_ignores_extra_fields() {
        let response: GridResponse = serde_json::from_value(serde_json::json!({
            "rows": [0.0, 1.0],
            "cols": [0.0, 0.5, 1.0],
            "cells": [{"x": 0.0, "y": 0.0, "w": 0.5, "h": 1.0}],
            "preview": [["a", null]],
            "snapped_bbox": {"x": 0.1, "y": 0.2, "width": 0.3, "height": 0.4}
        }))
        .unwrap();
        assert_eq!(response.cols.len(), 3);
        assert_eq!(response.preview, Some(vec![vec![Some("a".to_string()), None]]));
        assert_eq!(response.snapped_bbox, Some(Rect::new(0.1, 0.2, 0.3, 0.4)));
    }
}
