use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use super::{
    DetectionProvider, DetectionRequest, DetectionResponse, ExtractedField, ExtractionProvider,
    ExtractionRequest, GridProvider, GridRequest, GridResponse, ProviderFuture,
};

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";

/// Client for the layout backend's `/analyze` and `/table/analyze` routes.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    base_url: String,
    client: reqwest::Client,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        let trimmed = base_url.trim().trim_end_matches('/');
        Self {
            base_url: if trimmed.is_empty() {
                DEFAULT_BASE_URL.to_string()
            } else {
                trimmed.to_string()
            },
            client: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl DetectionProvider for HttpBackend {
    fn detect(&self, request: DetectionRequest) -> ProviderFuture<DetectionResponse> {
        let client = self.client.clone();
        let url = format!("{}/analyze", self.base_url);
        Box::pin(async move {
            let params = &request.params;
            let mut query = vec![
                ("conf", params.conf.to_string()),
                ("imgsz", params.imgsz.to_string()),
                ("iou", params.iou.to_string()),
                ("agnostic_nms", params.agnostic_nms.to_string()),
                ("refresh", request.refresh.to_string()),
            ];
            if let Some(device) = &params.device {
                query.push(("device", device.clone()));
            }
            info!("detecting layout of {} (conf {})", request.filename, params.conf);
            let response = client
                .post(&url)
                .query(&query)
                .form(&[("filename", request.filename.as_str())])
                .send()
                .await
                .with_context(|| format!("failed to reach {}", url))?;
            read_json(response, "layout analysis").await
        })
    }
}

impl GridProvider for HttpBackend {
    fn analyze_grid(&self, request: GridRequest) -> ProviderFuture<GridResponse> {
        let client = self.client.clone();
        let url = format!("{}/table/analyze", self.base_url);
        Box::pin(async move {
            debug!(
                "requesting grid for {} ({} / {})",
                request.region_id,
                request.settings.vertical.name(),
                request.settings.horizontal.name()
            );
            let response = client
                .post(&url)
                .json(&request)
                .send()
                .await
                .with_context(|| format!("failed to reach {}", url))?;
            read_json(response, "table analysis").await
        })
    }
}

impl ExtractionProvider for HttpBackend {
    fn extract(&self, request: ExtractionRequest) -> ProviderFuture<Vec<ExtractedField>> {
        let base_url = self.base_url.clone();
        Box::pin(async move {
            Err(anyhow!(
                "{} extracts only from saved templates; cannot extract {} region(s) of an unsaved layout",
                base_url,
                request.regions.len()
            ))
        })
    }
}

async fn read_json<T: DeserializeOwned>(response: reqwest::Response, what: &str) -> Result<T> {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    if !status.is_success() {
        return Err(anyhow!(
            "{} failed ({}): {}",
            what,
            status,
            extract_detail(&text).unwrap_or(text)
        ));
    }
    serde_json::from_str(&text).with_context(|| format!("invalid {} response", what))
}

fn extract_detail(body: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct ErrorBody {
        detail: Option<serde_json::Value>,
    }

    let parsed: ErrorBody = serde_json::from_str(body).ok()?;
    match parsed.detail? {
        serde_json::Value::String(detail) => Some(detail),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_is_trimmed() {
        assert_eq!(HttpBackend::new("http://localhost:8000/").base_url(), "http://localhost:8000");
        assert_eq!(HttpBackend::new("  ").base_url(), DEFAULT_BASE_URL);
    }

    #[test]
    fn error_detail_is_surfaced() {
        assert_eq!(
            extract_detail(r#"{"detail": "File not found"}"#),
            Some("File not found".to_string())
        );
        assert_eq!(
            extract_detail(r#"{"detail": [{"loc": ["body", "x"]}]}"#),
            Some(r#"[{"loc":["body","x"]}]"#.to_string())
        );
        assert_eq!(extract_detail("Internal Server Error"), None);
    }
}
