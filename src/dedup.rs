use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::geometry::{Rect, clamp_to_unit, iou};
use crate::region::{Region, RegionType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DedupMode {
    Off,
    #[default]
    Moderate,
    Aggressive,
}

impl DedupMode {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "off" | "none" => Ok(DedupMode::Off),
            "moderate" => Ok(DedupMode::Moderate),
            "aggressive" => Ok(DedupMode::Aggressive),
            other => Err(anyhow!(
                "unknown dedup mode '{}' (expected off, moderate or aggressive)",
                other
            )),
        }
    }

    pub fn threshold(&self) -> Option<f64> {
        match self {
            DedupMode::Off => None,
            DedupMode::Moderate => Some(0.5),
            DedupMode::Aggressive => Some(0.3),
        }
    }
}

/// Greedy one-pass merge of same-type regions whose IoU reaches the mode's
/// threshold. Each survivor absorbs later regions into a growing union box,
/// so the result depends on input order.
pub fn dedup(regions: Vec<Region>, mode: DedupMode) -> Vec<Region> {
    let Some(threshold) = mode.threshold() else {
        return regions;
    };
    let total = regions.len();
    let mut consumed = vec![false; total];
    let mut merged = Vec::with_capacity(total);

    for i in 0..total {
        if consumed[i] {
            continue;
        }
        let mut current = regions[i].clone();
        for j in (i + 1)..total {
            if consumed[j] || regions[j].kind != current.kind {
                continue;
            }
            if iou(&current.rect, &regions[j].rect) >= threshold {
                debug!("merging {} into {}", regions[j].id, current.id);
                current.rect = current.rect.union(&regions[j].rect);
                consumed[j] = true;
            }
        }
        merged.push(current);
    }

    if merged.len() != total {
        debug!("dedup {:?}: {} -> {} regions", mode, total, merged.len());
    }
    merged
}

#[derive(Debug, Default, Deserialize)]
struct RawRegion {
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    x: Option<f64>,
    #[serde(default)]
    y: Option<f64>,
    #[serde(default)]
    width: Option<f64>,
    #[serde(default)]
    height: Option<f64>,
    #[serde(default)]
    label: Option<String>,
    #[serde(default, alias = "memo")]
    remarks: Option<String>,
}

/// Validates raw detector entries, merges them and assigns per-type ids.
/// Entries that cannot be placed on the page are dropped with a warning.
pub fn ingest(raw: &[Value], mode: DedupMode) -> Vec<Region> {
    let mut regions = Vec::with_capacity(raw.len());
    for (index, value) in raw.iter().enumerate() {
        if let Some(region) = validate(index, value) {
            regions.push(region);
        }
    }
    let mut regions = dedup(regions, mode);
    assign_detector_ids(&mut regions);
    regions
}

fn validate(index: usize, value: &Value) -> Option<Region> {
    let raw: RawRegion = match serde_json::from_value(value.clone()) {
        Ok(raw) => raw,
        Err(err) => {
            warn!("dropping detector entry #{}: {}", index, err);
            return None;
        }
    };
    let (Some(x), Some(y), Some(width), Some(height)) = (raw.x, raw.y, raw.width, raw.height)
    else {
        warn!("dropping detector entry #{}: missing coordinates", index);
        return None;
    };
    let rect = Rect::new(x, y, width, height);
    if !rect.is_finite() || width <= 0.0 || height <= 0.0 {
        warn!("dropping detector entry #{}: invalid geometry {:?}", index, rect);
        return None;
    }

    let kind = match raw.kind.as_deref() {
        Some(name) => RegionType::parse(name).unwrap_or_else(|| {
            warn!("detector entry #{} has unknown type '{}'; using custom", index, name);
            RegionType::Custom
        }),
        None => {
            warn!("detector entry #{} has no type; using custom", index);
            RegionType::Custom
        }
    };

    let mut region = Region::new(format!("raw_{}", index), kind, clamp_to_unit(rect));
    region.label = raw.label.unwrap_or_default();
    if region.has_generic_label() {
        region.label = kind.display_name().to_string();
    }
    region.remarks = raw.remarks.unwrap_or_default();
    Some(region)
}

fn assign_detector_ids(regions: &mut [Region]) {
    let mut counters: HashMap<RegionType, usize> = HashMap::new();
    for region in regions.iter_mut() {
        let counter = counters.entry(region.kind).or_insert(0);
        *counter += 1;
        region.id = format!("{}_{}", region.kind.slug(), counter);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn region(id: &str, kind: RegionType, x: f64, y: f64, w: f64, h: f64) -> Region {
        Region::new(id, kind, Rect::new(x, y, w, h))
    }

    fn chain() -> Vec<Region> {
        vec![
            region("a", RegionType::Table, 0.0, 0.0, 0.5, 0.5),
            region("b", RegionType::Table, 0.05, 0.05, 0.5, 0.5),
            region("c", RegionType::Table, 0.5, 0.5, 0.3, 0.3),
        ]
    }

    #[test]
    fn off_mode_is_identity() {
        let input = chain();
        assert_eq!(dedup(input.clone(), DedupMode::Off), input);
    }

    #[test]
    fn moderate_merges_overlapping_pair_only() {
        let merged = dedup(chain(), DedupMode::Moderate);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].id, "a");
        let rect = merged[0].rect;
        assert_eq!(rect.x, 0.0);
        assert_eq!(rect.y, 0.0);
        assert!((rect.width - 0.55).abs() < 1e-9);
        assert!((rect.height - 0.55).abs() < 1e-9);
        assert_eq!(merged[1].id, "c");
    }

    #[test]
    fn dedup_is_idempotent() {
        for mode in [DedupMode::Moderate, DedupMode::Aggressive] {
            let once = dedup(chain(), mode);
            let twice = dedup(once.clone(), mode);
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn different_types_never_merge() {
        let input = vec![
            region("a", RegionType::Table, 0.1, 0.1, 0.4, 0.4),
            region("b", RegionType::Figure, 0.1, 0.1, 0.4, 0.4),
        ];
        assert_eq!(dedup(input, DedupMode::Aggressive).len(), 2);
    }

    #[test]
    fn growing_union_absorbs_third_region_in_same_scan() {
        // b merges into a first; c only overlaps enough with the enlarged box.
        let input = vec![
            region("a", RegionType::PlainText, 0.0, 0.0, 0.4, 0.2),
            region("b", RegionType::PlainText, 0.1, 0.0, 0.4, 0.2),
            region("c", RegionType::PlainText, 0.2, 0.0, 0.35, 0.2),
        ];
        assert!(iou(&input[0].rect, &input[2].rect) < 0.5);
        let merged = dedup(input, DedupMode::Moderate);
        assert_eq!(merged.len(), 1);
        assert!((merged[0].rect.right() - 0.55).abs() < 1e-9);
    }

    #[test]
    fn ingest_drops_malformed_entries_and_assigns_ids() {
        let raw = vec![
            json!({"type": "table", "x": 0.1, "y": 0.1, "width": 0.5, "height": 0.3}),
            json!({"type": "title", "x": 0.1, "y": 0.0, "width": 0.8, "height": 0.05}),
            json!({"type": "table", "x": 0.1, "y": 0.6, "width": 0.5, "height": 0.3}),
            json!({"type": "figure", "x": 0.1, "y": 0.1, "width": 0.0, "height": 0.3}),
            json!({"type": "figure", "x": "left"}),
            json!({"type": "stamp", "x": 0.9, "y": 0.9, "width": 0.2, "height": 0.2}),
            json!({"x": 0.2, "y": 0.2}),
            json!("not a region"),
        ];
        let regions = ingest(&raw, DedupMode::Moderate);
        let ids: Vec<_> = regions.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["table_1", "title_1", "table_2", "custom_1"]);

        let custom = &regions[3];
        assert_eq!(custom.kind, RegionType::Custom);
        assert!((custom.rect.right() - 1.0).abs() < 1e-9);
        assert_eq!(regions[0].label, "Table");
    }

    #[test]
    fn ingest_keeps_specific_detector_labels() {
        let raw = vec![json!({
            "type": "plain_text", "x": 0.1, "y": 0.1, "width": 0.2, "height": 0.2,
            "label": "Address block"
        })];
        let regions = ingest(&raw, DedupMode::Off);
        assert_eq!(regions[0].kind, RegionType::PlainText);
        assert_eq!(regions[0].label, "Address block");
        assert_eq!(regions[0].id, "plain_text_1");
    }

    #[test]
    fn dedup_mode_parses_case_insensitively() {
        assert_eq!(DedupMode::parse("Aggressive").unwrap(), DedupMode::Aggressive);
        assert!(DedupMode::parse("extreme").is_err());
    }
}
