use anyhow::{anyhow, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use crate::anchor::{Anchor, Corner};
use crate::geometry::{Rect, clamp_to_unit};
use crate::grid::TableSettings;

pub const CUSTOM_ID_PREFIX: &str = "custom_";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RegionType {
    Title,
    Table,
    PlainText,
    Figure,
    List,
    Header,
    Footer,
    Equation,
    TableCaption,
    FigureCaption,
    Abandon,
    Custom,
}

impl RegionType {
    pub const ALL: [RegionType; 12] = [
        RegionType::Title,
        RegionType::Table,
        RegionType::PlainText,
        RegionType::Figure,
        RegionType::List,
        RegionType::Header,
        RegionType::Footer,
        RegionType::Equation,
        RegionType::TableCaption,
        RegionType::FigureCaption,
        RegionType::Abandon,
        RegionType::Custom,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RegionType::Title => "title",
            RegionType::Table => "table",
            RegionType::PlainText => "plain text",
            RegionType::Figure => "figure",
            RegionType::List => "list",
            RegionType::Header => "header",
            RegionType::Footer => "footer",
            RegionType::Equation => "equation",
            RegionType::TableCaption => "table caption",
            RegionType::FigureCaption => "figure caption",
            RegionType::Abandon => "abandon",
            RegionType::Custom => "custom",
        }
    }

    /// Identifier-safe form used as the prefix of detector ids.
    pub fn slug(&self) -> &'static str {
        match self {
            RegionType::PlainText => "plain_text",
            RegionType::TableCaption => "table_caption",
            RegionType::FigureCaption => "figure_caption",
            other => other.as_str(),
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            RegionType::Title => "Title",
            RegionType::Table => "Table",
            RegionType::PlainText => "Plain text",
            RegionType::Figure => "Figure",
            RegionType::List => "List",
            RegionType::Header => "Header",
            RegionType::Footer => "Footer",
            RegionType::Equation => "Equation",
            RegionType::TableCaption => "Table caption",
            RegionType::FigureCaption => "Figure caption",
            RegionType::Abandon => "Abandoned",
            RegionType::Custom => "Custom region",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let lower = value.trim().to_lowercase().replace(['_', '-'], " ");
        let kind = match lower.as_str() {
            "title" => RegionType::Title,
            "table" => RegionType::Table,
            "plain text" | "text" => RegionType::PlainText,
            "figure" | "picture" => RegionType::Figure,
            "list" => RegionType::List,
            "header" => RegionType::Header,
            "footer" => RegionType::Footer,
            "equation" | "isolate formula" => RegionType::Equation,
            "table caption" => RegionType::TableCaption,
            "figure caption" => RegionType::FigureCaption,
            "abandon" => RegionType::Abandon,
            "custom" => RegionType::Custom,
            _ => return None,
        };
        Some(kind)
    }
}

impl Serialize for RegionType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for RegionType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        RegionType::parse(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown region type '{}'", raw)))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Positioning {
    #[serde(default)]
    pub anchors: BTreeMap<Corner, Anchor>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: RegionType,
    #[serde(flatten)]
    pub rect: Rect,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub label: String,
    #[serde(default, alias = "memo", deserialize_with = "null_as_empty")]
    pub remarks: String,
    #[serde(default)]
    pub locked: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_settings: Option<TableSettings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub positioning: Option<Positioning>,
}

fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

impl Region {
    pub fn new(id: impl Into<String>, kind: RegionType, rect: Rect) -> Self {
        Self {
            id: id.into(),
            kind,
            rect: clamp_to_unit(rect),
            label: String::new(),
            remarks: String::new(),
            locked: false,
            table_settings: None,
            positioning: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn has_generic_label(&self) -> bool {
        let label = self.label.trim();
        label.is_empty()
            || label.eq_ignore_ascii_case(self.kind.as_str())
            || label.eq_ignore_ascii_case(self.kind.display_name())
    }

    pub fn display_label(&self) -> &str {
        if self.has_generic_label() {
            self.kind.display_name()
        } else {
            self.label.trim()
        }
    }

    pub fn anchor(&self, corner: Corner) -> Option<&Anchor> {
        self.positioning.as_ref()?.anchors.get(&corner)
    }

    pub fn anchors(&self) -> impl Iterator<Item = (Corner, &Anchor)> {
        self.positioning
            .iter()
            .flat_map(|positioning| positioning.anchors.iter().map(|(corner, anchor)| (*corner, anchor)))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegionSet {
    regions: Vec<Region>,
}

impl RegionSet {
    pub fn new(regions: Vec<Region>) -> Self {
        Self { regions }
    }

    pub fn as_slice(&self) -> &[Region] {
        &self.regions
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Region> {
        self.regions.iter()
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Region> {
        self.regions.iter().find(|region| region.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn into_vec(self) -> Vec<Region> {
        self.regions
    }

    /// Regions a user can see and hit under the given type filter (empty = all).
    pub fn visible<'a>(
        &'a self,
        filter: &'a BTreeSet<RegionType>,
    ) -> impl DoubleEndedIterator<Item = &'a Region> + 'a {
        self.regions
            .iter()
            .filter(move |region| filter.is_empty() || filter.contains(&region.kind))
    }

    pub fn push(&mut self, region: Region) -> Result<()> {
        if self.contains(&region.id) {
            return Err(anyhow!("region id '{}' already exists", region.id));
        }
        self.regions.push(region);
        Ok(())
    }

    pub fn remove(&mut self, id: &str) -> Option<Region> {
        let index = self.regions.iter().position(|region| region.id == id)?;
        Some(self.regions.remove(index))
    }

    pub fn next_custom_id(&self) -> String {
        let next = self
            .regions
            .iter()
            .filter_map(|region| region.id.strip_prefix(CUSTOM_ID_PREFIX))
            .filter_map(|suffix| suffix.parse::<u64>().ok())
            .max()
            .map_or(1, |max| max + 1);
        format!("{}{}", CUSTOM_ID_PREFIX, next)
    }

    fn unlocked_mut(&mut self, id: &str) -> Option<&mut Region> {
        let region = self.regions.iter_mut().find(|region| region.id == id)?;
        if region.locked {
            debug!("region {} is locked; edit ignored", id);
            return None;
        }
        Some(region)
    }

    pub fn move_to(&mut self, id: &str, x: f64, y: f64) -> bool {
        let Some(region) = self.unlocked_mut(id) else {
            return false;
        };
        let moved = Rect::new(
            x.clamp(0.0, 1.0 - region.rect.width),
            y.clamp(0.0, 1.0 - region.rect.height),
            region.rect.width,
            region.rect.height,
        );
        replace_rect(region, moved)
    }

    pub fn set_rect(&mut self, id: &str, rect: Rect) -> bool {
        if !rect.is_finite() || rect.width <= 0.0 || rect.height <= 0.0 {
            debug!("rejecting degenerate rect for region {}", id);
            return false;
        }
        let Some(region) = self.unlocked_mut(id) else {
            return false;
        };
        replace_rect(region, clamp_to_unit(rect))
    }

    pub fn set_type(&mut self, id: &str, kind: RegionType) -> bool {
        let Some(region) = self.unlocked_mut(id) else {
            return false;
        };
        if region.kind == kind {
            return false;
        }
        if region.has_generic_label() {
            region.label = kind.display_name().to_string();
        }
        region.kind = kind;
        if kind != RegionType::Table {
            region.table_settings = None;
        }
        true
    }

    pub fn set_label(&mut self, id: &str, label: &str) -> bool {
        let Some(region) = self.unlocked_mut(id) else {
            return false;
        };
        if region.label == label {
            return false;
        }
        region.label = label.to_string();
        true
    }

    pub fn set_remarks(&mut self, id: &str, remarks: &str) -> bool {
        let Some(region) = self.unlocked_mut(id) else {
            return false;
        };
        if region.remarks == remarks {
            return false;
        }
        region.remarks = remarks.to_string();
        true
    }

    pub fn toggle_lock(&mut self, id: &str) -> bool {
        let Some(region) = self.regions.iter_mut().find(|region| region.id == id) else {
            return false;
        };
        region.locked = !region.locked;
        true
    }

    pub fn set_table_settings(&mut self, id: &str, settings: TableSettings) -> bool {
        let Some(region) = self.regions.iter_mut().find(|region| region.id == id) else {
            return false;
        };
        if region.kind != RegionType::Table || region.table_settings.as_ref() == Some(&settings) {
            return false;
        }
        region.table_settings = Some(settings);
        true
    }

    pub fn set_anchor(&mut self, id: &str, corner: Corner, anchor: Anchor) -> bool {
        let Some(region) = self.unlocked_mut(id) else {
            return false;
        };
        let positioning = region.positioning.get_or_insert_with(Positioning::default);
        if positioning.anchors.get(&corner) == Some(&anchor) {
            return false;
        }
        positioning.anchors.insert(corner, anchor);
        true
    }

    pub fn remove_anchor(&mut self, id: &str, corner: Corner) -> bool {
        let Some(region) = self.unlocked_mut(id) else {
            return false;
        };
        let Some(positioning) = region.positioning.as_mut() else {
            return false;
        };
        let removed = positioning.anchors.remove(&corner).is_some();
        if positioning.anchors.is_empty() {
            region.positioning = None;
        }
        removed
    }
}

fn replace_rect(region: &mut Region, rect: Rect) -> bool {
    if region.rect == rect {
        return false;
    }
    region.rect = rect;
    true
}
