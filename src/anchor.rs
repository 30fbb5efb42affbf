use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::geometry::{Point, Rect, clamp_to_unit};

const FULL_SPAN_EPSILON: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Corner {
    Tl,
    Tr,
    Bl,
    Br,
}

impl Corner {
    pub const ALL: [Corner; 4] = [Corner::Tl, Corner::Tr, Corner::Bl, Corner::Br];

    pub fn as_str(&self) -> &'static str {
        match self {
            Corner::Tl => "tl",
            Corner::Tr => "tr",
            Corner::Bl => "bl",
            Corner::Br => "br",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "tl" | "top-left" => Ok(Corner::Tl),
            "tr" | "top-right" => Ok(Corner::Tr),
            "bl" | "bottom-left" => Ok(Corner::Bl),
            "br" | "bottom-right" => Ok(Corner::Br),
            other => Err(anyhow!("unknown corner '{}' (expected tl, tr, bl or br)", other)),
        }
    }

    pub fn point(&self, rect: &Rect) -> Point {
        match self {
            Corner::Tl => Point::new(rect.x, rect.y),
            Corner::Tr => Point::new(rect.right(), rect.y),
            Corner::Bl => Point::new(rect.x, rect.bottom()),
            Corner::Br => Point::new(rect.right(), rect.bottom()),
        }
    }
}

/// Expansion of a search area along each axis, in percent (`0` keeps the
/// anchor's own footprint, `100` spans the whole page).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SearchProgress {
    pub width: f64,
    pub height: f64,
}

impl SearchProgress {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    pub fn is_zero(&self) -> bool {
        self.width <= 0.0 && self.height <= 0.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anchor {
    #[serde(default)]
    pub text: String,
    /// `[x0, y0, x1, y1]`
    pub bounds: [f64; 4],
    /// `[x, y, w, h]`; absent means the anchor's own bounds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_area: Option<[f64; 4]>,
}

impl Anchor {
    pub fn new(text: impl Into<String>, bounds: Rect) -> Self {
        Self {
            text: text.into(),
            bounds: clamp_to_unit(bounds).to_bounds(),
            search_area: None,
        }
    }

    pub fn bounds_rect(&self) -> Rect {
        Rect::from_bounds(self.bounds)
    }

    pub fn search_rect(&self) -> Rect {
        match self.search_area {
            Some(area) => Rect::from_xywh(area),
            None => self.bounds_rect(),
        }
    }

    pub fn progress(&self) -> SearchProgress {
        search_progress(&self.bounds_rect(), &self.search_rect())
    }

    pub fn set_progress(&mut self, progress: SearchProgress) {
        if progress.is_zero() {
            self.search_area = None;
            return;
        }
        let area = search_area(&self.bounds_rect(), progress);
        self.search_area = Some(area.to_xywh());
    }

    /// Shifts bounds and search area together, stopping at the page edge.
    pub fn translated(&self, dx: f64, dy: f64) -> Anchor {
        let search = self.search_rect();
        let dx = dx.clamp(-search.x, (1.0 - search.right()).max(-search.x));
        let dy = dy.clamp(-search.y, (1.0 - search.bottom()).max(-search.y));
        Anchor {
            text: self.text.clone(),
            bounds: self.bounds_rect().translate(dx, dy).to_bounds(),
            search_area: self
                .search_area
                .map(|area| Rect::from_xywh(area).translate(dx, dy).to_xywh()),
        }
    }
}

/// Grows `bounds` toward the full page by `progress`, centered on the anchor
/// and shifted (never shrunk) to stay on the page.
pub fn search_area(bounds: &Rect, progress: SearchProgress) -> Rect {
    let (x, width) = expand_axis(bounds.x, bounds.width, progress.width / 100.0);
    let (y, height) = expand_axis(bounds.y, bounds.height, progress.height / 100.0);
    Rect::new(x, y, width, height)
}

pub fn search_progress(bounds: &Rect, area: &Rect) -> SearchProgress {
    SearchProgress {
        width: axis_progress(bounds.width, area.width),
        height: axis_progress(bounds.height, area.height),
    }
}

fn expand_axis(start: f64, size: f64, t: f64) -> (f64, f64) {
    let t = if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.0 };
    if t <= 0.0 {
        return (start, size);
    }
    let target = (size + (1.0 - size) * t).clamp(size.min(1.0), 1.0);
    let center = start + size / 2.0;
    let ideal = center - target / 2.0;
    (ideal.clamp(0.0, (1.0 - target).max(0.0)), target)
}

fn axis_progress(anchor_size: f64, current: f64) -> f64 {
    let span = 1.0 - anchor_size;
    if span <= FULL_SPAN_EPSILON {
        return 100.0;
    }
    ((current - anchor_size) / span * 100.0).clamp(0.0, 100.0)
}
