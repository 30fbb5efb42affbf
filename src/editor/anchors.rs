use tracing::debug;

use super::Editor;
use crate::anchor::{Anchor, Corner, SearchProgress};
use crate::geometry::Rect;

impl Editor {
    /// Places (or replaces) the anchor at `corner`. A replaced anchor keeps
    /// its search progress.
    pub fn place_anchor(&mut self, region_id: &str, corner: Corner, text: &str, bounds: Rect) -> bool {
        if self.refine_blocks("place anchor") {
            return false;
        }
        if !bounds.is_finite() || bounds.width <= 0.0 || bounds.height <= 0.0 {
            debug!("ignoring anchor with invalid bounds {:?}", bounds);
            return false;
        }
        let mut anchor = Anchor::new(text.trim(), bounds);
        if let Some(previous) = self.regions.get(region_id).and_then(|region| region.anchor(corner)) {
            anchor.set_progress(previous.progress());
        }
        let changed = self.regions.set_anchor(region_id, corner, anchor);
        self.commit(changed)
    }

    pub fn search_progress(&self, region_id: &str, corner: Corner) -> Option<SearchProgress> {
        self.regions
            .get(region_id)
            .and_then(|region| region.anchor(corner))
            .map(Anchor::progress)
    }

    /// Grows the anchor's search area; both percentages are clamped to `0..=100`.
    pub fn set_search_progress(&mut self, region_id: &str, corner: Corner, progress: SearchProgress) -> bool {
        if self.refine_blocks("set search area") {
            return false;
        }
        if !progress.width.is_finite() || !progress.height.is_finite() {
            return false;
        }
        let Some(mut anchor) = self
            .regions
            .get(region_id)
            .and_then(|region| region.anchor(corner))
            .cloned()
        else {
            return false;
        };
        anchor.set_progress(SearchProgress::new(
            progress.width.clamp(0.0, 100.0),
            progress.height.clamp(0.0, 100.0),
        ));
        let changed = self.regions.set_anchor(region_id, corner, anchor);
        self.commit(changed)
    }

    pub fn move_anchor(&mut self, region_id: &str, corner: Corner, dx: f64, dy: f64) -> bool {
        if self.refine_blocks("move anchor") || !dx.is_finite() || !dy.is_finite() {
            return false;
        }
        let Some(anchor) = self
            .regions
            .get(region_id)
            .and_then(|region| region.anchor(corner))
            .map(|anchor| anchor.translated(dx, dy))
        else {
            return false;
        };
        let changed = self.regions.set_anchor(region_id, corner, anchor);
        self.commit(changed)
    }

    /// Removes only the anchor at `corner`; the others stay.
    pub fn delete_anchor(&mut self, region_id: &str, corner: Corner) -> bool {
        if self.refine_blocks("delete anchor") {
            return false;
        }
        let changed = self.regions.remove_anchor(region_id, corner);
        self.commit(changed)
    }
}
