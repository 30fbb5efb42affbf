use tracing::debug;

use super::{Editor, EditorMode, Effect};
use crate::geometry::{Point, normalize};
use crate::grid::Axis;
use crate::interaction::{Interaction, hit_handle, hit_table_line, insert_hint};

impl Editor {
    /// Converts a client-space position through the current viewport.
    pub fn to_page(&self, client: Point) -> Point {
        self.viewport.normalize(client)
    }

    pub fn pointer_down(&mut self, pos: Point) -> Effect {
        if !self.interaction.is_idle() {
            debug!("pointer down during {}; finishing it first", self.interaction.name());
            let finished = self.pointer_up();
            if matches!(finished, Effect::Reanalyze(_)) {
                return finished;
            }
        }
        if self.refine.is_some() {
            return self.table_pointer_down(pos);
        }

        let handle_tolerance = self.viewport.tolerance(self.config.handle_hit_tolerance_px);
        if let Some(region) = self.selected_region()
            && !region.locked
            && (self.filter.is_empty() || self.filter.contains(&region.kind))
        {
            if let Some(handle) = hit_handle(&region.rect, pos, handle_tolerance) {
                self.interaction = Interaction::Resizing {
                    region_id: region.id.clone(),
                    handle,
                    initial: region.rect,
                    start: pos,
                };
                return Effect::Updated;
            }
            let grabbed = region
                .anchors()
                .find(|(_, anchor)| anchor.bounds_rect().contains(pos))
                .map(|(corner, anchor)| (region.id.clone(), corner, anchor.clone()));
            if let Some((region_id, corner, initial)) = grabbed {
                self.interaction = Interaction::DraggingAnchor {
                    region_id,
                    corner,
                    initial,
                    start: pos,
                };
                return Effect::Updated;
            }
        }

        let hit = self
            .visible_regions()
            .rev()
            .find(|region| region.rect.contains(pos))
            .map(|region| (region.id.clone(), region.rect, region.locked));
        if let Some((id, rect, locked)) = hit {
            if !locked {
                self.interaction = Interaction::Moving {
                    region_id: id.clone(),
                    initial: rect,
                    start: pos,
                };
            }
            self.selected = Some(id);
            return Effect::Updated;
        }

        match self.mode {
            EditorMode::Add => {
                let origin = onto_page(pos);
                self.interaction = Interaction::Drawing {
                    origin,
                    current: origin,
                };
                Effect::Updated
            }
            EditorMode::View => {
                if self.selected.take().is_some() {
                    Effect::Updated
                } else {
                    Effect::None
                }
            }
        }
    }

    fn table_pointer_down(&mut self, pos: Point) -> Effect {
        let Some(session) = &self.refine else {
            return Effect::None;
        };
        let Some(rect) = self.regions.get(&session.state.region_id).map(|region| region.rect) else {
            return Effect::None;
        };
        let tolerance = self.viewport.tolerance(self.config.line_hit_tolerance_px);
        if let Some((axis, index)) = hit_table_line(&rect, &session.state, pos, tolerance)
            && !session.state.settings.is_locked(axis)
        {
            self.interaction = Interaction::DraggingTableLine {
                axis,
                index,
                initial: session.state.lines(axis)[index],
            };
            self.insert_hint = None;
            return Effect::Updated;
        }
        let hint = insert_hint(&rect, &session.state, pos, self.config.edge_hover_margin);
        match hint {
            Some(hint) => {
                self.insert_hint = None;
                match self.insert_table_line(hint.axis, hint.offset) {
                    Some(request) => Effect::Reanalyze(request),
                    None => Effect::None,
                }
            }
            None => Effect::None,
        }
    }

    pub fn pointer_move(&mut self, pos: Point) -> Effect {
        match self.interaction.clone() {
            Interaction::Idle => self.hover(pos),
            Interaction::Drawing { origin, .. } => {
                self.interaction = Interaction::Drawing {
                    origin,
                    current: onto_page(pos),
                };
                Effect::Updated
            }
            Interaction::Moving {
                region_id,
                initial,
                start,
            } => {
                let x = initial.x + (pos.x - start.x);
                let y = initial.y + (pos.y - start.y);
                self.regions.move_to(&region_id, x, y);
                Effect::Updated
            }
            Interaction::Resizing {
                region_id,
                handle,
                initial,
                start,
            } => {
                let rect = handle.apply(
                    &initial,
                    pos.x - start.x,
                    pos.y - start.y,
                    self.config.min_region_size,
                );
                self.regions.set_rect(&region_id, rect);
                Effect::Updated
            }
            Interaction::DraggingTableLine { axis, index, .. } => {
                let Some(session) = self.refine.as_mut() else {
                    return Effect::None;
                };
                let Some(rect) = self.regions.get(&session.state.region_id).map(|region| region.rect)
                else {
                    return Effect::None;
                };
                let offset = match axis {
                    Axis::Rows => (pos.y - rect.y) / rect.height,
                    Axis::Cols => (pos.x - rect.x) / rect.width,
                };
                session.state.move_line(axis, index, offset);
                Effect::Updated
            }
            Interaction::DraggingAnchor {
                region_id,
                corner,
                initial,
                start,
            } => {
                let moved = initial.translated(pos.x - start.x, pos.y - start.y);
                self.regions.set_anchor(&region_id, corner, moved);
                Effect::Updated
            }
        }
    }

    fn hover(&mut self, pos: Point) -> Effect {
        let Some(session) = &self.refine else {
            return Effect::None;
        };
        let Some(rect) = self.regions.get(&session.state.region_id).map(|region| region.rect) else {
            return Effect::None;
        };
        let tolerance = self.viewport.tolerance(self.config.line_hit_tolerance_px);
        let hint = if hit_table_line(&rect, &session.state, pos, tolerance).is_some() {
            None
        } else {
            insert_hint(&rect, &session.state, pos, self.config.edge_hover_margin)
        };
        if hint == self.insert_hint {
            return Effect::None;
        }
        self.insert_hint = hint;
        Effect::Updated
    }

    /// Ends the current gesture. Drags record one snapshot, and only when
    /// something actually moved; a released table line asks for re-analysis.
    pub fn pointer_up(&mut self) -> Effect {
        match std::mem::take(&mut self.interaction) {
            Interaction::Idle => Effect::None,
            Interaction::Drawing { origin, current } => {
                let rect = normalize(origin, current);
                match self.add_region(rect) {
                    Some(_) => Effect::Committed,
                    None => Effect::None,
                }
            }
            Interaction::Moving { .. }
            | Interaction::Resizing { .. }
            | Interaction::DraggingAnchor { .. } => {
                if self.commit_if_changed() {
                    Effect::Committed
                } else {
                    Effect::None
                }
            }
            Interaction::DraggingTableLine {
                axis,
                index,
                initial,
            } => {
                let moved = self
                    .refine
                    .as_ref()
                    .and_then(|session| session.state.lines(axis).get(index).copied())
                    .is_some_and(|offset| offset != initial);
                if !moved {
                    return Effect::None;
                }
                match self.issue_reanalysis() {
                    Some(request) => Effect::Reanalyze(request),
                    None => Effect::None,
                }
            }
        }
    }

    /// Releasing outside the surface ends the gesture exactly like a release.
    pub fn pointer_leave(&mut self) -> Effect {
        self.pointer_up()
    }
}

/// Drawn boxes are cropped at the page edge rather than shifted back onto it.
fn onto_page(pos: Point) -> Point {
    Point::new(pos.x.clamp(0.0, 1.0), pos.y.clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::super::tests::{editor_with, sample};
    use super::*;
    use crate::anchor::{Anchor, Corner};
    use crate::geometry::Rect;
    use crate::region::{Region, RegionType};

    fn p(x: f64, y: f64) -> Point {
        Point::new(x, y)
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn drawing_commits_custom_region() {
        let mut editor = editor_with(Vec::new());
        editor.set_mode(EditorMode::Add);
        assert_eq!(editor.pointer_down(p(0.4, 0.3)), Effect::Updated);
        editor.pointer_move(p(0.2, 0.2));
        editor.pointer_move(p(0.1, 0.1));
        assert_eq!(editor.pointer_up(), Effect::Committed);

        let region = &editor.regions()[0];
        assert_eq!(region.id, "custom_1");
        assert_eq!(region.kind, RegionType::Custom);
        assert!(approx(region.rect.width, 0.3));
        assert_eq!(editor.selected(), Some("custom_1"));
        assert_eq!(editor.history_len(), 2);
    }

    #[test]
    fn drawing_past_page_edge_is_cropped() {
        let mut editor = editor_with(Vec::new());
        editor.set_mode(EditorMode::Add);
        editor.pointer_down(p(0.75, 0.75));
        editor.pointer_move(p(1.25, 1.5));
        assert_eq!(editor.pointer_up(), Effect::Committed);
        assert_eq!(editor.regions()[0].rect, Rect::new(0.75, 0.75, 0.25, 0.25));

        editor.pointer_down(p(0.25, 0.5));
        editor.pointer_move(p(-0.5, 0.625));
        assert_eq!(editor.pointer_up(), Effect::Committed);
        assert_eq!(editor.regions()[1].rect, Rect::new(0.0, 0.5, 0.25, 0.125));
    }

    #[test]
    fn click_without_drag_draws_nothing() {
        let mut editor = editor_with(Vec::new());
        editor.set_mode(EditorMode::Add);
        editor.pointer_down(p(0.5, 0.5));
        editor.pointer_move(p(0.502, 0.6));
        assert_eq!(editor.pointer_up(), Effect::None);
        assert!(editor.regions().is_empty());
        assert_eq!(editor.history_len(), 1);
    }

    #[test]
    fn move_applies_offset_and_stays_on_page() {
        let mut editor = sample();
        editor.pointer_down(p(0.5, 0.5));
        assert_eq!(editor.selected(), Some("table_1"));
        editor.pointer_move(p(0.55, 0.45));
        let rect = editor.region("table_1").unwrap().rect;
        assert!(approx(rect.x, 0.15));
        assert!(approx(rect.y, 0.25));

        editor.pointer_move(p(2.0, 2.0));
        let rect = editor.region("table_1").unwrap().rect;
        assert!(approx(rect.right(), 1.0));
        assert!(approx(rect.bottom(), 1.0));
        assert_eq!(editor.pointer_up(), Effect::Committed);
        assert_eq!(editor.history_len(), 2);
    }

    #[test]
    fn plain_click_selects_without_history() {
        let mut editor = sample();
        editor.pointer_down(p(0.5, 0.5));
        assert_eq!(editor.pointer_up(), Effect::None);
        assert_eq!(editor.selected(), Some("table_1"));
        assert_eq!(editor.history_len(), 1);

        editor.pointer_down(p(0.5, 0.95));
        assert_eq!(editor.selected(), None);
    }

    #[test]
    fn locked_region_selects_but_does_not_move() {
        let mut editor = sample();
        editor.toggle_region_lock("table_1");
        let before = editor.region("table_1").unwrap().rect;
        editor.pointer_down(p(0.5, 0.5));
        assert!(editor.interaction().is_idle());
        editor.pointer_move(p(0.6, 0.6));
        editor.pointer_up();
        assert_eq!(editor.region("table_1").unwrap().rect, before);
        assert_eq!(editor.selected(), Some("table_1"));
    }

    #[test]
    fn resize_by_handle_records_once() {
        let mut editor = sample();
        editor.select("table_1");
        // south-east corner of table_1 is at (0.9, 0.7)
        assert_eq!(editor.pointer_down(p(0.9, 0.7)), Effect::Updated);
        for step in 1..=5 {
            let d = 0.01 * step as f64;
            editor.pointer_move(p(0.9 + d, 0.7 + d));
        }
        assert_eq!(editor.pointer_up(), Effect::Committed);
        let rect = editor.region("table_1").unwrap().rect;
        assert!(approx(rect.width, 0.85));
        assert!(approx(rect.height, 0.45));
        assert_eq!(editor.history_len(), 2);
    }

    #[test]
    fn topmost_region_wins_hit_test() {
        let mut editor = editor_with(vec![
            Region::new("figure_1", RegionType::Figure, Rect::new(0.0, 0.0, 0.6, 0.6)),
            Region::new("figure_caption_1", RegionType::FigureCaption, Rect::new(0.1, 0.1, 0.2, 0.2)),
        ]);
        editor.pointer_down(p(0.15, 0.15));
        assert_eq!(editor.selected(), Some("figure_caption_1"));
    }

    #[test]
    fn filtered_regions_are_not_hittable() {
        let mut editor = sample();
        editor.set_filter([RegionType::Title].into_iter().collect());
        editor.pointer_down(p(0.5, 0.5));
        assert_eq!(editor.selected(), None);
    }

    #[test]
    fn leaving_the_surface_ends_the_gesture() {
        let mut editor = sample();
        editor.pointer_down(p(0.5, 0.5));
        editor.pointer_move(p(0.5, 0.4));
        assert_eq!(editor.pointer_leave(), Effect::Committed);
        assert!(editor.interaction().is_idle());
    }

    #[test]
    fn anchor_drag_moves_bounds_and_search_area() {
        let mut editor = sample();
        editor.place_anchor("table_1", Corner::Tl, "No.", Rect::new(0.2, 0.4, 0.1, 0.05));
        editor.set_search_progress("table_1", Corner::Tl, crate::anchor::SearchProgress::new(10.0, 10.0));
        let len = editor.history_len();
        editor.select("table_1");

        editor.pointer_down(p(0.25, 0.42));
        assert!(matches!(editor.interaction(), Interaction::DraggingAnchor { .. }));
        editor.pointer_move(p(0.35, 0.52));
        assert_eq!(editor.pointer_up(), Effect::Committed);
        assert_eq!(editor.history_len(), len + 1);

        let anchor: &Anchor = editor.region("table_1").unwrap().anchor(Corner::Tl).unwrap();
        let bounds = anchor.bounds_rect();
        assert!(approx(bounds.x, 0.3));
        assert!(approx(bounds.y, 0.5));
        assert!(anchor.search_rect().contains_rect(&bounds));
        assert_eq!(editor.region("table_1").unwrap().rect, Rect::new(0.1, 0.3, 0.8, 0.4));
    }
}
