use serde::{Deserialize, Serialize};

use crate::anchor::{Anchor, Corner};
use crate::geometry::{Point, Rect, normalize};
use crate::grid::{Axis, TableRefinement};

/// Compass position of a resize handle on a region's outline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Handle {
    N,
    Ne,
    E,
    Se,
    S,
    Sw,
    W,
    Nw,
}

impl Handle {
    pub const ALL: [Handle; 8] = [
        Handle::Nw,
        Handle::Ne,
        Handle::Se,
        Handle::Sw,
        Handle::N,
        Handle::E,
        Handle::S,
        Handle::W,
    ];

    fn moves_north(&self) -> bool {
        matches!(self, Handle::N | Handle::Ne | Handle::Nw)
    }

    fn moves_south(&self) -> bool {
        matches!(self, Handle::S | Handle::Se | Handle::Sw)
    }

    fn moves_west(&self) -> bool {
        matches!(self, Handle::W | Handle::Nw | Handle::Sw)
    }

    fn moves_east(&self) -> bool {
        matches!(self, Handle::E | Handle::Ne | Handle::Se)
    }

    pub fn position(&self, rect: &Rect) -> Point {
        let center = rect.center();
        let x = if self.moves_west() {
            rect.x
        } else if self.moves_east() {
            rect.right()
        } else {
            center.x
        };
        let y = if self.moves_north() {
            rect.y
        } else if self.moves_south() {
            rect.bottom()
        } else {
            center.y
        };
        Point::new(x, y)
    }

    /// Resizes `initial` by the pointer delta. North/west edges keep the
    /// opposite edge fixed; every side is floored at `min_size` and the
    /// result never leaves the page.
    pub fn apply(&self, initial: &Rect, dx: f64, dy: f64, min_size: f64) -> Rect {
        let (mut x, mut width) = (initial.x, initial.width);
        let (mut y, mut height) = (initial.y, initial.height);

        if self.moves_east() {
            width = (initial.width + dx).max(min_size).min(1.0 - initial.x);
        }
        if self.moves_west() {
            let right = initial.right();
            x = (initial.x + dx).clamp(0.0, (right - min_size).max(0.0));
            width = right - x;
        }
        if self.moves_south() {
            height = (initial.height + dy).max(min_size).min(1.0 - initial.y);
        }
        if self.moves_north() {
            let bottom = initial.bottom();
            y = (initial.y + dy).clamp(0.0, (bottom - min_size).max(0.0));
            height = bottom - y;
        }
        Rect::new(x, y, width, height)
    }
}

/// Pixel box of the page surface, used to turn client coordinates into page units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            left: 0.0,
            top: 0.0,
            width: 1000.0,
            height: 1000.0,
        }
    }
}

impl Viewport {
    pub fn is_valid(&self) -> bool {
        self.width.is_finite() && self.height.is_finite() && self.width > 0.0 && self.height > 0.0
    }

    pub fn normalize(&self, client: Point) -> Point {
        Point::new(
            (client.x - self.left) / self.width,
            (client.y - self.top) / self.height,
        )
    }

    pub fn denormalize(&self, page: Point) -> Point {
        Point::new(
            self.left + page.x * self.width,
            self.top + page.y * self.height,
        )
    }

    /// Pixel box of a page-relative rectangle, for drawing overlays.
    pub fn denormalize_rect(&self, rect: &Rect) -> Rect {
        let origin = self.denormalize(Point::new(rect.x, rect.y));
        Rect::new(origin.x, origin.y, rect.width * self.width, rect.height * self.height)
    }

    /// Converts a pixel tolerance into page units along each axis.
    pub fn tolerance(&self, px: f64) -> Point {
        Point::new(px / self.width, px / self.height)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum Interaction {
    #[default]
    Idle,
    Drawing {
        origin: Point,
        current: Point,
    },
    Moving {
        region_id: String,
        initial: Rect,
        start: Point,
    },
    Resizing {
        region_id: String,
        handle: Handle,
        initial: Rect,
        start: Point,
    },
    DraggingTableLine {
        axis: Axis,
        index: usize,
        initial: f64,
    },
    DraggingAnchor {
        region_id: String,
        corner: Corner,
        initial: Anchor,
        start: Point,
    },
}

impl Interaction {
    pub fn is_idle(&self) -> bool {
        matches!(self, Interaction::Idle)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Interaction::Idle => "idle",
            Interaction::Drawing { .. } => "drawing",
            Interaction::Moving { .. } => "moving",
            Interaction::Resizing { .. } => "resizing",
            Interaction::DraggingTableLine { .. } => "dragging_table_line",
            Interaction::DraggingAnchor { .. } => "dragging_anchor",
        }
    }

    /// In-progress rectangle while drawing.
    pub fn draft(&self) -> Option<Rect> {
        match self {
            Interaction::Drawing { origin, current } => Some(normalize(*origin, *current)),
            _ => None,
        }
    }
}

/// The "insert line here" affordance shown near a table's outer edge.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct InsertHint {
    pub axis: Axis,
    pub offset: f64,
    pub at: Point,
}

pub fn hit_handle(rect: &Rect, point: Point, tolerance: Point) -> Option<Handle> {
    Handle::ALL.into_iter().find(|handle| {
        let spot = handle.position(rect);
        (point.x - spot.x).abs() <= tolerance.x && (point.y - spot.y).abs() <= tolerance.y
    })
}

/// Nearest interior grid line within the tolerance band. Boundary lines are
/// never candidates.
pub fn hit_table_line(
    rect: &Rect,
    table: &TableRefinement,
    point: Point,
    tolerance: Point,
) -> Option<(Axis, usize)> {
    let within_x = point.x >= rect.x - tolerance.x && point.x <= rect.right() + tolerance.x;
    let within_y = point.y >= rect.y - tolerance.y && point.y <= rect.bottom() + tolerance.y;
    let mut best: Option<(Axis, usize, f64)> = None;

    if within_x {
        for (index, row) in interior(table.rows()) {
            let distance = (point.y - (rect.y + row * rect.height)).abs();
            let scaled = distance / tolerance.y.max(f64::EPSILON);
            if distance <= tolerance.y && best.is_none_or(|(_, _, d)| scaled < d) {
                best = Some((Axis::Rows, index, scaled));
            }
        }
    }
    if within_y {
        for (index, col) in interior(table.cols()) {
            let distance = (point.x - (rect.x + col * rect.width)).abs();
            let scaled = distance / tolerance.x.max(f64::EPSILON);
            if distance <= tolerance.x && best.is_none_or(|(_, _, d)| scaled < d) {
                best = Some((Axis::Cols, index, scaled));
            }
        }
    }
    best.map(|(axis, index, _)| (axis, index))
}

fn interior(lines: &[f64]) -> impl Iterator<Item = (usize, f64)> + '_ {
    let last = lines.len().saturating_sub(1);
    lines
        .iter()
        .copied()
        .enumerate()
        .filter(move |(index, _)| *index > 0 && *index < last)
}

/// Offers a row insert along the left edge and a column insert along the top
/// edge. The band reaches `margin` outside the table and half of it inside.
pub fn insert_hint(rect: &Rect, table: &TableRefinement, point: Point, margin: f64) -> Option<InsertHint> {
    if rect.width <= 0.0 || rect.height <= 0.0 {
        return None;
    }
    let inside_y = point.y >= rect.y && point.y <= rect.bottom();
    let inside_x = point.x >= rect.x && point.x <= rect.right();

    if inside_y && point.x >= rect.x - margin && point.x <= rect.x + margin / 2.0 {
        let offset = (point.y - rect.y) / rect.height;
        if offset > 0.0 && offset < 1.0 && !table.settings.is_locked(Axis::Rows) {
            return Some(InsertHint {
                axis: Axis::Rows,
                offset,
                at: Point::new(rect.x, point.y),
            });
        }
    }
    if inside_x && point.y >= rect.y - margin && point.y <= rect.y + margin / 2.0 {
        let offset = (point.x - rect.x) / rect.width;
        if offset > 0.0 && offset < 1.0 && !table.settings.is_locked(Axis::Cols) {
            return Some(InsertHint {
                axis: Axis::Cols,
                offset,
                at: Point::new(point.x, rect.y),
            });
        }
    }
    None
}
