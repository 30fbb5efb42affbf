use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned rectangle in normalized page units (`0.0..=1.0` on both axes).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Builds a rect from `[x0, y0, x1, y1]` corner bounds.
    pub fn from_bounds(bounds: [f64; 4]) -> Self {
        let [x0, y0, x1, y1] = bounds;
        normalize(Point::new(x0, y0), Point::new(x1, y1))
    }

    pub fn to_bounds(&self) -> [f64; 4] {
        [self.x, self.y, self.right(), self.bottom()]
    }

    pub fn from_xywh(values: [f64; 4]) -> Self {
        let [x, y, width, height] = values;
        Self::new(x, y, width, height)
    }

    pub fn to_xywh(&self) -> [f64; 4] {
        [self.x, self.y, self.width, self.height]
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.width.is_finite() && self.height.is_finite()
    }

    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.x && point.x <= self.right() && point.y >= self.y && point.y <= self.bottom()
    }

    pub fn contains_rect(&self, other: &Rect) -> bool {
        const EPS: f64 = 1e-9;
        other.x + EPS >= self.x
            && other.y + EPS >= self.y
            && other.right() <= self.right() + EPS
            && other.bottom() <= self.bottom() + EPS
    }

    /// Smallest rect covering both inputs.
    pub fn union(&self, other: &Rect) -> Rect {
        let x1 = self.x.min(other.x);
        let y1 = self.y.min(other.y);
        let x2 = self.right().max(other.right());
        let y2 = self.bottom().max(other.bottom());
        Rect::new(x1, y1, x2 - x1, y2 - y1)
    }

    pub fn translate(&self, dx: f64, dy: f64) -> Rect {
        Rect::new(self.x + dx, self.y + dy, self.width, self.height)
    }
}

pub fn iou(a: &Rect, b: &Rect) -> f64 {
    let ix1 = a.x.max(b.x);
    let iy1 = a.y.max(b.y);
    let ix2 = a.right().min(b.right());
    let iy2 = a.bottom().min(b.bottom());

    if ix2 <= ix1 || iy2 <= iy1 {
        return 0.0;
    }
    let inter = (ix2 - ix1) * (iy2 - iy1);
    let union = a.area() + b.area() - inter;
    if union <= 0.0 {
        return 0.0;
    }
    inter / union
}

/// Pulls a rect back inside the unit square, shifting it first and only
/// shrinking a side that is longer than the page itself.
pub fn clamp_to_unit(rect: Rect) -> Rect {
    let width = rect.width.clamp(0.0, 1.0);
    let height = rect.height.clamp(0.0, 1.0);
    Rect {
        x: rect.x.clamp(0.0, 1.0 - width),
        y: rect.y.clamp(0.0, 1.0 - height),
        width,
        height,
    }
}

/// Canonical rect for a two-point drag, whatever the drag direction.
pub fn normalize(start: Point, end: Point) -> Rect {
    Rect {
        x: start.x.min(end.x),
        y: start.y.min(end.y),
        width: (end.x - start.x).abs(),
        height: (end.y - start.y).abs(),
    }
}
