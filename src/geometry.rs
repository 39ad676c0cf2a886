use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use bevy::prelude::Vec2;

/// Positional tolerance for endpoint distinctness and horizontal/vertical checks.
pub const EPSILON: f32 = 1e-3;

/// Resolution of the navigation grid: coordinates are collapsed to a 0.01 unit
/// grid when used as node identity.
pub const KEY_RESOLUTION: f32 = 0.01;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Axis {
    Horizontal,
    Vertical,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Left,
    Right,
}

impl Direction {
    pub fn sign(self) -> f32 {
        match self {
            Direction::Left => -1.0,
            Direction::Right => 1.0,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Direction::Left => "left",
            Direction::Right => "right",
        }
    }
}

/// Named anchor points of a rectangle, under the y-up convention
/// (top is the greater y).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Anchor {
    TopLeft,
    TopCenter,
    TopRight,
    CenterLeft,
    Center,
    CenterRight,
    BottomLeft,
    BottomCenter,
    BottomRight,
}

/// Identity of a point on the 0.01 unit grid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PointKey(pub u64);

/// Stable key for a point: hash of its canonical two-decimal form. Points
/// closer than the grid resolution collapse to the same key.
pub fn point_key(p: Vec2) -> PointKey {
    let mut hasher = DefaultHasher::new();
    canonical(p.x).hash(&mut hasher);
    canonical(p.y).hash(&mut hasher);
    PointKey(hasher.finish())
}

/// Canonical two-decimal rendering of a coordinate. Negative zero collapses
/// to positive zero so `-0.004` and `0.004` agree.
fn canonical(v: f32) -> String {
    let rounded = (v / KEY_RESOLUTION).round() * KEY_RESOLUTION + 0.0;
    format!("{rounded:.2}")
}

/// Stable key for a line segment, combining both endpoint keys.
pub fn segment_key(seg: &Segment) -> u64 {
    let mut hasher = DefaultHasher::new();
    point_key(seg.start).hash(&mut hasher);
    point_key(seg.end).hash(&mut hasher);
    hasher.finish()
}

/// Axis-aligned rectangle, y-up: `max.y` is the top edge, `min.y` the bottom.
/// Always stored normalized (non-negative extents).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bounds {
    pub min: Vec2,
    pub max: Vec2,
}

impl Bounds {
    pub fn new(a: Vec2, b: Vec2) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    pub fn from_center(center: Vec2, size: Vec2) -> Self {
        let half = size.abs() * 0.5;
        Self {
            min: center - half,
            max: center + half,
        }
    }

    pub fn width(&self) -> f32 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> f32 {
        self.max.y - self.min.y
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    pub fn center(&self) -> Vec2 {
        (self.min + self.max) * 0.5
    }

    pub fn left(&self) -> f32 {
        self.min.x
    }

    pub fn right(&self) -> f32 {
        self.max.x
    }

    pub fn top(&self) -> f32 {
        self.max.y
    }

    pub fn bottom(&self) -> f32 {
        self.min.y
    }

    pub fn bottom_center(&self) -> Vec2 {
        Vec2::new(self.center().x, self.min.y)
    }

    pub fn contains(&self, p: Vec2) -> bool {
        p.x >= self.min.x && p.x <= self.max.x && p.y >= self.min.y && p.y <= self.max.y
    }

    /// Strict-overlap test: rectangles that merely touch do not intersect.
    pub fn intersects(&self, other: &Bounds) -> bool {
        self.min.x < other.max.x
            && self.max.x > other.min.x
            && self.min.y < other.max.y
            && self.max.y > other.min.y
    }

    /// Union bounding rectangle.
    pub fn merge(&self, other: &Bounds) -> Bounds {
        Bounds {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Area growth incurred by absorbing `other`.
    pub fn merge_enlargement(&self, other: &Bounds) -> f32 {
        (self.merge(other).area() - self.area()).abs()
    }

    /// Expand symmetrically by `w` on each horizontal side and `h` on each
    /// vertical side.
    pub fn inflate(&self, w: f32, h: f32) -> Bounds {
        Bounds::new(
            self.min - Vec2::new(w, h),
            self.max + Vec2::new(w, h),
        )
    }

    pub fn translate(&self, offset: Vec2) -> Bounds {
        Bounds {
            min: self.min + offset,
            max: self.max + offset,
        }
    }

    pub fn axis_min(&self, axis: Axis) -> f32 {
        match axis {
            Axis::Horizontal => self.min.x,
            Axis::Vertical => self.min.y,
        }
    }

    pub fn axis_max(&self, axis: Axis) -> f32 {
        match axis {
            Axis::Horizontal => self.max.x,
            Axis::Vertical => self.max.y,
        }
    }

    fn anchor_point(&self, anchor: Anchor) -> Vec2 {
        let c = self.center();
        match anchor {
            Anchor::TopLeft => Vec2::new(self.min.x, self.max.y),
            Anchor::TopCenter => Vec2::new(c.x, self.max.y),
            Anchor::TopRight => Vec2::new(self.max.x, self.max.y),
            Anchor::CenterLeft => Vec2::new(self.min.x, c.y),
            Anchor::Center => c,
            Anchor::CenterRight => Vec2::new(self.max.x, c.y),
            Anchor::BottomLeft => Vec2::new(self.min.x, self.min.y),
            Anchor::BottomCenter => Vec2::new(c.x, self.min.y),
            Anchor::BottomRight => Vec2::new(self.max.x, self.min.y),
        }
    }

    /// Move the rectangle so the named anchor lands on `point`, preserving
    /// size.
    pub fn set_location(&self, anchor: Anchor, point: Vec2) -> Bounds {
        self.translate(point - self.anchor_point(anchor))
    }

    /// Strictly above: touching does not count, so a platform at the same
    /// height is neither above nor below.
    pub fn is_above(&self, other: &Bounds) -> bool {
        self.bottom() > other.top()
    }

    pub fn is_below(&self, other: &Bounds) -> bool {
        self.top() < other.bottom()
    }

    pub fn is_left_of(&self, other: &Bounds) -> bool {
        self.right() < other.left()
    }

    pub fn is_right_of(&self, other: &Bounds) -> bool {
        self.left() > other.right()
    }

    pub fn is_above_segment(&self, seg: &Segment) -> bool {
        self.bottom() > seg.max_y()
    }

    pub fn is_below_segment(&self, seg: &Segment) -> bool {
        self.top() < seg.min_y()
    }

    pub fn is_left_of_segment(&self, seg: &Segment) -> bool {
        self.right() < seg.min_x()
    }

    pub fn is_right_of_segment(&self, seg: &Segment) -> bool {
        self.left() > seg.max_x()
    }

    pub fn overlaps_on_axis(&self, other: &Bounds, axis: Axis) -> bool {
        match axis {
            Axis::Horizontal => !(self.is_left_of(other) || self.is_right_of(other)),
            Axis::Vertical => !(self.is_above(other) || self.is_below(other)),
        }
    }

    pub fn overlaps_segment_on_axis(&self, seg: &Segment, axis: Axis) -> bool {
        match axis {
            Axis::Horizontal => {
                !(self.is_left_of_segment(seg) || self.is_right_of_segment(seg))
            }
            Axis::Vertical => !(self.is_above_segment(seg) || self.is_below_segment(seg)),
        }
    }
}

/// A 2D line segment with distinct endpoints.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Segment {
    pub start: Vec2,
    pub end: Vec2,
}

impl Segment {
    /// Returns `None` when the endpoints coincide within tolerance.
    pub fn new(start: Vec2, end: Vec2) -> Option<Self> {
        if start.distance_squared(end) <= EPSILON * EPSILON {
            return None;
        }
        Some(Self { start, end })
    }

    pub fn delta(&self) -> Vec2 {
        self.end - self.start
    }

    pub fn length(&self) -> f32 {
        self.delta().length()
    }

    pub fn length_squared(&self) -> f32 {
        self.delta().length_squared()
    }

    /// Unit vector along the segment.
    pub fn axis(&self) -> Vec2 {
        self.delta().normalize_or_zero()
    }

    /// Unit perpendicular (counter-clockwise of the axis).
    pub fn normal(&self) -> Vec2 {
        self.axis().perp()
    }

    pub fn midpoint(&self) -> Vec2 {
        (self.start + self.end) * 0.5
    }

    pub fn min_x(&self) -> f32 {
        self.start.x.min(self.end.x)
    }

    pub fn max_x(&self) -> f32 {
        self.start.x.max(self.end.x)
    }

    pub fn min_y(&self) -> f32 {
        self.start.y.min(self.end.y)
    }

    pub fn max_y(&self) -> f32 {
        self.start.y.max(self.end.y)
    }

    pub fn is_horizontal(&self) -> bool {
        (self.end.y - self.start.y).abs() <= EPSILON
    }

    pub fn is_vertical(&self) -> bool {
        (self.end.x - self.start.x).abs() <= EPSILON
    }

    pub fn slope(&self) -> Option<f32> {
        if self.is_vertical() {
            None
        } else {
            Some((self.end.y - self.start.y) / (self.end.x - self.start.x))
        }
    }

    pub fn y_intercept(&self) -> Option<f32> {
        self.slope().map(|m| self.start.y - m * self.start.x)
    }

    pub fn bounds(&self) -> Bounds {
        Bounds::new(self.start, self.end)
    }

    /// Endpoint with the smaller x coordinate.
    pub fn left_point(&self) -> Vec2 {
        if self.start.x <= self.end.x {
            self.start
        } else {
            self.end
        }
    }

    /// Endpoint with the greater x coordinate.
    pub fn right_point(&self) -> Vec2 {
        if self.start.x <= self.end.x {
            self.end
        } else {
            self.start
        }
    }

    /// Split into equal colinear parts no longer than `target_length`.
    ///
    /// Returns `[self]` when the segment is already shorter than the target.
    /// Otherwise the part count starts at two and doubles until each part's
    /// squared length fits, capped at `max_segments`.
    pub fn split(&self, target_length: f32, max_segments: usize) -> Vec<Segment> {
        let length = self.length();
        if length < target_length || max_segments < 2 {
            return vec![*self];
        }
        let target_sq = target_length * target_length;
        let mut parts = 2usize;
        while (length / parts as f32).powi(2) > target_sq && parts < max_segments {
            parts = (parts * 2).min(max_segments);
        }
        let step = self.delta() / parts as f32;
        (0..parts)
            .map(|i| Segment {
                start: self.start + step * i as f32,
                end: self.start + step * (i + 1) as f32,
            })
            .collect()
    }

    /// Distance from `p` to the segment: the perpendicular distance to the
    /// carrier line while the foot of the perpendicular lies between the
    /// endpoints, otherwise the nearer endpoint distance.
    pub fn distance(&self, p: Vec2) -> f32 {
        let d = self.delta();
        let t = (p - self.start).dot(d) / d.length_squared();
        if (0.0..=1.0).contains(&t) {
            (p - self.start).perp_dot(self.axis()).abs()
        } else {
            p.distance(self.start).min(p.distance(self.end))
        }
    }
}
