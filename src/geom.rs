//! Geometry value types: points, resolved document locations, stroke samples,
//! and axis-aligned bounding boxes.
//!
//! All coordinates are page-local document units. The host renderer is
//! responsible for mapping screen positions into this space (see
//! [`crate::input::LocationResolver`]); nothing in this module performs a
//! coordinate transform.

#[cfg(test)]
#[path = "geom_test.rs"]
mod geom_test;

use serde::{Deserialize, Serialize};

/// A point in either screen or page-local space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    #[must_use]
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// A pointer position resolved to a page of the document.
///
/// `page` is 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub x: f64,
    pub y: f64,
    pub page: u32,
}

impl Location {
    #[must_use]
    pub fn new(x: f64, y: f64, page: u32) -> Self {
        Self { x, y, page }
    }

    /// The page-local point of this location.
    #[must_use]
    pub fn point(&self) -> Point {
        Point { x: self.x, y: self.y }
    }
}

/// One recorded sample of a stroke.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrokePoint {
    pub x: f64,
    pub y: f64,
    /// Host-supplied event time in milliseconds.
    pub timestamp: u64,
}

impl StrokePoint {
    #[must_use]
    pub fn new(x: f64, y: f64, timestamp: u64) -> Self {
        Self { x, y, timestamp }
    }
}

/// Axis-aligned rectangle in page-local coordinates.
///
/// The empty box has inverted infinite bounds so that it is the identity for
/// [`BoundingBox::union`] and intersects nothing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    #[must_use]
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self { min_x, min_y, max_x, max_y }
    }

    /// The empty box: union identity, intersects nothing.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            min_x: f64::INFINITY,
            min_y: f64::INFINITY,
            max_x: f64::NEG_INFINITY,
            max_y: f64::NEG_INFINITY,
        }
    }

    /// A square of half-width `half` centered on `center`.
    #[must_use]
    pub fn around(center: Point, half: f64) -> Self {
        Self {
            min_x: center.x - half,
            min_y: center.y - half,
            max_x: center.x + half,
            max_y: center.y + half,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.min_x > self.max_x || self.min_y > self.max_y
    }

    #[must_use]
    pub fn width(&self) -> f64 {
        if self.is_empty() { 0.0 } else { self.max_x - self.min_x }
    }

    #[must_use]
    pub fn height(&self) -> f64 {
        if self.is_empty() { 0.0 } else { self.max_y - self.min_y }
    }

    #[must_use]
    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    /// Half-perimeter, used to rank split axes.
    #[must_use]
    pub fn margin(&self) -> f64 {
        self.width() + self.height()
    }

    /// Smallest box enclosing both boxes.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        Self {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }

    /// Overlapping region of both boxes; empty when they are disjoint.
    #[must_use]
    pub fn intersection(&self, other: &Self) -> Self {
        let out = Self {
            min_x: self.min_x.max(other.min_x),
            min_y: self.min_y.max(other.min_y),
            max_x: self.max_x.min(other.max_x),
            max_y: self.max_y.min(other.max_y),
        };
        if out.is_empty() { Self::empty() } else { out }
    }

    /// Whether the boxes share at least one point. Touching edges count.
    #[must_use]
    pub fn intersects(&self, other: &Self) -> bool {
        other.min_x <= self.max_x && other.min_y <= self.max_y && other.max_x >= self.min_x && other.max_y >= self.min_y
    }

    /// Whether `other` lies entirely inside this box.
    #[must_use]
    pub fn contains(&self, other: &Self) -> bool {
        self.min_x <= other.min_x && self.min_y <= other.min_y && other.max_x <= self.max_x && other.max_y <= self.max_y
    }

    /// Area this box would gain by growing to include `other`.
    #[must_use]
    pub fn enlargement(&self, other: &Self) -> f64 {
        self.union(other).area() - self.area()
    }

    /// This box grown by `offset` on every side.
    #[must_use]
    pub fn expanded(&self, offset: f64) -> Self {
        if self.is_empty() {
            return *self;
        }
        Self {
            min_x: self.min_x - offset,
            min_y: self.min_y - offset,
            max_x: self.max_x + offset,
            max_y: self.max_y + offset,
        }
    }
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::empty()
    }
}

/// A bounding box anchored to a document page.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThreadLocation {
    pub page: u32,
    #[serde(flatten)]
    pub bounds: BoundingBox,
}
