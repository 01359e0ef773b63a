//! Point types and pixel/millimeter conversion primitives.
//!
//! All physical measurements are taken on the 2D projection of the camera
//! feed: `z` is carried through but never consumed by distance functions.

use crate::constants::{LEFT_TEMPLE_INDEX, RIGHT_TEMPLE_INDEX};
use crate::utils::finite_or_zero;
use serde::{Deserialize, Serialize};

/// A detected location in frame pixel space
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    /// Horizontal pixel coordinate
    pub x: f64,
    /// Vertical pixel coordinate, growing downwards
    pub y: f64,
    /// Optional depth reported by 3D detectors
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z: Option<f64>,
    /// Optional per-point detection confidence in [0, 1]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl Point {
    /// Create a 2D point without depth or confidence
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            z: None,
            confidence: None,
        }
    }

    /// Builder-style depth setter
    #[must_use]
    pub const fn with_z(mut self, z: f64) -> Self {
        self.z = Some(z);
        self
    }

    /// Builder-style confidence setter
    #[must_use]
    pub const fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    /// Return a copy shifted by `(dx, dy)`
    #[must_use]
    pub fn translated(self, dx: f64, dy: f64) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
            ..self
        }
    }
}

/// One point per eye, always in display (camera) pixel space
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pupils {
    /// Pupil on the left side of the displayed image
    pub left: Point,
    /// Pupil on the right side of the displayed image
    pub right: Point,
}

impl Pupils {
    #[must_use]
    pub const fn new(left: Point, right: Point) -> Self {
        Self { left, right }
    }

    /// Midpoint between both pupils
    #[must_use]
    pub fn midpoint(&self) -> Point {
        midpoint(&self.left, &self.right)
    }

    /// Whether both pupils have finite x and y
    #[must_use]
    pub fn is_finite(&self) -> bool {
        [self.left.x, self.left.y, self.right.x, self.right.y]
            .iter()
            .all(|v| v.is_finite())
    }
}

/// Which landmark indices play the temple roles for a given detector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TempleRoles {
    /// Index of the left temple landmark
    pub left: usize,
    /// Index of the right temple landmark
    pub right: usize,
}

impl Default for TempleRoles {
    fn default() -> Self {
        Self {
            left: LEFT_TEMPLE_INDEX,
            right: RIGHT_TEMPLE_INDEX,
        }
    }
}

/// Indexed landmark points produced by a detector
///
/// Indices other than the temple roles are detector-specific and opaque.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LandmarkSet {
    points: Vec<Point>,
}

impl LandmarkSet {
    #[must_use]
    pub const fn new(points: Vec<Point>) -> Self {
        Self { points }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Point> {
        self.points.get(index)
    }

    #[must_use]
    pub fn points(&self) -> &[Point] {
        &self.points
    }

    /// Left and right temple points, if the detector exposes both roles
    #[must_use]
    pub fn temples(&self, roles: TempleRoles) -> Option<(Point, Point)> {
        Some((*self.get(roles.left)?, *self.get(roles.right)?))
    }
}

impl From<Vec<Point>> for LandmarkSet {
    fn from(points: Vec<Point>) -> Self {
        Self::new(points)
    }
}

/// Convert a pixel length to millimeters
///
/// Returns 0 when the scale is absent, non-positive or non-finite, or when
/// the result would not be finite. Never panics.
#[must_use]
pub fn px_to_mm(px: f64, pixels_per_mm: Option<f64>) -> f64 {
    match pixels_per_mm {
        Some(scale) if scale.is_finite() && scale > 0.0 => finite_or_zero(px / scale),
        _ => 0.0,
    }
}

/// Convert a millimeter length to pixels, with the same guards as [`px_to_mm`]
#[must_use]
pub fn mm_to_px(mm: f64, pixels_per_mm: Option<f64>) -> f64 {
    match pixels_per_mm {
        Some(scale) if scale.is_finite() && scale > 0.0 => finite_or_zero(mm * scale),
        _ => 0.0,
    }
}

/// Euclidean distance in the image plane
#[must_use]
pub fn distance(a: &Point, b: &Point) -> f64 {
    (a.x - b.x).hypot(a.y - b.y)
}

#[must_use]
pub fn midpoint(a: &Point, b: &Point) -> Point {
    Point::new((a.x + b.x) / 2.0, (a.y + b.y) / 2.0)
}
