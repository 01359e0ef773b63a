//! Per-frame optical-centering measurements.
//!
//! Re-run on every live detector frame, or on every drag while a capture is
//! frozen. Every conversion goes through [`px_to_mm`], so a missing or
//! invalid scale degrades each millimeter field to 0 instead of failing.

use crate::eyewear::EyewearParams;
use crate::geometry::{distance, px_to_mm, LandmarkSet, Point, Pupils, TempleRoles};
use crate::utils::finite_or_zero;
use serde::{Deserialize, Serialize};

/// Manual pixel corrections added to the detected temple x-coordinates
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameReferenceOffsets {
    pub frame_left_offset: f64,
    pub frame_right_offset: f64,
}

impl FrameReferenceOffsets {
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.frame_left_offset == 0.0 && self.frame_right_offset == 0.0
    }
}

/// User-draggable horizontal reference lines, as y pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceLines {
    /// Lower lens edge under the left pupil
    pub height_left_y: Option<f64>,
    /// Lower lens edge under the right pupil
    pub height_right_y: Option<f64>,
    /// Top of the lens span
    pub frame_top_y: Option<f64>,
    /// Bottom of the lens span
    pub frame_bottom_y: Option<f64>,
}

/// Two freely draggable endpoints of the manual diagonal tool
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Diagonal {
    pub start: Point,
    pub end: Point,
}

impl Diagonal {
    #[must_use]
    pub const fn new(start: Point, end: Point) -> Self {
        Self { start, end }
    }

    #[must_use]
    pub fn length_px(&self) -> f64 {
        distance(&self.start, &self.end)
    }
}

/// Everything the calculator reads for one pass
#[derive(Debug, Clone, Copy)]
pub struct MeasurementInput<'a> {
    pub pupils: &'a Pupils,
    pub landmarks: Option<&'a LandmarkSet>,
    pub offsets: FrameReferenceOffsets,
    pub lines: ReferenceLines,
    pub diagonal: Option<Diagonal>,
    pub eyewear: EyewearParams,
}

/// Immutable result of one measurement pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Measurement {
    /// Total pupillary distance
    pub pd_mm: f64,
    /// Left half-PD from the frame center
    pub pd_left_mm: f64,
    /// Right half-PD from the frame center
    pub pd_right_mm: f64,
    pub height_left_mm: f64,
    pub height_right_mm: f64,
    /// Vertical lens span between the frame-span lines
    pub frame_height_mm: f64,
    pub ed_left_mm: f64,
    pub ed_right_mm: f64,
    pub diagonal_mm: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagonal: Option<Diagonal>,
    pub pupils: Pupils,
    /// x pixel coordinate used as the decentration reference
    pub frame_center_x: f64,
    /// Scale used for this pass, `None` when uncalibrated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pixels_per_mm: Option<f64>,
    /// Milliseconds since the Unix epoch
    pub timestamp: u64,
}

/// Laboratory-method effective diameter:
/// `boxing_width - 2 × min(pd_left, pd_right) + largest_diagonal`
#[must_use]
pub fn effective_diameter(boxing_width_mm: f64, pd_left_mm: f64, pd_right_mm: f64, largest_diagonal_mm: f64) -> f64 {
    let min_pd = pd_left_mm.min(pd_right_mm);
    finite_or_zero(boxing_width_mm - 2.0 * min_pd + largest_diagonal_mm)
}

/// Diagonal of the caliber × lens-height box, used when no diagonal was drawn
#[must_use]
pub fn geometric_diagonal(caliber_mm: f64, frame_height_mm: f64) -> f64 {
    finite_or_zero(caliber_mm.hypot(frame_height_mm))
}

/// Stateless measurement engine
#[derive(Debug, Clone, Copy, Default)]
pub struct MeasurementCalculator {
    temple_roles: TempleRoles,
}

impl MeasurementCalculator {
    #[must_use]
    pub const fn new(temple_roles: TempleRoles) -> Self {
        Self { temple_roles }
    }

    #[must_use]
    pub const fn temple_roles(&self) -> TempleRoles {
        self.temple_roles
    }

    /// Temple x-coordinates with the manual offsets applied
    #[must_use]
    pub fn frame_edges_x(&self, landmarks: Option<&LandmarkSet>, offsets: FrameReferenceOffsets) -> Option<(f64, f64)> {
        let (left, right) = landmarks?.temples(self.temple_roles)?;
        let left_x = left.x + offsets.frame_left_offset;
        let right_x = right.x + offsets.frame_right_offset;
        (left_x.is_finite() && right_x.is_finite()).then_some((left_x, right_x))
    }

    /// Temple-to-temple span in pixels, used to calibrate from the frame width
    #[must_use]
    pub fn temple_span_px(&self, landmarks: Option<&LandmarkSet>, offsets: FrameReferenceOffsets) -> Option<f64> {
        self.frame_edges_x(landmarks, offsets)
            .map(|(left, right)| (right - left).abs())
    }

    /// Optical center of the frame; pupil midpoint when temples are unknown
    #[must_use]
    pub fn frame_center_x(&self, pupils: &Pupils, landmarks: Option<&LandmarkSet>, offsets: FrameReferenceOffsets) -> f64 {
        match self.frame_edges_x(landmarks, offsets) {
            Some((left, right)) => (left + right) / 2.0,
            None => pupils.midpoint().x,
        }
    }

    /// Compute the full measurement set for one frame
    #[must_use]
    pub fn compute(&self, input: &MeasurementInput<'_>, pixels_per_mm: Option<f64>, timestamp: u64) -> Measurement {
        let pupils = input.pupils;
        let eyewear = input.eyewear.sanitized();
        let to_mm = |px: f64| px_to_mm(px, pixels_per_mm);

        let frame_center_x = finite_or_zero(self.frame_center_x(pupils, input.landmarks, input.offsets));

        let pd_mm = to_mm(distance(&pupils.left, &pupils.right));

        // Half-PDs are measured independently, asymmetry is kept
        let pd_left_mm = to_mm((pupils.left.x - frame_center_x).abs());
        let pd_right_mm = to_mm((pupils.right.x - frame_center_x).abs());

        let height = |pupil: &Point, line: Option<f64>| {
            line.map_or(0.0, |y| to_mm((y - pupil.y).max(0.0)))
        };
        let height_left_mm = height(&pupils.left, input.lines.height_left_y);
        let height_right_mm = height(&pupils.right, input.lines.height_right_y);

        let frame_height_mm = match (input.lines.frame_top_y, input.lines.frame_bottom_y) {
            (Some(top), Some(bottom)) => to_mm((bottom - top).abs()),
            _ => 0.0,
        };

        let diagonal_mm = input.diagonal.map_or(0.0, |d| to_mm(d.length_px()));

        // With no usable scale every other field is 0; ED follows suit
        let ed_mm = if to_mm(1.0) > 0.0 {
            let largest_diagonal = if diagonal_mm > 0.0 {
                diagonal_mm
            } else {
                geometric_diagonal(eyewear.caliber, frame_height_mm)
            };
            effective_diameter(eyewear.boxing_width_mm(), pd_left_mm, pd_right_mm, largest_diagonal)
        } else {
            0.0
        };

        Measurement {
            pd_mm,
            pd_left_mm,
            pd_right_mm,
            height_left_mm,
            height_right_mm,
            frame_height_mm,
            ed_left_mm: ed_mm,
            ed_right_mm: ed_mm,
            diagonal_mm,
            diagonal: input.diagonal,
            pupils: *pupils,
            frame_center_x,
            pixels_per_mm: pixels_per_mm.filter(|s| s.is_finite() && *s > 0.0),
            timestamp,
        }
    }
}
