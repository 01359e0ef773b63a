//! Eyewear parameters entered on the fitting form.

use crate::constants::{
    DEFAULT_BRIDGE_MM, DEFAULT_CALIBER_MM, RIMLESS_FRAME_ADJUSTMENT_MM, RIMMED_FRAME_ADJUSTMENT_MM,
};
use crate::utils::parse_positive_or;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How the lenses are held by the frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MountingType {
    /// Full rim around each lens
    #[default]
    FullRim,
    /// Nylon thread under a top rim
    HalfRim,
    /// No rim, lenses held by the bridge and temples
    Rimless,
    /// Lenses drilled and screwed to the bridge and temples
    Drilled,
}

impl MountingType {
    /// Whether the mount has no visible frame edge
    #[must_use]
    pub const fn is_rimless(self) -> bool {
        matches!(self, Self::Rimless | Self::Drilled)
    }

    /// Margin added to `2 × caliber + bridge` to reach the outer frame width
    #[must_use]
    pub const fn width_adjustment_mm(self) -> f64 {
        if self.is_rimless() {
            RIMLESS_FRAME_ADJUSTMENT_MM
        } else {
            RIMMED_FRAME_ADJUSTMENT_MM
        }
    }
}

impl FromStr for MountingType {
    type Err = std::convert::Infallible;

    /// Unknown labels fall back to a full rim
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let label = s.trim().to_lowercase();
        Ok(match label.as_str() {
            "half_rim" | "halfrim" | "half-rim" | "nylor" | "nylon" | "semi" => Self::HalfRim,
            "rimless" | "sans_cercle" | "invisible" => Self::Rimless,
            "drilled" | "perce" | "percé" | "perçé" => Self::Drilled,
            _ => Self::FullRim,
        })
    }
}

impl fmt::Display for MountingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::FullRim => "full_rim",
            Self::HalfRim => "half_rim",
            Self::Rimless => "rimless",
            Self::Drilled => "drilled",
        };
        f.write_str(label)
    }
}

/// Frame dimensions used by the effective-diameter computation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EyewearParams {
    /// Single-lens width (boxing system) in millimeters
    pub caliber: f64,
    /// Nose-bridge width in millimeters
    pub bridge: f64,
    /// Mount style, affects the outer frame width
    pub mounting_type: MountingType,
}

impl Default for EyewearParams {
    fn default() -> Self {
        Self {
            caliber: DEFAULT_CALIBER_MM,
            bridge: DEFAULT_BRIDGE_MM,
            mounting_type: MountingType::default(),
        }
    }
}

impl EyewearParams {
    /// Build from raw form strings, defaulting unparseable numbers to 52/18 mm
    #[must_use]
    pub fn from_form(caliber: &str, bridge: &str, mounting_type: &str) -> Self {
        let mounting_type = mounting_type.parse().unwrap_or_default();
        Self {
            caliber: parse_positive_or(caliber, DEFAULT_CALIBER_MM),
            bridge: parse_positive_or(bridge, DEFAULT_BRIDGE_MM),
            mounting_type,
        }
    }

    /// Replace non-finite or non-positive dimensions by the defaults
    #[must_use]
    pub fn sanitized(self) -> Self {
        let fix = |value: f64, default: f64| {
            if value.is_finite() && value > 0.0 {
                value
            } else {
                default
            }
        };
        Self {
            caliber: fix(self.caliber, DEFAULT_CALIBER_MM),
            bridge: fix(self.bridge, DEFAULT_BRIDGE_MM),
            mounting_type: self.mounting_type,
        }
    }

    /// `caliber + bridge`, the nominal horizontal span per the boxing system
    #[must_use]
    pub fn boxing_width_mm(&self) -> f64 {
        self.caliber + self.bridge
    }

    /// Outer frame width in millimeters, see [`frame_width_mm`]
    #[must_use]
    pub fn frame_width_mm(&self) -> f64 {
        frame_width_mm(self.caliber, self.bridge, self.mounting_type)
    }
}

/// `2 × caliber + bridge + adjustment`, the physical width used to calibrate
/// against the temple-to-temple span
#[must_use]
pub fn frame_width_mm(caliber: f64, bridge: f64, mounting_type: MountingType) -> f64 {
    2.0 * caliber + bridge + mounting_type.width_adjustment_mm()
}
