//! Confidence-weighted fusion of up to two pupil detectors.

use crate::constants::FUSION_MIN_CONFIDENCE;
use crate::geometry::{LandmarkSet, Point, Pupils};
use image::DynamicImage;
use log::debug;
use serde::{Deserialize, Serialize};

/// Output of one detector for one frame
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EngineResult {
    /// Detected pupils, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pupils: Option<Pupils>,
    /// Full landmark set, if the detector exposes one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub landmarks: Option<LandmarkSet>,
    /// Overall detection confidence in [0, 1]; a missing value is read as
    /// full confidence when pupils are present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl EngineResult {
    /// A result carrying no usable data
    #[must_use]
    pub fn empty() -> Self {
        Self {
            pupils: None,
            landmarks: None,
            confidence: Some(0.0),
        }
    }

    #[must_use]
    pub fn new(pupils: Pupils, landmarks: Option<LandmarkSet>, confidence: f64) -> Self {
        Self {
            pupils: Some(pupils),
            landmarks,
            confidence: Some(confidence),
        }
    }

    /// Effective confidence, clamped to [0, 1]
    #[must_use]
    pub fn confidence(&self) -> f64 {
        let raw = match (self.confidence, self.pupils.is_some()) {
            (Some(value), _) => value,
            (None, true) => 1.0,
            (None, false) => 0.0,
        };
        if raw.is_finite() {
            raw.clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    /// Whether this result can drive a measurement
    #[must_use]
    pub fn is_usable(&self) -> bool {
        self.pupils.is_some() && self.confidence() > 0.0
    }
}

/// Capability shared by every landmark engine: pupils plus a confidence,
/// optionally a landmark set
pub trait PupilDetector {
    /// Run detection on one frame; `None` when nothing was found
    fn detect(&mut self, frame: &DynamicImage) -> Option<EngineResult>;

    /// Detector name for logging
    fn name(&self) -> &str;
}

/// Merge two optional detector outputs into one
///
/// 1. Neither usable: confidence 0, no pupils.
/// 2. One below `min_confidence` while the other is present: the other,
///    unchanged. When both are below, the more confident one, unchanged.
/// 3. Otherwise a per-eye confidence-weighted average, with the fused
///    confidence being the max of both inputs.
#[must_use]
pub fn fuse(a: Option<&EngineResult>, b: Option<&EngineResult>, min_confidence: f64) -> EngineResult {
    let a = a.filter(|r| r.is_usable());
    let b = b.filter(|r| r.is_usable());

    let (a, b) = match (a, b) {
        (None, None) => return EngineResult::empty(),
        (Some(only), None) | (None, Some(only)) => return only.clone(),
        (Some(a), Some(b)) => (a, b),
    };

    let (ca, cb) = (a.confidence(), b.confidence());
    match (ca < min_confidence, cb < min_confidence) {
        (true, true) => {
            debug!("Both detectors below {min_confidence} ({ca:.2}, {cb:.2}), keeping the stronger");
            return if cb > ca { b.clone() } else { a.clone() };
        }
        (true, false) => {
            debug!("Primary detector below {min_confidence} ({ca:.2}), using secondary");
            return b.clone();
        }
        (false, true) => {
            debug!("Secondary detector below {min_confidence} ({cb:.2}), using primary");
            return a.clone();
        }
        (false, false) => {}
    }

    // Both usable, so both carry pupils and a positive confidence
    let (Some(pa), Some(pb)) = (a.pupils, b.pupils) else {
        return EngineResult::empty();
    };
    let wa = ca / (ca + cb);
    let wb = 1.0 - wa;

    let landmarks = if ca >= cb {
        a.landmarks.clone().or_else(|| b.landmarks.clone())
    } else {
        b.landmarks.clone().or_else(|| a.landmarks.clone())
    };

    EngineResult {
        pupils: Some(Pupils {
            left: weighted_point(&pa.left, &pb.left, wa, wb),
            right: weighted_point(&pa.right, &pb.right, wa, wb),
        }),
        landmarks,
        confidence: Some(ca.max(cb)),
    }
}

/// Convenience wrapper using the default 0.2 threshold
#[must_use]
pub fn fuse_default(a: Option<&EngineResult>, b: Option<&EngineResult>) -> EngineResult {
    fuse(a, b, FUSION_MIN_CONFIDENCE)
}

fn weighted_point(a: &Point, b: &Point, wa: f64, wb: f64) -> Point {
    Point {
        x: a.x * wa + b.x * wb,
        y: a.y * wa + b.y * wb,
        z: weighted_optional(a.z, b.z, wa, wb),
        confidence: weighted_optional(a.confidence, b.confidence, wa, wb),
    }
}

fn weighted_optional(a: Option<f64>, b: Option<f64>, wa: f64, wb: f64) -> Option<f64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a * wa + b * wb),
        (Some(v), None) | (None, Some(v)) => Some(v),
        (None, None) => None,
    }
}

/// Runs up to two detectors on the same frame and fuses their output
pub struct DetectorPair {
    primary: Option<Box<dyn PupilDetector>>,
    secondary: Option<Box<dyn PupilDetector>>,
    min_confidence: f64,
}

impl DetectorPair {
    #[must_use]
    pub fn new(
        primary: Option<Box<dyn PupilDetector>>,
        secondary: Option<Box<dyn PupilDetector>>,
        min_confidence: f64,
    ) -> Self {
        Self {
            primary,
            secondary,
            min_confidence,
        }
    }

    pub fn detect(&mut self, frame: &DynamicImage) -> EngineResult {
        let a = self.primary.as_mut().and_then(|d| d.detect(frame));
        let b = self.secondary.as_mut().and_then(|d| d.detect(frame));
        fuse(a.as_ref(), b.as_ref(), self.min_confidence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(lx: f64, rx: f64, confidence: f64) -> EngineResult {
        EngineResult::new(
            Pupils::new(Point::new(lx, 100.0), Point::new(rx, 100.0)),
            None,
            confidence,
        )
    }

    #[test]
    fn test_both_absent() {
        let fused = fuse_default(None, None);
        assert_eq!(fused.confidence(), 0.0);
        assert!(fused.pupils.is_none());
    }

    #[test]
    fn test_zero_confidence_is_absent() {
        let a = result(100.0, 300.0, 0.0);
        let fused = fuse_default(Some(&a), None);
        assert_eq!(fused.confidence(), 0.0);
        assert!(fused.pupils.is_none());
    }

    #[test]
    fn test_single_source_passes_through() {
        let a = result(100.0, 300.0, 0.9);
        let fused = fuse_default(Some(&a), None);
        assert_eq!(fused, a);

        let fused = fuse_default(None, Some(&a));
        assert_eq!(fused, a);
    }

    #[test]
    fn test_weak_source_is_dropped() {
        let weak = result(0.0, 0.0, 0.1);
        let strong = result(100.0, 300.0, 0.8);
        assert_eq!(fuse_default(Some(&weak), Some(&strong)), strong);
        assert_eq!(fuse_default(Some(&strong), Some(&weak)), strong);
    }

    #[test]
    fn test_both_weak_keeps_stronger_unchanged() {
        let a = result(100.0, 300.0, 0.1);
        let b = result(110.0, 310.0, 0.15);
        assert_eq!(fuse_default(Some(&a), Some(&b)), b);
        assert_eq!(fuse_default(Some(&b), Some(&a)), b);

        // Tie goes to the primary
        let c = result(120.0, 320.0, 0.1);
        assert_eq!(fuse_default(Some(&a), Some(&c)), a);
    }

    #[test]
    fn test_weighted_average_and_max_confidence() {
        let a = result(100.0, 300.0, 0.75);
        let b = result(120.0, 320.0, 0.25);
        let fused = fuse_default(Some(&a), Some(&b));
        let pupils = fused.pupils.unwrap();

        assert!((pupils.left.x - 105.0).abs() < 1e-9);
        assert!((pupils.right.x - 305.0).abs() < 1e-9);
        assert_eq!(fused.confidence(), 0.75);
    }

    #[test]
    fn test_landmarks_from_stronger_source() {
        let mut a = result(100.0, 300.0, 0.4);
        let mut b = result(100.0, 300.0, 0.6);
        a.landmarks = Some(LandmarkSet::new(vec![Point::new(1.0, 1.0)]));
        b.landmarks = Some(LandmarkSet::new(vec![Point::new(2.0, 2.0)]));
        let fused = fuse_default(Some(&a), Some(&b));
        assert_eq!(fused.landmarks.unwrap().points()[0].x, 2.0);

        b.landmarks = None;
        let fused = fuse_default(Some(&a), Some(&b));
        assert_eq!(fused.landmarks.unwrap().points()[0].x, 1.0);
    }

    #[test]
    fn test_missing_confidence_reads_as_full() {
        let json = r#"{"pupils":{"left":{"x":1,"y":2},"right":{"x":3,"y":4}}}"#;
        let parsed: EngineResult = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.confidence(), 1.0);
        assert!(parsed.is_usable());
    }
}
