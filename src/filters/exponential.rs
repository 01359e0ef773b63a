use super::PointFilter;
use crate::constants::{SMOOTHING_ALPHA_MAX, SMOOTHING_ALPHA_MIN};
use crate::geometry::Point;
use crate::{Error, Result};

/// Exponential smoothing filter over `x`, `y`, `z` and `confidence`
///
/// `state = state * (1 - alpha) + new * alpha`; the first observation seeds
/// the state unchanged.
pub struct ExponentialFilter {
    alpha: f64,
    last: Option<Point>,
}

impl ExponentialFilter {
    pub fn new(alpha: f64) -> Self {
        assert!(
            alpha > SMOOTHING_ALPHA_MIN && alpha <= SMOOTHING_ALPHA_MAX,
            "Alpha must be in (0, 1]"
        );
        Self { alpha, last: None }
    }

    /// Fallible constructor for alpha values coming from configuration
    ///
    /// # Errors
    ///
    /// Returns [`Error::FilterError`] if alpha is outside (0, 1].
    pub fn try_new(alpha: f64) -> Result<Self> {
        if alpha > SMOOTHING_ALPHA_MIN && alpha <= SMOOTHING_ALPHA_MAX {
            Ok(Self { alpha, last: None })
        } else {
            Err(Error::FilterError(format!("Alpha must be in (0, 1], got {alpha}")))
        }
    }

    #[must_use]
    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    fn blend(&self, last: f64, new: f64) -> f64 {
        last * (1.0 - self.alpha) + new * self.alpha
    }

    fn blend_optional(&self, last: Option<f64>, new: Option<f64>) -> Option<f64> {
        match (last, new) {
            (Some(last), Some(new)) => Some(self.blend(last, new)),
            (None, new) => new,
            (Some(_), None) => None,
        }
    }
}

impl PointFilter for ExponentialFilter {
    fn apply(&mut self, point: Point) -> Point {
        let filtered = match self.last {
            Some(last) => Point {
                x: self.blend(last.x, point.x),
                y: self.blend(last.y, point.y),
                z: self.blend_optional(last.z, point.z),
                confidence: self.blend_optional(last.confidence, point.confidence),
            },
            None => point,
        };

        self.last = Some(filtered);
        filtered
    }

    fn reset(&mut self) {
        self.last = None;
    }

    fn name(&self) -> &str {
        "ExponentialFilter"
    }
}
