//! Temporal smoothing of tracked landmark points.
//!
//! Each tracked point (left pupil, right pupil) owns an independent filter
//! instance so that jitter on one eye never bleeds into the other.

/// Exponential filter for responsive smoothing
pub mod exponential;

use crate::constants::DEFAULT_SMOOTHING_ALPHA;
use crate::geometry::{Point, Pupils};
use crate::{Error, Result};

/// Trait for all point filters
pub trait PointFilter: Send + Sync {
    /// Feed a new observation and return the smoothed point
    fn apply(&mut self, point: Point) -> Point;

    /// Reset filter state
    fn reset(&mut self);

    /// Get filter name
    fn name(&self) -> &str;
}

/// No-op filter that passes through values unchanged
pub struct NoFilter;

impl PointFilter for NoFilter {
    fn apply(&mut self, point: Point) -> Point {
        point
    }

    fn reset(&mut self) {}

    fn name(&self) -> &str {
        "NoFilter"
    }
}

/// Create a point filter from a spec such as `"exponential:0.5"` or `"none"`
///
/// # Errors
///
/// Returns [`Error::FilterError`] for unknown filter names or invalid parameters.
pub fn create_filter(spec: &str) -> Result<Box<dyn PointFilter>> {
    let spec = spec.trim().to_lowercase();
    let mut parts = spec.split(':');
    let name = parts.next().unwrap_or_default();
    let param = parts.next();

    match name {
        "none" | "nofilter" => Ok(Box::new(NoFilter)),
        "exponential" | "ema" => {
            let alpha = match param {
                Some(raw) => raw
                    .parse::<f64>()
                    .map_err(|_| Error::FilterError(format!("Invalid alpha: {raw}")))?,
                None => DEFAULT_SMOOTHING_ALPHA,
            };
            Ok(Box::new(exponential::ExponentialFilter::try_new(alpha)?))
        }
        _ => Err(Error::FilterError(format!("Unknown filter type: {spec}"))),
    }
}

/// A pair of independent filters, one per pupil
pub struct PupilSmoother {
    left: Box<dyn PointFilter>,
    right: Box<dyn PointFilter>,
}

impl PupilSmoother {
    /// Build a smoother with two filters created from the same spec
    ///
    /// # Errors
    ///
    /// Returns an error if the filter spec is invalid.
    pub fn from_spec(spec: &str) -> Result<Self> {
        Ok(Self {
            left: create_filter(spec)?,
            right: create_filter(spec)?,
        })
    }

    /// Exponential smoothing with the given alpha on both eyes
    ///
    /// # Errors
    ///
    /// Returns an error if alpha is outside (0, 1].
    pub fn exponential(alpha: f64) -> Result<Self> {
        Ok(Self {
            left: Box::new(exponential::ExponentialFilter::try_new(alpha)?),
            right: Box::new(exponential::ExponentialFilter::try_new(alpha)?),
        })
    }

    pub fn apply(&mut self, pupils: Pupils) -> Pupils {
        Pupils {
            left: self.left.apply(pupils.left),
            right: self.right.apply(pupils.right),
        }
    }

    pub fn reset(&mut self) {
        self.left.reset();
        self.right.reset();
    }
}
