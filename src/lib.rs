//! Virtual optical-centering measurement engine.
//!
//! Turns a stream of noisy per-frame facial-landmark detections into
//! calibrated physical measurements used to fit eyeglass lenses: pupillary
//! distance, half-PDs from the frame center, lens heights, frame lens height
//! and the laboratory effective diameter.
//!
//! Per frame, data flows one way:
//! 1. up to two detectors produce [`fusion::EngineResult`]s, merged by [`fusion::fuse`]
//! 2. each pupil is smoothed by its own [`filters::PointFilter`]
//! 3. [`measurement::MeasurementCalculator`] converts pixels to millimeters
//!    using the scale held by [`calibration::CalibrationStore`]
//!
//! [`session::MeasurementSession`] gates whether live detector output or a
//! frozen, manually corrected capture feeds the calculator.
//!
//! # Examples
//!
//! ```
//! use optical_centering::{
//!     calibration::{storage::MemoryStorage, CalibrationStore},
//!     eyewear::EyewearParams,
//!     fusion::EngineResult,
//!     geometry::{Point, Pupils},
//!     session::{MeasurementSession, SessionSettings},
//! };
//!
//! # fn main() -> optical_centering::Result<()> {
//! let store = CalibrationStore::new(MemoryStorage::new(), "webcam-0");
//! let mut session = MeasurementSession::new(store, SessionSettings::default(), EyewearParams::default())?;
//!
//! // An ID-1 card measured at 342.4 px gives 4 px/mm
//! session.calibrate_with_reference(85.6, 342.4)?;
//!
//! let detection = EngineResult::new(
//!     Pupils::new(Point::new(196.0, 200.0), Point::new(444.0, 200.0)),
//!     None,
//!     0.9,
//! );
//! if let Some(measurement) = session.on_frame(Some(&detection), None) {
//!     println!("PD: {:.1} mm", measurement.pd_mm);
//! }
//! # Ok(())
//! # }
//! ```

/// Offline replay driver used by the binary
pub mod app;

/// Pixel-per-millimeter calibration and persistence
pub mod calibration;

/// Configuration management
pub mod config;

/// Constants used throughout the engine
pub mod constants;

/// Error types and result handling
pub mod error;

/// Eyewear form parameters and frame width rules
pub mod eyewear;

/// Temporal smoothing of tracked points
pub mod filters;

/// Confidence-weighted detector fusion
pub mod fusion;

/// Point types and pixel/millimeter conversion
pub mod geometry;

/// Per-frame measurement computation
pub mod measurement;

/// Capture/freeze state machine
pub mod session;

/// Numeric guards
pub mod utils;

pub use error::{Error, Result};
