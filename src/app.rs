//! Offline replay driver: feeds a recorded event stream through a session.
//!
//! Input is JSON lines, one [`SessionEvent`] per line. Every emitted
//! [`Measurement`] is written as one JSON line to the output.

use crate::calibration::storage::KeyValueStorage;
use crate::calibration::CalibrationStore;
use crate::constants::ID1_CARD_WIDTH_MM;
use crate::error::{Error, Result};
use crate::eyewear::EyewearParams;
use crate::fusion::EngineResult;
use crate::geometry::Point;
use crate::measurement::Measurement;
use crate::session::{MeasurementSession, SessionSettings};
use image::DynamicImage;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::io::{BufRead, Write};
use std::path::PathBuf;

/// Canvas used when a capture event names no image
const PLACEHOLDER_WIDTH: u32 = 640;
const PLACEHOLDER_HEIGHT: u32 = 480;

/// One recorded interaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Detector output for one video frame
    Frame {
        #[serde(default)]
        primary: Option<EngineResult>,
        #[serde(default)]
        secondary: Option<EngineResult>,
    },
    /// Freeze the current frame, optionally loading the still image
    Capture {
        #[serde(default)]
        image: Option<PathBuf>,
    },
    /// Return to live tracking
    Retake,
    /// Full pointer gesture: press at `from`, drag to `to`, release
    Drag { from: Point, to: Point },
    /// Calibrate against a physical reference object
    #[serde(rename_all = "camelCase")]
    Calibrate { width_mm: f64, width_px: f64 },
    /// Calibrate against the fitted frame's width
    CalibrateFrame,
    /// Update the eyewear form values
    Eyewear {
        caliber: String,
        bridge: String,
        #[serde(default)]
        mounting_type: String,
    },
}

/// How the session is calibrated before replay starts
#[derive(Debug, Clone, PartialEq)]
pub enum CalibrationMode {
    /// Use whatever is persisted
    Stored,
    /// Calibrate from a reference object width and its pixel span
    Reference { width_mm: f64, width_px: f64 },
}

impl CalibrationMode {
    /// Calibrate from an ID-1 card (85.6 mm) measured at `width_px`
    #[must_use]
    pub const fn id1_card(width_px: f64) -> Self {
        Self::Reference {
            width_mm: ID1_CARD_WIDTH_MM,
            width_px,
        }
    }
}

/// Replay configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub settings: SessionSettings,
    pub eyewear: EyewearParams,
    pub calibration_mode: CalibrationMode,
}

/// Counters reported at the end of a replay
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub events: usize,
    pub frames: usize,
    pub measurements: usize,
    pub skipped_frames: usize,
    pub rejected_events: usize,
}

/// Main application struct
pub struct MeasurementApp<S: KeyValueStorage> {
    session: MeasurementSession<S>,
}

impl<S: KeyValueStorage> MeasurementApp<S> {
    /// Create the app around a loaded calibration store
    pub fn new(config: AppConfig, mut calibration: CalibrationStore<S>) -> Result<Self> {
        info!("Initializing optical centering replay");

        if calibration.load().is_none() {
            info!("No stored calibration, measurements stay at 0 mm until calibrated");
        } else if !calibration.is_valid() {
            warn!(
                "Stored calibration is {} days old and should be refreshed",
                calibration.age_days().unwrap_or_default()
            );
        }

        let mut session = MeasurementSession::new(calibration, config.settings, config.eyewear)?;
        if let CalibrationMode::Reference { width_mm, width_px } = config.calibration_mode {
            session.calibrate_with_reference(width_mm, width_px)?;
        }

        Ok(Self { session })
    }

    #[must_use]
    pub fn session(&self) -> &MeasurementSession<S> {
        &self.session
    }

    /// Replay every event from `input`, writing measurements to `output`
    pub fn run<R: BufRead, W: Write>(&mut self, input: R, mut output: W) -> Result<ReplaySummary> {
        let mut summary = ReplaySummary::default();

        for (line_no, line) in input.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let event: SessionEvent = serde_json::from_str(&line)
                .map_err(|e| Error::InvalidInput(format!("Line {}: {e}", line_no + 1)))?;
            summary.events += 1;

            let is_frame = matches!(event, SessionEvent::Frame { .. });
            if is_frame {
                summary.frames += 1;
            }

            match self.handle(event) {
                Ok(Some(measurement)) => {
                    serde_json::to_writer(&mut output, &measurement)?;
                    output.write_all(b"\n")?;
                    summary.measurements += 1;
                }
                Ok(None) if is_frame => summary.skipped_frames += 1,
                Ok(None) => {}
                Err(e) => {
                    warn!("Line {}: {e}", line_no + 1);
                    summary.rejected_events += 1;
                }
            }
        }

        output.flush()?;
        info!(
            "Replayed {} events ({} frames), emitted {} measurements",
            summary.events, summary.frames, summary.measurements
        );
        Ok(summary)
    }

    /// Apply one event to the session
    pub fn handle(&mut self, event: SessionEvent) -> Result<Option<Measurement>> {
        match event {
            SessionEvent::Frame { primary, secondary } => {
                Ok(self.session.on_frame(primary.as_ref(), secondary.as_ref()))
            }
            SessionEvent::Capture { image } => {
                let image = match image {
                    Some(path) => image::open(path)?,
                    None => DynamicImage::new_rgb8(PLACEHOLDER_WIDTH, PLACEHOLDER_HEIGHT),
                };
                self.session.capture(image).map(Some)
            }
            SessionEvent::Retake => self.session.retake().map(|()| None),
            SessionEvent::Drag { from, to } => {
                if self.session.drag_start(from).is_none() {
                    return Err(Error::InvalidInput(format!(
                        "Nothing to drag at ({:.1}, {:.1})",
                        from.x, from.y
                    )));
                }
                let measurement = self.session.drag_move(to);
                self.session.drag_end();
                Ok(measurement)
            }
            SessionEvent::Calibrate { width_mm, width_px } => {
                self.session.calibrate_with_reference(width_mm, width_px)?;
                Ok(self.session.redraw().or_else(|| self.session.measure()))
            }
            SessionEvent::CalibrateFrame => {
                self.session.calibrate_from_frame()?;
                Ok(self.session.redraw().or_else(|| self.session.measure()))
            }
            SessionEvent::Eyewear {
                caliber,
                bridge,
                mounting_type,
            } => {
                self.session
                    .set_eyewear(EyewearParams::from_form(&caliber, &bridge, &mounting_type));
                Ok(self.session.redraw().or_else(|| self.session.measure()))
            }
        }
    }
}
