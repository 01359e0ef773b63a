//! Pixel-per-millimeter calibration and its persistence.
//!
//! The store is a pure scale-factor abstraction: it turns a known physical
//! width and its measured pixel span into `pixels_per_mm`, persists the
//! record as JSON under a single key, and reports whether it is still fresh.
//! It knows nothing about frames or landmarks.

/// Durable key-value backends
pub mod storage;

use crate::constants::{CALIBRATION_MAX_AGE_DAYS, CALIBRATION_STORAGE_KEY, MS_PER_DAY};
use crate::utils::now_ms;
use crate::{Error, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use storage::KeyValueStorage;

/// Persisted scale factor plus provenance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalibrationData {
    /// Pixels per physical millimeter, always > 0
    pub pixels_per_mm: f64,
    /// Identity of the capturing device
    pub device_id: String,
    /// Capture time in milliseconds since the Unix epoch
    pub timestamp: u64,
    /// Pixel width of the physical reference used to derive the scale
    pub card_width_px: f64,
}

impl CalibrationData {
    /// Derive a calibration from a physical width and its measured pixel span
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCalibration`] if either width, or the
    /// resulting scale, is not a finite positive number.
    pub fn from_reference(
        reference_width_mm: f64,
        reference_width_px: f64,
        device_id: impl Into<String>,
        timestamp: u64,
    ) -> Result<Self> {
        if !(reference_width_mm.is_finite() && reference_width_mm > 0.0) {
            return Err(Error::InvalidCalibration(format!(
                "Reference width must be positive, got {reference_width_mm} mm"
            )));
        }
        if !(reference_width_px.is_finite() && reference_width_px > 0.0) {
            return Err(Error::InvalidCalibration(format!(
                "Reference span must be positive, got {reference_width_px} px"
            )));
        }

        let data = Self {
            pixels_per_mm: reference_width_px / reference_width_mm,
            device_id: device_id.into(),
            timestamp,
            card_width_px: reference_width_px,
        };
        if !data.is_well_formed() {
            return Err(Error::InvalidCalibration(format!(
                "Scale out of range: {reference_width_px} px over {reference_width_mm} mm"
            )));
        }
        Ok(data)
    }

    /// Age in whole days at `now_ms`
    #[must_use]
    pub fn age_days(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.timestamp) / MS_PER_DAY
    }

    fn is_well_formed(&self) -> bool {
        self.pixels_per_mm.is_finite() && self.pixels_per_mm > 0.0
    }
}

/// Calibration state injected into each measurement session
pub struct CalibrationStore<S: KeyValueStorage> {
    storage: S,
    key: String,
    device_id: String,
    max_age_ms: u64,
    current: Option<CalibrationData>,
}

impl<S: KeyValueStorage> CalibrationStore<S> {
    /// Create a store over `storage` using the default key and 30-day freshness
    pub fn new(storage: S, device_id: impl Into<String>) -> Self {
        Self::with_options(storage, device_id, CALIBRATION_STORAGE_KEY, CALIBRATION_MAX_AGE_DAYS)
    }

    pub fn with_options(
        storage: S,
        device_id: impl Into<String>,
        key: impl Into<String>,
        max_age_days: u64,
    ) -> Self {
        Self {
            storage,
            key: key.into(),
            device_id: device_id.into(),
            max_age_ms: max_age_days.saturating_mul(MS_PER_DAY),
            current: None,
        }
    }

    /// Compute a new scale from a reference width and persist it
    ///
    /// On invalid input the previous calibration is left untouched. A
    /// failed write is logged; the new calibration still applies in memory.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCalibration`] for non-positive widths.
    pub fn calibrate(&mut self, reference_width_mm: f64, reference_width_px: f64) -> Result<CalibrationData> {
        let data = match CalibrationData::from_reference(
            reference_width_mm,
            reference_width_px,
            self.device_id.clone(),
            now_ms(),
        ) {
            Ok(data) => data,
            Err(e) => {
                warn!("Calibration refused: {e}");
                return Err(e);
            }
        };

        info!(
            "Calibrated {:.3} px/mm from {:.1} mm over {:.1} px",
            data.pixels_per_mm, reference_width_mm, reference_width_px
        );

        if let Err(e) = self.save(data.clone()) {
            warn!("Failed to persist calibration: {e}");
        }
        Ok(data)
    }

    /// Replace the current calibration and persist the whole record
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be serialized or written. The
    /// in-memory calibration is replaced either way.
    pub fn save(&mut self, data: CalibrationData) -> Result<()> {
        let json = serde_json::to_string(&data)?;
        self.current = Some(data);
        self.storage.set(&self.key, &json)
    }

    /// Load the persisted calibration, treating any failure as "none"
    pub fn load(&mut self) -> Option<&CalibrationData> {
        self.current = match self.storage.get(&self.key) {
            Ok(Some(json)) => match serde_json::from_str::<CalibrationData>(&json) {
                Ok(data) if data.is_well_formed() => {
                    info!(
                        "Loaded calibration {:.3} px/mm from device {}",
                        data.pixels_per_mm, data.device_id
                    );
                    Some(data)
                }
                Ok(data) => {
                    warn!("Ignoring stored calibration with invalid scale {}", data.pixels_per_mm);
                    None
                }
                Err(e) => {
                    warn!("Ignoring corrupt stored calibration: {e}");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!("Failed to read stored calibration: {e}");
                None
            }
        };
        self.current.as_ref()
    }

    /// Forget the calibration both in memory and in storage
    ///
    /// # Errors
    ///
    /// Returns an error if the stored record cannot be removed.
    pub fn clear(&mut self) -> Result<()> {
        self.current = None;
        self.storage.remove(&self.key)
    }

    #[must_use]
    pub fn current(&self) -> Option<&CalibrationData> {
        self.current.as_ref()
    }

    /// Scale to use for conversions; `None` means uncalibrated
    #[must_use]
    pub fn pixels_per_mm(&self) -> Option<f64> {
        self.current.as_ref().map(|data| data.pixels_per_mm)
    }

    #[must_use]
    pub fn is_calibrated(&self) -> bool {
        self.current.is_some()
    }

    /// True only if a calibration exists and is younger than the max age
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.is_valid_at(now_ms())
    }

    #[must_use]
    pub fn is_valid_at(&self, now_ms: u64) -> bool {
        self.current
            .as_ref()
            .is_some_and(|data| now_ms.saturating_sub(data.timestamp) < self.max_age_ms)
    }

    /// Age in days of the current calibration
    #[must_use]
    pub fn age_days(&self) -> Option<u64> {
        self.current.as_ref().map(|data| data.age_days(now_ms()))
    }

    #[must_use]
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    #[must_use]
    pub fn storage(&self) -> &S {
        &self.storage
    }
}
