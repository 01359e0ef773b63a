//! Configuration management for the measurement engine

use crate::calibration::storage::KeyValueStorage;
use crate::calibration::CalibrationStore;
use crate::constants::{
    CALIBRATION_MAX_AGE_DAYS, CALIBRATION_STORAGE_KEY, DEFAULT_DIAGONAL_OFFSET_X_PX, DEFAULT_DIAGONAL_OFFSET_Y_PX,
    DEFAULT_FRAME_BOTTOM_OFFSET_PX, DEFAULT_FRAME_TOP_OFFSET_PX, DEFAULT_HEIGHT_LINE_OFFSET_PX,
    DEFAULT_HIT_TOLERANCE_PX, DEFAULT_SMOOTHING_ALPHA, FUSION_MIN_CONFIDENCE, LEFT_TEMPLE_INDEX, RIGHT_TEMPLE_INDEX,
};
use crate::eyewear::{EyewearParams, MountingType};
use crate::filters::create_filter;
use crate::geometry::TempleRoles;
use crate::session::SessionSettings;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Pupil smoothing configuration
    pub smoothing: SmoothingConfig,

    /// Detector fusion configuration
    pub fusion: FusionConfig,

    /// Landmark index roles
    pub landmarks: LandmarkConfig,

    /// Calibration persistence
    pub calibration: CalibrationConfig,

    /// Eyewear defaults
    pub eyewear: EyewearConfig,

    /// Pointer interaction
    pub interaction: InteractionConfig,
}

/// Pupil smoothing parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SmoothingConfig {
    /// Filter type (`exponential` or `none`)
    pub filter: String,

    /// Exponential filter alpha value
    pub alpha: f64,
}

/// Detector fusion parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    /// Confidence below which a detector is dropped in favour of the other
    pub min_confidence: f64,
}

/// Detector-specific landmark indices
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LandmarkConfig {
    pub left_temple_index: usize,
    pub right_temple_index: usize,
}

/// Calibration storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Directory holding the persisted calibration record
    pub storage_dir: PathBuf,

    /// Key of the calibration record
    pub storage_key: String,

    /// Days after which a calibration must be refreshed
    pub max_age_days: u64,

    /// Identity recorded with each calibration
    pub device_id: String,
}

/// Eyewear defaults used until the form provides values
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EyewearConfig {
    pub caliber: f64,
    pub bridge: f64,
    pub mounting_type: MountingType,
}

/// Pointer interaction configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InteractionConfig {
    /// Pick-up distance for draggable targets
    pub hit_tolerance_px: f64,

    /// Seeded diagonal offset from the frame center
    pub diagonal_offset_x_px: f64,
    pub diagonal_offset_y_px: f64,

    /// Seeded height line distance below each pupil
    pub height_line_offset_px: f64,

    /// Seeded frame-span lines around the pupil line
    pub frame_top_offset_px: f64,
    pub frame_bottom_offset_px: f64,
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            filter: "exponential".to_string(),
            alpha: DEFAULT_SMOOTHING_ALPHA,
        }
    }
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            min_confidence: FUSION_MIN_CONFIDENCE,
        }
    }
}

impl Default for LandmarkConfig {
    fn default() -> Self {
        Self {
            left_temple_index: LEFT_TEMPLE_INDEX,
            right_temple_index: RIGHT_TEMPLE_INDEX,
        }
    }
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            storage_dir: PathBuf::from(".optical-centering"),
            storage_key: CALIBRATION_STORAGE_KEY.to_string(),
            max_age_days: CALIBRATION_MAX_AGE_DAYS,
            device_id: "default-camera".to_string(),
        }
    }
}

impl Default for EyewearConfig {
    fn default() -> Self {
        let params = EyewearParams::default();
        Self {
            caliber: params.caliber,
            bridge: params.bridge,
            mounting_type: params.mounting_type,
        }
    }
}

impl Default for InteractionConfig {
    fn default() -> Self {
        Self {
            hit_tolerance_px: DEFAULT_HIT_TOLERANCE_PX,
            diagonal_offset_x_px: DEFAULT_DIAGONAL_OFFSET_X_PX,
            diagonal_offset_y_px: DEFAULT_DIAGONAL_OFFSET_Y_PX,
            height_line_offset_px: DEFAULT_HEIGHT_LINE_OFFSET_PX,
            frame_top_offset_px: DEFAULT_FRAME_TOP_OFFSET_PX,
            frame_bottom_offset_px: DEFAULT_FRAME_BOTTOM_OFFSET_PX,
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;

        serde_yaml::from_str(&content).map_err(|e| Error::ConfigError(format!("Failed to parse config: {e}")))
    }

    /// Save configuration to a YAML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content =
            serde_yaml::to_string(self).map_err(|e| Error::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)?;

        Ok(())
    }

    /// Filter spec string understood by [`create_filter`]
    #[must_use]
    pub fn smoothing_spec(&self) -> String {
        match self.smoothing.filter.to_lowercase().as_str() {
            "exponential" | "ema" => format!("exponential:{}", self.smoothing.alpha),
            other => other.to_string(),
        }
    }

    #[must_use]
    pub fn temple_roles(&self) -> TempleRoles {
        TempleRoles {
            left: self.landmarks.left_temple_index,
            right: self.landmarks.right_temple_index,
        }
    }

    #[must_use]
    pub fn eyewear_params(&self) -> EyewearParams {
        EyewearParams {
            caliber: self.eyewear.caliber,
            bridge: self.eyewear.bridge,
            mounting_type: self.eyewear.mounting_type,
        }
    }

    /// Session tunables derived from this configuration
    #[must_use]
    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            smoothing_filter: self.smoothing_spec(),
            fusion_min_confidence: self.fusion.min_confidence,
            temple_roles: self.temple_roles(),
            hit_tolerance_px: self.interaction.hit_tolerance_px,
            diagonal_offset_x_px: self.interaction.diagonal_offset_x_px,
            diagonal_offset_y_px: self.interaction.diagonal_offset_y_px,
            height_line_offset_px: self.interaction.height_line_offset_px,
            frame_top_offset_px: self.interaction.frame_top_offset_px,
            frame_bottom_offset_px: self.interaction.frame_bottom_offset_px,
        }
    }

    /// Calibration store over `storage` with this configuration's key and age
    pub fn calibration_store<S: KeyValueStorage>(&self, storage: S) -> CalibrationStore<S> {
        CalibrationStore::with_options(
            storage,
            self.calibration.device_id.clone(),
            self.calibration.storage_key.clone(),
            self.calibration.max_age_days,
        )
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        // Validate smoothing parameters
        create_filter(&self.smoothing_spec())
            .map_err(|e| Error::ConfigError(format!("Invalid smoothing configuration: {e}")))?;

        // Validate fusion threshold
        if !(0.0..=1.0).contains(&self.fusion.min_confidence) {
            return Err(Error::ConfigError(
                "Fusion min confidence must be between 0.0 and 1.0".to_string(),
            ));
        }

        // Validate landmark roles
        if self.landmarks.left_temple_index == self.landmarks.right_temple_index {
            return Err(Error::ConfigError(
                "Left and right temple indices must differ".to_string(),
            ));
        }

        // Validate calibration settings
        if self.calibration.max_age_days == 0 {
            return Err(Error::ConfigError("Calibration max age must be at least one day".to_string()));
        }
        if self.calibration.storage_key.trim().is_empty() {
            return Err(Error::ConfigError("Calibration storage key must not be empty".to_string()));
        }

        // Validate eyewear defaults
        if !(self.eyewear.caliber.is_finite() && self.eyewear.caliber > 0.0) {
            return Err(Error::ConfigError("Caliber must be positive".to_string()));
        }
        if !(self.eyewear.bridge.is_finite() && self.eyewear.bridge > 0.0) {
            return Err(Error::ConfigError("Bridge must be positive".to_string()));
        }

        // Validate interaction settings
        if !(self.interaction.hit_tolerance_px.is_finite() && self.interaction.hit_tolerance_px > 0.0) {
            return Err(Error::ConfigError("Hit tolerance must be positive".to_string()));
        }

        Ok(())
    }
}

/// Example configuration file content
pub const EXAMPLE_CONFIG: &str = r#"# Optical Centering Configuration

# Pupil smoothing
smoothing:
  filter: "exponential"
  alpha: 0.5

# Detector fusion
fusion:
  min_confidence: 0.2

# Landmark index roles (468-point face mesh)
landmarks:
  left_temple_index: 234
  right_temple_index: 454

# Calibration persistence
calibration:
  storage_dir: ".optical-centering"
  storage_key: "optical_calibration"
  max_age_days: 30
  device_id: "default-camera"

# Eyewear defaults
eyewear:
  caliber: 52.0
  bridge: 18.0
  mounting_type: "full_rim"

# Pointer interaction
interaction:
  hit_tolerance_px: 12.0
  diagonal_offset_x_px: 60.0
  diagonal_offset_y_px: 40.0
  height_line_offset_px: 80.0
  frame_top_offset_px: 60.0
  frame_bottom_offset_px: 90.0
"#;
