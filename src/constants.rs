//! Constants used throughout the measurement engine

/// Landmark index of the left temple in a 468-point face mesh
pub const LEFT_TEMPLE_INDEX: usize = 234;

/// Landmark index of the right temple in a 468-point face mesh
pub const RIGHT_TEMPLE_INDEX: usize = 454;

/// Default exponential smoothing factor for pupil tracking
pub const DEFAULT_SMOOTHING_ALPHA: f64 = 0.5;

/// Exponential filter bounds
pub const SMOOTHING_ALPHA_MIN: f64 = 0.0;
pub const SMOOTHING_ALPHA_MAX: f64 = 1.0;

/// Below this confidence a detector is discarded in favour of the other one
pub const FUSION_MIN_CONFIDENCE: f64 = 0.2;

/// Calibrations older than this must be refreshed
pub const CALIBRATION_MAX_AGE_DAYS: u64 = 30;

/// Milliseconds in one day
pub const MS_PER_DAY: u64 = 24 * 60 * 60 * 1000;

/// Storage key under which the calibration record is persisted
pub const CALIBRATION_STORAGE_KEY: &str = "optical_calibration";

/// Width of an ID-1 card (bank card, driving licence) in millimeters
pub const ID1_CARD_WIDTH_MM: f64 = 85.6;

/// Eyewear defaults used when form input cannot be parsed
pub const DEFAULT_CALIBER_MM: f64 = 52.0;
pub const DEFAULT_BRIDGE_MM: f64 = 18.0;

/// Margin added to the frame width for mounts with a visible rim
pub const RIMMED_FRAME_ADJUSTMENT_MM: f64 = 5.0;

/// Rimless and drilled mounts have no rim to add margin for
pub const RIMLESS_FRAME_ADJUSTMENT_MM: f64 = 0.0;

/// Pointer distance within which a draggable target is picked up
pub const DEFAULT_HIT_TOLERANCE_PX: f64 = 12.0;

/// Offset of the seeded diagonal endpoints from the frame center
pub const DEFAULT_DIAGONAL_OFFSET_X_PX: f64 = 60.0;
pub const DEFAULT_DIAGONAL_OFFSET_Y_PX: f64 = 40.0;

/// Offset of the seeded height lines below each pupil
pub const DEFAULT_HEIGHT_LINE_OFFSET_PX: f64 = 80.0;

/// Offsets of the seeded frame-span lines above and below the pupils
pub const DEFAULT_FRAME_TOP_OFFSET_PX: f64 = 60.0;
pub const DEFAULT_FRAME_BOTTOM_OFFSET_PX: f64 = 90.0;
