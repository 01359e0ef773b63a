//! Interactive measurement session and its capture/freeze state machine.
//!
//! `Live` reads fused, smoothed detector output on every frame. `Captured`
//! ignores the detector and measures a frozen snapshot that the user can
//! correct by dragging pupils and diagonal endpoints. The captured state
//! owns its [`RedrawLoop`], so leaving it drops the loop with it.

use crate::calibration::storage::KeyValueStorage;
use crate::calibration::{CalibrationData, CalibrationStore};
use crate::constants::{
    DEFAULT_DIAGONAL_OFFSET_X_PX, DEFAULT_DIAGONAL_OFFSET_Y_PX, DEFAULT_FRAME_BOTTOM_OFFSET_PX,
    DEFAULT_FRAME_TOP_OFFSET_PX, DEFAULT_HEIGHT_LINE_OFFSET_PX, DEFAULT_HIT_TOLERANCE_PX, DEFAULT_SMOOTHING_ALPHA,
    FUSION_MIN_CONFIDENCE,
};
use crate::eyewear::EyewearParams;
use crate::filters::PupilSmoother;
use crate::fusion::{fuse, EngineResult};
use crate::geometry::{distance, LandmarkSet, Point, Pupils, TempleRoles};
use crate::measurement::{
    Diagonal, FrameReferenceOffsets, Measurement, MeasurementCalculator, MeasurementInput, ReferenceLines,
};
use crate::utils::now_ms;
use crate::{Error, Result};
use image::{DynamicImage, GenericImageView};
use log::{debug, info};

/// Tunables for one session
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Filter spec for each pupil, e.g. `"exponential:0.5"`
    pub smoothing_filter: String,
    pub fusion_min_confidence: f64,
    pub temple_roles: TempleRoles,
    pub hit_tolerance_px: f64,
    /// Seeded diagonal endpoints sit at the frame center ± these offsets
    pub diagonal_offset_x_px: f64,
    pub diagonal_offset_y_px: f64,
    /// Seeded height lines sit this far below each pupil
    pub height_line_offset_px: f64,
    pub frame_top_offset_px: f64,
    pub frame_bottom_offset_px: f64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            smoothing_filter: format!("exponential:{DEFAULT_SMOOTHING_ALPHA}"),
            fusion_min_confidence: FUSION_MIN_CONFIDENCE,
            temple_roles: TempleRoles::default(),
            hit_tolerance_px: DEFAULT_HIT_TOLERANCE_PX,
            diagonal_offset_x_px: DEFAULT_DIAGONAL_OFFSET_X_PX,
            diagonal_offset_y_px: DEFAULT_DIAGONAL_OFFSET_Y_PX,
            height_line_offset_px: DEFAULT_HEIGHT_LINE_OFFSET_PX,
            frame_top_offset_px: DEFAULT_FRAME_TOP_OFFSET_PX,
            frame_bottom_offset_px: DEFAULT_FRAME_BOTTOM_OFFSET_PX,
        }
    }
}

/// Anything the user can grab with the pointer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragTarget {
    /// Frozen left pupil (captured only)
    LeftPupil,
    /// Frozen right pupil (captured only)
    RightPupil,
    /// Diagonal start point (captured only)
    DiagonalStart,
    /// Diagonal end point (captured only)
    DiagonalEnd,
    /// Vertical line at the left frame edge
    FrameLeft,
    /// Vertical line at the right frame edge
    FrameRight,
    /// Height line under the left pupil
    HeightLeft,
    /// Height line under the right pupil
    HeightRight,
    /// Top frame-span line
    FrameTop,
    /// Bottom frame-span line
    FrameBottom,
}

impl DragTarget {
    /// Pupils and the diagonal can only be moved on a frozen capture
    #[must_use]
    pub const fn requires_capture(self) -> bool {
        matches!(
            self,
            Self::LeftPupil | Self::RightPupil | Self::DiagonalStart | Self::DiagonalEnd
        )
    }
}

/// Redraw scheduler owned by the captured state
///
/// A drag requests a redraw; the next [`MeasurementSession::redraw`] call
/// consumes the request and recomputes.
#[derive(Debug, Clone, Default)]
pub struct RedrawLoop {
    pending: bool,
    ticks: u64,
}

impl RedrawLoop {
    fn started() -> Self {
        Self {
            pending: true,
            ticks: 0,
        }
    }

    pub fn request(&mut self) {
        self.pending = true;
    }

    fn tick(&mut self) -> bool {
        if self.pending {
            self.pending = false;
            self.ticks += 1;
            true
        } else {
            false
        }
    }

    /// Number of redraws performed since capture
    #[must_use]
    pub fn ticks(&self) -> u64 {
        self.ticks
    }
}

/// Snapshot taken on capture
#[derive(Debug, Clone)]
pub struct FrozenCapture {
    pub image: DynamicImage,
    pub landmarks: Option<LandmarkSet>,
    pub pupils: Pupils,
    pub diagonal: Diagonal,
    pub redraw: RedrawLoop,
}

/// Capture state machine
#[derive(Debug, Clone, Default)]
pub enum CaptureState {
    #[default]
    Live,
    Captured(Box<FrozenCapture>),
}

/// One interactive measurement session
pub struct MeasurementSession<S: KeyValueStorage> {
    calibration: CalibrationStore<S>,
    calculator: MeasurementCalculator,
    smoother: PupilSmoother,
    settings: SessionSettings,
    eyewear: EyewearParams,
    offsets: FrameReferenceOffsets,
    has_manual_frame_adjustment: bool,
    lines: ReferenceLines,
    live_pupils: Option<Pupils>,
    live_landmarks: Option<LandmarkSet>,
    drag: Option<DragTarget>,
    state: CaptureState,
}

impl<S: KeyValueStorage> MeasurementSession<S> {
    /// Start a session in the `Live` state
    ///
    /// # Errors
    ///
    /// Returns an error if the smoothing filter spec is invalid.
    pub fn new(calibration: CalibrationStore<S>, settings: SessionSettings, eyewear: EyewearParams) -> Result<Self> {
        let smoother = PupilSmoother::from_spec(&settings.smoothing_filter)?;
        Ok(Self {
            calibration,
            calculator: MeasurementCalculator::new(settings.temple_roles),
            smoother,
            settings,
            eyewear: eyewear.sanitized(),
            offsets: FrameReferenceOffsets::default(),
            has_manual_frame_adjustment: false,
            lines: ReferenceLines::default(),
            live_pupils: None,
            live_landmarks: None,
            drag: None,
            state: CaptureState::Live,
        })
    }

    /// Feed one detector frame; ignored while captured
    ///
    /// Returns `None` when captured or when neither detector produced usable,
    /// finite pupils this frame.
    pub fn on_frame(&mut self, primary: Option<&EngineResult>, secondary: Option<&EngineResult>) -> Option<Measurement> {
        if self.is_captured() {
            return None;
        }

        let fused = fuse(primary, secondary, self.settings.fusion_min_confidence);
        let Some(raw_pupils) = fused.pupils.filter(|_| fused.is_usable()) else {
            debug!("No usable detection this frame");
            return None;
        };
        if !raw_pupils.is_finite() {
            debug!("Dropping frame with non-finite pupil coordinates");
            return None;
        }

        let pupils = self.smoother.apply(raw_pupils);
        self.live_pupils = Some(pupils);
        self.live_landmarks = fused.landmarks;
        self.seed_reference_lines(&pupils);

        self.measure()
    }

    /// Freeze the current frame, landmarks and pupils
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] if already captured or if no pupils
    /// have been detected yet.
    pub fn capture(&mut self, image: DynamicImage) -> Result<Measurement> {
        if self.is_captured() {
            return Err(Error::InvalidState("Already captured".to_string()));
        }
        let pupils = self
            .live_pupils
            .ok_or_else(|| Error::InvalidState("Nothing to capture: no pupils detected yet".to_string()))?;
        let landmarks = self.live_landmarks.take();

        let center = Point::new(
            self.calculator.frame_center_x(&pupils, landmarks.as_ref(), self.offsets),
            pupils.midpoint().y,
        );
        let diagonal = Diagonal::new(
            center.translated(-self.settings.diagonal_offset_x_px, -self.settings.diagonal_offset_y_px),
            center.translated(self.settings.diagonal_offset_x_px, self.settings.diagonal_offset_y_px),
        );

        info!("Captured frame {}x{}", image.width(), image.height());
        self.drag = None;
        self.state = CaptureState::Captured(Box::new(FrozenCapture {
            image,
            landmarks,
            pupils,
            diagonal,
            redraw: RedrawLoop::started(),
        }));

        self.redraw()
            .ok_or_else(|| Error::InvalidState("Capture produced no measurement".to_string()))
    }

    /// Discard the frozen capture and return to live tracking
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] if not captured.
    pub fn retake(&mut self) -> Result<()> {
        if !self.is_captured() {
            return Err(Error::InvalidState("Nothing to retake".to_string()));
        }
        info!("Retake: back to live tracking");
        self.state = CaptureState::Live;
        self.drag = None;
        self.live_pupils = None;
        self.live_landmarks = None;
        self.smoother.reset();
        Ok(())
    }

    /// Run one redraw iteration of the captured state
    ///
    /// Returns `None` when live or when no redraw is pending.
    pub fn redraw(&mut self) -> Option<Measurement> {
        let ticked = match &mut self.state {
            CaptureState::Captured(frozen) => frozen.redraw.tick(),
            CaptureState::Live => false,
        };
        if !ticked {
            return None;
        }
        self.measure()
    }

    /// Compute a measurement from the current inputs, live or frozen
    #[must_use]
    pub fn measure(&self) -> Option<Measurement> {
        let (pupils, landmarks, diagonal) = match &self.state {
            CaptureState::Live => (self.live_pupils.as_ref()?, self.live_landmarks.as_ref(), None),
            CaptureState::Captured(frozen) => (&frozen.pupils, frozen.landmarks.as_ref(), Some(frozen.diagonal)),
        };

        let input = MeasurementInput {
            pupils,
            landmarks,
            offsets: self.offsets,
            lines: self.lines,
            diagonal,
            eyewear: self.eyewear,
        };
        Some(self.calculator.compute(&input, self.calibration.pixels_per_mm(), now_ms()))
    }

    /// Pick up the closest draggable target under the pointer
    pub fn drag_start(&mut self, pointer: Point) -> Option<DragTarget> {
        self.drag = self.hit_test(pointer);
        if let Some(target) = self.drag {
            debug!("Drag start on {target:?}");
        }
        self.drag
    }

    /// Move the grabbed target and return the recomputed measurement
    pub fn drag_move(&mut self, pointer: Point) -> Option<Measurement> {
        let target = self.drag?;
        if !pointer.x.is_finite() || !pointer.y.is_finite() {
            return None;
        }

        match target {
            DragTarget::LeftPupil | DragTarget::RightPupil | DragTarget::DiagonalStart | DragTarget::DiagonalEnd => {
                let CaptureState::Captured(frozen) = &mut self.state else {
                    return None;
                };
                let slot = match target {
                    DragTarget::LeftPupil => &mut frozen.pupils.left,
                    DragTarget::RightPupil => &mut frozen.pupils.right,
                    DragTarget::DiagonalStart => &mut frozen.diagonal.start,
                    _ => &mut frozen.diagonal.end,
                };
                slot.x = pointer.x;
                slot.y = pointer.y;
            }
            DragTarget::FrameLeft | DragTarget::FrameRight => {
                let (left, right) = self.current_landmarks()?.temples(self.settings.temple_roles)?;
                if target == DragTarget::FrameLeft {
                    self.offsets.frame_left_offset = pointer.x - left.x;
                } else {
                    self.offsets.frame_right_offset = pointer.x - right.x;
                }
                if !self.offsets.is_zero() {
                    self.has_manual_frame_adjustment = true;
                }
            }
            DragTarget::HeightLeft => self.lines.height_left_y = Some(pointer.y),
            DragTarget::HeightRight => self.lines.height_right_y = Some(pointer.y),
            DragTarget::FrameTop => self.lines.frame_top_y = Some(pointer.y),
            DragTarget::FrameBottom => self.lines.frame_bottom_y = Some(pointer.y),
        }

        if self.is_captured() {
            self.request_redraw();
            self.redraw()
        } else {
            self.measure()
        }
    }

    /// Release the grabbed target
    pub fn drag_end(&mut self) {
        self.drag = None;
    }

    /// Apply frame offsets proposed by an automatic edge detector
    ///
    /// Ignored once the user has adjusted the frame edges by hand. Returns
    /// whether the offsets were applied.
    pub fn apply_detected_frame_offsets(&mut self, offsets: FrameReferenceOffsets) -> bool {
        if self.has_manual_frame_adjustment {
            debug!("Keeping manual frame adjustment over detected offsets");
            return false;
        }
        self.offsets = offsets;
        true
    }

    /// Calibrate from a physical reference object of known width
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCalibration`] for non-positive widths; the
    /// previous calibration is kept.
    pub fn calibrate_with_reference(&mut self, reference_width_mm: f64, reference_width_px: f64) -> Result<CalibrationData> {
        let data = self.calibration.calibrate(reference_width_mm, reference_width_px)?;
        self.request_redraw();
        Ok(data)
    }

    /// Calibrate from the fitted frame's physical width and the current
    /// temple-to-temple span, manual offsets included
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCalibration`] if no temple landmarks are
    /// available or the span is degenerate.
    pub fn calibrate_from_frame(&mut self) -> Result<CalibrationData> {
        let span_px = self
            .calculator
            .temple_span_px(self.current_landmarks(), self.offsets)
            .ok_or_else(|| Error::InvalidCalibration("No temple landmarks to measure the frame".to_string()))?;
        let width_mm = self.eyewear.frame_width_mm();
        self.calibrate_with_reference(width_mm, span_px)
    }

    pub fn set_eyewear(&mut self, eyewear: EyewearParams) {
        self.eyewear = eyewear.sanitized();
        self.request_redraw();
    }

    #[must_use]
    pub fn is_captured(&self) -> bool {
        matches!(self.state, CaptureState::Captured(_))
    }

    #[must_use]
    pub fn state(&self) -> &CaptureState {
        &self.state
    }

    #[must_use]
    pub fn frozen(&self) -> Option<&FrozenCapture> {
        match &self.state {
            CaptureState::Captured(frozen) => Some(frozen),
            CaptureState::Live => None,
        }
    }

    #[must_use]
    pub fn offsets(&self) -> FrameReferenceOffsets {
        self.offsets
    }

    #[must_use]
    pub fn has_manual_frame_adjustment(&self) -> bool {
        self.has_manual_frame_adjustment
    }

    #[must_use]
    pub fn reference_lines(&self) -> ReferenceLines {
        self.lines
    }

    #[must_use]
    pub fn eyewear(&self) -> EyewearParams {
        self.eyewear
    }

    #[must_use]
    pub fn active_drag(&self) -> Option<DragTarget> {
        self.drag
    }

    #[must_use]
    pub fn calibration(&self) -> &CalibrationStore<S> {
        &self.calibration
    }

    pub fn calibration_mut(&mut self) -> &mut CalibrationStore<S> {
        &mut self.calibration
    }

    /// End the session and hand the long-lived store back
    #[must_use]
    pub fn into_calibration(self) -> CalibrationStore<S> {
        self.calibration
    }

    fn current_landmarks(&self) -> Option<&LandmarkSet> {
        match &self.state {
            CaptureState::Live => self.live_landmarks.as_ref(),
            CaptureState::Captured(frozen) => frozen.landmarks.as_ref(),
        }
    }

    fn current_pupils(&self) -> Option<&Pupils> {
        match &self.state {
            CaptureState::Live => self.live_pupils.as_ref(),
            CaptureState::Captured(frozen) => Some(&frozen.pupils),
        }
    }

    fn request_redraw(&mut self) {
        if let CaptureState::Captured(frozen) = &mut self.state {
            frozen.redraw.request();
        }
    }

    fn seed_reference_lines(&mut self, pupils: &Pupils) {
        let s = &self.settings;
        let mid_y = pupils.midpoint().y;
        self.lines.height_left_y.get_or_insert(pupils.left.y + s.height_line_offset_px);
        self.lines.height_right_y.get_or_insert(pupils.right.y + s.height_line_offset_px);
        self.lines.frame_top_y.get_or_insert(mid_y - s.frame_top_offset_px);
        self.lines.frame_bottom_y.get_or_insert(mid_y + s.frame_bottom_offset_px);
    }

    fn hit_test(&self, pointer: Point) -> Option<DragTarget> {
        let tolerance = self.settings.hit_tolerance_px;

        // Points take precedence over lines
        if let Some(frozen) = self.frozen() {
            let points = [
                (DragTarget::LeftPupil, frozen.pupils.left),
                (DragTarget::RightPupil, frozen.pupils.right),
                (DragTarget::DiagonalStart, frozen.diagonal.start),
                (DragTarget::DiagonalEnd, frozen.diagonal.end),
            ];
            let picked = closest(points.iter().map(|(target, p)| (*target, distance(p, &pointer))), tolerance);
            if picked.is_some() {
                return picked;
            }
        }

        let mut lines: Vec<(DragTarget, f64)> = Vec::with_capacity(6);
        if let Some((left_x, right_x)) = self.calculator.frame_edges_x(self.current_landmarks(), self.offsets) {
            lines.push((DragTarget::FrameLeft, (pointer.x - left_x).abs()));
            lines.push((DragTarget::FrameRight, (pointer.x - right_x).abs()));
        }

        // Each height line only responds on its own eye's side
        let center_x = self
            .current_pupils()
            .map(|p| self.calculator.frame_center_x(p, self.current_landmarks(), self.offsets));
        let on_left = center_x.map_or(true, |cx| pointer.x <= cx);
        if let Some(y) = self.lines.height_left_y.filter(|_| on_left) {
            lines.push((DragTarget::HeightLeft, (pointer.y - y).abs()));
        }
        if let Some(y) = self.lines.height_right_y.filter(|_| !on_left || center_x.is_none()) {
            lines.push((DragTarget::HeightRight, (pointer.y - y).abs()));
        }
        if let Some(y) = self.lines.frame_top_y {
            lines.push((DragTarget::FrameTop, (pointer.y - y).abs()));
        }
        if let Some(y) = self.lines.frame_bottom_y {
            lines.push((DragTarget::FrameBottom, (pointer.y - y).abs()));
        }

        closest(lines.into_iter(), tolerance)
    }
}

fn closest(candidates: impl Iterator<Item = (DragTarget, f64)>, tolerance: f64) -> Option<DragTarget> {
    candidates
        .filter(|(_, d)| d.is_finite() && *d <= tolerance)
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(target, _)| target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::storage::MemoryStorage;

    fn landmarks() -> LandmarkSet {
        let mut points = vec![Point::default(); 468];
        points[234] = Point::new(80.0, 240.0);
        points[454] = Point::new(560.0, 240.0);
        LandmarkSet::new(points)
    }

    fn detection() -> EngineResult {
        EngineResult::new(
            Pupils::new(Point::new(196.0, 200.0), Point::new(444.0, 200.0)),
            Some(landmarks()),
            0.9,
        )
    }

    fn session() -> MeasurementSession<MemoryStorage> {
        let store = CalibrationStore::new(MemoryStorage::new(), "test");
        MeasurementSession::new(store, SessionSettings::default(), EyewearParams::default()).unwrap()
    }

    #[test]
    fn test_live_frame_measures() {
        let mut s = session();
        s.calibrate_with_reference(100.0, 400.0).unwrap();
        let m = s.on_frame(Some(&detection()), None).unwrap();
        assert_eq!(m.pd_mm, 62.0);
        assert_eq!(m.frame_center_x, 320.0);
    }

    #[test]
    fn test_silence_emits_nothing() {
        let mut s = session();
        assert!(s.on_frame(None, None).is_none());
        assert!(s.on_frame(Some(&EngineResult::empty()), None).is_none());
    }

    #[test]
    fn test_nan_frame_is_treated_as_silence() {
        let mut s = session();
        s.calibrate_with_reference(100.0, 400.0).unwrap();
        let mut bad = detection();
        if let Some(pupils) = bad.pupils.as_mut() {
            pupils.left.x = f64::NAN;
        }
        assert!(s.on_frame(Some(&bad), None).is_none());

        let m = s.on_frame(Some(&detection()), None).unwrap();
        assert_eq!(m.pd_mm, 62.0);
        assert_eq!(m.pupils.left.x, 196.0);
    }

    #[test]
    fn test_capture_requires_detection() {
        let mut s = session();
        assert!(matches!(s.capture(DynamicImage::new_rgb8(4, 4)), Err(Error::InvalidState(_))));
    }

    #[test]
    fn test_captured_ignores_detector() {
        let mut s = session();
        s.on_frame(Some(&detection()), None).unwrap();
        s.capture(DynamicImage::new_rgb8(4, 4)).unwrap();

        let moved = EngineResult::new(Pupils::new(Point::new(0.0, 0.0), Point::new(10.0, 0.0)), None, 1.0);
        assert!(s.on_frame(Some(&moved), None).is_none());
        assert_eq!(s.frozen().unwrap().pupils.left.x, 196.0);
    }

    #[test]
    fn test_capture_seeds_diagonal() {
        let mut s = session();
        s.on_frame(Some(&detection()), None).unwrap();
        let m = s.capture(DynamicImage::new_rgb8(4, 4)).unwrap();

        let diagonal = s.frozen().unwrap().diagonal;
        assert_eq!(diagonal.start, Point::new(260.0, 160.0));
        assert_eq!(diagonal.end, Point::new(380.0, 240.0));
        assert_eq!(m.diagonal, Some(diagonal));
    }

    #[test]
    fn test_redraw_loop_stops_on_retake() {
        let mut s = session();
        s.on_frame(Some(&detection()), None).unwrap();
        s.capture(DynamicImage::new_rgb8(4, 4)).unwrap();

        // The capture consumed the initial redraw
        assert!(s.redraw().is_none());
        s.set_eyewear(EyewearParams::default());
        assert!(s.redraw().is_some());

        s.retake().unwrap();
        assert!(!s.is_captured());
        s.request_redraw();
        assert!(s.redraw().is_none());
        assert!(s.retake().is_err());
    }

    #[test]
    fn test_pupils_not_draggable_live() {
        let mut s = session();
        s.on_frame(Some(&detection()), None).unwrap();
        assert_ne!(s.drag_start(Point::new(196.0, 200.0)), Some(DragTarget::LeftPupil));
    }

    #[test]
    fn test_frame_edge_drag_sets_manual_flag() {
        let mut s = session();
        s.on_frame(Some(&detection()), None).unwrap();

        assert_eq!(s.drag_start(Point::new(82.0, 300.0)), Some(DragTarget::FrameLeft));
        s.drag_move(Point::new(100.0, 300.0)).unwrap();
        s.drag_end();

        assert_eq!(s.offsets().frame_left_offset, 20.0);
        assert!(s.has_manual_frame_adjustment());
        assert!(!s.apply_detected_frame_offsets(FrameReferenceOffsets::default()));
        assert_eq!(s.offsets().frame_left_offset, 20.0);
    }

    #[test]
    fn test_detected_offsets_apply_before_manual_drag() {
        let mut s = session();
        let offsets = FrameReferenceOffsets {
            frame_left_offset: 5.0,
            frame_right_offset: -5.0,
        };
        assert!(s.apply_detected_frame_offsets(offsets));
        assert_eq!(s.offsets(), offsets);
    }

    #[test]
    fn test_reference_lines_seeded_once() {
        let mut s = session();
        s.on_frame(Some(&detection()), None).unwrap();
        let lines = s.reference_lines();
        assert_eq!(lines.height_left_y, Some(280.0));
        assert_eq!(lines.frame_top_y, Some(140.0));
        assert_eq!(lines.frame_bottom_y, Some(290.0));

        s.on_frame(Some(&detection()), None).unwrap();
        assert_eq!(s.reference_lines(), lines);
    }

    #[test]
    fn test_calibrate_from_frame() {
        let mut s = session();
        assert!(s.calibrate_from_frame().is_err());

        s.on_frame(Some(&detection()), None).unwrap();
        // 2 × 52 + 18 + 5 = 127 mm over 480 px
        let data = s.calibrate_from_frame().unwrap();
        assert!((data.pixels_per_mm - 480.0 / 127.0).abs() < 1e-9);
    }
}
