//! End-to-end measurement scenarios through a session


use image::{DynamicImage, Rgb, RgbImage};
use optical_centering::{
    eyewear::{EyewearParams, MountingType},
    geometry::Point,
    measurement::effective_diameter,
    session::DragTarget,
};
use test_helpers::{assert_close, detection, memory_session};

fn still_image() -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 8, Rgb([10, 20, 30])))
}

#[test]
fn test_card_calibration_then_pd() {
    let mut session = memory_session();

    let data = session.calibrate_with_reference(85.6, 342.4).unwrap();
    assert_close(data.pixels_per_mm, 4.0);

    let m = session.on_frame(Some(&detection(0.9)), None).unwrap();
    assert_close(m.pd_mm, 62.0);
    assert_close(m.pd_left_mm, 31.0);
    assert_close(m.pd_right_mm, 31.0);
}

#[test]
fn test_uncalibrated_session_reports_zero() {
    let mut session = memory_session();
    let m = session.on_frame(Some(&detection(0.9)), None).unwrap();

    assert_eq!(m.pd_mm, 0.0);
    assert_eq!(m.pd_left_mm, 0.0);
    assert_eq!(m.height_left_mm, 0.0);
    assert_eq!(m.frame_height_mm, 0.0);
    assert_eq!(m.ed_left_mm, 0.0);
    assert_eq!(m.pixels_per_mm, None);
}

#[test]
fn test_capture_then_drag_left_pupil() {
    let mut session = memory_session();
    session.calibrate_with_reference(100.0, 400.0).unwrap();
    session.on_frame(Some(&detection(0.9)), None).unwrap();

    let before = session.capture(still_image()).unwrap();
    let landmarks_before = session.frozen().unwrap().landmarks.clone();
    let image_before = session.frozen().unwrap().image.as_bytes().to_vec();

    assert_eq!(session.drag_start(Point::new(196.0, 200.0)), Some(DragTarget::LeftPupil));
    let after = session.drag_move(Point::new(186.0, 200.0)).unwrap();
    session.drag_end();

    assert_close(before.pd_mm, 62.0);
    assert_close(after.pd_mm, 64.5);
    assert_close(after.pd_left_mm, 33.5);
    assert_close(after.pd_right_mm, before.pd_right_mm);

    let frozen = session.frozen().unwrap();
    assert_eq!(frozen.landmarks, landmarks_before);
    assert_eq!(frozen.image.as_bytes(), image_before.as_slice());
    assert_eq!(frozen.pupils.left.x, 186.0);
}

#[test]
fn test_height_line_above_pupil_clamps_to_zero() {
    let mut session = memory_session();
    session.calibrate_with_reference(100.0, 400.0).unwrap();
    session.on_frame(Some(&detection(0.9)), None).unwrap();

    // Seeded height line sits 80 px under the left pupil
    assert_eq!(session.drag_start(Point::new(150.0, 280.0)), Some(DragTarget::HeightLeft));
    let m = session.drag_move(Point::new(150.0, 320.0)).unwrap();
    assert_close(m.height_left_mm, 30.0);

    let m = session.drag_move(Point::new(150.0, 120.0)).unwrap();
    assert_eq!(m.height_left_mm, 0.0);
}

#[test]
fn test_height_lines_follow_pointer_side() {
    let mut session = memory_session();
    session.on_frame(Some(&detection(0.9)), None).unwrap();

    assert_eq!(session.drag_start(Point::new(150.0, 280.0)), Some(DragTarget::HeightLeft));
    session.drag_end();
    assert_eq!(session.drag_start(Point::new(500.0, 280.0)), Some(DragTarget::HeightRight));
}

#[test]
fn test_ed_with_manual_diagonal_after_capture() {
    let mut session = memory_session();
    session.calibrate_with_reference(100.0, 400.0).unwrap();
    session.on_frame(Some(&detection(0.9)), None).unwrap();
    let captured = session.capture(still_image()).unwrap();

    // Seeded diagonal spans 120 x 80 px around the frame center
    let diagonal_mm = (120.0f64).hypot(80.0) / 4.0;
    assert_close(captured.diagonal_mm, diagonal_mm);
    assert_close(captured.ed_left_mm, effective_diameter(70.0, 31.0, 31.0, diagonal_mm));
    assert_eq!(captured.ed_left_mm, captured.ed_right_mm);

    // Stretch the diagonal end point: ED follows the new length
    let end = session.frozen().unwrap().diagonal.end;
    assert_eq!(session.drag_start(end), Some(DragTarget::DiagonalEnd));
    let m = session.drag_move(end.translated(60.0, 40.0)).unwrap();
    let longer_mm = (180.0f64).hypot(120.0) / 4.0;
    assert_close(m.diagonal_mm, longer_mm);
    assert_close(m.ed_left_mm, 70.0 - 62.0 + longer_mm);
}

#[test]
fn test_frame_calibration_depends_on_mounting() {
    let mut rimmed = memory_session();
    rimmed.on_frame(Some(&detection(0.9)), None).unwrap();
    let data = rimmed.calibrate_from_frame().unwrap();
    assert_close(data.pixels_per_mm, 480.0 / 127.0);

    let mut rimless = memory_session();
    rimless.set_eyewear(EyewearParams {
        mounting_type: MountingType::Rimless,
        ..EyewearParams::default()
    });
    rimless.on_frame(Some(&detection(0.9)), None).unwrap();
    let data = rimless.calibrate_from_frame().unwrap();
    assert_close(data.pixels_per_mm, 480.0 / 122.0);
}

#[test]
fn test_retake_returns_to_live_tracking() {
    let mut session = memory_session();
    session.on_frame(Some(&detection(0.9)), None).unwrap();
    session.capture(still_image()).unwrap();
    assert!(session.on_frame(Some(&detection(0.9)), None).is_none());

    session.retake().unwrap();
    assert!(session.frozen().is_none());
    assert!(session.on_frame(Some(&detection(0.9)), None).is_some());

    // Diagonal and pupils are not draggable once live again
    assert_eq!(session.drag_start(Point::new(196.0, 200.0)), None);
}
