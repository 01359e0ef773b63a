//! Benchmarks for the per-frame measurement path

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use optical_centering::{
    calibration::{storage::MemoryStorage, CalibrationStore},
    eyewear::EyewearParams,
    fusion::{fuse_default, EngineResult},
    geometry::{LandmarkSet, Point, Pupils},
    measurement::{Diagonal, FrameReferenceOffsets, MeasurementCalculator, MeasurementInput, ReferenceLines},
    session::{MeasurementSession, SessionSettings},
};

fn landmarks() -> LandmarkSet {
    let mut points = vec![Point::default(); 468];
    points[234] = Point::new(80.0, 240.0);
    points[454] = Point::new(560.0, 240.0);
    LandmarkSet::new(points)
}

fn pupils() -> Pupils {
    Pupils::new(Point::new(196.0, 200.0), Point::new(444.0, 200.0))
}

fn benchmark_fusion(c: &mut Criterion) {
    let a = EngineResult::new(pupils(), Some(landmarks()), 0.9);
    let b = EngineResult::new(
        Pupils::new(Point::new(198.0, 201.0), Point::new(441.0, 199.0)),
        None,
        0.6,
    );

    c.bench_function("fuse_two_detectors", |bench| {
        bench.iter(|| black_box(fuse_default(black_box(Some(&a)), black_box(Some(&b)))));
    });
}

fn benchmark_compute(c: &mut Criterion) {
    let calculator = MeasurementCalculator::default();
    let pupils = pupils();
    let landmarks = landmarks();
    let input = MeasurementInput {
        pupils: &pupils,
        landmarks: Some(&landmarks),
        offsets: FrameReferenceOffsets::default(),
        lines: ReferenceLines {
            height_left_y: Some(280.0),
            height_right_y: Some(280.0),
            frame_top_y: Some(140.0),
            frame_bottom_y: Some(290.0),
        },
        diagonal: Some(Diagonal::new(Point::new(260.0, 160.0), Point::new(380.0, 240.0))),
        eyewear: EyewearParams::default(),
    };

    c.bench_function("measurement_compute", |bench| {
        bench.iter(|| black_box(calculator.compute(black_box(&input), Some(4.0), 0)));
    });
}

fn benchmark_session_frame(c: &mut Criterion) {
    let store = CalibrationStore::new(MemoryStorage::new(), "bench");
    let mut session = MeasurementSession::new(store, SessionSettings::default(), EyewearParams::default())
        .expect("default settings are valid");
    session
        .calibrate_with_reference(85.6, 342.4)
        .expect("reference widths are positive");
    let detection = EngineResult::new(pupils(), Some(landmarks()), 0.9);

    c.bench_function("session_on_frame", |bench| {
        bench.iter(|| black_box(session.on_frame(black_box(Some(&detection)), None)));
    });
}

criterion_group!(benches, benchmark_fusion, benchmark_compute, benchmark_session_frame);
criterion_main!(benches);
