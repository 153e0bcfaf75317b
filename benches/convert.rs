use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rgbd_fusion::capture::{SyntheticScene, SyntheticSensorConfig};
use rgbd_fusion::cloud::{CloudDensity, ConvertOptions, PointCloudConverter};
use rgbd_fusion::mapping::{CalibratedMapper, Calibration};
use rgbd_fusion::Timestamp;
use std::sync::Arc;

fn bench_convert(c: &mut Criterion) {
    let calibration = Calibration::default();
    let mut scene = SyntheticScene::new(calibration.clone(), &SyntheticSensorConfig::default());
    let depth = scene.depth_frame(Timestamp::from_millis(0));
    let color = scene.color_frame(Timestamp::from_millis(0));
    let converter = PointCloudConverter::new(Arc::new(CalibratedMapper::new(calibration)));

    let mut group = c.benchmark_group("convert");

    let large = ConvertOptions {
        density: CloudDensity::Large,
        ..Default::default()
    };
    group.bench_function("large_aligned", |b| {
        b.iter(|| converter.convert(black_box(&color), black_box(&depth), &large))
    });

    let normal = ConvertOptions {
        density: CloudDensity::Normal { stride: 2 },
        ..Default::default()
    };
    group.bench_function("normal_aligned", |b| {
        b.iter(|| converter.convert(black_box(&color), black_box(&depth), &normal))
    });

    let geometry = ConvertOptions {
        align_to_color: false,
        preregistered: false,
        density: CloudDensity::Large,
    };
    group.bench_function("large_geometry_only", |b| {
        b.iter(|| converter.convert(black_box(&color), black_box(&depth), &geometry))
    });

    group.finish();
}

criterion_group!(benches, bench_convert);
criterion_main!(benches);
