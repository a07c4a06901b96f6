use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use image::{DynamicImage, Rgb, RgbImage};
use imgly_cutout::{
    backends::{MockMask, MockSession},
    feather, resample, AlphaBuffer, Compositor, CutoutProcessor, ImagePreprocessor, MaskTensor,
    PipelineConfig,
};
use std::sync::Arc;
use tokio::runtime::Runtime;

const SIZES: [(u32, u32); 3] = [(320, 320), (1280, 720), (4000, 3000)];

fn photo(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    }))
}

fn soft_mask() -> MaskTensor {
    let size = 320usize;
    let center = size as f32 / 2.0;
    let data = (0..size * size)
        .map(|i| {
            let (x, y) = ((i % size) as f32, (i / size) as f32);
            let distance = ((x - center).powi(2) + (y - center).powi(2)).sqrt();
            (1.0 - (distance - 100.0) / 20.0).clamp(0.0, 1.0)
        })
        .collect();
    MaskTensor::new(data, vec![1, 1, size, size])
}

fn benchmark_preprocessing(c: &mut Criterion) {
    let mut group = c.benchmark_group("preprocessing");
    for (w, h) in SIZES {
        let image = photo(w, h);
        group.bench_with_input(BenchmarkId::from_parameter(format!("{w}x{h}")), &image, |b, image| {
            b.iter(|| ImagePreprocessor::to_tensor(black_box(image)).unwrap());
        });
    }
    group.finish();
}

fn benchmark_resample(c: &mut Criterion) {
    let mask = soft_mask();
    let mut group = c.benchmark_group("resample");
    for (w, h) in SIZES {
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{w}x{h}")),
            &(w, h),
            |b, &(w, h)| {
                b.iter(|| resample(black_box(&mask), 320, 320, w, h).unwrap());
            },
        );
    }
    group.finish();
}

fn benchmark_feather(c: &mut Criterion) {
    let mut group = c.benchmark_group("feather");
    let alpha = resample(&soft_mask(), 320, 320, 1280, 720).unwrap();
    for radius in [0.0f32, 2.0, 8.0] {
        group.bench_with_input(BenchmarkId::new("1280x720", radius), &radius, |b, &radius| {
            b.iter(|| feather(black_box(alpha.as_slice()), 1280, 720, radius).unwrap());
        });
    }
    group.finish();
}

fn benchmark_composite(c: &mut Criterion) {
    let mut group = c.benchmark_group("composite");
    group.sample_size(20);
    for (w, h) in SIZES {
        let image = photo(w, h);
        let alpha = AlphaBuffer::filled(w, h, 0.75);
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{w}x{h}")),
            &(image, alpha),
            |b, (image, alpha)| {
                b.iter(|| Compositor::composite(black_box(image), black_box(alpha)).unwrap());
            },
        );
    }
    group.finish();
}

fn benchmark_full_pipeline(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let processor = CutoutProcessor::with_session(
        PipelineConfig::default(),
        Arc::new(MockSession::builder().mask(MockMask::SoftCircle).build()),
    )
    .unwrap();
    let image = photo(1280, 720);

    let mut group = c.benchmark_group("pipeline");
    group.sample_size(10);
    group.bench_function("mock_session_1280x720", |b| {
        b.iter(|| rt.block_on(processor.process_image(black_box(&image))).unwrap());
    });
    group.finish();
}

criterion_group!(
    pipeline_benches,
    benchmark_preprocessing,
    benchmark_resample,
    benchmark_feather,
    benchmark_composite,
    benchmark_full_pipeline
);
criterion_main!(pipeline_benches);
