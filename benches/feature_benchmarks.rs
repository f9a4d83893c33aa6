use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use voice_health::audio::{resample, AudioPreprocessor};
use voice_health::features::pitch::track_pitch;
use voice_health::features::FeatureExtractor;

const SAMPLE_RATE: u32 = 22050;

// Speech-like signal (fundamental plus two formant-ish partials)
fn speech_like(seconds: f32, sample_rate: u32) -> Vec<f32> {
    let n = (seconds * sample_rate as f32) as usize;
    (0..n)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            let f1 = (2.0 * std::f32::consts::PI * 200.0 * t).sin() * 0.3;
            let f2 = (2.0 * std::f32::consts::PI * 500.0 * t).sin() * 0.2;
            let f3 = (2.0 * std::f32::consts::PI * 1500.0 * t).sin() * 0.1;
            f1 + f2 + f3
        })
        .collect()
}

fn benchmark_feature_extraction(c: &mut Criterion) {
    let mut group = c.benchmark_group("Feature extraction");
    group.sample_size(10);

    let extractor = FeatureExtractor::new();
    for seconds in [15u32, 30, 60].iter() {
        let samples = speech_like(*seconds as f32, SAMPLE_RATE);
        group.bench_with_input(BenchmarkId::new("extract", seconds), &samples, |b, samples| {
            b.iter(|| black_box(extractor.extract(black_box(samples), SAMPLE_RATE)));
        });
    }

    group.finish();
}

fn benchmark_pitch_tracking(c: &mut Criterion) {
    let mut group = c.benchmark_group("Pitch tracking");
    group.sample_size(10);

    let samples = speech_like(15.0, SAMPLE_RATE);
    group.bench_function("mcleod_15s", |b| {
        b.iter(|| black_box(track_pitch(black_box(&samples), SAMPLE_RATE)));
    });

    group.finish();
}

fn benchmark_resampling(c: &mut Criterion) {
    let mut group = c.benchmark_group("Resample to 22.05kHz");
    group.sample_size(10);

    for rate in [16000u32, 44100, 48000].iter() {
        let samples = speech_like(15.0, *rate);
        group.bench_with_input(BenchmarkId::new("rate", rate), &samples, |b, samples| {
            b.iter(|| {
                let _ = black_box(resample(black_box(samples), *rate, SAMPLE_RATE));
            });
        });
    }

    group.finish();
}

fn benchmark_trim_silence(c: &mut Criterion) {
    let preprocessor = AudioPreprocessor::default();
    let mut samples = vec![0.0f32; SAMPLE_RATE as usize * 2];
    samples.extend(speech_like(15.0, SAMPLE_RATE));
    samples.extend(vec![0.0f32; SAMPLE_RATE as usize * 2]);

    c.bench_function("trim_silence_19s", |b| {
        b.iter(|| black_box(preprocessor.trim_silence(black_box(samples.clone()))));
    });
}

criterion_group!(
    benches,
    benchmark_feature_extraction,
    benchmark_pitch_tracking,
    benchmark_resampling,
    benchmark_trim_silence,
);
criterion_main!(benches);
