use std::hint::black_box;
use std::io::Write;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use fwc_aio::aio::{self, AioConfig, Backend};
use fwc_aio::common::io::Input;
use fwc_aio::wc;

fn generate_text(lines: usize, words_per_line: usize) -> Vec<u8> {
    let mut data = Vec::new();
    for _ in 0..lines {
        for j in 0..words_per_line {
            if j > 0 {
                data.push(b' ');
            }
            data.extend_from_slice(b"hello");
        }
        data.push(b'\n');
    }
    data
}

fn bench_count_lines(c: &mut Criterion) {
    let mut group = c.benchmark_group("wc_lines");
    for size_mb in [1, 10] {
        let lines = size_mb * 1024 * 1024 / 12; // ~12 bytes per line
        let data = generate_text(lines, 1);
        group.bench_with_input(
            BenchmarkId::new("memchr", format!("{}MB", size_mb)),
            &data,
            |b, data| b.iter(|| wc::count_lines(black_box(data))),
        );
    }
    group.finish();
}

fn bench_count_words(c: &mut Criterion) {
    let data = generate_text(100_000, 5);
    c.bench_function("wc_words", |b| b.iter(|| wc::count_words(black_box(&data))));
}

/// Same buffer fed in 16KB chunks, as the engine delivers it.
fn bench_streaming_state(c: &mut Criterion) {
    let data = generate_text(100_000, 5);
    c.bench_function("wc_state_16k_chunks", |b| {
        b.iter(|| {
            let mut state = wc::WcState::new();
            for chunk in black_box(&data).chunks(16 * 1024) {
                state.feed(chunk);
            }
            state.counts()
        })
    });
}

fn bench_engine(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("input.txt");
    std::fs::File::create(&path)
        .unwrap()
        .write_all(&generate_text(400_000, 5))
        .unwrap();

    let mut group = c.benchmark_group("engine_12MB");
    group.sample_size(20);
    for (name, backend) in [("auto", Backend::Auto), ("blocking", Backend::Blocking)] {
        for depth in [1u32, 16] {
            let config = AioConfig {
                queue_depth: depth,
                ..Default::default()
            };
            group.bench_function(BenchmarkId::new(name, format!("qd{}", depth)), |b| {
                b.iter(|| {
                    let input = Input::open(&path).unwrap();
                    aio::count_inputs(vec![input], config, backend).unwrap()
                })
            });
        }
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_count_lines,
    bench_count_words,
    bench_streaming_state,
    bench_engine,
);
criterion_main!(benches);
