use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BatchSize, Criterion, Throughput};

use logtally::aggregate::templatize;
use logtally::config::ExtractionConfig;
use logtally::parsers::{LineParser, VariableRule};

fn sample_lines(count: usize) -> Vec<String> {
    (0..count)
        .map(|i| match i % 4 {
            0 => format!("2025-11-23 12:00:{:02} ERROR Database connection {} failed", i % 60, i),
            1 => format!("2025-11-23 12:00:{:02} INFO latency={} size={}", i % 60, i % 250, i * 3),
            2 => format!("2025-11-23 12:00:{:02} WARNING retry {} of 5", i % 60, i % 5),
            _ => format!("2025-11-23 12:00:{:02} INFO user {} logged in", i % 60, i),
        })
        .collect()
}

fn bench_parse_default(c: &mut Criterion) {
    let parser = LineParser::new(&ExtractionConfig::default());
    let lines = sample_lines(1000);

    let mut group = c.benchmark_group("parse_lines");
    group.throughput(Throughput::Elements(lines.len() as u64));
    group.bench_function("default_keywords", |b| {
        b.iter(|| black_box(parser.parse_lines(black_box(&lines))));
    });

    let config = ExtractionConfig {
        rules: vec![VariableRule::new("latency", r"latency=(\d+)").unwrap()],
        ..ExtractionConfig::default()
    };
    let parser = LineParser::new(&config);
    group.bench_function("explicit_rule", |b| {
        b.iter(|| black_box(parser.parse_lines(black_box(&lines))));
    });
    group.finish();
}

fn bench_templatize(c: &mut Criterion) {
    let message = "ERROR request 48213 failed after 3 retries in 1500 ms";
    c.bench_function("templatize", |b| {
        b.iter(|| black_box(templatize(black_box(message))));
    });
}

fn bench_parse_owned_batch(c: &mut Criterion) {
    let parser = LineParser::new(&ExtractionConfig::default());
    c.bench_function("parse_owned_batch_100", |b| {
        b.iter_batched(
            || sample_lines(100),
            |lines| black_box(parser.parse_lines(&lines)),
            BatchSize::SmallInput,
        );
    });
}

criterion_group!(benches, bench_parse_default, bench_templatize, bench_parse_owned_batch);
criterion_main!(benches);
