//! Benchmark suite for varlens-lsp
//!
//! Run with: `cargo bench --bench benchmarks`
//! View report: `open target/criterion/report/index.html`

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

use varlens_lsp::scanner::{self, ViewportScanner};
use varlens_lsp::structure::{VarValue, lookup_path, parse};
use varlens_lsp::writer;

// =============================================================================
// Test Data Generation
// =============================================================================

fn generate_variables_file(key_count: usize) -> String {
    let mut content = String::from("# Generated settings\n");
    for i in 0..key_count {
        match i % 4 {
            0 => content.push_str(&format!("key_{i}: value number {i}\n")),
            1 => content.push_str(&format!("num_{i}: {i}\n")),
            2 => content.push_str(&format!(
                "group_{i}:\n  inner_a: {i}\n  inner_b: text\n"
            )),
            _ => content.push_str(&format!("list_{i}: [a, b, {i}]\n")),
        }
    }
    content
}

fn generate_document(token_count: usize) -> String {
    let mut content = String::new();
    for i in 0..token_count {
        content.push_str("Some prose before the placeholder goes here. ");
        content.push_str(&format!("{{{{< var group_2.inner_a >}}}} and more text {i}.\n"));
    }
    content
}

// =============================================================================
// Parser Benchmarks
// =============================================================================

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse");
    for size in [10, 100, 1000] {
        let content = generate_variables_file(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &content, |b, content| {
            b.iter(|| parse(black_box(content)));
        });
    }
    group.finish();
}

fn bench_lookup(c: &mut Criterion) {
    let content = generate_variables_file(1000);
    let parsed = parse(&content);

    c.bench_function("lookup_nested", |b| {
        b.iter(|| lookup_path(black_box(&parsed.data), black_box("group_2.inner_a")));
    });
}

// =============================================================================
// Scanner Benchmarks
// =============================================================================

fn bench_find_all(c: &mut Criterion) {
    let mut group = c.benchmark_group("find_all");
    for size in [10, 100, 1000] {
        let content = generate_document(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &content, |b, content| {
            b.iter(|| scanner::find_all(black_box(content)));
        });
    }
    group.finish();
}

fn bench_viewport_scan_cached(c: &mut Criterion) {
    let content = generate_document(100);
    let viewport = ViewportScanner::new();
    // Warm the cache once; the benchmark measures the hash-check hit path.
    viewport.scan("bench-view", &content, 0);

    c.bench_function("viewport_scan_cached", |b| {
        b.iter(|| viewport.scan(black_box("bench-view"), black_box(&content), 128));
    });
}

// =============================================================================
// Writer Benchmarks
// =============================================================================

fn bench_update_variable(c: &mut Criterion) {
    let content = generate_variables_file(1000);
    let parsed = parse(&content);
    let value = VarValue::String("replacement".to_string());

    c.bench_function("update_variable", |b| {
        b.iter(|| {
            writer::update_variable(black_box(&parsed), black_box("group_2.inner_b"), &value)
                .unwrap()
        });
    });
}

criterion_group!(
    benches,
    bench_parse,
    bench_lookup,
    bench_find_all,
    bench_viewport_scan_cached,
    bench_update_variable
);
criterion_main!(benches);
