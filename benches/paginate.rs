//! Layout and pagination of a long comment.
//! Run: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use slidecast::layout::{assemble_tokens, FixedAdvance};
use slidecast::paginate::{paginate, AssetIndex, PageMetrics};

const METRICS: PageMetrics = PageMetrics {
    canvas_height: 500.0,
    top_margin: 10.0,
    bottom_margin: 10.0,
    line_height: 22.0,
};

fn long_comment() -> String {
    let paragraph = "My great great grandfather moved west with nothing but a wagon and \
                     a stubborn mule, and the family has told the story ever since. ";
    (0..40)
        .map(|_| paragraph.repeat(6))
        .collect::<Vec<_>>()
        .join("\n")
}

fn bench_paginate(c: &mut Criterion) {
    let body = long_comment();
    let measure = FixedAdvance(9.5);

    let mut group = c.benchmark_group("paginate");
    group.sample_size(50);

    group.bench_function("wrap_long_comment", |b| {
        b.iter(|| black_box(assemble_tokens(black_box(&body), &measure, 480.0)));
    });

    let tokens = assemble_tokens(&body, &measure, 480.0);
    group.bench_function("paginate_long_comment", |b| {
        b.iter(|| black_box(paginate(black_box(&tokens), &METRICS, AssetIndex::FIRST).pages.len()));
    });

    group.finish();
}

criterion_group!(benches, bench_paginate);
criterion_main!(benches);
