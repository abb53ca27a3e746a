use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tmux_mcp_core::{format_output, CaptureSnapshot, Fingerprint};

/// Build pane text shaped like a busy shell: prompts, output and blank padding.
fn pane_text(rows: usize, cols: usize) -> String {
    let mut lines = Vec::with_capacity(rows);
    for row in 0..rows {
        match row % 6 {
            0 => lines.push(format!("user@host:~/project$ cargo test --row {row}")),
            1 | 2 => lines.push(String::new()),
            _ => lines.push("x".repeat(cols)),
        }
    }
    lines.join("\n")
}

fn bench_fingerprint(c: &mut Criterion) {
    let mut group = c.benchmark_group("fingerprint");

    for (rows, cols) in [(24, 80), (50, 200), (200, 250)] {
        let text = pane_text(rows, cols);
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{rows}x{cols}")),
            &text,
            |b, text| {
                b.iter(|| black_box(Fingerprint::of(black_box(text.as_bytes()))));
            },
        );
    }

    group.finish();
}

fn bench_format_output(c: &mut Criterion) {
    let mut group = c.benchmark_group("format_output");

    for (rows, cols) in [(24, 80), (50, 200), (200, 250)] {
        let text = pane_text(rows, cols);
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{rows}x{cols}")),
            &text,
            |b, text| {
                b.iter(|| black_box(format_output(black_box(text))));
            },
        );
    }

    group.finish();
}

fn bench_snapshot(c: &mut Criterion) {
    let text = pane_text(50, 200);

    c.bench_function("snapshot_with_cursor", |b| {
        b.iter(|| {
            let snapshot = CaptureSnapshot::with_cursor("bench", black_box(text.as_str()), 42, 10);
            black_box(snapshot);
        });
    });
}

criterion_group!(benches, bench_fingerprint, bench_format_output, bench_snapshot);
criterion_main!(benches);
