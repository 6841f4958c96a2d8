// Per-stage and full-pipeline benchmarks on a synthetic scene.
//
//   cargo bench -p pcanny

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

use pcanny::gradient::{derivative_x, derivative_y, magnitude};
use pcanny::kernel::gaussian_kernel;
use pcanny::nms::non_max_suppression;
use pcanny::smooth::gaussian_smooth;
use pcanny::{canny, run_group, CannyParams, Raster};

/// Horizontal and vertical ramps with a few bright rectangles on top.
fn make_scene(rows: usize, cols: usize) -> Raster<u8> {
    let mut img = Raster::<u8>::zeros(rows, cols).unwrap();
    for r in 0..rows {
        for c in 0..cols {
            img.set(r, c, ((c * 200 / cols) + (r * 55 / rows)) as u8);
        }
    }
    for rect in 0..6 {
        let r0 = (40 + (rect % 3) * 120) % rows;
        let c0 = (50 + rect * 100) % cols;
        let bright = 180u8.wrapping_add(rect as u8 * 10);
        for r in r0..(r0 + 60).min(rows) {
            for c in c0..(c0 + 80).min(cols) {
                img.set(r, c, bright);
            }
        }
    }
    img
}

fn bench_kernel(c: &mut Criterion) {
    c.bench_function("gaussian_kernel_sigma_2.5", |b| {
        b.iter(|| gaussian_kernel(2.5).unwrap())
    });
}

fn bench_stages(c: &mut Criterion) {
    let img = make_scene(480, 752);

    let mut group = c.benchmark_group("stages_1_worker");
    group.sample_size(20);
    group.bench_function("smooth_752x480", |b| {
        b.iter(|| run_group(1, |ctx| gaussian_smooth(ctx, &img, 1.5)).unwrap())
    });

    let smoothed = run_group(1, |ctx| gaussian_smooth(ctx, &img, 1.5))
        .unwrap()
        .remove(0);
    group.bench_function("derivatives_752x480", |b| {
        b.iter(|| {
            run_group(1, |ctx| Ok((derivative_x(ctx, &smoothed)?, derivative_y(ctx, &smoothed)?)))
                .unwrap()
        })
    });

    let (dx, dy, mag) = run_group(1, |ctx| {
        let dx = derivative_x(ctx, &smoothed)?;
        let dy = derivative_y(ctx, &smoothed)?;
        let mag = magnitude(ctx, &dx, &dy)?;
        Ok((dx, dy, mag))
    })
    .unwrap()
    .remove(0);
    group.bench_function("nms_752x480", |b| {
        b.iter(|| run_group(1, |ctx| non_max_suppression(ctx, &mag, &dx, &dy)).unwrap())
    });
    group.finish();
}

fn bench_pipeline(c: &mut Criterion) {
    let img = make_scene(480, 752);
    let params = CannyParams::new(1.5, 0.3, 0.7);

    let mut group = c.benchmark_group("canny_752x480");
    group.sample_size(10);
    for workers in [1, 2, 4, 8] {
        group.bench_with_input(BenchmarkId::from_parameter(workers), &workers, |b, &n| {
            b.iter(|| run_group(n, |ctx| canny(ctx, &img, &params)).unwrap())
        });
    }
    group.finish();
}

criterion_group!(benches, bench_kernel, bench_stages, bench_pipeline);
criterion_main!(benches);
