use std::collections::{BTreeSet, VecDeque};

use pcanny::gradient::{derivative_x, derivative_y, magnitude};
use pcanny::nms::non_max_suppression;
use pcanny::smooth::gaussian_smooth;
use pcanny::{
    canny, distribute_raster, run_group, CannyOutput, CannyParams, Collective, EdgeLabel, Raster,
};

const EDGE: u8 = EdgeLabel::Edge.code();
const NO_EDGE: u8 = EdgeLabel::NoEdge.code();

fn detect(workers: usize, image: &Raster<u8>, params: CannyParams) -> Vec<CannyOutput> {
    run_group(workers, |ctx| canny(ctx, image, &params)).unwrap()
}

fn step(rows: usize, cols: usize, vertical_edge: bool) -> Raster<u8> {
    let mut image = Raster::filled(rows, cols, 10u8).unwrap();
    for r in 0..rows {
        for c in 0..cols {
            let bright = if vertical_edge { c >= cols / 2 } else { r >= rows / 2 };
            if bright {
                image.set(r, c, 200);
            }
        }
    }
    image
}

/// Two overlapping rectangles, a disc and a soft ramp on a mid-grey ground.
fn scene(rows: usize, cols: usize) -> Raster<u8> {
    let mut image = Raster::filled(rows, cols, 60u8).unwrap();
    for r in 0..rows {
        for c in 0..cols {
            let mut v = 60u8;
            if (6..20).contains(&r) && (5..25).contains(&c) {
                v = 210;
            }
            if (14..30).contains(&r) && (18..34).contains(&c) {
                v = 140;
            }
            let (dr, dc) = (r as i64 - 30, c as i64 - 12);
            if dr * dr + dc * dc <= 36 {
                v = 20;
            }
            if r >= rows - 6 {
                v = (c * 255 / cols) as u8;
            }
            image.set(r, c, v);
        }
    }
    image
}

fn edge_pixels(edges: &Raster<u8>) -> Vec<(usize, usize)> {
    let mut out = Vec::new();
    for r in 0..edges.rows() {
        for c in 0..edges.cols() {
            if edges.get(r, c) == EDGE {
                out.push((r, c));
            }
        }
    }
    out
}

#[test]
fn uniform_image_has_no_edges() {
    let image = Raster::filled(12, 9, 131u8).unwrap();
    let out = detect(3, &image, CannyParams::default());
    let edges = out[0].edges.as_ref().unwrap();
    assert!(edges.as_slice().iter().all(|&v| v == NO_EDGE));
    assert_eq!(out[0].histogram.edge_count(), 0);
}

#[test]
fn black_image_has_no_edges() {
    let image = Raster::<u8>::zeros(10, 10).unwrap();
    let out = detect(2, &image, CannyParams::new(2.0, 0.5, 0.9));
    assert!(out[0].edges.as_ref().unwrap().as_slice().iter().all(|&v| v == NO_EDGE));
    assert_eq!(out[0].histogram.max_magnitude(), 0);
}

#[test]
fn vertical_step_gives_a_single_column() {
    // Row 6 is second to last and never tested for suppression.
    let image = step(8, 8, true);
    for workers in 1..=4 {
        let out = detect(workers, &image, CannyParams::default());
        let edges = out[0].edges.as_ref().unwrap();
        let expected: Vec<_> = (1..=5).map(|r| (r, 4)).collect();
        assert_eq!(edge_pixels(edges), expected, "{workers} workers");
        assert_eq!(out[0].thresholds.high, 10957);
        assert_eq!(out[0].thresholds.low, 3287);
        assert_eq!(out[0].histogram.edge_count(), 5);
    }
}

#[test]
fn horizontal_step_gives_a_single_row() {
    let image = step(8, 8, false);
    let out = detect(3, &image, CannyParams::default());
    let expected: Vec<_> = (1..=5).map(|c| (4, c)).collect();
    assert_eq!(edge_pixels(out[0].edges.as_ref().unwrap()), expected);
}

#[test]
fn only_the_leader_holds_the_edge_map() {
    let image = scene(40, 44);
    let out = detect(4, &image, CannyParams::default());
    assert!(out[0].edges.is_some());
    assert!(out[1..].iter().all(|o| o.edges.is_none() && o.direction.is_none()));
    assert!(out.iter().all(|o| o.thresholds == out[0].thresholds));
}

#[test]
fn result_does_not_depend_on_the_number_of_workers() {
    let image = scene(40, 44);
    let params = CannyParams::new(1.2, 0.35, 0.8);
    let reference = detect(1, &image, params).remove(0);
    let reference_edges = reference.edges.as_ref().unwrap();
    assert!(!edge_pixels(reference_edges).is_empty());
    for workers in 2..=5 {
        let out = detect(workers, &image, params).remove(0);
        assert_eq!(out.edges.as_ref(), Some(reference_edges), "{workers} workers");
        assert_eq!(out.thresholds, reference.thresholds);
        assert_eq!(out.histogram, reference.histogram);
    }
}

#[test]
fn edges_are_suppressed_maxima_reachable_from_strong_pixels() {
    let image = scene(40, 44);
    let params = CannyParams::default();
    let (mag, nms) = run_group(1, |ctx| {
        let smoothed = gaussian_smooth(ctx, &image, params.sigma)?;
        let dx = derivative_x(ctx, &smoothed)?;
        let dy = derivative_y(ctx, &smoothed)?;
        let mag = magnitude(ctx, &dx, &dy)?;
        let nms = non_max_suppression(ctx, &mag, &dx, &dy)?;
        Ok((mag, nms))
    })
    .unwrap()
    .remove(0);
    let out = detect(3, &image, params).remove(0);
    let edges = out.edges.unwrap();
    let t = out.thresholds;

    let (rows, cols) = (edges.rows(), edges.cols());
    let possible = |r: usize, c: usize| nms.get(r, c) == EdgeLabel::PossibleEdge.code();

    // Breadth-first search from every strong pixel through weak ones.
    let mut reached = BTreeSet::new();
    let mut queue = VecDeque::new();
    for r in 0..rows {
        for c in 0..cols {
            if possible(r, c) && mag.get(r, c) >= t.high && reached.insert((r, c)) {
                queue.push_back((r, c));
            }
        }
    }
    assert!(!queue.is_empty());
    while let Some((r, c)) = queue.pop_front() {
        for rr in r.saturating_sub(1)..=(r + 1).min(rows - 1) {
            for cc in c.saturating_sub(1)..=(c + 1).min(cols - 1) {
                if possible(rr, cc) && mag.get(rr, cc) > t.low && reached.insert((rr, cc)) {
                    queue.push_back((rr, cc));
                }
            }
        }
    }

    let found: BTreeSet<_> = edge_pixels(&edges).into_iter().collect();
    assert_eq!(found, reached);
    assert!(edges.as_slice().iter().all(|&v| v == EDGE || v == NO_EDGE));
}

#[test]
fn direction_is_computed_on_request() {
    let image = step(8, 8, true);
    let params = CannyParams::default().with_direction(true);
    let out = detect(3, &image, params);
    let direction = out[0].direction.as_ref().unwrap();
    assert_eq!((direction.rows(), direction.cols()), (8, 8));
    assert_eq!(direction.get(3, 4), 0.0);
    assert!(detect(2, &image, CannyParams::default())[0].direction.is_none());
}

#[test]
fn images_smaller_than_the_group() {
    for (rows, cols) in [(1, 1), (2, 2), (3, 3), (1, 7)] {
        let image = scene(40, 44);
        let image = Raster::from_vec(
            rows,
            cols,
            (0..rows * cols).map(|i| image.as_slice()[i * 13 % image.len()]).collect(),
        )
        .unwrap();
        let out = detect(5, &image, CannyParams::default());
        let edges = out[0].edges.as_ref().unwrap();
        assert_eq!((edges.rows(), edges.cols()), (rows, cols));
        for r in 0..rows {
            for c in 0..cols {
                let v = edges.get(r, c);
                assert!(v == EDGE || v == NO_EDGE);
                if edges.is_border(r, c) {
                    assert_eq!(v, NO_EDGE, "{rows}x{cols} border ({r}, {c})");
                }
            }
        }
    }
}

#[test]
fn invalid_sigma_names_the_failing_stage() {
    let image = step(8, 8, true);
    let err = run_group(2, |ctx| canny(ctx, &image, &CannyParams::new(0.0, 0.3, 0.7))).unwrap_err();
    let message = format!("{err:#}");
    assert!(message.contains("parameter validation failed on rank"), "{message}");
    assert!(message.contains("sigma"), "{message}");
}

#[test]
fn huge_sigma_fails_in_smoothing_instead_of_panicking() {
    let image = step(8, 8, true);
    for sigma in [1e9f32, 1e20] {
        let err = run_group(2, |ctx| canny(ctx, &image, &CannyParams::new(sigma, 0.3, 0.7)))
            .unwrap_err();
        let message = format!("{err:#}");
        assert!(message.contains("gaussian smoothing failed on rank"), "{message}");
        assert!(!message.contains("panicked"), "{message}");
    }
}

#[test]
fn leader_image_reaches_every_worker() {
    let image = scene(16, 12);
    let received = run_group(3, |ctx| {
        distribute_raster(ctx, ctx.is_leader().then(|| image.clone()))
    })
    .unwrap();
    assert!(received.iter().all(|r| r == &image));
}
