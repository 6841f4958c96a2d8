//! First derivatives, gradient magnitude and gradient direction.
//!
//! ```text
//!                                  -1
//!   dx = -1 0 +1     and     dy =   0
//!                                  +1
//! ```
//!
//! Border pixels use one-sided differences so no pixel is lost.

use std::f64::consts::PI;

use anyhow::{ensure, Result};

use crate::collective::{merge_rows, merge_sum, Collective, PartitionPlan};
use crate::raster::Raster;

/// Orientation of a derivative filter, used to interpret its sign.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffFilter {
    /// `[-1 0 +1]`, the filter used by [`derivative_x`] and [`derivative_y`].
    Forward,
    /// `[+1 0 -1]`
    Backward,
}

#[inline]
fn diff(a: i16, b: i16) -> i16 {
    (i32::from(a) - i32::from(b)) as i16
}

/// Row-partitioned x-derivative, merged by gather.
pub fn derivative_x<C: Collective>(ctx: &C, smoothed: &Raster<i16>) -> Result<Raster<i16>> {
    let cols = smoothed.cols();
    let plan = PartitionPlan::for_worker(ctx, smoothed.rows(), cols);
    let mut local = Vec::with_capacity(plan.row_range().len() * cols);
    for r in plan.row_range() {
        let row = smoothed.row(r);
        if cols < 2 {
            local.extend(std::iter::repeat(0).take(cols));
            continue;
        }
        local.push(diff(row[1], row[0]));
        for c in 1..cols - 1 {
            local.push(diff(row[c + 1], row[c - 1]));
        }
        local.push(diff(row[cols - 1], row[cols - 2]));
    }
    merge_rows(ctx, &plan, &local)
}

/// Column-partitioned y-derivative, merged by sum-reduction.
pub fn derivative_y<C: Collective>(ctx: &C, smoothed: &Raster<i16>) -> Result<Raster<i16>> {
    let rows = smoothed.rows();
    let plan = PartitionPlan::for_worker(ctx, rows, smoothed.cols());
    let mut contribution = Raster::<i16>::zeros(rows, smoothed.cols())?;
    if rows >= 2 {
        for c in plan.col_range() {
            contribution.set(0, c, diff(smoothed.get(1, c), smoothed.get(0, c)));
            for r in 1..rows - 1 {
                contribution.set(r, c, diff(smoothed.get(r + 1, c), smoothed.get(r - 1, c)));
            }
            contribution.set(
                rows - 1,
                c,
                diff(smoothed.get(rows - 1, c), smoothed.get(rows - 2, c)),
            );
        }
    }
    merge_sum(ctx, &contribution)
}

/// `sqrt(dx² + dy²)` rounded to the nearest integer, row-partitioned.
pub fn magnitude<C: Collective>(
    ctx: &C,
    delta_x: &Raster<i16>,
    delta_y: &Raster<i16>,
) -> Result<Raster<i16>> {
    ensure!(
        delta_x.rows() == delta_y.rows() && delta_x.cols() == delta_y.cols(),
        "derivative images differ in shape: {}x{} vs {}x{}",
        delta_x.rows(),
        delta_x.cols(),
        delta_y.rows(),
        delta_y.cols()
    );
    let plan = PartitionPlan::for_worker(ctx, delta_x.rows(), delta_x.cols());
    let rows = plan.row_range();
    let local: Vec<i16> = delta_x
        .row_block(rows.clone())
        .iter()
        .zip(delta_y.row_block(rows))
        .map(|(&dx, &dy)| {
            let sq = i32::from(dx) * i32::from(dx) + i32::from(dy) * i32::from(dy);
            (0.5 + f64::from(sq).sqrt()) as i16
        })
        .collect();
    merge_rows(ctx, &plan, &local)
}

/// Angle of `(x, y)` in `[0, 2π)`, measured counterclockwise from +x.
/// The zero vector maps to 0.
pub fn angle_radians(x: f64, y: f64) -> f64 {
    let xu = x.abs();
    let yu = y.abs();
    if xu == 0.0 && yu == 0.0 {
        return 0.0;
    }
    let ang = (yu / xu).atan();
    match (x >= 0.0, y >= 0.0) {
        (true, true) => ang,
        (true, false) => 2.0 * PI - ang,
        (false, true) => PI - ang,
        (false, false) => PI + ang,
    }
}

/// Direction pointing up the gradient, in radians counterclockwise from the
/// x axis. The filters say how `delta_x` and `delta_y` were computed; image
/// rows grow downwards, so a forward y filter is negated.
pub fn radian_direction(
    delta_x: &Raster<i16>,
    delta_y: &Raster<i16>,
    x_filter: DiffFilter,
    y_filter: DiffFilter,
) -> Result<Raster<f32>> {
    ensure!(
        delta_x.rows() == delta_y.rows() && delta_x.cols() == delta_y.cols(),
        "derivative images differ in shape"
    );
    let mut dir = Raster::<f32>::zeros(delta_x.rows(), delta_x.cols())?;
    for ((out, &gx), &gy) in dir
        .as_mut_slice()
        .iter_mut()
        .zip(delta_x.as_slice())
        .zip(delta_y.as_slice())
    {
        let mut dx = f64::from(gx);
        let mut dy = f64::from(gy);
        if x_filter == DiffFilter::Backward {
            dx = -dx;
        }
        if y_filter == DiffFilter::Forward {
            dy = -dy;
        }
        *out = angle_radians(dx, dy) as f32;
    }
    Ok(dir)
}
