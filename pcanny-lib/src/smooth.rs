//! Separable Gaussian blur split across the group: the horizontal pass is
//! row-partitioned and gathered, the vertical pass is column-partitioned and
//! sum-reduced.
//!
//! Taps that fall outside the image are dropped and the result is divided by
//! the sum of the taps actually used, so border pixels keep their brightness
//! instead of fading towards zero.

use anyhow::{ensure, Result};
use log::debug;

use crate::collective::{merge_rows, merge_sum, Collective, PartitionPlan};
use crate::kernel::{gaussian_kernel, window_size};
use crate::raster::Raster;

/// Scale applied after the second pass so the 16-bit result keeps
/// sub-grey-level precision.
pub const BOOST_BLUR_FACTOR: f64 = 90.0;

/// How many taps a kernel may reach past the far edge of the image.
pub const MAX_OVERHANG: usize = 64;

/// Weighted sum of the in-bounds taps around `i` on an axis of length `n`,
/// returned with the sum of the weights used.
#[inline]
fn truncated_tap<F>(kernel: &[f32], i: usize, n: usize, sample: F) -> (f32, f32)
where
    F: Fn(usize) -> f32,
{
    let center = kernel.len() / 2;
    let first = i.saturating_sub(center);
    let last = (i + center).min(n - 1);
    let mut dot = 0.0f32;
    let mut sum = 0.0f32;
    for j in first..=last {
        let w = kernel[j + center - i];
        dot += sample(j) * w;
        sum += w;
    }
    (dot, sum)
}

/// Horizontal pass over `rows`, one output block of `rows.len() * cols`.
fn blur_rows(image: &Raster<u8>, kernel: &[f32], plan: &PartitionPlan) -> Vec<f32> {
    let cols = image.cols();
    let mut out = Vec::with_capacity(plan.row_range().len() * cols);
    for r in plan.row_range() {
        let row = image.row(r);
        for c in 0..cols {
            let (dot, sum) = truncated_tap(kernel, c, cols, |j| f32::from(row[j]));
            out.push(dot / sum);
        }
    }
    out
}

/// Vertical pass over the owned columns, zero elsewhere.
fn blur_cols(tmp: &Raster<f32>, kernel: &[f32], plan: &PartitionPlan) -> Result<Raster<i16>> {
    let rows = tmp.rows();
    let mut out = Raster::<i16>::zeros(rows, tmp.cols())?;
    for c in plan.col_range() {
        for r in 0..rows {
            let (dot, sum) = truncated_tap(kernel, r, rows, |j| tmp.get(j, c));
            let boosted = f64::from(dot) * BOOST_BLUR_FACTOR / f64::from(sum) + 0.5;
            out.set(r, c, boosted as i16);
        }
    }
    Ok(out)
}

pub fn gaussian_smooth<C: Collective>(
    ctx: &C,
    image: &Raster<u8>,
    sigma: f32,
) -> Result<Raster<i16>> {
    let window = window_size(sigma)?;
    let extent = image.rows().max(image.cols());
    ensure!(
        window / 2 <= extent.saturating_add(MAX_OVERHANG),
        "sigma {sigma} needs a {window}-tap kernel, too wide for a {}x{} image",
        image.rows(),
        image.cols()
    );
    let kernel = gaussian_kernel(sigma)?;
    if ctx.is_leader() {
        debug!("the gaussian kernel has {} elements", kernel.len());
    }
    let plan = PartitionPlan::for_worker(ctx, image.rows(), image.cols());
    if image.is_empty() {
        return Raster::zeros(image.rows(), image.cols());
    }

    let local = blur_rows(image, &kernel, &plan);
    let tmp = merge_rows(ctx, &plan, &local)?;
    drop(local);

    let contribution = blur_cols(&tmp, &kernel, &plan)?;
    drop(tmp);
    merge_sum(ctx, &contribution)
}
