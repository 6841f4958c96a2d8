//! Non-maximum suppression on the gradient magnitude.
//!
//! For each interior pixel the gradient falls into one of eight octants. The
//! magnitude is linearly interpolated one pixel away on both sides along the
//! gradient, and the pixel survives as a possible edge only if it is not
//! exceeded by either interpolated value.

use anyhow::{ensure, Result};

use crate::collective::{merge_sum, Collective, PartitionPlan};
use crate::raster::Raster;

/// Per-pixel edge state, stored as its byte code in label rasters.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeLabel {
    Edge = 0,
    PossibleEdge = 128,
    NoEdge = 255,
}

impl EdgeLabel {
    #[inline]
    pub const fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Edge),
            128 => Some(Self::PossibleEdge),
            255 => Some(Self::NoEdge),
            _ => None,
        }
    }
}

/// Label of interior pixel `(r, c)`. The caller guarantees
/// `0 < r < rows - 1` and `0 < c < cols - 1`.
pub(crate) fn suppress_pixel(
    mag: &Raster<i16>,
    gradx: &Raster<i16>,
    grady: &Raster<i16>,
    r: usize,
    c: usize,
) -> EdgeLabel {
    let m00 = mag.get(r, c);
    if m00 == 0 {
        return EdgeLabel::NoEdge;
    }
    let gx = gradx.get(r, c);
    let gy = grady.get(r, c);
    let m = f32::from(m00);
    let xperp = -f32::from(gx) / m;
    let yperp = f32::from(gy) / m;
    let at = |rr: usize, cc: usize| f32::from(mag.get(rr, cc));
    let (up, down, left, right) = (r - 1, r + 1, c - 1, c + 1);

    let (mag1, mag2) = if gx >= 0 {
        if gy >= 0 {
            if gx >= gy {
                let side = |z1: f32, z2: f32| (m - z1) * xperp + (z2 - z1) * yperp;
                (
                    side(at(r, left), at(up, left)),
                    side(at(r, right), at(down, right)),
                )
            } else {
                let side = |z1: f32, z2: f32| (z1 - z2) * xperp + (z1 - m) * yperp;
                (
                    side(at(up, c), at(up, left)),
                    side(at(down, c), at(down, right)),
                )
            }
        } else if i32::from(gx) >= -i32::from(gy) {
            let side = |z1: f32, z2: f32| (m - z1) * xperp + (z1 - z2) * yperp;
            (
                side(at(r, left), at(down, left)),
                side(at(r, right), at(up, right)),
            )
        } else {
            let side = |z1: f32, z2: f32| (z1 - z2) * xperp + (m - z1) * yperp;
            (
                side(at(down, c), at(down, left)),
                side(at(up, c), at(up, right)),
            )
        }
    } else if gy >= 0 {
        if -i32::from(gx) >= i32::from(gy) {
            let side = |z1: f32, z2: f32| (z1 - m) * xperp + (z2 - z1) * yperp;
            (
                side(at(r, right), at(up, right)),
                side(at(r, left), at(down, left)),
            )
        } else {
            let side = |z1: f32, z2: f32| (z2 - z1) * xperp + (z1 - m) * yperp;
            (
                side(at(up, c), at(up, right)),
                side(at(down, c), at(down, left)),
            )
        }
    } else if -i32::from(gx) > -i32::from(gy) {
        let side = |z1: f32, z2: f32| (z1 - m) * xperp + (z1 - z2) * yperp;
        (
            side(at(r, right), at(down, right)),
            side(at(r, left), at(up, left)),
        )
    } else {
        let side = |z1: f32, z2: f32| (z2 - z1) * xperp + (m - z1) * yperp;
        (
            side(at(down, c), at(down, right)),
            side(at(up, c), at(up, left)),
        )
    };

    if mag1 > 0.0 || mag2 > 0.0 || mag2 == 0.0 {
        EdgeLabel::NoEdge
    } else {
        EdgeLabel::PossibleEdge
    }
}

/// True for pixels never tested for suppression: rows `0`, `rows - 2` and
/// `rows - 1`, and the same three columns.
#[inline]
pub fn outside_suppression(rows: usize, cols: usize, r: usize, c: usize) -> bool {
    r == 0 || c == 0 || r + 2 >= rows || c + 2 >= cols
}

/// Labels every pixel as [`EdgeLabel::PossibleEdge`] or
/// [`EdgeLabel::NoEdge`]. Rows are partitioned; neighbor reads may cross into
/// rows owned by another worker since every worker holds the full magnitude.
/// The frame of [`outside_suppression`] is the same for every group size.
pub fn non_max_suppression<C: Collective>(
    ctx: &C,
    mag: &Raster<i16>,
    gradx: &Raster<i16>,
    grady: &Raster<i16>,
) -> Result<Raster<u8>> {
    let (rows, cols) = (mag.rows(), mag.cols());
    ensure!(
        gradx.rows() == rows && gradx.cols() == cols && grady.rows() == rows && grady.cols() == cols,
        "gradient images do not match the {rows}x{cols} magnitude"
    );
    let plan = PartitionPlan::for_worker(ctx, rows, cols);
    let mut contribution = Raster::<u8>::zeros(rows, cols)?;
    for r in plan.row_range() {
        for c in 0..cols {
            let label = if outside_suppression(rows, cols, r, c) {
                EdgeLabel::NoEdge
            } else {
                suppress_pixel(mag, gradx, grady, r, c)
            };
            contribution.set(r, c, label.code());
        }
    }
    merge_sum(ctx, &contribution)
}
