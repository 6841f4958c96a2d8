//! Hysteresis thresholding: edges are pixels above a high threshold, plus
//! possible edges connected to them through pixels above a low threshold.
//! Both thresholds are derived from the histogram of the magnitudes that
//! survived non-maximum suppression.

use std::ops::Range;

use anyhow::{ensure, Result};
use log::debug;

use crate::collective::{Collective, PartitionPlan};
use crate::nms::EdgeLabel;
use crate::raster::Raster;

const ROOT: usize = 0;

/// 8-connected neighbourhood as `(dr, dc)`.
const NEIGHBOURS: [(isize, isize); 8] = [
    (0, 1),
    (-1, 1),
    (-1, 0),
    (-1, -1),
    (0, -1),
    (1, -1),
    (1, 0),
    (1, 1),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    pub low: i16,
    pub high: i16,
}

/// Count of possible-edge pixels per magnitude value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Histogram {
    counts: Vec<u32>,
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

impl Histogram {
    /// One bin per non-negative `i16` magnitude.
    pub const BINS: usize = 32768;

    pub fn new() -> Self {
        Self {
            counts: vec![0; Self::BINS],
        }
    }

    pub fn counts(&self) -> &[u32] {
        &self.counts
    }

    /// Adds the possible edges of `rows`.
    pub fn accumulate(&mut self, mag: &Raster<i16>, labels: &Raster<u8>, rows: Range<usize>) {
        let possible = EdgeLabel::PossibleEdge.code();
        for (&label, &m) in labels.row_block(rows.clone()).iter().zip(mag.row_block(rows)) {
            if label == possible {
                self.counts[m.max(0) as usize] += 1;
            }
        }
    }

    /// Element-wise sum with every other worker's histogram.
    pub fn merge<C: Collective>(self, ctx: &C) -> Result<Self> {
        ctx.barrier()?;
        let counts = ctx.all_reduce_sum(&self.counts)?;
        ensure!(counts.len() == Self::BINS, "merged histogram has {} bins", counts.len());
        Ok(Self { counts })
    }

    /// Possible edges with a non-zero magnitude.
    pub fn edge_count(&self) -> u64 {
        self.counts[1..].iter().map(|&n| u64::from(n)).sum()
    }

    /// Highest non-empty bin above 0, or 0 when there is none.
    pub fn max_magnitude(&self) -> usize {
        self.counts[1..]
            .iter()
            .rposition(|&n| n != 0)
            .map_or(0, |i| i + 1)
    }

    /// The high threshold is the `thigh` quantile of the non-zero magnitudes;
    /// the low threshold is `tlow` times the high one.
    pub fn thresholds(&self, tlow: f32, thigh: f32) -> Thresholds {
        let numedges = self.edge_count();
        let maximum_mag = self.max_magnitude();
        let highcount = (numedges as f64 * f64::from(thigh) + 0.5) as u64;

        let mut r = 1;
        let mut total = u64::from(self.counts[1]);
        while r + 1 < maximum_mag && total < highcount {
            r += 1;
            total += u64::from(self.counts[r]);
        }
        let high = r as i16;
        let low = (f64::from(high) * f64::from(tlow) + 0.5) as i16;
        Thresholds { low, high }
    }
}

/// Promotes every possible edge reachable from `start` through pixels whose
/// magnitude exceeds `low`. `start` must already be labelled an edge.
fn follow_edges(
    labels: &mut Raster<u8>,
    mag: &Raster<i16>,
    start: (usize, usize),
    low: i16,
    stack: &mut Vec<(usize, usize)>,
) {
    let possible = EdgeLabel::PossibleEdge.code();
    stack.push(start);
    while let Some((r, c)) = stack.pop() {
        for (dr, dc) in NEIGHBOURS {
            // Possible edges are never on the border, so their neighbours exist.
            let rr = r.wrapping_add_signed(dr);
            let cc = c.wrapping_add_signed(dc);
            if labels.get(rr, cc) == possible && mag.get(rr, cc) > low {
                labels.set(rr, cc, EdgeLabel::Edge.code());
                stack.push((rr, cc));
            }
        }
    }
}

/// Working labels: possible edges kept, everything else and the whole border
/// frame set to no-edge.
fn seed_labels(nms: &Raster<u8>) -> Raster<u8> {
    let possible = EdgeLabel::PossibleEdge.code();
    let mut labels = nms.map(|l| {
        if l == possible {
            possible
        } else {
            EdgeLabel::NoEdge.code()
        }
    });
    let (rows, cols) = (labels.rows(), labels.cols());
    for r in 0..rows {
        for c in 0..cols {
            if labels.is_border(r, c) {
                labels.set(r, c, EdgeLabel::NoEdge.code());
            }
        }
    }
    labels
}

#[derive(Debug, Clone)]
pub struct HysteresisOutput {
    /// Final 0 / 255 edge map, present on the leader only.
    pub edges: Option<Raster<u8>>,
    pub thresholds: Thresholds,
    pub histogram: Histogram,
}

pub fn apply_hysteresis<C: Collective>(
    ctx: &C,
    mag: &Raster<i16>,
    nms: &Raster<u8>,
    tlow: f32,
    thigh: f32,
) -> Result<HysteresisOutput> {
    let (rows, cols) = (mag.rows(), mag.cols());
    ensure!(
        nms.rows() == rows && nms.cols() == cols,
        "suppressed map {}x{} does not match the {rows}x{cols} magnitude",
        nms.rows(),
        nms.cols()
    );
    let plan = PartitionPlan::for_worker(ctx, rows, cols);
    let owned = plan.row_range();

    let mut labels = seed_labels(nms);

    let mut histogram = Histogram::new();
    histogram.accumulate(mag, &labels, owned.clone());
    let histogram = histogram.merge(ctx)?;
    let thresholds = histogram.thresholds(tlow, thigh);
    if ctx.is_leader() {
        debug!(
            "fractions {tlow} and {thigh} give magnitude thresholds low {} high {} ({} candidates)",
            thresholds.low,
            thresholds.high,
            histogram.edge_count()
        );
    }

    let possible = EdgeLabel::PossibleEdge.code();
    let mut stack = Vec::new();
    for r in owned {
        for c in 0..cols {
            if labels.get(r, c) == possible && mag.get(r, c) >= thresholds.high {
                labels.set(r, c, EdgeLabel::Edge.code());
                follow_edges(&mut labels, mag, (r, c), thresholds.low, &mut stack);
            }
        }
    }

    // Traces may have run into other workers' rows, so the merge is a union
    // of everything each worker reached rather than a row gather.
    let hits: Vec<u32> = labels
        .as_slice()
        .iter()
        .map(|&l| u32::from(l == EdgeLabel::Edge.code()))
        .collect();
    drop(labels);
    ctx.barrier()?;
    let edges = match ctx.reduce_sum(ROOT, &hits)? {
        Some(counts) => {
            let edge_map = counts
                .into_iter()
                .map(|n| {
                    if n > 0 {
                        EdgeLabel::Edge.code()
                    } else {
                        EdgeLabel::NoEdge.code()
                    }
                })
                .collect();
            Some(Raster::from_vec(rows, cols, edge_map)?)
        }
        None => None,
    };

    Ok(HysteresisOutput {
        edges,
        thresholds,
        histogram,
    })
}
