//! The per-worker entry point tying the stages together.
//!
//! Every worker of the group calls [`canny`] with the same image and
//! parameters. A failure in any stage is logged with the stage name, aborts
//! the group so no peer stays blocked in a collective, and is returned with
//! the stage and rank attached.

use std::fmt;
use std::time::Instant;

use anyhow::{ensure, Result};
use log::{debug, error, info, warn};
use serde::Deserialize;

use crate::collective::{Collective, GroupAborted};
use crate::gradient::{derivative_x, derivative_y, magnitude, radian_direction, DiffFilter};
use crate::hysteresis::{apply_hysteresis, Histogram, Thresholds};
use crate::nms::non_max_suppression;
use crate::raster::Raster;
use crate::smooth::gaussian_smooth;

/// Detector parameters.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct CannyParams {
    /// Standard deviation of the Gaussian blur.
    pub sigma: f32,
    /// Low threshold as a fraction of the high threshold.
    pub tlow: f32,
    /// Fraction of the non-zero suppressed magnitudes below the high
    /// threshold.
    pub thigh: f32,
    /// Also compute the gradient direction image.
    pub direction: bool,
}

impl Default for CannyParams {
    fn default() -> Self {
        Self {
            sigma: 1.0,
            tlow: 0.3,
            thigh: 0.7,
            direction: false,
        }
    }
}

impl CannyParams {
    pub fn new(sigma: f32, tlow: f32, thigh: f32) -> Self {
        Self {
            sigma,
            tlow,
            thigh,
            direction: false,
        }
    }

    pub fn with_direction(mut self, direction: bool) -> Self {
        self.direction = direction;
        self
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.sigma.is_finite() && self.sigma > 0.0,
            "sigma must be a positive finite number, got {}",
            self.sigma
        );
        for (name, value) in [("tlow", self.tlow), ("thigh", self.thigh)] {
            ensure!(
                (0.0..=1.0).contains(&value),
                "{name} must be a fraction in [0, 1], got {value}"
            );
        }
        if self.tlow > self.thigh {
            warn!(
                "tlow {} is above thigh {}; they are usually chosen with tlow < thigh",
                self.tlow, self.thigh
            );
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct CannyOutput {
    /// Edge map, 0 on edges and 255 elsewhere. Leader only.
    pub edges: Option<Raster<u8>>,
    /// Gradient direction in radians. Leader only, and only when requested.
    pub direction: Option<Raster<f32>>,
    pub thresholds: Thresholds,
    /// Merged histogram of suppressed magnitudes, identical on every worker.
    pub histogram: Histogram,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Validation,
    Smoothing,
    DerivativeX,
    DerivativeY,
    Direction,
    Magnitude,
    Suppression,
    Hysteresis,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Validation => "parameter validation",
            Self::Smoothing => "gaussian smoothing",
            Self::DerivativeX => "x-derivative",
            Self::DerivativeY => "y-derivative",
            Self::Direction => "gradient direction",
            Self::Magnitude => "gradient magnitude",
            Self::Suppression => "non-maximal suppression",
            Self::Hysteresis => "hysteresis thresholding",
        };
        f.write_str(name)
    }
}

fn run_stage<C, T, F>(ctx: &C, stage: Stage, body: F) -> Result<T>
where
    C: Collective,
    F: FnOnce() -> Result<T>,
{
    if ctx.is_leader() {
        info!("{stage}");
    }
    let start = Instant::now();
    match body() {
        Ok(value) => {
            debug!("rank {} finished {stage} in {:?}", ctx.rank(), start.elapsed());
            Ok(value)
        }
        Err(e) => {
            // Peers failing because of someone else's abort stay quiet.
            if !e.is::<GroupAborted>() {
                error!("rank {}: {stage} failed: {e:#}", ctx.rank());
            }
            ctx.abort();
            Err(e.context(format!("{stage} failed on rank {}", ctx.rank())))
        }
    }
}

/// Runs the whole detector as one member of the group.
pub fn canny<C: Collective>(
    ctx: &C,
    image: &Raster<u8>,
    params: &CannyParams,
) -> Result<CannyOutput> {
    run_stage(ctx, Stage::Validation, || params.validate())?;

    let smoothed = run_stage(ctx, Stage::Smoothing, || {
        gaussian_smooth(ctx, image, params.sigma)
    })?;
    let delta_x = run_stage(ctx, Stage::DerivativeX, || derivative_x(ctx, &smoothed))?;
    let delta_y = run_stage(ctx, Stage::DerivativeY, || derivative_y(ctx, &smoothed))?;
    drop(smoothed);

    let direction = if params.direction && ctx.is_leader() {
        Some(run_stage(ctx, Stage::Direction, || {
            radian_direction(&delta_x, &delta_y, DiffFilter::Forward, DiffFilter::Forward)
        })?)
    } else {
        None
    };

    let mag = run_stage(ctx, Stage::Magnitude, || magnitude(ctx, &delta_x, &delta_y))?;
    let nms = run_stage(ctx, Stage::Suppression, || {
        non_max_suppression(ctx, &mag, &delta_x, &delta_y)
    })?;
    drop(delta_x);
    drop(delta_y);

    let hysteresis = run_stage(ctx, Stage::Hysteresis, || {
        apply_hysteresis(ctx, &mag, &nms, params.tlow, params.thigh)
    })?;

    Ok(CannyOutput {
        edges: hysteresis.edges,
        direction,
        thresholds: hysteresis.thresholds,
        histogram: hysteresis.histogram,
    })
}
