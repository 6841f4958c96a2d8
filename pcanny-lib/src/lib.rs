//! Canny edge detection split across a group of cooperating workers.
//!
//! Every worker runs the same code on its own slice of rows or columns and
//! the partial results are merged after each stage with a collective
//! operation, so that every worker enters the next stage with the complete
//! intermediate image. The group is anything implementing [`Collective`];
//! [`run_group`] provides one backed by threads of the current process.
//!
//! ```no_run
//! use pcanny::{canny, run_group, CannyParams, Raster};
//!
//! # fn main() -> anyhow::Result<()> {
//! let image = Raster::filled(64, 64, 128u8)?;
//! let params = CannyParams::new(1.0, 0.3, 0.7);
//! let outputs = run_group(4, |ctx| canny(ctx, &image, &params))?;
//! let edges = outputs[0].edges.as_ref();
//! # let _ = edges;
//! # Ok(())
//! # }
//! ```

pub mod collective;
pub mod gradient;
pub mod group;
pub mod hysteresis;
pub mod kernel;
pub mod nms;
pub mod pipeline;
pub mod raster;
pub mod smooth;

pub use collective::{
    distribute_raster, merge_rows, merge_sum, Collective, GroupAborted, PartitionPlan, Sample,
};
pub use group::{run_group, LocalWorker};
pub use hysteresis::{Histogram, Thresholds};
pub use nms::EdgeLabel;
pub use pipeline::{canny, CannyOutput, CannyParams};
pub use raster::Raster;
