//! Collective operations over a fixed group of workers, and the
//! partition-aware merges every stage uses to rebuild a full buffer.
//!
//! A stage writes only its own slice of a buffer, then calls exactly one
//! combine:
//!
//! - [`merge_rows`] when each worker produced a contiguous block of rows
//!   (the blocks are concatenated in rank order);
//! - [`merge_sum`] when each worker produced a full-size buffer that is zero
//!   outside the positions it owns (the buffers are summed element-wise).
//!
//! After either call every worker holds a bitwise-identical buffer.

use std::fmt;
use std::ops::{Add, Range};

use anyhow::{anyhow, ensure, Result};

use crate::raster::Raster;

/// Element type that can travel through a collective.
pub trait Sample: Copy + Default + Send + Sync + Add<Output = Self> + 'static {}

impl<T> Sample for T where T: Copy + Default + Send + Sync + Add<Output = T> + 'static {}

/// The operations a worker group must provide. Every member must call the
/// same operations in the same order.
pub trait Collective {
    fn rank(&self) -> usize;

    fn size(&self) -> usize;

    fn is_leader(&self) -> bool {
        self.rank() == 0
    }

    fn barrier(&self) -> Result<()>;

    /// Concatenation of every worker's `local`, in rank order. Contributions
    /// may differ in length.
    fn all_gather<T: Sample>(&self, local: &[T]) -> Result<Vec<T>>;

    /// Element-wise sum of equally sized contributions, delivered to all.
    fn all_reduce_sum<T: Sample>(&self, local: &[T]) -> Result<Vec<T>>;

    /// Element-wise sum delivered to `root` only; other workers get `None`.
    fn reduce_sum<T: Sample>(&self, root: usize, local: &[T]) -> Result<Option<Vec<T>>>;

    /// `root` passes `Some(data)`, everyone receives a copy of it.
    fn broadcast<T: Sample>(&self, root: usize, data: Option<Vec<T>>) -> Result<Vec<T>>;

    /// Marks the group as failed. Pending and future collective calls of
    /// every member return [`GroupAborted`] instead of blocking.
    fn abort(&self);
}

/// Returned by collectives once any member of the group has aborted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupAborted {
    pub rank: usize,
}

impl fmt::Display for GroupAborted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker group aborted (observed by rank {})", self.rank)
    }
}

impl std::error::Error for GroupAborted {}

/// Sums equally sized contributions element-wise.
pub(crate) fn sum_elementwise<T: Sample>(parts: &[&[T]]) -> Result<Vec<T>> {
    let len = parts.first().map_or(0, |p| p.len());
    let mut out = vec![T::default(); len];
    for (rank, part) in parts.iter().enumerate() {
        ensure!(
            part.len() == len,
            "reduce size mismatch: rank {rank} sent {}, expected {len}",
            part.len()
        );
        for (acc, &v) in out.iter_mut().zip(part.iter()) {
            *acc = *acc + v;
        }
    }
    Ok(out)
}

/// Which rows and columns a worker owns for row-major and column-major
/// stages respectively.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionPlan {
    pub rank: usize,
    pub size: usize,
    pub rows: usize,
    pub cols: usize,
}

impl PartitionPlan {
    pub fn new(rank: usize, size: usize, rows: usize, cols: usize) -> Self {
        Self {
            rank,
            size,
            rows,
            cols,
        }
    }

    pub fn for_worker<C: Collective>(ctx: &C, rows: usize, cols: usize) -> Self {
        Self::new(ctx.rank(), ctx.size(), rows, cols)
    }

    fn split(&self, len: usize) -> Range<usize> {
        (self.rank * len / self.size)..((self.rank + 1) * len / self.size)
    }

    /// `[rank*rows/size, (rank+1)*rows/size)`
    pub fn row_range(&self) -> Range<usize> {
        self.split(self.rows)
    }

    /// `[rank*cols/size, (rank+1)*cols/size)`
    pub fn col_range(&self) -> Range<usize> {
        self.split(self.cols)
    }
}

/// Rebuilds a full raster from each worker's block of owned rows.
pub fn merge_rows<C, T>(ctx: &C, plan: &PartitionPlan, local: &[T]) -> Result<Raster<T>>
where
    C: Collective,
    T: Sample,
{
    let owned = plan.row_range().len() * plan.cols;
    ensure!(
        local.len() == owned,
        "rank {} produced {} samples for {} owned rows of {} columns",
        plan.rank,
        local.len(),
        plan.row_range().len(),
        plan.cols
    );
    ctx.barrier()?;
    let full = ctx.all_gather(local)?;
    Raster::from_vec(plan.rows, plan.cols, full)
}

/// Rebuilds a full raster from zero-padded contributions.
pub fn merge_sum<C, T>(ctx: &C, contribution: &Raster<T>) -> Result<Raster<T>>
where
    C: Collective,
    T: Sample,
{
    ctx.barrier()?;
    let full = ctx.all_reduce_sum(contribution.as_slice())?;
    Raster::from_vec(contribution.rows(), contribution.cols(), full)
}

/// Hands the leader's raster to every worker.
pub fn distribute_raster<C, T>(ctx: &C, raster: Option<Raster<T>>) -> Result<Raster<T>>
where
    C: Collective,
    T: Sample,
{
    const ROOT: usize = 0;
    let (shape, data) = match raster {
        Some(r) => (Some(vec![r.rows() as u64, r.cols() as u64]), Some(r.into_vec())),
        None => (None, None),
    };
    let shape = ctx.broadcast(ROOT, shape)?;
    let (rows, cols) = match shape.as_slice() {
        [rows, cols] => (*rows as usize, *cols as usize),
        other => return Err(anyhow!("malformed raster shape broadcast: {other:?}")),
    };
    let data = ctx.broadcast(ROOT, data)?;
    Raster::from_vec(rows, cols, data)
}
