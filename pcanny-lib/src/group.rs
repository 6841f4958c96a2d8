//! In-process worker group: one thread per rank, collectives implemented
//! over a shared exchange table guarded by a mutex and condition variable.
//!
//! Every collective is a deposit, a barrier, a read of all deposits, and a
//! second barrier so nobody overwrites a slot that a slower rank has not yet
//! read. Aborting wakes every waiter and makes each later call fail, so a
//! failed or panicking rank never leaves its peers blocked.

use std::any::Any;
use std::sync::Arc;
use std::thread;

use anyhow::{anyhow, ensure, Result};
use log::{debug, error};
use parking_lot::{Condvar, Mutex};

use crate::collective::{sum_elementwise, Collective, GroupAborted, Sample};

type Deposit = Arc<dyn Any + Send + Sync>;

struct Exchange {
    slots: Vec<Option<Deposit>>,
    arrived: usize,
    generation: u64,
    aborted: bool,
}

struct Shared {
    size: usize,
    state: Mutex<Exchange>,
    wakeup: Condvar,
}

/// One member of a [`run_group`] group.
pub struct LocalWorker {
    rank: usize,
    shared: Arc<Shared>,
}

impl LocalWorker {
    fn aborted(&self) -> anyhow::Error {
        GroupAborted { rank: self.rank }.into()
    }

    fn wait_all(&self) -> Result<()> {
        let mut state = self.shared.state.lock();
        if state.aborted {
            return Err(self.aborted());
        }
        let generation = state.generation;
        state.arrived += 1;
        if state.arrived == self.shared.size {
            state.arrived = 0;
            state.generation += 1;
            self.shared.wakeup.notify_all();
            return Ok(());
        }
        while state.generation == generation && !state.aborted {
            self.shared.wakeup.wait(&mut state);
        }
        if state.generation == generation {
            return Err(self.aborted());
        }
        Ok(())
    }

    /// Deposits `local` and returns every rank's deposit, in rank order.
    fn exchange<T: Sample>(&self, local: Vec<T>) -> Result<Vec<Arc<Vec<T>>>> {
        {
            let mut state = self.shared.state.lock();
            if state.aborted {
                return Err(self.aborted());
            }
            let deposit: Deposit = Arc::new(local);
            state.slots[self.rank] = Some(deposit);
        }
        self.wait_all()?;
        let deposits = {
            let state = self.shared.state.lock();
            state
                .slots
                .iter()
                .enumerate()
                .map(|(rank, slot)| {
                    slot.clone()
                        .ok_or_else(|| anyhow!("rank {rank} made no deposit"))?
                        .downcast::<Vec<T>>()
                        .map_err(|_| anyhow!("rank {rank} deposited a different sample type"))
                })
                .collect::<Result<Vec<_>>>()?
        };
        self.wait_all()?;
        self.shared.state.lock().slots[self.rank] = None;
        Ok(deposits)
    }
}

impl Collective for LocalWorker {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.shared.size
    }

    fn barrier(&self) -> Result<()> {
        self.wait_all()
    }

    fn all_gather<T: Sample>(&self, local: &[T]) -> Result<Vec<T>> {
        let deposits = self.exchange(local.to_vec())?;
        let mut out = Vec::with_capacity(deposits.iter().map(|d| d.len()).sum());
        for part in &deposits {
            out.extend_from_slice(part);
        }
        Ok(out)
    }

    fn all_reduce_sum<T: Sample>(&self, local: &[T]) -> Result<Vec<T>> {
        let deposits = self.exchange(local.to_vec())?;
        let parts: Vec<&[T]> = deposits.iter().map(|d| d.as_slice()).collect();
        sum_elementwise(&parts)
    }

    fn reduce_sum<T: Sample>(&self, root: usize, local: &[T]) -> Result<Option<Vec<T>>> {
        ensure!(root < self.size(), "reduce root {root} outside group of {}", self.size());
        let deposits = self.exchange(local.to_vec())?;
        if self.rank != root {
            return Ok(None);
        }
        let parts: Vec<&[T]> = deposits.iter().map(|d| d.as_slice()).collect();
        sum_elementwise(&parts).map(Some)
    }

    fn broadcast<T: Sample>(&self, root: usize, data: Option<Vec<T>>) -> Result<Vec<T>> {
        ensure!(root < self.size(), "broadcast root {root} outside group of {}", self.size());
        let local = if self.rank == root {
            data.ok_or_else(|| anyhow!("broadcast root {root} has nothing to send"))?
        } else {
            Vec::new()
        };
        let deposits = self.exchange(local)?;
        Ok(deposits[root].to_vec())
    }

    fn abort(&self) {
        let mut state = self.shared.state.lock();
        if !state.aborted {
            debug!("rank {} aborts the worker group", self.rank);
        }
        state.aborted = true;
        self.shared.wakeup.notify_all();
    }
}

struct AbortOnPanic<'a>(&'a LocalWorker);

impl Drop for AbortOnPanic<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            self.0.abort();
        }
    }
}

/// Runs `work` on `size` threads, one per rank, and returns each rank's
/// result in rank order.
///
/// If any rank fails, the group is aborted and the first error that is not
/// merely a consequence of the abort is returned.
pub fn run_group<F, R>(size: usize, work: F) -> Result<Vec<R>>
where
    F: Fn(&LocalWorker) -> Result<R> + Sync,
    R: Send,
{
    ensure!(size > 0, "a worker group needs at least one worker");
    let shared = Arc::new(Shared {
        size,
        state: Mutex::new(Exchange {
            slots: vec![None; size],
            arrived: 0,
            generation: 0,
            aborted: false,
        }),
        wakeup: Condvar::new(),
    });

    let outcomes: Vec<Result<R>> = thread::scope(|scope| {
        let mut handles = Vec::with_capacity(size);
        for rank in 0..size {
            let worker = LocalWorker {
                rank,
                shared: Arc::clone(&shared),
            };
            let work = &work;
            let spawned = thread::Builder::new()
                .name(format!("rank-{rank}"))
                .spawn_scoped(scope, move || {
                    let _guard = AbortOnPanic(&worker);
                    let outcome = work(&worker);
                    if outcome.is_err() {
                        worker.abort();
                    }
                    outcome
                });
            if spawned.is_err() {
                // Ranks already running would wait forever for this one.
                LocalWorker {
                    rank,
                    shared: Arc::clone(&shared),
                }
                .abort();
            }
            handles.push(spawned);
        }
        handles
            .into_iter()
            .enumerate()
            .map(|(rank, spawned)| match spawned {
                Ok(handle) => handle
                    .join()
                    .unwrap_or_else(|_| Err(anyhow!("rank {rank} panicked"))),
                Err(e) => Err(anyhow!("failed to spawn rank {rank}: {e}")),
            })
            .collect()
    });

    let mut results = Vec::with_capacity(size);
    let mut first_abort = None;
    let mut root_cause = None;
    for outcome in outcomes {
        match outcome {
            Ok(value) => results.push(value),
            Err(e) if e.is::<GroupAborted>() => {
                first_abort.get_or_insert(e);
            }
            Err(e) => {
                root_cause.get_or_insert(e);
            }
        }
    }
    if let Some(e) = root_cause.or(first_abort) {
        error!("worker group failed: {e:#}");
        return Err(e);
    }
    Ok(results)
}
