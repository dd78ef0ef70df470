//! Work partitioning and the worker pool for threaded loads.
//!
//! A threaded load picks the more numerous node role as its axis, splits
//! the sorted ids on that axis into contiguous [`IdRange`]s and runs one
//! task per range on a rayon pool. Each task opens its own connection,
//! reads the graph immutably and returns an owned result; the caller
//! merges results in shard order on its own thread.

use std::sync::atomic::{AtomicBool, Ordering};

use rayon::prelude::*;

use crate::config::ShardFailurePolicy;
use crate::model::{Graph, NodeId, Role};
use crate::query::IdRange;
use crate::storage::{self, Backend, SessionOptions};
use crate::{Error, Result};

/// Role whose ids are split across workers: TX when there are strictly
/// more TXs than RXs, RX otherwise.
pub fn choose_axis(graph: &Graph) -> Role {
    if graph.txs().len() > graph.rxs().len() {
        Role::Tx
    } else {
        Role::Rx
    }
}

/// Split ascending `ids` into at most `workers` contiguous ranges of
/// `ceil(len / workers)` ids each. Every id lands in exactly one range.
pub fn partition(ids: &[NodeId], workers: usize) -> Vec<IdRange> {
    if ids.is_empty() {
        return Vec::new();
    }
    let chunk = ids.len().div_ceil(workers.max(1));
    ids.chunks(chunk)
        .map(|c| IdRange::new(c[0], c[c.len() - 1]))
        .collect()
}

/// Ranges covering every node of `axis` in the graph.
pub fn plan(graph: &Graph, axis: Role, workers: usize) -> Vec<IdRange> {
    let ids: Vec<NodeId> = graph.nodes(axis).keys().copied().collect();
    partition(&ids, workers)
}

/// One shard that did not complete, kept when the policy is `Continue`.
#[derive(Debug)]
pub struct ShardError {
    pub range: IdRange,
    pub error: Error,
}

/// Results of a pool run: successful shard outputs in shard order, plus
/// the shards skipped under [`ShardFailurePolicy::Continue`].
#[derive(Debug)]
pub struct ShardOutcome<T> {
    pub outputs: Vec<(IdRange, T)>,
    pub failed: Vec<ShardError>,
}

enum ShardResult<T> {
    Done(T),
    Failed(Error),
    /// Not started because another shard already aborted the run.
    Skipped,
}

/// Runs shard tasks on a bounded pool.
pub struct ShardRunner<'a, B: Backend> {
    pub backend: &'a B,
    pub session: &'a SessionOptions,
    pub axis: Role,
    pub workers: usize,
    pub policy: ShardFailurePolicy,
}

impl<'a, B: Backend> ShardRunner<'a, B> {
    /// Run `task` once per range, each on a fresh connection.
    ///
    /// Cancellation always wins over the failure policy: a cancelled run
    /// returns [`Error::Cancelled`] whatever the policy.
    pub fn run<T, F>(&self, ranges: &[IdRange], task: F) -> Result<ShardOutcome<T>>
    where
        T: Send,
        F: Fn(&mut B::Conn, IdRange) -> Result<T> + Sync,
    {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers.max(1))
            .thread_name(|i| format!("propdata-shard-{i}"))
            .build()
            .map_err(|e| Error::Pool(e.to_string()))?;

        let aborted = AtomicBool::new(false);
        let results: Vec<ShardResult<T>> = pool.install(|| {
            ranges
                .par_iter()
                .map(|range| self.run_shard(*range, &task, &aborted))
                .collect()
        });

        self.session.cancel.check()?;

        let mut outcome = ShardOutcome { outputs: Vec::new(), failed: Vec::new() };
        for (range, result) in ranges.iter().zip(results) {
            match result {
                ShardResult::Done(out) => outcome.outputs.push((*range, out)),
                ShardResult::Skipped => {}
                ShardResult::Failed(Error::Cancelled) => return Err(Error::Cancelled),
                ShardResult::Failed(error) => match self.policy {
                    ShardFailurePolicy::Continue => {
                        tracing::warn!(axis = %self.axis, range = %range, error = %error, "shard failed, continuing");
                        outcome.failed.push(ShardError { range: *range, error });
                    }
                    _ => {
                        return Err(Error::ShardFailure {
                            axis: self.axis,
                            range: *range,
                            source: Box::new(error),
                        });
                    }
                },
            }
        }
        Ok(outcome)
    }

    fn run_shard<T, F>(&self, range: IdRange, task: &F, aborted: &AtomicBool) -> ShardResult<T>
    where
        F: Fn(&mut B::Conn, IdRange) -> Result<T>,
    {
        let attempts = match self.policy {
            ShardFailurePolicy::Retry { attempts } => attempts.saturating_add(1),
            _ => 1,
        };

        let mut last = None;
        for attempt in 1..=attempts {
            if aborted.load(Ordering::Acquire) {
                return ShardResult::Skipped;
            }
            if let Err(e) = self.session.cancel.check() {
                return ShardResult::Failed(e);
            }

            tracing::debug!(axis = %self.axis, range = %range, attempt, "shard started");
            match self.attempt(range, task) {
                Ok(out) => return ShardResult::Done(out),
                Err(Error::Cancelled) => return ShardResult::Failed(Error::Cancelled),
                Err(e) => {
                    if attempt < attempts {
                        tracing::warn!(axis = %self.axis, range = %range, attempt, error = %e, "shard failed, retrying");
                    }
                    last = Some(e);
                }
            }
        }

        if self.policy != ShardFailurePolicy::Continue {
            aborted.store(true, Ordering::Release);
        }
        match last {
            Some(e) => ShardResult::Failed(e),
            None => ShardResult::Skipped,
        }
    }

    /// One try on one connection; the connection is closed either way.
    fn attempt<T, F>(&self, range: IdRange, task: &F) -> Result<T>
    where
        F: Fn(&mut B::Conn, IdRange) -> Result<T>,
    {
        let mut conn = self.backend.connect(self.session)?;
        let out = task(&mut conn, range);
        let closed = storage::release(Some(conn));
        let out = out?;
        closed?;
        Ok(out)
    }
}
