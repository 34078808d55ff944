//! Bounded worker pool with a deadline
//!
//! Tasks are lazy futures. A pool call enqueues them in submission order,
//! starts `min(max_workers, tasks.len())` workers that claim tasks from the
//! front of the queue, and collects index-tagged results until every task has
//! reported back or the deadline passes. The returned `Vec` always has one
//! entry per submitted task, at the task's own index.
//!
//! At the deadline the remaining workers are aborted: queued tasks are dropped
//! without running and in-flight tasks are dropped at their next suspension
//! point. Every index without a result is reported as [`TaskError::Timeout`].

use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use std::any::Any;
use std::collections::{HashMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use super::error::TaskError;

pub const DEFAULT_MAX_WORKERS: usize = 4;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// A unit of work that either succeeds or fails.
pub type Task = BoxFuture<'static, Result<(), TaskError>>;

/// A unit of work producing a string value, used for read-only queries.
pub type StringTask = BoxFuture<'static, Result<String, TaskError>>;

/// Outcome of every task in one pool call, aligned with the submitted tasks.
pub type TaskResults = Vec<Result<(), TaskError>>;

/// A named list of tasks run concurrently with other batches.
pub struct Batch {
    pub name: String,
    pub tasks: Vec<Task>,
}

impl Batch {
    pub fn new(name: impl Into<String>, tasks: Vec<Task>) -> Self {
        Self {
            name: name.into(),
            tasks,
        }
    }
}

type Queue<T> = Arc<Mutex<VecDeque<(usize, BoxFuture<'static, Result<T, TaskError>>)>>>;

#[derive(Debug, Clone)]
pub struct WorkerPool {
    max_workers: usize,
    timeout: Duration,
}

impl WorkerPool {
    /// Create a pool. A zero worker count or zero timeout falls back to
    /// [`DEFAULT_MAX_WORKERS`] / [`DEFAULT_TIMEOUT`].
    pub fn new(max_workers: usize, timeout: Duration) -> Self {
        Self {
            max_workers: if max_workers == 0 {
                DEFAULT_MAX_WORKERS
            } else {
                max_workers
            },
            timeout: if timeout.is_zero() {
                DEFAULT_TIMEOUT
            } else {
                timeout
            },
        }
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run `tasks` and return `results[i]` for `tasks[i]`.
    pub async fn execute(&self, tasks: Vec<Task>) -> TaskResults {
        self.run_indexed(tasks).await
    }

    /// Run value-producing tasks; same scheduling and deadline as [`Self::execute`].
    pub async fn execute_string_tasks(
        &self,
        tasks: Vec<StringTask>,
    ) -> Vec<Result<String, TaskError>> {
        self.run_indexed(tasks).await
    }

    /// Run every batch as an independent [`Self::execute`] call, all batches
    /// at once. Returns when every batch has finished or hit its own deadline.
    /// A failing batch never cancels its siblings.
    pub async fn execute_batches(&self, batches: Vec<Batch>) -> HashMap<String, TaskResults> {
        if batches.is_empty() {
            return HashMap::new();
        }

        debug!("Executing {} batches concurrently", batches.len());
        let runs = batches.into_iter().map(|batch| async move {
            let results = self.execute(batch.tasks).await;
            (batch.name, results)
        });

        join_all(runs).await.into_iter().collect()
    }

    async fn run_indexed<T: Send + 'static>(
        &self,
        tasks: Vec<BoxFuture<'static, Result<T, TaskError>>>,
    ) -> Vec<Result<T, TaskError>> {
        let total = tasks.len();
        if total == 0 {
            return Vec::new();
        }

        let deadline = Instant::now() + self.timeout;
        let worker_count = self.max_workers.min(total).max(1);
        trace!(
            "Starting {} workers for {} tasks (timeout {:?})",
            worker_count,
            total,
            self.timeout
        );

        let queue: Queue<T> = Arc::new(Mutex::new(tasks.into_iter().enumerate().collect()));
        let (tx, mut rx) = mpsc::channel(total);

        let mut workers = JoinSet::new();
        for _ in 0..worker_count {
            let queue = Arc::clone(&queue);
            let tx = tx.clone();
            workers.spawn(async move {
                loop {
                    let next = queue.lock().await.pop_front();
                    let Some((index, task)) = next else {
                        break;
                    };
                    let outcome = AssertUnwindSafe(task)
                        .catch_unwind()
                        .await
                        .unwrap_or_else(|panic| Err(TaskError::Panicked(panic_message(panic))));
                    if tx.send((index, outcome)).await.is_err() {
                        break;
                    }
                }
            });
        }
        drop(tx);

        let mut slots: Vec<Option<Result<T, TaskError>>> = (0..total).map(|_| None).collect();
        let mut received = 0;
        while received < total {
            match tokio::time::timeout_at(deadline, rx.recv()).await {
                Ok(Some((index, outcome))) => {
                    slots[index] = Some(outcome);
                    received += 1;
                }
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        "Worker pool deadline of {:?} reached with {} of {} tasks unfinished",
                        self.timeout,
                        total - received,
                        total
                    );
                    break;
                }
            }
        }

        workers.shutdown().await;

        let timeout = self.timeout;
        slots
            .into_iter()
            .map(|slot| slot.unwrap_or_else(|| Err(TaskError::Timeout(timeout))))
            .collect()
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_WORKERS, DEFAULT_TIMEOUT)
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
