//! Bounded-concurrency job scheduling with forkable sub-queues.
//!
//! A [`WorkQueue`] caps how many jobs run at the same time. [`WorkQueue::fork`]
//! hands out a child node that draws from the same capacity and the same FIFO
//! wait list, but keeps its own count of outstanding jobs. Waiting for a node
//! to go idle therefore only waits for the work that was added through that
//! node, while the total number of running jobs across the whole tree never
//! exceeds the limit the root was created with.
//!
//! ```ignore
//! let recordings = WorkQueue::new(4);
//! let parts = recordings.fork();
//! let etag = parts.add(move || upload_part(link, range));
//! parts.wait_until_idle().await;
//! ```

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::task::Context;
use std::task::Poll;

use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::sync::watch;
use tracing::trace;

type StartFn = Box<dyn FnOnce() + Send + 'static>;

/// Returned by a [`JobHandle`] when the job never produced a value, either
/// because it panicked or because the runtime dropped it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("queued job was aborted before it produced a value")]
pub struct JobAborted;

/// Capacity pool shared by a root queue and all of its forks.
struct Capacity {
    concurrency: usize,
    state: Mutex<CapacityState>,
}

#[derive(Default)]
struct CapacityState {
    running: usize,
    waiting: VecDeque<StartFn>,
}

impl Capacity {
    fn lock(&self) -> MutexGuard<'_, CapacityState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn submit(&self, start: StartFn) {
        let start_now = {
            let mut state = self.lock();
            if state.running < self.concurrency {
                state.running += 1;
                Some(start)
            } else {
                state.waiting.push_back(start);
                trace!(waiting = state.waiting.len(), "work queue at capacity");
                None
            }
        };
        if let Some(start) = start_now {
            start();
        }
    }

    /// Hands the slot of a settled job to the oldest waiter, or frees it.
    fn release(&self) {
        let next = {
            let mut state = self.lock();
            let next = state.waiting.pop_front();
            if next.is_none() {
                state.running = state.running.saturating_sub(1);
            }
            next
        };
        if let Some(next) = next {
            next();
        }
    }
}

/// Per-node bookkeeping for idle detection.
struct Node {
    outstanding: watch::Sender<usize>,
}

impl Node {
    fn new() -> Self {
        let (outstanding, _) = watch::channel(0);
        Self { outstanding }
    }
}

/// Releases the capacity slot and the node's outstanding count once the job
/// settles, including when it unwinds.
struct Settle {
    capacity: Arc<Capacity>,
    node: Arc<Node>,
}

impl Drop for Settle {
    fn drop(&mut self) {
        self.node
            .outstanding
            .send_modify(|outstanding| *outstanding = outstanding.saturating_sub(1));
        self.capacity.release();
    }
}

/// A node in a tree of queues that share one concurrency limit.
#[derive(Clone)]
pub struct WorkQueue {
    capacity: Arc<Capacity>,
    node: Arc<Node>,
}

impl WorkQueue {
    /// Creates a root queue that runs at most `concurrency` jobs at once.
    /// A limit of zero is treated as one.
    pub fn new(concurrency: usize) -> Self {
        Self {
            capacity: Arc::new(Capacity {
                concurrency: concurrency.max(1),
                state: Mutex::new(CapacityState::default()),
            }),
            node: Arc::new(Node::new()),
        }
    }

    /// Returns a child queue sharing this queue's capacity and wait list but
    /// tracking its own outstanding jobs.
    pub fn fork(&self) -> Self {
        Self {
            capacity: Arc::clone(&self.capacity),
            node: Arc::new(Node::new()),
        }
    }

    /// Schedules `job`.
    ///
    /// When the tree has a free slot the job is spawned before this returns;
    /// otherwise it waits in FIFO order behind every other queued job of the
    /// tree. The returned handle resolves to exactly what the job produced.
    ///
    /// Must be called from within a tokio runtime.
    pub fn add<F, Fut>(&self, job: F) -> JobHandle<Fut::Output>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future + Send + 'static,
        Fut::Output: Send + 'static,
    {
        self.node
            .outstanding
            .send_modify(|outstanding| *outstanding += 1);

        let (tx, rx) = oneshot::channel();
        let handle = Handle::current();
        let settle = Settle {
            capacity: Arc::clone(&self.capacity),
            node: Arc::clone(&self.node),
        };
        let start: StartFn = Box::new(move || {
            handle.spawn(async move {
                let settle = settle;
                let output = job().await;
                let _ = tx.send(output);
                drop(settle);
            });
        });

        self.capacity.submit(start);
        JobHandle { rx }
    }

    /// Resolves once every job added through this node has settled. Jobs
    /// added through forks, siblings or ancestors are not waited for.
    pub async fn wait_until_idle(&self) {
        let mut outstanding = self.node.outstanding.subscribe();
        // The sender lives in `self.node`, so the channel cannot close here.
        let _ = outstanding.wait_for(|outstanding| *outstanding == 0).await;
    }

    /// Number of jobs added through this node that have not settled yet.
    pub fn outstanding(&self) -> usize {
        *self.node.outstanding.borrow()
    }

    /// Jobs currently running across the whole tree.
    pub fn running(&self) -> usize {
        self.capacity.lock().running
    }

    /// Jobs waiting for a slot across the whole tree.
    pub fn waiting(&self) -> usize {
        self.capacity.lock().waiting.len()
    }

    pub fn concurrency(&self) -> usize {
        self.capacity.concurrency
    }
}

impl std::fmt::Debug for WorkQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkQueue")
            .field("concurrency", &self.concurrency())
            .field("running", &self.running())
            .field("waiting", &self.waiting())
            .field("outstanding", &self.outstanding())
            .finish()
    }
}

/// Completion of a job scheduled with [`WorkQueue::add`].
#[must_use = "dropping a JobHandle does not cancel the job, but its result is lost"]
pub struct JobHandle<T> {
    rx: oneshot::Receiver<T>,
}

impl<T> Future for JobHandle<T> {
    type Output = Result<T, JobAborted>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|result| result.map_err(|_| JobAborted))
    }
}
