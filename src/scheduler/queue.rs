//! Fixed-capacity concurrency limiter.
//!
//! A [`BoundedTaskQueue`] accepts any number of [`ProvisionTask`]s and runs at
//! most `capacity` of them at once. Admission is FIFO but callers must not
//! rely on it. Each task runs on its own tokio task; a panic inside a task is
//! caught at the queue boundary, logged, and recorded as a failure for the
//! task's tier, with the descendants it would have created counted as skipped.
//! The task's join guard is released once the task is finished,
//! whatever the outcome.

use crate::scheduler::metrics::MetricsAggregator;
use crate::scheduler::types::{ProvisionTask, Tier};
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Instant;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore, mpsc};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("{tier} queue is closed, rejected task '{label}'")]
    Closed { tier: Tier, label: String },
}

#[derive(Debug, Default)]
pub struct QueueStats {
    submitted: AtomicU64,
    completed: AtomicU64,
    panicked: AtomicU64,
    active: AtomicUsize,
    peak_active: AtomicUsize,
}

impl QueueStats {
    pub fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::SeqCst)
    }

    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::SeqCst)
    }

    pub fn panicked(&self) -> u64 {
        self.panicked.load(Ordering::SeqCst)
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Highest number of tasks observed running at the same time.
    pub fn peak_active(&self) -> usize {
        self.peak_active.load(Ordering::SeqCst)
    }

    fn enter(&self) {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_active.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
        self.completed.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Debug)]
pub struct BoundedTaskQueue {
    tier: Tier,
    capacity: usize,
    sender: mpsc::UnboundedSender<ProvisionTask>,
    closing: CancellationToken,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    stats: Arc<QueueStats>,
}

impl BoundedTaskQueue {
    /// Create the queue and start its dispatcher. Must be called inside a tokio runtime.
    pub fn new(tier: Tier, capacity: usize, metrics: Arc<MetricsAggregator>) -> Self {
        let capacity = capacity.max(1);
        let (sender, receiver) = mpsc::unbounded_channel();
        let closing = CancellationToken::new();
        let stats = Arc::new(QueueStats::default());

        let dispatcher = tokio::spawn(dispatch(
            tier,
            receiver,
            Arc::new(Semaphore::new(capacity)),
            closing.clone(),
            metrics,
            Arc::clone(&stats),
        ));

        Self {
            tier,
            capacity,
            sender,
            closing,
            dispatcher: Mutex::new(Some(dispatcher)),
            stats,
        }
    }

    pub fn tier(&self) -> Tier {
        self.tier
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> &QueueStats {
        &self.stats
    }

    /// Queue a task for execution.
    ///
    /// A rejected task is dropped immediately, which releases its join guard.
    pub fn submit(&self, task: ProvisionTask) -> Result<(), QueueError> {
        if self.closing.is_cancelled() {
            return Err(QueueError::Closed {
                tier: self.tier,
                label: task.label,
            });
        }

        self.sender.send(task).map_err(|rejected| QueueError::Closed {
            tier: self.tier,
            label: rejected.0.label,
        })?;
        self.stats.submitted.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    /// Stop accepting submissions. Queued and running tasks still complete.
    pub fn close(&self) {
        self.closing.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.closing.is_cancelled()
    }

    /// Wait for the dispatcher to drain. Only returns after [`close`](Self::close).
    pub async fn join(&self) {
        let handle = self.dispatcher.lock().await.take();
        if let Some(handle) = handle
            && let Err(e) = handle.await
        {
            error!("{} queue dispatcher terminated abnormally: {}", self.tier, e);
        }
    }
}

async fn dispatch(
    tier: Tier,
    mut receiver: mpsc::UnboundedReceiver<ProvisionTask>,
    semaphore: Arc<Semaphore>,
    closing: CancellationToken,
    metrics: Arc<MetricsAggregator>,
    stats: Arc<QueueStats>,
) {
    let mut in_flight = JoinSet::new();
    let mut closed = false;

    loop {
        let next = tokio::select! {
            biased;
            task = receiver.recv() => task,
            _ = closing.cancelled(), if !closed => {
                // Buffered tasks are still delivered after close
                receiver.close();
                closed = true;
                continue;
            }
        };

        let Some(task) = next else {
            break;
        };

        let permit = match Arc::clone(&semaphore).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                error!("{} queue semaphore closed, dropping task '{}'", tier, task.label);
                continue;
            }
        };

        in_flight.spawn(run_task(
            task,
            permit,
            Arc::clone(&metrics),
            Arc::clone(&stats),
        ));

        while let Some(finished) = in_flight.try_join_next() {
            log_join_result(tier, finished);
        }
    }

    while let Some(finished) = in_flight.join_next().await {
        log_join_result(tier, finished);
    }
    debug!("{} queue drained", tier);
}

async fn run_task(
    task: ProvisionTask,
    _permit: OwnedSemaphorePermit,
    metrics: Arc<MetricsAggregator>,
    stats: Arc<QueueStats>,
) {
    let ProvisionTask {
        tier,
        label,
        abandons_on_panic,
        work,
        guard,
    } = task;

    stats.enter();
    let started = Instant::now();
    debug!("Starting {} task {}", tier, label);

    if let Err(panic) = AssertUnwindSafe(work).catch_unwind().await {
        error!(
            "{} task '{}' panicked: {}",
            tier,
            label,
            panic_message(panic.as_ref())
        );
        stats.panicked.fetch_add(1, Ordering::SeqCst);
        metrics.record_panic(tier, started.elapsed()).await;
        for (descendant, count) in abandons_on_panic {
            metrics.record_skipped(descendant, count).await;
        }
    }

    stats.exit();
    drop(guard);
}

fn log_join_result(tier: Tier, result: Result<(), tokio::task::JoinError>) {
    if let Err(e) = result {
        error!("{} queue worker failed: {}", tier, e);
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
