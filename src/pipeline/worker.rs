//! Bounded worker pool.
//!
//! A fixed number of tokio tasks pull boxed futures from one bounded
//! `mpsc` queue. A full queue rejects submissions instead of growing.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use futures::FutureExt;
use metrics::gauge;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::ClipwatchError;

/// Queue slots per worker when no explicit capacity is given.
pub const DEFAULT_QUEUE_FACTOR: usize = 100;

/// A unit of work accepted by the pool.
pub type Task = Pin<Box<dyn Future<Output = Result<(), TaskError>> + Send + 'static>>;

/// Callback receiving every task failure.
pub type FailureHandler = Arc<dyn Fn(TaskError) + Send + Sync>;

/// Failure of a single task.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    /// The task returned an error.
    #[error("task failed: {0}")]
    Failed(String),
    /// The task panicked.
    #[error("task panicked: {0}")]
    Panicked(String),
}

impl From<ClipwatchError> for TaskError {
    fn from(e: ClipwatchError) -> Self {
        TaskError::Failed(e.to_string())
    }
}

/// Why a submission was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// The pool is not running.
    NotRunning,
    /// The queue is at capacity.
    QueueFull,
}

/// Result of [`WorkerPool::submit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitResult {
    Accepted,
    Rejected(RejectReason),
}

impl SubmitResult {
    pub fn is_accepted(&self) -> bool {
        matches!(self, SubmitResult::Accepted)
    }
}

/// Counters shared by the pool handle and its executors.
struct PoolStats {
    queued: AtomicUsize,
    busy: Vec<AtomicBool>,
}

impl PoolStats {
    fn new(workers: usize) -> Self {
        Self {
            queued: AtomicUsize::new(0),
            busy: (0..workers).map(|_| AtomicBool::new(false)).collect(),
        }
    }

    fn busy_count(&self) -> usize {
        self.busy.iter().filter(|b| b.load(Ordering::SeqCst)).count()
    }

    fn set_busy(&self, worker_id: usize, busy: bool) {
        self.busy[worker_id].store(busy, Ordering::SeqCst);
        let utilization = self.busy_count() as f64 / self.busy.len().max(1) as f64;
        gauge!("worker_utilization").set(utilization);
    }

    fn enqueued(&self) {
        let depth = self.queued.fetch_add(1, Ordering::SeqCst) + 1;
        gauge!("worker_queue_size").set(depth as f64);
    }

    fn dequeued(&self) {
        let depth = self.queued.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
        gauge!("worker_queue_size").set(depth as f64);
    }
}

/// Fixed-size pool of executors over a bounded task queue.
///
/// # Example
///
/// ```no_run
/// use clipwatch::pipeline::WorkerPool;
///
/// # async fn demo() {
/// let pool = WorkerPool::new(2);
/// pool.start();
/// let result = pool.submit(Box::pin(async { Ok(()) }));
/// assert!(result.is_accepted());
/// pool.stop().await;
/// # }
/// ```
pub struct WorkerPool {
    workers: usize,
    capacity: usize,
    on_failure: FailureHandler,
    stats: Arc<PoolStats>,
    /// `Some` while running. Submissions hold the read lock, `stop` takes
    /// the write lock, so a task is either rejected or queued before close.
    sender: RwLock<Option<mpsc::Sender<Task>>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    /// Serialises concurrent `stop` calls.
    stopping: tokio::sync::Mutex<()>,
}

impl WorkerPool {
    /// Create a stopped pool with `workers` executors (at least one).
    pub fn new(workers: usize) -> Self {
        let workers = workers.max(1);
        Self {
            workers,
            capacity: workers * DEFAULT_QUEUE_FACTOR,
            on_failure: Arc::new(|err: TaskError| error!("Worker task failed: {}", err)),
            stats: Arc::new(PoolStats::new(workers)),
            sender: RwLock::new(None),
            handles: Mutex::new(Vec::new()),
            stopping: tokio::sync::Mutex::new(()),
        }
    }

    /// Set the queue capacity (at least one).
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    /// Set the callback invoked once per failed task.
    pub fn with_failure_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(TaskError) + Send + Sync + 'static,
    {
        self.on_failure = Arc::new(handler);
        self
    }

    /// Number of executors.
    pub fn size(&self) -> usize {
        self.workers
    }

    /// Queue capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Tasks waiting in the queue.
    pub fn queue_depth(&self) -> usize {
        self.stats.queued.load(Ordering::SeqCst)
    }

    /// Executors currently running a task.
    pub fn busy_workers(&self) -> usize {
        self.stats.busy_count()
    }

    pub fn is_running(&self) -> bool {
        self.sender.read().map(|s| s.is_some()).unwrap_or(false)
    }

    /// Start the executors. Does nothing if the pool is already running.
    pub fn start(&self) {
        let Ok(mut sender) = self.sender.write() else {
            error!("Worker pool lock poisoned; not starting");
            return;
        };
        if sender.is_some() {
            return;
        }

        let (tx, rx) = mpsc::channel::<Task>(self.capacity);
        let rx = Arc::new(tokio::sync::Mutex::new(rx));

        let mut spawned = Vec::with_capacity(self.workers);
        for worker_id in 0..self.workers {
            let rx = Arc::clone(&rx);
            let stats = Arc::clone(&self.stats);
            let on_failure = Arc::clone(&self.on_failure);
            spawned.push(tokio::spawn(async move {
                worker_loop(worker_id, rx, stats, on_failure).await;
            }));
        }

        if let Ok(mut handles) = self.handles.lock() {
            handles.extend(spawned);
        }
        *sender = Some(tx);

        info!(
            "Worker pool started ({} workers, queue capacity {})",
            self.workers, self.capacity
        );
    }

    /// Queue a task without waiting.
    pub fn submit(&self, task: Task) -> SubmitResult {
        let Ok(sender) = self.sender.read() else {
            return SubmitResult::Rejected(RejectReason::NotRunning);
        };
        let Some(tx) = sender.as_ref() else {
            return SubmitResult::Rejected(RejectReason::NotRunning);
        };

        // Count before sending so an executor never decrements first.
        self.stats.enqueued();
        match tx.try_send(task) {
            Ok(()) => SubmitResult::Accepted,
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.stats.dequeued();
                SubmitResult::Rejected(RejectReason::QueueFull)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.stats.dequeued();
                SubmitResult::Rejected(RejectReason::NotRunning)
            }
        }
    }

    /// Stop accepting work, run everything already queued, and wait for
    /// the executors to exit. Safe to call more than once.
    pub async fn stop(&self) {
        let _guard = self.stopping.lock().await;

        let closed = match self.sender.write() {
            Ok(mut sender) => sender.take(),
            Err(_) => None,
        };
        let handles = match self.handles.lock() {
            Ok(mut handles) => std::mem::take(&mut *handles),
            Err(_) => Vec::new(),
        };
        if closed.is_none() && handles.is_empty() {
            return;
        }
        drop(closed);

        debug!("Draining worker pool ({} queued)", self.queue_depth());
        for handle in handles {
            if let Err(e) = handle.await {
                error!("Worker exited abnormally: {}", e);
            }
        }
        info!("Worker pool stopped");
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("workers", &self.workers)
            .field("capacity", &self.capacity)
            .field("queue_depth", &self.queue_depth())
            .field("running", &self.is_running())
            .finish()
    }
}

async fn worker_loop(
    worker_id: usize,
    rx: Arc<tokio::sync::Mutex<mpsc::Receiver<Task>>>,
    stats: Arc<PoolStats>,
    on_failure: FailureHandler,
) {
    loop {
        // The lock is released before the task runs.
        let task = {
            let mut rx = rx.lock().await;
            rx.recv().await
        };
        let Some(task) = task else {
            break;
        };
        stats.dequeued();

        stats.set_busy(worker_id, true);
        let result = AssertUnwindSafe(task).catch_unwind().await;
        stats.set_busy(worker_id, false);

        let failure = match result {
            Ok(Ok(())) => None,
            Ok(Err(err)) => Some(err),
            Err(panic) => Some(TaskError::Panicked(panic_message(panic.as_ref()))),
        };
        if let Some(err) = failure {
            report_failure(worker_id, &on_failure, err);
        }
    }
    debug!("Worker {} exiting", worker_id);
}

/// Hand a failure to the handler. A panicking handler is logged and the
/// executor keeps running.
fn report_failure(worker_id: usize, on_failure: &FailureHandler, err: TaskError) {
    if let Err(panic) = std::panic::catch_unwind(AssertUnwindSafe(|| on_failure(err))) {
        error!(
            worker_id,
            "Failure handler panicked: {}",
            panic_message(panic.as_ref())
        );
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
