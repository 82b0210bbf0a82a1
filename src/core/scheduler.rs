//! Affinity-sized worker pool
//!
//! Runs named tasks on a fixed set of OS threads, one per reported core:
//! - a single bounded queue feeds every worker (best-effort FIFO)
//! - each task body runs start-to-finish on one worker
//! - errors and panics are contained in the task's own handle
//! - shutdown drains queued work before joining the workers

use crate::config::QueuePolicy;
use crate::error::{Result, TierScaleError};
use crate::system::{HardwareFacts, OptimizationLevel};
use crossbeam::channel::{bounded, Receiver, Sender, TryRecvError, TrySendError};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Most worker threads a pool will spawn
pub const MAX_WORKERS: usize = 16_384;

/// Largest task queue a pool will allocate
pub const MAX_QUEUE_CAPACITY: usize = 1 << 20;

/// Worker pool configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Number of worker threads
    pub workers: usize,
    /// Maximum number of queued (not yet running) tasks
    pub queue_capacity: usize,
    /// Full-queue behavior
    pub queue_policy: QueuePolicy,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        let workers = num_cpus::get().max(1);
        Self {
            workers,
            queue_capacity: workers * OptimizationLevel::Standard.queue_depth_per_worker(),
            queue_policy: QueuePolicy::Reject,
        }
    }
}

impl SchedulerConfig {
    /// Size the pool from the hardware snapshot: one worker per core and
    /// a queue depth chosen by the optimization level.
    ///
    /// The capacity saturates; `AffinityScheduler::new` rejects sizes past
    /// `MAX_WORKERS` / `MAX_QUEUE_CAPACITY`.
    pub fn for_hardware(facts: &HardwareFacts, level: OptimizationLevel) -> Self {
        let workers = facts.worker_count();
        Self {
            workers,
            queue_capacity: workers.saturating_mul(level.queue_depth_per_worker()),
            queue_policy: QueuePolicy::Reject,
        }
    }

    /// Override the worker count
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Override the queue capacity
    #[must_use]
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Override the full-queue policy
    #[must_use]
    pub fn with_policy(mut self, policy: QueuePolicy) -> Self {
        self.queue_policy = policy;
        self
    }

    fn normalized(mut self) -> Self {
        self.workers = self.workers.max(1);
        self.queue_capacity = self.queue_capacity.max(1);
        self
    }

    fn check_limits(&self) -> Result<()> {
        if self.workers > MAX_WORKERS {
            return Err(TierScaleError::ThreadPoolError(format!(
                "{} workers requested, at most {} supported",
                self.workers, MAX_WORKERS
            )));
        }
        if self.queue_capacity > MAX_QUEUE_CAPACITY {
            return Err(TierScaleError::ThreadPoolError(format!(
                "queue capacity {} exceeds the maximum of {}",
                self.queue_capacity, MAX_QUEUE_CAPACITY
            )));
        }
        Ok(())
    }
}

/// Flag shared between a task handle and the running task body
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    /// Create a token that is not cancelled
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Has cancellation been requested?
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Result of a task together with how long its body ran
#[derive(Debug)]
pub struct TaskCompletion<T> {
    /// Task output or the error describing its failure
    pub result: Result<T>,
    /// Measured execution time (zero if the body never ran)
    pub duration: Duration,
}

/// Handle to a submitted task's eventual result
pub struct TaskHandle<T> {
    id: u64,
    name: String,
    token: CancellationToken,
    receiver: Receiver<TaskCompletion<T>>,
}

impl<T> TaskHandle<T> {
    /// Scheduler-assigned task ID
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Name given at submission
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Block until the task finishes and return its result
    pub fn wait(self) -> Result<T> {
        self.wait_completion().result
    }

    /// Block until the task finishes; also returns the measured duration
    pub fn wait_completion(self) -> TaskCompletion<T> {
        if self.token.is_cancelled() {
            return self.cancelled();
        }
        match self.receiver.recv() {
            Ok(completion) => completion,
            Err(_) => self.lost(),
        }
    }

    /// Poll for the result without blocking.
    ///
    /// Returns `None` while the task is queued or running. The result is
    /// handed out once; polling again afterwards reports a lost task.
    pub fn try_wait(&self) -> Option<Result<T>> {
        if self.token.is_cancelled() {
            return Some(Err(TierScaleError::Cancelled {
                name: self.name.clone(),
            }));
        }
        match self.receiver.try_recv() {
            Ok(completion) => Some(completion.result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(self.lost().result),
        }
    }

    /// Has the task produced a result that is waiting to be collected?
    pub fn is_finished(&self) -> bool {
        !self.receiver.is_empty()
    }

    /// Request cancellation.
    ///
    /// A queued task is skipped when a worker picks it up; a running task
    /// observes the flip through its `CancellationToken`. Waiting on a
    /// cancelled handle returns `Cancelled` right away.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Was cancellation requested through this handle?
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    fn cancelled(&self) -> TaskCompletion<T> {
        TaskCompletion {
            result: Err(TierScaleError::Cancelled {
                name: self.name.clone(),
            }),
            duration: Duration::ZERO,
        }
    }

    fn lost(&self) -> TaskCompletion<T> {
        TaskCompletion {
            result: Err(TierScaleError::ThreadPoolError(format!(
                "result of task '{}' was lost",
                self.name
            ))),
            duration: Duration::ZERO,
        }
    }
}

impl<T> std::fmt::Debug for TaskHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("cancelled", &self.token.is_cancelled())
            .finish()
    }
}

/// Scheduler statistics
#[derive(Debug, Default)]
pub struct SchedulerStats {
    /// Tasks accepted into the queue
    pub tasks_submitted: AtomicU64,
    /// Tasks that returned `Ok`
    pub tasks_completed: AtomicU64,
    /// Tasks that returned an error or panicked
    pub tasks_failed: AtomicU64,
    /// Tasks skipped because they were cancelled before starting
    pub tasks_cancelled: AtomicU64,
    /// Submissions refused because the queue was full
    pub tasks_rejected: AtomicU64,
    /// Tasks currently executing
    pub tasks_in_progress: AtomicUsize,
    /// Highest observed number of simultaneously executing tasks
    pub peak_in_progress: AtomicUsize,
    /// Total time spent inside task bodies
    pub busy_nanos: AtomicU64,
}

/// Plain copy of `SchedulerStats` for reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Tasks accepted into the queue
    pub submitted: u64,
    /// Tasks that returned `Ok`
    pub completed: u64,
    /// Tasks that returned an error or panicked
    pub failed: u64,
    /// Tasks skipped after cancellation
    pub cancelled: u64,
    /// Submissions refused
    pub rejected: u64,
    /// Tasks currently executing
    pub in_progress: usize,
    /// Peak simultaneous executions
    pub peak_in_progress: usize,
    /// Total time spent inside task bodies, in nanoseconds
    pub busy_nanos: u64,
}

impl SchedulerStats {
    fn task_started(&self) {
        let running = self.tasks_in_progress.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_progress.fetch_max(running, Ordering::SeqCst);
    }

    fn task_finished(&self, report: &JobReport) {
        let counter = match report.outcome {
            JobOutcome::Succeeded => &self.tasks_completed,
            JobOutcome::Failed(_) | JobOutcome::Panicked(_) => &self.tasks_failed,
            JobOutcome::Cancelled => &self.tasks_cancelled,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        let nanos = u64::try_from(report.duration.as_nanos()).unwrap_or(u64::MAX);
        self.busy_nanos.fetch_add(nanos, Ordering::Relaxed);
        self.tasks_in_progress.fetch_sub(1, Ordering::SeqCst);
    }

    /// Take a consistent-enough copy of the counters
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            submitted: self.tasks_submitted.load(Ordering::Relaxed),
            completed: self.tasks_completed.load(Ordering::Relaxed),
            failed: self.tasks_failed.load(Ordering::Relaxed),
            cancelled: self.tasks_cancelled.load(Ordering::Relaxed),
            rejected: self.tasks_rejected.load(Ordering::Relaxed),
            in_progress: self.tasks_in_progress.load(Ordering::SeqCst),
            peak_in_progress: self.peak_in_progress.load(Ordering::SeqCst),
            busy_nanos: self.busy_nanos.load(Ordering::Relaxed),
        }
    }

    /// Percentage of finished tasks that succeeded
    pub fn success_rate(&self) -> f64 {
        let completed = self.tasks_completed.load(Ordering::Relaxed);
        let failed = self.tasks_failed.load(Ordering::Relaxed);
        let finished = completed + failed;

        if finished == 0 {
            100.0
        } else {
            (completed as f64 / finished as f64) * 100.0
        }
    }
}

enum JobOutcome {
    Succeeded,
    Failed(String),
    Panicked(String),
    Cancelled,
}

struct JobReport {
    outcome: JobOutcome,
    duration: Duration,
}

struct Job {
    id: u64,
    name: String,
    run: Box<dyn FnOnce() -> JobReport + Send + 'static>,
}

/// Fixed-size pool of worker threads sized to the core count
pub struct AffinityScheduler {
    config: SchedulerConfig,
    sender: RwLock<Option<Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    stats: Arc<SchedulerStats>,
    next_task_id: AtomicU64,
}

impl AffinityScheduler {
    /// Spawn the worker threads
    pub fn new(config: SchedulerConfig) -> Result<Self> {
        let config = config.normalized();
        config.check_limits()?;
        let (sender, receiver) = bounded::<Job>(config.queue_capacity);
        let stats = Arc::new(SchedulerStats::default());

        let mut workers = Vec::with_capacity(config.workers);
        for worker_id in 0..config.workers {
            let jobs = receiver.clone();
            let worker_stats = Arc::clone(&stats);
            let handle = thread::Builder::new()
                .name(format!("tierscale-worker-{}", worker_id))
                .spawn(move || worker_loop(worker_id, jobs, worker_stats))
                .map_err(|e| {
                    TierScaleError::ThreadPoolError(format!("failed to spawn worker {}: {}", worker_id, e))
                })?;
            workers.push(handle);
        }

        tracing::info!(
            workers = config.workers,
            queue_capacity = config.queue_capacity,
            policy = ?config.queue_policy,
            "Scheduler started"
        );

        Ok(Self {
            config,
            sender: RwLock::new(Some(sender)),
            workers: Mutex::new(workers),
            stats,
            next_task_id: AtomicU64::new(0),
        })
    }

    /// Submit a named task
    pub fn submit<T, F>(&self, name: impl Into<String>, task: F) -> Result<TaskHandle<T>>
    where
        T: Send + 'static,
        F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    {
        self.submit_cancellable(name, move |_token: &CancellationToken| task())
    }

    /// Submit a named task that can observe cancellation of its handle
    pub fn submit_cancellable<T, F>(&self, name: impl Into<String>, task: F) -> Result<TaskHandle<T>>
    where
        T: Send + 'static,
        F: FnOnce(&CancellationToken) -> anyhow::Result<T> + Send + 'static,
    {
        let name = name.into();
        // Cloned so a blocked `send` does not hold the lock `shutdown` needs.
        let sender = self
            .sender
            .read()
            .clone()
            .ok_or(TierScaleError::SchedulerClosed)?;

        let id = self.next_task_id.fetch_add(1, Ordering::Relaxed);
        let (job, handle) = package(id, name, task);

        match self.config.queue_policy {
            QueuePolicy::Reject => sender.try_send(job).map_err(|e| match e {
                TrySendError::Full(job) => {
                    self.stats.tasks_rejected.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(task = %job.name, capacity = self.config.queue_capacity, "Task queue full");
                    TierScaleError::QueueFull {
                        name: job.name,
                        capacity: self.config.queue_capacity,
                    }
                }
                TrySendError::Disconnected(_) => TierScaleError::SchedulerClosed,
            })?,
            QueuePolicy::Block => sender
                .send(job)
                .map_err(|_| TierScaleError::SchedulerClosed)?,
        }

        self.stats.tasks_submitted.fetch_add(1, Ordering::Relaxed);
        Ok(handle)
    }

    /// Stop accepting work, drain the queue and join every worker.
    ///
    /// Safe to call more than once. Called from inside a task, the calling
    /// worker is not joined.
    pub fn shutdown(&self) {
        let sender = self.sender.write().take();
        let was_open = sender.is_some();
        drop(sender);

        let mut workers = self.workers.lock();
        let current = thread::current().id();
        let count = workers.len();
        for handle in workers.drain(..) {
            if handle.thread().id() == current {
                continue;
            }
            if handle.join().is_err() {
                tracing::error!("Worker thread panicked during shutdown");
            }
        }

        if was_open {
            let stats = self.stats.snapshot();
            tracing::info!(
                workers = count,
                completed = stats.completed,
                failed = stats.failed,
                cancelled = stats.cancelled,
                "Scheduler shut down"
            );
        }
    }

    /// Has `shutdown` been called?
    pub fn is_closed(&self) -> bool {
        self.sender.read().is_none()
    }

    /// Number of worker threads
    pub fn workers(&self) -> usize {
        self.config.workers
    }

    /// Effective configuration
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Tasks waiting in the queue
    pub fn pending_count(&self) -> usize {
        self.sender.read().as_ref().map_or(0, Sender::len)
    }

    /// Shared statistics
    pub fn stats(&self) -> Arc<SchedulerStats> {
        Arc::clone(&self.stats)
    }
}

impl Drop for AffinityScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for AffinityScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AffinityScheduler")
            .field("config", &self.config)
            .field("closed", &self.is_closed())
            .finish()
    }
}

fn package<T, F>(id: u64, name: String, task: F) -> (Job, TaskHandle<T>)
where
    T: Send + 'static,
    F: FnOnce(&CancellationToken) -> anyhow::Result<T> + Send + 'static,
{
    let token = CancellationToken::new();
    let (result_tx, result_rx) = bounded(1);

    let job_token = token.clone();
    let job_name = name.clone();
    let run = move || {
        if job_token.is_cancelled() {
            let _ = result_tx.send(TaskCompletion {
                result: Err(TierScaleError::Cancelled { name: job_name }),
                duration: Duration::ZERO,
            });
            return JobReport {
                outcome: JobOutcome::Cancelled,
                duration: Duration::ZERO,
            };
        }

        let start = Instant::now();
        let outcome = catch_unwind(AssertUnwindSafe(|| task(&job_token)));
        let duration = start.elapsed();

        let (result, outcome) = match outcome {
            Ok(Ok(value)) => (Ok(value), JobOutcome::Succeeded),
            Ok(Err(err)) => {
                let err = TierScaleError::task_failed(job_name, &err);
                let message = err.to_string();
                (Err(err), JobOutcome::Failed(message))
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                let err = TierScaleError::TaskPanicked {
                    name: job_name,
                    message: message.clone(),
                };
                (Err(err), JobOutcome::Panicked(message))
            }
        };

        // The handle may have been dropped; nobody is waiting then.
        let _ = result_tx.send(TaskCompletion { result, duration });
        JobReport { outcome, duration }
    };

    let handle = TaskHandle {
        id,
        name: name.clone(),
        token,
        receiver: result_rx,
    };
    let job = Job {
        id,
        name,
        run: Box::new(run),
    };
    (job, handle)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

fn worker_loop(worker_id: usize, jobs: Receiver<Job>, stats: Arc<SchedulerStats>) {
    // Ends once the sender is dropped and the queue is empty.
    for job in jobs.iter() {
        stats.task_started();
        let report = (job.run)();
        stats.task_finished(&report);

        let duration_ns = u64::try_from(report.duration.as_nanos()).unwrap_or(u64::MAX);
        match &report.outcome {
            JobOutcome::Succeeded => {
                tracing::debug!(task = %job.name, id = job.id, worker_id, duration_ns, "Task completed");
            }
            JobOutcome::Failed(message) | JobOutcome::Panicked(message) => {
                tracing::warn!(task = %job.name, id = job.id, worker_id, duration_ns, error = %message, "Task failed");
            }
            JobOutcome::Cancelled => {
                tracing::debug!(task = %job.name, id = job.id, "Task cancelled before start");
            }
        }
    }

    tracing::debug!("Worker {} shutting down", worker_id);
}
