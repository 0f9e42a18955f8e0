//! Fixed worker pool that runs request handlers.
//!
//! Handlers never run inline on a connection task; they are queued here and
//! picked up by a fixed number of workers. Two queues feed the pool:
//! continuations of in-flight work and fresh requests. Workers always drain
//! continuations first so accepted work finishes before new work starts.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Called with the panic payload when a job panics. The worker survives.
pub type PanicHandler = Arc<dyn Fn(&(dyn Any + Send)) + Send + Sync>;

/// Jobs waiting per queue before enqueueing applies backpressure.
const QUEUE_CAPACITY: usize = 1024;

/// The scheduler has been shut down and accepts no further work.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("scheduler is shut down")]
pub struct ScheduleError;

struct Queues {
    continuations: mpsc::Receiver<Job>,
    requests: mpsc::Receiver<Job>,
}

#[derive(Debug)]
struct Intake {
    continuations: mpsc::Sender<Job>,
    requests: mpsc::Sender<Job>,
}

struct Shared {
    /// Workers park on this lock while waiting for work; only the holder
    /// polls the queues.
    queues: tokio::sync::Mutex<Queues>,
    cancel: CancellationToken,
    panic_handler: PanicHandler,
}

/// A fixed pool of workers fed by two prioritized queues.
#[derive(Debug)]
pub struct Scheduler {
    intake: std::sync::Mutex<Option<Intake>>,
    workers: std::sync::Mutex<Vec<JoinHandle<()>>>,
    cancel: CancellationToken,
}

impl Scheduler {
    /// Starts `workers` worker tasks; `0` sizes the pool from the host's
    /// parallelism. Must be called within a tokio runtime.
    pub fn new(workers: usize) -> Self {
        Self::with_panic_handler(workers, Arc::new(default_panic_handler))
    }

    pub fn with_panic_handler(workers: usize, panic_handler: PanicHandler) -> Self {
        let workers = if workers == 0 { default_workers() } else { workers };
        let (continuations_tx, continuations_rx) = mpsc::channel(QUEUE_CAPACITY);
        let (requests_tx, requests_rx) = mpsc::channel(QUEUE_CAPACITY);
        let cancel = CancellationToken::new();
        let shared = Arc::new(Shared {
            queues: tokio::sync::Mutex::new(Queues {
                continuations: continuations_rx,
                requests: requests_rx,
            }),
            cancel: cancel.clone(),
            panic_handler,
        });
        let handles = (0..workers)
            .map(|id| tokio::spawn(worker(Arc::clone(&shared), id)))
            .collect();
        Self {
            intake: std::sync::Mutex::new(Some(Intake {
                continuations: continuations_tx,
                requests: requests_tx,
            })),
            workers: std::sync::Mutex::new(handles),
            cancel,
        }
    }

    /// Queues a fresh request job.
    pub async fn spawn<F>(&self, job: F) -> Result<(), ScheduleError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let tx = self.sender(|intake| intake.requests.clone())?;
        tx.send(Box::pin(job)).await.map_err(|_| ScheduleError)
    }

    /// Queues a continuation of work already in flight. Continuations are
    /// drained before fresh requests.
    pub async fn spawn_continuation<F>(&self, job: F) -> Result<(), ScheduleError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let tx = self.sender(|intake| intake.continuations.clone())?;
        tx.send(Box::pin(job)).await.map_err(|_| ScheduleError)
    }

    fn sender(&self, pick: impl FnOnce(&Intake) -> mpsc::Sender<Job>) -> Result<mpsc::Sender<Job>, ScheduleError> {
        let guard = self.intake.lock().map_err(|_| ScheduleError)?;
        guard.as_ref().map(pick).ok_or(ScheduleError)
    }

    /// Stops intake, then waits up to `grace` for queued and running jobs
    /// before aborting the workers.
    pub async fn shutdown(&self, grace: Duration) {
        let intake = match self.intake.lock() {
            Ok(mut guard) => guard.take(),
            Err(_) => None,
        };
        // Closing the queues lets idle workers exit once drained.
        drop(intake);

        let handles = match self.workers.lock() {
            Ok(mut guard) => std::mem::take(&mut *guard),
            Err(_) => Vec::new(),
        };
        let deadline = Instant::now() + grace;
        for mut handle in handles {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if timeout(remaining, &mut handle).await.is_err() {
                warn!("scheduler worker did not stop in time, aborting it");
                self.cancel.cancel();
                handle.abort();
            }
        }
        debug!("scheduler stopped");
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism().map_or(4, |n| n.get()) * 2 + 1
}

fn default_panic_handler(panic: &(dyn Any + Send)) {
    let message = panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic");
    error!(message, "job panicked");
}

async fn worker(shared: Arc<Shared>, id: usize) {
    debug!(worker = id, "scheduler worker started");
    let mut continuations_open = true;
    let mut requests_open = true;
    while continuations_open || requests_open {
        let job = {
            let mut queues = shared.queues.lock().await;
            let Queues { continuations, requests } = &mut *queues;
            tokio::select! {
                biased;
                _ = shared.cancel.cancelled() => break,
                job = continuations.recv(), if continuations_open => {
                    if job.is_none() {
                        continuations_open = false;
                    }
                    job
                }
                job = requests.recv(), if requests_open => {
                    if job.is_none() {
                        requests_open = false;
                    }
                    job
                }
            }
        };
        let Some(job) = job else { continue };
        if let Err(panic) = AssertUnwindSafe(job).catch_unwind().await {
            (shared.panic_handler)(panic.as_ref());
        }
    }
    debug!(worker = id, "scheduler worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::{oneshot, Notify};

    #[tokio::test]
    async fn runs_queued_jobs() {
        let scheduler = Scheduler::new(2);
        let (tx, rx) = oneshot::channel();
        scheduler.spawn(async move {
            let _ = tx.send(42);
        })
        .await
        .unwrap();
        assert_eq!(rx.await.unwrap(), 42);
        scheduler.shutdown(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn continuations_run_before_requests() {
        let scheduler = Scheduler::new(1);
        let gate = Arc::new(Notify::new());
        let (started_tx, started_rx) = oneshot::channel();

        // Occupy the single worker so both queues fill while it is busy.
        let blocker_gate = Arc::clone(&gate);
        scheduler.spawn(async move {
            let _ = started_tx.send(());
            blocker_gate.notified().await;
        })
        .await
        .unwrap();
        started_rx.await.unwrap();

        let (order_tx, mut order_rx) = tokio::sync::mpsc::channel(2);
        let request_tx = order_tx.clone();
        scheduler.spawn(async move {
            let _ = request_tx.send("request").await;
        })
        .await
        .unwrap();
        scheduler.spawn_continuation(async move {
            let _ = order_tx.send("continuation").await;
        })
        .await
        .unwrap();

        gate.notify_one();
        assert_eq!(order_rx.recv().await, Some("continuation"));
        assert_eq!(order_rx.recv().await, Some("request"));
        scheduler.shutdown(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn panicking_job_does_not_take_down_the_worker() {
        let seen = Arc::new(std::sync::Mutex::new(None));
        let sink = Arc::clone(&seen);
        let handler: PanicHandler = Arc::new(move |panic| {
            let message = panic.downcast_ref::<&str>().copied().unwrap_or("?");
            if let Ok(mut slot) = sink.lock() {
                *slot = Some(message.to_owned());
            }
        });
        let scheduler = Scheduler::with_panic_handler(1, handler);

        scheduler.spawn(async {
            panic!("http violation: response already started");
        })
        .await
        .unwrap();

        let (tx, rx) = oneshot::channel();
        scheduler.spawn(async move {
            let _ = tx.send(());
        })
        .await
        .unwrap();
        rx.await.unwrap();

        let message = seen.lock().unwrap().clone();
        assert_eq!(message.as_deref(), Some("http violation: response already started"));
        scheduler.shutdown(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn shutdown_aborts_stuck_jobs_and_rejects_new_work() {
        let scheduler = Scheduler::new(1);
        scheduler.spawn(async {
            tokio::time::sleep(Duration::from_secs(600)).await;
        })
        .await
        .unwrap();
        // Give the worker a moment to pick the job up.
        tokio::time::sleep(Duration::from_millis(20)).await;

        let begun = Instant::now();
        scheduler.shutdown(Duration::from_millis(50)).await;
        assert!(begun.elapsed() < Duration::from_secs(5));

        let rejected = scheduler.spawn(async {}).await;
        assert_eq!(rejected, Err(ScheduleError));
    }
}
