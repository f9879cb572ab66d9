//! Single-worker FIFO queue serializing content-store mutations.
//!
//! # Responsibility
//! - Own the content-store resource on one dedicated worker thread.
//! - Run submitted jobs one at a time, in submission order.
//!
//! # Invariants
//! - The resource is only ever touched by the worker thread.
//! - A submitted job always runs; there is no cancellation or priority.
//! - `enqueue_and_wait` returns only after the job has finished.
//! - A panicking job is contained; the worker keeps serving later jobs.
//!
//! A hung job blocks every later job. No timeout is applied.

use log::{debug, error};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use std::time::Instant;
use thiserror::Error;

type Job<S> = Box<dyn FnOnce(&S) + Send>;

const WORKER_THREAD_NAME: &str = "iconrepo-content-writer";

/// Queue failure, distinct from the job's own result.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("failed to spawn mutation queue worker: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("mutation queue worker is not running")]
    WorkerUnavailable,
    #[error("mutation queue job {sequence} ended without a result")]
    JobAbandoned { sequence: u64 },
}

/// Unbounded FIFO work queue with one background worker owning `S`.
pub struct MutationQueue<S: Send + 'static> {
    sender: Option<mpsc::Sender<Job<S>>>,
    worker: Option<JoinHandle<()>>,
    sequence: AtomicU64,
}

impl<S: Send + 'static> MutationQueue<S> {
    /// Moves `resource` onto a new worker thread and starts serving jobs.
    pub fn start(resource: S) -> Result<Self, QueueError> {
        let (sender, receiver) = mpsc::channel::<Job<S>>();
        let worker = thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || worker_loop(resource, receiver))
            .map_err(QueueError::Spawn)?;

        Ok(Self {
            sender: Some(sender),
            worker: Some(worker),
            sequence: AtomicU64::new(1),
        })
    }

    /// Submits `job` and blocks until the worker has run it.
    ///
    /// Returns whatever the job returns; the job records its own success or
    /// failure in `T`.
    pub fn enqueue_and_wait<T, F>(&self, job: F) -> Result<T, QueueError>
    where
        T: Send + 'static,
        F: FnOnce(&S) -> T + Send + 'static,
    {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let (result_tx, result_rx) = mpsc::sync_channel(1);
        let enqueued_at = Instant::now();
        let wrapped: Job<S> = Box::new(move |resource: &S| {
            debug!(
                "event=queue_job module=queue status=start sequence={} wait_ms={}",
                sequence,
                enqueued_at.elapsed().as_millis()
            );
            let _ = result_tx.send(job(resource));
        });

        self.sender
            .as_ref()
            .ok_or(QueueError::WorkerUnavailable)?
            .send(wrapped)
            .map_err(|_| QueueError::WorkerUnavailable)?;

        result_rx
            .recv()
            .map_err(|_| QueueError::JobAbandoned { sequence })
    }
}

impl<S: Send + 'static> Drop for MutationQueue<S> {
    fn drop(&mut self) {
        // Closing the channel lets the worker drain and exit.
        drop(self.sender.take());
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("event=queue_shutdown module=queue status=error reason=worker_panicked");
            }
        }
    }
}

fn worker_loop<S>(resource: S, receiver: mpsc::Receiver<Job<S>>) {
    while let Ok(job) = receiver.recv() {
        if panic::catch_unwind(AssertUnwindSafe(|| job(&resource))).is_err() {
            error!("event=queue_job module=queue status=error reason=job_panicked");
        }
    }
    debug!("event=queue_shutdown module=queue status=ok");
}

#[cfg(test)]
mod tests {
    use super::{MutationQueue, QueueError};
    use std::cell::RefCell;

    #[test]
    fn returns_job_result_to_caller() {
        let queue = MutationQueue::start(41_u32).unwrap();
        let answer = queue.enqueue_and_wait(|base: &u32| base + 1).unwrap();
        assert_eq!(answer, 42);
    }

    #[test]
    fn panicking_job_is_reported_and_worker_survives() {
        let queue = MutationQueue::start(RefCell::new(0_u32)).unwrap();
        let err = queue
            .enqueue_and_wait(|_: &RefCell<u32>| -> u32 { panic!("job failure") })
            .unwrap_err();
        assert!(matches!(err, QueueError::JobAbandoned { .. }));

        let value = queue
            .enqueue_and_wait(|counter: &RefCell<u32>| {
                *counter.borrow_mut() += 1;
                *counter.borrow()
            })
            .unwrap();
        assert_eq!(value, 1);
    }
}
