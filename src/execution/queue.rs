//! Serial execution queue
//!
//! One worker thread drains a FIFO of jobs. Jobs never overlap and run in
//! submission order. A panicking job is contained: the worker logs it and
//! moves on to the next job.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};

use parking_lot::Mutex;

use super::errors::{ExecutionError, ExecutionResult};
use crate::observability::{log_event_with_fields, Event, Logger};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// A FIFO worker thread
pub struct SerialQueue {
    label: String,
    sender: Mutex<Option<Sender<Job>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    worker_id: ThreadId,
    queued: Arc<AtomicUsize>,
}

impl SerialQueue {
    /// Starts the worker thread
    pub fn new(label: impl Into<String>) -> ExecutionResult<Self> {
        let label = label.into();
        let (sender, receiver) = mpsc::channel::<Job>();
        let queued = Arc::new(AtomicUsize::new(0));

        let worker_label = label.clone();
        let worker_queued = Arc::clone(&queued);
        let handle = thread::Builder::new()
            .name(label.clone())
            .spawn(move || {
                for job in receiver {
                    if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                        Logger::error("QUEUE_JOB_PANICKED", &[("queue", &worker_label)]);
                    }
                    worker_queued.fetch_sub(1, Ordering::AcqRel);
                }
            })
            .map_err(|source| ExecutionError::SpawnFailed {
                label: label.clone(),
                source,
            })?;

        let worker_id = handle.thread().id();
        log_event_with_fields(Event::BackgroundQueueStarted, &[("queue", &label)]);

        Ok(Self {
            label,
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(handle)),
            worker_id,
            queued,
        })
    }

    /// Queue label, also the worker thread name
    pub fn label(&self) -> &str {
        &self.label
    }

    /// True when called from the worker thread
    pub fn is_current(&self) -> bool {
        thread::current().id() == self.worker_id
    }

    /// Jobs submitted but not yet finished
    pub fn queued(&self) -> usize {
        self.queued.load(Ordering::Acquire)
    }

    /// Enqueues `job` and returns immediately
    pub fn dispatch<F>(&self, job: F) -> ExecutionResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let sender = self.sender.lock();
        let sender = sender
            .as_ref()
            .ok_or_else(|| ExecutionError::QueueClosed(self.label.clone()))?;

        self.queued.fetch_add(1, Ordering::AcqRel);
        if sender.send(Box::new(job)).is_err() {
            self.queued.fetch_sub(1, Ordering::AcqRel);
            return Err(ExecutionError::QueueClosed(self.label.clone()));
        }
        Ok(())
    }

    /// Runs `job` on the queue and waits for its result. From the worker
    /// itself the job runs inline, which keeps nested calls from deadlocking.
    pub fn dispatch_sync<T, F>(&self, job: F) -> ExecutionResult<T>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        if self.is_current() {
            return Ok(job());
        }

        let (tx, rx) = mpsc::channel();
        self.dispatch(move || {
            let _ = tx.send(job());
        })?;

        rx.recv()
            .map_err(|_| ExecutionError::JobPanicked(self.label.clone()))
    }

    /// Stops accepting work, drains what is queued and joins the worker.
    pub fn shutdown(&self) {
        self.sender.lock().take();
        if self.is_current() {
            return;
        }
        if let Some(handle) = self.worker.lock().take() {
            let _ = handle.join();
        }
    }
}

impl Drop for SerialQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for SerialQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialQueue")
            .field("label", &self.label)
            .field("queued", &self.queued())
            .finish()
    }
}
