//! Fixed-size pool of job threads fed from a bounded queue.

use anyhow::{Context, Result};
use parking_lot::Mutex;
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, error};

pub type Task = Box<dyn FnOnce() + Send + 'static>;

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("worker queue is full")]
    Full,
    #[error("worker pool is shut down")]
    Closed,
}

pub struct WorkerPool {
    sender: Option<SyncSender<Task>>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// `workers` threads share one queue holding at most `queue_capacity`
    /// waiting tasks.
    pub fn new(workers: usize, queue_capacity: usize) -> Result<Self> {
        let (sender, receiver) = mpsc::sync_channel::<Task>(queue_capacity);
        let receiver = Arc::new(Mutex::new(receiver));

        let mut handles = Vec::with_capacity(workers.max(1));
        for n in 0..workers.max(1) {
            let rx = Arc::clone(&receiver);
            let handle = std::thread::Builder::new()
                .name(format!("storyboard-worker-{n}"))
                .spawn(move || worker_loop(n, rx))
                .with_context(|| format!("spawning worker {n}"))?;
            handles.push(handle);
        }

        Ok(Self {
            sender: Some(sender),
            workers: handles,
        })
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Queues `task` without blocking the caller.
    pub fn try_submit(&self, task: Task) -> Result<(), SubmitError> {
        let sender = self.sender.as_ref().ok_or(SubmitError::Closed)?;
        sender.try_send(task).map_err(|err| match err {
            TrySendError::Full(_) => SubmitError::Full,
            TrySendError::Disconnected(_) => SubmitError::Closed,
        })
    }
}

fn worker_loop(n: usize, rx: Arc<Mutex<Receiver<Task>>>) {
    loop {
        // Hold the receiver lock only while dequeuing, never while running a task.
        let task = rx.lock().recv();
        match task {
            Ok(task) => {
                if std::panic::catch_unwind(std::panic::AssertUnwindSafe(task)).is_err() {
                    error!("worker {n}: task panicked");
                }
            }
            Err(_) => {
                debug!("worker {n}: queue closed, exiting");
                return;
            }
        }
    }
}

impl Drop for WorkerPool {
    /// Drains the queue: already-accepted tasks still run before the threads exit.
    fn drop(&mut self) {
        self.sender.take();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}
