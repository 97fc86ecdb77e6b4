//! Serialized execution lines
//!
//! The stack runs on a small fixed set of serial lines (coordinator, writer,
//! child setup). [`SerialExecutor`] is the seam: "run this job serialized on
//! line X". [`SerialQueue`] backs a line with one named worker thread;
//! [`InlineExecutor`] runs jobs on the caller.

use crate::errors::{unknown_error, Result};
use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc;
use std::thread::{self, JoinHandle, ThreadId};

pub type Job = Box<dyn FnOnce() + Send + 'static>;

pub trait SerialExecutor: Send + Sync {
    fn name(&self) -> &str;

    /// Enqueue `job`; jobs run one at a time in submission order
    fn execute(&self, job: Job) -> Result<()>;

    /// Whether the calling thread is this line's worker
    fn is_current(&self) -> bool;
}

/// Run `f` on `executor` and block until it returns
///
/// Runs inline when already on the executor's line, so nested calls cannot
/// deadlock. A panicking job or a closed line yields `UnknownError`.
pub fn run_sync<E, F, R>(executor: &E, f: F) -> Result<R>
where
    E: SerialExecutor + ?Sized,
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    if executor.is_current() {
        return Ok(f());
    }

    let (tx, rx) = mpsc::sync_channel(1);
    executor.execute(Box::new(move || {
        let outcome = catch_unwind(AssertUnwindSafe(f));
        let _ = tx.send(outcome);
    }))?;

    match rx.recv() {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(_)) => Err(unknown_error(
            "run_sync",
            format!("job panicked on {}", executor.name()),
        )),
        Err(_) => Err(unknown_error(
            "run_sync",
            format!("{} closed before the job completed", executor.name()),
        )),
    }
}

/// A serial line backed by a dedicated worker thread
pub struct SerialQueue {
    name: String,
    sender: Mutex<Option<mpsc::Sender<Job>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    worker_id: ThreadId,
}

impl SerialQueue {
    /// Spawn the worker thread for a new line
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let (sender, receiver) = mpsc::channel::<Job>();
        let line = name.clone();

        let worker = thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                while let Ok(job) = receiver.recv() {
                    if catch_unwind(AssertUnwindSafe(job)).is_err() {
                        tracing::error!(queue = %line, "job panicked; queue keeps running");
                    }
                }
                tracing::debug!(queue = %line, "queue drained and stopped");
            })
            .map_err(|e| unknown_error("spawn_queue", e.to_string()))?;

        Ok(Self {
            name,
            worker_id: worker.thread().id(),
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Stop accepting jobs, let queued jobs finish, and join the worker
    pub fn shutdown(&self) {
        self.sender.lock().take();
        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            if thread::current().id() != self.worker_id {
                let _ = worker.join();
            }
        }
    }
}

impl SerialExecutor for SerialQueue {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self, job: Job) -> Result<()> {
        let sender = self.sender.lock();
        match sender.as_ref() {
            Some(sender) => sender
                .send(job)
                .map_err(|_| unknown_error("enqueue", format!("{} worker is gone", self.name))),
            None => Err(unknown_error(
                "enqueue",
                format!("{} has been shut down", self.name),
            )),
        }
    }

    fn is_current(&self) -> bool {
        thread::current().id() == self.worker_id
    }
}

impl Drop for SerialQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for SerialQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialQueue").field("name", &self.name).finish()
    }
}

/// Runs every job immediately on the calling thread
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineExecutor;

impl SerialExecutor for InlineExecutor {
    fn name(&self) -> &str {
        "inline"
    }

    fn execute(&self, job: Job) -> Result<()> {
        job();
        Ok(())
    }

    fn is_current(&self) -> bool {
        true
    }
}
