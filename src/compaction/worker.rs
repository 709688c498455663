//! Background worker thread.
//!
//! One thread, one bounded queue. The engine submits flush and compaction
//! jobs as closures; the worker drains them in order. `pause` flips an
//! atomic flag — a paused worker parks without consuming jobs, so nothing
//! queued is lost (and nothing is re-enqueued around the pause).
//!
//! Shutdown is cooperative: the stop flag is set, the queue sender is
//! dropped, and the caller waits for the worker's exit acknowledgement
//! with a deadline before giving up on the join.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use tracing::{debug, warn};

/// A queued unit of background work.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// How long a parked (paused or idle) worker sleeps between flag checks.
const PARK_INTERVAL: Duration = Duration::from_millis(20);

/// Handle to the single background worker.
pub struct BackgroundWorker {
    sender: Option<Sender<Job>>,
    done: Receiver<()>,
    handle: Option<JoinHandle<()>>,
    paused: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
}

impl BackgroundWorker {
    /// Spawns the worker with a queue of `queue_depth` pending jobs.
    pub fn spawn(queue_depth: usize) -> std::io::Result<Self> {
        let (sender, receiver): (Sender<Job>, Receiver<Job>) = bounded(queue_depth);
        let (done_tx, done) = bounded(1);
        let paused = Arc::new(AtomicBool::new(false));
        let stop = Arc::new(AtomicBool::new(false));

        let worker_paused = Arc::clone(&paused);
        let worker_stop = Arc::clone(&stop);
        let handle = thread::Builder::new()
            .name("stratumdb-background".into())
            .spawn(move || {
                run_loop(receiver, worker_paused, worker_stop);
                let _ = done_tx.send(());
            })?;

        Ok(Self {
            sender: Some(sender),
            done,
            handle: Some(handle),
            paused,
            stop,
        })
    }

    /// Enqueues a job. Returns false when the queue is full or the worker
    /// is shutting down — callers treat that as "already scheduled".
    pub fn submit(&self, job: Job) -> bool {
        let Some(sender) = &self.sender else {
            return false;
        };
        match sender.try_send(job) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                debug!("background queue full, job dropped");
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    /// Stops job consumption; queued jobs stay queued.
    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    /// Resumes job consumption.
    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    /// Requests shutdown and waits up to `deadline` for the worker to
    /// exit. Returns true when the worker acknowledged in time.
    pub fn shutdown(&mut self, deadline: Duration) -> bool {
        self.stop.store(true, Ordering::SeqCst);
        self.sender.take(); // disconnect the queue
        match self.done.recv_timeout(deadline) {
            Ok(()) => {
                if let Some(handle) = self.handle.take() {
                    let _ = handle.join();
                }
                true
            }
            Err(_) => {
                warn!("background worker did not stop within the deadline");
                false
            }
        }
    }
}

impl Drop for BackgroundWorker {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.shutdown(Duration::from_secs(5));
        }
    }
}

fn run_loop(receiver: Receiver<Job>, paused: Arc<AtomicBool>, stop: Arc<AtomicBool>) {
    loop {
        if stop.load(Ordering::SeqCst) {
            break;
        }
        if paused.load(Ordering::SeqCst) {
            thread::sleep(PARK_INTERVAL);
            continue;
        }
        match receiver.recv_timeout(PARK_INTERVAL) {
            Ok(job) => job(),
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    debug!("background worker exiting");
}
