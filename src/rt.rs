//! Real-time facade
//!
//! Facts the backends need from the flight scheduler: whether filesystem
//! access is allowed at all, whether the caller is the main control thread,
//! whether the vehicle is armed, a blocking delay and a place to run
//! background io tasks.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;

use crossbeam::channel::{self, Sender};
use parking_lot::Mutex;

/// Work item run on the io thread
pub type IoTask = Box<dyn FnOnce() + Send + 'static>;

/// Scheduler facts consumed by the backends
pub trait RealTime: Send + Sync {
    /// Entry guard checked before any filesystem work
    fn fs_allowed(&self) -> bool {
        true
    }

    /// True on the primary control-loop thread
    fn in_main_thread(&self) -> bool;

    /// True while the vehicle is armed
    fn is_armed(&self) -> bool;

    /// Block the calling thread
    fn delay(&self, duration: Duration);

    /// Queue a task for the io thread
    fn spawn_io(&self, task: IoTask);

    /// Blocking retries are only allowed off the main thread or while disarmed
    fn retry_allowed(&self) -> bool {
        !self.in_main_thread() || !self.is_armed()
    }
}

// =============================================================================
// Host Implementation
// =============================================================================

/// Host scheduler: the constructing thread is the main thread and io tasks
/// run in order on a dedicated worker
pub struct HostRealTime {
    main_thread: ThreadId,
    armed: AtomicBool,
    sender: Option<Sender<IoTask>>,
    worker: Option<JoinHandle<()>>,
}

impl HostRealTime {
    pub fn new() -> Self {
        let (sender, receiver) = channel::unbounded::<IoTask>();
        let worker = thread::Builder::new()
            .name("flightfs-io".to_string())
            .spawn(move || {
                for task in receiver {
                    task();
                }
            });

        let worker = match worker {
            Ok(handle) => Some(handle),
            Err(e) => {
                tracing::warn!("io worker unavailable, tasks will run inline: {}", e);
                None
            }
        };

        Self {
            main_thread: thread::current().id(),
            armed: AtomicBool::new(false),
            sender: worker.as_ref().map(|_| sender),
            worker,
        }
    }

    pub fn set_armed(&self, armed: bool) {
        self.armed.store(armed, Ordering::Relaxed);
    }
}

impl Default for HostRealTime {
    fn default() -> Self {
        Self::new()
    }
}

impl RealTime for HostRealTime {
    fn in_main_thread(&self) -> bool {
        thread::current().id() == self.main_thread
    }

    fn is_armed(&self) -> bool {
        self.armed.load(Ordering::Relaxed)
    }

    fn delay(&self, duration: Duration) {
        thread::sleep(duration);
    }

    fn spawn_io(&self, task: IoTask) {
        match &self.sender {
            Some(sender) => {
                if let Err(e) = sender.send(task) {
                    tracing::warn!("io worker gone, running task inline");
                    (e.into_inner())();
                }
            }
            None => task(),
        }
    }
}

impl Drop for HostRealTime {
    fn drop(&mut self) {
        // Closing the channel ends the worker loop once queued tasks are done
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            // The last handle may be released by a task on the worker itself
            if worker.thread().id() != thread::current().id() {
                let _ = worker.join();
            }
        }
    }
}

// =============================================================================
// Manual Implementation
// =============================================================================

/// Scheduler driven explicitly by the caller
///
/// Delays are recorded instead of slept, and io tasks wait in a queue until
/// [`run_pending`](Self::run_pending) is called.
#[derive(Default)]
pub struct ManualRealTime {
    denied: AtomicBool,
    main_thread: AtomicBool,
    armed: AtomicBool,
    delays: Mutex<Vec<Duration>>,
    queue: Mutex<VecDeque<IoTask>>,
}

impl ManualRealTime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fs_allowed(&self, allowed: bool) {
        self.denied.store(!allowed, Ordering::Relaxed);
    }

    pub fn set_main_thread(&self, main: bool) {
        self.main_thread.store(main, Ordering::Relaxed);
    }

    pub fn set_armed(&self, armed: bool) {
        self.armed.store(armed, Ordering::Relaxed);
    }

    /// Every delay requested so far
    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().clone()
    }

    /// Number of queued io tasks
    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }

    /// Run queued io tasks in order, returning how many ran
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        loop {
            // Pop under the lock, run without it; tasks may queue more work
            let task = self.queue.lock().pop_front();
            match task {
                Some(task) => {
                    task();
                    ran += 1;
                }
                None => return ran,
            }
        }
    }
}

impl RealTime for ManualRealTime {
    fn fs_allowed(&self) -> bool {
        !self.denied.load(Ordering::Relaxed)
    }

    fn in_main_thread(&self) -> bool {
        self.main_thread.load(Ordering::Relaxed)
    }

    fn is_armed(&self) -> bool {
        self.armed.load(Ordering::Relaxed)
    }

    fn delay(&self, duration: Duration) {
        self.delays.lock().push(duration);
    }

    fn spawn_io(&self, task: IoTask) {
        self.queue.lock().push_back(task);
    }
}
