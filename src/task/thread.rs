//! Background task on a dedicated OS thread
//!
//! The task handle and the spawned thread share a heap-allocated context.
//! The handle may be dropped (or detached) while the thread is still inside
//! its target; the context stays alive until both sides are done with it.
//!
//! ```text
//!   BackgroundTask ──┐                 ┌── spawned thread
//!     owner_alive    │                 │     task_alive
//!                    ▼                 ▼
//!                 Arc<TaskContext { state, thread_id, target, cancel }>
//!
//!   Idle ──start()──► Starting ──thread up──► Running ──target returns──► Idle
//! ```
//!
//! Each side clears its own flag on the way out and then attempts the
//! release; whichever side sees both flags cleared first performs it.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use super::cancel::CancelToken;
use crate::error::Result;

/// Polling interval of [`BackgroundTask::wait_for_exit`]
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

const STATE_IDLE: u8 = 0;
const STATE_STARTING: u8 = 1;
const STATE_RUNNING: u8 = 2;

/// Lifecycle state of a background task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Not running (never started, or finished)
    Idle,
    /// Thread spawned, target not yet entered
    Starting,
    /// Target is executing
    Running,
}

impl TaskState {
    fn from_u8(v: u8) -> Self {
        match v {
            STATE_STARTING => TaskState::Starting,
            STATE_RUNNING => TaskState::Running,
            _ => TaskState::Idle,
        }
    }
}

type Target = Box<dyn FnOnce(CancelToken) -> Result<()> + Send>;

struct TaskContext {
    name: String,
    state: AtomicU8,
    owner_alive: AtomicBool,
    task_alive: AtomicBool,
    released: AtomicBool,
    thread_id: Mutex<Option<String>>,
    target: Mutex<Option<Target>>,
    cancel: CancelToken,
}

impl TaskContext {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: AtomicU8::new(STATE_IDLE),
            owner_alive: AtomicBool::new(true),
            task_alive: AtomicBool::new(false),
            released: AtomicBool::new(false),
            thread_id: Mutex::new(None),
            target: Mutex::new(None),
            cancel: CancelToken::new(),
        }
    }

    fn state(&self) -> TaskState {
        TaskState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Release the context once neither side uses it; true if this call did
    fn try_release(&self) -> bool {
        if self.owner_alive.load(Ordering::SeqCst) || self.task_alive.load(Ordering::SeqCst) {
            return false;
        }
        if self
            .released
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }

        self.target.lock().take();
        tracing::trace!(task = %self.name, "Task context released");
        true
    }
}

/// Handle to a cancellable background thread
pub struct BackgroundTask {
    name: String,
    context: Arc<TaskContext>,
    handle: Option<JoinHandle<()>>,
}

impl BackgroundTask {
    /// Create an idle task; `name` becomes the OS thread name
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let context = Arc::new(TaskContext::new(&name));
        Self {
            name,
            context,
            handle: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Spawn a thread running `target`
    ///
    /// Returns `false` if the task is already running or the thread could
    /// not be spawned. The target receives this run's cancel token; an `Err`
    /// or panic from the target is logged and swallowed.
    pub fn start<F>(&mut self, target: F) -> bool
    where
        F: FnOnce(CancelToken) -> Result<()> + Send + 'static,
    {
        if self.is_running() {
            tracing::debug!(task = %self.name, "Task already running");
            return false;
        }

        // The previous run's context is left to whichever side finishes last
        self.retire_context();

        let context = Arc::new(TaskContext::new(&self.name));
        *context.target.lock() = Some(Box::new(target));
        context.state.store(STATE_STARTING, Ordering::SeqCst);
        // Set before spawning so an early owner drop cannot release under the thread
        context.task_alive.store(true, Ordering::SeqCst);

        let thread_context = Arc::clone(&context);
        let spawned = thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || run(thread_context));

        match spawned {
            Ok(handle) => {
                tracing::debug!(task = %self.name, "Task started");
                self.context = context;
                self.handle = Some(handle);
                true
            }
            Err(e) => {
                tracing::error!(task = %self.name, error = %e, "Failed to spawn task thread");
                context.state.store(STATE_IDLE, Ordering::SeqCst);
                context.task_alive.store(false, Ordering::SeqCst);
                self.context = context;
                false
            }
        }
    }

    /// Block until the thread exits; no-op if the task is not running
    ///
    /// Calling this from inside the task's own thread is refused (it would
    /// deadlock) and logged.
    pub fn join(&mut self) {
        if !self.is_running() {
            return;
        }
        let Some(handle) = self.handle.take() else {
            return;
        };
        if handle.thread().id() == thread::current().id() {
            tracing::warn!(task = %self.name, "Refusing to join task from its own thread");
            self.handle = Some(handle);
            return;
        }
        // Target panics are caught inside the thread
        let _ = handle.join();
    }

    /// Poll until the task stops running or `timeout` elapses
    ///
    /// Returns `true` if the task exited in time. This does not interrupt the
    /// target; pair it with [`BackgroundTask::cancel`].
    pub fn wait_for_exit(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.is_running() {
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(WAIT_POLL_INTERVAL);
        }
        true
    }

    /// Signal the current run's cancel token
    pub fn cancel(&self) {
        self.context.cancel.cancel();
    }

    /// Cancel token of the current run
    pub fn token(&self) -> CancelToken {
        self.context.cancel.clone()
    }

    pub fn state(&self) -> TaskState {
        self.context.state()
    }

    /// Whether the target has been entered and not yet returned
    pub fn is_started(&self) -> bool {
        self.state() == TaskState::Running
    }

    /// Whether the task is starting or running
    pub fn is_running(&self) -> bool {
        self.state() != TaskState::Idle
    }

    /// Identity string of the current run's thread, once it has started
    pub fn thread_id(&self) -> Option<String> {
        self.context.thread_id.lock().clone()
    }

    /// Read-only view of the current run's context
    pub fn monitor(&self) -> TaskMonitor {
        TaskMonitor {
            context: Arc::clone(&self.context),
        }
    }

    /// Give up the handle without joining
    ///
    /// The thread keeps running to completion and releases the context
    /// itself. The returned monitor observes it.
    pub fn detach(mut self) -> TaskMonitor {
        let monitor = self.monitor();
        self.retire_context();
        monitor
    }

    fn retire_context(&mut self) {
        // Dropping the JoinHandle detaches the thread
        self.handle.take();
        self.context.owner_alive.store(false, Ordering::SeqCst);
        self.context.try_release();
    }
}

impl Drop for BackgroundTask {
    fn drop(&mut self) {
        if !self.context.owner_alive.load(Ordering::SeqCst) {
            // Already detached
            return;
        }
        self.cancel();
        self.join();
        self.retire_context();
    }
}

impl std::fmt::Debug for BackgroundTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundTask")
            .field("name", &self.name)
            .field("state", &self.state())
            .finish()
    }
}

/// Observer of a task context that outlives the task handle
#[derive(Clone)]
pub struct TaskMonitor {
    context: Arc<TaskContext>,
}

impl TaskMonitor {
    pub fn name(&self) -> &str {
        &self.context.name
    }

    pub fn state(&self) -> TaskState {
        self.context.state()
    }

    pub fn is_running(&self) -> bool {
        self.state() != TaskState::Idle
    }

    pub fn thread_id(&self) -> Option<String> {
        self.context.thread_id.lock().clone()
    }

    /// Whether both the owner and the thread have let go of the context
    pub fn is_released(&self) -> bool {
        self.context.released.load(Ordering::SeqCst)
    }
}

fn run(context: Arc<TaskContext>) {
    context.task_alive.store(true, Ordering::SeqCst);
    context.state.store(STATE_RUNNING, Ordering::SeqCst);
    {
        let mut tid = context.thread_id.lock();
        if tid.is_none() {
            *tid = Some(format!("{:?}", thread::current().id()));
        }
    }

    let target = context.target.lock().take();
    match target {
        Some(target) => {
            let token = context.cancel.clone();
            match panic::catch_unwind(AssertUnwindSafe(move || target(token))) {
                Ok(Ok(())) => {
                    tracing::debug!(task = %context.name, "Task finished");
                }
                Ok(Err(e)) => {
                    tracing::warn!(task = %context.name, error = %e, "Task target failed");
                }
                Err(payload) => {
                    tracing::error!(
                        task = %context.name,
                        panic = %panic_message(payload.as_ref()),
                        "Task target panicked"
                    );
                }
            }
        }
        None => {
            tracing::error!(task = %context.name, "Task started without a target");
        }
    }

    context.state.store(STATE_IDLE, Ordering::SeqCst);
    context.task_alive.store(false, Ordering::SeqCst);
    context.try_release();
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
