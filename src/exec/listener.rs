// src/exec/listener.rs

//! Listener callbacks and the dispatcher that relocates them.
//!
//! Every lifecycle event a task emits goes through the owning commander's
//! [`ResponseDispatcher`], never directly on the background worker that does
//! the process I/O. This keeps the caller's callback-handling context (a UI
//! loop, the main task, whatever) decoupled from the read loop.

use tokio::sync::mpsc;

use crate::errors::CommanderError;

/// Lifecycle callbacks for a single [`CommandTask`](crate::CommandTask).
///
/// Per task, `on_pre` fires once before any `on_progress`, and exactly one
/// of `on_success` / `on_error` / `on_cancelled` follows as the terminal
/// event. All methods have empty default bodies; implement only the ones
/// you care about.
pub trait ExecListener: Send + Sync + 'static {
    /// The command is about to be spawned. `command` is the space-joined
    /// display form of the argument list.
    fn on_pre(&self, _command: String) {}

    /// One line of combined stdout/stderr output.
    fn on_progress(&self, _line: String) {}

    /// The task failed before producing a result (e.g. the process could
    /// not be spawned). Terminal; mutually exclusive with `on_success`.
    fn on_error(&self, _error: CommanderError) {}

    /// The task ran to completion. `output` is every progress line joined
    /// with `\n`.
    fn on_success(&self, _output: String) {}

    /// The task was cancelled mid-flight. Terminal.
    fn on_cancelled(&self) {}
}

/// Listener that ignores every event.
pub struct NullListener;

impl ExecListener for NullListener {}

/// A deferred listener callback, ready to run on whichever context the
/// dispatcher designates.
pub type Callback = Box<dyn FnOnce() + Send + 'static>;

/// Executes listener callbacks on a caller-designated context.
///
/// Implementations must preserve per-dispatch ordering: events for one task
/// are dispatched in lifecycle order and must be observed in that order.
pub trait ResponseDispatcher: Send + Sync + 'static {
    fn dispatch(&self, callback: Callback);
}

/// Dispatcher that runs callbacks immediately on the calling context.
///
/// Callbacks then run on the task's own I/O worker, so listeners must be
/// cheap and non-blocking. Handy for tests and simple tools.
pub struct InlineDispatcher;

impl ResponseDispatcher for InlineDispatcher {
    fn dispatch(&self, callback: Callback) {
        callback();
    }
}

/// Create a channel-backed dispatcher pair.
///
/// The [`QueueDispatcher`] half goes into
/// [`Commander::new`](crate::Commander::new); the application drives the
/// [`DispatchQueue`] half on its designated thread or task, which is where
/// every callback then executes.
pub fn queue_dispatcher() -> (QueueDispatcher, DispatchQueue) {
    let (tx, rx) = mpsc::unbounded_channel();
    (QueueDispatcher { tx }, DispatchQueue { rx })
}

/// Sending half of [`queue_dispatcher`]; posts callbacks onto the queue.
pub struct QueueDispatcher {
    tx: mpsc::UnboundedSender<Callback>,
}

impl ResponseDispatcher for QueueDispatcher {
    fn dispatch(&self, callback: Callback) {
        // If the consuming side is gone there is nobody left to observe the
        // event; dropping it matches the listener-may-be-absent behaviour.
        let _ = self.tx.send(callback);
    }
}

/// Consuming half of [`queue_dispatcher`].
pub struct DispatchQueue {
    rx: mpsc::UnboundedReceiver<Callback>,
}

impl DispatchQueue {
    /// Run callbacks in dispatch order until every [`QueueDispatcher`]
    /// handle has been dropped.
    pub async fn run(mut self) {
        while let Some(callback) = self.rx.recv().await {
            callback();
        }
    }
}
