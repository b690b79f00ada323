// src/exec/commander.rs

//! The scheduler: owns the task queue, enforces the parallelism cap, and
//! routes cancellation and removal.

use std::sync::{Arc, Mutex};

use tracing::{debug, info};

use crate::errors::CommanderError;
use crate::exec::listener::{Callback, ExecListener, NullListener, ResponseDispatcher};
use crate::exec::task::{CommandTask, TaskState};

/// Shared state behind every [`Commander`] handle.
///
/// Tasks hold a `Weak` reference back to this so their completion and
/// cancellation paths can deregister themselves and reach the dispatcher.
pub(crate) struct CommanderCore {
    queue: Mutex<Vec<Arc<CommandTask>>>,
    max_parallel: usize,
    dispatcher: Arc<dyn ResponseDispatcher>,
}

impl CommanderCore {
    pub(crate) fn dispatch(&self, callback: impl FnOnce() + Send + 'static) {
        let callback: Callback = Box::new(callback);
        self.dispatcher.dispatch(callback);
    }

    /// Remove a task from the queue by identity. No-op if already absent.
    pub(crate) fn remove_task(&self, task: &CommandTask) {
        let mut queue = self.queue.lock().expect("task queue lock poisoned");
        queue.retain(|t| !std::ptr::eq(Arc::as_ptr(t), task));
    }
}

/// Schedules [`CommandTask`]s under a global maximum number of concurrently
/// running tasks.
///
/// Construct one per scope that needs command execution and pass clones
/// around; cloning yields another handle onto the same queue. All listener
/// callbacks are delivered through the [`ResponseDispatcher`] given at
/// construction. Submission must happen inside a Tokio runtime; each
/// admitted task runs on its own spawned worker.
#[derive(Clone)]
pub struct Commander {
    core: Arc<CommanderCore>,
}

impl Commander {
    /// Create a commander. `max_parallel == 0` means unbounded.
    pub fn new(max_parallel: usize, dispatcher: Arc<dyn ResponseDispatcher>) -> Commander {
        let max_parallel = if max_parallel == 0 {
            usize::MAX
        } else {
            max_parallel
        };
        Commander {
            core: Arc::new(CommanderCore {
                queue: Mutex::new(Vec::new()),
                max_parallel,
                dispatcher,
            }),
        }
    }

    /// Submit a task and observe its lifecycle through `listener`.
    ///
    /// Fails with [`CommanderError::AdmissionRejected`] when the running
    /// count is already at the cap; the task is not enqueued in that case.
    pub fn submit(
        &self,
        task: Arc<CommandTask>,
        listener: Arc<dyn ExecListener>,
    ) -> Result<(), CommanderError> {
        self.schedule(task, listener)
    }

    /// Submit a task without observing its lifecycle events.
    pub fn submit_detached(&self, task: Arc<CommandTask>) -> Result<(), CommanderError> {
        self.schedule(task, Arc::new(NullListener))
    }

    fn schedule(
        &self,
        task: Arc<CommandTask>,
        listener: Arc<dyn ExecListener>,
    ) -> Result<(), CommanderError> {
        // The whole admission decision happens under one lock so that two
        // concurrent submissions cannot both observe spare capacity.
        let mut queue = self.core.queue.lock().expect("task queue lock poisoned");

        // A task past Waiting has already run (or is running); re-enqueueing
        // it would park a dead entry in the queue forever.
        if task.state() != TaskState::Waiting {
            debug!(?task, "ignoring resubmission of a task already past Waiting");
            return Ok(());
        }

        let mut running = queue.iter().filter(|t| t.is_running()).count();
        if running >= self.core.max_parallel {
            return Err(CommanderError::AdmissionRejected {
                running,
                max: self.core.max_parallel,
            });
        }

        task.bind(Arc::downgrade(&self.core));
        task.set_listener(listener);
        queue.push(task);
        debug!(queued = queue.len(), running, "task admitted");

        // Re-drive the queue from the head, starting still-waiting tasks
        // (each with the listener bound at its own submission) until the
        // running count reaches the cap.
        for t in queue.iter() {
            if running >= self.core.max_parallel {
                break;
            }
            if t.state() != TaskState::Waiting {
                continue;
            }
            Arc::clone(t).deploy(&self.core);
            running += 1;
        }
        Ok(())
    }

    /// Cancel a task iff it is currently queued here. Tasks unknown to this
    /// commander are left untouched.
    pub fn cancel_task(&self, task: &CommandTask) {
        let queued = {
            let queue = self.core.queue.lock().expect("task queue lock poisoned");
            queue.iter().any(|t| std::ptr::eq(Arc::as_ptr(t), task))
        };
        if queued {
            task.cancel();
        }
    }

    /// Cancel every queued task, draining the queue until it is empty.
    ///
    /// Tolerates the queue shrinking concurrently as completion callbacks
    /// remove their own tasks.
    pub fn cancel_all(&self) {
        loop {
            let next = {
                let queue = self.core.queue.lock().expect("task queue lock poisoned");
                queue.first().cloned()
            };
            match next {
                Some(task) => {
                    task.cancel();
                    // cancel() deregisters bound tasks itself; removing here
                    // as well guarantees the drain always makes progress.
                    self.core.remove_task(&task);
                }
                None => break,
            }
        }
        info!("task queue drained");
    }

    /// Explicit teardown: cancels and drains everything in flight. Call
    /// before dropping the last handle if tasks may still be running.
    pub fn shutdown(&self) {
        self.cancel_all();
    }

    /// Number of queued tasks currently in the `Running` state.
    pub fn running_count(&self) -> usize {
        let queue = self.core.queue.lock().expect("task queue lock poisoned");
        queue.iter().filter(|t| t.is_running()).count()
    }

    /// Number of tasks currently in the queue, running or not.
    pub fn queue_len(&self) -> usize {
        let queue = self.core.queue.lock().expect("task queue lock poisoned");
        queue.len()
    }
}
