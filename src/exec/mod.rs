// src/exec/mod.rs

//! Command execution core.
//!
//! This is the task-queue/scheduler subsystem: [`task`] holds the
//! per-command state machine and the spawn-and-read pipeline, [`commander`]
//! owns the queue and the admission policy, [`listener`] defines the
//! callback surface and the dispatchers that relocate callbacks onto a
//! caller-designated context, and [`process`] wraps the low-level child
//! teardown helpers.

pub mod commander;
pub mod listener;
pub mod process;
pub mod task;

pub use commander::Commander;
pub use listener::{
    Callback, DispatchQueue, ExecListener, InlineDispatcher, NullListener, QueueDispatcher,
    ResponseDispatcher, queue_dispatcher,
};
pub use task::{CommandTask, CommandTaskBuilder, TaskState};
