// src/errors.rs

//! Typed errors for the command queue.
//!
//! Task-level failures (a process that could not be spawned) never bubble up
//! to the [`Commander`](crate::Commander); they reach the caller through
//! [`ExecListener::on_error`](crate::ExecListener::on_error) instead. The
//! variants here cover the synchronous surface: building a task and
//! submitting it.

use std::io;

use thiserror::Error;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, CommanderError>;

#[derive(Debug, Error)]
pub enum CommanderError {
    /// Submission was attempted while the running-task count is already at
    /// the configured cap. The task is not enqueued.
    #[error("admission rejected: {running} task(s) already running (max {max})")]
    AdmissionRejected { running: usize, max: usize },

    /// A task was built with no command tokens.
    #[error("command is empty")]
    EmptyCommand,

    /// The external process could not be started.
    #[error("failed to spawn `{command}`")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },
}
