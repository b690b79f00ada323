// src/lib.rs

pub mod cli;
pub mod errors;
pub mod exec;
pub mod logging;

pub use errors::{CommanderError, Result};
pub use exec::{
    Commander, CommandTask, CommandTaskBuilder, DispatchQueue, ExecListener, InlineDispatcher,
    NullListener, QueueDispatcher, ResponseDispatcher, TaskState, queue_dispatcher,
};

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::cli::CliArgs;

/// High-level entry point used by `main.rs`.
///
/// Submits every command to one [`Commander`], streams progress lines to
/// stdout as they arrive, cancels everything on Ctrl-C, and fails if any
/// command failed, was rejected, or was cancelled.
pub async fn run(args: CliArgs) -> anyhow::Result<()> {
    let delay = match args.delay.as_deref() {
        Some(s) => cli::parse_delay(s).map_err(|e| anyhow!(e))?,
        None => Duration::ZERO,
    };

    let (dispatcher, queue) = queue_dispatcher();
    let commander = Commander::new(args.max_parallel, Arc::new(dispatcher));

    // Ctrl-C → cancel everything in flight; each task then reports
    // on_cancelled and the completion loop below unwinds normally.
    {
        let commander = commander.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            warn!("interrupt received, cancelling all commands");
            commander.cancel_all();
        });
    }

    let (done_tx, mut done_rx) = mpsc::unbounded_channel::<bool>();

    let mut submitted = 0usize;
    let mut failed = 0usize;
    for line in &args.commands {
        let task = CommandTask::builder().command_line(line).delay(delay).build()?;
        let listener = Arc::new(PrintListener {
            command: line.clone(),
            done: done_tx.clone(),
        });
        match commander.submit(task, listener) {
            Ok(()) => submitted += 1,
            Err(err @ CommanderError::AdmissionRejected { .. }) => {
                warn!(command = %line, %err, "submission rejected");
                failed += 1;
            }
            Err(err) => return Err(err.into()),
        }
    }

    // Listener callbacks execute here, on the dispatch queue; this task is
    // the CLI's designated callback context.
    let pump = tokio::spawn(queue.run());

    for _ in 0..submitted {
        match done_rx.recv().await {
            Some(true) => {}
            Some(false) => failed += 1,
            None => break,
        }
    }
    pump.abort();

    if failed > 0 {
        bail!("{failed} of {} command(s) did not complete", args.commands.len());
    }
    Ok(())
}

/// Streams progress lines to stdout and reports one terminal outcome per
/// command over the `done` channel.
struct PrintListener {
    command: String,
    done: mpsc::UnboundedSender<bool>,
}

impl ExecListener for PrintListener {
    fn on_pre(&self, command: String) {
        info!(%command, "starting");
    }

    fn on_progress(&self, line: String) {
        println!("{line}");
    }

    fn on_error(&self, error: CommanderError) {
        error!(command = %self.command, %error, "command failed");
        let _ = self.done.send(false);
    }

    fn on_success(&self, _output: String) {
        info!(command = %self.command, "command finished");
        let _ = self.done.send(true);
    }

    fn on_cancelled(&self) {
        warn!(command = %self.command, "command cancelled");
        let _ = self.done.send(false);
    }
}
