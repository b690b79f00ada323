// src/exec/task.rs

//! One schedulable unit of work: a command line, an optional start delay,
//! and the lifecycle state machine driving the spawn-and-read pipeline.

use std::process::Stdio;
use std::sync::atomic::{AtomicU8, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, OnceLock, Weak};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::errors::CommanderError;
use crate::exec::commander::CommanderCore;
use crate::exec::listener::{ExecListener, NullListener};
use crate::exec::process;

/// Lifecycle state of a [`CommandTask`].
///
/// Transitions are monotonic: `Waiting → Running → {Finished | Interrupted}`.
/// `Interrupted` is reached only through [`CommandTask::cancel`] and
/// suppresses the normal terminal callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TaskState {
    Waiting = 0,
    Running = 1,
    Finished = 2,
    Interrupted = 3,
}

/// How long cleanup waits for a child to exit before leaving the rest to
/// `kill_on_drop`.
const REAP_GRACE: Duration = Duration::from_secs(1);

impl TaskState {
    fn from_u8(v: u8) -> TaskState {
        match v {
            0 => TaskState::Waiting,
            1 => TaskState::Running,
            2 => TaskState::Finished,
            _ => TaskState::Interrupted,
        }
    }
}

/// A single external command invocation, scheduled through a
/// [`Commander`](crate::Commander).
///
/// Built via [`CommandTask::builder`], submitted once, then observed through
/// the listener given at submission. The state word is a lone atomic shared
/// between the I/O worker and whoever calls [`cancel`](CommandTask::cancel);
/// no lock is held around it, so a cancel racing the spawn is bounded by
/// flag re-checks inside the worker.
pub struct CommandTask {
    command: Vec<String>,
    delay: Duration,
    state: AtomicU8,
    pid: AtomicU32,
    child: Mutex<Option<tokio::process::Child>>,
    listener: Mutex<Option<Arc<dyn ExecListener>>>,
    commander: OnceLock<Weak<CommanderCore>>,
    cancel_token: CancellationToken,
}

impl CommandTask {
    pub fn builder() -> CommandTaskBuilder {
        CommandTaskBuilder::default()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> TaskState {
        TaskState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// True iff the task is currently in the `Running` state (which starts
    /// at deploy time, while the start delay is still pending).
    pub fn is_running(&self) -> bool {
        self.state() == TaskState::Running
    }

    /// Pid of the spawned process, or 0 if no process has been spawned yet
    /// (or the pid was unavailable).
    pub fn pid(&self) -> u32 {
        self.pid.load(Ordering::SeqCst)
    }

    /// The command argument list this task will run.
    pub fn command(&self) -> &[String] {
        &self.command
    }

    fn transition(&self, from: TaskState, to: TaskState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Bind the owning commander. Set exactly once, at first submission;
    /// later attempts keep the original owner.
    pub(crate) fn bind(&self, core: Weak<CommanderCore>) {
        let _ = self.commander.set(core);
    }

    /// Bind the lifecycle listener at submission time, before the task is
    /// visible in the queue, so a cancel arriving ahead of the worker can
    /// still deliver `on_cancelled`. First submission wins.
    pub(crate) fn set_listener(&self, listener: Arc<dyn ExecListener>) {
        let mut slot = self.listener.lock().expect("listener lock poisoned");
        if slot.is_none() {
            *slot = Some(listener);
        }
    }

    fn core(&self) -> Option<Arc<CommanderCore>> {
        self.commander.get().and_then(Weak::upgrade)
    }

    /// Start execution with the listener bound at submission. Silent no-op
    /// unless the task is still `Waiting`, so a second deploy can never
    /// produce a second process.
    pub(crate) fn deploy(self: Arc<Self>, core: &Arc<CommanderCore>) {
        if !self.transition(TaskState::Waiting, TaskState::Running) {
            return;
        }
        let listener = self
            .listener
            .lock()
            .expect("listener lock poisoned")
            .clone()
            .unwrap_or_else(|| Arc::new(NullListener));

        let core = Arc::clone(core);
        tokio::spawn(async move {
            self.run(listener, core).await;
        });
    }

    async fn run(self: Arc<Self>, listener: Arc<dyn ExecListener>, core: Arc<CommanderCore>) {
        if !self.delay.is_zero() {
            tokio::select! {
                _ = sleep(self.delay) => {}
                _ = self.cancel_token.cancelled() => {}
            }
        }
        // A cancel during the delay must win before anything observable
        // happens: no on_pre, no process.
        if !self.is_running() {
            return;
        }

        if let Err(err) = self.execute(&listener, &core).await {
            if self.transition(TaskState::Running, TaskState::Finished) {
                core.remove_task(&self);
                core.dispatch(move || listener.on_error(err));
            }
        }
    }

    async fn execute(
        &self,
        listener: &Arc<dyn ExecListener>,
        core: &Arc<CommanderCore>,
    ) -> Result<(), CommanderError> {
        let cmd_text = self.command.join(" ");
        {
            let listener = Arc::clone(listener);
            let command = cmd_text.clone();
            core.dispatch(move || listener.on_pre(command));
        }

        debug!(command = %cmd_text, "spawning process");
        let mut child = Command::new(&self.command[0])
            .args(&self.command[1..])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| CommanderError::Spawn {
                command: cmd_text.clone(),
                source,
            })?;

        self.pid.store(process::process_id(&child), Ordering::SeqCst);

        // Merge stdout and stderr into one line stream; the channel closes
        // once both pipes hit EOF.
        let (line_tx, mut line_rx) = mpsc::channel::<String>(64);
        if let Some(stdout) = child.stdout.take() {
            spawn_line_forwarder(stdout, line_tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_line_forwarder(stderr, line_tx.clone());
        }
        drop(line_tx);

        *self.child.lock().expect("child handle lock poisoned") = Some(child);
        // cancel() may have fired between the spawn and registering the
        // child; re-check the flag now that the handle is visible to it.
        if !self.is_running() {
            self.kill_process();
        }

        let mut output: Vec<String> = Vec::new();
        loop {
            if !self.is_running() {
                break;
            }
            tokio::select! {
                _ = self.cancel_token.cancelled() => break,
                line = line_rx.recv() => match line {
                    Some(line) => {
                        {
                            let listener = Arc::clone(listener);
                            let line = line.clone();
                            core.dispatch(move || listener.on_progress(line));
                        }
                        output.push(line);
                    }
                    None => break,
                },
            }
        }

        // Cleanup runs no matter how the read loop ended: close the
        // standard streams, kill on interruption, reap the child. EOF
        // normally means the process already exited; a straggler that closed
        // its streams without exiting is killed by kill_on_drop after the
        // grace period.
        let child = self.child.lock().expect("child handle lock poisoned").take();
        if let Some(mut child) = child {
            process::close_streams(&mut child);
            if !self.is_running() {
                process::kill_child(&mut child);
            }
            let _ = timeout(REAP_GRACE, child.wait()).await;
        }

        if self.transition(TaskState::Running, TaskState::Finished) {
            core.remove_task(self);
            let listener = Arc::clone(listener);
            let result = output.join("\n");
            core.dispatch(move || listener.on_success(result));
        }
        Ok(())
    }

    /// Cancel the task. Safe in every state:
    ///
    /// - delay still pending: the scheduled execution aborts before any
    ///   process is spawned (no `on_pre`);
    /// - process running: the read loop stops and the process is killed,
    ///   best-effort;
    /// - already finished: harmless no-op.
    ///
    /// The first effective call transitions the task to `Interrupted`,
    /// removes it from the commander's queue and delivers `on_cancelled`
    /// through the dispatcher; repeat calls do nothing further.
    pub fn cancel(&self) {
        let interrupted = self.transition(TaskState::Waiting, TaskState::Interrupted)
            || self.transition(TaskState::Running, TaskState::Interrupted);
        self.cancel_token.cancel();

        if let Some(core) = self.core() {
            core.remove_task(self);
            if interrupted {
                let listener = self.listener.lock().expect("listener lock poisoned").clone();
                if let Some(listener) = listener {
                    core.dispatch(move || listener.on_cancelled());
                }
            }
        }
        self.kill_process();
    }

    fn kill_process(&self) {
        let mut child = self.child.lock().expect("child handle lock poisoned");
        if let Some(child) = child.as_mut() {
            process::kill_child(child);
        }
    }
}

impl std::fmt::Debug for CommandTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandTask")
            .field("command", &self.command)
            .field("delay", &self.delay)
            .field("state", &self.state())
            .finish()
    }
}

/// Forward lines from one child pipe into the shared line channel.
///
/// Read errors end the stream silently; the task still completes with
/// whatever output accumulated.
fn spawn_line_forwarder<R>(stream: R, tx: mpsc::Sender<String>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if tx.send(line).await.is_err() {
                break;
            }
        }
    });
}

/// Builder for [`CommandTask`].
#[derive(Debug, Default)]
pub struct CommandTaskBuilder {
    command: Vec<String>,
    delay: Duration,
}

impl CommandTaskBuilder {
    /// Append a single command token.
    pub fn arg(mut self, token: impl Into<String>) -> Self {
        self.command.push(token.into());
        self
    }

    /// Append a pre-split sequence of tokens.
    pub fn args<I, S>(mut self, tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command.extend(tokens.into_iter().map(Into::into));
        self
    }

    /// Append a whole command line, split on whitespace.
    ///
    /// Convenience only: this does not honour quoting or escaping.
    pub fn command_line(mut self, line: &str) -> Self {
        self.command.extend(line.split_whitespace().map(str::to_string));
        self
    }

    /// Delay the task's start by the given duration. Default: zero.
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Delay the task's start by the given number of milliseconds.
    pub fn delay_ms(self, millis: u64) -> Self {
        self.delay(Duration::from_millis(millis))
    }

    /// Build the task in the `Waiting` state.
    pub fn build(self) -> Result<Arc<CommandTask>, CommanderError> {
        if self.command.is_empty() {
            return Err(CommanderError::EmptyCommand);
        }
        Ok(Arc::new(CommandTask {
            command: self.command,
            delay: self.delay,
            state: AtomicU8::new(TaskState::Waiting as u8),
            pid: AtomicU32::new(0),
            child: Mutex::new(None),
            listener: Mutex::new(None),
            commander: OnceLock::new(),
            cancel_token: CancellationToken::new(),
        }))
    }
}
