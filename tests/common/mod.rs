//! Common test utilities: a listener that records every lifecycle event
//! into a channel, plus helpers for receiving events with timeouts.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use cmdq::{CommanderError, ExecListener};
use tokio::sync::mpsc;
use tokio::time::timeout;

/// Lifecycle events captured by a [`RecordingListener`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Pre(String),
    Progress(String),
    Error(String),
    Success(String),
    Cancelled,
}

pub struct RecordingListener {
    tx: mpsc::UnboundedSender<Event>,
}

impl ExecListener for RecordingListener {
    fn on_pre(&self, command: String) {
        let _ = self.tx.send(Event::Pre(command));
    }

    fn on_progress(&self, line: String) {
        let _ = self.tx.send(Event::Progress(line));
    }

    fn on_error(&self, error: CommanderError) {
        let _ = self.tx.send(Event::Error(error.to_string()));
    }

    fn on_success(&self, output: String) {
        let _ = self.tx.send(Event::Success(output));
    }

    fn on_cancelled(&self) {
        let _ = self.tx.send(Event::Cancelled);
    }
}

pub fn recording_listener() -> (Arc<RecordingListener>, mpsc::UnboundedReceiver<Event>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Arc::new(RecordingListener { tx }), rx)
}

/// Receive the next event, failing the test after five seconds.
pub async fn next_event(rx: &mut mpsc::UnboundedReceiver<Event>) -> Event {
    timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for listener event")
        .expect("listener channel closed")
}

/// Collect events until the channel stays quiet for `idle`.
pub async fn drain_events(rx: &mut mpsc::UnboundedReceiver<Event>, idle: Duration) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(Some(event)) = timeout(idle, rx.recv()).await {
        events.push(event);
    }
    events
}
