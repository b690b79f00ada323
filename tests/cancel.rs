mod common;

use std::sync::Arc;
use std::time::Duration;

use cmdq::{Commander, CommandTask, InlineDispatcher, TaskState};
use common::{Event, drain_events, next_event, recording_listener};
use tokio::time::sleep;

fn unbounded() -> Commander {
    Commander::new(0, Arc::new(InlineDispatcher))
}

#[tokio::test]
async fn cancel_during_delay_prevents_spawn() {
    let commander = unbounded();
    let (listener, mut rx) = recording_listener();

    let task = CommandTask::builder()
        .args(["echo", "never"])
        .delay_ms(500)
        .build()
        .unwrap();
    commander.submit(Arc::clone(&task), listener).unwrap();

    sleep(Duration::from_millis(50)).await;
    task.cancel();

    // No on_pre, no process: the delayed execution observed the
    // interruption and aborted.
    let events = drain_events(&mut rx, Duration::from_millis(700)).await;
    assert_eq!(events, vec![Event::Cancelled]);
    assert_eq!(task.state(), TaskState::Interrupted);
    assert_eq!(task.pid(), 0);
    assert_eq!(commander.queue_len(), 0);
}

#[tokio::test]
async fn cancel_mid_read_stops_progress_and_kills_the_process() {
    let commander = unbounded();
    let (listener, mut rx) = recording_listener();

    let task = CommandTask::builder()
        .args(["sh", "-c", "echo started; sleep 5; echo late"])
        .build()
        .unwrap();
    commander.submit(Arc::clone(&task), listener).unwrap();

    assert!(matches!(next_event(&mut rx).await, Event::Pre(_)));
    assert_eq!(next_event(&mut rx).await, Event::Progress("started".into()));

    task.cancel();
    assert_eq!(task.state(), TaskState::Interrupted);

    // No further progress and no onSuccess/onError; cancellation is the
    // one terminal event.
    let events = drain_events(&mut rx, Duration::from_millis(500)).await;
    assert_eq!(events, vec![Event::Cancelled]);

    #[cfg(unix)]
    {
        let pid = task.pid();
        assert!(pid > 0);
        let mut alive = true;
        for _ in 0..40 {
            alive = unsafe { libc::kill(pid as libc::pid_t, 0) } == 0;
            if !alive {
                break;
            }
            sleep(Duration::from_millis(50)).await;
        }
        assert!(!alive, "cancelled process still alive after grace period");
    }

    assert_eq!(commander.queue_len(), 0);
}

#[tokio::test]
async fn cancel_after_finish_is_a_no_op() {
    let commander = unbounded();
    let (listener, mut rx) = recording_listener();

    let task = CommandTask::builder().args(["echo", "done"]).build().unwrap();
    commander.submit(Arc::clone(&task), listener).unwrap();

    let events = drain_events(&mut rx, Duration::from_secs(1)).await;
    assert!(matches!(events.last(), Some(Event::Success(_))));

    task.cancel();
    assert_eq!(task.state(), TaskState::Finished);
    assert!(drain_events(&mut rx, Duration::from_millis(200)).await.is_empty());
}

#[tokio::test]
async fn cancelled_task_reports_to_its_submission_listener() {
    let commander = unbounded();
    let (listener, mut rx) = recording_listener();
    let (late_listener, mut late_rx) = recording_listener();

    let task = CommandTask::builder().args(["sleep", "5"]).build().unwrap();
    commander.submit(Arc::clone(&task), listener).unwrap();
    // A second submission must not rebind the listener.
    commander.submit(Arc::clone(&task), late_listener).unwrap();

    assert!(matches!(next_event(&mut rx).await, Event::Pre(_)));
    task.cancel();

    let events = drain_events(&mut rx, Duration::from_millis(500)).await;
    assert_eq!(events, vec![Event::Cancelled]);
    assert!(drain_events(&mut late_rx, Duration::from_millis(200)).await.is_empty());
}

#[tokio::test]
async fn repeated_cancel_emits_one_cancelled_event() {
    let commander = unbounded();
    let (listener, mut rx) = recording_listener();

    let task = CommandTask::builder().args(["sleep", "5"]).build().unwrap();
    commander.submit(Arc::clone(&task), listener).unwrap();

    assert!(matches!(next_event(&mut rx).await, Event::Pre(_)));

    task.cancel();
    task.cancel();
    task.cancel();

    let events = drain_events(&mut rx, Duration::from_millis(500)).await;
    assert_eq!(events, vec![Event::Cancelled]);
}

#[tokio::test]
async fn cancel_task_only_affects_queued_tasks() {
    let commander = unbounded();
    let (listener, _rx) = recording_listener();

    let queued = CommandTask::builder().args(["sleep", "5"]).build().unwrap();
    commander.submit(Arc::clone(&queued), listener).unwrap();

    let stranger = CommandTask::builder().args(["sleep", "5"]).build().unwrap();
    commander.cancel_task(&stranger);
    assert_eq!(stranger.state(), TaskState::Waiting);

    commander.cancel_task(&queued);
    assert_eq!(queued.state(), TaskState::Interrupted);
    assert_eq!(commander.queue_len(), 0);
}

#[tokio::test]
async fn cancel_all_drains_the_queue() {
    let commander = unbounded();
    let (listener, mut rx) = recording_listener();

    let mut tasks = Vec::new();
    for _ in 0..3 {
        let task = CommandTask::builder().args(["sleep", "5"]).build().unwrap();
        commander.submit(Arc::clone(&task), listener.clone()).unwrap();
        tasks.push(task);
    }
    assert_eq!(commander.queue_len(), 3);

    commander.cancel_all();
    assert_eq!(commander.queue_len(), 0);
    for task in &tasks {
        assert_eq!(task.state(), TaskState::Interrupted);
    }

    let events = drain_events(&mut rx, Duration::from_millis(500)).await;
    assert_eq!(
        events.iter().filter(|e| matches!(e, Event::Cancelled)).count(),
        3
    );
}
