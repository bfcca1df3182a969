//! Watch mode orchestration.
//!
//! [`WatchOrchestrator`] subscribes to the engine's watcher and turns its event
//! stream into user-facing progress lines:
//!
//! - file changes are collected in a [`ChangeBuffer`] and announced when the next
//!   rebuild starts
//! - every finished or failed rebuild has its result handle closed before it is
//!   reported
//! - a failed rebuild is reported and watching continues
//!
//! Shutdown is requested through a [`ShutdownTrigger`]. The orchestrator then
//! closes the watcher and returns the exit code the process should exit with.
//! Events are handled one at a time on a single task, and a change arriving
//! during a rebuild is simply buffered for the next one.

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::console::Console;
use crate::engine::{ChangeKind, CloseGuard, Engine, EngineError, ResultHandle, WatchEvent, Watcher};
use crate::options::BuildConfig;
use crate::report::{format_duration, relative_id};

/// Lifecycle of a [`WatchOrchestrator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
  /// Created, not yet subscribed.
  Idle,
  /// Subscribed and consuming events.
  Running,
  /// Shutdown requested, watcher being closed.
  Closing,
  /// Watcher closed, exit code decided.
  Terminated,
}

/// Changed file ids collected between two rebuild starts, in arrival order.
#[derive(Debug, Clone, Default)]
pub struct ChangeBuffer {
  ids: Vec<String>,
}

impl ChangeBuffer {
  pub fn push(&mut self, id: String) {
    self.ids.push(id);
  }

  pub fn is_empty(&self) -> bool {
    self.ids.is_empty()
  }

  pub fn as_slice(&self) -> &[String] {
    &self.ids
  }

  /// Takes every buffered id, leaving the buffer empty.
  pub fn drain(&mut self) -> Vec<String> {
    std::mem::take(&mut self.ids)
  }
}

/// Requests a watch session to stop. Cheap to clone; extra requests after the
/// first one are ignored.
#[derive(Debug, Clone)]
pub struct ShutdownTrigger {
  tx: mpsc::UnboundedSender<Option<i32>>,
}

impl ShutdownTrigger {
  /// Asks the orchestrator to close the watcher and exit with `code` (0 if `None`).
  pub fn request(&self, code: Option<i32>) {
    if self.tx.send(code).is_err() {
      debug!("shutdown requested after the watch loop ended");
    }
  }
}

/// Receiving side of a [`ShutdownTrigger`], owned by the orchestrator.
#[derive(Debug)]
pub struct ShutdownHook {
  rx: mpsc::UnboundedReceiver<Option<i32>>,
  open: bool,
}

impl ShutdownHook {
  async fn recv(&mut self) -> Option<Option<i32>> {
    let request = self.rx.recv().await;
    if request.is_none() {
      self.open = false;
    }
    request
  }
}

pub fn shutdown_channel() -> (ShutdownTrigger, ShutdownHook) {
  let (tx, rx) = mpsc::unbounded_channel();
  (ShutdownTrigger { tx }, ShutdownHook { rx, open: true })
}

pub struct WatchOrchestrator<C: Console> {
  state: WatchState,
  watcher: Option<CloseGuard<dyn Watcher>>,
  changes: ChangeBuffer,
  console: C,
  shutdown_hook: ShutdownHook,
  exit_code: Option<i32>,
}

impl<C: Console> WatchOrchestrator<C> {
  pub fn new(console: C, shutdown_hook: ShutdownHook) -> Self {
    Self {
      state: WatchState::Idle,
      watcher: None,
      changes: ChangeBuffer::default(),
      console,
      shutdown_hook,
      exit_code: None,
    }
  }

  pub fn state(&self) -> WatchState {
    self.state
  }

  /// Changed ids waiting to be announced at the next rebuild start.
  pub fn pending_changes(&self) -> &[String] {
    self.changes.as_slice()
  }

  /// Subscribes to the engine and moves to [`WatchState::Running`].
  ///
  /// Calling this on an orchestrator that is not idle is an error.
  pub async fn start(&mut self, engine: &dyn Engine, configs: Vec<BuildConfig>) -> Result<(), EngineError> {
    if self.state != WatchState::Idle {
      return Err(EngineError::Closed("watch orchestrator"));
    }

    info!(configs = configs.len(), "starting watch mode");
    let watcher = engine.watch(configs).await?;
    self.watcher = Some(CloseGuard::new(watcher, "watcher"));
    self.state = WatchState::Running;

    self.console.log("Waiting for changes...");
    Ok(())
  }

  /// Handles a single watch event.
  pub async fn handle_event(&mut self, event: WatchEvent) {
    if self.state != WatchState::Running {
      debug!(state = ?self.state, "ignoring watch event");
      if let WatchEvent::BundleEnd { result, .. } | WatchEvent::Error { result, .. } = event {
        close_result(result).await;
      }
      return;
    }

    match event {
      WatchEvent::Change {
        id,
        kind: ChangeKind::Update,
      } => {
        debug!(id = %id, "file changed");
        self.changes.push(id);
      }
      WatchEvent::Change { id, kind } => {
        debug!(id = %id, kind = ?kind, "ignoring change");
      }
      WatchEvent::BundleStart => {
        let changed = self.changes.drain();
        if !changed.is_empty() {
          let ids: Vec<String> = changed.iter().map(|id| relative_id(id)).collect();
          self.console.log(&format!("Found {} changed, rebuilding...", ids.join(", ")));
        }
      }
      WatchEvent::BundleEnd {
        result,
        output,
        duration,
      } => {
        close_result(result).await;
        let took = format_duration(duration);
        match output.first() {
          Some(first) => self.console.success(&format!("Rebuilt {} in {}.", relative_id(first), took)),
          None => self.console.success(&format!("Rebuilt in {}.", took)),
        }
      }
      WatchEvent::Error { result, error } => {
        close_result(result).await;
        self.console.error(&error.to_string());
      }
    }
  }

  /// Closes the watcher and settles on an exit code.
  ///
  /// Only the first call has an effect; later calls return the exit code chosen
  /// by the first one. Failures while closing are logged and ignored.
  pub async fn shutdown(&mut self, code: Option<i32>) -> i32 {
    if let Some(code) = self.exit_code {
      debug!(code, "shutdown already requested");
      return code;
    }

    let code = code.unwrap_or(0);
    self.exit_code = Some(code);
    self.state = WatchState::Closing;
    info!(code, "stopping watch mode");

    if let Some(mut watcher) = self.watcher.take()
      && let Err(e) = watcher.close().await
    {
      warn!(error = %e, "failed to close watcher");
    }

    self.state = WatchState::Terminated;
    code
  }

  /// Consumes events until shutdown is requested or the watcher stops.
  ///
  /// Returns the exit code to terminate the process with.
  pub async fn run(mut self) -> i32 {
    loop {
      let Some(watcher) = self.watcher.as_mut().and_then(|w| w.get_mut()) else {
        return self.shutdown(None).await;
      };

      tokio::select! {
        biased;

        request = self.shutdown_hook.recv(), if self.shutdown_hook.open => {
          if let Some(code) = request {
            return self.shutdown(code).await;
          }
        }

        event = watcher.next_event() => match event {
          Some(event) => self.handle_event(event).await,
          None => {
            debug!("watcher stopped emitting events");
            return self.shutdown(None).await;
          }
        },
      }
    }
  }
}

async fn close_result(mut result: Box<dyn ResultHandle>) {
  if let Err(e) = result.close().await {
    warn!(error = %e, "failed to close build result");
  }
}

#[cfg(test)]
mod tests {
  use std::time::Duration;

  use async_trait::async_trait;
  use tracing_test::traced_test;

  use super::*;
  use crate::engine::Close;
  use crate::engine::testutil::{Call, MockEngine, MockResult, Recorder, RecordingConsole};

  fn change(id: &str) -> WatchEvent {
    WatchEvent::Change {
      id: id.to_string(),
      kind: ChangeKind::Update,
    }
  }

  fn result(recorder: &Recorder, label: &str) -> Box<dyn ResultHandle> {
    Box::new(MockResult {
      label: label.to_string(),
      recorder: recorder.clone(),
    })
  }

  async fn started(recorder: &Recorder) -> (WatchOrchestrator<RecordingConsole>, ShutdownTrigger) {
    let engine = MockEngine::new(recorder.clone());
    let (trigger, hook) = shutdown_channel();
    let mut orchestrator = WatchOrchestrator::new(RecordingConsole(recorder.clone()), hook);
    orchestrator.start(&engine, vec![BuildConfig::default()]).await.unwrap();
    (orchestrator, trigger)
  }

  fn logs(recorder: &Recorder) -> Vec<String> {
    recorder
      .calls()
      .into_iter()
      .filter_map(|c| match c {
        Call::Log(msg) => Some(msg),
        _ => None,
      })
      .collect()
  }

  #[tokio::test]
  async fn start_subscribes_and_runs() {
    let recorder = Recorder::default();
    let (orchestrator, _trigger) = started(&recorder).await;

    assert_eq!(orchestrator.state(), WatchState::Running);
    assert_eq!(
      recorder.calls(),
      vec![Call::Watch(1), Call::Log("Waiting for changes...".into())]
    );
  }

  #[tokio::test]
  async fn changes_are_announced_in_order_then_cleared() {
    let recorder = Recorder::default();
    let (mut orchestrator, _trigger) = started(&recorder).await;

    orchestrator.handle_event(change("a")).await;
    orchestrator.handle_event(change("b")).await;
    assert_eq!(orchestrator.pending_changes(), ["a", "b"]);

    orchestrator.handle_event(WatchEvent::BundleStart).await;
    assert!(orchestrator.pending_changes().is_empty());

    orchestrator.handle_event(change("c")).await;
    orchestrator.handle_event(WatchEvent::BundleStart).await;

    assert_eq!(
      logs(&recorder),
      [
        "Waiting for changes...",
        "Found a, b changed, rebuilding...",
        "Found c changed, rebuilding..."
      ]
    );
  }

  #[tokio::test]
  async fn duplicate_changes_are_kept() {
    let recorder = Recorder::default();
    let (mut orchestrator, _trigger) = started(&recorder).await;

    orchestrator.handle_event(change("a")).await;
    orchestrator.handle_event(change("a")).await;

    assert_eq!(orchestrator.pending_changes(), ["a", "a"]);
  }

  #[tokio::test]
  async fn bundle_start_without_changes_is_silent() {
    let recorder = Recorder::default();
    let (mut orchestrator, _trigger) = started(&recorder).await;

    orchestrator.handle_event(WatchEvent::BundleStart).await;

    assert_eq!(logs(&recorder), ["Waiting for changes..."]);
  }

  #[tokio::test]
  async fn only_updates_are_buffered() {
    let recorder = Recorder::default();
    let (mut orchestrator, _trigger) = started(&recorder).await;

    orchestrator
      .handle_event(WatchEvent::Change {
        id: "new.js".into(),
        kind: ChangeKind::Create,
      })
      .await;
    orchestrator
      .handle_event(WatchEvent::Change {
        id: "gone.js".into(),
        kind: ChangeKind::Delete,
      })
      .await;

    assert!(orchestrator.pending_changes().is_empty());
  }

  #[tokio::test]
  async fn bundle_end_closes_result_before_reporting() {
    let recorder = Recorder::default();
    let (mut orchestrator, _trigger) = started(&recorder).await;

    orchestrator
      .handle_event(WatchEvent::BundleEnd {
        result: result(&recorder, "cycle-1"),
        output: vec!["dist/main.js".into(), "dist/chunk.js".into()],
        duration: Duration::from_millis(12),
      })
      .await;

    let calls = recorder.calls();
    assert_eq!(
      &calls[2..],
      [
        Call::ResultClose("cycle-1".into()),
        Call::Success("Rebuilt dist/main.js in 12.00 ms.".into()),
      ]
    );
  }

  #[tokio::test]
  async fn bundle_end_without_output() {
    let recorder = Recorder::default();
    let (mut orchestrator, _trigger) = started(&recorder).await;

    orchestrator
      .handle_event(WatchEvent::BundleEnd {
        result: result(&recorder, "cycle-1"),
        output: vec![],
        duration: Duration::from_millis(1500),
      })
      .await;

    assert_eq!(recorder.calls().last(), Some(&Call::Success("Rebuilt in 1.50 s.".into())));
  }

  #[tokio::test]
  async fn error_closes_result_and_keeps_running() {
    let recorder = Recorder::default();
    let (mut orchestrator, _trigger) = started(&recorder).await;

    orchestrator
      .handle_event(WatchEvent::Error {
        result: result(&recorder, "cycle-1"),
        error: EngineError::Build("unexpected token".into()),
      })
      .await;

    assert_eq!(orchestrator.state(), WatchState::Running);
    let calls = recorder.calls();
    assert_eq!(
      &calls[2..],
      [
        Call::ResultClose("cycle-1".into()),
        Call::Error("unexpected token".into()),
      ]
    );
  }

  #[tokio::test]
  async fn shutdown_is_idempotent() {
    let recorder = Recorder::default();
    let (mut orchestrator, _trigger) = started(&recorder).await;

    assert_eq!(orchestrator.shutdown(Some(3)).await, 3);
    assert_eq!(orchestrator.state(), WatchState::Terminated);
    assert_eq!(orchestrator.shutdown(Some(7)).await, 3);

    assert_eq!(recorder.count(|c| *c == Call::WatcherClose), 1);
  }

  #[tokio::test]
  async fn shutdown_defaults_to_zero() {
    let recorder = Recorder::default();
    let (mut orchestrator, _trigger) = started(&recorder).await;

    assert_eq!(orchestrator.shutdown(None).await, 0);
  }

  #[tokio::test]
  async fn events_after_shutdown_still_close_results() {
    let recorder = Recorder::default();
    let (mut orchestrator, _trigger) = started(&recorder).await;
    orchestrator.shutdown(None).await;

    orchestrator
      .handle_event(WatchEvent::BundleEnd {
        result: result(&recorder, "late"),
        output: vec!["dist/main.js".into()],
        duration: Duration::ZERO,
      })
      .await;

    assert_eq!(recorder.count(|c| *c == Call::ResultClose("late".into())), 1);
    assert_eq!(recorder.count(|c| matches!(c, Call::Success(_))), 0);
  }

  #[tokio::test]
  async fn run_processes_events_until_shutdown() {
    let recorder = Recorder::default();
    let engine = MockEngine::new(recorder.clone());
    let events = engine.event_sender();
    let (trigger, hook) = shutdown_channel();
    let mut orchestrator = WatchOrchestrator::new(RecordingConsole(recorder.clone()), hook);
    orchestrator.start(&engine, vec![BuildConfig::default()]).await.unwrap();

    events.send(change("src/a.js")).unwrap();
    events.send(WatchEvent::BundleStart).unwrap();
    events
      .send(WatchEvent::BundleEnd {
        result: result(&recorder, "cycle-1"),
        output: vec!["dist/a.js".into()],
        duration: Duration::from_millis(5),
      })
      .unwrap();

    let handle = tokio::spawn(orchestrator.run());
    // wait until the cycle has been reported
    for _ in 0..100 {
      if recorder.count(|c| matches!(c, Call::Success(_))) == 1 {
        break;
      }
      tokio::task::yield_now().await;
    }
    trigger.request(Some(2));
    trigger.request(Some(9));

    assert_eq!(handle.await.unwrap(), 2);
    assert_eq!(recorder.count(|c| *c == Call::WatcherClose), 1);
    assert_eq!(
      recorder.calls()[2..],
      [
        Call::Log("Found src/a.js changed, rebuilding...".into()),
        Call::ResultClose("cycle-1".into()),
        Call::Success("Rebuilt dist/a.js in 5.00 ms.".into()),
        Call::WatcherClose,
      ]
    );
  }

  #[tokio::test]
  async fn run_ends_when_watcher_stops() {
    let recorder = Recorder::default();
    let engine = MockEngine::new(recorder.clone());
    let events = engine.event_sender();
    let (_trigger, hook) = shutdown_channel();
    let mut orchestrator = WatchOrchestrator::new(RecordingConsole(recorder.clone()), hook);
    orchestrator.start(&engine, vec![]).await.unwrap();
    drop(events);

    assert_eq!(orchestrator.run().await, 0);
    assert_eq!(recorder.count(|c| *c == Call::WatcherClose), 1);
  }

  #[tokio::test]
  async fn run_keeps_going_when_all_triggers_are_dropped() {
    let recorder = Recorder::default();
    let engine = MockEngine::new(recorder.clone());
    let events = engine.event_sender();
    let (trigger, hook) = shutdown_channel();
    let mut orchestrator = WatchOrchestrator::new(RecordingConsole(recorder.clone()), hook);
    orchestrator.start(&engine, vec![]).await.unwrap();
    drop(trigger);

    let handle = tokio::spawn(orchestrator.run());
    events.send(change("a.js")).unwrap();
    events.send(WatchEvent::BundleStart).unwrap();
    drop(events);

    assert_eq!(handle.await.unwrap(), 0);
    assert!(logs(&recorder).contains(&"Found a.js changed, rebuilding...".to_string()));
  }

  #[derive(Debug)]
  struct FailingWatcher;

  #[async_trait]
  impl Watcher for FailingWatcher {
    async fn next_event(&mut self) -> Option<WatchEvent> {
      std::future::pending().await
    }
  }

  #[async_trait]
  impl Close for FailingWatcher {
    async fn close(&mut self) -> Result<(), EngineError> {
      Err(EngineError::Build("already gone".into()))
    }
  }

  struct FailingEngine;

  #[async_trait]
  impl Engine for FailingEngine {
    async fn open(
      &self,
      _input: &crate::options::InputOptions,
    ) -> Result<Box<dyn crate::engine::BuildSession>, EngineError> {
      Err(EngineError::Build("unused".into()))
    }

    async fn watch(&self, _configs: Vec<BuildConfig>) -> Result<Box<dyn Watcher>, EngineError> {
      Ok(Box::new(FailingWatcher))
    }
  }

  #[tokio::test]
  #[traced_test]
  async fn watcher_close_failure_is_swallowed() {
    let recorder = Recorder::default();
    let (_trigger, hook) = shutdown_channel();
    let mut orchestrator = WatchOrchestrator::new(RecordingConsole(recorder.clone()), hook);
    orchestrator.start(&FailingEngine, vec![]).await.unwrap();

    assert_eq!(orchestrator.shutdown(Some(1)).await, 1);
    assert_eq!(orchestrator.state(), WatchState::Terminated);
    assert!(logs_contain("failed to close watcher"));
  }

  #[tokio::test]
  async fn start_twice_is_rejected() {
    let recorder = Recorder::default();
    let (mut orchestrator, _trigger) = started(&recorder).await;
    let engine = MockEngine::new(recorder.clone());

    assert!(orchestrator.start(&engine, vec![]).await.is_err());
    assert_eq!(recorder.count(|c| matches!(c, Call::Watch(_))), 1);
  }
}
