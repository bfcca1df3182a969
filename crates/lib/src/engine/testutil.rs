//! Recording test doubles for the engine contract.
//!
//! Every interaction with the engine and the console is appended to a shared
//! [`Recorder`], so tests can assert on counts and on relative ordering.
//!
//! Failure injection is driven by the options themselves: an input with
//! `"fail": true` fails to open, an output with `"fail": true` fails to write.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{BuildOutput, BuildSession, Close, Engine, EngineError, OutputItem, WatchEvent, Watcher};
use crate::console::Console;
use crate::options::{BuildConfig, InputOptions, OutputOptions};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
  Open(String),
  Write { session: String, output: String },
  Generate { session: String },
  Close(String),
  Watch(usize),
  WatcherClose,
  ResultClose(String),
  Log(String),
  Success(String),
  Error(String),
}

#[derive(Debug, Clone, Default)]
pub struct Recorder {
  calls: Arc<Mutex<Vec<Call>>>,
  open_now: Arc<AtomicUsize>,
  max_open: Arc<AtomicUsize>,
}

impl Recorder {
  pub fn push(&self, call: Call) {
    self.calls.lock().unwrap().push(call);
  }

  pub fn calls(&self) -> Vec<Call> {
    self.calls.lock().unwrap().clone()
  }

  pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
    self.calls.lock().unwrap().iter().filter(|c| pred(c)).count()
  }

  /// Highest number of sessions that were open at the same time.
  pub fn max_open(&self) -> usize {
    self.max_open.load(Ordering::SeqCst)
  }

  fn session_opened(&self) {
    let now = self.open_now.fetch_add(1, Ordering::SeqCst) + 1;
    self.max_open.fetch_max(now, Ordering::SeqCst);
  }

  fn session_closed(&self) {
    self.open_now.fetch_sub(1, Ordering::SeqCst);
  }
}

fn label(value: Option<&str>) -> String {
  value.unwrap_or("?").to_string()
}

fn fails(map: &serde_json::Map<String, serde_json::Value>) -> bool {
  map.get("fail").and_then(serde_json::Value::as_bool).unwrap_or(false)
}

/// Engine double. Sessions are named after the input's `name` option, outputs
/// after the output's `file` option.
pub struct MockEngine {
  pub recorder: Recorder,
  events: Mutex<Option<mpsc::UnboundedReceiver<WatchEvent>>>,
}

impl MockEngine {
  pub fn new(recorder: Recorder) -> Self {
    Self {
      recorder,
      events: Mutex::new(None),
    }
  }

  /// Returns the sender feeding the next watcher created by this engine.
  pub fn event_sender(&self) -> mpsc::UnboundedSender<WatchEvent> {
    let (tx, rx) = mpsc::unbounded_channel();
    *self.events.lock().unwrap() = Some(rx);
    tx
  }
}

#[async_trait]
impl Engine for MockEngine {
  async fn open(&self, input: &InputOptions) -> Result<Box<dyn BuildSession>, EngineError> {
    let name = label(input.get_str("name"));
    self.recorder.push(Call::Open(name.clone()));
    if fails(&input.0) {
      return Err(EngineError::Build(format!("cannot open {}", name)));
    }
    self.recorder.session_opened();
    Ok(Box::new(MockSession {
      name,
      recorder: self.recorder.clone(),
      closed: false,
    }))
  }

  async fn watch(&self, configs: Vec<BuildConfig>) -> Result<Box<dyn Watcher>, EngineError> {
    self.recorder.push(Call::Watch(configs.len()));
    let rx = self
      .events
      .lock()
      .unwrap()
      .take()
      .unwrap_or_else(|| mpsc::unbounded_channel().1);
    Ok(Box::new(MockWatcher {
      rx,
      recorder: self.recorder.clone(),
    }))
  }
}

pub struct MockSession {
  name: String,
  recorder: Recorder,
  closed: bool,
}

impl MockSession {
  fn output_for(&self, output: &OutputOptions) -> BuildOutput {
    BuildOutput {
      output: vec![OutputItem::Chunk {
        file_name: label(output.file()),
        code: format!("// {}", self.name),
      }],
    }
  }
}

#[async_trait]
impl BuildSession for MockSession {
  async fn write(&mut self, output: &OutputOptions) -> Result<BuildOutput, EngineError> {
    self.recorder.push(Call::Write {
      session: self.name.clone(),
      output: label(output.file()),
    });
    if fails(&output.0) {
      return Err(EngineError::Build(format!("cannot write {}", label(output.file()))));
    }
    Ok(self.output_for(output))
  }

  async fn generate(&mut self, output: &OutputOptions) -> Result<BuildOutput, EngineError> {
    self.recorder.push(Call::Generate {
      session: self.name.clone(),
    });
    if fails(&output.0) {
      return Err(EngineError::Build("cannot generate".to_string()));
    }
    Ok(self.output_for(output))
  }
}

#[async_trait]
impl Close for MockSession {
  async fn close(&mut self) -> Result<(), EngineError> {
    self.recorder.push(Call::Close(self.name.clone()));
    if !self.closed {
      self.closed = true;
      self.recorder.session_closed();
    }
    Ok(())
  }
}

pub struct MockWatcher {
  rx: mpsc::UnboundedReceiver<WatchEvent>,
  recorder: Recorder,
}

#[async_trait]
impl Watcher for MockWatcher {
  async fn next_event(&mut self) -> Option<WatchEvent> {
    self.rx.recv().await
  }
}

#[async_trait]
impl Close for MockWatcher {
  async fn close(&mut self) -> Result<(), EngineError> {
    self.recorder.push(Call::WatcherClose);
    self.rx.close();
    Ok(())
  }
}

/// Result handle double that records its close under `label`.
#[derive(Debug)]
pub struct MockResult {
  pub label: String,
  pub recorder: Recorder,
}

#[async_trait]
impl Close for MockResult {
  async fn close(&mut self) -> Result<(), EngineError> {
    self.recorder.push(Call::ResultClose(self.label.clone()));
    Ok(())
  }
}

/// Console double writing into the same recorder as the engine.
#[derive(Debug, Clone)]
pub struct RecordingConsole(pub Recorder);

impl Console for RecordingConsole {
  fn log(&self, message: &str) {
    self.0.push(Call::Log(message.to_string()));
  }

  fn success(&self, message: &str) {
    self.0.push(Call::Success(message.to_string()));
  }

  fn error(&self, message: &str) {
    self.0.push(Call::Error(message.to_string()));
  }
}
