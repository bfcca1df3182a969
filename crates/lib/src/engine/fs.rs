//! Pass-through engine.
//!
//! Copies entry modules to the output location unchanged. Script entries
//! become chunks named after the entry, everything else is emitted as an asset
//! under its original file name. There is no module resolution, transformation
//! or code generation here: this engine exists so the orchestration layer can
//! be driven end to end from the command line.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use notify::event::ModifyKind;
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher as _};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{
  BuildOutput, BuildSession, ChangeKind, Close, Engine, EngineError, OutputItem, WatchEvent, Watcher,
};
use crate::options::{BuildConfig, InputOptions, OutputOptions};
use crate::session::run_sequential;

const DEFAULT_DIR: &str = "dist";
const DEFAULT_ENTRY_FILE_NAMES: &str = "[name].js";
const SCRIPT_EXTENSIONS: &[&str] = &["js", "mjs", "cjs", "ts", "mts", "cts", "jsx", "tsx"];

#[derive(Debug, Clone, Copy)]
pub struct PassthroughEngine {
  /// How long to wait for more file changes before starting a rebuild.
  debounce: Duration,
}

impl PassthroughEngine {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_debounce(debounce: Duration) -> Self {
    Self { debounce }
  }
}

impl Default for PassthroughEngine {
  fn default() -> Self {
    Self {
      debounce: Duration::from_millis(50),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Entry {
  name: String,
  path: PathBuf,
}

impl Entry {
  fn new(name: Option<&str>, path: &str) -> Self {
    let path = PathBuf::from(path);
    let name = match name {
      Some(name) => name.to_string(),
      None => path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "index".to_string()),
    };
    Self { name, path }
  }

  fn is_script(&self) -> bool {
    self
      .path
      .extension()
      .and_then(|ext| ext.to_str())
      .is_some_and(|ext| SCRIPT_EXTENSIONS.contains(&ext))
  }
}

fn invalid(key: &str, message: &str) -> EngineError {
  EngineError::InvalidOption {
    key: key.to_string(),
    message: message.to_string(),
  }
}

/// Reads the `input` option: a path, an array of paths, or an object of name to path.
fn parse_entries(input: &InputOptions) -> Result<Vec<Entry>, EngineError> {
  match input.get("input") {
    None | Some(Value::Null) => Err(invalid("input", "no entry module specified")),
    Some(Value::String(path)) => Ok(vec![Entry::new(None, path)]),
    Some(Value::Array(items)) => items
      .iter()
      .map(|item| {
        item
          .as_str()
          .map(|path| Entry::new(None, path))
          .ok_or_else(|| invalid("input", "expected an array of paths"))
      })
      .collect(),
    Some(Value::Object(map)) => map
      .iter()
      .map(|(name, item)| {
        item
          .as_str()
          .map(|path| Entry::new(Some(name), path))
          .ok_or_else(|| invalid("input", "expected an object of name to path"))
      })
      .collect(),
    Some(_) => Err(invalid("input", "expected a path, an array of paths, or an object")),
  }
}

async fn resolve_entries(input: &InputOptions) -> Result<Vec<Entry>, EngineError> {
  let entries = parse_entries(input)?;
  for entry in &entries {
    match tokio::fs::metadata(&entry.path).await {
      Ok(meta) if meta.is_file() => {}
      Ok(_) => return Err(EngineError::EntryNotFound(entry.path.clone())),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
        return Err(EngineError::EntryNotFound(entry.path.clone()));
      }
      Err(source) => {
        return Err(EngineError::Io {
          path: entry.path.clone(),
          source,
        });
      }
    }
  }
  Ok(entries)
}

/// Directory the files of `output` are written to.
fn output_dir(output: &OutputOptions) -> PathBuf {
  match output.file() {
    Some(file) => Path::new(file)
      .parent()
      .filter(|p| !p.as_os_str().is_empty())
      .map(Path::to_path_buf)
      .unwrap_or_else(|| PathBuf::from(".")),
    None => PathBuf::from(output.dir().unwrap_or(DEFAULT_DIR)),
  }
}

async fn generate_items(entries: &[Entry], output: &OutputOptions) -> Result<Vec<OutputItem>, EngineError> {
  let single_file = match output.file() {
    Some(_) if entries.len() > 1 => {
      return Err(invalid("file", "multiple entries need `output.dir` instead"));
    }
    Some(file) => Path::new(file).file_name().map(|n| n.to_string_lossy().into_owned()),
    None => None,
  };
  let template = output.get_str("entryFileNames").unwrap_or(DEFAULT_ENTRY_FILE_NAMES);

  let mut items = Vec::with_capacity(entries.len());
  for entry in entries {
    let bytes = tokio::fs::read(&entry.path).await.map_err(|source| EngineError::Io {
      path: entry.path.clone(),
      source,
    })?;

    if entry.is_script() {
      let file_name = single_file
        .clone()
        .unwrap_or_else(|| template.replace("[name]", &entry.name));
      items.push(OutputItem::Chunk {
        file_name,
        code: String::from_utf8_lossy(&bytes).into_owned(),
      });
    } else {
      let file_name = entry
        .path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| entry.name.clone());
      items.push(OutputItem::Asset { file_name, source: bytes });
    }
  }

  Ok(items)
}

/// A session over a fixed set of entry modules.
#[derive(Debug)]
pub struct PassthroughSession {
  entries: Vec<Entry>,
  closed: bool,
}

impl PassthroughSession {
  fn ensure_open(&self) -> Result<(), EngineError> {
    if self.closed {
      Err(EngineError::Closed("build session"))
    } else {
      Ok(())
    }
  }
}

#[async_trait]
impl BuildSession for PassthroughSession {
  async fn write(&mut self, output: &OutputOptions) -> Result<BuildOutput, EngineError> {
    self.ensure_open()?;
    let items = generate_items(&self.entries, output).await?;

    let dir = output_dir(output);
    tokio::fs::create_dir_all(&dir)
      .await
      .map_err(|source| EngineError::Io {
        path: dir.clone(),
        source,
      })?;

    for item in &items {
      let path = dir.join(item.file_name());
      tokio::fs::write(&path, item.bytes())
        .await
        .map_err(|source| EngineError::Io { path: path.clone(), source })?;
      debug!(path = %path.display(), size = item.size(), "wrote output file");
    }

    Ok(BuildOutput { output: items })
  }

  async fn generate(&mut self, output: &OutputOptions) -> Result<BuildOutput, EngineError> {
    self.ensure_open()?;
    let items = generate_items(&self.entries, output).await?;
    Ok(BuildOutput { output: items })
  }
}

#[async_trait]
impl Close for PassthroughSession {
  async fn close(&mut self) -> Result<(), EngineError> {
    self.closed = true;
    Ok(())
  }
}

#[async_trait]
impl Engine for PassthroughEngine {
  async fn open(&self, input: &InputOptions) -> Result<Box<dyn BuildSession>, EngineError> {
    let entries = resolve_entries(input).await?;
    debug!(entries = entries.len(), "opened build session");
    Ok(Box::new(PassthroughSession { entries, closed: false }))
  }

  async fn watch(&self, configs: Vec<BuildConfig>) -> Result<Box<dyn Watcher>, EngineError> {
    let mut paths = Vec::new();
    for config in &configs {
      paths.extend(resolve_entries(&config.input).await?.into_iter().map(|e| e.path));
    }

    let (fs_tx, fs_rx) = mpsc::unbounded_channel();
    let mut fs_watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| match res {
      Ok(event) => {
        if let Some(kind) = change_kind(&event.kind) {
          for path in event.paths {
            let _ = fs_tx.send((path, kind));
          }
        }
      }
      Err(e) => warn!(error = %e, "file watcher error"),
    })?;

    for path in &paths {
      fs_watcher.watch(path, RecursiveMode::NonRecursive)?;
    }
    debug!(files = paths.len(), "watching entry modules");

    let (tx, rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(rebuild_loop(*self, configs, fs_rx, tx));

    Ok(Box::new(PassthroughWatcher {
      rx,
      fs_watcher: Some(fs_watcher),
      task: Some(task),
    }))
  }
}

fn change_kind(kind: &EventKind) -> Option<ChangeKind> {
  match kind {
    EventKind::Create(_) => Some(ChangeKind::Create),
    EventKind::Modify(ModifyKind::Metadata(_)) => None,
    EventKind::Modify(_) => Some(ChangeKind::Update),
    EventKind::Remove(_) => Some(ChangeKind::Delete),
    _ => None,
  }
}

type EventSender = mpsc::UnboundedSender<WatchEvent>;
type SendClosed = mpsc::error::SendError<WatchEvent>;

async fn rebuild_loop(
  engine: PassthroughEngine,
  configs: Vec<BuildConfig>,
  mut fs_rx: mpsc::UnboundedReceiver<(PathBuf, ChangeKind)>,
  tx: EventSender,
) {
  if run_cycle(&engine, &configs, &tx).await.is_err() {
    return;
  }

  while let Some(first) = fs_rx.recv().await {
    if send_change(&tx, first).is_err() {
      return;
    }

    // collect everything that arrives within the debounce window
    loop {
      match tokio::time::timeout(engine.debounce, fs_rx.recv()).await {
        Ok(Some(change)) => {
          if send_change(&tx, change).is_err() {
            return;
          }
        }
        Ok(None) => return,
        Err(_) => break,
      }
    }

    if run_cycle(&engine, &configs, &tx).await.is_err() {
      return;
    }
  }
}

fn send_change(tx: &EventSender, (path, kind): (PathBuf, ChangeKind)) -> Result<(), SendClosed> {
  tx.send(WatchEvent::Change {
    id: path.display().to_string(),
    kind,
  })
}

async fn run_cycle(engine: &PassthroughEngine, configs: &[BuildConfig], tx: &EventSender) -> Result<(), SendClosed> {
  tx.send(WatchEvent::BundleStart)?;
  let started = Instant::now();

  let event = match build_all(engine, configs).await {
    Ok(output) => WatchEvent::BundleEnd {
      result: Box::new(CycleResult),
      output,
      duration: started.elapsed(),
    },
    Err(error) => WatchEvent::Error {
      result: Box::new(CycleResult),
      error,
    },
  };
  tx.send(event)
}

/// Builds every config and returns the paths of all written files.
async fn build_all(engine: &PassthroughEngine, configs: &[BuildConfig]) -> Result<Vec<String>, EngineError> {
  let results = run_sequential(engine, configs)
    .await
    .map_err(|e| EngineError::Build(e.to_string()))?;

  let outputs = configs.iter().flat_map(|config| config.output.iter());
  Ok(
    outputs
      .zip(results)
      .flat_map(|(options, result)| {
        let dir = output_dir(options);
        result
          .output
          .into_iter()
          .map(move |item| dir.join(item.file_name()).display().to_string())
      })
      .collect(),
  )
}

/// Nothing is retained between cycles, so there is nothing to release.
#[derive(Debug)]
struct CycleResult;

#[async_trait]
impl Close for CycleResult {
  async fn close(&mut self) -> Result<(), EngineError> {
    Ok(())
  }
}

pub struct PassthroughWatcher {
  rx: mpsc::UnboundedReceiver<WatchEvent>,
  fs_watcher: Option<RecommendedWatcher>,
  task: Option<JoinHandle<()>>,
}

#[async_trait]
impl Watcher for PassthroughWatcher {
  async fn next_event(&mut self) -> Option<WatchEvent> {
    self.rx.recv().await
  }
}

#[async_trait]
impl Close for PassthroughWatcher {
  async fn close(&mut self) -> Result<(), EngineError> {
    drop(self.fs_watcher.take());
    if let Some(task) = self.task.take() {
      task.abort();
      let _ = task.await;
    }
    self.rx.close();
    // events already queued belong to cycles nobody is listening to anymore
    while let Ok(event) = self.rx.try_recv() {
      if let WatchEvent::BundleEnd { mut result, .. } | WatchEvent::Error { mut result, .. } = event
        && let Err(e) = result.close().await
      {
        warn!(error = %e, "failed to close queued build result");
      }
    }
    Ok(())
  }
}
