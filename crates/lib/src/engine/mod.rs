//! Contract with the bundling engine.
//!
//! The orchestrator never looks inside a build: it opens sessions, asks them to
//! write outputs, subscribes to watch events, and closes every handle it is
//! given. Those interactions are expressed by the traits in this module.
//!
//! # Submodules
//!
//! - [`fs`] - Pass-through engine used by the `rolldown` binary
//! - [`guard`] - Close-on-every-exit-path wrapper for engine handles

pub mod fs;
pub mod guard;
#[cfg(test)]
pub mod testutil;

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::options::{BuildConfig, InputOptions, OutputOptions};

pub use guard::CloseGuard;

/// Errors reported by an engine implementation.
#[derive(Debug, Error)]
pub enum EngineError {
  /// An entry module could not be found.
  #[error("could not resolve entry module {}", .0.display())]
  EntryNotFound(PathBuf),

  /// An option value has the wrong shape or an unsupported combination.
  #[error("invalid option `{key}`: {message}")]
  InvalidOption { key: String, message: String },

  /// The handle was used after it was closed.
  #[error("{0} is already closed")]
  Closed(&'static str),

  /// I/O error while reading inputs or writing outputs.
  #[error("failed to access {}: {source}", path.display())]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  /// The filesystem watcher could not be set up.
  #[error("watch error: {0}")]
  Watch(#[from] notify::Error),

  /// A build failure reported by the engine itself.
  #[error("{0}")]
  Build(String),
}

/// A handle that holds engine resources until closed.
///
/// `close` must be idempotent: closing an already closed handle is a no-op.
#[async_trait]
pub trait Close: Send {
  async fn close(&mut self) -> Result<(), EngineError>;
}

/// Entry point into the engine.
#[async_trait]
pub trait Engine: Send + Sync {
  /// Opens a build session for the given input options.
  async fn open(&self, input: &InputOptions) -> Result<Box<dyn BuildSession>, EngineError>;

  /// Starts watching every config, rebuilding whenever an input changes.
  async fn watch(&self, configs: Vec<BuildConfig>) -> Result<Box<dyn Watcher>, EngineError>;
}

/// A build bound to one set of input options.
#[async_trait]
pub trait BuildSession: Close {
  /// Generates the outputs for `output` and writes them to disk.
  async fn write(&mut self, output: &OutputOptions) -> Result<BuildOutput, EngineError>;

  /// Generates the outputs for `output` in memory only.
  async fn generate(&mut self, output: &OutputOptions) -> Result<BuildOutput, EngineError>;
}

/// A long-lived watch handle emitting change and lifecycle events until closed.
#[async_trait]
pub trait Watcher: Close {
  /// Waits for the next event. Returns `None` once the watcher has stopped.
  async fn next_event(&mut self) -> Option<WatchEvent>;
}

/// Engine resources attached to a finished rebuild cycle.
pub trait ResultHandle: Close + std::fmt::Debug {}

impl<T: Close + std::fmt::Debug> ResultHandle for T {}

/// Kind of a generated output file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputKind {
  Chunk,
  Asset,
}

impl OutputKind {
  pub fn as_str(self) -> &'static str {
    match self {
      OutputKind::Chunk => "chunk",
      OutputKind::Asset => "asset",
    }
  }
}

impl std::fmt::Display for OutputKind {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

/// A single generated file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputItem {
  Chunk { file_name: String, code: String },
  Asset { file_name: String, source: Vec<u8> },
}

impl OutputItem {
  pub fn kind(&self) -> OutputKind {
    match self {
      OutputItem::Chunk { .. } => OutputKind::Chunk,
      OutputItem::Asset { .. } => OutputKind::Asset,
    }
  }

  pub fn file_name(&self) -> &str {
    match self {
      OutputItem::Chunk { file_name, .. } | OutputItem::Asset { file_name, .. } => file_name,
    }
  }

  pub fn bytes(&self) -> &[u8] {
    match self {
      OutputItem::Chunk { code, .. } => code.as_bytes(),
      OutputItem::Asset { source, .. } => source,
    }
  }

  /// Size of the file contents in bytes.
  pub fn size(&self) -> usize {
    self.bytes().len()
  }
}

/// Result of one `write`/`generate` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildOutput {
  pub output: Vec<OutputItem>,
}

/// What happened to a watched file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
  Create,
  Update,
  Delete,
}

/// Events emitted by a [`Watcher`].
///
/// `BundleEnd` and `Error` carry a result handle that the consumer must close.
#[derive(Debug)]
pub enum WatchEvent {
  /// A watched file changed.
  Change { id: String, kind: ChangeKind },

  /// A rebuild cycle started.
  BundleStart,

  /// A rebuild cycle finished; `output` lists the written files in order.
  BundleEnd {
    result: Box<dyn ResultHandle>,
    output: Vec<String>,
    duration: Duration,
  },

  /// A rebuild cycle failed.
  Error {
    result: Box<dyn ResultHandle>,
    error: EngineError,
  },
}
