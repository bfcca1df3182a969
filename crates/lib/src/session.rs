//! Sequential build execution.
//!
//! Configs are built strictly one after another, and so are the outputs of each
//! config. At most one build session is open at any time. This bounds the
//! engine's peak resource usage; independent configs could in principle be
//! built in parallel.

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::engine::{BuildOutput, BuildSession, CloseGuard, Engine, EngineError};
use crate::options::{BuildConfig, InputOptions, OutputOptions};

/// Errors from running build sessions. Config and output positions are zero-based.
#[derive(Debug, Error)]
pub enum SessionError {
  #[error("config #{config} has no output options")]
  NoOutputs { config: usize },

  #[error("failed to open build for config #{config}: {source}")]
  Open {
    config: usize,
    #[source]
    source: EngineError,
  },

  #[error("failed to write output #{output} of config #{config}: {source}")]
  Write {
    config: usize,
    output: usize,
    #[source]
    source: EngineError,
  },

  #[error("failed to close build for config #{config}: {source}")]
  Close {
    config: usize,
    #[source]
    source: EngineError,
  },
}

type SessionGuard = CloseGuard<dyn BuildSession>;

async fn open(engine: &dyn Engine, input: &InputOptions) -> Result<SessionGuard, EngineError> {
  let session = engine.open(input).await?;
  Ok(CloseGuard::new(session, "build session"))
}

fn session_mut(guard: &mut SessionGuard) -> Result<&mut (dyn BuildSession + 'static), EngineError> {
  guard.get_mut().ok_or(EngineError::Closed("build session"))
}

/// Builds every config in order and writes all of its outputs.
///
/// For each config a session is opened, each output is written in order, and
/// the session is closed once after the last attempted output. A failed write
/// skips the remaining outputs of that config, still closes its session, and
/// aborts the whole run. Close failures are reported only if every write of
/// that config succeeded.
pub async fn run_sequential(engine: &dyn Engine, configs: &[BuildConfig]) -> Result<Vec<BuildOutput>, SessionError> {
  if let Some(config) = configs.iter().position(|c| c.output.is_empty()) {
    return Err(SessionError::NoOutputs { config });
  }

  let total: usize = configs.iter().map(|c| c.output.len()).sum();
  info!(configs = configs.len(), outputs = total, "starting build");

  let mut results = Vec::with_capacity(total);

  for (idx, config) in configs.iter().enumerate() {
    debug!(config = idx, outputs = config.output.len(), "opening build session");

    let mut session = open(engine, &config.input)
      .await
      .map_err(|source| SessionError::Open { config: idx, source })?;

    let written = write_outputs(&mut session, idx, &config.output, &mut results).await;
    let closed = session.close().await;

    match (written, closed) {
      (Err(e), closed) => {
        if let Err(close_err) = closed {
          warn!(config = idx, error = %close_err, "failed to close build session after write error");
        }
        return Err(e);
      }
      (Ok(()), Err(source)) => return Err(SessionError::Close { config: idx, source }),
      (Ok(()), Ok(())) => {}
    }
  }

  info!(results = results.len(), "build complete");
  Ok(results)
}

async fn write_outputs(
  session: &mut SessionGuard,
  config: usize,
  outputs: &[OutputOptions],
  results: &mut Vec<BuildOutput>,
) -> Result<(), SessionError> {
  for (idx, output) in outputs.iter().enumerate() {
    let write_err = |source| SessionError::Write {
      config,
      output: idx,
      source,
    };

    let result = session_mut(session).map_err(write_err)?.write(output).await.map_err(write_err)?;
    debug!(config, output = idx, files = result.output.len(), "wrote output");
    results.push(result);
  }
  Ok(())
}

/// Opens a session, generates `output` in memory, and closes the session again.
pub async fn generate_once(
  engine: &dyn Engine,
  input: &InputOptions,
  output: &OutputOptions,
) -> Result<BuildOutput, SessionError> {
  let mut session = open(engine, input)
    .await
    .map_err(|source| SessionError::Open { config: 0, source })?;

  let generated = match session_mut(&mut session) {
    Ok(s) => s.generate(output).await,
    Err(e) => Err(e),
  };
  let closed = session.close().await;

  let generated = generated.map_err(|source| SessionError::Write {
    config: 0,
    output: 0,
    source,
  })?;
  closed.map_err(|source| SessionError::Close { config: 0, source })?;

  Ok(generated)
}
