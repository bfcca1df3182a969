use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::options::ConfigExport;

/// Config file looked up when `--config` is given without a path.
pub const DEFAULT_CONFIG_FILE: &str = "rolldown.config.json";

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("failed to read config file {}: {source}", path.display())]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("invalid config file {}: {source}", path.display())]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },
}

/// Loads a JSON config file.
///
/// Returns `Ok(None)` if there is no file at `path`.
pub fn load_config(path: &Path) -> Result<Option<ConfigExport>, ConfigError> {
  let content = match std::fs::read_to_string(path) {
    Ok(content) => content,
    Err(e) if e.kind() == io::ErrorKind::NotFound => {
      debug!(path = %path.display(), "no config file");
      return Ok(None);
    }
    Err(source) => {
      return Err(ConfigError::Read {
        path: path.to_path_buf(),
        source,
      });
    }
  };

  let config = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
    path: path.to_path_buf(),
    source,
  })?;

  debug!(path = %path.display(), "loaded config file");
  Ok(Some(config))
}
