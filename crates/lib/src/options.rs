//! Build configuration types.
//!
//! Input and output options are kept as opaque JSON objects: the orchestrator
//! only merges and forwards them, and the engine is the one that interprets
//! individual keys. A handful of typed accessors exist for the keys the CLI
//! itself needs to inspect (`output.dir`, `output.file`).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A JSON object of option key/value pairs.
pub type OptionMap = Map<String, Value>;

/// Either a single value or an ordered list of values.
///
/// User configs allow both `{...}` and `[{...}, {...}]` in the same position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
  One(T),
  Many(Vec<T>),
}

impl<T> OneOrMany<T> {
  pub fn into_vec(self) -> Vec<T> {
    match self {
      OneOrMany::One(value) => vec![value],
      OneOrMany::Many(values) => values,
    }
  }
}

impl<T> From<T> for OneOrMany<T> {
  fn from(value: T) -> Self {
    OneOrMany::One(value)
  }
}

/// Input-side options (entry modules, plugins, resolution settings, ...).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InputOptions(pub OptionMap);

/// Output-side options (target directory or file, naming templates, format, ...).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OutputOptions(pub OptionMap);

macro_rules! option_map_impls {
  ($ty:ident) => {
    impl $ty {
      pub fn new() -> Self {
        Self::default()
      }

      /// Builder-style insert, mostly useful when assembling CLI overrides.
      pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
      }

      pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
      }

      pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
      }

      pub fn is_empty(&self) -> bool {
        self.0.is_empty()
      }

      /// Shallow merge: every top-level key of `overrides` replaces the key in `self`.
      pub fn merge(&mut self, overrides: &$ty) {
        for (key, value) in &overrides.0 {
          self.0.insert(key.clone(), value.clone());
        }
      }

      /// Returns a copy of `self` with `overrides` shallow-merged on top.
      pub fn merged(&self, overrides: &$ty) -> $ty {
        let mut merged = self.clone();
        merged.merge(overrides);
        merged
      }
    }

    impl From<OptionMap> for $ty {
      fn from(map: OptionMap) -> Self {
        $ty(map)
      }
    }
  };
}

option_map_impls!(InputOptions);
option_map_impls!(OutputOptions);

impl OutputOptions {
  pub fn dir(&self) -> Option<&str> {
    self.get_str("dir")
  }

  pub fn file(&self) -> Option<&str> {
    self.get_str("file")
  }

  /// Whether this output names somewhere to write to.
  pub fn has_target(&self) -> bool {
    self.dir().is_some() || self.file().is_some()
  }
}

/// One build unit as declared in a config file, before normalization.
///
/// Everything except `output` is treated as input options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserConfig {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub output: Option<OneOrMany<OutputOptions>>,

  #[serde(flatten)]
  pub input: InputOptions,
}

/// Top-level value of a config file: one build unit or an ordered list of them.
pub type ConfigExport = OneOrMany<UserConfig>;

impl Default for ConfigExport {
  fn default() -> Self {
    OneOrMany::One(UserConfig::default())
  }
}

/// A normalized build unit: input options plus every output to produce from them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildConfig {
  pub input: InputOptions,
  pub output: Vec<OutputOptions>,
}

/// Option overrides supplied on the command line.
///
/// Only options the user explicitly passed are present, so merging never
/// clobbers config file values with CLI defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CliOverrides {
  pub input: InputOptions,
  pub output: OutputOptions,
}
