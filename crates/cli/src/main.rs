mod cmd;
mod output;
mod signals;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use rolldown_lib::config::DEFAULT_CONFIG_FILE;
use rolldown_lib::options::{CliOverrides, InputOptions, OutputOptions};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

use crate::cmd::BundleArgs;

/// rolldown - JavaScript bundler command line
#[derive(Parser, Debug)]
#[command(name = "rolldown")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Entry files to bundle
  #[arg(value_name = "INPUT")]
  input: Vec<String>,

  /// Use a config file (default: rolldown.config.json)
  #[arg(short, long, value_name = "PATH", num_args = 0..=1, default_missing_value = DEFAULT_CONFIG_FILE)]
  config: Option<PathBuf>,

  /// Directory for generated files
  #[arg(short, long)]
  dir: Option<String>,

  /// Single output file
  #[arg(short = 'o', long)]
  file: Option<String>,

  /// Output format (es, cjs, iife, umd)
  #[arg(short, long)]
  format: Option<String>,

  /// Name pattern for emitted entry chunks
  #[arg(long, value_name = "PATTERN")]
  entry_file_names: Option<String>,

  /// Rebuild when source files change
  #[arg(short, long)]
  watch: bool,

  /// Enable verbose output
  #[arg(short, long)]
  verbose: bool,
}

impl Cli {
  /// Builds override maps holding only the options that were actually passed.
  fn overrides(&self) -> CliOverrides {
    let mut input = InputOptions::new();
    match self.input.as_slice() {
      [] => {}
      [single] => input = input.with("input", single.as_str()),
      many => input = input.with("input", Value::from(many.to_vec())),
    }

    let mut output = OutputOptions::new();
    let flags = [
      ("dir", &self.dir),
      ("file", &self.file),
      ("format", &self.format),
      ("entryFileNames", &self.entry_file_names),
    ];
    for (key, value) in flags {
      if let Some(value) = value {
        output = output.with(key, value.as_str());
      }
    }

    CliOverrides { input, output }
  }
}

fn init_logging(verbose: bool) {
  let filter = if std::env::var_os("RUST_LOG").is_some() {
    EnvFilter::from_default_env()
  } else if verbose {
    EnvFilter::new("debug")
  } else {
    EnvFilter::new("warn")
  };

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .without_time()
    .with_writer(std::io::stderr)
    .init();
}

/// Tells config and plugin code that it runs under watch mode.
///
/// Must be called before the async runtime starts.
fn set_watch_env() {
  // SAFETY: called from `main` before any other thread is spawned.
  unsafe {
    std::env::set_var("ROLLUP_WATCH", "true");
    std::env::set_var("ROLLDOWN_WATCH", "true");
  }
}

fn main() -> Result<()> {
  let cli = Cli::parse();
  init_logging(cli.verbose);

  if cli.watch {
    set_watch_env();
  }

  let args = BundleArgs {
    config: cli.config.clone(),
    overrides: cli.overrides(),
    watch: cli.watch,
  };

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let code = rt.block_on(cmd::cmd_bundle(args))?;
  drop(rt);

  if code != 0 {
    std::process::exit(code);
  }
  Ok(())
}
