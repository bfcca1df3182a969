//! Implementation of the `rolldown` bundle command.
//!
//! Resolves where build configuration comes from (a config file or the command
//! line alone), then either builds once and reports the generated files or
//! hands the configs to the watch orchestrator.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use rolldown_lib::config::{expand, load_config};
use rolldown_lib::engine::{BuildOutput, Engine};
use rolldown_lib::engine::fs::PassthroughEngine;
use rolldown_lib::options::{BuildConfig, CliOverrides, ConfigExport};
use rolldown_lib::report::{RenderOptions, format_duration, render};
use rolldown_lib::session::{generate_once, run_sequential};
use rolldown_lib::watch::{WatchOrchestrator, shutdown_channel};
use tracing::debug;

use crate::output::{TerminalConsole, file_header, print_error, print_success, stdout_supports_color};
use crate::signals::forward_termination;

/// Everything the bundle command needs from the command line.
#[derive(Debug, Clone, Default)]
pub struct BundleArgs {
  /// Config file to load, if `-c/--config` was given.
  pub config: Option<PathBuf>,
  pub overrides: CliOverrides,
  pub watch: bool,
}

/// Runs the bundle command and returns the process exit code.
pub async fn cmd_bundle(args: BundleArgs) -> Result<i32> {
  let engine = PassthroughEngine::new();

  match &args.config {
    Some(path) => bundle_with_config(&engine, path, &args).await,
    None => bundle_with_cli_options(&engine, &args).await,
  }
}

async fn bundle_with_config(engine: &dyn Engine, path: &Path, args: &BundleArgs) -> Result<i32> {
  let Some(config) = load_config(path).with_context(|| format!("Failed to load {}", path.display()))? else {
    print_error(&format!("No configuration found at {}", path.display()));
    return Ok(1);
  };

  let configs = expand(config, &args.overrides);
  if configs.is_empty() {
    print_error(&format!("No configuration found at {}", path.display()));
    return Ok(1);
  }

  run_configs(engine, configs, args.watch).await
}

async fn bundle_with_cli_options(engine: &dyn Engine, args: &BundleArgs) -> Result<i32> {
  if args.overrides.output.has_target() {
    let configs = expand(ConfigExport::default(), &args.overrides);
    return run_configs(engine, configs, args.watch).await;
  }

  if args.watch {
    print_error("You must specify `output.dir` to use watch mode");
    return Ok(1);
  }

  debug!("no output target, printing to stdout");
  let generated = match generate_once(engine, &args.overrides.input, &args.overrides.output).await {
    Ok(generated) => generated,
    Err(e) => {
      print_error(&e.to_string());
      return Ok(1);
    }
  };

  let mut stdout = std::io::stdout().lock();
  if !write_generated(&generated, &mut stdout).context("Failed to write to stdout")? {
    print_error("No output generated");
    return Ok(1);
  }

  Ok(0)
}

/// Writes every generated file to `out`, each preceded by a header when there
/// are several. Returns `false` if there was nothing to write.
fn write_generated(generated: &BuildOutput, out: &mut impl Write) -> std::io::Result<bool> {
  if generated.output.is_empty() {
    return Ok(false);
  }

  let multiple = generated.output.len() > 1;
  for item in &generated.output {
    if multiple {
      write!(out, "{}", file_header(item.file_name()))?;
    }
    out.write_all(item.bytes())?;
    writeln!(out)?;
  }
  out.flush()?;

  Ok(true)
}

async fn run_configs(engine: &dyn Engine, configs: Vec<BuildConfig>, watch: bool) -> Result<i32> {
  if let Some(config) = configs.iter().position(|c| c.output.is_empty()) {
    print_error(&format!("No output target specified for config #{}", config));
    return Ok(1);
  }

  if watch {
    watch_inner(engine, configs).await
  } else {
    bundle_inner(engine, &configs).await
  }
}

async fn bundle_inner(engine: &dyn Engine, configs: &[BuildConfig]) -> Result<i32> {
  let start = Instant::now();

  let results = match run_sequential(engine, configs).await {
    Ok(results) => results,
    Err(e) => {
      print_error(&e.to_string());
      return Ok(1);
    }
  };

  let options = RenderOptions {
    color: stdout_supports_color(),
    ..RenderOptions::default()
  };
  for line in render(&results, &options) {
    println!("{}", line);
  }

  println!();
  print_success(&format!(
    "rolldown v{} Finished in {}",
    env!("CARGO_PKG_VERSION"),
    format_duration(start.elapsed())
  ));

  Ok(0)
}

async fn watch_inner(engine: &dyn Engine, configs: Vec<BuildConfig>) -> Result<i32> {
  let (trigger, hook) = shutdown_channel();
  forward_termination(trigger);

  let mut orchestrator = WatchOrchestrator::new(TerminalConsole, hook);
  if let Err(e) = orchestrator.start(engine, configs).await {
    print_error(&format!("Failed to start watch mode: {}", e));
    return Ok(1);
  }

  Ok(orchestrator.run().await)
}
