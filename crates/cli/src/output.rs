//! CLI output formatting utilities.
//!
//! Provides consistent formatting for terminal output: colored status messages,
//! the file header used when printing bundles to stdout, and the terminal
//! implementation of the library's [`Console`] sink.

use std::io::IsTerminal;

use owo_colors::{OwoColorize, Stream};
use rolldown_lib::console::Console;

pub mod symbols {
  pub const SUCCESS: &str = "✓";
  pub const ERROR: &str = "✗";
  pub const ARROW: &str = "→";
}

/// Whether stdout should get ANSI colors (a terminal, and `NO_COLOR` unset).
pub fn stdout_supports_color() -> bool {
  std::env::var_os("NO_COLOR").is_none() && std::io::stdout().is_terminal()
}

pub fn print_success(message: &str) {
  println!(
    "{} {}",
    symbols::SUCCESS.if_supports_color(Stream::Stdout, |s| s.green()),
    message
  );
}

pub fn print_error(message: &str) {
  eprintln!(
    "{} {}",
    symbols::ERROR.if_supports_color(Stream::Stderr, |s| s.red()),
    message.if_supports_color(Stream::Stderr, |s| s.red())
  );
}

/// Header printed before each file when several bundles go to stdout.
pub fn file_header(file_name: &str) -> String {
  let header = format!("|{} {}:", symbols::ARROW, file_name);
  format!(
    "\n{}\n",
    header.if_supports_color(Stream::Stdout, |s| s.cyan().bold().to_string())
  )
}

/// Writes orchestrator messages to the terminal.
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalConsole;

impl Console for TerminalConsole {
  fn log(&self, message: &str) {
    println!("{}", message);
  }

  fn success(&self, message: &str) {
    print_success(message);
  }

  fn error(&self, message: &str) {
    print_error(message);
  }
}
