//! Terminal formatting of build results.
//!
//! Everything here is pure: functions take finished outputs and return the
//! lines to print.

use std::path::Path;
use std::time::Duration;

use num_format::{Locale, ToFormattedString};
use owo_colors::{OwoColorize, Style};

use crate::engine::{BuildOutput, OutputKind};

/// Display order of output kinds, with the color used for file names.
fn groups() -> [(OutputKind, Style); 2] {
  [
    (OutputKind::Asset, Style::new().green()),
    (OutputKind::Chunk, Style::new().cyan()),
  ]
}

/// What the reporter needs to know about a generated file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputEntry {
  pub kind: OutputKind,
  pub file_name: String,
  pub size: usize,
}

/// Column widths shared by every line of one result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LayoutSizes {
  /// Longest file name, in characters.
  pub longest: usize,
  pub biggest_size: usize,
  /// Width of the rendered size of `biggest_size`.
  pub size_pad: usize,
}

#[derive(Debug, Clone)]
pub struct RenderOptions {
  /// Prefix printed before every file name.
  pub dist_path: String,
  pub color: bool,
}

impl Default for RenderOptions {
  fn default() -> Self {
    Self {
      dist_path: "<DIR>".to_string(),
      color: false,
    }
  }
}

pub fn collect_entries(output: &BuildOutput) -> Vec<OutputEntry> {
  output
    .output
    .iter()
    .map(|item| OutputEntry {
      kind: item.kind(),
      file_name: item.file_name().to_string(),
      size: item.size(),
    })
    .collect()
}

pub fn layout_sizes(entries: &[OutputEntry]) -> LayoutSizes {
  let longest = entries.iter().map(|e| e.file_name.chars().count()).max().unwrap_or(0);
  let biggest_size = entries.iter().map(|e| e.size).max().unwrap_or(0);

  LayoutSizes {
    longest,
    biggest_size,
    size_pad: display_size(biggest_size).chars().count(),
  }
}

/// Renders every result as a block of lines, assets first, each group sorted by size.
pub fn render(results: &[BuildOutput], options: &RenderOptions) -> Vec<String> {
  results
    .iter()
    .flat_map(|result| {
      let entries = collect_entries(result);
      let sizes = layout_sizes(&entries);
      render_entries(&entries, &sizes, options)
    })
    .collect()
}

fn render_entries(entries: &[OutputEntry], sizes: &LayoutSizes, options: &RenderOptions) -> Vec<String> {
  let dim = Style::new().dimmed();
  let dist = with_trailing_slash(&options.dist_path);
  let mut lines = Vec::with_capacity(entries.len());

  for (kind, color) in groups() {
    let mut group: Vec<&OutputEntry> = entries.iter().filter(|e| e.kind == kind).collect();
    // stable, so equal sizes keep their original order
    group.sort_by_key(|e| e.size);

    for entry in group {
      let name = format!("{:<width$}", entry.file_name, width = sizes.longest + 2);
      let size = format!(
        " │ size: {:>width$}",
        display_size(entry.size),
        width = sizes.size_pad
      );

      lines.push(format!(
        "{}{}{}{}",
        paint(&dist, dim, options.color),
        paint(&name, color, options.color),
        paint(entry.kind.as_str(), dim, options.color),
        paint(&size, dim, options.color),
      ));
    }
  }

  lines
}

fn paint(text: &str, style: Style, enabled: bool) -> String {
  if enabled {
    text.style(style).to_string()
  } else {
    text.to_string()
  }
}

fn with_trailing_slash(path: &str) -> String {
  if path.ends_with('/') {
    path.to_string()
  } else {
    format!("{}/", path)
  }
}

/// Formats a byte count as kilobytes (1 kB = 1000 B) with two decimals.
pub fn display_size(bytes: usize) -> String {
  let hundredths = (bytes as u64 + 5) / 10;
  format!(
    "{}.{:02} kB",
    (hundredths / 100).to_formatted_string(&Locale::en),
    hundredths % 100
  )
}

/// Formats a duration as milliseconds below one second, seconds otherwise.
pub fn format_duration(duration: Duration) -> String {
  let ms = duration.as_secs_f64() * 1000.0;
  if ms < 1000.0 {
    format!("{:.2} ms", ms)
  } else {
    format!("{:.2} s", ms / 1000.0)
  }
}

/// Shows absolute paths relative to the current directory.
pub fn relative_id(id: &str) -> String {
  let path = Path::new(id);
  if !path.is_absolute() {
    return id.to_string();
  }

  std::env::current_dir()
    .ok()
    .and_then(|cwd| pathdiff::diff_paths(path, cwd))
    .map(|rel| rel.display().to_string())
    .unwrap_or_else(|| id.to_string())
}
