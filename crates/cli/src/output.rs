//! Terminal output helpers.
//!
//! Human-readable lines are prefixed by a [`Tone`] marker and only colored when
//! the stream supports it. Warnings and errors go to stderr so that `-o json`
//! leaves stdout parseable.

use std::fmt::Display;
use std::time::Duration;

use anyhow::Context;
use clap::ValueEnum;
use owo_colors::{AnsiColors, OwoColorize, Stream};

use depsync_lib::plan::SyncAction;

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
  #[default]
  Text,
  Json,
}

impl OutputFormat {
  pub fn is_json(self) -> bool {
    matches!(self, OutputFormat::Json)
  }
}

pub const ARROW: &str = "→";

/// Kind of status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tone {
  Success,
  Info,
  Warning,
  Error,
}

impl Tone {
  fn marker(self) -> &'static str {
    match self {
      Tone::Success => "✓",
      Tone::Info => "•",
      Tone::Warning => "⚠",
      Tone::Error => "✗",
    }
  }

  fn color(self) -> AnsiColors {
    match self {
      Tone::Success => AnsiColors::Green,
      Tone::Info => AnsiColors::Blue,
      Tone::Warning => AnsiColors::Yellow,
      Tone::Error => AnsiColors::Red,
    }
  }

  fn stream(self) -> Stream {
    match self {
      Tone::Success | Tone::Info => Stream::Stdout,
      Tone::Warning | Tone::Error => Stream::Stderr,
    }
  }

  /// Problems are colored in full so they stand out in a long sync log.
  fn colors_message(self) -> bool {
    matches!(self, Tone::Warning | Tone::Error)
  }
}

fn status_line(tone: Tone, message: &str) {
  let stream = tone.stream();
  let marker_text = tone.marker();
  let marker = marker_text.if_supports_color(stream, |s| s.color(tone.color()));
  let line = if tone.colors_message() {
    format!("{} {}", marker, message.if_supports_color(stream, |s| s.color(tone.color())))
  } else {
    format!("{} {}", marker, message)
  };
  match stream {
    Stream::Stdout => println!("{}", line),
    _ => eprintln!("{}", line),
  }
}

pub fn print_success(message: &str) {
  status_line(Tone::Success, message);
}

pub fn print_info(message: &str) {
  status_line(Tone::Info, message);
}

pub fn print_warning(message: &str) {
  status_line(Tone::Warning, message);
}

pub fn print_error(message: &str) {
  status_line(Tone::Error, message);
}

/// Indented `label: value` line used for totals.
pub fn print_stat(label: &str, value: impl Display) {
  println!("  {}: {}", label.if_supports_color(Stream::Stdout, |s| s.dimmed()), value);
}

pub fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
  let json = serde_json::to_string_pretty(value).context("Failed to serialize to JSON")?;
  println!("{}", json);
  Ok(())
}

/// Colored `+`, `~` or `-` for a planned action.
pub fn action_marker(action: &SyncAction) -> String {
  let (marker, color) = match action {
    SyncAction::Fetch(_) => ("+", AnsiColors::Green),
    SyncAction::Update { .. } => ("~", AnsiColors::Yellow),
    SyncAction::Remove { .. } => ("-", AnsiColors::Red),
  };
  marker.if_supports_color(Stream::Stdout, |s| s.color(color)).to_string()
}

/// Shorten a commit hash for display. Anything that is not hex (a package
/// version) is returned whole.
pub fn truncate_hash(revision: &str) -> &str {
  if revision.len() > 12 && revision.bytes().all(|b| b.is_ascii_hexdigit()) {
    &revision[..12]
  } else {
    revision
  }
}

/// Binary-prefixed size with one decimal, e.g. `1.5 MB`.
pub fn format_bytes(bytes: u64) -> String {
  const UNITS: [&str; 3] = ["KB", "MB", "GB"];

  let mut value = bytes as f64;
  let mut unit = None;
  for next in UNITS {
    if value < 1024.0 {
      break;
    }
    value /= 1024.0;
    unit = Some(next);
  }
  match unit {
    Some(unit) => format!("{:.1} {}", value, unit),
    None => format!("{} B", bytes),
  }
}

/// Elapsed time rounded to milliseconds, e.g. `1s 500ms`.
pub fn format_duration(duration: Duration) -> String {
  let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
  humantime::format_duration(Duration::from_millis(millis)).to_string()
}

#[cfg(test)]
mod tests {
  use super::*;
  use depsync_lib::entry::DependencyEntry;

  #[test]
  fn test_truncate_hash() {
    assert_eq!(truncate_hash("abcdef123456789"), "abcdef123456");
    assert_eq!(truncate_hash(&"a".repeat(40)), "aaaaaaaaaaaa");
    assert_eq!(truncate_hash("short"), "short");
    assert_eq!(truncate_hash("version:2@1.12.1.chromium.4"), "version:2@1.12.1.chromium.4");
    assert_eq!(truncate_hash(""), "");
  }

  #[test]
  fn test_format_bytes() {
    assert_eq!(format_bytes(500), "500 B");
    assert_eq!(format_bytes(1024), "1.0 KB");
    assert_eq!(format_bytes(1536), "1.5 KB");
    assert_eq!(format_bytes(1048576), "1.0 MB");
    assert_eq!(format_bytes(1073741824), "1.0 GB");
    assert_eq!(format_bytes(5 * 1073741824 * 1024), "5120.0 GB");
  }

  #[test]
  fn test_format_duration() {
    assert_eq!(format_duration(Duration::from_millis(50)), "50ms");
    assert_eq!(format_duration(Duration::from_millis(1500)), "1s 500ms");
    assert_eq!(format_duration(Duration::from_secs(65)), "1m 5s");
    assert_eq!(format_duration(Duration::from_micros(2_000_900)), "2s");
    assert_eq!(format_duration(Duration::ZERO), "0s");
  }

  #[test]
  fn problems_go_to_stderr() {
    assert!(matches!(Tone::Warning.stream(), Stream::Stderr));
    assert!(matches!(Tone::Error.stream(), Stream::Stderr));
    assert!(matches!(Tone::Info.stream(), Stream::Stdout));
    assert!(!Tone::Success.colors_message());
  }

  #[test]
  fn action_markers_follow_kind() {
    let entry = DependencyEntry::new("infra/tool", "version:1@1", "bin").unwrap();
    let remove = SyncAction::Remove {
      id: "infra/tool".to_string(),
      path: "bin".to_string(),
      relocated: false,
    };
    assert!(action_marker(&SyncAction::Fetch(entry)).contains('+'));
    assert!(action_marker(&remove).contains('-'));
  }
}
