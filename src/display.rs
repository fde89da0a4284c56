//! Colored display of child process output.
//!
//! [`ResponseDecorator`] labels raw stdout lines and stderr blocks with the
//! child's name and the stream they came from. A multi-line block carries the
//! label once, on its first line; the remaining lines are indented to the
//! label's width so a stack trace stays readable as one unit.

use std::fmt::Write as _;
use std::io::{self, Write};

use owo_colors::OwoColorize;
use serde::Serialize;

use crate::bridge::StreamKind;
use crate::config::DisplayConfig;

/// Formats child output for humans.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseDecorator {
    source_label: String,
    color: bool,
}

impl Default for ResponseDecorator {
    fn default() -> Self {
        Self::from_config(&DisplayConfig::default())
    }
}

impl ResponseDecorator {
    #[must_use]
    pub fn new(source_label: impl Into<String>, color: bool) -> Self {
        Self {
            source_label: source_label.into(),
            color,
        }
    }

    #[must_use]
    pub fn from_config(config: &DisplayConfig) -> Self {
        Self::new(config.source_label.clone(), config.color)
    }

    /// Uncolored decorator, for logs and tests.
    #[must_use]
    pub fn plain(source_label: impl Into<String>) -> Self {
        Self::new(source_label, false)
    }

    /// Label `text` as coming from `stream`.
    ///
    /// Trailing line breaks are dropped. The label appears exactly once.
    #[must_use]
    pub fn format(&self, stream: StreamKind, text: &str) -> String {
        let text = text.trim_end_matches(['\r', '\n']);
        let indent = " ".repeat(self.label_width(stream));

        let mut out = String::with_capacity(text.len() + indent.len());
        for (index, line) in text.split('\n').enumerate() {
            if index == 0 {
                let _ = write!(out, "{}  {line}", self.label(stream));
            } else {
                let _ = write!(out, "\n{indent}{line}");
            }
        }
        out
    }

    fn label(&self, stream: StreamKind) -> String {
        let name = stream.as_str();
        let name = if self.color {
            match stream {
                StreamKind::Stdout => name.cyan().bold().to_string(),
                StreamKind::Stderr => name.red().bold().to_string(),
                StreamKind::Stdin => name.bold().to_string(),
            }
        } else {
            name.to_string()
        };

        if self.source_label.is_empty() {
            name
        } else if self.color {
            format!("{} {name}", self.source_label.dimmed())
        } else {
            format!("{} {name}", self.source_label)
        }
    }

    /// Visible width of the label plus its separator.
    fn label_width(&self, stream: StreamKind) -> usize {
        let source = self.source_label.chars().count();
        let separator = usize::from(source > 0);
        source + separator + stream.as_str().len() + 2
    }
}

/// Receives decorated child output during a session.
pub trait LogSink {
    /// Called once per forwarded stdout line or stderr block.
    fn emit(&mut self, stream: StreamKind, decorated: &str);
}

impl<T: LogSink + ?Sized> LogSink for &mut T {
    fn emit(&mut self, stream: StreamKind, decorated: &str) {
        (**self).emit(stream, decorated);
    }
}

/// Prints decorated output to the terminal.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleSink;

impl LogSink for ConsoleSink {
    fn emit(&mut self, _stream: StreamKind, decorated: &str) {
        println!("{decorated}");
        let _ = io::stdout().flush();
    }
}

/// Keeps decorated output in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    entries: Vec<(StreamKind, String)>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything emitted so far, in order.
    #[must_use]
    pub fn entries(&self) -> &[(StreamKind, String)] {
        &self.entries
    }

    /// Entries that came from `stream`.
    pub fn from_stream(&self, stream: StreamKind) -> impl Iterator<Item = &str> + '_ {
        self.entries
            .iter()
            .filter(move |(kind, _)| *kind == stream)
            .map(|(_, text)| text.as_str())
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl LogSink for MemorySink {
    fn emit(&mut self, stream: StreamKind, decorated: &str) {
        self.entries.push((stream, decorated.to_string()));
    }
}

/// Shell-quoted command line, as echoed before a run.
#[must_use]
pub fn format_command_line(program: &str, args: &[String]) -> String {
    std::iter::once(program)
        .chain(args.iter().map(String::as_str))
        .map(|part| shell_escape::escape(part.into()).into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Print the command line about to be run (dimmed).
pub fn print_command_line(program: &str, args: &[String]) {
    println!("{}", format!("% {}", format_command_line(program, args)).dimmed());
    let _ = io::stdout().flush();
}

/// Print an error message.
pub fn print_error(message: &str) {
    eprintln!("{} {}", "[ERROR]".red().bold(), message);
}

/// Print a structured payload as indented JSON.
pub fn print_payload<T: Serialize>(payload: &T) {
    match serde_json::to_string_pretty(payload) {
        Ok(pretty) => println!("{pretty}"),
        Err(e) => print_error(&format!("Failed to render payload: {e}")),
    }
    let _ = io::stdout().flush();
}
