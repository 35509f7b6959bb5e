use super::SyncWrite;
use crate::level::LogLevel;
use crate::record::LogRecord;
use anstyle::{AnsiColor, Color, Style};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::io::{self, Write};
use std::sync::Arc;

/// Line format of the console destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsoleFormat {
    /// Human-readable, colorized line for development.
    Pretty,
    /// Compact JSON, one object per line.
    Json,
}

#[derive(Clone)]
enum Output {
    /// stdout, or stderr for error-like levels.
    Std,
    /// Single shared writer for both streams.
    Writer(Arc<Mutex<Box<dyn Write + Send>>>),
}

/// Console destination. Cheap to clone; clones share the output.
#[derive(Clone)]
pub struct ConsoleSink {
    format: ConsoleFormat,
    color: bool,
    output: Output,
}

impl ConsoleSink {
    pub fn new(format: ConsoleFormat, color: bool) -> Self {
        ConsoleSink {
            format,
            color: color && format == ConsoleFormat::Pretty,
            output: Output::Std,
        }
    }

    /// Write everything to `writer` instead of the standard streams.
    pub fn with_writer(format: ConsoleFormat, writer: Box<dyn Write + Send>) -> Self {
        ConsoleSink {
            format,
            color: false,
            output: Output::Writer(Arc::new(Mutex::new(writer))),
        }
    }

    pub fn format(&self) -> ConsoleFormat {
        self.format
    }

    pub fn format_line(&self, record: &LogRecord) -> String {
        match self.format {
            ConsoleFormat::Json => record.to_json_line(),
            ConsoleFormat::Pretty => format_pretty(record, self.color),
        }
    }

    /// Report a failure of another destination on stderr.
    pub fn echo_failure(&self, message: &str) {
        let style = if self.color {
            Style::new().fg_color(Some(Color::Ansi(AnsiColor::Red))).bold()
        } else {
            Style::new()
        };
        let line = format!(
            "{}[log-fanout]{} {}",
            style.render(),
            style.render_reset(),
            message
        );
        let _ = self.emit(&line, true);
    }

    fn emit(&self, line: &str, to_stderr: bool) -> io::Result<()> {
        match &self.output {
            Output::Std if to_stderr => writeln!(io::stderr().lock(), "{}", line),
            Output::Std => writeln!(io::stdout().lock(), "{}", line),
            Output::Writer(writer) => writeln!(writer.lock(), "{}", line),
        }
    }
}

impl SyncWrite for ConsoleSink {
    fn write(&self, record: &LogRecord) -> io::Result<()> {
        let line = self.format_line(record);
        self.emit(&line, record.level.is_error_like())
    }
}

fn level_style(level: LogLevel) -> Style {
    let color = match level {
        LogLevel::Trace => AnsiColor::BrightBlack,
        LogLevel::Debug => AnsiColor::Blue,
        LogLevel::Info => AnsiColor::Green,
        LogLevel::Notice => AnsiColor::Cyan,
        LogLevel::UserAction => AnsiColor::Magenta,
        LogLevel::Success => AnsiColor::BrightGreen,
        LogLevel::Warn => AnsiColor::Yellow,
        LogLevel::Failure | LogLevel::Error => AnsiColor::Red,
        LogLevel::Fatal => AnsiColor::BrightRed,
    };
    let style = Style::new().fg_color(Some(Color::Ansi(color)));
    if level == LogLevel::Fatal {
        style.bold()
    } else {
        style
    }
}

/// `HH:MM:SS.mmm LEVEL [request] message key=value ... error=...`
fn format_pretty(record: &LogRecord, color: bool) -> String {
    let (level_style, dim) = if color {
        (level_style(record.level), Style::new().dimmed())
    } else {
        (Style::new(), Style::new())
    };

    let mut line = String::with_capacity(128);
    let _ = write!(
        line,
        "{}{}{} {}{:<11}{}",
        dim.render(),
        record.timestamp.format("%H:%M:%S%.3f"),
        dim.render_reset(),
        level_style.render(),
        record.level.as_str().to_ascii_uppercase(),
        level_style.render_reset(),
    );
    if let Some(request_id) = record.context.request_id() {
        let _ = write!(line, " [{}]", request_id);
    }
    let _ = write!(line, " {}", record.message);

    let mut extras = String::new();
    for (key, value) in record.context.iter() {
        if key == crate::context::keys::REQUEST_ID {
            continue;
        }
        let _ = write!(extras, " {}={}", key, value);
    }
    for (key, value) in &record.metadata {
        let _ = write!(extras, " {}={}", key, value);
    }
    if !extras.is_empty() {
        let _ = write!(line, "{}{}{}", dim.render(), extras, dim.render_reset());
    }

    if let Some(error) = &record.error {
        let _ = write!(
            line,
            " error={}: {} category={} fingerprint={}",
            error.name, error.message, error.category, error.fingerprint
        );
    }
    line
}
