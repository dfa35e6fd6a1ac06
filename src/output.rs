use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::sync::Mutex;

use camino::Utf8Path;
use chrono::Local;
use serde::Serialize;

use crate::app::{EventKind, ProgressEvent, ProgressSink, RunSummary};
use crate::error::KoekenError;

fn render(event: &ProgressEvent) -> String {
    let mut line = match event.kind {
        EventKind::Progress => event.message.clone(),
        EventKind::Warning => format!("WARNING: {}", event.message),
    };
    if let Some(elapsed) = event.elapsed {
        line.push_str(&format!(" ({:.1}s)", elapsed.as_secs_f64()));
    }
    line
}

/// Progress lines on stdout.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleSink;

impl ProgressSink for ConsoleSink {
    fn event(&self, event: ProgressEvent) {
        println!("{}", render(&event));
    }
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct QuietSink;

impl ProgressSink for QuietSink {
    fn event(&self, _event: ProgressEvent) {}
}

/// Holds events until a destination exists, e.g. the run log before the
/// output folder has been created.
#[derive(Debug, Default)]
pub struct BufferedSink {
    events: Mutex<Vec<ProgressEvent>>,
}

impl BufferedSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sends every held event to `sink`, oldest first.
    pub fn replay(self, sink: &dyn ProgressSink) {
        let events = self.events.into_inner().unwrap_or_else(|err| err.into_inner());
        for event in events {
            sink.event(event);
        }
    }
}

impl ProgressSink for BufferedSink {
    fn event(&self, event: ProgressEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(err) => err.into_inner().push(event),
        }
    }
}

/// Appends timestamped events to a log file and forwards them to `inner`.
pub struct LogFileSink<S: ProgressSink> {
    file: Mutex<File>,
    inner: S,
}

impl<S: ProgressSink> LogFileSink<S> {
    pub fn open(path: &Utf8Path, inner: S) -> Result<Self, KoekenError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_std_path())
            .map_err(|err| KoekenError::Filesystem(format!("open log {path}: {err}")))?;
        Ok(Self {
            file: Mutex::new(file),
            inner,
        })
    }
}

impl<S: ProgressSink> ProgressSink for LogFileSink<S> {
    fn event(&self, event: ProgressEvent) {
        let line = render(&event);
        if let Ok(mut file) = self.file.lock() {
            let stamp = Local::now().format("%Y-%m-%d %H:%M:%S");
            if let Err(err) = writeln!(file, "[{stamp}] {line}") {
                tracing::warn!(error = %err, "failed to write run log");
            }
        }
        self.inner.event(event);
    }
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_summary(summary: &RunSummary) -> io::Result<()> {
        Self::print_json(summary)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}
