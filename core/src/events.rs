//! Discrete lifecycle and error events
//!
//! Events are written one per line as fixed-width text:
//! `time[ms] caller code description`, where `time[ms]` is relative to the
//! experiment start (or to logger creation before the experiment starts).

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::report::push_column;

/// Event categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCode {
    /// The experiment window opened
    ExperimentStart,
    /// The experiment window closed
    ExperimentEnd,
    /// A discovery phase did not complete in time
    DiscoveryTimeout,
    /// A message arrived above the late threshold
    LateMessage,
    /// A message arrived above the too-late threshold
    TooLateMessage,
    /// Messages were detected as lost
    LostMessages,
    /// An endpoint callback returned an error
    CallbackError,
    /// An executor thread failed
    ExecutorFailure,
}

impl EventCode {
    /// Label written to the log
    pub fn as_str(&self) -> &'static str {
        match self {
            EventCode::ExperimentStart => "experiment_start",
            EventCode::ExperimentEnd => "experiment_end",
            EventCode::DiscoveryTimeout => "discovery_timeout",
            EventCode::LateMessage => "late_message",
            EventCode::TooLateMessage => "too_late_message",
            EventCode::LostMessages => "lost_messages",
            EventCode::CallbackError => "callback_error",
            EventCode::ExecutorFailure => "executor_failure",
        }
    }
}

impl std::fmt::Display for EventCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Who reported the event (node, executor or `system`)
    pub caller: String,
    /// Category
    pub code: EventCode,
    /// Free-form detail
    pub description: String,
}

impl Event {
    /// Create a new event
    pub fn new(caller: impl Into<String>, code: EventCode, description: impl Into<String>) -> Self {
        Self {
            caller: caller.into(),
            code,
            description: description.into(),
        }
    }
}

const TIME_WIDTH: usize = 12;
const CALLER_WIDTH: usize = 30;
const CODE_WIDTH: usize = 20;

/// Append-only, thread-safe event sink
pub struct EventsLogger {
    path: PathBuf,
    start: Mutex<Instant>,
    writer: Mutex<BufWriter<File>>,
    write_failed: AtomicBool,
}

impl EventsLogger {
    /// Create (truncate) the events file and write its header
    pub fn create(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut writer = BufWriter::new(File::create(&path)?);

        let mut header = String::new();
        push_column(&mut header, "time[ms]", TIME_WIDTH);
        push_column(&mut header, "caller", CALLER_WIDTH);
        push_column(&mut header, "code", CODE_WIDTH);
        header.push_str("description");
        writeln!(writer, "{}", header)?;
        writer.flush()?;

        tracing::info!(path = %path.display(), "Events logger enabled");

        Ok(Self {
            path,
            start: Mutex::new(Instant::now()),
            writer: Mutex::new(writer),
            write_failed: AtomicBool::new(false),
        })
    }

    /// Path of the events file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reference point for event timestamps
    pub fn set_start_time(&self, start: Instant) {
        *self.start.lock() = start;
    }

    /// Record an event
    ///
    /// Write failures are reported once and otherwise ignored; the events log
    /// never interrupts the experiment.
    pub fn log(&self, event: Event) {
        let elapsed_ms = self.start.lock().elapsed().as_secs_f64() * 1000.0;

        let mut line = String::new();
        push_column(&mut line, format!("{:.3}", elapsed_ms), TIME_WIDTH);
        push_column(&mut line, &event.caller, CALLER_WIDTH);
        push_column(&mut line, event.code, CODE_WIDTH);
        line.push_str(&event.description);

        let result = {
            let mut writer = self.writer.lock();
            writeln!(writer, "{}", line).and_then(|_| writer.flush())
        };

        if let Err(e) = result {
            if !self.write_failed.swap(true, Ordering::Relaxed) {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Failed to write events log, further failures are ignored"
                );
            }
        }
    }
}

impl std::fmt::Debug for EventsLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventsLogger")
            .field("path", &self.path)
            .finish()
    }
}
