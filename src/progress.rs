//! Read-batch progress reporting.
//!
//! Reports observable progress while a batched read runs (folder discovery,
//! then per-file reads) so long scans are not silent. Progress is emitted on
//! **stderr** so stdout remains parseable for scripts.

use std::io::Write;

/// A single progress event for a read batch.
#[derive(Clone, Debug)]
pub enum ReadProgressEvent {
    /// Walking the folder tree; no total yet.
    Discovering { scope: String },
    /// Reading files: n processed out of total (bounded by the batch cap).
    Reading { scope: String, n: u64, total: u64 },
}

/// Reports read progress. Implementations write to stderr (human or JSON).
pub trait ReadProgressReporter: Send + Sync {
    fn report(&self, event: ReadProgressEvent);
}

/// Human-friendly progress on stderr: "read drive:abc123  reading  3 / 12 files".
pub struct StderrProgress;

impl ReadProgressReporter for StderrProgress {
    fn report(&self, event: ReadProgressEvent) {
        let line = match &event {
            ReadProgressEvent::Discovering { scope } => {
                format!("read {}  discovering...\n", scope)
            }
            ReadProgressEvent::Reading { scope, n, total } => {
                format!("read {}  reading  {} / {} files\n", scope, n, total)
            }
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ReadProgressReporter for JsonProgress {
    fn report(&self, event: ReadProgressEvent) {
        let obj = match &event {
            ReadProgressEvent::Discovering { scope } => serde_json::json!({
                "event": "progress",
                "scope": scope,
                "phase": "discovering"
            }),
            ReadProgressEvent::Reading { scope, n, total } => serde_json::json!({
                "event": "progress",
                "scope": scope,
                "phase": "reading",
                "n": n,
                "total": total
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl ReadProgressReporter for NoProgress {
    fn report(&self, _event: ReadProgressEvent) {}
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    /// Build a reporter for this mode. Caller passes it into the pipeline.
    pub fn reporter(&self) -> Box<dyn ReadProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}

impl std::str::FromStr for ProgressMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "off" => Ok(ProgressMode::Off),
            "human" => Ok(ProgressMode::Human),
            "json" => Ok(ProgressMode::Json),
            other => Err(format!(
                "invalid progress mode '{}' (expected off, human, or json)",
                other
            )),
        }
    }
}
