//! Append-only log of raw text-generation requests.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// One chat message as sent to the provider.
#[derive(Debug, Serialize)]
struct LoggedMessage<'a> {
    role: &'static str,
    content: &'a str,
}

/// One logged request.
#[derive(Debug, Serialize)]
struct LoggedRequest<'a> {
    timestamp: DateTime<Utc>,
    model: &'a str,
    messages: [LoggedMessage<'a>; 2],
}

/// Appends every request as pretty-printed JSON followed by a blank line.
///
/// Writes are serialised through a mutex so entries from concurrent
/// workers never interleave.
#[derive(Debug)]
pub struct RequestLog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl RequestLog {
    /// Creates a log that appends to `path`, creating the file on first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Returns the log file location.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Records a `(system, user)` request for `model`.
    pub fn record(&self, model: &str, system_prompt: &str, user_prompt: &str) -> Result<()> {
        let entry = LoggedRequest {
            timestamp: Utc::now(),
            model,
            messages: [
                LoggedMessage {
                    role: "system",
                    content: system_prompt,
                },
                LoggedMessage {
                    role: "user",
                    content: user_prompt,
                },
            ],
        };
        let mut rendered =
            serde_json::to_string_pretty(&entry).context("Failed to serialize request log entry")?;
        rendered.push_str("\n\n");

        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open request log: {}", self.path.display()))?;
        file.write_all(rendered.as_bytes())
            .with_context(|| format!("Failed to write request log: {}", self.path.display()))
    }
}
