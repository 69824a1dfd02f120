//! Command history: a bounded, ordered log of executed lines.
//!
//! Persisted as one line per entry:
//!
//! ```text
//! <unix seconds>|<true|false>|<duration in nanoseconds>|<command>
//! ```
//!
//! The command is everything after the third `|`, so it may contain `|`
//! itself but never a newline.

use crate::format::format_duration;
use chrono::{DateTime, Local, TimeZone};
use parking_lot::Mutex;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// History shared between the REPL and the signal listener.
pub type SharedHistory = Arc<Mutex<History>>;

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("failed to read history file {path}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("failed to write history file {path}: {source}")]
    Write { path: PathBuf, source: io::Error },
    #[error("history index {index} out of range (1-{len})")]
    OutOfRange { index: usize, len: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub command: String,
    pub timestamp: DateTime<Local>,
    pub success: bool,
    pub duration: Duration,
}

impl HistoryEntry {
    fn encode(&self) -> String {
        format!(
            "{}|{}|{}|{}",
            self.timestamp.timestamp(),
            self.success,
            self.duration.as_nanos(),
            self.command
        )
    }

    fn decode(line: &str) -> Option<Self> {
        let mut parts = line.splitn(4, '|');
        let secs: i64 = parts.next()?.parse().ok()?;
        let success: bool = parts.next()?.parse().ok()?;
        let nanos: u64 = parts.next()?.parse().ok()?;
        let command = parts.next().filter(|c| !c.trim().is_empty())?;
        let timestamp = Local.timestamp_opt(secs, 0).single()?;
        Some(HistoryEntry {
            command: command.to_string(),
            timestamp,
            success,
            duration: Duration::from_nanos(nanos),
        })
    }
}

#[derive(Debug)]
pub struct History {
    entries: Vec<HistoryEntry>,
    max_size: usize,
    path: PathBuf,
}

/// `$HOME/.slsh_history`, or `/tmp/.slsh_history` without a home directory.
pub fn default_history_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join(".slsh_history")
}

impl History {
    pub fn new(max_size: usize, path: impl Into<PathBuf>) -> Self {
        Self {
            entries: Vec::new(),
            max_size,
            path: path.into(),
        }
    }

    pub fn into_shared(self) -> SharedHistory {
        Arc::new(Mutex::new(self))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    /// Records an executed line.
    ///
    /// Blank lines and immediate repeats of the previous command are dropped.
    /// Once the log is over `max_size` the oldest entries are discarded.
    pub fn add(&mut self, command: &str, success: bool, duration: Duration) {
        let command = command.trim();
        if command.is_empty() {
            return;
        }
        if self.entries.last().is_some_and(|last| last.command == command) {
            return;
        }

        self.entries.push(HistoryEntry {
            command: command.to_string(),
            timestamp: Local::now(),
            success,
            duration,
        });
        self.truncate_front();
    }

    fn truncate_front(&mut self) {
        if self.entries.len() > self.max_size {
            let excess = self.entries.len() - self.max_size;
            self.entries.drain(..excess);
        }
    }

    /// The last `n` entries, oldest first.
    pub fn last(&self, n: usize) -> &[HistoryEntry] {
        let start = self.entries.len().saturating_sub(n);
        &self.entries[start..]
    }

    /// Case-insensitive substring search, in log order.
    ///
    /// Each match comes with its zero-based position in the log.
    pub fn search(&self, query: &str) -> Vec<(usize, &HistoryEntry)> {
        let query = query.to_lowercase();
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.command.to_lowercase().contains(&query))
            .collect()
    }

    /// Command at the 1-based position `index`.
    pub fn get_by_index(&self, index: usize) -> Result<&str, HistoryError> {
        index
            .checked_sub(1)
            .and_then(|i| self.entries.get(i))
            .map(|e| e.command.as_str())
            .ok_or(HistoryError::OutOfRange {
                index,
                len: self.entries.len(),
            })
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Replaces the in-memory log with the contents of the history file.
    ///
    /// A missing file leaves an empty log. Malformed lines are skipped.
    pub fn load(&mut self) -> Result<(), HistoryError> {
        let read_err = |source| HistoryError::Read {
            path: self.path.clone(),
            source,
        };
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("no history file at {}", self.path.display());
                return Ok(());
            }
            Err(e) => return Err(read_err(e)),
        };

        let mut entries = Vec::new();
        let mut skipped = 0usize;
        for line in BufReader::new(file).lines() {
            let line = line.map_err(read_err)?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match HistoryEntry::decode(line) {
                Some(entry) => entries.push(entry),
                None => skipped += 1,
            }
        }

        self.entries = entries;
        self.truncate_front();
        debug!(
            "loaded {} history entries ({} skipped) from {}",
            self.entries.len(),
            skipped,
            self.path.display()
        );
        Ok(())
    }

    /// Rewrites the history file with the current log.
    pub fn save(&self) -> Result<(), HistoryError> {
        let write_err = |source| HistoryError::Write {
            path: self.path.clone(),
            source,
        };
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(write_err)?;
        }
        let mut writer = BufWriter::new(File::create(&self.path).map_err(write_err)?);
        for entry in &self.entries {
            writeln!(writer, "{}", entry.encode()).map_err(write_err)?;
        }
        writer.flush().map_err(write_err)?;
        debug!(
            "saved {} history entries to {}",
            self.entries.len(),
            self.path.display()
        );
        Ok(())
    }

    /// Listing used by the `history` command.
    pub fn format_entries(&self, show_time: bool, show_duration: bool) -> String {
        if self.entries.is_empty() {
            return "No history entries\n".to_string();
        }
        format_listing(self.entries.iter().enumerate(), show_time, show_duration)
    }
}

/// Renders `(zero-based index, entry)` pairs as numbered listing lines.
pub fn format_listing<'a>(
    entries: impl Iterator<Item = (usize, &'a HistoryEntry)>,
    show_time: bool,
    show_duration: bool,
) -> String {
    let mut out = String::new();
    for (i, entry) in entries {
        let mut parts = Vec::with_capacity(5);
        if show_time {
            parts.push(entry.timestamp.format("%H:%M:%S").to_string());
        }
        parts.push(format!("{:4}", i + 1));
        parts.push(if entry.success { "✓" } else { "✗" }.to_string());
        parts.push(entry.command.clone());
        if show_duration && !entry.duration.is_zero() {
            parts.push(format!("({})", format_duration(entry.duration)));
        }
        out.push_str(&parts.join(" "));
        out.push('\n');
    }
    out
}
