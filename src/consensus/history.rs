//! Append-only resolution history.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use super::ResolutionLogEntry;
use crate::error::LogResult;

/// Caller-owned sink for resolution records. Implementations only append.
pub trait ResolutionLog {
    /// Append one entry.
    fn append(&mut self, entry: &ResolutionLogEntry) -> LogResult<()>;
}

/// History kept in memory, for tests and short-lived callers.
#[derive(Debug, Clone, Default)]
pub struct InMemoryResolutionLog {
    entries: Vec<ResolutionLogEntry>,
}

impl InMemoryResolutionLog {
    /// Create an empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries in append order.
    pub fn entries(&self) -> &[ResolutionLogEntry] {
        &self.entries
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing has been appended.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ResolutionLog for InMemoryResolutionLog {
    fn append(&mut self, entry: &ResolutionLogEntry) -> LogResult<()> {
        self.entries.push(entry.clone());
        Ok(())
    }
}

/// History stored as JSON lines, one entry per line, opened in append mode.
#[derive(Debug, Clone)]
pub struct JsonlResolutionLog {
    path: PathBuf,
}

impl JsonlResolutionLog {
    /// Use the file at `path`; it is created on first append.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the history file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every entry back, skipping blank lines.
    pub fn read_all(&self) -> LogResult<Vec<ResolutionLogEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let reader = BufReader::new(File::open(&self.path)?);
        let mut entries = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            entries.push(serde_json::from_str(&line)?);
        }
        Ok(entries)
    }
}

impl ResolutionLog for JsonlResolutionLog {
    fn append(&mut self, entry: &ResolutionLogEntry) -> LogResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;

        debug!(path = %self.path.display(), entry_id = %entry.id, "Appended resolution entry");
        Ok(())
    }
}
