//! Newline-delimited JSON journal file.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::Utc;

use super::{JournalEntry, JournalEvent, RunId};
use crate::error::OrchestrationError;

/// Parsed contents of a journal file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JournalSnapshot {
    pub entries: Vec<JournalEntry>,
    /// The final line was cut off mid-write
    pub torn_tail: bool,
}

impl JournalSnapshot {
    pub fn last(&self) -> Option<&JournalEntry> {
        self.entries.last()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && !self.torn_tail
    }

    /// Entries written by `run`, in order.
    pub fn run_entries<'a>(&'a self, run: &'a RunId) -> impl Iterator<Item = &'a JournalEntry> {
        self.entries.iter().filter(move |e| &e.run == run)
    }
}

/// Append-only journal bound to the current invocation's run id.
#[derive(Debug)]
pub struct DeploymentJournal {
    path: PathBuf,
    run: RunId,
}

impl DeploymentJournal {
    pub fn open(path: PathBuf) -> Self {
        Self::with_run(path, RunId::generate())
    }

    pub fn with_run(path: PathBuf, run: RunId) -> Self {
        Self { path, run }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn run(&self) -> &RunId {
        &self.run
    }

    /// Read every entry currently on disk.
    pub fn snapshot(&self) -> Result<JournalSnapshot, OrchestrationError> {
        read_snapshot(&self.path).map_err(OrchestrationError::storage)
    }

    /// Append one event for the current run and flush it to disk.
    pub fn append(&self, event: JournalEvent) -> Result<(), OrchestrationError> {
        let entry = JournalEntry {
            run: self.run.clone(),
            at: Utc::now(),
            event,
        };
        self.write_entry(&entry).map_err(OrchestrationError::storage)
    }

    /// Drop a partial final line left by an interrupted write.
    pub fn repair_tail(&self) -> Result<(), OrchestrationError> {
        truncate_partial_line(&self.path).map_err(OrchestrationError::storage)
    }

    fn write_entry(&self, entry: &JournalEntry) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create state directory: {}", parent.display())
            })?;
        }
        let mut line = serde_json::to_string(entry).context("Failed to serialize journal entry")?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open journal: {}", self.path.display()))?;
        file.write_all(line.as_bytes())
            .with_context(|| format!("Failed to append to journal: {}", self.path.display()))?;
        file.sync_data()
            .with_context(|| format!("Failed to sync journal: {}", self.path.display()))?;
        Ok(())
    }
}

fn truncate_partial_line(path: &Path) -> anyhow::Result<()> {
    if !path.exists() {
        return Ok(());
    }
    let bytes =
        fs::read(path).with_context(|| format!("Failed to read journal: {}", path.display()))?;
    if bytes.is_empty() || bytes.ends_with(b"\n") {
        return Ok(());
    }
    let keep = bytes
        .iter()
        .rposition(|b| *b == b'\n')
        .map(|idx| idx + 1)
        .unwrap_or(0);
    let file = OpenOptions::new()
        .write(true)
        .open(path)
        .with_context(|| format!("Failed to open journal: {}", path.display()))?;
    file.set_len(keep as u64)
        .with_context(|| format!("Failed to truncate journal: {}", path.display()))?;
    file.sync_data()
        .with_context(|| format!("Failed to sync journal: {}", path.display()))?;
    tracing::info!(path = %path.display(), kept = keep, "Removed partial journal line");
    Ok(())
}

fn read_snapshot(path: &Path) -> anyhow::Result<JournalSnapshot> {
    if !path.exists() {
        return Ok(JournalSnapshot::default());
    }
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read journal: {}", path.display()))?;
    let complete = content.ends_with('\n');
    let lines: Vec<&str> = content.lines().filter(|l| !l.trim().is_empty()).collect();

    let mut snapshot = JournalSnapshot::default();
    for (idx, line) in lines.iter().enumerate() {
        match serde_json::from_str::<JournalEntry>(line) {
            Ok(entry) => snapshot.entries.push(entry),
            Err(_) if idx + 1 == lines.len() && !complete => {
                tracing::warn!(path = %path.display(), "Journal ends with a partial line");
                snapshot.torn_tail = true;
            }
            Err(e) => {
                anyhow::bail!(
                    "Corrupt journal {} at line {}: {}",
                    path.display(),
                    idx + 1,
                    e
                );
            }
        }
    }
    Ok(snapshot)
}
