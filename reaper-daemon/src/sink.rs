//! Log sinks the monitor loop reports to.
//!
//! The tracing sink feeds the console subscriber. The journal sink is an
//! optional JSON-lines record of every entry, for later inspection.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use reaper_common::{Level, LogEntry};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Destination for monitor entries
pub trait LogSink: Send + Sync {
    /// Record one entry
    fn log(&self, level: Level, message: &str);
}

/// Forwards entries to `tracing`
pub struct TracingSink {
    target_name: String,
}

impl TracingSink {
    /// Create a sink that tags entries with the monitored process name
    pub fn new(target_name: impl Into<String>) -> Self {
        Self {
            target_name: target_name.into(),
        }
    }
}

impl LogSink for TracingSink {
    fn log(&self, level: Level, message: &str) {
        let name = self.target_name.as_str();
        match level {
            Level::Debug => debug!(process = name, "{}", message),
            Level::Info => info!(process = name, "{}", message),
            Level::Warning => warn!(process = name, "{}", message),
            Level::Error => error!(process = name, "{}", message),
        }
    }
}

/// Appends entries as JSON lines to a file
pub struct JournalSink {
    path: PathBuf,
    run_id: Uuid,
    file: Mutex<Option<File>>,
}

impl JournalSink {
    /// Create a journal; the file is opened on first write
    pub fn new(path: PathBuf, run_id: Uuid) -> Self {
        Self {
            path,
            run_id,
            file: Mutex::new(None),
        }
    }

    /// Path of the journal file
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    fn open(&self) -> std::io::Result<File> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        OpenOptions::new().create(true).append(true).open(&self.path)
    }

    fn append(&self, entry: &LogEntry) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');

        let mut guard = self.file.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if guard.is_none() {
            *guard = Some(self.open()?);
        }
        if let Some(file) = guard.as_mut() {
            if let Err(e) = file.write_all(line.as_bytes()).and_then(|_| file.flush()) {
                // Reopen on the next entry
                *guard = None;
                return Err(Box::new(e));
            }
        }
        Ok(())
    }
}

impl LogSink for JournalSink {
    fn log(&self, level: Level, message: &str) {
        let entry = LogEntry::new(self.run_id, level, message);
        if let Err(e) = self.append(&entry) {
            warn!("Failed to write journal entry to {}: {}", self.path.display(), e);
        }
    }
}

/// Delivers each entry to several sinks, in order
pub struct FanoutSink {
    sinks: Vec<Arc<dyn LogSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn LogSink>>) -> Self {
        Self { sinks }
    }
}

impl LogSink for FanoutSink {
    fn log(&self, level: Level, message: &str) {
        for sink in &self.sinks {
            sink.log(level, message);
        }
    }
}

/// Sink that keeps entries in memory, for tests
#[cfg(test)]
#[derive(Default)]
pub struct MemorySink {
    entries: Mutex<Vec<(Level, String)>>,
}

#[cfg(test)]
impl MemorySink {
    pub fn entries(&self) -> Vec<(Level, String)> {
        self.entries.lock().unwrap().clone()
    }

    pub fn count(&self, level: Level) -> usize {
        self.entries().iter().filter(|(l, _)| *l == level).count()
    }

    pub fn messages(&self, level: Level) -> Vec<String> {
        self.entries()
            .into_iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, m)| m)
            .collect()
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }
}

#[cfg(test)]
impl LogSink for MemorySink {
    fn log(&self, level: Level, message: &str) {
        self.entries.lock().unwrap().push((level, message.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_journal_appends_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("events.log");
        let run_id = Uuid::new_v4();
        let journal = JournalSink::new(path.clone(), run_id);

        journal.log(Level::Warning, "no processes found with name sample");
        journal.log(Level::Debug, "process 12 killed");

        let contents = std::fs::read_to_string(&path).unwrap();
        let entries: Vec<LogEntry> = contents
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].level, Level::Warning);
        assert_eq!(entries[1].message, "process 12 killed");
        assert!(entries.iter().all(|e| e.run_id == run_id));
    }

    #[test]
    fn test_journal_keeps_existing_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.log");
        std::fs::write(&path, "{\"earlier\":true}\n").unwrap();

        let journal = JournalSink::new(path.clone(), Uuid::new_v4());
        journal.log(Level::Info, "process 3 has run for 1 seconds");

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 2);
        assert!(contents.starts_with("{\"earlier\":true}"));
    }

    #[test]
    fn test_journal_write_failure_is_swallowed() {
        let dir = tempfile::tempdir().unwrap();
        // A directory cannot be opened for appending
        let journal = JournalSink::new(dir.path().to_path_buf(), Uuid::new_v4());

        journal.log(Level::Error, "failed to list processes named sample: boom");
    }

    #[test]
    fn test_fanout_preserves_order() {
        let first = Arc::new(MemorySink::default());
        let second = Arc::new(MemorySink::default());
        let fanout = FanoutSink::new(vec![
            first.clone() as Arc<dyn LogSink>,
            second.clone() as Arc<dyn LogSink>,
        ]);

        fanout.log(Level::Info, "one");
        fanout.log(Level::Debug, "two");

        let expected = vec![
            (Level::Info, "one".to_string()),
            (Level::Debug, "two".to_string()),
        ];
        assert_eq!(first.entries(), expected);
        assert_eq!(second.entries(), expected);
    }
}
