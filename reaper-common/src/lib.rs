//! Shared types for the reaper process lifetime monitor.
//!
//! This crate contains the vocabulary shared between the monitor loop and
//! the sinks that record what it does:
//! - [`Level`] - severity attached to every entry
//! - [`MonitorEvent`] - everything the loop reports, with its fixed message text
//! - [`LogEntry`] - the journal record written one JSON object per line
//!
//! Message wording is part of the observable contract; change it here only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Severity of a monitor entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Level {
    Debug,
    Info,
    Warning,
    Error,
}

impl Level {
    /// Convert to string for storage
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warning => "WARNING",
            Level::Error => "ERROR",
        }
    }
}

/// Things the monitor loop reports
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorEvent {
    /// Monitoring began for a process name
    MonitorStarted {
        name: String,
        poll_interval_secs: i64,
        max_lifetime_secs: i64,
    },

    /// A cycle found no process with the target name
    NoProcessesFound { name: String },

    /// A matched process and how long it has been running
    ProcessObserved { pid: u32, runtime_secs: i64 },

    /// A kill request was issued for an over-age process
    ProcessKilled { pid: u32 },

    /// A kill request could not be delivered
    KillFailed {
        pid: u32,
        name: String,
        reason: String,
    },

    /// The process table could not be read this cycle
    ListFailed { name: String, reason: String },

    /// The loop reached its terminal state
    MonitorStopped { name: String },
}

impl MonitorEvent {
    /// Severity this event is reported at
    pub fn level(&self) -> Level {
        match self {
            MonitorEvent::MonitorStarted { .. } => Level::Info,
            MonitorEvent::NoProcessesFound { .. } => Level::Warning,
            MonitorEvent::ProcessObserved { .. } => Level::Info,
            MonitorEvent::ProcessKilled { .. } => Level::Debug,
            MonitorEvent::KillFailed { .. } => Level::Warning,
            MonitorEvent::ListFailed { .. } => Level::Error,
            MonitorEvent::MonitorStopped { .. } => Level::Info,
        }
    }

    /// Human-readable message for this event
    pub fn message(&self) -> String {
        match self {
            MonitorEvent::MonitorStarted {
                name,
                poll_interval_secs,
                max_lifetime_secs,
            } => format!(
                "monitoring processes named {} every {} seconds, lifetime {} seconds",
                name, poll_interval_secs, max_lifetime_secs
            ),
            MonitorEvent::NoProcessesFound { name } => {
                format!("no processes found with name {}", name)
            }
            MonitorEvent::ProcessObserved { pid, runtime_secs } => {
                format!("process {} has run for {} seconds", pid, runtime_secs)
            }
            MonitorEvent::ProcessKilled { pid } => format!("process {} killed", pid),
            MonitorEvent::KillFailed { pid, name, reason } => {
                format!("failed to kill process {} ({}): {}", pid, name, reason)
            }
            MonitorEvent::ListFailed { name, reason } => {
                format!("failed to list processes named {}: {}", name, reason)
            }
            MonitorEvent::MonitorStopped { name } => {
                format!("monitoring of {} stopped", name)
            }
        }
    }

    /// Pid of the process this event concerns, if any
    pub fn pid(&self) -> Option<u32> {
        match self {
            MonitorEvent::ProcessObserved { pid, .. } => Some(*pid),
            MonitorEvent::ProcessKilled { pid } => Some(*pid),
            MonitorEvent::KillFailed { pid, .. } => Some(*pid),
            _ => None,
        }
    }
}

/// One journal line
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// When the entry was recorded
    pub timestamp: DateTime<Utc>,

    /// Identifies the monitor run that produced the entry
    pub run_id: Uuid,

    /// Severity level
    pub level: Level,

    /// Rendered message
    pub message: String,
}

impl LogEntry {
    /// Create a new entry stamped with the current time
    pub fn new(run_id: Uuid, level: Level, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            run_id,
            level,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observable_messages() {
        let absent = MonitorEvent::NoProcessesFound {
            name: "sample".to_string(),
        };
        assert_eq!(absent.level(), Level::Warning);
        assert_eq!(absent.message(), "no processes found with name sample");

        let observed = MonitorEvent::ProcessObserved {
            pid: 4242,
            runtime_secs: 6,
        };
        assert_eq!(observed.level(), Level::Info);
        assert_eq!(observed.message(), "process 4242 has run for 6 seconds");

        let killed = MonitorEvent::ProcessKilled { pid: 4242 };
        assert_eq!(killed.level(), Level::Debug);
        assert_eq!(killed.message(), "process 4242 killed");
    }

    #[test]
    fn test_failure_levels() {
        let list = MonitorEvent::ListFailed {
            name: "sample".to_string(),
            reason: "permission denied".to_string(),
        };
        assert_eq!(list.level(), Level::Error);
        assert_eq!(list.pid(), None);

        let kill = MonitorEvent::KillFailed {
            pid: 7,
            name: "sample".to_string(),
            reason: "process 7 not found".to_string(),
        };
        assert_eq!(kill.level(), Level::Warning);
        assert_eq!(kill.message(), "failed to kill process 7 (sample): process 7 not found");
        assert_eq!(kill.pid(), Some(7));
    }

    #[test]
    fn test_log_entry_serialization() {
        let entry = LogEntry::new(Uuid::new_v4(), Level::Warning, "no processes found with name sample");

        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("\"level\":\"WARNING\""));

        let back: LogEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(back.run_id, entry.run_id);
        assert_eq!(back.level, Level::Warning);
        assert_eq!(back.message, entry.message);
    }

    #[test]
    fn test_log_entry_deserialization() {
        let json = r#"{
            "timestamp": "2024-05-01T12:00:00Z",
            "run_id": "6f1c1a0e-3b1d-4c55-9d8f-0d7a2b1e9c44",
            "level": "DEBUG",
            "message": "process 12 killed"
        }"#;

        let entry: LogEntry = serde_json::from_str(json).unwrap();
        assert_eq!(entry.level, Level::Debug);
        assert_eq!(entry.level.as_str(), "DEBUG");
        assert_eq!(entry.message, "process 12 killed");
    }
}
