//! Process table access.
//!
//! Matching is by exact OS-reported name only. On Linux that is the kernel
//! `comm` value, truncated to 15 bytes.

use std::ffi::OsStr;

use chrono::{DateTime, Utc};
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};
use thiserror::Error;

/// Snapshot of a live process, valid only for the tick that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessHandle {
    pub pid: u32,
    pub name: String,
    pub start_time: DateTime<Utc>,
}

/// Errors from the process table
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("process {0} not found")]
    NotFound(u32),

    #[error("kill request for process {0} was rejected")]
    KillRejected(u32),

    #[error("process table unavailable: {0}")]
    Unavailable(String),
}

/// Query and terminate processes by name
pub trait ProcessDirectory {
    /// All processes whose name equals `name`. No match is an empty list.
    fn list_by_name(&mut self, name: &str) -> Result<Vec<ProcessHandle>, DirectoryError>;

    /// Request termination of `pid`
    fn terminate(&mut self, pid: u32) -> Result<(), DirectoryError>;
}

/// Process directory backed by `sysinfo`
pub struct SystemDirectory {
    system: System,
}

impl SystemDirectory {
    /// Create a directory with an empty process table
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }
}

impl Default for SystemDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessDirectory for SystemDirectory {
    fn list_by_name(&mut self, name: &str) -> Result<Vec<ProcessHandle>, DirectoryError> {
        self.system
            .refresh_processes_specifics(ProcessesToUpdate::All, ProcessRefreshKind::new());
        // We are always running ourselves, so an empty table means it could not be read
        if self.system.processes().is_empty() {
            return Err(DirectoryError::Unavailable(
                "no processes visible after refresh".to_string(),
            ));
        }

        let target = OsStr::new(name);
        let mut matches: Vec<ProcessHandle> = self
            .system
            .processes()
            .values()
            .filter(|process| process.name() == target)
            .map(|process| ProcessHandle {
                pid: process.pid().as_u32(),
                name: process.name().to_string_lossy().into_owned(),
                start_time: start_time_from_epoch(process.start_time()),
            })
            .collect();

        matches.sort_by_key(|handle| handle.pid);
        Ok(matches)
    }

    fn terminate(&mut self, pid: u32) -> Result<(), DirectoryError> {
        let process = self
            .system
            .process(Pid::from_u32(pid))
            .ok_or(DirectoryError::NotFound(pid))?;

        if process.kill() {
            Ok(())
        } else {
            Err(DirectoryError::KillRejected(pid))
        }
    }
}

/// Convert a start time in seconds since the epoch. Unrepresentable values
/// count as "started now".
fn start_time_from_epoch(secs: u64) -> DateTime<Utc> {
    i64::try_from(secs)
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .unwrap_or_else(Utc::now)
}

/// In-memory directory for tests
#[cfg(test)]
pub mod fake {
    use super::*;
    use std::collections::HashSet;

    #[derive(Debug, Default)]
    pub struct FakeDirectory {
        pub processes: Vec<ProcessHandle>,
        pub kill_requests: Vec<u32>,
        pub reject_kills: HashSet<u32>,
        pub list_failures: usize,
        pub list_calls: usize,
    }

    impl FakeDirectory {
        pub fn with_processes(processes: Vec<ProcessHandle>) -> Self {
            Self {
                processes,
                ..Self::default()
            }
        }
    }

    impl ProcessDirectory for FakeDirectory {
        fn list_by_name(&mut self, name: &str) -> Result<Vec<ProcessHandle>, DirectoryError> {
            self.list_calls += 1;
            if self.list_failures > 0 {
                self.list_failures -= 1;
                return Err(DirectoryError::Unavailable("simulated failure".to_string()));
            }
            Ok(self
                .processes
                .iter()
                .filter(|p| p.name == name)
                .cloned()
                .collect())
        }

        fn terminate(&mut self, pid: u32) -> Result<(), DirectoryError> {
            self.kill_requests.push(pid);
            if self.reject_kills.contains(&pid) {
                return Err(DirectoryError::KillRejected(pid));
            }
            let before = self.processes.len();
            self.processes.retain(|p| p.pid != pid);
            if self.processes.len() == before {
                return Err(DirectoryError::NotFound(pid));
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_time_conversion() {
        let start = start_time_from_epoch(1_700_000_000);
        assert_eq!(start.timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_start_time_out_of_range() {
        let before = Utc::now();
        let start = start_time_from_epoch(u64::MAX);
        assert!(start >= before);
    }

    #[test]
    fn test_system_directory_finds_no_ghosts() {
        let mut directory = SystemDirectory::new();
        let found = directory
            .list_by_name("reaper-no-such-process-name")
            .unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn test_system_directory_lists_current_process() {
        let mut directory = SystemDirectory::new();
        let me = std::process::id();

        directory.system.refresh_processes(ProcessesToUpdate::All);
        let name = directory
            .system
            .process(Pid::from_u32(me))
            .map(|p| p.name().to_string_lossy().into_owned());

        if let Some(name) = name {
            let found = directory.list_by_name(&name).unwrap();
            let handle = found.iter().find(|h| h.pid == me).unwrap();
            assert_eq!(handle.name, name);
            assert!(handle.start_time <= Utc::now());
        }
    }

    #[test]
    fn test_terminate_unknown_pid() {
        let mut directory = SystemDirectory::new();
        let result = directory.terminate(u32::MAX - 1);
        assert!(matches!(result, Err(DirectoryError::NotFound(_))));
    }
}
