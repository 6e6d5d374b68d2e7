//! Process lifetime monitor.
//!
//! Every poll interval the monitor lists the processes carrying the target
//! name, reports how long each has been running and kills the ones that have
//! reached the configured lifetime. The loop stops only through the shutdown
//! signal, which is checked after each cycle and raced against the sleep.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use reaper_common::MonitorEvent;
use thiserror::Error;

use crate::directory::{ProcessDirectory, ProcessHandle};
use crate::shutdown::{ShutdownSignal, WaitOutcome};
use crate::sink::LogSink;

/// Errors raised while building a monitor
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MonitorError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("missing dependency: {0}")]
    MissingDependency(&'static str),
}

/// Validated monitor settings
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    target_name: String,
    poll_interval: TimeDelta,
    max_lifetime: TimeDelta,
    poll_sleep: Duration,
}

impl MonitorConfig {
    /// Validate and build a configuration
    pub fn new(
        target_name: impl Into<String>,
        poll_interval: TimeDelta,
        max_lifetime: TimeDelta,
    ) -> Result<Self, MonitorError> {
        let target_name = target_name.into();
        if target_name.trim().is_empty() {
            return Err(MonitorError::InvalidConfiguration(
                "process name cannot be empty or whitespace, e.g. 'notepad'".to_string(),
            ));
        }
        if poll_interval <= TimeDelta::zero() {
            return Err(MonitorError::InvalidConfiguration(format!(
                "poll interval must be greater than zero, got {} seconds",
                poll_interval.num_seconds()
            )));
        }
        if max_lifetime <= TimeDelta::zero() {
            return Err(MonitorError::InvalidConfiguration(format!(
                "lifetime must be greater than zero, got {} seconds",
                max_lifetime.num_seconds()
            )));
        }
        let poll_sleep = poll_interval.to_std().map_err(|e| {
            MonitorError::InvalidConfiguration(format!("poll interval out of range: {}", e))
        })?;

        Ok(Self {
            target_name,
            poll_interval,
            max_lifetime,
            poll_sleep,
        })
    }

    pub fn target_name(&self) -> &str {
        &self.target_name
    }

    pub fn poll_interval(&self) -> TimeDelta {
        self.poll_interval
    }

    pub fn max_lifetime(&self) -> TimeDelta {
        self.max_lifetime
    }
}

/// Loop state. `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Running,
    Stopped,
}

/// What a single cycle did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Processes matching the target name
    pub matched: usize,

    /// Pids a kill was requested for
    pub kill_requests: Vec<u32>,

    /// Pids whose kill request was accepted
    pub killed: Vec<u32>,

    /// Whether listing the process table failed
    pub list_failed: bool,
}

/// Totals for a whole run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub cycles: u64,
    pub processes_seen: u64,
    pub kill_requests: u64,
    pub kills: u64,
    pub list_failures: u64,
}

impl RunSummary {
    /// Fold one cycle into the totals
    fn record(&mut self, report: &CycleReport) {
        self.cycles += 1;
        self.processes_seen += report.matched as u64;
        self.kill_requests += report.kill_requests.len() as u64;
        self.kills += report.killed.len() as u64;
        if report.list_failed {
            self.list_failures += 1;
        }
    }
}

/// The monitoring loop
pub struct MonitorLoop<D> {
    config: MonitorConfig,
    directory: D,
    shutdown: ShutdownSignal,
    sink: Arc<dyn LogSink>,
    state: MonitorState,
    summary: RunSummary,
}

impl<D: ProcessDirectory> MonitorLoop<D> {
    /// Create a monitor in the `Running` state
    pub fn new(
        config: MonitorConfig,
        directory: D,
        shutdown: ShutdownSignal,
        sink: Option<Arc<dyn LogSink>>,
    ) -> Result<Self, MonitorError> {
        let sink = sink.ok_or(MonitorError::MissingDependency("log sink"))?;

        Ok(Self {
            config,
            directory,
            shutdown,
            sink,
            state: MonitorState::Running,
            summary: RunSummary::default(),
        })
    }

    /// Run cycles until the shutdown signal is set.
    ///
    /// Returns immediately on a monitor that has already stopped.
    pub async fn run(&mut self) -> RunSummary {
        if self.state == MonitorState::Stopped {
            return self.summary;
        }

        self.emit(MonitorEvent::MonitorStarted {
            name: self.config.target_name.clone(),
            poll_interval_secs: self.config.poll_interval().num_seconds(),
            max_lifetime_secs: self.config.max_lifetime().num_seconds(),
        });

        while self.state == MonitorState::Running {
            self.run_cycle();
            self.state = self.pause().await;
        }

        self.emit(MonitorEvent::MonitorStopped {
            name: self.config.target_name.clone(),
        });
        self.summary
    }

    /// Check the signal, then sleep for the poll interval unless it fires
    async fn pause(&self) -> MonitorState {
        if self.shutdown.is_set() {
            return MonitorState::Stopped;
        }
        match self.shutdown.wait_or_set(self.config.poll_sleep).await {
            WaitOutcome::Expired => MonitorState::Running,
            WaitOutcome::Signalled => MonitorState::Stopped,
        }
    }

    /// Run one cycle against the current time
    pub fn run_cycle(&mut self) -> CycleReport {
        self.run_cycle_at(Utc::now())
    }

    /// Run one cycle, measuring runtimes against `now`
    pub fn run_cycle_at(&mut self, now: DateTime<Utc>) -> CycleReport {
        let report = self.cycle(now);
        self.summary.record(&report);
        report
    }

    fn cycle(&mut self, now: DateTime<Utc>) -> CycleReport {
        let mut report = CycleReport::default();

        let processes = match self.directory.list_by_name(&self.config.target_name) {
            Ok(processes) => processes,
            Err(e) => {
                self.emit(MonitorEvent::ListFailed {
                    name: self.config.target_name.clone(),
                    reason: e.to_string(),
                });
                report.list_failed = true;
                return report;
            }
        };

        if processes.is_empty() {
            self.emit(MonitorEvent::NoProcessesFound {
                name: self.config.target_name.clone(),
            });
            return report;
        }

        report.matched = processes.len();
        for process in &processes {
            let runtime = runtime_of(process, now);
            self.emit(MonitorEvent::ProcessObserved {
                pid: process.pid,
                runtime_secs: runtime.num_seconds(),
            });

            if runtime < self.config.max_lifetime() {
                continue;
            }

            report.kill_requests.push(process.pid);
            match self.directory.terminate(process.pid) {
                Ok(()) => {
                    report.killed.push(process.pid);
                    self.emit(MonitorEvent::ProcessKilled { pid: process.pid });
                }
                Err(e) => self.emit(MonitorEvent::KillFailed {
                    pid: process.pid,
                    name: process.name.clone(),
                    reason: e.to_string(),
                }),
            }
        }

        report
    }

    fn emit(&self, event: MonitorEvent) {
        self.sink.log(event.level(), &event.message());
    }
}

#[cfg(test)]
impl<D> MonitorLoop<D> {
    pub fn state(&self) -> MonitorState {
        self.state
    }

    pub fn directory(&self) -> &D {
        &self.directory
    }

    pub fn summary(&self) -> RunSummary {
        self.summary
    }
}

/// Time since the process started. A start time in the future counts as zero.
fn runtime_of(process: &ProcessHandle, now: DateTime<Utc>) -> TimeDelta {
    (now - process.start_time).max(TimeDelta::zero())
}
