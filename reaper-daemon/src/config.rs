//! Configuration constants and environment overrides for reaper.

use std::env;
use std::path::PathBuf;

/// Directory name under user's home for reaper data
pub const REAPER_DIR: &str = ".reaper";

/// Events journal filename
pub const EVENTS_LOG: &str = "events.log";

/// Default tracing filter
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Tracing filter used with `--verbose`
pub const VERBOSE_LOG_FILTER: &str = "debug";

/// Environment variable holding a tracing filter directive
pub const LOG_FILTER_VAR: &str = "REAPER_LOG";

/// Environment variable enabling JSON log lines
pub const LOG_JSON_VAR: &str = "REAPER_LOG_JSON";

/// Environment variable holding the events journal path
pub const EVENTS_LOG_VAR: &str = "REAPER_EVENTS_LOG";

/// Get the reaper directory path (~/.reaper)
pub fn get_reaper_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(REAPER_DIR))
}

/// Get the default events journal path (~/.reaper/events.log)
pub fn get_events_log_path() -> Option<PathBuf> {
    get_reaper_dir().map(|d| d.join(EVENTS_LOG))
}

/// Settings read from the environment (and an optional `.env` file)
#[derive(Debug, Clone, Default)]
pub struct EnvSettings {
    /// Tracing filter directive
    pub log_filter: Option<String>,

    /// Emit JSON log lines
    pub log_json: bool,

    /// Journal path
    pub events_log: Option<PathBuf>,
}

impl EnvSettings {
    /// Load settings from environment variables
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build settings from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            log_filter: lookup(LOG_FILTER_VAR).filter(|v| !v.trim().is_empty()),
            log_json: lookup(LOG_JSON_VAR)
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
            events_log: lookup(EVENTS_LOG_VAR)
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_empty_environment() {
        let settings = EnvSettings::from_lookup(lookup_from(&[]));
        assert!(settings.log_filter.is_none());
        assert!(!settings.log_json);
        assert!(settings.events_log.is_none());
    }

    #[test]
    fn test_environment_overrides() {
        let settings = EnvSettings::from_lookup(lookup_from(&[
            (LOG_FILTER_VAR, "reaper=trace"),
            (LOG_JSON_VAR, "1"),
            (EVENTS_LOG_VAR, "/tmp/reaper/events.log"),
        ]));
        assert_eq!(settings.log_filter.as_deref(), Some("reaper=trace"));
        assert!(settings.log_json);
        assert_eq!(settings.events_log, Some(PathBuf::from("/tmp/reaper/events.log")));
    }

    #[test]
    fn test_blank_values_ignored() {
        let settings = EnvSettings::from_lookup(lookup_from(&[
            (LOG_FILTER_VAR, "  "),
            (LOG_JSON_VAR, "yes"),
            (EVENTS_LOG_VAR, ""),
        ]));
        assert!(settings.log_filter.is_none());
        assert!(!settings.log_json);
        assert!(settings.events_log.is_none());
    }

    #[test]
    fn test_default_journal_under_reaper_dir() {
        if let Some(path) = get_events_log_path() {
            assert!(path.ends_with(".reaper/events.log"));
        }
    }
}
