//! Tunables for the queue, the worker and the result grid.

use std::str::FromStr;
use std::time::Duration;

/// Service configuration. `Default` matches the limits scripts were written
/// against; [`Config::from_env`] lets a deployment override them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Maximum number of outstanding tasks (pending, running or awaiting drain).
    pub max_tasks: usize,
    /// Rows kept per query; further rows are stepped but dropped.
    pub max_rows: usize,
    /// Columns kept per row; further columns are dropped.
    pub max_columns: usize,
    /// Byte bound for query text and passthrough strings.
    pub max_string_len: usize,
    /// How long a query may keep hitting a busy status before it fails.
    pub busy_timeout: Duration,
    /// Sleep between worker passes.
    pub poll_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            max_tasks: 512,
            max_rows: 256,
            max_columns: 256,
            max_string_len: 1024,
            busy_timeout: Duration::from_millis(2000),
            poll_interval: Duration::from_millis(10),
        }
    }
}

impl Config {
    /// Defaults overlaid with `SQLQ_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Config::default();
        override_with(&lookup, "SQLQ_MAX_TASKS", &mut config.max_tasks);
        override_with(&lookup, "SQLQ_MAX_ROWS", &mut config.max_rows);
        override_with(&lookup, "SQLQ_MAX_COLUMNS", &mut config.max_columns);
        override_with(&lookup, "SQLQ_MAX_STRING_LEN", &mut config.max_string_len);

        let mut busy_ms = config.busy_timeout.as_millis() as u64;
        override_with(&lookup, "SQLQ_BUSY_TIMEOUT_MS", &mut busy_ms);
        config.busy_timeout = Duration::from_millis(busy_ms);

        let mut poll_ms = config.poll_interval.as_millis() as u64;
        override_with(&lookup, "SQLQ_POLL_INTERVAL_MS", &mut poll_ms);
        config.poll_interval = Duration::from_millis(poll_ms);

        config
    }

    /// Grid bounds handed to the engine adapter.
    pub(crate) fn limits(&self) -> GridLimits {
        GridLimits {
            max_rows: self.max_rows,
            max_columns: self.max_columns,
        }
    }
}

/// Bounds applied while capturing a result grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridLimits {
    pub max_rows: usize,
    pub max_columns: usize,
}

fn override_with<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, slot: &mut T) {
    let Some(raw) = lookup(key) else {
        return;
    };
    match raw.trim().parse() {
        Ok(value) => *slot = value,
        Err(_) => tracing::warn!(key, value = %raw, "ignoring unparsable configuration value"),
    }
}

/// Truncate `s` to at most `max` bytes without splitting a character.
pub(crate) fn truncate_to(mut s: String, max: usize) -> String {
    if s.len() > max {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        s.truncate(end);
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn env_overrides_apply_and_bad_values_keep_defaults() {
        let vars: HashMap<&str, &str> = [
            ("SQLQ_MAX_TASKS", "8"),
            ("SQLQ_BUSY_TIMEOUT_MS", "150"),
            ("SQLQ_MAX_ROWS", "many"),
        ]
        .into_iter()
        .collect();

        let config = Config::from_lookup(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.max_tasks, 8);
        assert_eq!(config.busy_timeout, Duration::from_millis(150));
        assert_eq!(config.max_rows, Config::default().max_rows);
        assert_eq!(config.poll_interval, Duration::from_millis(10));
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_to("hello".to_string(), 10), "hello");
        assert_eq!(truncate_to("hello".to_string(), 3), "hel");
        // 'é' is two bytes; cutting at 2 would split it.
        assert_eq!(truncate_to("aé".to_string(), 2), "a");
    }
}
