use std::str::FromStr;
use std::time::Duration;

use chrono_tz::Tz;

use crate::error::CoreError;

/// Process-level configuration, read once at startup from `VISITLOG_*`
/// environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub data_dir: String,
    pub duckdb_memory_limit: String,
    /// Days of events to keep; `0` disables the retention loop.
    pub retention_days: u32,
    pub pipeline: PipelineConfig,
}

/// Tuning for the ingestion pipeline and the aggregation engine.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Buffered events that trigger an immediate flush.
    pub batch_size: usize,
    /// Ticker period, and the max age of the buffer before an enqueue flushes.
    pub flush_interval: Duration,
    /// Sliding window for new-vs-returning decisions; also the sweep period.
    pub session_window: Duration,
    /// How far back the detailed aggregation scan looks.
    pub lookback: chrono::Duration,
    /// Row cap for the detailed aggregation scan.
    pub max_rows: usize,
    /// Hourly visit count that maps to 100 % activity.
    pub max_hourly_visits: u64,
    /// How long a snapshot waits for a forced flush before reading anyway.
    pub flush_grace: Duration,
    /// Timezone whose midnight splits "today" from "yesterday".
    pub timezone: Tz,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            flush_interval: Duration::from_secs(600),
            session_window: Duration::from_secs(30 * 60),
            lookback: chrono::Duration::days(90),
            max_rows: 50_000,
            max_hourly_visits: 100,
            flush_grace: Duration::from_millis(100),
            timezone: Tz::UTC,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, CoreError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup. `from_env` passes the
    /// process environment; tests pass a map.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, CoreError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = PipelineConfig::default();

        let batch_size: usize = parse_or(&lookup, "VISITLOG_BATCH_SIZE", defaults.batch_size)?;
        if batch_size == 0 {
            return Err(CoreError::InvalidConfig {
                key: "VISITLOG_BATCH_SIZE",
                reason: "must be at least 1".to_string(),
            });
        }
        let flush_interval_secs: u64 = parse_or(
            &lookup,
            "VISITLOG_FLUSH_INTERVAL_SECS",
            defaults.flush_interval.as_secs(),
        )?;
        let session_window_secs: u64 = parse_or(
            &lookup,
            "VISITLOG_SESSION_WINDOW_SECS",
            defaults.session_window.as_secs(),
        )?;
        // tokio::time::interval panics on a zero period.
        if flush_interval_secs == 0 || session_window_secs == 0 {
            return Err(CoreError::InvalidConfig {
                key: "VISITLOG_FLUSH_INTERVAL_SECS / VISITLOG_SESSION_WINDOW_SECS",
                reason: "must be greater than zero".to_string(),
            });
        }
        let lookback_days: i64 = parse_or(&lookup, "VISITLOG_LOOKBACK_DAYS", 90)?;
        let lookback = day_span("VISITLOG_LOOKBACK_DAYS", lookback_days.max(1))?;
        let retention_days: u32 = parse_or(&lookup, "VISITLOG_RETENTION_DAYS", 365)?;
        day_span("VISITLOG_RETENTION_DAYS", i64::from(retention_days))?;
        let max_hourly_visits: u64 = parse_or(
            &lookup,
            "VISITLOG_MAX_HOURLY_VISITS",
            defaults.max_hourly_visits,
        )?;
        let timezone = match lookup("VISITLOG_TIMEZONE") {
            Some(raw) => Tz::from_str(raw.trim()).map_err(|e| CoreError::InvalidConfig {
                key: "VISITLOG_TIMEZONE",
                reason: e.to_string(),
            })?,
            None => defaults.timezone,
        };

        Ok(Self {
            port: parse_or(&lookup, "VISITLOG_PORT", 3000)?,
            data_dir: lookup("VISITLOG_DATA_DIR").unwrap_or_else(|| "./data".to_string()),
            duckdb_memory_limit: lookup("VISITLOG_DUCKDB_MEMORY")
                .unwrap_or_else(|| "1GB".to_string()),
            retention_days,
            pipeline: PipelineConfig {
                batch_size,
                flush_interval: Duration::from_secs(flush_interval_secs),
                session_window: Duration::from_secs(session_window_secs),
                lookback,
                max_rows: parse_or(&lookup, "VISITLOG_MAX_ROWS", defaults.max_rows)?,
                max_hourly_visits: max_hourly_visits.max(1),
                flush_grace: Duration::from_millis(parse_or(
                    &lookup,
                    "VISITLOG_FLUSH_GRACE_MS",
                    100,
                )?),
                timezone,
            },
        })
    }
}

/// Longest day span accepted for lookback and retention.
pub const MAX_DAYS: i64 = 36_500;

fn day_span(key: &'static str, days: i64) -> Result<chrono::Duration, CoreError> {
    if days > MAX_DAYS {
        return Err(CoreError::InvalidConfig {
            key,
            reason: format!("must be at most {MAX_DAYS} days"),
        });
    }
    chrono::Duration::try_days(days).ok_or(CoreError::InvalidConfig {
        key,
        reason: "out of range".to_string(),
    })
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, CoreError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| CoreError::InvalidConfig {
                key,
                reason: e.to_string(),
            }),
        None => Ok(default),
    }
}
