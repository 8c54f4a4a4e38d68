use anyhow::Result;
use chrono::{DateTime, NaiveDateTime, Utc};
use duckdb::types::Type;

use visitlog_core::analytics::EventQuery;
use visitlog_core::event::PageView;
use visitlog_core::visitor::DeviceType;

use crate::backend::TIMESTAMP_FORMAT;
use crate::DuckDbBackend;

/// DuckDB renders `CAST(ts AS VARCHAR)` without fractional seconds when they
/// are zero.
fn parse_datetime(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S"))
        .map(|naive| DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc))
}

fn row_to_page_view(row: &duckdb::Row<'_>) -> duckdb::Result<PageView> {
    let raw_ts: String = row.get(7)?;
    let timestamp = parse_datetime(&raw_ts)
        .map_err(|e| duckdb::Error::FromSqlConversionFailure(7, Type::Text, Box::new(e)))?;
    let duration_ms: i64 = row.get(6)?;
    let device_type: String = row.get(9)?;

    Ok(PageView {
        id: row.get(0)?,
        path: row.get(1)?,
        method: row.get(2)?,
        client_ip: row.get(3)?,
        user_agent: row.get(4)?,
        referrer: row.get(5)?,
        duration_ms: u64::try_from(duration_ms).unwrap_or(0),
        timestamp,
        visitor_id: row.get(8)?,
        device_type: DeviceType::parse(&device_type),
        browser: row.get(10)?,
        os: row.get(11)?,
        country: row.get(12)?,
        utm_source: row.get(13)?,
        utm_medium: row.get(14)?,
        utm_campaign: row.get(15)?,
        is_new_visit: row.get(16)?,
        query: row.get(17)?,
    })
}

impl DuckDbBackend {
    /// Events with `timestamp >= query.since`, newest first, at most
    /// `query.limit` rows. Equal timestamps come back in reverse insertion
    /// order.
    pub async fn recent_events(&self, query: &EventQuery) -> Result<Vec<PageView>> {
        let conn = self.conn.lock().await;
        let since = query.since.format(TIMESTAMP_FORMAT).to_string();
        let limit = i64::try_from(query.limit).unwrap_or(i64::MAX);

        let mut stmt = conn.prepare(
            "SELECT id, path, method, client_ip, user_agent, referrer, duration_ms, \
                    CAST(timestamp AS VARCHAR), visitor_id, device_type, browser, os, \
                    country, utm_source, utm_medium, utm_campaign, is_new_visit, query \
             FROM analytics_events \
             WHERE timestamp >= ?1 \
             ORDER BY timestamp DESC, seq DESC \
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(duckdb::params![since, limit], row_to_page_view)?;

        let mut events = Vec::new();
        for row in rows {
            events.push(row?);
        }
        Ok(events)
    }

    /// Exact number of stored events.
    pub async fn count_events(&self) -> Result<i64> {
        let conn = self.conn.lock().await;
        let count: i64 = conn
            .prepare("SELECT COUNT(*) FROM analytics_events")?
            .query_row([], |row| row.get(0))?;
        Ok(count)
    }

    /// Delete every event older than `cutoff`.
    pub async fn delete_events_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let conn = self.conn.lock().await;
        let cutoff = cutoff.format(TIMESTAMP_FORMAT).to_string();
        let deleted = conn.execute(
            "DELETE FROM analytics_events WHERE timestamp < ?1",
            duckdb::params![cutoff],
        )?;
        Ok(deleted as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parses_fractional_and_whole_seconds() {
        let frac = parse_datetime("2026-03-01 10:15:30.250").expect("fractional");
        assert_eq!(
            frac,
            Utc.with_ymd_and_hms(2026, 3, 1, 10, 15, 30).unwrap()
                + chrono::Duration::milliseconds(250)
        );
        let whole = parse_datetime("2026-03-01 10:15:30").expect("whole");
        assert_eq!(whole, Utc.with_ymd_and_hms(2026, 3, 1, 10, 15, 30).unwrap());
        assert!(parse_datetime("yesterday").is_err());
    }
}
