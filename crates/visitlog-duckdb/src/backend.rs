use std::sync::Arc;

use anyhow::Result;
use duckdb::Connection;
use tokio::sync::Mutex;
use tracing::info;

use visitlog_core::event::PageView;

use crate::schema::{init_sql, MIGRATIONS_TABLE_SQL};

/// Timestamp format used for every `TIMESTAMP` value written or compared.
pub(crate) const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// DuckDB-backed event store.
///
/// DuckDB is single-writer, so the connection sits behind an async mutex and
/// the pipeline's flush worker is the only regular writer. Cloning the `Arc`
/// shares one connection between the pipeline and the axum handlers.
///
/// Memory and thread limits are applied by [`init_sql`] at open time.
pub struct DuckDbBackend {
    pub(crate) conn: Arc<Mutex<Connection>>,
}

impl DuckDbBackend {
    /// Open (or create) a DuckDB database file at `path`.
    ///
    /// `memory_limit` is a DuckDB size string such as `"1GB"` or `"512MB"`.
    pub fn open(path: &str, memory_limit: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(MIGRATIONS_TABLE_SQL)?;
        conn.execute_batch(&init_sql(memory_limit))?;
        info!(path, memory_limit, threads = 2, "DuckDB opened");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory database. Data is discarded on drop.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(MIGRATIONS_TABLE_SQL)?;
        conn.execute_batch(&init_sql("1GB"))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Insert a flush batch in a single transaction.
    ///
    /// Either every row commits or none does. Empty batches are a no-op.
    pub async fn insert_events(&self, events: &[PageView]) -> Result<()> {
        if events.is_empty() {
            return Ok(());
        }

        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;

        {
            let mut stmt = tx.prepare(
                r#"INSERT INTO analytics_events (
                    id, path, method, client_ip, user_agent, referrer, duration_ms,
                    timestamp, visitor_id, device_type, browser, os, country,
                    utm_source, utm_medium, utm_campaign, is_new_visit, query
                ) VALUES (
                    ?1,  ?2,  ?3,  ?4,  ?5,  ?6,  ?7,
                    ?8,  ?9,  ?10, ?11, ?12, ?13,
                    ?14, ?15, ?16, ?17, ?18
                )"#,
            )?;
            for event in events {
                stmt.execute(duckdb::params![
                    event.id,
                    event.path,
                    event.method,
                    event.client_ip,
                    event.user_agent,
                    event.referrer,
                    i64::try_from(event.duration_ms).unwrap_or(i64::MAX),
                    event.timestamp.format(TIMESTAMP_FORMAT).to_string(),
                    event.visitor_id,
                    event.device_type.as_str(),
                    event.browser,
                    event.os,
                    event.country,
                    event.utm_source,
                    event.utm_medium,
                    event.utm_campaign,
                    event.is_new_visit,
                    event.query,
                ])?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    /// `SELECT 1` liveness check for `/health`.
    pub async fn ping(&self) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute_batch("SELECT 1")?;
        Ok(())
    }

    /// Acquire the connection lock for direct queries in integration tests.
    pub async fn conn_for_test(&self) -> tokio::sync::MutexGuard<'_, Connection> {
        self.conn.lock().await
    }
}
