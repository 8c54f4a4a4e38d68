/// DuckDB initialization SQL.
///
/// Executed once at database open time via `Connection::execute_batch`.
/// Every statement uses `IF NOT EXISTS`, so it runs on every startup.
///
/// `memory_limit` comes from `Config.duckdb_memory_limit`
/// (env `VISITLOG_DUCKDB_MEMORY`, default `"1GB"`). Always set explicitly:
/// DuckDB otherwise claims 80% of system RAM.
pub fn init_sql(memory_limit: &str) -> String {
    format!(
        r#"SET memory_limit = '{memory_limit}';
SET threads = 2;

-- ===========================================
-- ANALYTICS EVENTS (one row per tracked page view)
-- ===========================================
CREATE SEQUENCE IF NOT EXISTS analytics_events_seq;
CREATE TABLE IF NOT EXISTS analytics_events (
    id              VARCHAR PRIMARY KEY,           -- uuid v4
    seq             BIGINT NOT NULL DEFAULT nextval('analytics_events_seq'),  -- insertion order, breaks timestamp ties
    path            VARCHAR NOT NULL,
    method          VARCHAR NOT NULL,
    client_ip       VARCHAR NOT NULL,
    user_agent      VARCHAR NOT NULL,
    referrer        VARCHAR NOT NULL DEFAULT '',
    duration_ms     BIGINT NOT NULL DEFAULT 0,
    timestamp       TIMESTAMP NOT NULL,            -- UTC
    visitor_id      VARCHAR NOT NULL,              -- 16 hex chars
    device_type     VARCHAR NOT NULL,              -- desktop | mobile | tablet
    browser         VARCHAR NOT NULL,
    os              VARCHAR NOT NULL,
    country         VARCHAR NOT NULL DEFAULT '',
    utm_source      VARCHAR NOT NULL DEFAULT '',
    utm_medium      VARCHAR NOT NULL DEFAULT '',
    utm_campaign    VARCHAR NOT NULL DEFAULT '',
    is_new_visit    BOOLEAN NOT NULL,
    query           VARCHAR NOT NULL DEFAULT ''
);
CREATE INDEX IF NOT EXISTS idx_events_timestamp   ON analytics_events(timestamp);
CREATE INDEX IF NOT EXISTS idx_events_path        ON analytics_events(path);
CREATE INDEX IF NOT EXISTS idx_events_client_ip   ON analytics_events(client_ip);
CREATE INDEX IF NOT EXISTS idx_events_visitor     ON analytics_events(visitor_id);
CREATE INDEX IF NOT EXISTS idx_events_device_type ON analytics_events(device_type);
CREATE INDEX IF NOT EXISTS idx_events_utm_source  ON analytics_events(utm_source);
"#
    )
}

/// Tracks applied schema migrations. Created before [`init_sql`] runs.
pub const MIGRATIONS_TABLE_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS _migrations (
    id          VARCHAR PRIMARY KEY,
    applied_at  TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);
"#;
