use std::sync::Arc;

use chrono::{DateTime, NaiveTime, Utc};
use tracing::{error, info};

use visitlog_core::{analytics::EventStore, config::Config, pipeline::Pipeline};
use visitlog_duckdb::DuckDbBackend;

/// Shared application state injected into every Axum handler via
/// [`axum::extract::State`].
pub struct AppState {
    /// The DuckDB backend, shared with the pipeline as its event store.
    pub db: Arc<DuckDbBackend>,

    /// Parsed configuration, loaded once at startup from environment variables.
    pub config: Arc<Config>,

    /// The ingestion pipeline. Its background tasks run until
    /// [`Pipeline::shutdown`].
    pub pipeline: Arc<Pipeline>,
}

impl AppState {
    /// Wrap the backend and start the pipeline on top of it. Must be called
    /// from within a tokio runtime.
    pub fn new(db: DuckDbBackend, config: Config) -> Self {
        let db = Arc::new(db);
        let store: Arc<dyn EventStore> = Arc::clone(&db) as Arc<dyn EventStore>;
        let pipeline = Pipeline::start(config.pipeline.clone(), store);
        Self {
            db,
            config: Arc::new(config),
            pipeline,
        }
    }

    /// Delete events older than `retention_days` relative to `now`.
    pub async fn prune_expired(&self, now: DateTime<Utc>) -> anyhow::Result<u64> {
        let cutoff = chrono::Duration::try_days(i64::from(self.config.retention_days))
            .and_then(|span| now.checked_sub_signed(span))
            .ok_or_else(|| anyhow::anyhow!("retention window out of range"))?;
        self.db.delete_events_before(cutoff).await
    }

    /// Background loop: prune old events just after each UTC midnight.
    ///
    /// Returns immediately when `retention_days` is `0`. A failed prune is
    /// logged and retried the next night.
    pub async fn run_retention_loop(self: Arc<Self>) {
        if self.config.retention_days == 0 {
            info!("Retention disabled, events are kept forever");
            return;
        }

        loop {
            let now = Utc::now();
            let next_midnight = (now.date_naive() + chrono::Duration::days(1))
                .and_time(NaiveTime::MIN)
                .and_utc();
            let secs_until = (next_midnight - now).num_seconds().max(1) as u64;
            tokio::time::sleep(std::time::Duration::from_secs(secs_until)).await;

            match self.prune_expired(Utc::now()).await {
                Ok(deleted) => info!(
                    deleted,
                    retention_days = self.config.retention_days,
                    "Retention prune complete"
                ),
                Err(e) => error!(error = %e, "Retention prune failed"),
            }
        }
    }
}
