use async_trait::async_trait;
use chrono::{DateTime, Utc};

use visitlog_core::analytics::{EventQuery, EventStore};
use visitlog_core::event::PageView;

use crate::DuckDbBackend;

#[async_trait]
impl EventStore for DuckDbBackend {
    async fn insert_events(&self, events: &[PageView]) -> anyhow::Result<()> {
        DuckDbBackend::insert_events(self, events).await
    }

    async fn recent_events(&self, query: &EventQuery) -> anyhow::Result<Vec<PageView>> {
        DuckDbBackend::recent_events(self, query).await
    }

    async fn count_events(&self) -> anyhow::Result<i64> {
        DuckDbBackend::count_events(self).await
    }

    async fn delete_events_before(&self, cutoff: DateTime<Utc>) -> anyhow::Result<u64> {
        DuckDbBackend::delete_events_before(self, cutoff).await
    }

    async fn ping(&self) -> anyhow::Result<()> {
        DuckDbBackend::ping(self).await
    }
}
