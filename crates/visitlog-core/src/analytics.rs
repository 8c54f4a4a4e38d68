//! Analytics backend abstraction and the read-side snapshot types.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event::PageView;
use crate::visitor::DeviceType;

/// Bounds for the detailed aggregation scan.
#[derive(Debug, Clone)]
pub struct EventQuery {
    /// Only events with `timestamp >= since`.
    pub since: DateTime<Utc>,
    /// Maximum number of rows returned.
    pub limit: usize,
}

/// Durable store the pipeline flushes into and the aggregation engine reads
/// from.
#[async_trait]
pub trait EventStore: Send + Sync + 'static {
    /// Write a whole flush batch. Either the batch commits or the call errors;
    /// the caller does not retry.
    async fn insert_events(&self, events: &[PageView]) -> anyhow::Result<()>;

    /// Events newest first, bounded by `query`.
    async fn recent_events(&self, query: &EventQuery) -> anyhow::Result<Vec<PageView>>;

    /// Exact lifetime number of stored events.
    async fn count_events(&self) -> anyhow::Result<i64>;

    /// Delete events older than `cutoff`, returning the number removed.
    async fn delete_events_before(&self, cutoff: DateTime<Utc>) -> anyhow::Result<u64>;

    async fn ping(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceBreakdown {
    pub desktop: u32,
    pub mobile: u32,
    pub tablet: u32,
}

impl DeviceBreakdown {
    pub fn get(&self, device: DeviceType) -> u32 {
        match device {
            DeviceType::Desktop => self.desktop,
            DeviceType::Mobile => self.mobile,
            DeviceType::Tablet => self.tablet,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrowserShare {
    pub browser: String,
    pub percentage: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageCount {
    pub path: String,
    pub views: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecentVisit {
    pub path: String,
    pub device_type: DeviceType,
    pub browser: String,
    pub country: String,
    pub timestamp: DateTime<Utc>,
}

/// Point-in-time usage statistics. Recomputed per request, never stored.
///
/// `Default` is the all-zero snapshot served when the store is unavailable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsSnapshot {
    pub unique_visitors: u64,
    pub new_visitors: u64,
    pub returning_visitors: u64,
    /// Exact lifetime count, independent of the lookback window.
    pub total_page_views: u64,
    pub today_page_views: u64,
    pub yesterday_page_views: u64,
    pub views_per_visitor: f64,
    /// Whole-point percentages of desktop + mobile + tablet.
    pub devices: DeviceBreakdown,
    pub top_device: Option<DeviceType>,
    /// Top 5 browsers by count, highest first.
    pub browsers: Vec<BrowserShare>,
    pub top_browser: Option<String>,
    /// Top 10 paths by views, highest first.
    pub top_pages: Vec<PageCount>,
    /// Up to 3 most recent visits within the last hour.
    pub recent_visits: Vec<RecentVisit>,
    pub hourly_visits: u64,
    pub hourly_activity_percentage: u32,
}
