use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::visitor::DeviceType;

/// Request metadata the host hands to the pipeline once a response has been
/// produced. Everything else on a [`PageView`] is derived by the pipeline.
#[derive(Debug, Clone, Default)]
pub struct RequestInfo {
    pub path: String,
    pub method: String,
    pub client_ip: String,
    pub user_agent: String,
    pub referrer: String,
    /// Raw query string without the leading `?`.
    pub query: String,
    pub duration_ms: u64,
}

/// The enriched, stored version of a tracked request. Mirrors the DuckDB
/// `analytics_events` table columns exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PageView {
    pub id: String,
    pub path: String,
    pub method: String,
    pub client_ip: String,
    pub user_agent: String,
    pub referrer: String,
    pub duration_ms: u64,
    /// Stamped by the pipeline at request completion, never by the caller.
    pub timestamp: DateTime<Utc>,
    /// `fingerprint(client_ip, user_agent)`, see [`crate::visitor::fingerprint`].
    pub visitor_id: String,
    pub device_type: DeviceType,
    pub browser: String,
    pub os: String,
    /// No IP-geo lookup is performed; always empty unless a store fills it.
    pub country: String,
    pub utm_source: String,
    pub utm_medium: String,
    pub utm_campaign: String,
    pub is_new_visit: bool,
    pub query: String,
}
