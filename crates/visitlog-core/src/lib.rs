pub mod aggregate;
pub mod analytics;
pub mod buffer;
pub mod config;
pub mod error;
pub mod event;
pub mod pipeline;
pub mod session;
pub mod visitor;

pub use analytics::{AnalyticsSnapshot, EventQuery, EventStore};
pub use event::{PageView, RequestInfo};
pub use pipeline::{Pipeline, TrackedVisit};
