/// Re-export `Config` from `visitlog-core`.
///
/// Environment parsing lives in core so integration tests can build a
/// `Config` without the server.
pub use visitlog_core::config::{Config, PipelineConfig};
