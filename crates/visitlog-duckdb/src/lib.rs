pub mod analytics_impl;
pub mod backend;
pub mod queries;
pub mod schema;

pub use backend::DuckDbBackend;

/// Re-export the `duckdb` crate so consumers (especially tests) can use
/// `visitlog_duckdb::duckdb::params!` without an extra dependency.
pub use duckdb;
