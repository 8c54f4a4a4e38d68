use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid config {key}: {reason}")]
    InvalidConfig { key: &'static str, reason: String },
}
