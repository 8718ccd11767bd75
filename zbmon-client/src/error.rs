use thiserror::Error;
use tonic::{Code, Status};

/// Errors surfaced by a single stats poll or by client construction.
#[derive(Debug, Error)]
pub enum StatsError {
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("deadline exceeded")]
    DeadlineExceeded,

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("request cancelled")]
    Cancelled,
}

impl From<Status> for StatsError {
    fn from(status: Status) -> Self {
        match status.code() {
            Code::Unavailable => StatsError::Connection(status.message().to_string()),
            Code::DeadlineExceeded => StatsError::DeadlineExceeded,
            Code::Cancelled => StatsError::Cancelled,
            _ => StatsError::InvalidResponse(status.to_string()),
        }
    }
}
