use std::time::Duration;

use thiserror::Error;

use crate::types::{Host, ScanStatus};

/// Transport-level failure of a single `analyze` call. Every variant is
/// considered transient and is retried by the poller.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("HTTP status {status} from {url}")]
    Status { status: u16, url: String },

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("undecodable response body: {0}")]
    Decode(String),
}

/// Why a host could not be driven to a terminal status.
#[derive(Debug, Error)]
pub enum PollFailure {
    #[error("{host}: gave up after {attempts} attempt(s): {source}")]
    RetriesExhausted {
        host: Host,
        attempts: u32,
        #[source]
        source: ApiError,
    },

    #[error("{host}: response carried no status field")]
    MissingStatus { host: Host },

    #[error("{host}: job still {status} after {waited:?}")]
    WaitExceeded {
        host: Host,
        status: ScanStatus,
        waited: Duration,
    },

    #[error("{host}: scan cancelled")]
    Cancelled { host: Host },
}

impl PollFailure {
    pub fn host(&self) -> &Host {
        match self {
            PollFailure::RetriesExhausted { host, .. }
            | PollFailure::MissingStatus { host }
            | PollFailure::WaitExceeded { host, .. }
            | PollFailure::Cancelled { host } => host,
        }
    }
}
