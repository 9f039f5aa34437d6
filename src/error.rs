use std::io;
use std::path::PathBuf;

use reqwest::StatusCode;
use thiserror::Error;

use crate::planner::ByteRange;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("unexpected HTTP status {0}")]
    UnexpectedStatus(StatusCode),

    #[error("connection interrupted: {0}")]
    Interrupted(String),
}

/// Failure of a single range worker. Never affects sibling workers.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("network error on bytes {range}: {reason}")]
    Network { range: ByteRange, reason: String },

    #[error("write error on bytes {range}: {source}")]
    Io {
        range: ByteRange,
        #[source]
        source: io::Error,
    },

    #[error("worker for bytes {range} terminated abnormally: {reason}")]
    Aborted { range: ByteRange, reason: String },
}

impl FetchError {
    pub fn range(&self) -> ByteRange {
        match self {
            FetchError::Network { range, .. }
            | FetchError::Io { range, .. }
            | FetchError::Aborted { range, .. } => *range,
        }
    }

    pub(crate) fn network(range: ByteRange, err: TransportError) -> Self {
        FetchError::Network {
            range,
            reason: err.to_string(),
        }
    }

    pub(crate) fn io(range: ByteRange, source: io::Error) -> Self {
        FetchError::Io { range, source }
    }
}

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("could not determine the size of {url}: {reason}")]
    SizeUnknown { url: String, reason: String },

    #[error("failed to prepare {}: {source}", .path.display())]
    Prepare {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
