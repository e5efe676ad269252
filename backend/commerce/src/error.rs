use std::collections::BTreeMap;

use thiserror::Error;

use crate::features::Feature;

/// Upstream rejected the request with a non-2xx status.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message} ({status})")]
pub struct ApiError {
    pub status: u16,
    pub message: String,
    pub errors: Option<BTreeMap<String, Vec<String>>>,
}

#[derive(Error, Debug)]
pub enum CommerceError {
    #[error("{0} is not supported by this provider")]
    Unsupported(Feature),

    #[error("Cart not found")]
    CartNotFound,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("Upstream unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Unexpected upstream payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Failed to read catalog snapshot: {0}")]
    Snapshot(#[from] std::io::Error),

    #[error("Provider misconfigured: {0}")]
    Misconfigured(String),
}

impl CommerceError {
    /// True when the upstream could not be reached at all, as opposed to answering with an error.
    pub fn is_unreachable(&self) -> bool {
        match self {
            CommerceError::Transport(err) => !err.is_status() && !err.is_decode(),
            _ => false,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            CommerceError::Api(err) => Some(err.status),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, CommerceError>;
