//! Domain errors for the mirror proxy.

use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;

/// Errors raised by a [`ContentStore`](crate::domain::ports::ContentStore).
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The asset record exists but the blob it points at is gone.
    #[error("Missing blob {blob_id} for {path}")]
    MissingBlob { path: String, blob_id: String },

    #[error("Storage I/O error: {0}")]
    Io(String),

    #[error("Invalid content: {0}")]
    InvalidContent(String),
}

impl StoreError {
    /// Returns true if the store is inconsistent rather than failing.
    pub fn is_inconsistency(&self) -> bool {
        matches!(self, Self::MissingBlob { .. })
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err.to_string())
    }
}

/// Errors raised by an [`OriginClient`](crate::domain::ports::OriginClient).
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// Network-level failure talking to the origin.
    #[error("Transient fetch failure for {url}: {message}")]
    Transient { url: String, message: String },

    /// The origin is auto-blocked after repeated failures.
    #[error("Remote {remote} is blocked until {until}")]
    RemoteBlocked { remote: String, until: DateTime<Utc> },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// Errors surfaced by the proxy facet.
///
/// Cloneable so that a single cooperation outcome can be handed to every
/// waiter on the same key.
#[derive(Debug, Clone, Error)]
pub enum ProxyError {
    /// Definitive upstream failure (401, 402, 407 or any 5xx).
    #[error("Upstream service returned status {status} for {url}")]
    UpstreamService { status: u16, url: String },

    #[error("Transient failure: {0}")]
    Transient(String),

    #[error("Remote {remote} is blocked until {until}")]
    RemoteBlocked { remote: String, until: DateTime<Utc> },

    /// The active-phase attempt for a key did not finish in time.
    #[error("Cooperation timed out after {timeout:?} for {key}")]
    CooperationTimeout { key: String, timeout: Duration },

    /// The leader for a key went away without publishing an outcome.
    #[error("Cooperation leader for {key} aborted without an outcome")]
    CooperationAborted { key: String },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Invalid upstream response: {0}")]
    InvalidResponse(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl ProxyError {
    /// Returns true if a stale cached copy may be served instead of this error.
    pub fn is_degradable(&self) -> bool {
        match self {
            ProxyError::UpstreamService { .. }
            | ProxyError::Transient(_)
            | ProxyError::RemoteBlocked { .. } => true,
            ProxyError::Store(err) => !matches!(err, StoreError::InvalidContent(_)),
            _ => false,
        }
    }

    /// Upstream status carried by this error, if any.
    pub fn upstream_status(&self) -> Option<u16> {
        match self {
            ProxyError::UpstreamService { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<FetchError> for ProxyError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::Transient { .. } => ProxyError::Transient(err.to_string()),
            FetchError::RemoteBlocked { remote, until } => ProxyError::RemoteBlocked { remote, until },
            FetchError::InvalidRequest(msg) => ProxyError::BadRequest(msg),
        }
    }
}

pub type ProxyResult<T> = Result<T, ProxyError>;
