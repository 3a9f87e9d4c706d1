//! Request handlers, one per method.
//!
//! Handlers return a [`Reply`] for every outcome the client should hear
//! about (including refusals like "file not found") and a
//! [`HandlerError`](crate::HandlerError) only for failures they cannot
//! answer themselves.

pub mod auth;
pub mod download;
pub mod list;
pub mod upload;

use tokdoc_protocol::{Status, serialize};
use tracing::error;

use crate::error::HandlerError;

/// A response ready to be written: status line fields plus the payload that
/// follows the envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub status: Status,
    pub access_key: Option<String>,
    pub file_size: Option<u64>,
    pub payload: Vec<u8>,
}

impl Reply {
    /// Status with a zero file size and no payload.
    pub fn empty(status: Status) -> Self {
        Self {
            status,
            access_key: None,
            file_size: Some(0),
            payload: Vec::new(),
        }
    }

    /// Status carrying an access key and no file size.
    pub fn with_key(status: Status, access_key: Option<String>) -> Self {
        Self {
            status,
            access_key,
            file_size: None,
            payload: Vec::new(),
        }
    }

    /// Status advertising and carrying `payload`.
    pub fn with_payload(status: Status, payload: Vec<u8>) -> Self {
        Self {
            status,
            access_key: None,
            file_size: Some(payload.len() as u64),
            payload,
        }
    }

    /// The envelope; its checksum covers the payload.
    pub fn envelope(&self) -> Vec<u8> {
        serialize(
            self.status,
            self.access_key.as_deref(),
            self.file_size,
            &self.payload,
        )
    }
}

/// Run record-store or password-hashing work on the blocking pool.
pub(crate) async fn blocking<F, T>(f: F) -> Result<T, HandlerError>
where
    F: FnOnce() -> Result<T, HandlerError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        HandlerError::Storage(anyhow::anyhow!("blocking task failed: {e}"))
    })?
}
