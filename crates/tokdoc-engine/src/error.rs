use thiserror::Error;
use tokdoc_protocol::Status;

/// Failure inside a request handler.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("User not found: {0}")]
    UserNotFound(String),

    /// Record or file store failed. Opaque to the client.
    #[error("Storage failure: {0}")]
    Storage(#[from] anyhow::Error),

    /// The socket failed while the handler was reading from it. The stream
    /// is no longer aligned on a message boundary.
    #[error("Connection error: {0}")]
    Transport(std::io::Error),
}

impl HandlerError {
    pub fn status(&self) -> Status {
        match self {
            Self::UserNotFound(_) => Status::UserNotFound,
            Self::Storage(_) | Self::Transport(_) => Status::InternalServerError,
        }
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}
