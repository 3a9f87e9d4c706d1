use thiserror::Error;

/// Failure to pull a complete envelope off the transport.
///
/// Every variant means the byte stream can no longer be trusted to be
/// aligned on a message boundary.
#[derive(Debug, Error)]
pub enum FramingError {
    /// Peer closed the connection before the first byte of a message.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Peer closed the connection partway through a message.
    #[error("Connection closed during {field} read")]
    Truncated { field: &'static str },

    /// A fixed-width field was not followed by CRLF.
    #[error("Missing CRLF after {field}")]
    MissingTerminator { field: &'static str },

    /// The size field is not a non-negative decimal integer.
    #[error("Invalid size field: {0:?}")]
    InvalidSize(String),

    #[error("Message too large: {size} bytes (max {max})")]
    TooLarge { size: usize, max: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure to turn a checksum-valid envelope into a request.
///
/// These are client bugs; the connection stays usable.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("Malformed message: {0}")]
    Malformed(String),

    #[error("The method group type {0:?} is not supported")]
    UnsupportedMethodGroup(String),

    #[error("The method {0:?} is not supported")]
    UnsupportedMethod(String),
}

impl ParseError {
    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        Self::Malformed(msg.into())
    }
}
