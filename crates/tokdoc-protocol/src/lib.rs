//! TOKDOC: text-framed request/response protocol for the file-sharing server.
//!
//! Provides the wire layer shared by server and clients:
//! - Envelope framing (checksum line, size line, declared-length body)
//! - SHA-256 checksum validation and sealing
//! - Marker tokenizer and parser producing typed requests
//! - Request encoder for clients
//! - Response serializer and decoder

pub mod constants;
pub mod envelope;
pub mod error;
pub mod parser;
pub mod request;
pub mod response;
pub mod status;

// Re-export key types for convenience.
pub use envelope::{RawMessage, checksum, is_valid, read_message, seal};
pub use error::{FramingError, ParseError};
pub use parser::{parse, pending_payload};
pub use request::{DataMethod, DataRequest, Headers, Method, MethodGroup, Request};
pub use response::{Response, serialize};
pub use status::Status;
