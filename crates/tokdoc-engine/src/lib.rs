//! TOKDOC protocol engine.
//!
//! One [`session::Session`] per TCP connection walks each message through
//! framing, checksum validation, parsing, authorization and dispatch, then
//! writes the response. Sessions share only the [`server::ServerState`]:
//! the access-key secret, the record store and the file store.

pub mod access;
pub mod error;
pub mod handlers;
pub mod records;
pub mod server;
pub mod session;
pub mod storage;

pub use access::{AccessController, AuthDecision};
pub use error::HandlerError;
pub use records::RecordStore;
pub use server::{Limits, ServerState, serve};
pub use session::Session;
pub use storage::FileStore;
