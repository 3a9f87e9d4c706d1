//! Envelope layout.
//!
//! ```text
//! [0..64]    SHA-256 checksum, lowercase hex
//! [64..66]   CRLF
//! [66..82]   Body length, decimal, left-justified and space padded
//! [82..84]   CRLF
//! [84..]     Body: {START} ... {END}
//! ```
//!
//! The checksum covers bytes `[66..]` plus any trailing content.

/// Hex characters in the checksum field.
pub const CHECKSUM_LENGTH: usize = 64;

/// Width of the size field, excluding its terminator.
pub const SIZE_FIELD_LENGTH: usize = 16;

pub const CRLF: &str = "\r\n";

pub const CRLF_LENGTH: usize = 2;

/// Checksum plus terminator.
pub const CHECKSUM_LINE_LENGTH: usize = CHECKSUM_LENGTH + CRLF_LENGTH;

/// Size field plus terminator.
pub const SIZE_LINE_LENGTH: usize = SIZE_FIELD_LENGTH + CRLF_LENGTH;

/// Bytes preceding the body in every envelope.
pub const HEADER_LENGTH: usize = CHECKSUM_LINE_LENGTH + SIZE_LINE_LENGTH;

/// Default upper bound on a declared body length (64 KB).
pub const DEFAULT_MAX_BODY: usize = 64 * 1024;

// Markers
pub const START: &str = "{START}";
pub const END: &str = "{END}";
pub const START_METHOD: &str = "{{START METHOD}}";
pub const END_METHOD: &str = "{{END METHOD}}";
pub const START_HEADERS: &str = "{{START HEADERS}}";
pub const END_HEADERS: &str = "{{END HEADERS}}";
pub const START_FILE: &str = "{{START FILE}}";
pub const END_FILE: &str = "{{END FILE}}";
pub const START_RESPONSE: &str = "{{START RESPONSE}}";
pub const END_RESPONSE: &str = "{{END RESPONSE}}";

// Method groups and methods
pub const AUTH: &str = "AUTH";
pub const EXIT: &str = "EXIT";
pub const DATA: &str = "DATA";
pub const LIST: &str = "LIST";
pub const UPLOAD: &str = "UPLOAD";
pub const DOWNLOAD: &str = "DOWNLOAD";

// Header keys
pub const USER: &str = "USER";
pub const ACCESS_KEY: &str = "ACCESS_KEY";
pub const TIMESTAMP: &str = "TIMESTAMP";
pub const AUTHORIZED: &str = "AUTHORIZED";
pub const FILE_SIZE: &str = "FILE_SIZE";
