use std::fmt::Write as _;

use crate::constants::*;
use crate::envelope::{RawMessage, seal};
use crate::error::ParseError;
use crate::status::Status;

/// Build a response envelope.
///
/// `content` (file bytes or listing text) is covered by the checksum but not
/// embedded; send it right after the returned bytes.
pub fn serialize(
    status: Status,
    access_key: Option<&str>,
    file_size: Option<u64>,
    content: &[u8],
) -> Vec<u8> {
    let mut body = String::new();
    let _ = write!(
        body,
        "{START}{CRLF}{CRLF}{START_RESPONSE}{CRLF}{} \"{}\"",
        status.code(),
        status.message()
    );
    if let Some(key) = access_key {
        let _ = write!(body, " {key}");
    }
    if let Some(size) = file_size {
        let _ = write!(body, " {size}");
    }
    let _ = write!(body, "{CRLF}{END_RESPONSE}{CRLF}{CRLF}{END}");

    seal(&body, content)
}

/// A decoded response, as seen by a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub code: u16,
    pub message: String,
    pub access_key: Option<String>,
    pub file_size: Option<u64>,
}

impl Response {
    pub fn status(&self) -> Option<Status> {
        Status::from_parts(self.code, &self.message)
    }

    /// Decode the status line of a response envelope.
    pub fn decode(raw: &RawMessage) -> Result<Self, ParseError> {
        let body = std::str::from_utf8(raw.body())
            .map_err(|_| ParseError::malformed("body is not valid UTF-8"))?;

        let lines: Vec<&str> = body
            .split(CRLF)
            .filter(|line| !line.trim().is_empty())
            .collect();
        let [START, START_RESPONSE, status_line, END_RESPONSE, END] = lines.as_slice() else {
            return Err(ParseError::malformed("unexpected response layout"));
        };

        parse_status_line(status_line)
    }
}

/// `201 "Success" <access key> <file size>`
fn parse_status_line(line: &str) -> Result<Response, ParseError> {
    let (code, rest) = line
        .split_once(' ')
        .ok_or_else(|| ParseError::malformed("status line without message"))?;
    let code: u16 = code
        .parse()
        .map_err(|_| ParseError::malformed(format!("invalid status code {code:?}")))?;

    let (message, rest) = rest
        .strip_prefix('"')
        .and_then(|r| r.split_once('"'))
        .ok_or_else(|| ParseError::malformed("status message must be quoted"))?;

    let extras: Vec<&str> = rest.split_whitespace().collect();
    let (access_key, file_size) = match extras[..] {
        [] => (None, None),
        [key, size] => (Some(key), Some(parse_size(size)?)),
        // A lone token is the size when numeric; access keys are 64 hex
        // characters and never fit in a u64.
        [single] => match single.parse::<u64>() {
            Ok(size) => (None, Some(size)),
            Err(_) => (Some(single), None),
        },
        _ => return Err(ParseError::malformed("too many status fields")),
    };

    Ok(Response {
        code,
        message: message.to_string(),
        access_key: access_key.map(str::to_string),
        file_size,
    })
}

fn parse_size(value: &str) -> Result<u64, ParseError> {
    value
        .parse()
        .map_err(|_| ParseError::malformed(format!("invalid file size {value:?}")))
}
