//! Request parser.
//!
//! The body is tokenized into CRLF lines and walked by a marker state
//! machine, so every block has a fixed position:
//!
//! ```text
//! {START}
//! {{START METHOD}} ... {{END METHOD}}
//! [{{START HEADERS}} ... {{END HEADERS}}]
//! [{{START FILE}} ... {{END FILE}}]
//! {END}
//! ```
//!
//! Blank lines between blocks are ignored. A marker out of order, a
//! repeated block, or anything after `{END}` is rejected.

use std::collections::HashSet;

use crate::constants::*;
use crate::envelope::RawMessage;
use crate::error::ParseError;
use crate::request::{DataMethod, DataRequest, Headers, Request};

const MARKERS: [&str; 10] = [
    START,
    END,
    START_METHOD,
    END_METHOD,
    START_HEADERS,
    END_HEADERS,
    START_FILE,
    END_FILE,
    START_RESPONSE,
    END_RESPONSE,
];

/// Parse the body of a framed message into a request.
///
/// The envelope checksum is not looked at here; validate it first.
pub fn parse(raw: &RawMessage) -> Result<Request, ParseError> {
    let body = std::str::from_utf8(raw.body())
        .map_err(|_| ParseError::malformed("body is not valid UTF-8"))?;
    parse_body(body)
}

/// Parse a `{START}` ... `{END}` body.
pub fn parse_body(body: &str) -> Result<Request, ParseError> {
    let blocks = tokenize(body)?;

    let tokens: Vec<&str> = blocks
        .method
        .iter()
        .flat_map(|line| line.split_whitespace())
        .collect();
    let Some((&group, params)) = tokens.split_first() else {
        return Err(ParseError::malformed("empty method block"));
    };

    match group {
        AUTH => match params {
            [email, password] => Ok(Request::Auth {
                email: email.to_string(),
                password: password.to_string(),
            }),
            _ => Err(ParseError::malformed("AUTH takes an email and a password")),
        },
        EXIT => {
            if params.len() > 2 {
                return Err(ParseError::malformed("too many EXIT parameters"));
            }
            Ok(Request::Exit {
                email: params.first().map(|s| s.to_string()),
                password: params.get(1).map(|s| s.to_string()),
            })
        }
        DATA => parse_data(params, &blocks).map(Request::Data),
        other => Err(ParseError::UnsupportedMethodGroup(other.to_string())),
    }
}

/// Size of the raw payload that follows an UPLOAD envelope, read from its
/// FILE block even when the request itself is invalid.
///
/// `None` when the body cannot be tokenized or is not a `DATA UPLOAD` with
/// a readable `FILE_SIZE`. The caller uses this to skip the payload of a
/// rejected upload and stay on a message boundary.
pub fn pending_payload(raw: &RawMessage) -> Option<u64> {
    let body = std::str::from_utf8(raw.body()).ok()?;
    let blocks = tokenize(body).ok()?;

    let mut tokens = blocks.method.iter().flat_map(|line| line.split_whitespace());
    if tokens.next()? != DATA || DataMethod::from_token(tokens.next()?)? != DataMethod::Upload {
        return None;
    }
    parse_file_size(blocks.file.as_deref()?).ok()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Block {
    Method,
    Headers,
    File,
}

impl Block {
    fn end_marker(self) -> &'static str {
        match self {
            Self::Method => END_METHOD,
            Self::Headers => END_HEADERS,
            Self::File => END_FILE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Start,
    Opened,
    Inside(Block),
    After(Block),
    Done,
}

#[derive(Debug, Default)]
struct Blocks<'a> {
    method: Vec<&'a str>,
    headers: Option<Vec<&'a str>>,
    file: Option<Vec<&'a str>>,
}

fn tokenize(body: &str) -> Result<Blocks<'_>, ParseError> {
    let mut blocks = Blocks::default();
    let mut state = State::Start;

    for line in body.split(CRLF) {
        let is_marker = MARKERS.contains(&line);

        state = match state {
            State::Inside(block) if line == block.end_marker() => State::After(block),
            State::Inside(_) if is_marker => {
                return Err(ParseError::malformed(format!("unexpected {line} inside block")));
            }
            State::Inside(block) => {
                if !line.trim().is_empty() {
                    let lines = match block {
                        Block::Method => &mut blocks.method,
                        Block::Headers => blocks.headers.get_or_insert_with(Vec::new),
                        Block::File => blocks.file.get_or_insert_with(Vec::new),
                    };
                    lines.push(line);
                }
                state
            }
            _ if line.trim().is_empty() => state,
            State::Start if line == START => State::Opened,
            State::Opened if line == START_METHOD => State::Inside(Block::Method),
            State::After(Block::Method) if line == START_HEADERS => {
                blocks.headers.get_or_insert_with(Vec::new);
                State::Inside(Block::Headers)
            }
            State::After(Block::Method | Block::Headers) if line == START_FILE => {
                blocks.file.get_or_insert_with(Vec::new);
                State::Inside(Block::File)
            }
            State::After(_) if line == END => State::Done,
            State::Done => return Err(ParseError::malformed("content after {END}")),
            _ => {
                return Err(ParseError::malformed(format!("unexpected line {line:?}")));
            }
        };
    }

    match state {
        State::Done => Ok(blocks),
        State::Inside(block) => Err(ParseError::malformed(format!(
            "missing {}",
            block.end_marker()
        ))),
        _ => Err(ParseError::malformed("missing {END}")),
    }
}

fn parse_data(params: &[&str], blocks: &Blocks<'_>) -> Result<DataRequest, ParseError> {
    let (method, address, file_name) = match params {
        [method, address] => (method, address, None),
        [method, address, name] => (method, address, Some(*name)),
        _ => return Err(ParseError::malformed("DATA takes a method, an address and an optional file name")),
    };

    let method = DataMethod::from_token(method)
        .ok_or_else(|| ParseError::UnsupportedMethod(method.to_string()))?;

    let (ip, port) = address
        .rsplit_once(':')
        .filter(|(ip, _)| !ip.is_empty())
        .ok_or_else(|| ParseError::malformed(format!("invalid address {address:?}")))?;
    let port: u16 = port
        .parse()
        .map_err(|_| ParseError::malformed(format!("invalid port {port:?}")))?;

    if let Some(name) = file_name {
        if !is_valid_file_name(name) {
            return Err(ParseError::malformed(format!("invalid file name {name:?}")));
        }
    }
    if matches!(method, DataMethod::Upload | DataMethod::Download) && file_name.is_none() {
        return Err(ParseError::malformed(format!("{} requires a file name", method.as_str())));
    }

    let headers = match &blocks.headers {
        Some(lines) => parse_headers(lines)?,
        None => Headers::default(),
    };

    let file_size = match &blocks.file {
        Some(lines) => Some(parse_file_size(lines)?),
        None => None,
    };
    let file_size = match method {
        DataMethod::Upload => {
            Some(file_size.ok_or_else(|| ParseError::malformed("UPLOAD requires FILE_SIZE"))?)
        }
        _ => None,
    };

    Ok(DataRequest {
        method,
        ip: ip.to_string(),
        port,
        file_name: file_name.map(str::to_string),
        headers,
        file_size,
    })
}

fn parse_headers(lines: &[&str]) -> Result<Headers, ParseError> {
    let mut headers = Headers::default();
    let mut seen = HashSet::new();

    for line in lines {
        let (key, value) = line
            .split_once(':')
            .ok_or_else(|| ParseError::malformed(format!("header without ':' {line:?}")))?;
        let key = key.trim();
        let value = value.trim();
        if !seen.insert(key) {
            return Err(ParseError::malformed(format!("duplicate header {key}")));
        }

        match key {
            USER => headers.user = Some(value.to_string()),
            ACCESS_KEY => headers.access_key = Some(value.to_string()),
            TIMESTAMP => headers.timestamp = Some(value.to_string()),
            AUTHORIZED => headers.authorized = Some(parse_email_list(value)?),
            _ => {
                headers.extra.insert(key.to_string(), value.to_string());
            }
        }
    }

    Ok(headers)
}

/// `(a@x.com, b@y.com)` -> `["a@x.com", "b@y.com"]`
fn parse_email_list(value: &str) -> Result<Vec<String>, ParseError> {
    let inner = value
        .strip_prefix('(')
        .and_then(|v| v.strip_suffix(')'))
        .ok_or_else(|| ParseError::malformed(format!("AUTHORIZED must be parenthesized: {value:?}")))?;

    Ok(inner
        .split(',')
        .map(str::trim)
        .filter(|email| !email.is_empty())
        .map(str::to_string)
        .collect())
}

fn parse_file_size(lines: &[&str]) -> Result<u64, ParseError> {
    let value = lines
        .iter()
        .filter_map(|line| line.split_once(':'))
        .find(|(key, _)| key.trim() == FILE_SIZE)
        .map(|(_, value)| value.trim())
        .ok_or_else(|| ParseError::malformed("FILE block without FILE_SIZE"))?;

    value
        .parse()
        .map_err(|_| ParseError::malformed(format!("invalid FILE_SIZE {value:?}")))
}

/// File names are flat names inside the storage directory.
fn is_valid_file_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
        && !name.chars().any(char::is_control)
}
