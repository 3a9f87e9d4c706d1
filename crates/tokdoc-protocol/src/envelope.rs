//! Envelope framing and checksums.
//!
//! Format: `[checksum(64)][CRLF][size(16)][CRLF][body(size)]`
//! The size field guards the body read with a caller-supplied maximum.

use sha2::{Digest, Sha256};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::constants::{
    CHECKSUM_LENGTH, CHECKSUM_LINE_LENGTH, CRLF, HEADER_LENGTH, SIZE_FIELD_LENGTH,
};
use crate::error::FramingError;

/// A complete envelope exactly as it came off the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    bytes: Vec<u8>,
}

impl RawMessage {
    /// Split one envelope off the front of `buf`, returning it with the
    /// remaining bytes (trailing content, or the next message).
    pub fn split_from(buf: &[u8]) -> Result<(Self, &[u8]), FramingError> {
        if buf.is_empty() {
            return Err(FramingError::ConnectionClosed);
        }
        if buf.len() < HEADER_LENGTH {
            return Err(FramingError::Truncated { field: "header" });
        }
        check_terminator(&buf[..CHECKSUM_LINE_LENGTH], "checksum")?;
        check_terminator(&buf[CHECKSUM_LINE_LENGTH..HEADER_LENGTH], "size")?;
        let size = parse_size(&buf[CHECKSUM_LINE_LENGTH..CHECKSUM_LINE_LENGTH + SIZE_FIELD_LENGTH])?;

        let total = HEADER_LENGTH
            .checked_add(size)
            .ok_or(FramingError::TooLarge {
                size,
                max: usize::MAX - HEADER_LENGTH,
            })?;
        if buf.len() < total {
            return Err(FramingError::Truncated { field: "body" });
        }
        Ok((
            Self {
                bytes: buf[..total].to_vec(),
            },
            &buf[total..],
        ))
    }

    /// The transmitted checksum, without its terminator.
    pub fn checksum(&self) -> &[u8] {
        &self.bytes[..CHECKSUM_LENGTH]
    }

    /// Size line plus body: the bytes the checksum is computed over.
    pub fn without_checksum(&self) -> &[u8] {
        &self.bytes[CHECKSUM_LINE_LENGTH..]
    }

    pub fn body(&self) -> &[u8] {
        &self.bytes[HEADER_LENGTH..]
    }

    pub fn declared_size(&self) -> usize {
        self.bytes.len() - HEADER_LENGTH
    }

    /// Whether the transmitted checksum matches the envelope plus `content`.
    pub fn verify(&self, content: Option<&[u8]>) -> bool {
        is_valid(self.checksum(), self.without_checksum(), content)
    }
}

/// Read exactly one envelope from `reader`.
///
/// Consumes `66 + 18 + size` bytes and nothing more, so any payload that
/// follows stays in the stream for the caller.
///
/// Returns Err on:
/// - EOF before the first byte (`ConnectionClosed`)
/// - EOF anywhere later (`Truncated`)
/// - a field not terminated by CRLF or an unparsable size
/// - size > `max_body` (memory bomb protection)
pub async fn read_message<R>(reader: &mut R, max_body: usize) -> Result<RawMessage, FramingError>
where
    R: AsyncRead + Unpin,
{
    let mut bytes = vec![0u8; HEADER_LENGTH];

    // A zero-length first read is a clean disconnect between messages.
    let n = reader.read(&mut bytes[..CHECKSUM_LINE_LENGTH]).await?;
    if n == 0 {
        return Err(FramingError::ConnectionClosed);
    }
    read_field(reader, &mut bytes[n..CHECKSUM_LINE_LENGTH], "checksum").await?;
    check_terminator(&bytes[..CHECKSUM_LINE_LENGTH], "checksum")?;

    read_field(reader, &mut bytes[CHECKSUM_LINE_LENGTH..], "size").await?;
    check_terminator(&bytes[CHECKSUM_LINE_LENGTH..], "size")?;

    let size = parse_size(&bytes[CHECKSUM_LINE_LENGTH..CHECKSUM_LINE_LENGTH + SIZE_FIELD_LENGTH])?;
    if size > max_body {
        return Err(FramingError::TooLarge {
            size,
            max: max_body,
        });
    }

    bytes.resize(HEADER_LENGTH + size, 0);
    read_field(reader, &mut bytes[HEADER_LENGTH..], "body").await?;

    Ok(RawMessage { bytes })
}

/// SHA-256 over the concatenation of `parts`, as lowercase hex.
pub fn checksum(parts: &[&[u8]]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hex::encode(hasher.finalize())
}

/// Compare a transmitted checksum against `SHA256(message || content)`.
///
/// Case-sensitive: an uppercase hex digest never matches.
pub fn is_valid(transmitted: &[u8], message_without_checksum: &[u8], content: Option<&[u8]>) -> bool {
    let expected = checksum(&[message_without_checksum, content.unwrap_or_default()]);
    transmitted == expected.as_bytes()
}

/// Wrap `body` in an envelope. `content` is hashed into the checksum but not
/// embedded; the caller sends it after the envelope.
pub fn seal(body: &str, content: &[u8]) -> Vec<u8> {
    let size_line = format!("{:<width$}{}", body.len(), CRLF, width = SIZE_FIELD_LENGTH);
    let digest = checksum(&[size_line.as_bytes(), body.as_bytes(), content]);

    let mut out = Vec::with_capacity(HEADER_LENGTH + body.len());
    out.extend_from_slice(digest.as_bytes());
    out.extend_from_slice(CRLF.as_bytes());
    out.extend_from_slice(size_line.as_bytes());
    out.extend_from_slice(body.as_bytes());
    out
}

async fn read_field<R>(reader: &mut R, buf: &mut [u8], field: &'static str) -> Result<(), FramingError>
where
    R: AsyncRead + Unpin,
{
    match reader.read_exact(buf).await {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            Err(FramingError::Truncated { field })
        }
        Err(e) => Err(e.into()),
    }
}

fn check_terminator(line: &[u8], field: &'static str) -> Result<(), FramingError> {
    if line.ends_with(CRLF.as_bytes()) {
        Ok(())
    } else {
        Err(FramingError::MissingTerminator { field })
    }
}

fn parse_size(field: &[u8]) -> Result<usize, FramingError> {
    let invalid = || FramingError::InvalidSize(String::from_utf8_lossy(field).into_owned());

    let text = std::str::from_utf8(field).map_err(|_| invalid())?;
    let digits = text.trim_matches(' ');
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    digits.parse().map_err(|_| invalid())
}
