//! Line framing for RPC exchanges.
//!
//! One exchange is one UTF-8 line holding one JSON document, terminated by a
//! single `\n`. A trailing `\r` is tolerated on read and never written.

use std::io::{self, BufRead, Read, Write};

use serde::Serialize;
use serde_json::Value as Json;
use thiserror::Error;

use crate::envelope::{CommandError, RpcRequest, RpcResponse};

/// Longest accepted line, excluding the terminator.
pub const MAX_LINE_BYTES: usize = 64 * 1024;

/// Errors raised while framing or parsing lines.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("i/o failure: {0}")]
    Io(#[from] io::Error),
    #[error("line exceeds {limit} bytes")]
    TooLarge { limit: usize },
    #[error("line is not valid UTF-8: {0}")]
    NotUtf8(#[source] std::str::Utf8Error),
    #[error("malformed JSON: {0}")]
    Json(#[source] serde_json::Error),
    #[error("malformed envelope: {0}")]
    Format(#[source] serde_json::Error),
}

impl WireError {
    /// Maps protocol failures to the error reported to the peer. Transport
    /// failures have no wire form.
    #[must_use]
    pub fn to_command_error(&self) -> Option<CommandError> {
        match self {
            Self::Io(_) => None,
            Self::Json(error) => Some(CommandError::json_error(error)),
            Self::TooLarge { .. } | Self::NotUtf8(_) | Self::Format(_) => {
                Some(CommandError::format_error(self))
            }
        }
    }
}

/// Reads one line, without its terminator. Returns `None` on a clean EOF.
///
/// # Errors
///
/// Returns [`WireError::TooLarge`] when no terminator appears within
/// [`MAX_LINE_BYTES`], and [`WireError::Io`] for transport failures.
pub fn read_line<R: BufRead>(reader: &mut R) -> Result<Option<Vec<u8>>, WireError> {
    let mut line = Vec::new();
    let limit = u64::try_from(MAX_LINE_BYTES).unwrap_or(u64::MAX).saturating_add(1);
    let read = reader.by_ref().take(limit).read_until(b'\n', &mut line)?;
    if read == 0 {
        return Ok(None);
    }
    if line.last() != Some(&b'\n') && line.len() > MAX_LINE_BYTES {
        // A line of exactly the limit may still end in "\r\n".
        if line.last() == Some(&b'\r') && take_newline(reader)? {
            line.push(b'\n');
        } else {
            return Err(WireError::TooLarge {
                limit: MAX_LINE_BYTES,
            });
        }
    }
    if line.last() == Some(&b'\n') {
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
    }
    Ok(Some(line))
}

fn take_newline<R: BufRead>(reader: &mut R) -> io::Result<bool> {
    let newline = reader.fill_buf()?.first() == Some(&b'\n');
    if newline {
        reader.consume(1);
    }
    Ok(newline)
}

/// Consumes input through the next `\n`, used to resynchronise after an
/// oversized line. Returns `false` when EOF arrives first.
///
/// # Errors
///
/// Propagates transport failures.
pub fn discard_line<R: BufRead>(reader: &mut R) -> Result<bool, WireError> {
    loop {
        let buffer = match reader.fill_buf() {
            Ok(buffer) => buffer,
            Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
            Err(error) => return Err(error.into()),
        };
        if buffer.is_empty() {
            return Ok(false);
        }
        if let Some(position) = buffer.iter().position(|byte| *byte == b'\n') {
            reader.consume(position + 1);
            return Ok(true);
        }
        let consumed = buffer.len();
        reader.consume(consumed);
    }
}

/// Writes `line` plus the terminator in one call and flushes.
///
/// # Errors
///
/// Propagates transport failures.
pub fn write_line<W: Write>(writer: &mut W, line: &[u8]) -> Result<(), WireError> {
    let mut framed = Vec::with_capacity(line.len() + 1);
    framed.extend_from_slice(line);
    framed.push(b'\n');
    writer.write_all(&framed)?;
    writer.flush()?;
    Ok(())
}

/// Serialises a value to the bytes of one line, without the terminator.
///
/// # Errors
///
/// Returns [`WireError::Json`] when serialisation fails.
pub fn encode_line<T: Serialize>(value: &T) -> Result<Vec<u8>, WireError> {
    serde_json::to_vec(value).map_err(WireError::Json)
}

fn parse(line: &[u8]) -> Result<Json, WireError> {
    let text = std::str::from_utf8(line).map_err(WireError::NotUtf8)?;
    serde_json::from_str(text).map_err(WireError::Json)
}

/// Parses a request line.
///
/// # Errors
///
/// Malformed JSON yields [`WireError::Json`]; valid JSON of the wrong shape
/// yields [`WireError::Format`].
pub fn decode_request(line: &[u8]) -> Result<RpcRequest, WireError> {
    serde_json::from_value(parse(line)?).map_err(WireError::Format)
}

/// Parses a response line.
///
/// # Errors
///
/// See [`decode_request`].
pub fn decode_response(line: &[u8]) -> Result<RpcResponse, WireError> {
    serde_json::from_value(parse(line)?).map_err(WireError::Format)
}
