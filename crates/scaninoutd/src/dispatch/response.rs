//! Response serialization for the dispatch loop.

use std::io::Write;

use scaninout_proto::{RpcResponse, WireError, wire};

/// Writes one response envelope per line.
pub struct ResponseWriter<W> {
    writer: W,
}

impl<W: Write> ResponseWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Serialises `response` as one line and flushes it.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn write(&mut self, response: &RpcResponse) -> Result<(), WireError> {
        let line = wire::encode_line(response)?;
        wire::write_line(&mut self.writer, &line)
    }
}
