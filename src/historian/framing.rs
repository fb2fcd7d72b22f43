//! Newline-delimited message framing for the historian socket.
//!
//! # Wire Format
//!
//! One JSON object per line, UTF-8, terminated by `\n` (a preceding `\r` is
//! tolerated and stripped):
//!
//! ```text
//! {"msgtype":"status","status":{...}}\n
//! ```
//!
//! Outgoing commands use the envelope
//! `{"cmd":"<name>"[,<params>]}\n` where `<params>` is a raw JSON fragment
//! inserted verbatim.

use std::io::{self, BufRead, Read};

use serde::Serialize;
use thiserror::Error;

/// Longest line accepted from the historian, terminator included.
pub const MAX_LINE_LENGTH: usize = 16 * 1024;

/// Reasons a received line is unusable. Each one is fatal to the connection.
#[derive(Debug, Error)]
pub enum FramingError {
    /// Data ended without a trailing newline.
    #[error("line truncated by end of stream ({0} bytes without newline)")]
    Truncated(usize),

    /// A line consisting only of CR/LF.
    #[error("empty line received")]
    Empty,

    /// No newline within `MAX_LINE_LENGTH` bytes.
    #[error("line exceeds {MAX_LINE_LENGTH} bytes")]
    TooLong,

    #[error("line is not valid UTF-8")]
    InvalidUtf8,

    #[error("read failed: {0}")]
    Io(#[from] io::Error),
}

/// Reads successive newline-terminated messages from a blocking stream.
pub struct LineReader<R> {
    inner: R,
    buf: Vec<u8>,
}

impl<R: BufRead> LineReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buf: Vec::with_capacity(1024),
        }
    }

    /// Read the next message with its line terminator stripped.
    ///
    /// Returns `Ok(None)` when the peer closed the stream cleanly between
    /// messages.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The stream ends in the middle of a line
    /// - The line is blank
    /// - The line is longer than `MAX_LINE_LENGTH`
    /// - The line is not valid UTF-8
    /// - The underlying read fails
    pub fn read_line(&mut self) -> Result<Option<String>, FramingError> {
        self.buf.clear();
        let limit = MAX_LINE_LENGTH as u64;
        let read = (&mut self.inner).take(limit).read_until(b'\n', &mut self.buf)?;

        if read == 0 {
            return Ok(None);
        }

        if self.buf.last() != Some(&b'\n') {
            if self.buf.len() >= MAX_LINE_LENGTH {
                return Err(FramingError::TooLong);
            }
            return Err(FramingError::Truncated(self.buf.len()));
        }

        self.buf.pop();
        if self.buf.last() == Some(&b'\r') {
            self.buf.pop();
        }

        if self.buf.is_empty() {
            return Err(FramingError::Empty);
        }

        std::str::from_utf8(&self.buf)
            .map(|line| Some(line.to_owned()))
            .map_err(|_| FramingError::InvalidUtf8)
    }
}

/// Build the single-line command envelope, terminator included.
///
/// `params` is inserted verbatim after the `cmd` field; pass `""` for a
/// command without parameters.
pub fn format_command(name: &str, params: &str) -> String {
    // serde_json quoting of a &str cannot fail
    let name = serde_json::to_string(name).unwrap_or_else(|_| "\"\"".to_string());
    let params = params.trim();
    if params.is_empty() {
        format!("{{\"cmd\":{}}}\n", name)
    } else {
        format!("{{\"cmd\":{},{}}}\n", name, params)
    }
}

/// Render a `"key":value` fragment for use as command parameters.
///
/// ```ignore
/// let params = param("player", "Alice")?;
/// historian.send_command("playerinfo", &params)?;
/// ```
pub fn param<T: Serialize + ?Sized>(key: &str, value: &T) -> Result<String, serde_json::Error> {
    Ok(format!(
        "{}:{}",
        serde_json::to_string(key)?,
        serde_json::to_string(value)?
    ))
}
