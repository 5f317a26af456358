//! RESP protocol parser implementation
//!
//! Provides incremental parsing of RESP2 frames: each call yields at most one
//! complete frame and leaves any trailing bytes buffered for the next call.

use std::io::Read;
use std::sync::Arc;
use crate::error::{CuprousError, Result};
use super::resp::RespFrame;

/// Upper bound on a single bulk string or array header length (512 MiB)
const MAX_FRAME_LEN: i64 = 512 * 1024 * 1024;

/// Parser state for incremental RESP parsing
pub struct RespParser {
    buffer: Vec<u8>,
    position: usize,
}

impl RespParser {
    /// Create a new parser
    pub fn new() -> Self {
        RespParser {
            buffer: Vec::with_capacity(4096),
            position: 0,
        }
    }

    /// Feed data into the parser
    pub fn feed(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Try to parse a complete frame from the buffer
    pub fn parse(&mut self) -> Result<Option<RespFrame>> {
        if self.position >= self.buffer.len() {
            return Ok(None);
        }

        match parse_frame(&self.buffer[self.position..])? {
            Some((frame, consumed)) => {
                self.position += consumed;
                // If we've consumed more than half the buffer, compact it
                if self.position > self.buffer.len() / 2 {
                    self.buffer.drain(..self.position);
                    self.position = 0;
                }
                Ok(Some(frame))
            }
            None => Ok(None),
        }
    }

    /// Whether the buffer holds the start of an incomplete frame
    pub fn has_partial_frame(&self) -> bool {
        self.position < self.buffer.len()
    }

    /// Clear the parser buffer
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.position = 0;
    }
}

impl Default for RespParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse a RESP frame from a byte slice
/// Returns Some((frame, bytes_consumed)) if a complete frame is found
pub fn parse_resp_frame(data: &[u8]) -> Result<Option<(RespFrame, usize)>> {
    parse_frame(data)
}

/// Internal frame parser
fn parse_frame(data: &[u8]) -> Result<Option<(RespFrame, usize)>> {
    if data.is_empty() {
        return Ok(None);
    }

    match data[0] {
        b'+' => parse_simple_string(data),
        b'-' => parse_error(data),
        b':' => parse_integer(data),
        b'$' => parse_bulk_string(data),
        b'*' => parse_array(data),
        _ => Err(CuprousError::Protocol(format!(
            "Invalid RESP type byte: {}",
            data[0] as char
        ))),
    }
}

/// Parse a simple string: +OK\r\n
fn parse_simple_string(data: &[u8]) -> Result<Option<(RespFrame, usize)>> {
    parse_line(data, 1).map(|opt| {
        opt.map(|(line, consumed)| (RespFrame::SimpleString(Arc::new(line.to_vec())), consumed))
    })
}

/// Parse an error: -Error message\r\n
fn parse_error(data: &[u8]) -> Result<Option<(RespFrame, usize)>> {
    parse_line(data, 1)
        .map(|opt| opt.map(|(line, consumed)| (RespFrame::Error(Arc::new(line.to_vec())), consumed)))
}

/// Parse an integer: :1000\r\n
fn parse_integer(data: &[u8]) -> Result<Option<(RespFrame, usize)>> {
    parse_line(data, 1).and_then(|opt| {
        opt.map(|(line, consumed)| {
            let n = parse_i64(line, "integer")?;
            Ok((RespFrame::Integer(n), consumed))
        })
        .transpose()
    })
}

/// Parse a bulk string: $6\r\nfoobar\r\n or $-1\r\n (null)
fn parse_bulk_string(data: &[u8]) -> Result<Option<(RespFrame, usize)>> {
    let (len_line, header_consumed) = match parse_line(data, 1)? {
        Some(v) => v,
        None => return Ok(None),
    };

    let len = parse_i64(len_line, "bulk string length")?;

    if len == -1 {
        return Ok(Some((RespFrame::BulkString(None), header_consumed)));
    }

    if len < 0 || len > MAX_FRAME_LEN {
        return Err(CuprousError::Protocol("Invalid bulk string length".into()));
    }

    let len = len as usize;
    let total_needed = header_consumed + len + 2; // +2 for \r\n

    if data.len() < total_needed {
        return Ok(None); // Need more data
    }

    // Verify trailing \r\n
    if data[header_consumed + len] != b'\r' || data[header_consumed + len + 1] != b'\n' {
        return Err(CuprousError::Protocol("Missing CRLF after bulk string".into()));
    }

    let content = data[header_consumed..header_consumed + len].to_vec();
    Ok(Some((RespFrame::BulkString(Some(Arc::new(content))), total_needed)))
}

/// Parse an array: *2\r\n$3\r\nfoo\r\n$3\r\nbar\r\n
fn parse_array(data: &[u8]) -> Result<Option<(RespFrame, usize)>> {
    let (len_line, header_consumed) = match parse_line(data, 1)? {
        Some(v) => v,
        None => return Ok(None),
    };

    let len = parse_i64(len_line, "array length")?;

    if len == -1 {
        return Ok(Some((RespFrame::Array(None), header_consumed)));
    }

    if len < 0 || len > MAX_FRAME_LEN {
        return Err(CuprousError::Protocol("Invalid array length".into()));
    }

    let len = len as usize;
    let mut elements = Vec::with_capacity(len);
    let mut total_consumed = header_consumed;

    for _ in 0..len {
        match parse_frame(&data[total_consumed..])? {
            Some((frame, consumed)) => {
                elements.push(frame);
                total_consumed += consumed;
            }
            None => return Ok(None), // Need more data
        }
    }

    Ok(Some((RespFrame::Array(Some(elements)), total_consumed)))
}

/// Parse a line ending with \r\n
fn parse_line(data: &[u8], skip_prefix: usize) -> Result<Option<(&[u8], usize)>> {
    if data.len() < skip_prefix + 2 {
        return Ok(None);
    }

    for i in skip_prefix..data.len() - 1 {
        if data[i] == b'\r' && data[i + 1] == b'\n' {
            if i == skip_prefix {
                return Err(CuprousError::Protocol("Empty header line".into()));
            }
            return Ok(Some((&data[skip_prefix..i], i + 2)));
        }
    }

    Ok(None) // Need more data
}

fn parse_i64(line: &[u8], what: &str) -> Result<i64> {
    let s = std::str::from_utf8(line)
        .map_err(|_| CuprousError::Protocol(format!("Invalid UTF-8 in {}", what)))?;
    s.parse::<i64>()
        .map_err(|_| CuprousError::Protocol(format!("Invalid {}", what)))
}

/// Blocking frame reader over any byte stream
///
/// Used on the replica side of replication, where the handshake interleaves
/// regular RESP frames with the RDB bulk payload (which carries no trailing
/// CRLF and must not go through the generic bulk decoder).
pub struct FrameReader<R: Read> {
    inner: R,
    buffer: Vec<u8>,
    position: usize,
}

impl<R: Read> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        FrameReader {
            inner,
            buffer: Vec::with_capacity(4096),
            position: 0,
        }
    }

    /// Read one complete frame, blocking until it arrives.
    /// Returns the frame and the number of wire bytes it occupied.
    pub fn read_frame(&mut self) -> Result<(RespFrame, usize)> {
        match self.read_frame_or_eof()? {
            Some(result) => Ok(result),
            None => Err(CuprousError::UnexpectedEof),
        }
    }

    /// Like read_frame, but EOF at a frame boundary reads as None (the peer
    /// closed cleanly). EOF inside a frame is still an error.
    pub fn read_frame_or_eof(&mut self) -> Result<Option<(RespFrame, usize)>> {
        loop {
            if self.position < self.buffer.len() {
                if let Some((frame, consumed)) = parse_frame(&self.buffer[self.position..])? {
                    self.position += consumed;
                    self.compact();
                    return Ok(Some((frame, consumed)));
                }
            }
            if !self.fill()? {
                if self.position < self.buffer.len() {
                    return Err(CuprousError::UnexpectedEof);
                }
                return Ok(None);
            }
        }
    }

    /// Read the RDB payload that follows a FULLRESYNC reply.
    ///
    /// Wire format: `$<n>\r\n` followed by exactly `n` bytes, with NO
    /// trailing CRLF.
    pub fn read_rdb_payload(&mut self) -> Result<Vec<u8>> {
        // Read the $<n>\r\n header
        let header = loop {
            if self.position < self.buffer.len() {
                if let Some((line, consumed)) = parse_line(&self.buffer[self.position..], 0)? {
                    if line.first() != Some(&b'$') {
                        return Err(CuprousError::Protocol(
                            "Expected bulk header before RDB payload".into(),
                        ));
                    }
                    let len = parse_i64(&line[1..], "RDB payload length")?;
                    if len < 0 || len > MAX_FRAME_LEN {
                        return Err(CuprousError::Protocol("Invalid RDB payload length".into()));
                    }
                    self.position += consumed;
                    break len as usize;
                }
            }
            if !self.fill()? {
                return Err(CuprousError::UnexpectedEof);
            }
        };

        // Read exactly `header` payload bytes, no trailer
        let mut payload = Vec::with_capacity(header);
        while payload.len() < header {
            let available = self.buffer.len() - self.position;
            if available > 0 {
                let take = available.min(header - payload.len());
                payload.extend_from_slice(&self.buffer[self.position..self.position + take]);
                self.position += take;
            } else if !self.fill()? {
                return Err(CuprousError::UnexpectedEof);
            }
        }
        self.compact();
        Ok(payload)
    }

    /// Pull more bytes from the stream. Returns false on EOF.
    fn fill(&mut self) -> Result<bool> {
        let mut chunk = [0u8; 4096];
        let n = self.inner.read(&mut chunk)?;
        if n == 0 {
            return Ok(false);
        }
        self.buffer.extend_from_slice(&chunk[..n]);
        Ok(true)
    }

    fn compact(&mut self) {
        if self.position > self.buffer.len() / 2 {
            self.buffer.drain(..self.position);
            self.position = 0;
        }
    }
}
