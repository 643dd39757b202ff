//! Git pkt-line format implementation.
//!
//! Every line of the smart protocol is prefixed with its total length as
//! four lowercase hex digits (the prefix itself included). `0000` is the
//! flush packet, `0001` and `0002` are the protocol v2 delimiter and
//! response-end packets.
//!
//! Gitway only frames the short advertisement preamble itself, with
//! [`PktLineWriter`]; the reader exists for tests and fuzzing.

use crate::{GitError, Result};
use std::io::{Read, Write};

/// Largest frame git will send or accept, length prefix included.
pub const MAX_PKT_LEN: usize = 65520;

/// Largest payload that fits in a single frame.
pub const MAX_PKT_PAYLOAD: usize = MAX_PKT_LEN - 4;

const FLUSH: &[u8] = b"0000";

/// Frames `payload` as a single data packet.
///
/// Payloads longer than [`MAX_PKT_PAYLOAD`] are rejected; the continuation
/// scheme used for bulk data is never needed here.
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>> {
    if payload.len() > MAX_PKT_PAYLOAD {
        return Err(GitError::InvalidPktLine(format!(
            "payload of {} bytes exceeds maximum of {}",
            payload.len(),
            MAX_PKT_PAYLOAD
        )));
    }

    let mut frame = Vec::with_capacity(payload.len() + 4);
    frame.extend_from_slice(format!("{:04x}", payload.len() + 4).as_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// The flush packet.
pub fn flush_frame() -> &'static [u8] {
    FLUSH
}

/// A pkt-line packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PktLine {
    /// Data line with content.
    Data(Vec<u8>),
    /// Flush packet (0000).
    Flush,
    /// Delimiter packet (0001).
    Delimiter,
    /// Response-end packet (0002).
    ResponseEnd,
}

impl PktLine {
    /// Creates a data packet from a string slice.
    pub fn from_string(s: &str) -> Self {
        Self::Data(s.as_bytes().to_vec())
    }

    /// Encodes the packet to bytes.
    pub fn encode(&self) -> Result<Vec<u8>> {
        match self {
            Self::Data(data) => encode_frame(data),
            Self::Flush => Ok(FLUSH.to_vec()),
            Self::Delimiter => Ok(b"0001".to_vec()),
            Self::ResponseEnd => Ok(b"0002".to_vec()),
        }
    }

    /// Returns true if this is a flush packet.
    pub fn is_flush(&self) -> bool {
        matches!(self, Self::Flush)
    }

    /// Returns the data content, or None for special packets.
    pub fn data(&self) -> Option<&[u8]> {
        match self {
            Self::Data(data) => Some(data),
            _ => None,
        }
    }

    /// Returns the data as a string, trimming any trailing newline.
    pub fn as_str(&self) -> Option<&str> {
        self.data()
            .and_then(|d| std::str::from_utf8(d).ok())
            .map(|s| s.trim_end_matches('\n'))
    }
}

/// Reader for pkt-line format.
pub struct PktLineReader<R> {
    reader: R,
}

impl<R: Read> PktLineReader<R> {
    /// Creates a new pkt-line reader.
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    /// Reads the next packet, or `None` at a clean end of input.
    pub fn read(&mut self) -> Result<Option<PktLine>> {
        let mut len_buf = [0u8; 4];
        match self.reader.read_exact(&mut len_buf) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }

        match &len_buf {
            b"0000" => return Ok(Some(PktLine::Flush)),
            b"0001" => return Ok(Some(PktLine::Delimiter)),
            b"0002" => return Ok(Some(PktLine::ResponseEnd)),
            _ => {}
        }

        if !len_buf.iter().all(u8::is_ascii_hexdigit) {
            return Err(GitError::InvalidPktLine("invalid length prefix".to_string()));
        }
        let len_str = std::str::from_utf8(&len_buf)
            .map_err(|_| GitError::InvalidPktLine("invalid length prefix".to_string()))?;
        let len = usize::from_str_radix(len_str, 16)
            .map_err(|_| GitError::InvalidPktLine("invalid length".to_string()))?;

        if len < 4 {
            return Err(GitError::InvalidPktLine("length too small".to_string()));
        }
        if len > MAX_PKT_LEN {
            return Err(GitError::InvalidPktLine(format!(
                "length {} exceeds maximum of {}",
                len, MAX_PKT_LEN
            )));
        }

        let mut data = vec![0u8; len - 4];
        self.reader.read_exact(&mut data)?;

        Ok(Some(PktLine::Data(data)))
    }

    /// Reads all packets until a flush packet.
    pub fn read_until_flush(&mut self) -> Result<Vec<PktLine>> {
        let mut packets = Vec::new();
        loop {
            match self.read()? {
                Some(PktLine::Flush) | None => break,
                Some(pkt) => packets.push(pkt),
            }
        }
        Ok(packets)
    }

    /// Consumes the reader and returns the inner reader.
    pub fn into_inner(self) -> R {
        self.reader
    }
}

/// Writer for pkt-line format.
pub struct PktLineWriter<W> {
    writer: W,
}

impl<W: Write> PktLineWriter<W> {
    /// Creates a new pkt-line writer.
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Writes a data line.
    pub fn write_data(&mut self, data: &[u8]) -> Result<()> {
        self.writer.write_all(&encode_frame(data)?)?;
        Ok(())
    }

    /// Writes a string line, appending a newline if missing.
    pub fn write_line(&mut self, s: &str) -> Result<()> {
        let mut data = s.as_bytes().to_vec();
        if !s.ends_with('\n') {
            data.push(b'\n');
        }
        self.write_data(&data)
    }

    /// Writes a flush packet.
    pub fn flush_pkt(&mut self) -> Result<()> {
        self.writer.write_all(flush_frame())?;
        Ok(())
    }

    /// Returns the inner writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}
