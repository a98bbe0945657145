//! Protocol codec
//!
//! Encoding and decoding functions for the wire protocol.
//!
//! ## Wire Format
//! ```text
//! ┌──────────┬──────────┬─────────────────────────────┐
//! │ Len (4)  │ CRC (4)  │         Payload             │
//! └──────────┴──────────┴─────────────────────────────┘
//! ```
//! - Len: payload length, big-endian
//! - CRC: CRC32 of the payload, big-endian
//! - Payload: bincode encoding of a `Request` or `Reply`
//!
//! Requests are capped at `MAX_PAYLOAD_SIZE`. Replies may be much larger,
//! since a bootstrap snapshot carries every key in the cluster, and are
//! capped at `MAX_REPLY_SIZE` unless the writer asks for less.

use std::io::{Read, Write};

use bytes::{BufMut, Bytes, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{Reply, Request};
use crate::error::{CacheError, Result};

/// Header size: 4 bytes length + 4 bytes CRC
pub const HEADER_SIZE: usize = 8;

/// Maximum request payload size (16 MB)
pub const MAX_PAYLOAD_SIZE: u32 = 16 * 1024 * 1024;

/// Maximum reply payload size (1 GB)
pub const MAX_REPLY_SIZE: u32 = 1024 * 1024 * 1024;

// =============================================================================
// Framing
// =============================================================================

fn encode_frame<T: Serialize>(message: &T, max_payload: u32) -> Result<Bytes> {
    let payload = bincode::serialize(message)?;
    if payload.len() > max_payload as usize {
        return Err(CacheError::Protocol(format!(
            "Payload too large: {} bytes (max {})",
            payload.len(),
            max_payload
        )));
    }

    let mut frame = BytesMut::with_capacity(HEADER_SIZE + payload.len());
    frame.put_u32(payload.len() as u32);
    frame.put_u32(crc32fast::hash(&payload));
    frame.put_slice(&payload);

    Ok(frame.freeze())
}

/// Parse a header, returning (payload_len, crc)
fn parse_header(header: &[u8], max_payload: u32) -> Result<(usize, u32)> {
    if header.len() < HEADER_SIZE {
        return Err(CacheError::Protocol(format!(
            "Incomplete header: expected {} bytes, got {}",
            HEADER_SIZE,
            header.len()
        )));
    }

    let payload_len = u32::from_be_bytes([header[0], header[1], header[2], header[3]]);
    let crc = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);

    if payload_len > max_payload {
        return Err(CacheError::Protocol(format!(
            "Payload too large: {} bytes (max {})",
            payload_len, max_payload
        )));
    }

    Ok((payload_len as usize, crc))
}

fn verify_crc(payload: &[u8], expected: u32) -> Result<()> {
    let actual = crc32fast::hash(payload);
    if actual != expected {
        return Err(CacheError::Protocol(format!(
            "Checksum mismatch: expected 0x{:08x}, got 0x{:08x}",
            expected, actual
        )));
    }
    Ok(())
}

fn decode_frame<T: DeserializeOwned>(bytes: &[u8], max_payload: u32) -> Result<T> {
    let (payload_len, crc) = parse_header(bytes, max_payload)?;

    let total_len = HEADER_SIZE + payload_len;
    if bytes.len() < total_len {
        return Err(CacheError::Protocol(format!(
            "Incomplete payload: expected {} bytes, got {}",
            total_len,
            bytes.len()
        )));
    }

    let payload = &bytes[HEADER_SIZE..total_len];
    verify_crc(payload, crc)?;
    decode_payload(payload)
}

/// Deserialize a verified payload
pub fn decode_payload<T: DeserializeOwned>(payload: &[u8]) -> Result<T> {
    Ok(bincode::deserialize(payload)?)
}

// =============================================================================
// Request / Reply Encoding
// =============================================================================

pub fn encode_request(request: &Request) -> Result<Bytes> {
    encode_frame(request, MAX_PAYLOAD_SIZE)
}

pub fn decode_request(bytes: &[u8]) -> Result<Request> {
    decode_frame(bytes, MAX_PAYLOAD_SIZE)
}

pub fn encode_reply(reply: &Reply) -> Result<Bytes> {
    encode_frame(reply, MAX_REPLY_SIZE)
}

pub fn decode_reply(bytes: &[u8]) -> Result<Reply> {
    decode_frame(bytes, MAX_REPLY_SIZE)
}

// =============================================================================
// Stream-based I/O helpers
// =============================================================================

/// Read one request-sized frame and return its checksum-verified payload
///
/// Blocks until a complete frame is received or an error occurs
pub fn read_frame<R: Read>(reader: &mut R) -> Result<Vec<u8>> {
    read_frame_limited(reader, MAX_PAYLOAD_SIZE)
}

fn read_frame_limited<R: Read>(reader: &mut R, max_payload: u32) -> Result<Vec<u8>> {
    let mut header = [0u8; HEADER_SIZE];
    reader.read_exact(&mut header)?;

    let (payload_len, crc) = parse_header(&header, max_payload)?;

    let mut payload = vec![0u8; payload_len];
    if payload_len > 0 {
        reader.read_exact(&mut payload)?;
    }

    verify_crc(&payload, crc)?;
    Ok(payload)
}

/// Read a complete request from a stream
pub fn read_request<R: Read>(reader: &mut R) -> Result<Request> {
    let payload = read_frame(reader)?;
    decode_payload(&payload)
}

/// Write a request to a stream
pub fn write_request<W: Write>(writer: &mut W, request: &Request) -> Result<()> {
    let bytes = encode_request(request)?;
    writer.write_all(&bytes)?;
    writer.flush()?;
    Ok(())
}

/// Read a complete reply from a stream
pub fn read_reply<R: Read>(reader: &mut R) -> Result<Reply> {
    let payload = read_frame_limited(reader, MAX_REPLY_SIZE)?;
    decode_payload(&payload)
}

/// Write a reply to a stream
pub fn write_reply<W: Write>(writer: &mut W, reply: &Reply) -> Result<()> {
    write_reply_limited(writer, reply, MAX_REPLY_SIZE)
}

/// Write a reply whose payload may not exceed `max_payload` bytes
///
/// An oversized reply fails before anything is written, so the stream is
/// still usable afterwards.
pub fn write_reply_limited<W: Write>(writer: &mut W, reply: &Reply, max_payload: u32) -> Result<()> {
    let bytes = encode_frame(reply, max_payload.min(MAX_REPLY_SIZE))?;
    writer.write_all(&bytes)?;
    writer.flush()?;
    Ok(())
}
