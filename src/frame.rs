//! Length-prefixed frame envelope over the byte stream
//!
//! Wire format: [payload length: u64 BE] [packet kind: u16 BE] [payload].
//! A parsed [`Frame`] borrows the payload from the receive buffer; the
//! caller must finish with the view before erasing consumed bytes.

use crate::binary::{put_u16, put_u64, read_u16, read_u64};
use crate::packet::{EncodeError, WirePacket};
use crate::protocol::{FRAME_HEADER_SIZE, MAX_PAYLOAD_SIZE};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    /// Fewer than ten bytes buffered. Not an error in streaming: wait for
    /// more data.
    #[error("incomplete frame header")]
    IncompleteHeader,
    /// Declared payload length exceeds the protocol limit. The stream can
    /// never recover; the connection should be terminated.
    #[error("declared payload of {0} bytes exceeds limit")]
    PayloadTooLarge(u64),
    /// Header complete, payload still in flight. Wait for more data.
    #[error("incomplete frame body")]
    IncompleteBody,
}

/// Zero-copy view of one frame at the front of a receive buffer.
///
/// `kind` is the raw wire value: unknown kinds must still parse so the
/// receiver can log and skip them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame<'a> {
    pub kind: u16,
    pub payload: &'a [u8],
}

impl Frame<'_> {
    /// Header plus payload: how many buffered bytes this frame consumed.
    pub fn total_size(&self) -> usize {
        FRAME_HEADER_SIZE + self.payload.len()
    }
}

/// Parse one frame from the front of `buf`, distinguishing "need more
/// bytes" from a protocol violation.
pub fn parse(buf: &[u8]) -> Result<Frame<'_>, FrameError> {
    if buf.len() < FRAME_HEADER_SIZE {
        return Err(FrameError::IncompleteHeader);
    }
    let payload_len = read_u64(buf);
    if payload_len > MAX_PAYLOAD_SIZE {
        return Err(FrameError::PayloadTooLarge(payload_len));
    }
    let payload_len = payload_len as usize;
    if buf.len() < FRAME_HEADER_SIZE + payload_len {
        return Err(FrameError::IncompleteBody);
    }
    let kind = read_u16(&buf[8..]);
    Ok(Frame {
        kind,
        payload: &buf[FRAME_HEADER_SIZE..FRAME_HEADER_SIZE + payload_len],
    })
}

/// Non-throwing variant for the read loop: `Some` only for a complete,
/// in-bounds frame.
pub fn try_parse(buf: &[u8]) -> Option<Frame<'_>> {
    parse(buf).ok()
}

/// Encode `pkt` into a complete frame ready for the wire.
pub fn build_frame<P: WirePacket>(pkt: &P) -> Result<Vec<u8>, EncodeError> {
    let payload_size = pkt.payload_size();
    let mut out = Vec::with_capacity(FRAME_HEADER_SIZE + payload_size);
    put_u64(&mut out, payload_size as u64);
    put_u16(&mut out, P::KIND.as_u16());
    pkt.serialize(&mut out)?;
    debug_assert_eq!(out.len(), FRAME_HEADER_SIZE + payload_size);
    Ok(out)
}
