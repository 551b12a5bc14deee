//! Typed packets and their wire codecs
//!
//! Payload layouts are big-endian and every variable-length field carries
//! its own length prefix. Packets are not self-framed: the caller hands
//! `deserialize` a slice whose length is the frame's payload length, and
//! trailing bytes beyond the declared field lengths are ignored.

use crate::binary::{put_u16, put_u32, put_u64, read_u16, read_u32, read_u64};
use crate::protocol::{MAX_CHUNK_SIZE, MAX_ERROR_MSG_LEN, MAX_NAME_LEN, PROTOCOL_VERSION};
use thiserror::Error;

/// Packet kind codes as they appear on the wire (u16 BE in the frame header).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    Handshake,
    FileInfo,
    FileChunk,
    FileDone,
    Error,
    Ack,
}

impl PacketKind {
    pub fn as_u16(self) -> u16 {
        match self {
            Self::Handshake => 0,
            Self::FileInfo => 1,
            Self::FileChunk => 2,
            Self::FileDone => 3,
            Self::Error => 4,
            Self::Ack => 5,
        }
    }
}

impl TryFrom<u16> for PacketKind {
    type Error = u16;

    fn try_from(value: u16) -> Result<Self, u16> {
        match value {
            0 => Ok(Self::Handshake),
            1 => Ok(Self::FileInfo),
            2 => Ok(Self::FileChunk),
            3 => Ok(Self::FileDone),
            4 => Ok(Self::Error),
            5 => Ok(Self::Ack),
            other => Err(other),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EncodeError {
    #[error("file name must not be empty")]
    EmptyName,
    #[error("{field} is {len} bytes (max {max})")]
    TooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("{0} payload too small")]
    TooSmall(&'static str),
    #[error("{field} declares {len} bytes (max {max})")]
    TooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },
    #[error("{0} truncated: declared length exceeds payload")]
    Truncated(&'static str),
    #[error("file name declares zero length")]
    EmptyName,
    #[error("{0} is not valid UTF-8")]
    BadUtf8(&'static str),
}

/// A packet that can be carried in a frame.
///
/// `serialize` appends exactly `payload_size()` bytes to `out`, or fails
/// without appending anything.
pub trait WirePacket: Sized {
    const KIND: PacketKind;

    fn payload_size(&self) -> usize;
    fn serialize(&self, out: &mut Vec<u8>) -> Result<(), EncodeError>;
    fn deserialize(payload: &[u8]) -> Result<Self, DecodeError>;
}

/// Protocol version announcement. `capabilities` is reserved and zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub version: u16,
    pub capabilities: u32,
}

impl Default for Handshake {
    fn default() -> Self {
        Self {
            version: PROTOCOL_VERSION,
            capabilities: 0,
        }
    }
}

impl WirePacket for Handshake {
    const KIND: PacketKind = PacketKind::Handshake;

    fn payload_size(&self) -> usize {
        6
    }

    fn serialize(&self, out: &mut Vec<u8>) -> Result<(), EncodeError> {
        put_u16(out, self.version);
        put_u32(out, self.capabilities);
        Ok(())
    }

    fn deserialize(payload: &[u8]) -> Result<Self, DecodeError> {
        if payload.len() < 6 {
            return Err(DecodeError::TooSmall("Handshake"));
        }
        Ok(Self {
            version: read_u16(payload),
            capabilities: read_u32(&payload[2..]),
        })
    }
}

/// Positive acknowledgement at a byte offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack {
    pub offset: u64,
}

impl WirePacket for Ack {
    const KIND: PacketKind = PacketKind::Ack;

    fn payload_size(&self) -> usize {
        8
    }

    fn serialize(&self, out: &mut Vec<u8>) -> Result<(), EncodeError> {
        put_u64(out, self.offset);
        Ok(())
    }

    fn deserialize(payload: &[u8]) -> Result<Self, DecodeError> {
        if payload.len() < 8 {
            return Err(DecodeError::TooSmall("Ack"));
        }
        Ok(Self {
            offset: read_u64(payload),
        })
    }
}

/// Textual error report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorMsg {
    pub code: u16,
    pub message: String,
}

impl WirePacket for ErrorMsg {
    const KIND: PacketKind = PacketKind::Error;

    fn payload_size(&self) -> usize {
        2 + 4 + self.message.len()
    }

    fn serialize(&self, out: &mut Vec<u8>) -> Result<(), EncodeError> {
        if self.message.len() > MAX_ERROR_MSG_LEN {
            return Err(EncodeError::TooLong {
                field: "error message",
                len: self.message.len(),
                max: MAX_ERROR_MSG_LEN,
            });
        }
        put_u16(out, self.code);
        put_u32(out, self.message.len() as u32);
        out.extend_from_slice(self.message.as_bytes());
        Ok(())
    }

    fn deserialize(payload: &[u8]) -> Result<Self, DecodeError> {
        if payload.len() < 6 {
            return Err(DecodeError::TooSmall("Error"));
        }
        let code = read_u16(payload);
        let msg_len = read_u32(&payload[2..]) as usize;
        if msg_len > MAX_ERROR_MSG_LEN {
            return Err(DecodeError::TooLong {
                field: "error message",
                len: msg_len,
                max: MAX_ERROR_MSG_LEN,
            });
        }
        if 6 + msg_len > payload.len() {
            return Err(DecodeError::Truncated("Error"));
        }
        let message = std::str::from_utf8(&payload[6..6 + msg_len])
            .map_err(|_| DecodeError::BadUtf8("error message"))?
            .to_owned();
        Ok(Self { code, message })
    }
}

/// Begins a file: relative name plus declared size.
/// The name uses forward slashes on the wire regardless of platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    pub file_size: u64,
    pub file_name: String,
}

impl WirePacket for FileInfo {
    const KIND: PacketKind = PacketKind::FileInfo;

    fn payload_size(&self) -> usize {
        8 + 4 + self.file_name.len()
    }

    fn serialize(&self, out: &mut Vec<u8>) -> Result<(), EncodeError> {
        if self.file_name.is_empty() {
            return Err(EncodeError::EmptyName);
        }
        if self.file_name.len() > MAX_NAME_LEN {
            return Err(EncodeError::TooLong {
                field: "file name",
                len: self.file_name.len(),
                max: MAX_NAME_LEN,
            });
        }
        put_u64(out, self.file_size);
        put_u32(out, self.file_name.len() as u32);
        out.extend_from_slice(self.file_name.as_bytes());
        Ok(())
    }

    fn deserialize(payload: &[u8]) -> Result<Self, DecodeError> {
        if payload.len() < 12 {
            return Err(DecodeError::TooSmall("FileInfo"));
        }
        let file_size = read_u64(payload);
        let name_len = read_u32(&payload[8..]) as usize;
        if name_len == 0 {
            return Err(DecodeError::EmptyName);
        }
        if name_len > MAX_NAME_LEN {
            return Err(DecodeError::TooLong {
                field: "file name",
                len: name_len,
                max: MAX_NAME_LEN,
            });
        }
        if 12 + name_len > payload.len() {
            return Err(DecodeError::Truncated("FileInfo"));
        }
        let file_name = std::str::from_utf8(&payload[12..12 + name_len])
            .map_err(|_| DecodeError::BadUtf8("file name"))?
            .to_owned();
        Ok(Self {
            file_size,
            file_name,
        })
    }
}

/// Data fragment at an absolute byte offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChunk {
    pub offset: u64,
    pub data: Vec<u8>,
}

impl WirePacket for FileChunk {
    const KIND: PacketKind = PacketKind::FileChunk;

    fn payload_size(&self) -> usize {
        8 + 4 + self.data.len()
    }

    fn serialize(&self, out: &mut Vec<u8>) -> Result<(), EncodeError> {
        if self.data.len() > MAX_CHUNK_SIZE {
            return Err(EncodeError::TooLong {
                field: "chunk data",
                len: self.data.len(),
                max: MAX_CHUNK_SIZE,
            });
        }
        put_u64(out, self.offset);
        put_u32(out, self.data.len() as u32);
        out.extend_from_slice(&self.data);
        Ok(())
    }

    fn deserialize(payload: &[u8]) -> Result<Self, DecodeError> {
        if payload.len() < 12 {
            return Err(DecodeError::TooSmall("FileChunk"));
        }
        let offset = read_u64(payload);
        let data_len = read_u32(&payload[8..]) as usize;
        if data_len > MAX_CHUNK_SIZE {
            return Err(DecodeError::TooLong {
                field: "chunk data",
                len: data_len,
                max: MAX_CHUNK_SIZE,
            });
        }
        if 12 + data_len > payload.len() {
            return Err(DecodeError::Truncated("FileChunk"));
        }
        Ok(Self {
            offset,
            data: payload[12..12 + data_len].to_vec(),
        })
    }
}

/// End of file with the declared total size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileDone {
    pub file_size: u64,
}

impl WirePacket for FileDone {
    const KIND: PacketKind = PacketKind::FileDone;

    fn payload_size(&self) -> usize {
        8
    }

    fn serialize(&self, out: &mut Vec<u8>) -> Result<(), EncodeError> {
        put_u64(out, self.file_size);
        Ok(())
    }

    fn deserialize(payload: &[u8]) -> Result<Self, DecodeError> {
        if payload.len() < 8 {
            return Err(DecodeError::TooSmall("FileDone"));
        }
        Ok(Self {
            file_size: read_u64(payload),
        })
    }
}
