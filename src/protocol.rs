//! Shared protocol constants for the ferry framed transport

/// Wire protocol version carried in every Handshake.
pub const PROTOCOL_VERSION: u16 = 1;

/// Default TCP port for ferryd.
pub const DEFAULT_PORT: u16 = 8080;

/// Frame header: payload length (u64 BE) followed by packet kind (u16 BE).
pub const FRAME_HEADER_SIZE: usize = 10;

/// Maximum declared frame payload (1 GiB) - prevents memory exhaustion
/// via a forged length field.
pub const MAX_PAYLOAD_SIZE: u64 = 1 << 30;

/// Maximum data bytes in a single FileChunk (10 MiB).
pub const MAX_CHUNK_SIZE: usize = 10 * 1024 * 1024;

/// Maximum file-name length in a FileInfo.
pub const MAX_NAME_LEN: usize = 4096;

/// Maximum message length in an Error packet.
pub const MAX_ERROR_MSG_LEN: usize = 4096;

/// Bytes read from disk per FileChunk on the sending side.
pub const SEND_CHUNK_SIZE: usize = 4096;

/// Socket read buffer size for the connection engine.
pub const READ_BUFFER_SIZE: usize = 8192;

/// Outgoing queue level (bytes) above which senders should pause.
pub const CONGESTION_THRESHOLD: usize = 1024 * 1024;
