//! Receive-side transfer state machine
//!
//! Dispatches parsed frames to the file writer, enforces the one-file-at-
//! a-time protocol, and emits an Ack when a file lands intact. A FileInfo
//! that fails validation flips the receiver into a rejected state that
//! silently drops chunks until the next FileInfo.

use crate::connection::FrameHandler;
use crate::frame::Frame;
use crate::log::{TransferLog, TransferStatus};
use crate::packet::{
    Ack, ErrorMsg, FileChunk, FileDone, FileInfo, Handshake, PacketKind, WirePacket,
};
use crate::protocol::PROTOCOL_VERSION;
use crate::writer::FileWriter;
use anyhow::Result;

type AckCallback = Box<dyn Fn(Ack) + Send>;

pub struct FileReceiver {
    writer: FileWriter,
    send_ack: Option<AckCallback>,
    transfer_log: Option<TransferLog>,
    current_name: Option<String>,
    rejected: bool,
}

impl FileReceiver {
    pub fn new(writer: FileWriter) -> Self {
        Self {
            writer,
            send_ack: None,
            transfer_log: None,
            current_name: None,
            rejected: false,
        }
    }

    /// Install after the connection's outgoing queue exists; the callback
    /// enqueues the ack on it.
    pub fn set_ack_callback(&mut self, callback: impl Fn(Ack) + Send + 'static) {
        self.send_ack = Some(Box::new(callback));
    }

    pub fn set_transfer_log(&mut self, log: TransferLog) {
        self.transfer_log = Some(log);
    }

    pub fn is_rejected(&self) -> bool {
        self.rejected
    }

    fn record(&self, name: &str, bytes: u64, status: TransferStatus) {
        if let Some(log) = &self.transfer_log {
            if let Err(e) = log.append(name, bytes, status) {
                eprintln!("[Recv] transfer log write failed: {e:#}");
            }
        }
    }

    fn handle_handshake(&mut self, payload: &[u8]) -> Result<()> {
        let pkt = Handshake::deserialize(payload)?;
        println!("[Recv] handshake (version {})", pkt.version);
        if pkt.version != PROTOCOL_VERSION {
            eprintln!(
                "[Recv] protocol version mismatch: expected {PROTOCOL_VERSION}, got {}",
                pkt.version
            );
        }
        Ok(())
    }

    fn handle_ack(&mut self, payload: &[u8]) -> Result<()> {
        let pkt = Ack::deserialize(payload)?;
        println!("[Recv] ack (offset {})", pkt.offset);
        Ok(())
    }

    fn handle_file_info(&mut self, payload: &[u8]) -> Result<()> {
        let pkt = FileInfo::deserialize(payload)?;
        println!(
            "[Recv] receiving {} ({} bytes)",
            pkt.file_name, pkt.file_size
        );

        match self.writer.begin_file(&pkt.file_name, pkt.file_size) {
            Ok(()) => {
                self.rejected = false;
                self.current_name = Some(pkt.file_name);
            }
            Err(e) => {
                eprintln!("[Recv] rejected {}: {e}", pkt.file_name);
                self.rejected = true;
                self.current_name = None;
                self.record(&pkt.file_name, 0, TransferStatus::Rejected);
            }
        }
        Ok(())
    }

    fn handle_file_chunk(&mut self, payload: &[u8]) -> Result<()> {
        if self.rejected {
            return Ok(());
        }
        let pkt = FileChunk::deserialize(payload)?;
        if let Err(e) = self.writer.write_chunk(pkt.offset, &pkt.data) {
            // A failed write leaves the file short; FileDone will report
            // the corruption. Do not abort the session.
            eprintln!("[Recv] chunk write failed at offset {}: {e}", pkt.offset);
        }
        Ok(())
    }

    fn handle_file_done(&mut self, payload: &[u8]) -> Result<()> {
        let pkt = FileDone::deserialize(payload)?;
        let name = self.current_name.take().unwrap_or_default();

        if self.rejected {
            println!("[Recv] discarding rejected file");
            return Ok(());
        }

        let bytes = self.writer.bytes_written();
        if self.writer.finish_file(pkt.file_size) {
            println!("[Recv] {name} complete, {bytes} bytes verified");
            self.record(&name, bytes, TransferStatus::Completed);
            if let Some(send_ack) = &self.send_ack {
                send_ack(Ack {
                    offset: pkt.file_size,
                });
            }
        } else {
            eprintln!(
                "[Recv] corruption in {name}: expected {} bytes, wrote {bytes}",
                pkt.file_size
            );
            self.record(&name, bytes, TransferStatus::Corrupt);
        }
        Ok(())
    }

    fn handle_error(&mut self, payload: &[u8]) -> Result<()> {
        let pkt = ErrorMsg::deserialize(payload)?;
        eprintln!("[Recv] peer error {}: {}", pkt.code, pkt.message);
        Ok(())
    }
}

impl FrameHandler for FileReceiver {
    fn on_frame(&mut self, frame: &Frame<'_>) -> Result<()> {
        match PacketKind::try_from(frame.kind) {
            Ok(PacketKind::Handshake) => self.handle_handshake(frame.payload),
            Ok(PacketKind::FileInfo) => self.handle_file_info(frame.payload),
            Ok(PacketKind::FileChunk) => self.handle_file_chunk(frame.payload),
            Ok(PacketKind::FileDone) => self.handle_file_done(frame.payload),
            Ok(PacketKind::Ack) => self.handle_ack(frame.payload),
            Ok(PacketKind::Error) => self.handle_error(frame.payload),
            Err(unknown) => {
                eprintln!("[Recv] unknown packet kind {unknown}");
                Ok(())
            }
        }
    }

    fn on_disconnect(&mut self) {
        self.writer.close();
        println!("[Recv] connection closed, file handle released");
    }
}
