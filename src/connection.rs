//! Asynchronous connection engine
//!
//! One task per connection runs the read loop: bytes accumulate in a
//! growing buffer and every complete frame is handed to the
//! [`FrameHandler`] before its bytes are erased. Outgoing frames go
//! through a FIFO queue drained by a companion writer task, so bytes hit
//! the wire in enqueue order and frames from different `send` calls never
//! interleave. The queued-byte counter is the congestion signal senders
//! poll for backpressure.

use crate::frame::{self, FrameError};
use crate::packet::WirePacket;
use crate::protocol::{CONGESTION_THRESHOLD, READ_BUFFER_SIZE};
use anyhow::Result;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

/// Handles parsed frames from a connection's read loop.
///
/// An error from `on_frame` is contained by the engine: it is logged and
/// processing continues with the next frame, so one malformed packet
/// cannot take down a session.
pub trait FrameHandler: Send {
    fn on_frame(&mut self, frame: &frame::Frame<'_>) -> Result<()>;
    fn on_disconnect(&mut self);
}

/// Cheap cloneable handle that frame-encodes on the caller's side and
/// enqueues for the connection's writer task.
#[derive(Clone)]
pub struct SendHandle {
    tx: mpsc::UnboundedSender<Vec<u8>>,
    queued_bytes: Arc<AtomicUsize>,
}

impl SendHandle {
    pub fn send<P: WirePacket>(&self, pkt: &P) -> Result<()> {
        let frame = frame::build_frame(pkt)?;
        let len = frame.len();
        self.queued_bytes.fetch_add(len, Ordering::Relaxed);
        if self.tx.send(frame).is_err() {
            self.queued_bytes.fetch_sub(len, Ordering::Relaxed);
            anyhow::bail!("connection closed");
        }
        Ok(())
    }

    /// Bytes enqueued but not yet written to the socket.
    pub fn queued_bytes(&self) -> usize {
        self.queued_bytes.load(Ordering::Relaxed)
    }

    /// Senders pause while this holds.
    pub fn is_congested(&self) -> bool {
        self.queued_bytes() > CONGESTION_THRESHOLD
    }

    /// Park until the outgoing queue drains below the congestion
    /// threshold.
    pub async fn wait_ready(&self) {
        while self.is_congested() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }
}

/// Receiving end of the write queue, consumed by [`drive`].
pub struct OutgoingFrames {
    rx: mpsc::UnboundedReceiver<Vec<u8>>,
    queued_bytes: Arc<AtomicUsize>,
}

/// Create a connection's outgoing queue before the connection task
/// exists, so handlers can capture a [`SendHandle`] without a reference
/// cycle.
pub fn outgoing_queue() -> (SendHandle, OutgoingFrames) {
    let (tx, rx) = mpsc::unbounded_channel();
    let queued_bytes = Arc::new(AtomicUsize::new(0));
    (
        SendHandle {
            tx,
            queued_bytes: queued_bytes.clone(),
        },
        OutgoingFrames { rx, queued_bytes },
    )
}

/// Run the connection to completion: drain outgoing frames in enqueue
/// order and feed incoming bytes through the extract loop into `handler`.
///
/// Terminates on EOF, on a socket error, or on a frame whose declared
/// length exceeds the protocol limit (the stream can never recover from
/// the latter). `on_disconnect` runs exactly once on the way out.
pub async fn drive<H: FrameHandler>(stream: TcpStream, mut handler: H, outgoing: OutgoingFrames) {
    let (mut rd, mut wr) = stream.into_split();
    let OutgoingFrames {
        mut rx,
        queued_bytes,
    } = outgoing;

    let writer_task = tokio::spawn(async move {
        while let Some(buf) = rx.recv().await {
            let len = buf.len();
            if let Err(e) = wr.write_all(&buf).await {
                eprintln!("[Connection] write error: {e}");
                break;
            }
            queued_bytes.fetch_sub(len, Ordering::Relaxed);
        }
    });

    let mut read_buf = [0u8; READ_BUFFER_SIZE];
    let mut incoming: Vec<u8> = Vec::with_capacity(READ_BUFFER_SIZE);

    'read: loop {
        match rd.read(&mut read_buf).await {
            Ok(0) => break,
            Ok(n) => incoming.extend_from_slice(&read_buf[..n]),
            Err(e) => {
                eprintln!("[Connection] read error: {e}");
                break;
            }
        }

        // Extract loop: consume every complete frame in the buffer. The
        // frame view borrows `incoming`, so the handler runs before the
        // consumed bytes are erased.
        loop {
            let consumed = match frame::parse(&incoming) {
                Ok(frame) => {
                    if let Err(e) = handler.on_frame(&frame) {
                        eprintln!("[Connection] packet handling error: {e:#}");
                    }
                    frame.total_size()
                }
                Err(FrameError::IncompleteHeader) | Err(FrameError::IncompleteBody) => break,
                Err(e @ FrameError::PayloadTooLarge(_)) => {
                    eprintln!("[Connection] protocol violation: {e}");
                    break 'read;
                }
            };
            incoming.drain(..consumed);
        }
    }

    handler.on_disconnect();
    // In-flight writes are abandoned on disconnect.
    writer_task.abort();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{Ack, FileChunk, PacketKind};
    use std::sync::atomic::AtomicBool;
    use std::sync::Mutex;
    use tokio::net::TcpListener;

    #[derive(Clone, Default)]
    struct Recorder {
        frames: Arc<Mutex<Vec<(u16, Vec<u8>)>>>,
        disconnected: Arc<AtomicBool>,
    }

    impl FrameHandler for Recorder {
        fn on_frame(&mut self, frame: &frame::Frame<'_>) -> Result<()> {
            self.frames
                .lock()
                .unwrap()
                .push((frame.kind, frame.payload.to_vec()));
            Ok(())
        }

        fn on_disconnect(&mut self) {
            self.disconnected.store(true, Ordering::Relaxed);
        }
    }

    #[tokio::test]
    async fn test_drive_reassembles_split_frames() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let recorder = Recorder::default();
        let frames = recorder.frames.clone();
        let disconnected = recorder.disconnected.clone();
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (_handle, outgoing) = outgoing_queue();
            drive(stream, recorder, outgoing).await;
        });

        let mut client = TcpStream::connect(addr).await.unwrap();
        let mut wire = Vec::new();
        wire.extend_from_slice(&frame::build_frame(&Ack { offset: 1 }).unwrap());
        wire.extend_from_slice(
            &frame::build_frame(&FileChunk {
                offset: 2,
                data: vec![9; 100],
            })
            .unwrap(),
        );

        // Stop mid-header of the second frame: only the first may be
        // delivered.
        let split = 18 + 4;
        client.write_all(&wire[..split]).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(frames.lock().unwrap().len(), 1);

        client.write_all(&wire[split..]).await.unwrap();
        drop(client);
        server.await.unwrap();

        assert!(disconnected.load(Ordering::Relaxed));
        let got = frames.lock().unwrap();
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].0, PacketKind::Ack.as_u16());
        assert_eq!(got[1].0, PacketKind::FileChunk.as_u16());
        assert_eq!(got[1].1.len(), 8 + 4 + 100);
    }

    #[tokio::test]
    async fn test_write_queue_preserves_enqueue_order() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (handle, outgoing) = outgoing_queue();
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            drive(stream, Recorder::default(), outgoing).await;
        });

        let mut peer = TcpStream::connect(addr).await.unwrap();

        let mut expected = Vec::new();
        for offset in 0..5u64 {
            let pkt = Ack { offset };
            expected.extend_from_slice(&frame::build_frame(&pkt).unwrap());
            handle.send(&pkt).unwrap();
        }

        let mut got = vec![0u8; expected.len()];
        peer.read_exact(&mut got).await.unwrap();
        assert_eq!(got, expected);

        // The counter drains once the writer task has flushed everything.
        for _ in 0..100u32 {
            if handle.queued_bytes() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(handle.queued_bytes(), 0);

        drop(peer);
        drop(handle);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_oversize_length_terminates_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let recorder = Recorder::default();
        let disconnected = recorder.disconnected.clone();
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (_handle, outgoing) = outgoing_queue();
            drive(stream, recorder, outgoing).await;
        });

        let mut client = TcpStream::connect(addr).await.unwrap();
        client
            .write_all(&[0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x00, 0x01])
            .await
            .unwrap();

        // drive() returns of its own accord; the client never closed.
        server.await.unwrap();
        assert!(disconnected.load(Ordering::Relaxed));
        drop(client);
    }

    #[test]
    fn test_congestion_tracks_queued_bytes() {
        let (handle, _outgoing) = outgoing_queue();
        assert!(!handle.is_congested());
        assert_eq!(handle.queued_bytes(), 0);

        // Nothing drains the queue while `_outgoing` sits unconsumed, so
        // queued bytes accumulate past the threshold.
        let chunk = FileChunk {
            offset: 0,
            data: vec![0u8; 512 * 1024],
        };
        handle.send(&chunk).unwrap();
        assert!(!handle.is_congested());
        handle.send(&chunk).unwrap();
        handle.send(&chunk).unwrap();
        assert!(handle.is_congested());
    }

    #[test]
    fn test_send_after_close_fails_and_restores_counter() {
        let (handle, outgoing) = outgoing_queue();
        drop(outgoing);
        let before = handle.queued_bytes();
        assert!(handle.send(&Ack { offset: 1 }).is_err());
        assert_eq!(handle.queued_bytes(), before);
    }

    #[test]
    fn test_send_rejects_unencodable_packet() {
        let (handle, _outgoing) = outgoing_queue();
        let bad = crate::packet::FileInfo {
            file_size: 0,
            file_name: String::new(),
        };
        assert!(handle.send(&bad).is_err());
        assert_eq!(handle.queued_bytes(), 0);
    }
}
