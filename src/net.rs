//! TCP wiring for the ferry transport: accept loop, per-session
//! construction, and the client side of a transfer.

use anyhow::{Context, Result};

pub mod server {
    use super::*;
    use crate::connection;
    use crate::log::TransferLog;
    use crate::receiver::FileReceiver;
    use crate::writer::FileWriter;
    use std::path::Path;
    use tokio::net::{TcpListener, TcpStream};

    /// Accept connections forever, one session per connection, all writing
    /// under `dest_dir`.
    pub async fn serve(bind: &str, dest_dir: &Path) -> Result<()> {
        let listener = TcpListener::bind(bind)
            .await
            .with_context(|| format!("bind {bind}"))?;
        println!(
            "[Server] listening on {bind}, saving to {}",
            dest_dir.display()
        );
        loop {
            let (stream, peer) = listener.accept().await?;
            println!("[Server] client connected: {peer}");
            spawn_session(stream, dest_dir);
        }
    }

    /// Wire up one session and hand it to the runtime.
    ///
    /// Construction order matters: the writer exists before the receiver
    /// that uses it, and the outgoing queue exists before the ack callback
    /// that captures its handle. The callback holds only a cheap
    /// `SendHandle`, so there is no ownership cycle between receiver and
    /// connection.
    pub fn spawn_session(stream: TcpStream, dest_dir: &Path) {
        let writer = FileWriter::new(dest_dir);
        let mut receiver = FileReceiver::new(writer);

        match TransferLog::create(dest_dir) {
            Ok(log) => receiver.set_transfer_log(log),
            Err(e) => eprintln!("[Server] transfer log unavailable: {e:#}"),
        }

        let (handle, outgoing) = connection::outgoing_queue();
        let ack_handle = handle.clone();
        receiver.set_ack_callback(move |ack| {
            if let Err(e) = ack_handle.send(&ack) {
                eprintln!("[Server] failed to queue ack: {e:#}");
            }
        });

        tokio::spawn(connection::drive(stream, receiver, outgoing));
    }
}

pub mod client {
    use super::*;
    use crate::connection::{self, FrameHandler, SendHandle};
    use crate::frame::Frame;
    use crate::packet::{Ack, ErrorMsg, PacketKind, WirePacket};
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::net::TcpStream;
    use tokio::task::JoinHandle;
    use tokio::time::Instant;

    /// Client-side frame handler: the receiver only ever sends acks (and
    /// possibly errors), so this just observes and counts them.
    struct AckObserver {
        acked_files: Arc<AtomicU64>,
    }

    impl FrameHandler for AckObserver {
        fn on_frame(&mut self, frame: &Frame<'_>) -> Result<()> {
            match PacketKind::try_from(frame.kind) {
                Ok(PacketKind::Ack) => {
                    let ack = Ack::deserialize(frame.payload)?;
                    println!("[Client] ack (offset {})", ack.offset);
                    self.acked_files.fetch_add(1, Ordering::Relaxed);
                }
                Ok(PacketKind::Error) => {
                    let pkt = ErrorMsg::deserialize(frame.payload)?;
                    eprintln!("[Client] server error {}: {}", pkt.code, pkt.message);
                }
                Ok(other) => {
                    eprintln!("[Client] unexpected packet kind {:?}", other);
                }
                Err(unknown) => {
                    eprintln!("[Client] unknown packet kind {unknown}");
                }
            }
            Ok(())
        }

        fn on_disconnect(&mut self) {
            println!("[Client] disconnected");
        }
    }

    /// An established connection to a ferryd receiver.
    pub struct ClientConnection {
        pub handle: SendHandle,
        acked_files: Arc<AtomicU64>,
        task: JoinHandle<()>,
    }

    impl ClientConnection {
        /// Acks observed so far; one per intact file.
        pub fn acked_files(&self) -> u64 {
            self.acked_files.load(Ordering::Relaxed)
        }

        /// Wait until `expected` files have been acknowledged. Returns
        /// false on timeout - some files were rejected or lost.
        pub async fn wait_for_acks(&self, expected: u64, timeout: Duration) -> bool {
            let deadline = Instant::now() + timeout;
            while self.acked_files() < expected {
                if Instant::now() >= deadline {
                    return false;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            true
        }

        /// Drop the send side and stop the connection task.
        pub async fn shutdown(self) {
            let ClientConnection { handle, task, .. } = self;
            drop(handle);
            task.abort();
            let _ = task.await;
        }
    }

    pub async fn connect(host: &str, port: u16) -> Result<ClientConnection> {
        let stream = TcpStream::connect((host, port))
            .await
            .with_context(|| format!("connect {host}:{port}"))?;
        println!("[Client] connected to {}", stream.peer_addr()?);

        let acked_files = Arc::new(AtomicU64::new(0));
        let observer = AckObserver {
            acked_files: acked_files.clone(),
        };
        let (handle, outgoing) = connection::outgoing_queue();
        let task = tokio::spawn(connection::drive(stream, observer, outgoing));

        Ok(ClientConnection {
            handle,
            acked_files,
            task,
        })
    }
}
