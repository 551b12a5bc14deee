//! Sender driver: streams local files over an established connection
//!
//! Emits `Handshake`, `FileInfo`, 4096-byte `FileChunk`s, `FileDone` per
//! file, pausing whenever the connection reports congestion. The driver
//! is oblivious to acks; the connection layer observes them.

use crate::connection::SendHandle;
use crate::fs_walk::{enumerate_files, WalkEntry};
use crate::packet::{FileChunk, FileDone, FileInfo, Handshake};
use crate::progress::TransferProgress;
use crate::protocol::SEND_CHUNK_SIZE;
use anyhow::{Context, Result};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::fs::File;
use tokio::io::AsyncReadExt;

/// External stop signal for a running transfer. Checked between files and
/// between chunks; the file being cut off simply never gets its FileDone,
/// so the receiver reports it corrupt rather than acking it.
#[derive(Debug, Default)]
pub struct TransferControl {
    stop_requested: AtomicBool,
}

impl TransferControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::Relaxed);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::Relaxed)
    }
}

/// Stream one file. Returns the number of bytes read and sent.
pub async fn send_file(
    out: &SendHandle,
    local_path: &Path,
    remote_name: &str,
    progress: Option<&TransferProgress>,
    control: Option<&TransferControl>,
) -> Result<u64> {
    let metadata = tokio::fs::metadata(local_path)
        .await
        .with_context(|| format!("stat {}", local_path.display()))?;
    let file_size = metadata.len();

    out.send(&Handshake::default())?;
    out.send(&FileInfo {
        file_size,
        file_name: remote_name.to_string(),
    })?;

    let mut file = File::open(local_path)
        .await
        .with_context(|| format!("open {}", local_path.display()))?;
    let mut buf = vec![0u8; SEND_CHUNK_SIZE];
    let mut offset = 0u64;

    loop {
        if control.is_some_and(TransferControl::is_stop_requested) {
            println!("[Transfer] stop requested, abandoning {remote_name}");
            return Ok(offset);
        }
        out.wait_ready().await;
        let n = file
            .read(&mut buf)
            .await
            .with_context(|| format!("read {}", local_path.display()))?;
        if n == 0 {
            break;
        }
        out.send(&FileChunk {
            offset,
            data: buf[..n].to_vec(),
        })?;
        offset += n as u64;
        if let Some(progress) = progress {
            progress.add(n as u64);
        }
    }

    out.send(&FileDone { file_size })?;
    Ok(offset)
}

/// Transfer a file or a whole directory tree. Returns files and bytes
/// sent.
pub async fn send_tree(
    out: &SendHandle,
    source: &Path,
    progress: Option<&TransferProgress>,
    control: Option<&TransferControl>,
) -> Result<(u64, u64)> {
    let entries = enumerate_files(source)?;
    let mut files = 0u64;
    let mut bytes = 0u64;
    for WalkEntry {
        local_path,
        remote_name,
    } in entries
    {
        if control.is_some_and(TransferControl::is_stop_requested) {
            println!("[Transfer] stop requested after {files} files");
            break;
        }
        println!("[Transfer] sending {remote_name}");
        bytes += send_file(out, &local_path, &remote_name, progress, control).await?;
        files += 1;
    }
    Ok((files, bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::outgoing_queue;
    use crate::frame::build_frame;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_send_file_queues_exact_frame_bytes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("three.bin");
        std::fs::write(&path, b"abc").unwrap();

        // Keep the receiving end alive but undrained so every queued byte
        // stays counted.
        let (handle, _outgoing) = outgoing_queue();
        let sent = send_file(&handle, &path, "three.bin", None, None)
            .await
            .unwrap();
        assert_eq!(sent, 3);

        let expected = build_frame(&Handshake::default()).unwrap().len()
            + build_frame(&FileInfo {
                file_size: 3,
                file_name: "three.bin".to_string(),
            })
            .unwrap()
            .len()
            + build_frame(&FileChunk {
                offset: 0,
                data: b"abc".to_vec(),
            })
            .unwrap()
            .len()
            + build_frame(&FileDone { file_size: 3 }).unwrap().len();
        assert_eq!(handle.queued_bytes(), expected);
    }

    #[tokio::test]
    async fn test_large_file_is_chunked() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("big.bin");
        std::fs::write(&path, vec![7u8; SEND_CHUNK_SIZE * 2 + 100]).unwrap();

        let (handle, _outgoing) = outgoing_queue();
        let sent = send_file(&handle, &path, "big.bin", None, None)
            .await
            .unwrap();
        assert_eq!(sent, (SEND_CHUNK_SIZE * 2 + 100) as u64);

        // Handshake + FileInfo + three chunk frames + FileDone, with the
        // 22-byte frame-plus-chunk-header overhead on each chunk.
        let expected = 16
            + (22 + "big.bin".len())
            + 3 * 22
            + SEND_CHUNK_SIZE * 2
            + 100
            + 18;
        assert_eq!(handle.queued_bytes(), expected);
    }

    #[tokio::test]
    async fn test_stop_before_start_sends_nothing() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"aaaa").unwrap();
        std::fs::write(dir.path().join("b.txt"), b"bbbb").unwrap();

        let control = TransferControl::new();
        control.request_stop();

        let (handle, _outgoing) = outgoing_queue();
        let (files, bytes) = send_tree(&handle, dir.path(), None, Some(&control))
            .await
            .unwrap();
        assert_eq!((files, bytes), (0, 0));
        assert_eq!(handle.queued_bytes(), 0);
    }

    #[tokio::test]
    async fn test_stop_mid_file_omits_file_done() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cut.bin");
        std::fs::write(&path, b"data").unwrap();

        let control = TransferControl::new();
        let (handle, _outgoing) = outgoing_queue();

        // Handshake and FileInfo go out, then the stop lands before the
        // first chunk.
        control.request_stop();
        let sent = send_file(&handle, &path, "cut.bin", None, Some(&control))
            .await
            .unwrap();
        assert_eq!(sent, 0);
        let expected = 16 + (22 + "cut.bin".len());
        assert_eq!(handle.queued_bytes(), expected);
    }
}

