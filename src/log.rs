//! Append-only JSONL record of received transfers

use anyhow::{Context, Result};
use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

/// File name of the receive log inside the destination root.
pub const TRANSFER_LOG_NAME: &str = ".ferry_transfers.jsonl";

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStatus {
    Completed,
    Corrupt,
    Rejected,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct TransferLogEntry {
    pub timestamp: String,
    pub name: String,
    pub bytes: u64,
    pub status: TransferStatus,
}

/// One line per finished (or refused) file, written at the destination
/// root. Log failures never interrupt a transfer; callers log and move on.
pub struct TransferLog {
    file: Mutex<File>,
}

impl TransferLog {
    pub fn create(dest_root: &Path) -> Result<Self> {
        let path = dest_root.join(TRANSFER_LOG_NAME);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("open transfer log {}", path.display()))?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }

    pub fn append(&self, name: &str, bytes: u64, status: TransferStatus) -> Result<()> {
        let entry = TransferLogEntry {
            timestamp: Utc::now().to_rfc3339(),
            name: name.to_string(),
            bytes,
            status,
        };
        let line = serde_json::to_string(&entry)?;
        let mut file = self.file.lock();
        writeln!(file, "{line}")?;
        Ok(())
    }

    /// Read back every entry under `dest_root`. Missing log means no
    /// transfers yet.
    pub fn read_entries(dest_root: &Path) -> Result<Vec<TransferLogEntry>> {
        let path = dest_root.join(TRANSFER_LOG_NAME);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let file = File::open(&path)
            .with_context(|| format!("open transfer log {}", path.display()))?;
        let mut entries = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            entries.push(serde_json::from_str(&line)?);
        }
        Ok(entries)
    }
}
