//! Stateful sink for one received file
//!
//! A `FileWriter` is bound to a destination directory at construction and
//! never writes outside it. One file is open at a time; a new `begin_file`
//! closes the previous handle first. Not thread-safe: one instance per
//! connection, driven from that connection's task.

use crate::paths::is_path_safe;
use std::fs::{self, File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WriterError {
    #[error("path escapes the destination directory")]
    PathTraversal,
    #[error("could not create parent directories: {0}")]
    CreateDirFailed(#[source] std::io::Error),
    #[error("could not open file for writing: {0}")]
    OpenFailed(#[source] std::io::Error),
    #[error("no file is open")]
    NotOpen,
    #[error("write failed: {0}")]
    WriteFailed(#[source] std::io::Error),
}

pub struct FileWriter {
    base_dir: PathBuf,
    file: Option<File>,
    expected_size: u64,
    bytes_written: u64,
}

impl FileWriter {
    /// The base directory is canonicalized once here; every received name
    /// is checked against it.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        let base_dir = base_dir.canonicalize().unwrap_or(base_dir);
        Self {
            base_dir,
            file: None,
            expected_size: 0,
            bytes_written: 0,
        }
    }

    /// Open `relative_path` under the base for writing, truncating any
    /// existing content and creating missing parent directories.
    pub fn begin_file(&mut self, relative_path: &str, expected_size: u64) -> Result<(), WriterError> {
        self.close();

        let target = self.base_dir.join(relative_path);
        if !is_path_safe(&target, &self.base_dir) {
            return Err(WriterError::PathTraversal);
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(WriterError::CreateDirFailed)?;
        }

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&target)
            .map_err(WriterError::OpenFailed)?;

        self.file = Some(file);
        self.expected_size = expected_size;
        self.bytes_written = 0;
        Ok(())
    }

    /// Positional write. Out-of-order offsets are permitted;
    /// `bytes_written` is a running sum, not a high-water mark.
    pub fn write_chunk(&mut self, offset: u64, data: &[u8]) -> Result<(), WriterError> {
        let file = self.file.as_mut().ok_or(WriterError::NotOpen)?;
        file.seek(SeekFrom::Start(offset))
            .map_err(WriterError::WriteFailed)?;
        file.write_all(data).map_err(WriterError::WriteFailed)?;
        self.bytes_written += data.len() as u64;
        Ok(())
    }

    /// Validate the running byte count against `final_size`, then close
    /// regardless of the outcome.
    pub fn finish_file(&mut self, final_size: u64) -> bool {
        let valid = self.bytes_written == final_size;
        self.close();
        valid
    }

    /// Idempotent; releases the handle.
    pub fn close(&mut self) {
        self.file = None;
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn expected_size(&self) -> u64 {
        self.expected_size
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }
}
