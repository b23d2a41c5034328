//! Append-only writer for store files
//!
//! A commit frame is durable once `append` returns: the frame is written in a
//! single `write_all` and followed by `sync_all`. When either step fails the
//! file is cut back to the last good offset so a torn frame never survives.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use super::errors::{StoreError, StoreResult};
use super::frame::{CommitFrame, StoreHeader};

/// Appends commit frames to an existing or freshly created store file.
pub struct StoreWriter {
    path: PathBuf,
    file: File,
    current_offset: u64,
}

impl StoreWriter {
    /// Creates (or truncates) a store file and writes its header.
    pub fn create(path: &Path, header: &StoreHeader) -> StoreResult<Self> {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)
            .map_err(|e| {
                StoreError::io_error(format!("Failed to create store file: {}", path.display()), e)
            })?;

        let bytes = header.serialize();
        file.write_all(&bytes)
            .and_then(|_| file.sync_all())
            .map_err(|e| StoreError::write_failed("Failed to write store header", e))?;

        // Reopen in append mode so later frames always land at the end
        Self::open_append(path, bytes.len() as u64)
    }

    /// Opens an existing store file for appending after `valid_length` bytes.
    pub fn open_append(path: &Path, valid_length: u64) -> StoreResult<Self> {
        let file = OpenOptions::new()
            .append(true)
            .open(path)
            .map_err(|e| {
                StoreError::io_error(format!("Failed to open store file: {}", path.display()), e)
            })?;

        Ok(Self {
            path: path.to_path_buf(),
            file,
            current_offset: valid_length,
        })
    }

    /// Returns the file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the end of the last durable frame
    pub fn current_offset(&self) -> u64 {
        self.current_offset
    }

    /// Appends a frame and syncs it, returning the offset it starts at.
    pub fn append(&mut self, frame: &CommitFrame) -> StoreResult<u64> {
        let bytes = frame.serialize().map_err(|e| {
            StoreError::write_rejected(format!("Failed to encode commit {}: {}", frame.sequence, e))
        })?;
        let offset = self.current_offset;

        let written = self
            .file
            .write_all(&bytes)
            .and_then(|_| self.file.sync_all());

        if let Err(e) = written {
            // Best effort: a failed rollback leaves a torn tail, which the next
            // open reports as corruption.
            let _ = self.file.set_len(offset);
            return Err(StoreError::write_failed(
                format!("Failed to persist commit {}", frame.sequence),
                e,
            ));
        }

        self.current_offset += bytes.len() as u64;
        Ok(offset)
    }
}
