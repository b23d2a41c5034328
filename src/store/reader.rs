//! Sequential reader for store files
//!
//! Every header and frame is checksum-verified as it is read. Any failure is
//! reported as corruption with the byte offset where decoding stopped.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use super::errors::{StoreError, StoreResult};
use super::frame::{CommitFrame, StoreHeader, MIN_FRAME_SIZE, MIN_HEADER_SIZE};

/// Reads the header, then commit frames in file order.
pub struct StoreReader {
    path: PathBuf,
    reader: BufReader<File>,
    header: StoreHeader,
    current_offset: u64,
    file_size: u64,
}

impl StoreReader {
    /// Opens a store file and decodes its header.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let file = File::open(path).map_err(|e| {
            StoreError::io_error(format!("Failed to open store file: {}", path.display()), e)
        })?;

        let file_size = file
            .metadata()
            .map_err(|e| StoreError::io_error("Failed to read store metadata", e))?
            .len();

        let mut reader = BufReader::new(file);
        let header_bytes = Self::read_sealed(&mut reader, 0, file_size, MIN_HEADER_SIZE as u64)?;
        let (header, consumed) = StoreHeader::deserialize(&header_bytes)
            .map_err(|e| StoreError::corruption_at_offset(0, e.to_string()))?;

        Ok(Self {
            path: path.to_path_buf(),
            reader,
            header,
            current_offset: consumed as u64,
            file_size,
        })
    }

    /// Returns the file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the decoded header
    pub fn header(&self) -> &StoreHeader {
        &self.header
    }

    /// Offset of the next unread byte
    pub fn current_offset(&self) -> u64 {
        self.current_offset
    }

    /// Reads the next commit frame, or `None` at a clean end of file.
    pub fn read_next(&mut self) -> StoreResult<Option<CommitFrame>> {
        if self.current_offset >= self.file_size {
            return Ok(None);
        }

        let bytes = Self::read_sealed(
            &mut self.reader,
            self.current_offset,
            self.file_size,
            MIN_FRAME_SIZE as u64,
        )?;
        let (frame, consumed) = CommitFrame::deserialize(&bytes)
            .map_err(|e| StoreError::corruption_at_offset(self.current_offset, e.to_string()))?;

        self.current_offset += consumed as u64;
        Ok(Some(frame))
    }

    /// Reads every remaining frame.
    pub fn read_all(&mut self) -> StoreResult<Vec<CommitFrame>> {
        let mut frames = Vec::new();
        while let Some(frame) = self.read_next()? {
            frames.push(frame);
        }
        Ok(frames)
    }

    /// Reads one length-prefixed unit starting at `offset`.
    fn read_sealed(
        reader: &mut BufReader<File>,
        offset: u64,
        file_size: u64,
        min_size: u64,
    ) -> StoreResult<Vec<u8>> {
        let remaining = file_size - offset;
        if remaining < min_size {
            return Err(StoreError::corruption_at_offset(
                offset,
                format!(
                    "Truncated store: {} bytes remaining, minimum unit size is {}",
                    remaining, min_size
                ),
            ));
        }

        let mut len_buf = [0u8; 4];
        reader.read_exact(&mut len_buf).map_err(|e| {
            StoreError::corruption_at_offset(offset, format!("Failed to read length: {}", e))
        })?;
        let length = u32::from_le_bytes(len_buf) as u64;

        if length < min_size {
            return Err(StoreError::corruption_at_offset(
                offset,
                format!("Invalid unit length: {}", length),
            ));
        }
        if length > remaining {
            return Err(StoreError::corruption_at_offset(
                offset,
                format!(
                    "Unit length {} exceeds remaining file size {}",
                    length, remaining
                ),
            ));
        }

        let mut buf = vec![0u8; length as usize];
        buf[0..4].copy_from_slice(&len_buf);
        reader.read_exact(&mut buf[4..]).map_err(|e| {
            StoreError::corruption_at_offset(offset, format!("Failed to read body: {}", e))
        })?;
        Ok(buf)
    }
}
