//! CRC32 checksums for store headers and commit frames
//!
//! Every frame is verified on replay. A mismatch fails the open, which hands
//! the store over to the rescue protocol.

use crc32fast::Hasher;

/// Computes the CRC32 (IEEE) checksum of `data`.
pub fn compute_checksum(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// Returns true when `data` hashes to `expected`.
pub fn verify_checksum(data: &[u8], expected: u32) -> bool {
    compute_checksum(data) == expected
}
