// src/hash.rs

//! Content hashing for revision integrity.
//!
//! Every revision's content hash is SHA-256, computed in 8 KiB streaming
//! chunks so a revision's hash can be derived while it is being written or
//! read without holding the whole file in memory.

use sha2::{Digest, Sha256};
use std::io::{self, Read};

/// An incremental SHA-256 hasher.
pub struct Hasher(Sha256);

impl Hasher {
    pub fn new() -> Self {
        Hasher(Sha256::new())
    }

    pub fn update(&mut self, data: &[u8]) {
        self.0.update(data);
    }

    /// Finalize and return the lowercase hex digest.
    pub fn finalize(self) -> String {
        format!("{:x}", self.0.finalize())
    }
}

impl Default for Hasher {
    fn default() -> Self {
        Self::new()
    }
}

/// Compute the SHA-256 hex digest of an in-memory byte slice.
pub fn hash_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Compute the SHA-256 hex digest of a reader's contents, in 8 KiB chunks.
pub fn hash_reader<R: Read>(reader: &mut R) -> io::Result<String> {
    let mut hasher = Hasher::new();
    let mut buffer = [0u8; 8192];
    loop {
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_bytes() {
        let hash = hash_bytes(b"Hello, World!");
        assert_eq!(
            hash,
            "dffd6021bb2bd5b0af676290809ec3a53191dd81c7f70a4b28688a362182986f"
        );
        assert_eq!(hash.len(), 64);
    }

    #[test]
    fn test_hasher_incremental_matches_bytes() {
        let full = hash_bytes(b"Hello, World!");

        let mut hasher = Hasher::new();
        hasher.update(b"Hello, ");
        hasher.update(b"World!");
        let incremental = hasher.finalize();

        assert_eq!(full, incremental);
    }

    #[test]
    fn test_hash_reader_matches_bytes() {
        let data = b"revision content";
        let mut cursor = std::io::Cursor::new(data);
        let hash = hash_reader(&mut cursor).unwrap();
        assert_eq!(hash, hash_bytes(data));
        assert_eq!(
            hash,
            "95ab324c3f712ce50affdfc268d077b715a637947f39674aef71c5df553e1a6"
        );
    }

    #[test]
    fn test_empty_input() {
        let hash = hash_bytes(b"");
        assert_eq!(
            hash,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b85"
        );
    }
}
