//! Streaming content fingerprints used as duplicate-detection keys

use crate::Result;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Default read block size (64 KiB)
pub const DEFAULT_BLOCK_SIZE: usize = 64 * 1024;

/// Digest algorithm behind a fingerprint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    #[default]
    Blake3,
    Sha256,
}

/// Hex-encoded content digest of a whole file
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(pub String);

impl Fingerprint {
    pub fn new(hash: String) -> Self {
        Self(hash)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Fingerprint an in-memory buffer
    pub fn from_bytes(algorithm: HashAlgorithm, data: &[u8]) -> Self {
        let mut hasher = StreamHasher::new(algorithm);
        hasher.update(data);
        hasher.finish()
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

enum StreamHasher {
    Blake3(Box<blake3::Hasher>),
    Sha256(Sha256),
}

impl StreamHasher {
    fn new(algorithm: HashAlgorithm) -> Self {
        match algorithm {
            HashAlgorithm::Blake3 => Self::Blake3(Box::new(blake3::Hasher::new())),
            HashAlgorithm::Sha256 => Self::Sha256(Sha256::new()),
        }
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            Self::Blake3(hasher) => {
                hasher.update(data);
            }
            Self::Sha256(hasher) => hasher.update(data),
        }
    }

    fn finish(self) -> Fingerprint {
        match self {
            Self::Blake3(hasher) => Fingerprint::new(hasher.finalize().to_hex().to_string()),
            Self::Sha256(hasher) => Fingerprint::new(hex::encode(hasher.finalize())),
        }
    }
}

/// Streams files through a digest in fixed-size blocks
#[derive(Debug, Clone, Copy)]
pub struct FileHasher {
    algorithm: HashAlgorithm,
    block_size: usize,
}

impl Default for FileHasher {
    fn default() -> Self {
        Self::new(HashAlgorithm::default(), DEFAULT_BLOCK_SIZE)
    }
}

impl FileHasher {
    pub fn new(algorithm: HashAlgorithm, block_size: usize) -> Self {
        Self {
            algorithm,
            block_size: block_size.max(1),
        }
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    /// Compute the fingerprint of a file without buffering it whole
    pub fn hash_file<P: AsRef<Path>>(&self, path: P) -> Result<Fingerprint> {
        let mut file = File::open(path)?;
        let mut hasher = StreamHasher::new(self.algorithm);
        let mut buffer = vec![0u8; self.block_size];

        loop {
            let bytes_read = file.read(&mut buffer)?;
            if bytes_read == 0 {
                break;
            }
            hasher.update(&buffer[..bytes_read]);
        }

        Ok(hasher.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_blake3_known_digest() {
        let hash = Fingerprint::from_bytes(HashAlgorithm::Blake3, b"hello world");
        assert_eq!(
            hash.as_str(),
            "d74981efa70a0c880b8d8c1985d075dbcbf679b99a5f9914e5aaf96b831a9e24"
        );
    }

    #[test]
    fn test_sha256_known_digest() {
        let hash = Fingerprint::from_bytes(HashAlgorithm::Sha256, b"hello world");
        assert_eq!(
            hash.as_str(),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_block_size_does_not_change_digest() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("data.bin");
        let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        fs::write(&path, &data)?;

        for algorithm in [HashAlgorithm::Blake3, HashAlgorithm::Sha256] {
            let small = FileHasher::new(algorithm, 7).hash_file(&path)?;
            let large = FileHasher::new(algorithm, 1 << 20).hash_file(&path)?;
            assert_eq!(small, large);
            assert_eq!(small, Fingerprint::from_bytes(algorithm, &data));
        }
        Ok(())
    }

    #[test]
    fn test_identical_content_same_fingerprint() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let a = temp_dir.path().join("a");
        let b = temp_dir.path().join("b");
        let c = temp_dir.path().join("c");
        let block = vec![0x5au8; DEFAULT_BLOCK_SIZE + 10];
        let mut other = block.clone();
        *other.last_mut().unwrap() = 0;
        fs::write(&a, &block)?;
        fs::write(&b, &block)?;
        fs::write(&c, &other)?;

        let hasher = FileHasher::default();
        assert_eq!(hasher.hash_file(&a)?, hasher.hash_file(&b)?);
        assert_ne!(hasher.hash_file(&a)?, hasher.hash_file(&c)?);
        Ok(())
    }

    #[test]
    fn test_missing_file_is_error() {
        let hasher = FileHasher::default();
        assert!(hasher.hash_file("/definitely/not/here").is_err());
    }
}
