//! Content hashing
//!
//! Every hash in a manifest is the MD5 digest of a file's bytes, rendered as
//! 32 uppercase hexadecimal characters. MD5 is used for change detection
//! against an authoritative manifest, not as a security boundary.
//!
//! ## Example
//!
//! ```rust
//! use patchlist::hasher::{hash_bytes, HASH_LEN};
//!
//! let hash = hash_bytes(b"hello");
//! assert_eq!(hash, "5D41402ABC4B2A76B9719D911017C592");
//! assert_eq!(hash.len(), HASH_LEN);
//! ```

use crate::error::Result;
use md5::{Digest, Md5};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::trace;

/// Length of a rendered content hash
pub const HASH_LEN: usize = 32;

const BUFFER_SIZE: usize = 64 * 1024;

/// Hash everything readable from `reader`
///
/// Reads in fixed-size chunks, so memory use does not grow with the input.
/// Returns the hash and the number of bytes consumed.
pub fn hash_reader<R: Read>(mut reader: R) -> Result<(String, u64)> {
    let mut hasher = Md5::new();
    let mut buffer = vec![0u8; BUFFER_SIZE];
    let mut total = 0u64;

    loop {
        let bytes_read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        hasher.update(&buffer[..bytes_read]);
        total += bytes_read as u64;
    }

    Ok((hex::encode_upper(hasher.finalize()), total))
}

/// Hash a file's content
///
/// # Errors
///
/// - [`PatchlistError::Io`](crate::PatchlistError::Io) if the file cannot be opened or read
pub fn hash_file(path: &Path) -> Result<String> {
    hash_file_with_size(path).map(|(hash, _)| hash)
}

/// Hash a file's content and report how many bytes were hashed
pub fn hash_file_with_size(path: &Path) -> Result<(String, u64)> {
    let file = File::open(path)?;
    let (hash, size) = hash_reader(file)?;
    trace!("Hashed {:?}: {} ({} bytes)", path, hash, size);
    Ok((hash, size))
}

/// Hash bytes that are already in memory
pub fn hash_bytes(data: &[u8]) -> String {
    hex::encode_upper(Md5::digest(data))
}

/// Compare two rendered hashes, ignoring ASCII case
pub fn hashes_match(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}
