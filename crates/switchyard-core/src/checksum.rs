use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 of a file, read in fixed-size blocks.
///
/// # Errors
/// Returns the underlying I/O error if the file cannot be opened or read.
pub fn sha256_file(path: &Path) -> std::io::Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0_u8; 8192];

    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Find the digest for `file_name` in a `sha256sum`-style listing.
#[must_use]
pub fn parse_expected_checksum(listing: &str, file_name: &str) -> Option<String> {
    listing.lines().find_map(|line| {
        let mut parts = line.split_whitespace();
        let hash = parts.next()?;
        let name = parts
            .next()?
            .trim_start_matches('*')
            .trim_start_matches("./");
        (name == file_name).then(|| hash.to_ascii_lowercase())
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChecksumCheck {
    Match,
    Mismatch { expected: String, actual: String },
}

/// Compare a file's digest with `expected` (case-insensitive hex).
///
/// # Errors
/// Returns the I/O error from hashing.
pub fn verify(path: &Path, expected: &str) -> std::io::Result<ChecksumCheck> {
    let actual = sha256_file(path)?;
    if actual.eq_ignore_ascii_case(expected.trim()) {
        Ok(ChecksumCheck::Match)
    } else {
        Ok(ChecksumCheck::Mismatch {
            expected: expected.trim().to_ascii_lowercase(),
            actual,
        })
    }
}
