// NexusLIMS Logger - core/checksum.rs
//
// Content checksums used to decide whether a file changed since its last
// upload. SHA-256 over the whole file, read in fixed-size chunks so large
// instrument files never need to fit in memory, encoded as standard base64.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use crate::util::constants::CHECKSUM_CHUNK_SIZE;

/// Checksum of an in-memory buffer.
pub fn checksum_bytes(data: &[u8]) -> String {
    STANDARD.encode(Sha256::digest(data))
}

/// Streamed checksum of the file at `path`.
pub fn file_checksum(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; CHECKSUM_CHUNK_SIZE];
    loop {
        let n = match file.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buf[..n]);
    }
    Ok(STANDARD.encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_digest_of_empty_input() {
        // SHA-256("") = e3b0c442...b855
        assert_eq!(
            checksum_bytes(b""),
            "47DEQpj8HBSa+/TImW+5JCeuQeRkm5NMpJWZG3hSuFU="
        );
    }

    #[test]
    fn file_checksum_matches_buffer_checksum_across_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("image.dm3");
        // Larger than one chunk so the loop runs more than once.
        let data: Vec<u8> = (0..(CHECKSUM_CHUNK_SIZE * 2 + 17))
            .map(|i| (i % 251) as u8)
            .collect();
        std::fs::write(&path, &data).unwrap();

        assert_eq!(file_checksum(&path).unwrap(), checksum_bytes(&data));
    }

    #[test]
    fn content_change_changes_checksum() {
        assert_ne!(checksum_bytes(b"frame 1"), checksum_bytes(b"frame 2"));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = file_checksum(&dir.path().join("gone.dm3")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
