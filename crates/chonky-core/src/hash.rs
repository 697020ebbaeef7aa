//! SHA-1 content hashing for files.
//!
//! The hash is used as the content identifier (CAS key) for the manifest,
//! the local cache, and the remote object store. Streams the file through a
//! fixed-size buffer rather than reading it fully into memory, since the
//! assets this tool moves around are routinely larger than available RAM.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use sha1::{Digest, Sha1};

use crate::error::ChonkyResult;
use crate::types::ContentHash;

const BUFFER_SIZE: usize = 64 * 1024;

/// Hash a file from disk, streaming it through SHA-1 in 64 KiB chunks.
pub fn hash_file(path: &Path) -> ChonkyResult<ContentHash> {
    let mut file = File::open(path)?;
    let mut hasher = Sha1::new();
    let mut buf = vec![0u8; BUFFER_SIZE];

    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    let digest = hasher.finalize();
    ContentHash::new(hex_encode(&digest))
}

/// Hash an in-memory byte slice. Used by tests and small in-memory paths.
pub fn hash_bytes(data: &[u8]) -> ContentHash {
    let mut hasher = Sha1::new();
    hasher.update(data);
    let digest = hasher.finalize();
    ContentHash::new(hex_encode(&digest)).expect("sha1 digest is always valid hex")
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        write!(s, "{b:02x}").expect("writing to a String cannot fail");
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn known_vector() {
        // echo -n "Hello, Chonky!" | sha1sum
        let h = hash_bytes(b"Hello, Chonky!");
        assert_eq!(h.as_str(), "aaf4c4e3544830bcbd9cd8d1a566692d43d0de62");
    }

    #[test]
    fn empty_input() {
        let h = hash_bytes(b"");
        assert_eq!(h.as_str(), "da39a3ee5e6b4b0d3255bfef95601890afd80709");
    }

    #[test]
    fn file_matches_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.txt");
        let mut f = File::create(&path).unwrap();
        f.write_all(b"streaming hash test").unwrap();
        drop(f);

        let from_file = hash_file(&path).unwrap();
        let from_bytes = hash_bytes(b"streaming hash test");
        assert_eq!(from_file, from_bytes);
    }

    #[test]
    fn missing_file_is_io_error() {
        let result = hash_file(Path::new("/nonexistent/definitely/not/here"));
        assert!(matches!(result, Err(crate::error::ChonkyError::Io(_))));
    }

    #[test]
    fn large_file_spans_multiple_buffers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.bin");
        let data = vec![0x5au8; BUFFER_SIZE * 3 + 17];
        std::fs::write(&path, &data).unwrap();

        let from_file = hash_file(&path).unwrap();
        let from_bytes = hash_bytes(&data);
        assert_eq!(from_file, from_bytes);
    }
}
