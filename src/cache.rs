//! Content digests for derived artifacts written next to a run.

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

pub const DIGEST_EXT: &str = "sha256";

pub fn file_sha256(path: &Path) -> Result<String> {
    let mut file = File::open(path).map_err(|e| Error::io(path, e))?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf).map_err(|e| Error::io(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// `<input>.sha256`, next to the input.
pub fn digest_path(input: &Path) -> PathBuf {
    let mut name = input.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".");
    name.push(DIGEST_EXT);
    input.with_file_name(name)
}

/// Key of one derivation: input content plus the parameters it was run with.
pub fn derivation_key(input: &Path, params: &str) -> Result<String> {
    Ok(format!("{} {}", file_sha256(input)?, params))
}

/// True when the sidecar records exactly `key`.
pub fn is_fresh(input: &Path, key: &str) -> bool {
    std::fs::read_to_string(digest_path(input))
        .map(|stored| stored.trim() == key)
        .unwrap_or(false)
}

pub fn record(input: &Path, key: &str) -> Result<()> {
    let path = digest_path(input);
    std::fs::write(&path, format!("{}\n", key)).map_err(|e| Error::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_known_value() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.hdr");
        std::fs::write(&path, "abc").unwrap();
        assert_eq!(
            file_sha256(&path).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_freshness_tracks_content_and_params() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.hdr");
        std::fs::write(&path, "v1").unwrap();
        let key = derivation_key(&path, "2:7").unwrap();
        assert!(!is_fresh(&path, &key));
        record(&path, &key).unwrap();
        assert!(is_fresh(&path, &key));
        assert_eq!(digest_path(&path), dir.path().join("a.hdr.sha256"));

        assert!(!is_fresh(&path, &derivation_key(&path, "3:7").unwrap()));
        std::fs::write(&path, "v2").unwrap();
        assert!(!is_fresh(&path, &derivation_key(&path, "2:7").unwrap()));
    }
}
