//! The local content cache: a flat directory keyed by content hash.

use std::path::{Path, PathBuf};

use chonky_core::ContentHash;

use crate::error::{StoreError, StoreResult};

/// A flat cache directory where each object's filename is its hash.
#[derive(Debug, Clone)]
pub struct CacheStore {
    root: PathBuf,
}

impl CacheStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        CacheStore { root: root.into() }
    }

    /// The per-user cache directory chonky defaults to when no explicit
    /// cache path is configured (`$XDG_CACHE_HOME/chonky`, or the platform
    /// equivalent resolved by the `dirs` crate).
    pub fn default_root() -> StoreResult<PathBuf> {
        let base = dirs::cache_dir().ok_or_else(|| {
            StoreError::Cache("could not determine the platform cache directory".into())
        })?;
        Ok(base.join("chonky"))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn ensure_exists(&self) -> StoreResult<()> {
        std::fs::create_dir_all(&self.root)?;
        Ok(())
    }

    pub fn has(&self, hash: &ContentHash) -> bool {
        self.path_of(hash).is_file()
    }

    pub fn path_of(&self, hash: &ContentHash) -> PathBuf {
        self.root.join(hash.as_str())
    }

    /// Copy `src_path` into the cache under `hash`'s key, atomically
    /// (write to a temp file in the cache dir, then rename). Convenience
    /// wrapper around `copy_to_temp` + `finalize_temp` for callers that
    /// don't need the TOCTOU guard (e.g. `sync`'s remote-to-cache path,
    /// tests).
    ///
    /// Returns the temp file's mtime so TOCTOU-sensitive callers (submit)
    /// can compare it against a `start_time` captured before hashing began.
    pub fn ingest(&self, src_path: &Path, hash: &ContentHash) -> StoreResult<std::time::SystemTime> {
        let tmp = self.copy_to_temp(src_path, hash)?;
        let mtime = tmp.metadata()?.modified()?;
        self.finalize_temp(hash)?;
        Ok(mtime)
    }

    /// Copy `src_path` to `cache/temp.<hash>` without finalizing. Exposed
    /// separately so `submit` can insert its TOCTOU and content checks
    /// between the copy and the rename.
    ///
    /// `std::fs::copy` does not preserve the source's mtime (it stamps the
    /// copy with the current time), so the source's mtime is read first and
    /// reapplied to the temp file — the TOCTOU check in `submit` compares
    /// against this preserved mtime, not the copy's.
    pub fn copy_to_temp(&self, src_path: &Path, hash: &ContentHash) -> StoreResult<PathBuf> {
        self.ensure_exists()?;
        let src_mtime = src_path.metadata()?.modified()?;
        let tmp = self.temp_path(hash);
        std::fs::copy(src_path, &tmp)?;
        std::fs::File::options()
            .write(true)
            .open(&tmp)?
            .set_modified(src_mtime)?;
        Ok(tmp)
    }

    pub fn temp_mtime(&self, hash: &ContentHash) -> StoreResult<std::time::SystemTime> {
        Ok(self.temp_path(hash).metadata()?.modified()?)
    }

    /// Rename `cache/temp.<hash>` to `cache/<hash>`.
    pub fn finalize_temp(&self, hash: &ContentHash) -> StoreResult<()> {
        std::fs::rename(self.temp_path(hash), self.path_of(hash))?;
        Ok(())
    }

    pub fn temp_path_of(&self, hash: &ContentHash) -> PathBuf {
        self.temp_path(hash)
    }

    /// Ingest bytes fetched from the remote directly into the cache,
    /// atomically. Unlike `ingest`, there is no TOCTOU concern here — the
    /// bytes did not come from a workspace file that could be mutated
    /// mid-run.
    pub fn ingest_bytes(&self, data: &[u8], hash: &ContentHash) -> StoreResult<()> {
        self.ensure_exists()?;
        let tmp = self.temp_path(hash);
        std::fs::write(&tmp, data)?;
        let dst = self.path_of(hash);
        std::fs::rename(&tmp, &dst)?;
        Ok(())
    }

    /// Remove an ingest temp file left behind by a failed TOCTOU check.
    pub fn discard_temp(&self, hash: &ContentHash) -> StoreResult<()> {
        let tmp = self.temp_path(hash);
        if tmp.exists() {
            std::fs::remove_file(&tmp)?;
        }
        Ok(())
    }

    /// Copy a cached object out to a workspace path, creating parent
    /// directories as needed. Preserves the cached object's mtime, per the
    /// materialize step's contract.
    pub fn materialize(&self, hash: &ContentHash, dst_path: &Path) -> StoreResult<()> {
        if !self.has(hash) {
            return Err(StoreError::Cache(format!(
                "object {hash} is not in the local cache"
            )));
        }
        if let Some(parent) = dst_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let src_path = self.path_of(hash);
        let src_mtime = src_path.metadata()?.modified()?;
        std::fs::copy(&src_path, dst_path)?;
        std::fs::File::options()
            .write(true)
            .open(dst_path)?
            .set_modified(src_mtime)?;
        Ok(())
    }

    fn temp_path(&self, hash: &ContentHash) -> PathBuf {
        self.root.join(format!("temp.{hash}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash(seed: u8) -> ContentHash {
        ContentHash::new(format!("{seed:02x}").repeat(20)).unwrap()
    }

    #[test]
    fn ingest_then_has_then_materialize() {
        let cache_dir = tempfile::tempdir().unwrap();
        let workspace_dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(cache_dir.path());

        let src = workspace_dir.path().join("source.bin");
        std::fs::write(&src, b"cached content").unwrap();

        let h = hash(7);
        assert!(!store.has(&h));
        store.ingest(&src, &h).unwrap();
        assert!(store.has(&h));

        let dst = workspace_dir.path().join("nested/out.bin");
        store.materialize(&h, &dst).unwrap();
        assert_eq!(std::fs::read(&dst).unwrap(), b"cached content");
    }

    #[test]
    fn materialize_missing_object_fails() {
        let cache_dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(cache_dir.path());
        let h = hash(1);
        let dst = cache_dir.path().join("out.bin");
        assert!(store.materialize(&h, &dst).is_err());
    }

    #[test]
    fn no_leftover_temp_file_after_ingest() {
        let cache_dir = tempfile::tempdir().unwrap();
        let workspace_dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(cache_dir.path());
        let src = workspace_dir.path().join("f.bin");
        std::fs::write(&src, b"x").unwrap();

        let h = hash(3);
        store.ingest(&src, &h).unwrap();

        let mut entries = std::fs::read_dir(cache_dir.path()).unwrap();
        assert_eq!(entries.by_ref().count(), 1);
    }
}
