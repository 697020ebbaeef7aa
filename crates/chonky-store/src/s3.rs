//! S3-compatible `Remote` backend, built on OpenDAL — the storage
//! abstraction this codebase already uses for every object-store backend.
//! Selected when the manifest's `config.type` is `s3`.

use anyhow::Context;
use chonky_core::ContentHash;
use futures::stream::{self, StreamExt};
use opendal::Operator;

use crate::cache::CacheStore;
use crate::error::{StoreError, StoreResult};
use crate::remote::Remote;

/// Connection parameters for an S3-compatible endpoint. Credentials are
/// never read from the manifest — only from the environment (see
/// `chonky-cli`'s credential resolution).
#[derive(Debug, Clone)]
pub struct S3Config {
    pub endpoint: String,
    pub region: String,
    pub bucket: String,
    pub root: String,
    pub access_key_id: String,
    pub secret_access_key: String,
}

/// Build an OpenDAL `Operator` for an S3-compatible endpoint.
///
/// Uses path-style addressing (OpenDAL's default), required by most
/// self-hosted S3-compatible stores; do not call
/// `enable_virtual_host_style()` here.
pub fn build_operator(cfg: &S3Config) -> StoreResult<Operator> {
    let builder = opendal::services::S3::default()
        .endpoint(&cfg.endpoint)
        .region(&cfg.region)
        .bucket(&cfg.bucket)
        .access_key_id(&cfg.access_key_id)
        .secret_access_key(&cfg.secret_access_key);

    if cfg.endpoint.starts_with("http://") {
        tracing::warn!(
            endpoint = %cfg.endpoint,
            "S3 endpoint uses plaintext HTTP — credentials are transmitted unencrypted"
        );
    }

    let op = Operator::new(builder)
        .context("creating OpenDAL S3 operator")?
        .layer(opendal::layers::LoggingLayer::default())
        .layer(
            opendal::layers::RetryLayer::new()
                .with_max_times(5)
                .with_jitter(),
        )
        .finish();

    Ok(op)
}

#[derive(Clone)]
pub struct S3Remote {
    op: Operator,
    root: String,
}

impl S3Remote {
    pub fn new(cfg: &S3Config) -> StoreResult<Self> {
        let op = build_operator(cfg)?;
        Ok(S3Remote {
            op,
            root: cfg.root.trim_matches('/').to_string(),
        })
    }

    /// Build directly from an already-constructed `Operator` — used by
    /// tests against `opendal::services::Memory`.
    pub fn from_operator(op: Operator, root: impl Into<String>) -> Self {
        S3Remote {
            op,
            root: root.into().trim_matches('/').to_string(),
        }
    }

    fn object_key(&self, hash: &ContentHash) -> String {
        if self.root.is_empty() {
            hash.to_string()
        } else {
            format!("{}/{}", self.root, hash)
        }
    }
}

impl Remote for S3Remote {
    async fn pull(
        &self,
        keys: &[ContentHash],
        cache: &CacheStore,
        concurrency: usize,
    ) -> StoreResult<()> {
        let cap = concurrency.max(1);
        let results: Vec<StoreResult<()>> = stream::iter(keys.iter().map(|hash| {
            let op = self.op.clone();
            let key = self.object_key(hash);
            async move {
                let bytes = op
                    .read(&key)
                    .await
                    .map_err(|e| StoreError::Remote(format!("pulling {hash}: {e}")))?;
                cache.ingest_bytes(&bytes.to_bytes(), hash)?;
                tracing::debug!(hash = %hash, "pulled");
                Ok(())
            }
        }))
        .buffer_unordered(cap)
        .collect()
        .await;

        results.into_iter().collect::<StoreResult<Vec<()>>>()?;
        Ok(())
    }

    async fn push(
        &self,
        keys: &[ContentHash],
        cache: &CacheStore,
        concurrency: usize,
    ) -> StoreResult<()> {
        let cap = concurrency.max(1);
        let results: Vec<StoreResult<()>> = stream::iter(keys.iter().map(|hash| {
            let op = self.op.clone();
            let key = self.object_key(hash);
            let path = cache.path_of(hash);
            async move {
                if op
                    .exists(&key)
                    .await
                    .map_err(|e| StoreError::Remote(format!("probing {hash}: {e}")))?
                {
                    tracing::debug!(hash = %hash, "already on remote, skipping");
                    return Ok(());
                }
                let data = tokio::fs::read(&path)
                    .await
                    .map_err(|e| StoreError::Remote(format!("reading cached {hash}: {e}")))?;
                op.write(&key, data)
                    .await
                    .map_err(|e| StoreError::Remote(format!("pushing {hash}: {e}")))?;
                tracing::debug!(hash = %hash, "pushed");
                Ok(())
            }
        }))
        .buffer_unordered(cap)
        .collect()
        .await;

        results.into_iter().collect::<StoreResult<Vec<()>>>()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opendal::services::Memory;

    fn hash(seed: u8) -> ContentHash {
        ContentHash::new(format!("{seed:02x}").repeat(20)).unwrap()
    }

    fn memory_remote() -> S3Remote {
        let op = Operator::new(Memory::default()).unwrap().finish();
        S3Remote::from_operator(op, "")
    }

    #[tokio::test]
    async fn push_then_pull_round_trips() {
        let remote = memory_remote();
        let cache_dir = tempfile::tempdir().unwrap();
        let cache = CacheStore::new(cache_dir.path());

        let h = hash(1);
        cache.ingest_bytes(b"round trip", &h).unwrap();

        remote.push(&[h.clone()], &cache, 4).await.unwrap();

        let other_cache_dir = tempfile::tempdir().unwrap();
        let other_cache = CacheStore::new(other_cache_dir.path());
        assert!(!other_cache.has(&h));

        remote.pull(&[h.clone()], &other_cache, 4).await.unwrap();
        assert!(other_cache.has(&h));
        assert_eq!(
            std::fs::read(other_cache.path_of(&h)).unwrap(),
            b"round trip"
        );
    }

    #[tokio::test]
    async fn push_skips_existing_object() {
        let remote = memory_remote();
        let cache_dir = tempfile::tempdir().unwrap();
        let cache = CacheStore::new(cache_dir.path());

        let h = hash(2);
        cache.ingest_bytes(b"first", &h).unwrap();
        remote.push(&[h.clone()], &cache, 4).await.unwrap();

        // Mutate the cached bytes (simulating a corrupt re-submit) and push
        // again — the existence probe must skip it, leaving the remote
        // object untouched.
        std::fs::write(cache.path_of(&h), b"tampered").unwrap();
        remote.push(&[h.clone()], &cache, 4).await.unwrap();

        let other_cache_dir = tempfile::tempdir().unwrap();
        let other_cache = CacheStore::new(other_cache_dir.path());
        remote.pull(&[h.clone()], &other_cache, 4).await.unwrap();
        assert_eq!(std::fs::read(other_cache.path_of(&h)).unwrap(), b"first");
    }

    #[tokio::test]
    async fn pull_of_missing_key_fails() {
        let remote = memory_remote();
        let cache_dir = tempfile::tempdir().unwrap();
        let cache = CacheStore::new(cache_dir.path());
        let h = hash(9);
        assert!(remote.pull(&[h], &cache, 4).await.is_err());
    }

    #[tokio::test]
    async fn root_prefix_is_applied_to_object_keys() {
        let op = Operator::new(Memory::default()).unwrap().finish();
        let remote = S3Remote::from_operator(op.clone(), "prefix/dir");
        let cache_dir = tempfile::tempdir().unwrap();
        let cache = CacheStore::new(cache_dir.path());

        let h = hash(3);
        cache.ingest_bytes(b"x", &h).unwrap();
        remote.push(&[h.clone()], &cache, 4).await.unwrap();

        assert!(op.exists(&format!("prefix/dir/{h}")).await.unwrap());
    }
}
