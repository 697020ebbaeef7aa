//! The `Remote` capability: pull/push a batch of content-hash keys against
//! an object store, plus a local-cache existence check. A plain trait, not
//! a class hierarchy — one concrete backend (`s3::S3Remote`) ships in this
//! crate, and `chonky-sync::Reconciler` is generic over `R: Remote` rather
//! than boxing it, since there's nothing here that needs dynamic dispatch.

use chonky_core::ContentHash;

use crate::cache::CacheStore;
use crate::error::StoreResult;

/// Default bounded-concurrency cap for `pull`/`push`, overridable by the
/// CLI's `--concurrency` flag.
pub const DEFAULT_CONCURRENCY: usize = 16;

pub trait Remote: Send + Sync {
    /// Download each key's object into the local cache. Callers are
    /// expected to have already filtered out keys already present locally
    /// — `pull` itself does not skip.
    async fn pull(
        &self,
        keys: &[ContentHash],
        cache: &CacheStore,
        concurrency: usize,
    ) -> StoreResult<()>;

    /// Upload each key's cached object to the remote, unless it already
    /// exists there (a single stat-style probe per key, never a list).
    async fn push(
        &self,
        keys: &[ContentHash],
        cache: &CacheStore,
        concurrency: usize,
    ) -> StoreResult<()>;
}

/// Trivial local-cache predicate, provided by the core rather than any
/// particular `Remote` backend.
pub fn has_local(cache: &CacheStore, hash: &ContentHash) -> bool {
    cache.has(hash)
}
