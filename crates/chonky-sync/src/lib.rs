//! The reconciler: orchestrates `status`/`sync`/`submit`/`revert` over a
//! chonky workspace, using `chonky-core`'s manifest/diff model and
//! `chonky-store`'s cache + remote.

pub mod reconciler;

pub use reconciler::{cache_stats, CacheStats, Reconciler, StatusReport};
