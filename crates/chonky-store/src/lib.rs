//! Content-addressed local cache and S3-compatible remote object store.

pub mod cache;
pub mod error;
pub mod remote;
pub mod s3;

pub use cache::CacheStore;
pub use error::{StoreError, StoreResult};
pub use remote::{has_local, Remote, DEFAULT_CONCURRENCY};
pub use s3::{build_operator, S3Config, S3Remote};
