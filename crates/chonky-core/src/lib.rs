//! Manifest model, three-way diff, and workspace walker — the pure,
//! filesystem-adjacent core that `chonky-sync`'s `Reconciler` drives.

pub mod diff;
pub mod error;
pub mod hash;
pub mod manifest;
pub mod types;
pub mod walker;

pub use diff::{conflicts, Diff};
pub use error::{ChonkyError, ChonkyResult};
pub use hash::{hash_bytes, hash_file};
pub use manifest::Manifest;
pub use types::{ChangeKind, ContentHash};
pub use walker::{build_working_manifest, WalkedFile, Walker};
