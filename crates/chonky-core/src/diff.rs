//! The three-way diff: comparing two manifests' `HEAD` sections and, from
//! two such diffs, deriving the set of conflicting paths.

use std::collections::BTreeSet;

use crate::manifest::Manifest;
use crate::types::ChangeKind;

/// The set of paths that changed between two manifests, partitioned into
/// three disjoint buckets relative to the "base" (first) manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diff {
    /// Present in the comparison manifest, absent from the base.
    pub added: BTreeSet<String>,
    /// Present in the base, absent from the comparison manifest.
    pub missing: BTreeSet<String>,
    /// Present in both, with a different content hash.
    pub modified: BTreeSet<String>,
}

impl Diff {
    /// Diff `base` against `other`: `added` holds paths only `other` has,
    /// `missing` holds paths only `base` has, `modified` holds paths both
    /// have with differing hashes.
    pub fn compute(base: &Manifest, other: &Manifest) -> Diff {
        let mut added = BTreeSet::new();
        let mut missing = BTreeSet::new();
        let mut modified = BTreeSet::new();

        for (path, other_hash) in other.head_items() {
            match base.head_get(path) {
                None => {
                    added.insert(path.to_string());
                }
                Some(base_hash) if base_hash != other_hash => {
                    modified.insert(path.to_string());
                }
                Some(_) => {}
            }
        }

        for (path, _) in base.head_items() {
            if other.head_get(path).is_none() {
                missing.insert(path.to_string());
            }
        }

        Diff {
            added,
            missing,
            modified,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.missing.is_empty() && self.modified.is_empty()
    }

    /// The union of all three buckets — every path this diff touches.
    pub fn changed(&self) -> BTreeSet<String> {
        self.added
            .iter()
            .chain(self.missing.iter())
            .chain(self.modified.iter())
            .cloned()
            .collect()
    }

    pub fn kind_of(&self, path: &str) -> Option<ChangeKind> {
        if self.added.contains(path) {
            Some(ChangeKind::Added)
        } else if self.missing.contains(path) {
            Some(ChangeKind::Missing)
        } else if self.modified.contains(path) {
            Some(ChangeKind::Modified)
        } else {
            None
        }
    }
}

/// Paths that both the remote diff and the working diff touched: these
/// cannot be resolved automatically and must block `submit`/`sync`.
///
/// Returned in ascending path order.
pub fn conflicts(remote_diff: &Diff, working_diff: &Diff) -> Vec<String> {
    remote_diff
        .changed()
        .intersection(&working_diff.changed())
        .cloned()
        .collect()
}
