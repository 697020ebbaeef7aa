//! Enumerates a workspace directory into POSIX-relative paths, applying
//! ignore-glob filtering and pruning whole directories that match an ignore
//! pattern. Symlinks are skipped outright — the manifest format has no way
//! to represent "this is a link," and silently hashing the link target
//! would make the tool lie about what it's tracking.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use glob::Pattern;
use rayon::prelude::*;

use crate::error::ChonkyResult;
use crate::hash::hash_file;
use crate::manifest::Manifest;

/// A file found under the workspace root, with its path already normalized
/// to a POSIX-style relative string (forward slashes, no leading `./`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkedFile {
    pub rel_path: String,
    pub abs_path: PathBuf,
}

/// Walks `root`, skipping paths that match any of `ignore_patterns` and
/// always skipping the manifest's own local-state file (`.HEAD`) and
/// symlinks. Returns paths sorted for deterministic iteration.
pub struct Walker {
    root: PathBuf,
    patterns: Vec<Pattern>,
}

impl Walker {
    pub fn new(root: impl Into<PathBuf>, ignore_globs: &[String]) -> ChonkyResult<Self> {
        let patterns = ignore_globs
            .iter()
            .map(|g| {
                Pattern::new(g).map_err(|e| {
                    crate::error::ChonkyError::Config(format!("invalid ignore pattern {g:?}: {e}"))
                })
            })
            .collect::<ChonkyResult<Vec<_>>>()?;
        Ok(Walker {
            root: root.into(),
            patterns,
        })
    }

    /// Walk the whole tree and return every non-ignored, non-symlink file.
    pub fn walk(&self) -> ChonkyResult<Vec<WalkedFile>> {
        let mut out = Vec::new();
        self.walk_dir(&self.root, &mut out)?;
        out.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
        Ok(out)
    }

    fn walk_dir(&self, dir: &Path, out: &mut Vec<WalkedFile>) -> ChonkyResult<()> {
        let entries = match std::fs::read_dir(dir) {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        for entry in entries {
            let entry = entry?;
            let abs_path = entry.path();
            let file_type = entry.file_type()?;

            if file_type.is_symlink() {
                continue;
            }

            let rel_path = self.to_posix_relative(&abs_path);

            if rel_path == ".HEAD" || self.is_ignored(&rel_path, file_type.is_dir()) {
                continue;
            }

            if file_type.is_dir() {
                self.walk_dir(&abs_path, out)?;
            } else if file_type.is_file() {
                out.push(WalkedFile { rel_path, abs_path });
            }
        }
        Ok(())
    }

    fn is_ignored(&self, rel_path: &str, is_dir: bool) -> bool {
        self.patterns.iter().any(|p| {
            if p.matches(rel_path) {
                return true;
            }
            // A pattern like "build/" should prune the whole directory even
            // though glob's matcher treats the trailing slash literally.
            if is_dir {
                let trimmed = rel_path.trim_end_matches('/');
                let with_slash = format!("{trimmed}/");
                return p.matches(&with_slash) || p.matches(trimmed);
            }
            false
        })
    }

    fn to_posix_relative(&self, abs_path: &Path) -> String {
        let rel = abs_path.strip_prefix(&self.root).unwrap_or(abs_path);
        rel.components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/")
    }
}

/// Hash every walked file in parallel (via `rayon`) and fold the results
/// into a fresh manifest. Enumeration order is never observable: the
/// manifest sorts `HEAD` on its own when it's serialized.
pub fn build_working_manifest(files: &[WalkedFile]) -> ChonkyResult<Manifest> {
    let hashed: Vec<ChonkyResult<(String, crate::types::ContentHash)>> = files
        .par_iter()
        .map(|f| {
            let hash = hash_file(&f.abs_path)?;
            Ok((f.rel_path.clone(), hash))
        })
        .collect();

    let mut head = BTreeMap::new();
    for entry in hashed {
        let (path, hash) = entry?;
        head.insert(path, hash);
    }

    let mut manifest = Manifest::empty();
    manifest.set_head(head);
    Ok(manifest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, b"x").unwrap();
    }

    #[test]
    fn finds_nested_files_sorted() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("b.txt"));
        touch(&dir.path().join("sub/a.txt"));
        touch(&dir.path().join("a.txt"));

        let walker = Walker::new(dir.path(), &[]).unwrap();
        let files = walker.walk().unwrap();
        let paths: Vec<&str> = files.iter().map(|f| f.rel_path.as_str()).collect();
        assert_eq!(paths, vec!["a.txt", "b.txt", "sub/a.txt"]);
    }

    #[test]
    fn ignores_matching_glob() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("keep.txt"));
        touch(&dir.path().join("skip.tmp"));

        let walker = Walker::new(dir.path(), &["*.tmp".to_string()]).unwrap();
        let files = walker.walk().unwrap();
        let paths: Vec<&str> = files.iter().map(|f| f.rel_path.as_str()).collect();
        assert_eq!(paths, vec!["keep.txt"]);
    }

    #[test]
    fn prunes_ignored_directory_entirely() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("keep.txt"));
        touch(&dir.path().join("build/output.bin"));
        touch(&dir.path().join("build/nested/deep.bin"));

        let walker = Walker::new(dir.path(), &["build/".to_string()]).unwrap();
        let files = walker.walk().unwrap();
        let paths: Vec<&str> = files.iter().map(|f| f.rel_path.as_str()).collect();
        assert_eq!(paths, vec!["keep.txt"]);
    }

    #[test]
    fn always_skips_dot_head() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join(".HEAD"));
        touch(&dir.path().join("real.txt"));

        let walker = Walker::new(dir.path(), &[]).unwrap();
        let files = walker.walk().unwrap();
        let paths: Vec<&str> = files.iter().map(|f| f.rel_path.as_str()).collect();
        assert_eq!(paths, vec!["real.txt"]);
    }

    #[test]
    fn missing_root_yields_empty_walk() {
        let walker = Walker::new("/definitely/not/a/real/path", &[]).unwrap();
        assert_eq!(walker.walk().unwrap(), Vec::new());
    }

    #[test]
    fn build_working_manifest_hashes_every_file() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("a.txt"));
        touch(&dir.path().join("sub/b.txt"));

        let walker = Walker::new(dir.path(), &[]).unwrap();
        let files = walker.walk().unwrap();
        let manifest = build_working_manifest(&files).unwrap();

        assert_eq!(manifest.head_len(), 2);
        assert!(manifest.head_get("a.txt").is_some());
        assert!(manifest.head_get("sub/b.txt").is_some());
    }
}
