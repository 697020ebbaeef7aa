//! The reconciler: orchestrates `status`/`sync`/`submit`/`revert` over a
//! single workspace, bridging the pure `chonky-core` manifest/diff model
//! with `chonky-store`'s cache and remote.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chonky_core::{
    build_working_manifest, conflicts, hash_file, ChonkyError, ChonkyResult, ContentHash, Diff,
    Manifest, Walker,
};
use chonky_store::{CacheStore, Remote, StoreError};
use tracing::{debug, info, warn};

/// Summary returned by `status`. Never mutates on-disk state.
#[derive(Debug, Clone)]
pub struct StatusReport {
    pub remote_diff: Diff,
    pub working_diff: Diff,
    pub conflicts: Vec<String>,
}

impl StatusReport {
    /// Render as `prefix path` lines, remote changes first, then working
    /// changes, matching the CLI's plain-text status output. Each side
    /// independently reports a clean message when it has no changes, rather
    /// than being silent.
    pub fn lines(&self) -> Vec<String> {
        let mut out = Vec::new();
        if !self.conflicts.is_empty() {
            out.push(format!("conflicts: {}", self.conflicts.join(", ")));
        }

        if self.remote_diff.is_empty() {
            out.push("Workspace is up to date with the remote".to_string());
        } else {
            for path in &self.remote_diff.added {
                out.push(format!("remote: added    {path}"));
            }
            for path in &self.remote_diff.modified {
                out.push(format!("remote: modified {path}"));
            }
            for path in &self.remote_diff.missing {
                out.push(format!("remote: missing  {path}"));
            }
        }

        if self.working_diff.is_empty() {
            out.push("Workspace has no changes to submit".to_string());
        } else {
            for path in &self.working_diff.added {
                out.push(format!("local:  added    {path}"));
            }
            for path in &self.working_diff.modified {
                out.push(format!("local:  modified {path}"));
            }
            for path in &self.working_diff.missing {
                out.push(format!("local:  missing  {path}"));
            }
        }

        out
    }
}

/// Loads and holds the three manifests for one workspace, and drives the
/// four reconciler operations against a particular `Remote` backend.
pub struct Reconciler<R: Remote> {
    manifest_path: PathBuf,
    workspace_path: PathBuf,
    local_manifest_path: PathBuf,
    local_manifest: Manifest,
    remote: R,
    cache: CacheStore,
    concurrency: usize,
}

impl<R: Remote> Reconciler<R> {
    /// Open a workspace given the path to its (remote) manifest file.
    pub fn open(
        manifest_path: impl Into<PathBuf>,
        remote: R,
        cache: CacheStore,
        concurrency: usize,
    ) -> ChonkyResult<Self> {
        let manifest_path = manifest_path.into();
        if !manifest_path.is_file() {
            return Err(ChonkyError::Config(format!(
                "manifest not found: {}",
                manifest_path.display()
            )));
        }

        let remote_manifest = Manifest::load(&manifest_path)?;
        let workspace_rel = remote_manifest.config_get("workspace").ok_or_else(|| {
            ChonkyError::Config("manifest is missing the required 'workspace' key".into())
        })?;

        let manifest_parent = manifest_path.parent().unwrap_or_else(|| Path::new("."));
        let workspace_path = manifest_parent.join(workspace_rel);
        std::fs::create_dir_all(&workspace_path)?;

        let local_manifest_path = workspace_path.join(".HEAD");
        let local_manifest = if local_manifest_path.is_file() {
            Manifest::load(&local_manifest_path)?
        } else {
            Manifest::empty()
        };

        cache.ensure_exists().map_err(map_store_err)?;

        Ok(Reconciler {
            manifest_path,
            workspace_path,
            local_manifest_path,
            local_manifest,
            remote,
            cache,
            concurrency,
        })
    }

    pub fn workspace_path(&self) -> &Path {
        &self.workspace_path
    }

    /// Re-read the remote manifest from disk. Never cached on `self`: a
    /// concurrent submitter (a second client, or this same CLI run on a
    /// prior invocation) may have moved it since `open`, and the
    /// fast-forward check in `submit` depends on seeing that.
    fn load_remote(&self) -> ChonkyResult<Manifest> {
        Manifest::load(&self.manifest_path)
    }

    fn ignore_globs(remote: &Manifest) -> Vec<String> {
        remote
            .config_get("ignore")
            .map(|s| s.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default()
    }

    fn build_working(&self, remote: &Manifest) -> ChonkyResult<Manifest> {
        let walker = Walker::new(&self.workspace_path, &Self::ignore_globs(remote))?;
        let files = walker.walk()?;
        build_working_manifest(&files)
    }

    /// Read-only: computes both diffs and the conflict set.
    pub fn status(&self) -> ChonkyResult<StatusReport> {
        let remote = self.load_remote()?;
        let working = self.build_working(&remote)?;
        let remote_diff = Diff::compute(&self.local_manifest, &remote);
        let working_diff = Diff::compute(&self.local_manifest, &working);
        let conflict_paths = conflicts(&remote_diff, &working_diff);

        info!(
            workspace = %self.workspace_path.display(),
            remote_changed = remote_diff.changed().len(),
            working_changed = working_diff.changed().len(),
            conflicts = conflict_paths.len(),
            "status"
        );

        Ok(StatusReport {
            remote_diff,
            working_diff,
            conflicts: conflict_paths,
        })
    }

    /// remote → workspace.
    pub async fn sync(&mut self) -> ChonkyResult<()> {
        let remote = self.load_remote()?;
        let working = self.build_working(&remote)?;
        let remote_diff = Diff::compute(&self.local_manifest, &remote);

        if remote_diff.is_empty() {
            info!(workspace = %self.workspace_path.display(), "sync: no remote changes");
            return Ok(());
        }

        let working_diff = Diff::compute(&self.local_manifest, &working);
        let conflict_paths = conflicts(&remote_diff, &working_diff);
        if !conflict_paths.is_empty() {
            return Err(ChonkyError::Conflict(conflict_paths));
        }

        let mut to_pull: Vec<ContentHash> = remote
            .head_items()
            .map(|(_, h)| h.clone())
            .filter(|h| !self.cache.has(h))
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        to_pull.sort();

        if !to_pull.is_empty() {
            self.remote
                .pull(&to_pull, &self.cache, self.concurrency)
                .await
                .map_err(map_store_err)?;
        }

        for path in remote_diff.added.iter().chain(remote_diff.modified.iter()) {
            let hash = remote.head_get(path).expect("diff-sourced path must exist").clone();
            self.local_manifest.head_set(path.clone(), hash.clone());
            let dst = self.workspace_path.join(path);
            self.cache.materialize(&hash, &dst).map_err(map_store_err)?;
            debug!(path = %path, "sync: materialized");
        }

        for path in &remote_diff.missing {
            self.local_manifest.head_delete(path);
            let target = self.workspace_path.join(path);
            match std::fs::remove_file(&target) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
            debug!(path = %path, "sync: removed");
        }

        self.local_manifest.save(&self.local_manifest_path)?;
        info!(workspace = %self.workspace_path.display(), "sync: complete");
        Ok(())
    }

    /// workspace → remote. Fast-forward only: fails with `PendingRemote` if
    /// the remote has moved since the last sync.
    pub async fn submit(&mut self) -> ChonkyResult<()> {
        let start_time = SystemTime::now();
        let mut remote = self.load_remote()?;
        let working = self.build_working(&remote)?;
        let working_diff = Diff::compute(&self.local_manifest, &working);

        if working_diff.is_empty() {
            info!(workspace = %self.workspace_path.display(), "submit: no local changes");
            return Ok(());
        }

        let remote_diff = Diff::compute(&self.local_manifest, &remote);
        if !remote_diff.is_empty() {
            return Err(ChonkyError::PendingRemote);
        }

        for (path, hash) in working.head_items() {
            if self.cache.has(hash) {
                continue;
            }
            let src = self.workspace_path.join(path);
            self.cache.copy_to_temp(&src, hash).map_err(map_store_err)?;

            let mtime = self.cache.temp_mtime(hash).map_err(map_store_err)?;
            if mtime > start_time {
                self.cache.discard_temp(hash).map_err(map_store_err)?;
                return Err(ChonkyError::ModifiedDuringRun(path.to_string()));
            }

            let rehashed = hash_file(&self.cache.temp_path_of(hash))?;
            if &rehashed != hash {
                warn!(path = %path, "submit: content changed between hash and copy");
                self.cache.discard_temp(hash).map_err(map_store_err)?;
                return Err(ChonkyError::ModifiedDuringRun(path.to_string()));
            }

            self.cache.finalize_temp(hash).map_err(map_store_err)?;
            debug!(path = %path, hash = %hash, "submit: cached");
        }

        let new_head = working.head_map().clone();
        self.local_manifest.set_head(new_head.clone());
        remote.set_head(new_head);

        let mut to_push: Vec<ContentHash> = working_diff
            .added
            .iter()
            .chain(working_diff.modified.iter())
            .filter_map(|path| self.local_manifest.head_get(path).cloned())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        to_push.sort();

        if !to_push.is_empty() {
            self.remote
                .push(&to_push, &self.cache, self.concurrency)
                .await
                .map_err(map_store_err)?;
        }

        self.local_manifest.save(&self.local_manifest_path)?;
        remote.save(&self.manifest_path)?;
        info!(workspace = %self.workspace_path.display(), files = working.head_len(), "submit: complete");
        Ok(())
    }

    /// workspace ← local. Never touches the manifests (local is already
    /// the state we're restoring to).
    pub fn revert(&mut self) -> ChonkyResult<()> {
        let remote = self.load_remote()?;
        let working = self.build_working(&remote)?;
        let working_diff = Diff::compute(&self.local_manifest, &working);
        if working_diff.is_empty() {
            info!(workspace = %self.workspace_path.display(), "revert: already matches local");
            return Ok(());
        }

        for path in working_diff.modified.iter().chain(working_diff.missing.iter()) {
            let hash = self
                .local_manifest
                .head_get(path)
                .expect("diff-sourced path must exist in local manifest")
                .clone();
            let dst = self.workspace_path.join(path);
            self.cache.materialize(&hash, &dst).map_err(map_store_err)?;
            debug!(path = %path, "revert: restored");
        }

        for path in &working_diff.added {
            let target = self.workspace_path.join(path);
            match std::fs::remove_file(&target) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
            debug!(path = %path, "revert: removed");
        }

        info!(workspace = %self.workspace_path.display(), "revert: complete");
        Ok(())
    }
}

fn map_store_err(e: StoreError) -> ChonkyError {
    match e {
        StoreError::Io(io) => ChonkyError::Io(io),
        other => ChonkyError::Remote(other.to_string()),
    }
}

/// Used by `chonky-cli`'s `stats` subcommand: has nothing to do with a
/// particular workspace's reconciliation, just summarizes the cache.
pub fn cache_stats(cache: &CacheStore) -> ChonkyResult<CacheStats> {
    let mut object_count = 0u64;
    let mut total_bytes = 0u64;
    if cache.root().is_dir() {
        for entry in std::fs::read_dir(cache.root())? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with("temp.") {
                continue;
            }
            let meta = entry.metadata()?;
            if meta.is_file() {
                object_count += 1;
                total_bytes += meta.len();
            }
        }
    }
    Ok(CacheStats {
        root: cache.root().to_path_buf(),
        object_count,
        total_bytes,
    })
}

#[derive(Debug, Clone)]
pub struct CacheStats {
    pub root: PathBuf,
    pub object_count: u64,
    pub total_bytes: u64,
}
