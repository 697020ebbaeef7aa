//! chonky: content-addressed file sync CLI
//!
//! Commands:
//!   status    - show remote/local/working diffs and any conflicts
//!   sync      - pull remote changes into the workspace
//!   submit    - push workspace changes to the remote (fast-forward only)
//!   revert    - restore the workspace to the last synced/submitted state
//!   stats     - summarize the local content cache

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use chonky_core::Manifest;
use chonky_store::{CacheStore, S3Config, S3Remote, DEFAULT_CONCURRENCY};
use chonky_sync::{cache_stats, Reconciler};

#[derive(Parser, Debug)]
#[command(
    name = "chonky",
    version,
    about = "Content-addressed file sync",
    long_about = "chonky: reconcile a workspace against a shared manifest, S3-style remote, and local content cache"
)]
struct Cli {
    /// Path to a single manifest file. If omitted, walks the current
    /// directory (skipping dot/double-underscore directories) for every
    /// file named CHONKY and runs the command against each.
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Raise log verbosity to debug.
    #[arg(long, short = 'v')]
    verbose: bool,

    /// Override the pull/push worker pool size.
    #[arg(long)]
    concurrency: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show remote and working diffs, plus any conflicts.
    Status,
    /// Pull remote changes into the workspace.
    Sync,
    /// Push workspace changes to the remote.
    Submit,
    /// Restore the workspace to the last synced/submitted state.
    Revert,
    /// Summarize the local content cache.
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let concurrency = cli.concurrency.unwrap_or(DEFAULT_CONCURRENCY);

    if let Commands::Stats = cli.command {
        return cmd_stats();
    }

    let manifests = match &cli.config {
        Some(path) => vec![path.clone()],
        None => discover_manifests(&std::env::current_dir()?)?,
    };

    if manifests.is_empty() {
        anyhow::bail!("no CHONKY manifest found (pass --config to select one explicitly)");
    }

    let mut any_failed = false;
    for manifest_path in &manifests {
        if manifests.len() > 1 || cli.config.is_none() {
            println!("Workspace: {}", relative_label(manifest_path));
        }
        if let Err(e) = run_command(&cli.command, manifest_path, concurrency).await {
            eprintln!("error: {e:#}");
            any_failed = true;
        }
    }

    if any_failed {
        std::process::exit(1);
    }
    Ok(())
}

async fn run_command(command: &Commands, manifest_path: &Path, concurrency: usize) -> Result<()> {
    let manifest = Manifest::load(manifest_path)
        .with_context(|| format!("loading manifest: {}", manifest_path.display()))?;
    let remote = build_remote_from_env(&manifest)?;
    let cache = CacheStore::new(CacheStore::default_root()?);
    let mut reconciler = Reconciler::open(manifest_path, remote, cache, concurrency)?;

    match command {
        Commands::Status => {
            let report = reconciler.status()?;
            for line in report.lines() {
                println!("{line}");
            }
        }
        Commands::Sync => {
            reconciler.sync().await?;
            println!("synced");
        }
        Commands::Submit => {
            reconciler.submit().await?;
            println!("submitted");
        }
        Commands::Revert => {
            reconciler.revert()?;
            println!("reverted");
        }
        Commands::Stats => unreachable!("handled before opening a reconciler"),
    }
    Ok(())
}

fn cmd_stats() -> Result<()> {
    let cache = CacheStore::new(CacheStore::default_root()?);
    let stats = cache_stats(&cache)?;
    println!("cache root:   {}", stats.root.display());
    println!("objects:      {}", stats.object_count);
    println!("total bytes:  {}", stats.total_bytes);
    Ok(())
}

/// Build a `Remote` using credentials from the environment — never from
/// the manifest file itself.
fn build_remote_from_env(manifest: &Manifest) -> Result<S3Remote> {
    let backend_type = manifest
        .config_get("type")
        .context("manifest is missing the required 'type' key")?;
    if backend_type != "s3" {
        anyhow::bail!("unsupported remote type: {backend_type}");
    }

    let access_key_id = std::env::var("AWS_ACCESS_KEY_ID").context(
        "S3 credentials not set\n\
         Set AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY environment variables.\n\
         Example:\n\
         \texport AWS_ACCESS_KEY_ID=your-key\n\
         \texport AWS_SECRET_ACCESS_KEY=your-secret",
    )?;
    let secret_access_key = std::env::var("AWS_SECRET_ACCESS_KEY")
        .context("AWS_SECRET_ACCESS_KEY environment variable not set")?;

    let bucket = manifest
        .config_get("bucket")
        .context("manifest is missing the required 'bucket' key")?
        .to_string();
    let endpoint = manifest
        .config_get("endpoint")
        .unwrap_or("https://s3.amazonaws.com")
        .to_string();
    let root = manifest.config_get("root").unwrap_or("").to_string();

    let cfg = S3Config {
        endpoint,
        region: "us-east-1".to_string(),
        bucket,
        root,
        access_key_id,
        secret_access_key,
    };
    Ok(S3Remote::new(&cfg)?)
}

/// Walk `root` for files named `CHONKY`, skipping dot- and
/// double-underscore-prefixed directories, sorted for deterministic order.
fn discover_manifests(root: &Path) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    walk_for_manifests(root, &mut found)?;
    found.sort();
    Ok(found)
}

fn walk_for_manifests(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    for entry in entries {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let name = entry.file_name();
        let name = name.to_string_lossy();

        if file_type.is_dir() {
            if name.starts_with('.') || name.starts_with("__") {
                continue;
            }
            walk_for_manifests(&entry.path(), out)?;
        } else if file_type.is_file() && name == "CHONKY" {
            out.push(entry.path());
        }
    }
    Ok(())
}

fn relative_label(manifest_path: &Path) -> String {
    std::env::current_dir()
        .ok()
        .and_then(|cwd| manifest_path.strip_prefix(&cwd).ok().map(|p| p.to_path_buf()))
        .unwrap_or_else(|| manifest_path.to_path_buf())
        .display()
        .to_string()
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();
}
