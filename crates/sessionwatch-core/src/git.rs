//! Git branch and remote lookup for session working directories.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::Instant;
use tracing::trace;

/// Repository facts for one working directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GitInfo {
    pub branch: Option<String>,
    pub repo_url: Option<String>,
    pub repo_id: Option<String>,
}

/// Looks up git information for a directory.
#[async_trait]
pub trait GitInfoProvider: Send + Sync {
    async fn lookup(&self, cwd: &Path) -> Option<GitInfo>;
}

/// Runs the `git` binary found on `PATH`.
#[derive(Debug, Clone)]
pub struct GitCli {
    program: PathBuf,
}

impl GitCli {
    pub fn new() -> Self {
        Self {
            program: PathBuf::from("git"),
        }
    }

    /// Use a specific git binary.
    pub fn with_program(program: PathBuf) -> Self {
        Self { program }
    }

    async fn run(&self, cwd: &Path, args: &[&str]) -> Option<String> {
        let output = Command::new(&self.program)
            .args(args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output()
            .await
            .ok()?;

        if !output.status.success() {
            return None;
        }

        let text = String::from_utf8(output.stdout).ok()?;
        let text = text.trim();
        if text.is_empty() {
            None
        } else {
            Some(text.to_string())
        }
    }
}

impl Default for GitCli {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GitInfoProvider for GitCli {
    async fn lookup(&self, cwd: &Path) -> Option<GitInfo> {
        // Detached HEAD reports the literal "HEAD"; that is not a branch.
        let branch = self
            .run(cwd, &["rev-parse", "--abbrev-ref", "HEAD"])
            .await
            .filter(|b| b != "HEAD");
        let repo_url = self.run(cwd, &["config", "--get", "remote.origin.url"]).await;

        if branch.is_none() && repo_url.is_none() {
            return None;
        }

        let repo_id = repo_url.as_deref().and_then(normalize_repo_id);
        Some(GitInfo {
            branch,
            repo_url,
            repo_id,
        })
    }
}

/// Reduce a remote URL to `host/owner/repo`.
///
/// Handles scp-style (`git@host:owner/repo.git`) and URL-style
/// (`https://host/owner/repo`, `ssh://git@host:22/owner/repo.git`) remotes.
pub fn normalize_repo_id(url: &str) -> Option<String> {
    let url = url.trim();
    let (authority, path) = match url.split_once("://") {
        Some((_, rest)) => rest.split_once('/')?,
        None => url.split_once(':')?,
    };

    let host = authority.rsplit_once('@').map_or(authority, |(_, h)| h);
    let host = host.split_once(':').map_or(host, |(h, _)| h);
    let path = path.trim_matches('/');
    let path = path.strip_suffix(".git").unwrap_or(path);

    if host.is_empty() || path.is_empty() {
        return None;
    }
    Some(format!("{}/{}", host.to_lowercase(), path))
}

/// Short-lived cache in front of a [`GitInfoProvider`].
pub struct GitInfoCache {
    provider: Arc<dyn GitInfoProvider>,
    ttl: Duration,
    entries: HashMap<PathBuf, (Instant, Option<GitInfo>)>,
}

impl GitInfoCache {
    pub fn new(provider: Arc<dyn GitInfoProvider>, ttl: Duration) -> Self {
        Self {
            provider,
            ttl,
            entries: HashMap::new(),
        }
    }

    /// Git info for `cwd`, served from cache while younger than the TTL.
    pub async fn get(&mut self, cwd: &Path) -> Option<GitInfo> {
        if let Some((fetched_at, info)) = self.entries.get(cwd) {
            if fetched_at.elapsed() < self.ttl {
                return info.clone();
            }
        }

        let info = self.provider.lookup(cwd).await;
        trace!(
            target: "sessionwatch::git",
            "Resolved {} -> {:?}",
            cwd.display(),
            info.as_ref().and_then(|i| i.branch.as_deref())
        );
        self.entries
            .insert(cwd.to_path_buf(), (Instant::now(), info.clone()));
        info
    }

    pub fn invalidate(&mut self, cwd: &Path) {
        self.entries.remove(cwd);
    }
}

/// Downstream pull-request / CI poller, keyed by (working directory, branch).
pub trait PrPollTrigger: Send + Sync {
    /// A session is on `branch` in `cwd`; poll for its PR status.
    fn trigger(&self, cwd: &Path, branch: &str, session_id: &str);

    /// Anything cached for (`cwd`, `branch`) is no longer current.
    fn invalidate(&self, cwd: &Path, branch: &str);
}

/// Trigger that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPrPoller;

impl PrPollTrigger for NoopPrPoller {
    fn trigger(&self, _cwd: &Path, _branch: &str, _session_id: &str) {}

    fn invalidate(&self, _cwd: &Path, _branch: &str) {}
}
