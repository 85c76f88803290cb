//! Filesystem watches on the transcript tree and the hook-signal directory.
//!
//! Transcripts live at exactly `<projects>/<project>/<session>.jsonl`.
//! Anything deeper (subagent logs, tool output) is ignored:
//!
//! ```text
//! <projects>/
//! ├── <project>/
//! │   ├── <session>.jsonl          watched
//! │   └── <session>/subagents/...  ignored
//! ```

use crate::Result;
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use sessionwatch_types::parse_signal_file_name;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// A relevant filesystem change, already filtered by path shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    TranscriptChanged(PathBuf),
    TranscriptRemoved(PathBuf),
    SignalChanged(PathBuf),
    SignalRemoved(PathBuf),
}

impl WatchEvent {
    pub fn path(&self) -> &Path {
        match self {
            WatchEvent::TranscriptChanged(p)
            | WatchEvent::TranscriptRemoved(p)
            | WatchEvent::SignalChanged(p)
            | WatchEvent::SignalRemoved(p) => p,
        }
    }
}

/// Whether `path` is a top-level session transcript under `projects_dir`.
pub fn is_transcript_path(projects_dir: &Path, path: &Path) -> bool {
    if path.extension().and_then(|e| e.to_str()) != Some("jsonl") {
        return false;
    }
    path.strip_prefix(projects_dir)
        .map(|rel| rel.components().count() == 2)
        .unwrap_or(false)
}

/// Whether `path` is a `<session>.<kind>.json` file directly in `signals_dir`.
pub fn is_signal_path(signals_dir: &Path, path: &Path) -> bool {
    path.parent() == Some(signals_dir) && parse_signal_file_name(path).is_some()
}

enum Change {
    Changed,
    Removed,
}

/// Map a notify event kind onto a change for one of its paths.
///
/// Renames reported without a side (`Any`, `Both`, `Other`) are resolved by
/// whether the path still exists.
fn classify_change(kind: &EventKind, path: &Path) -> Option<Change> {
    match kind {
        EventKind::Remove(_) => Some(Change::Removed),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => Some(Change::Removed),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => Some(Change::Changed),
        EventKind::Modify(ModifyKind::Name(_)) => {
            if path.exists() {
                Some(Change::Changed)
            } else {
                Some(Change::Removed)
            }
        }
        EventKind::Create(_) | EventKind::Modify(_) => Some(Change::Changed),
        _ => None,
    }
}

fn watch_transcripts(
    projects_dir: &Path,
    tx: mpsc::UnboundedSender<WatchEvent>,
) -> Result<RecommendedWatcher> {
    let root = projects_dir.to_path_buf();
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
        Ok(event) => {
            for path in event.paths {
                if !is_transcript_path(&root, &path) {
                    continue;
                }
                let event = match classify_change(&event.kind, &path) {
                    Some(Change::Changed) => WatchEvent::TranscriptChanged(path),
                    Some(Change::Removed) => WatchEvent::TranscriptRemoved(path),
                    None => continue,
                };
                let _ = tx.send(event);
            }
        }
        Err(e) => error!(target: "sessionwatch::watch", "Transcript watch error: {}", e),
    })?;
    watcher.watch(projects_dir, RecursiveMode::Recursive)?;
    info!(
        target: "sessionwatch::watch",
        "Watching transcripts under {}",
        projects_dir.display()
    );
    Ok(watcher)
}

fn watch_signals(
    signals_dir: &Path,
    tx: mpsc::UnboundedSender<WatchEvent>,
) -> Result<RecommendedWatcher> {
    let root = signals_dir.to_path_buf();
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
        Ok(event) => {
            for path in event.paths {
                if !is_signal_path(&root, &path) {
                    continue;
                }
                let event = match classify_change(&event.kind, &path) {
                    Some(Change::Changed) => WatchEvent::SignalChanged(path),
                    Some(Change::Removed) => WatchEvent::SignalRemoved(path),
                    None => continue,
                };
                let _ = tx.send(event);
            }
        }
        Err(e) => error!(target: "sessionwatch::watch", "Signal watch error: {}", e),
    })?;
    watcher.watch(signals_dir, RecursiveMode::NonRecursive)?;
    info!(
        target: "sessionwatch::watch",
        "Watching hook signals in {}",
        signals_dir.display()
    );
    Ok(watcher)
}

/// Which watches a call to [`DirWatches::ensure`] installed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Installed {
    pub transcripts: bool,
    pub signals: bool,
}

/// Watches on the transcript tree and the signal directory.
///
/// A directory that does not exist yet is left unwatched until a later
/// [`DirWatches::ensure`] finds it. Dropping this stops every watch.
pub struct DirWatches {
    projects_dir: PathBuf,
    signals_dir: PathBuf,
    tx: mpsc::UnboundedSender<WatchEvent>,
    transcripts: Option<RecommendedWatcher>,
    signals: Option<RecommendedWatcher>,
}

impl DirWatches {
    pub fn new(
        projects_dir: PathBuf,
        signals_dir: PathBuf,
        tx: mpsc::UnboundedSender<WatchEvent>,
    ) -> Self {
        Self {
            projects_dir,
            signals_dir,
            tx,
            transcripts: None,
            signals: None,
        }
    }

    /// Install the watches that are missing and whose directory now exists.
    pub fn ensure(&mut self) -> Result<Installed> {
        let mut installed = Installed::default();
        if self.transcripts.is_none() && self.projects_dir.is_dir() {
            self.transcripts = Some(watch_transcripts(&self.projects_dir, self.tx.clone())?);
            installed.transcripts = true;
        }
        if self.signals.is_none() && self.signals_dir.is_dir() {
            self.signals = Some(watch_signals(&self.signals_dir, self.tx.clone())?);
            installed.signals = true;
        }
        Ok(installed)
    }

    pub fn watching_transcripts(&self) -> bool {
        self.transcripts.is_some()
    }

    pub fn watching_signals(&self) -> bool {
        self.signals.is_some()
    }
}

/// List existing transcripts, newest first.
///
/// With `max_age`, files not modified within that window are skipped.
pub async fn initial_scan(projects_dir: &Path, max_age: Option<Duration>) -> Vec<PathBuf> {
    let cutoff = max_age.and_then(|age| SystemTime::now().checked_sub(age));

    let mut projects = match tokio::fs::read_dir(projects_dir).await {
        Ok(rd) => rd,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
        Err(e) => {
            warn!(
                target: "sessionwatch::watch",
                "Failed to read projects dir {}: {}",
                projects_dir.display(),
                e
            );
            return Vec::new();
        }
    };

    let mut found: Vec<(PathBuf, SystemTime)> = Vec::new();
    while let Ok(Some(project)) = projects.next_entry().await {
        let project_path = project.path();
        if !project.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
            continue;
        }

        let mut files = match tokio::fs::read_dir(&project_path).await {
            Ok(rd) => rd,
            Err(e) => {
                warn!(
                    target: "sessionwatch::watch",
                    "Failed to read project dir {}: {}",
                    project_path.display(),
                    e
                );
                continue;
            }
        };

        while let Ok(Some(file)) = files.next_entry().await {
            let path = file.path();
            if path.extension().and_then(|e| e.to_str()) != Some("jsonl") {
                continue;
            }
            let Ok(metadata) = file.metadata().await else {
                continue;
            };
            if !metadata.is_file() {
                continue;
            }
            let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            if cutoff.is_some_and(|cutoff| modified < cutoff) {
                continue;
            }
            found.push((path, modified));
        }
    }

    found.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    found.into_iter().map(|(path, _)| path).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transcript_path_depth() {
        let root = Path::new("/home/u/.claude/projects");
        assert!(is_transcript_path(root, &root.join("-work-app/abc.jsonl")));
        assert!(!is_transcript_path(root, &root.join("abc.jsonl")));
        assert!(!is_transcript_path(
            root,
            &root.join("-work-app/abc/subagents/agent-1.jsonl")
        ));
        assert!(!is_transcript_path(root, &root.join("-work-app/abc.json")));
        assert!(!is_transcript_path(root, Path::new("/elsewhere/p/abc.jsonl")));
    }

    #[test]
    fn test_signal_path_shape() {
        let root = Path::new("/tmp/signals");
        assert!(is_signal_path(root, &root.join("s1.permission.json")));
        assert!(!is_signal_path(root, &root.join("s1.json")));
        assert!(!is_signal_path(root, &root.join("nested/s1.stop.json")));
    }

    #[test]
    fn test_rename_away_counts_as_removal() {
        let path = Path::new("/nowhere/-work-app/s1.jsonl");
        assert!(matches!(
            classify_change(&EventKind::Modify(ModifyKind::Name(RenameMode::From)), path),
            Some(Change::Removed)
        ));
        assert!(matches!(
            classify_change(&EventKind::Modify(ModifyKind::Name(RenameMode::To)), path),
            Some(Change::Changed)
        ));
        assert!(
            classify_change(&EventKind::Access(notify::event::AccessKind::Any), path).is_none()
        );
    }

    #[test]
    fn test_sideless_rename_checks_existence() {
        let dir = tempfile::tempdir().unwrap();
        let kept = dir.path().join("kept.jsonl");
        std::fs::write(&kept, "{}\n").unwrap();
        let gone = dir.path().join("gone.jsonl");

        for mode in [RenameMode::Any, RenameMode::Both, RenameMode::Other] {
            let kind = EventKind::Modify(ModifyKind::Name(mode));
            assert!(matches!(classify_change(&kind, &kept), Some(Change::Changed)));
            assert!(matches!(classify_change(&kind, &gone), Some(Change::Removed)));
        }
    }

    #[tokio::test]
    async fn test_initial_scan_only_lists_depth_two_jsonl() {
        let dir = tempfile::tempdir().unwrap();
        let project = dir.path().join("-work-app");
        std::fs::create_dir_all(project.join("s1/subagents")).unwrap();
        std::fs::write(project.join("s1.jsonl"), "{}\n").unwrap();
        std::fs::write(project.join("s2.jsonl"), "{}\n").unwrap();
        std::fs::write(project.join("notes.txt"), "").unwrap();
        std::fs::write(project.join("s1/subagents/agent-1.jsonl"), "{}\n").unwrap();
        std::fs::write(dir.path().join("stray.jsonl"), "{}\n").unwrap();

        let mut found = initial_scan(dir.path(), None).await;
        found.sort();
        assert_eq!(found, vec![project.join("s1.jsonl"), project.join("s2.jsonl")]);

        assert!(initial_scan(&dir.path().join("missing"), None).await.is_empty());
    }

    #[tokio::test]
    async fn test_missing_dir_is_watched_once_it_appears() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("projects")).unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();

        let mut watches = DirWatches::new(
            dir.path().join("projects"),
            dir.path().join("signals"),
            tx,
        );
        assert_eq!(
            watches.ensure().unwrap(),
            Installed {
                transcripts: true,
                signals: false
            }
        );
        assert!(!watches.watching_signals());
        assert_eq!(watches.ensure().unwrap(), Installed::default());

        std::fs::create_dir(dir.path().join("signals")).unwrap();
        assert_eq!(
            watches.ensure().unwrap(),
            Installed {
                transcripts: false,
                signals: true
            }
        );
        assert!(watches.watching_transcripts());
        assert!(watches.watching_signals());
    }
}
