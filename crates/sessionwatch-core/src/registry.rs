//! Tracked sessions and the lifecycle events derived from them.
//!
//! The registry is owned by a single worker task. Every handler takes `&mut
//! self`, runs to completion, and returns the lifecycle event it published
//! (if any) so callers and tests can observe it without subscribing.

use crate::classifier::classify_all;
use crate::git::{GitInfoCache, PrPollTrigger};
use crate::machine::StatusMachine;
use crate::reconciler::reconcile;
use crate::signals::read_signal_file;
use crate::tailer::read_new_lines;
use crate::WatchError;
use chrono::{DateTime, Utc};
use sessionwatch_types::{
    HookSignals, LifecycleEvent, LogEntry, RemovalEffect, SessionState, SessionStatus,
    TranscriptHistory, parse_signal_file_name,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, trace, warn};

#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Quiet period after which a busy session is forced back to waiting.
    pub stale_threshold: chrono::Duration,
    /// Capacity of the lifecycle broadcast channel.
    pub event_capacity: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            stale_threshold: chrono::Duration::seconds(15),
            event_capacity: 256,
        }
    }
}

struct Tracked {
    state: SessionState,
    history: TranscriptHistory,
    /// Log-derived machine, without stale correction.
    machine: StatusMachine,
}

/// The fields whose change makes an `updated` event worth sending.
#[derive(Debug, Clone, PartialEq)]
struct Snapshot {
    status: SessionStatus,
    has_pending_tool_use: bool,
    message_count: u64,
    git_branch: Option<String>,
}

impl Snapshot {
    fn of(state: &SessionState) -> Self {
        Self {
            status: state.status,
            has_pending_tool_use: state.has_pending_tool_use,
            message_count: state.message_count(),
            git_branch: state.git_branch.clone(),
        }
    }

    fn warrants_update(&self, after: &Snapshot) -> bool {
        (self.status, self.has_pending_tool_use) != (after.status, after.has_pending_tool_use)
            || after.message_count > self.message_count
            || self.git_branch != after.git_branch
    }
}

pub struct SessionRegistry {
    config: RegistryConfig,
    sessions: HashMap<String, Tracked>,
    path_index: HashMap<PathBuf, String>,
    /// Signals for sessions whose transcript has not produced a session yet.
    held_signals: HashMap<String, HookSignals>,
    git: GitInfoCache,
    pr: Arc<dyn PrPollTrigger>,
    event_tx: broadcast::Sender<LifecycleEvent>,
}

impl SessionRegistry {
    pub fn new(config: RegistryConfig, git: GitInfoCache, pr: Arc<dyn PrPollTrigger>) -> Self {
        let (event_tx, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            config,
            sessions: HashMap::new(),
            path_index: HashMap::new(),
            held_signals: HashMap::new(),
            git,
            pr,
            event_tx,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.event_tx.subscribe()
    }

    pub fn event_sender(&self) -> broadcast::Sender<LifecycleEvent> {
        self.event_tx.clone()
    }

    pub fn session(&self, session_id: &str) -> Option<&SessionState> {
        self.sessions.get(session_id).map(|t| &t.state)
    }

    pub fn session_for_path(&self, path: &Path) -> Option<&SessionState> {
        self.path_index
            .get(path)
            .and_then(|id| self.session(id))
    }

    /// Entries and status events read so far for a tracked session.
    pub fn history(&self, session_id: &str) -> Option<&TranscriptHistory> {
        self.sessions.get(session_id).map(|t| &t.history)
    }

    pub fn sessions(&self) -> impl Iterator<Item = &SessionState> {
        self.sessions.values().map(|t| &t.state)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Ids of sessions currently reported as `working`.
    pub fn working_session_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .sessions
            .values()
            .filter(|t| t.state.status == SessionStatus::Working)
            .map(|t| t.state.session_id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Whether signals are held for a session that is not tracked yet.
    pub fn has_held_signals(&self, session_id: &str) -> bool {
        self.held_signals.contains_key(session_id)
    }

    /// A transcript was created or appended to.
    pub async fn handle_transcript_change(
        &mut self,
        path: &Path,
        now: DateTime<Utc>,
    ) -> Option<LifecycleEvent> {
        match self.path_index.get(path).cloned() {
            Some(session_id) => self.update_from_transcript(&session_id, now).await,
            None => self.try_create(path, now).await,
        }
    }

    /// A transcript was removed. The session goes with it.
    pub fn handle_transcript_removed(&mut self, path: &Path) -> Option<LifecycleEvent> {
        let session_id = self.path_index.remove(path)?;
        let tracked = self.sessions.remove(&session_id)?;
        self.held_signals.remove(&session_id);

        if let Some(branch) = &tracked.state.git_branch {
            self.pr.invalidate(&tracked.state.cwd, branch);
        }

        info!(
            target: "sessionwatch::registry",
            "Session {} removed with {}",
            session_id,
            path.display()
        );
        Some(self.publish(LifecycleEvent::Deleted {
            session: tracked.state,
        }))
    }

    /// A signal file was written.
    pub async fn handle_signal_change(
        &mut self,
        path: &Path,
        now: DateTime<Utc>,
    ) -> Option<LifecycleEvent> {
        let signal = match read_signal_file(path).await {
            Ok(Some(signal)) => signal,
            Ok(None) => return None,
            Err(e) => {
                debug!(
                    target: "sessionwatch::signals",
                    "Skipping signal {}: {}",
                    path.display(),
                    e
                );
                return None;
            }
        };

        let session_id = signal.session_id.clone();
        let kind = signal.kind;
        let Some(tracked) = self.sessions.get_mut(&session_id) else {
            debug!(
                target: "sessionwatch::signals",
                "Holding {} signal for untracked session {}",
                kind.as_str(),
                session_id
            );
            self.held_signals.entry(session_id).or_default().assert(signal);
            return None;
        };

        trace!(
            target: "sessionwatch::signals",
            "{} asserted for {}",
            kind.as_str(),
            session_id
        );
        let before = Snapshot::of(&tracked.state);
        tracked.state.hook_signals.assert(signal);
        self.finish(&session_id, before, now).await
    }

    /// A signal file was deleted.
    pub async fn handle_signal_removed(
        &mut self,
        path: &Path,
        now: DateTime<Utc>,
    ) -> Option<LifecycleEvent> {
        let (session_id, kind) = parse_signal_file_name(path)?;

        let Some(tracked) = self.sessions.get_mut(&session_id) else {
            if let Some(held) = self.held_signals.get_mut(&session_id) {
                held.retract(kind);
                if held.is_empty() {
                    self.held_signals.remove(&session_id);
                }
            }
            return None;
        };

        let before = Snapshot::of(&tracked.state);
        if !tracked.state.hook_signals.retract(kind) {
            return None;
        }
        trace!(
            target: "sessionwatch::signals",
            "{} retracted for {}",
            kind.as_str(),
            session_id
        );

        // The stored machine is log-derived only, so this replay reproduces it;
        // permission and stop removals still go through the full recompute path.
        if kind.removal_effect() == RemovalEffect::Replay {
            tracked.machine = StatusMachine::replay(&tracked.history.status_events);
        }
        self.finish(&session_id, before, now).await
    }

    /// Rebuild a session's status from its full event history.
    pub async fn recompute_full(
        &mut self,
        session_id: &str,
        now: DateTime<Utc>,
    ) -> Option<LifecycleEvent> {
        let tracked = self.sessions.get_mut(session_id)?;
        let before = Snapshot::of(&tracked.state);
        tracked.machine = StatusMachine::replay(&tracked.history.status_events);
        self.finish(session_id, before, now).await
    }

    async fn try_create(&mut self, path: &Path, now: DateTime<Utc>) -> Option<LifecycleEvent> {
        let read = match read_new_lines(path, 0).await {
            Ok(read) => read,
            Err(e) => {
                log_read_error(path, &e);
                return None;
            }
        };

        let entries = parse_entries(path, &read.lines);
        let session_id = entries.iter().find_map(|e| e.session_id()).map(str::to_string);
        let cwd = entries.iter().find_map(|e| e.cwd()).map(Path::to_path_buf);
        let (Some(session_id), Some(cwd)) = (session_id, cwd) else {
            trace!(
                target: "sessionwatch::registry",
                "{} has no session id and cwd yet",
                path.display()
            );
            return None;
        };

        if let Some(existing) = self.sessions.get(&session_id) {
            debug!(
                target: "sessionwatch::registry",
                "Session {} already tracked from {}; ignoring {}",
                session_id,
                existing.state.file_path.display(),
                path.display()
            );
            return None;
        }

        let mut state = SessionState::new(session_id.clone(), path.to_path_buf(), cwd);
        state.offset = read.offset;
        if let Some(held) = self.held_signals.remove(&session_id) {
            state.hook_signals = held;
        }
        let events = classify_all(&entries);
        let history = TranscriptHistory::new(entries, events);
        let machine = StatusMachine::replay(&history.status_events);

        self.path_index.insert(path.to_path_buf(), session_id.clone());
        self.sessions.insert(
            session_id.clone(),
            Tracked {
                state,
                history,
                machine,
            },
        );

        self.refresh(&session_id, now).await;
        let tracked = self.sessions.get(&session_id)?;
        info!(
            target: "sessionwatch::registry",
            "Tracking session {} ({}) in {}",
            session_id,
            tracked.state.status,
            tracked.state.cwd.display()
        );
        let session = tracked.state.clone();
        Some(self.publish(LifecycleEvent::Created { session }))
    }

    async fn update_from_transcript(
        &mut self,
        session_id: &str,
        now: DateTime<Utc>,
    ) -> Option<LifecycleEvent> {
        let tracked = self.sessions.get_mut(session_id)?;
        let path = tracked.state.file_path.clone();
        let read = match read_new_lines(&path, tracked.state.offset).await {
            Ok(read) => read,
            Err(e) => {
                log_read_error(&path, &e);
                return None;
            }
        };

        let before = Snapshot::of(&tracked.state);
        let state = &mut tracked.state;
        let new_entries = parse_entries(&path, &read.lines);
        let new_events = classify_all(&new_entries);

        if let Some(cwd) = new_entries.iter().rev().find_map(|e| e.cwd()) {
            if cwd != state.cwd {
                // PR polling is keyed by (cwd, branch); retire the old key and
                // let refresh trigger the branch again under the new cwd.
                if let Some(branch) = state.git_branch.take() {
                    self.pr.invalidate(&state.cwd, &branch);
                }
                debug!(
                    target: "sessionwatch::registry",
                    "Session {} moved from {} to {}",
                    session_id,
                    state.cwd.display(),
                    cwd.display()
                );
                state.cwd = cwd.to_path_buf();
            }
        }

        if read.reset {
            tracked.history = TranscriptHistory::new(new_entries, new_events);
            tracked.machine = StatusMachine::replay(&tracked.history.status_events);
        } else {
            tracked.machine.apply_all(&new_events);
            tracked.history.extend(new_entries, new_events);
        }
        state.offset = read.offset;

        self.finish(session_id, before, now).await
    }

    /// Refresh derived fields and publish `updated` if anything visible moved.
    async fn finish(
        &mut self,
        session_id: &str,
        before: Snapshot,
        now: DateTime<Utc>,
    ) -> Option<LifecycleEvent> {
        self.refresh(session_id, now).await;
        let state = &self.sessions.get(session_id)?.state;
        let after = Snapshot::of(state);
        if !before.warrants_update(&after) {
            return None;
        }

        debug!(
            target: "sessionwatch::registry",
            "Session {}: {} -> {} ({:?})",
            session_id,
            before.status,
            after.status,
            state.status_source
        );
        let event = LifecycleEvent::Updated {
            session: state.clone(),
            previous_status: before.status,
        };
        Some(self.publish(event))
    }

    /// Re-resolve git info, apply stale correction and hook signals.
    async fn refresh(&mut self, session_id: &str, now: DateTime<Utc>) {
        let Some(tracked) = self.sessions.get_mut(session_id) else {
            return;
        };
        let state = &mut tracked.state;

        let info = self.git.get(&state.cwd).await;
        let transcript_branch = tracked.history.latest_git_branch().map(str::to_string);
        let branch = info
            .as_ref()
            .and_then(|i| i.branch.clone())
            .or(transcript_branch);
        if let Some(info) = info {
            state.repo_url = info.repo_url;
            state.repo_id = info.repo_id;
        }
        if branch != state.git_branch {
            if let Some(old) = &state.git_branch {
                self.pr.invalidate(&state.cwd, old);
            }
            if let Some(new) = &branch {
                self.pr.trigger(&state.cwd, new, &state.session_id);
            }
            debug!(
                target: "sessionwatch::git",
                "Session {} branch {:?} -> {:?}",
                state.session_id,
                state.git_branch,
                branch
            );
            state.git_branch = branch;
        }

        let mut view = tracked.machine.clone();
        if view.apply_stale_correction(now, self.config.stale_threshold) {
            debug!(
                target: "sessionwatch::registry",
                "Session {} went quiet in {}",
                state.session_id,
                tracked.machine.state().as_str()
            );
        }
        let reconciled = reconcile(&view, &state.hook_signals);

        state.machine_state = view.state();
        state.context = view.context().clone();
        state.status = reconciled.status;
        state.status_source = reconciled.source;
        state.has_pending_tool_use = reconciled.has_pending_tool_use;
        state.pending_permission = reconciled.pending_permission;
    }

    fn publish(&self, event: LifecycleEvent) -> LifecycleEvent {
        // No subscribers is fine.
        let _ = self.event_tx.send(event.clone());
        event
    }
}

fn parse_entries(path: &Path, lines: &[String]) -> Vec<LogEntry> {
    lines
        .iter()
        .filter_map(|line| match LogEntry::parse_line(line) {
            Ok(entry) => Some(entry),
            Err(e) => {
                trace!(
                    target: "sessionwatch::tailer",
                    "Skipping unparseable line in {}: {}",
                    path.display(),
                    e
                );
                None
            }
        })
        .collect()
}

fn log_read_error(path: &Path, err: &WatchError) {
    if err.is_not_found() {
        debug!(
            target: "sessionwatch::tailer",
            "{} vanished before read",
            path.display()
        );
    } else {
        warn!(
            target: "sessionwatch::tailer",
            "Failed to read {}: {}",
            path.display(),
            err
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::{GitInfo, GitInfoProvider, NoopPrPoller};
    use async_trait::async_trait;
    use std::time::Duration;

    struct NoGit;

    #[async_trait]
    impl GitInfoProvider for NoGit {
        async fn lookup(&self, _cwd: &Path) -> Option<GitInfo> {
            None
        }
    }

    fn registry() -> SessionRegistry {
        SessionRegistry::new(
            RegistryConfig::default(),
            GitInfoCache::new(Arc::new(NoGit), Duration::from_secs(5)),
            Arc::new(NoopPrPoller),
        )
    }

    fn now() -> DateTime<Utc> {
        "2025-06-01T10:00:05Z".parse().unwrap()
    }

    #[test]
    fn test_snapshot_update_rules() {
        let base = Snapshot {
            status: SessionStatus::Working,
            has_pending_tool_use: false,
            message_count: 3,
            git_branch: Some("main".into()),
        };
        assert!(!base.warrants_update(&base.clone()));
        assert!(base.warrants_update(&Snapshot {
            has_pending_tool_use: true,
            ..base.clone()
        }));
        assert!(base.warrants_update(&Snapshot {
            message_count: 4,
            ..base.clone()
        }));
        assert!(!base.warrants_update(&Snapshot {
            message_count: 1,
            ..base.clone()
        }));
        assert!(base.warrants_update(&Snapshot {
            git_branch: None,
            ..base.clone()
        }));
    }

    #[tokio::test]
    async fn test_creation_waits_for_session_id_and_cwd() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s1.jsonl");
        std::fs::write(
            &path,
            "{\"type\":\"file-history-snapshot\",\"messageId\":\"m\"}\n",
        )
        .unwrap();

        let mut registry = registry();
        assert!(registry.handle_transcript_change(&path, now()).await.is_none());
        assert!(registry.is_empty());

        std::fs::write(
            &path,
            concat!(
                "{\"type\":\"file-history-snapshot\",\"messageId\":\"m\"}\n",
                "{\"type\":\"user\",\"sessionId\":\"s1\",\"cwd\":\"/work\",\"timestamp\":\"2025-06-01T10:00:00Z\",\"message\":{\"content\":\"hi\"}}\n",
            ),
        )
        .unwrap();
        let event = registry.handle_transcript_change(&path, now()).await.unwrap();
        assert_eq!(event.kind(), "created");
        assert_eq!(event.session().status, SessionStatus::Working);
        assert_eq!(event.session().message_count(), 1);
        assert_eq!(registry.session_for_path(&path).unwrap().session_id, "s1");
    }

    #[tokio::test]
    async fn test_missing_file_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = registry();
        assert!(registry
            .handle_transcript_change(&dir.path().join("gone.jsonl"), now())
            .await
            .is_none());
        assert!(registry.handle_transcript_removed(&dir.path().join("gone.jsonl")).is_none());
    }
}
