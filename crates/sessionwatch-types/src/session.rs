//! Per-session tracked state.

use crate::{
    HookSignals, LogEntry, MachineState, PermissionRequest, SessionStatus, StatusContext,
    StatusEvent, StatusSource,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;

/// Parsed transcript entries and the status events classified from them,
/// both in file order.
///
/// Kept apart from [`SessionState`], which is cloned into every lifecycle
/// event.
#[derive(Debug, Clone, Default)]
pub struct TranscriptHistory {
    pub entries: Vec<LogEntry>,
    pub status_events: Vec<StatusEvent>,
}

impl TranscriptHistory {
    pub fn new(entries: Vec<LogEntry>, status_events: Vec<StatusEvent>) -> Self {
        Self {
            entries,
            status_events,
        }
    }

    pub fn extend(&mut self, entries: Vec<LogEntry>, status_events: Vec<StatusEvent>) {
        self.entries.extend(entries);
        self.status_events.extend(status_events);
    }

    /// Most recent `gitBranch` recorded in the transcript.
    pub fn latest_git_branch(&self) -> Option<&str> {
        self.entries.iter().rev().find_map(|e| e.git_branch())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Everything known about one session, rebuilt from its transcript.
#[derive(Debug, Clone, Serialize)]
pub struct SessionState {
    pub session_id: String,
    /// Transcript backing this session.
    pub file_path: PathBuf,
    /// Byte offset just past the last complete line consumed.
    pub offset: u64,
    pub cwd: PathBuf,
    pub git_branch: Option<String>,
    pub repo_url: Option<String>,
    pub repo_id: Option<String>,
    pub machine_state: MachineState,
    pub context: StatusContext,
    /// Effective status after hook signals are applied.
    pub status: SessionStatus,
    pub status_source: StatusSource,
    pub has_pending_tool_use: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_permission: Option<PermissionRequest>,
    pub hook_signals: HookSignals,
}

impl SessionState {
    pub fn new(session_id: impl Into<String>, file_path: PathBuf, cwd: PathBuf) -> Self {
        Self {
            session_id: session_id.into(),
            file_path,
            offset: 0,
            cwd,
            git_branch: None,
            repo_url: None,
            repo_id: None,
            machine_state: MachineState::default(),
            context: StatusContext::default(),
            status: SessionStatus::Waiting,
            status_source: StatusSource::Log,
            has_pending_tool_use: false,
            pending_permission: None,
            hook_signals: HookSignals::default(),
        }
    }

    pub fn message_count(&self) -> u64 {
        self.context.message_count
    }

    pub fn last_activity(&self) -> Option<DateTime<Utc>> {
        self.context.last_activity_at
    }
}
