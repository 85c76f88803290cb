//! Status events, machine states and the externally visible session status.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A status-relevant signal derived from one transcript entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEvent {
    pub kind: StatusEventKind,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusEventKind {
    UserPrompt,
    AssistantStreaming,
    AssistantToolUse { ids: Vec<String> },
    ToolResult { ids: Vec<String> },
    TurnEnd,
    StaleTimeout,
}

impl StatusEvent {
    pub fn new(kind: StatusEventKind, timestamp: DateTime<Utc>) -> Self {
        Self { kind, timestamp }
    }
}

/// Internal state of the status machine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MachineState {
    Working,
    WaitingForApproval,
    #[default]
    WaitingForInput,
}

impl MachineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            MachineState::Working => "working",
            MachineState::WaitingForApproval => "waiting_for_approval",
            MachineState::WaitingForInput => "waiting_for_input",
        }
    }

    /// Collapse to the two statuses the machine can produce on its own.
    pub fn project(&self) -> SessionStatus {
        match self {
            MachineState::Working => SessionStatus::Working,
            MachineState::WaitingForApproval | MachineState::WaitingForInput => {
                SessionStatus::Waiting
            }
        }
    }
}

/// Externally visible session status.
///
/// `Idle` is never produced by the registry; consumers derive it with
/// [`SessionStatus::visible`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Working,
    Waiting,
    Idle,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Working => "working",
            SessionStatus::Waiting => "waiting",
            SessionStatus::Idle => "idle",
        }
    }

    /// Status as a consumer should display it at `now`: anything whose last
    /// activity is older than `idle_after` reads as idle.
    pub fn visible(
        self,
        last_activity_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
        idle_after: Duration,
    ) -> SessionStatus {
        match last_activity_at {
            Some(at) if now - at > idle_after => SessionStatus::Idle,
            _ => self,
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Context accumulated alongside the machine state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusContext {
    pub last_activity_at: Option<DateTime<Utc>>,
    pub message_count: u64,
    pub has_pending_tool_use: bool,
    pub pending_tool_ids: BTreeSet<String>,
}

/// Which source decided the current status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusSource {
    Ended,
    Permission,
    Stop,
    Working,
    #[default]
    Log,
}
