//! Transcript log entry types.
//!
//! Each line of a session transcript is a single JSON object. The `type`
//! field selects the variant; everything else is optional because agent
//! versions disagree on which fields they write.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};

/// One line of a session transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum LogEntry {
    #[serde(rename = "user")]
    User(MessageEntry),
    #[serde(rename = "assistant")]
    Assistant(MessageEntry),
    #[serde(rename = "system")]
    System(SystemEntry),
    #[serde(rename = "queue-operation")]
    QueueOperation(QueueOperationEntry),
    #[serde(rename = "file-history-snapshot")]
    FileHistorySnapshot(FileHistorySnapshotEntry),
}

/// A user or assistant message line.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageEntry {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub cwd: Option<PathBuf>,
    #[serde(default)]
    pub git_branch: Option<String>,
    #[serde(default)]
    pub uuid: Option<String>,
    #[serde(default)]
    pub message: Option<Message>,
}

/// The message payload inside a user or assistant line.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: MessageContent,
}

/// Message content is either a bare string or a list of typed blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl Default for MessageContent {
    fn default() -> Self {
        MessageContent::Blocks(Vec::new())
    }
}

/// Content block in a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        #[serde(default)]
        text: String,
    },
    Thinking {
        #[serde(default)]
        thinking: String,
    },
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        #[serde(default)]
        content: Value,
        #[serde(default)]
        is_error: bool,
    },
    /// Images, redacted thinking and anything newer than this parser.
    #[serde(other)]
    Unknown,
}

/// A system line. `subtype` marks turn boundaries among other things.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemEntry {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub cwd: Option<PathBuf>,
    #[serde(default)]
    pub git_branch: Option<String>,
    #[serde(default)]
    pub subtype: Option<String>,
    #[serde(default)]
    pub duration_ms: Option<u64>,
}

/// Prompt queue bookkeeping (enqueue/dequeue while the agent is busy).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueOperationEntry {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub operation: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

/// Snapshot of tracked file backups. Carries no status information.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileHistorySnapshotEntry {
    #[serde(default)]
    pub message_id: Option<String>,
    #[serde(default)]
    pub snapshot: Option<Value>,
    #[serde(default)]
    pub is_snapshot_update: bool,
}

impl LogEntry {
    /// Parse one transcript line.
    pub fn parse_line(line: &str) -> serde_json::Result<Self> {
        serde_json::from_str(line)
    }

    pub fn session_id(&self) -> Option<&str> {
        match self {
            LogEntry::User(m) | LogEntry::Assistant(m) => m.session_id.as_deref(),
            LogEntry::System(s) => s.session_id.as_deref(),
            LogEntry::QueueOperation(q) => q.session_id.as_deref(),
            LogEntry::FileHistorySnapshot(_) => None,
        }
    }

    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            LogEntry::User(m) | LogEntry::Assistant(m) => m.timestamp,
            LogEntry::System(s) => s.timestamp,
            LogEntry::QueueOperation(q) => q.timestamp,
            LogEntry::FileHistorySnapshot(_) => None,
        }
    }

    pub fn cwd(&self) -> Option<&Path> {
        match self {
            LogEntry::User(m) | LogEntry::Assistant(m) => m.cwd.as_deref(),
            LogEntry::System(s) => s.cwd.as_deref(),
            _ => None,
        }
    }

    pub fn git_branch(&self) -> Option<&str> {
        let branch = match self {
            LogEntry::User(m) | LogEntry::Assistant(m) => m.git_branch.as_deref(),
            LogEntry::System(s) => s.git_branch.as_deref(),
            _ => None,
        };
        branch.filter(|b| !b.is_empty())
    }

    /// Discriminator as written in the transcript.
    pub fn kind(&self) -> &'static str {
        match self {
            LogEntry::User(_) => "user",
            LogEntry::Assistant(_) => "assistant",
            LogEntry::System(_) => "system",
            LogEntry::QueueOperation(_) => "queue-operation",
            LogEntry::FileHistorySnapshot(_) => "file-history-snapshot",
        }
    }
}

impl MessageEntry {
    /// Content blocks of the message, empty for plain-text or missing content.
    pub fn blocks(&self) -> &[ContentBlock] {
        match self.message.as_ref().map(|m| &m.content) {
            Some(MessageContent::Blocks(blocks)) => blocks,
            _ => &[],
        }
    }

    pub fn plain_text(&self) -> Option<&str> {
        match self.message.as_ref().map(|m| &m.content) {
            Some(MessageContent::Text(text)) => Some(text),
            _ => None,
        }
    }
}
