//! Maps transcript entries to status events.

use sessionwatch_types::{ContentBlock, LogEntry, MessageEntry, StatusEvent, StatusEventKind};
use tracing::trace;

/// Tools that run without asking the user first. A tool call naming one of
/// these never puts the session into `waiting_for_approval`.
pub const AUTO_APPROVED_TOOLS: &[&str] = &["Task", "Read", "Glob", "Grep", "TodoWrite", "TaskOutput"];

/// System subtypes written when a turn finishes.
const TURN_END_SUBTYPES: &[&str] = &["turn_duration", "stop_hook_summary"];

/// Classify one entry. Entries without a timestamp never produce an event.
pub fn classify(entry: &LogEntry) -> Option<StatusEvent> {
    let timestamp = entry.timestamp()?;
    let kind = match entry {
        LogEntry::User(message) => classify_user(message)?,
        LogEntry::Assistant(message) => classify_assistant(message),
        LogEntry::System(system) => {
            let subtype = system.subtype.as_deref()?;
            if !TURN_END_SUBTYPES.contains(&subtype) {
                return None;
            }
            StatusEventKind::TurnEnd
        }
        LogEntry::QueueOperation(_) | LogEntry::FileHistorySnapshot(_) => return None,
    };
    Some(StatusEvent::new(kind, timestamp))
}

/// Classify a batch of entries, dropping those that carry no status signal.
pub fn classify_all<'a>(entries: impl IntoIterator<Item = &'a LogEntry>) -> Vec<StatusEvent> {
    entries
        .into_iter()
        .filter_map(|entry| {
            let event = classify(entry);
            if event.is_none() {
                trace!(
                    target: "sessionwatch::classifier",
                    "No status event for {} entry",
                    entry.kind()
                );
            }
            event
        })
        .collect()
}

fn classify_user(message: &MessageEntry) -> Option<StatusEventKind> {
    if message.plain_text().is_some() {
        return Some(StatusEventKind::UserPrompt);
    }

    let blocks = message.blocks();
    let result_ids: Vec<String> = blocks
        .iter()
        .filter_map(|block| match block {
            ContentBlock::ToolResult { tool_use_id, .. } => Some(tool_use_id.clone()),
            _ => None,
        })
        .collect();
    if !result_ids.is_empty() {
        return Some(StatusEventKind::ToolResult { ids: result_ids });
    }

    blocks
        .iter()
        .any(|block| matches!(block, ContentBlock::Text { .. }))
        .then_some(StatusEventKind::UserPrompt)
}

fn classify_assistant(message: &MessageEntry) -> StatusEventKind {
    let ids: Vec<String> = message
        .blocks()
        .iter()
        .filter_map(|block| match block {
            ContentBlock::ToolUse { id, name, .. } if !is_auto_approved(name) => Some(id.clone()),
            _ => None,
        })
        .collect();

    if ids.is_empty() {
        StatusEventKind::AssistantStreaming
    } else {
        StatusEventKind::AssistantToolUse { ids }
    }
}

pub fn is_auto_approved(tool_name: &str) -> bool {
    AUTO_APPROVED_TOOLS.contains(&tool_name)
}
