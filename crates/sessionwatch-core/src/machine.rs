//! Session status state machine.
//!
//! Folds an ordered sequence of [`StatusEvent`]s into a [`MachineState`] and
//! [`StatusContext`]. The machine is a plain transition table: identical
//! event sequences always produce identical results, however the sequence
//! was chunked across reads.
//!
//! ```text
//! waiting_for_input --USER_PROMPT--> working --ASSISTANT_TOOL_USE--> waiting_for_approval
//!        ^                             |  ^                                  |
//!        +-------TURN_END / STALE------+  +-----TOOL_RESULT / USER_PROMPT----+
//! ```

use chrono::{DateTime, Duration, Utc};
use sessionwatch_types::{MachineState, SessionStatus, StatusContext, StatusEvent, StatusEventKind};
use tracing::trace;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusMachine {
    state: MachineState,
    context: StatusContext,
}

impl StatusMachine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a fresh machine from a full event sequence.
    pub fn replay<'a>(events: impl IntoIterator<Item = &'a StatusEvent>) -> Self {
        let mut machine = Self::new();
        machine.apply_all(events);
        machine
    }

    pub fn state(&self) -> MachineState {
        self.state
    }

    pub fn context(&self) -> &StatusContext {
        &self.context
    }

    /// Externally visible status.
    pub fn status(&self) -> SessionStatus {
        self.state.project()
    }

    pub fn apply_all<'a>(&mut self, events: impl IntoIterator<Item = &'a StatusEvent>) {
        for event in events {
            self.apply(event);
        }
    }

    /// Apply one event. Events with no entry in the table for the current
    /// state are ignored.
    pub fn apply(&mut self, event: &StatusEvent) {
        use MachineState::*;
        use StatusEventKind::*;

        let at = event.timestamp;
        let before = self.state;
        match (self.state, &event.kind) {
            (Working, UserPrompt) => {
                self.clear_pending();
                self.bump(at);
            }
            (Working, AssistantStreaming) => self.touch(at),
            (Working, AssistantToolUse { ids }) => {
                self.context.pending_tool_ids = ids.iter().cloned().collect();
                self.context.has_pending_tool_use = true;
                self.bump(at);
                self.state = WaitingForApproval;
            }
            (Working, ToolResult { ids }) | (WaitingForApproval, ToolResult { ids }) => {
                self.resolve(ids);
                self.bump(at);
                self.state = Working;
            }
            (Working, TurnEnd) | (WaitingForApproval, TurnEnd) => {
                self.clear_pending();
                self.touch(at);
                self.state = WaitingForInput;
            }
            (Working, StaleTimeout) => {
                self.context.has_pending_tool_use = false;
                self.state = WaitingForInput;
            }
            (WaitingForApproval, StaleTimeout) => {
                self.clear_pending();
                self.state = WaitingForInput;
            }
            (WaitingForApproval, UserPrompt) => {
                self.clear_pending();
                self.bump(at);
                self.state = Working;
            }
            (WaitingForInput, UserPrompt) => {
                self.bump(at);
                self.state = Working;
            }
            (WaitingForInput, AssistantStreaming) | (WaitingForInput, TurnEnd) => self.touch(at),
            _ => {
                trace!(
                    target: "sessionwatch::machine",
                    "Ignoring {:?} in state {}",
                    event.kind,
                    self.state.as_str()
                );
            }
        }

        if before != self.state {
            trace!(
                target: "sessionwatch::machine",
                "{} -> {}",
                before.as_str(),
                self.state.as_str()
            );
        }
    }

    /// Whether a session in this state has gone quiet for longer than
    /// `threshold` and should be forced out of its current state.
    pub fn is_stale(&self, now: DateTime<Utc>, threshold: Duration) -> bool {
        let Some(last) = self.context.last_activity_at else {
            return false;
        };
        if now - last <= threshold {
            return false;
        }
        match self.state {
            MachineState::Working => !self.context.has_pending_tool_use,
            MachineState::WaitingForApproval => true,
            MachineState::WaitingForInput => false,
        }
    }

    /// Apply one synthetic STALE_TIMEOUT if the session is stale at `now`.
    /// Returns whether it was applied.
    pub fn apply_stale_correction(&mut self, now: DateTime<Utc>, threshold: Duration) -> bool {
        if !self.is_stale(now, threshold) {
            return false;
        }
        self.apply(&StatusEvent::new(StatusEventKind::StaleTimeout, now));
        true
    }

    fn resolve(&mut self, ids: &[String]) {
        for id in ids {
            self.context.pending_tool_ids.remove(id);
        }
        self.context.has_pending_tool_use = !self.context.pending_tool_ids.is_empty();
    }

    fn clear_pending(&mut self) {
        self.context.pending_tool_ids.clear();
        self.context.has_pending_tool_use = false;
    }

    fn bump(&mut self, at: DateTime<Utc>) {
        self.context.message_count += 1;
        self.touch(at);
    }

    fn touch(&mut self, at: DateTime<Utc>) {
        self.context.last_activity_at = Some(at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 0).unwrap() + Duration::seconds(secs)
    }

    fn ev(kind: StatusEventKind, secs: i64) -> StatusEvent {
        StatusEvent::new(kind, t(secs))
    }

    fn tool_use(ids: &[&str], secs: i64) -> StatusEvent {
        ev(
            StatusEventKind::AssistantToolUse {
                ids: ids.iter().map(|s| s.to_string()).collect(),
            },
            secs,
        )
    }

    fn tool_result(ids: &[&str], secs: i64) -> StatusEvent {
        ev(
            StatusEventKind::ToolResult {
                ids: ids.iter().map(|s| s.to_string()).collect(),
            },
            secs,
        )
    }

    #[test]
    fn test_initial_state() {
        let machine = StatusMachine::new();
        assert_eq!(machine.state(), MachineState::WaitingForInput);
        assert_eq!(machine.status(), SessionStatus::Waiting);
        assert_eq!(machine.context(), &StatusContext::default());
    }

    #[test]
    fn test_scenario_prompt_tool_result_turn_end() {
        let mut machine = StatusMachine::new();

        machine.apply(&ev(StatusEventKind::UserPrompt, 0));
        assert_eq!(machine.state(), MachineState::Working);
        assert_eq!(machine.context().message_count, 1);

        machine.apply(&tool_use(&["x"], 1));
        assert_eq!(machine.state(), MachineState::WaitingForApproval);
        assert!(machine.context().has_pending_tool_use);
        assert_eq!(
            machine.context().pending_tool_ids.iter().collect::<Vec<_>>(),
            vec!["x"]
        );

        machine.apply(&tool_result(&["x"], 2));
        assert_eq!(machine.state(), MachineState::Working);
        assert!(machine.context().pending_tool_ids.is_empty());
        assert!(!machine.context().has_pending_tool_use);

        machine.apply(&ev(StatusEventKind::TurnEnd, 3));
        assert_eq!(machine.state(), MachineState::WaitingForInput);
        assert_eq!(machine.status(), SessionStatus::Waiting);
        assert_eq!(machine.context().message_count, 3);
        assert_eq!(machine.context().last_activity_at, Some(t(3)));
    }

    #[test]
    fn test_partial_tool_result_keeps_remaining_pending() {
        let machine = StatusMachine::replay(&[
            ev(StatusEventKind::UserPrompt, 0),
            tool_use(&["a", "b"], 1),
            tool_result(&["a"], 2),
        ]);
        assert_eq!(machine.state(), MachineState::Working);
        assert!(machine.context().has_pending_tool_use);
        assert!(machine.context().pending_tool_ids.contains("b"));
    }

    #[test]
    fn test_user_prompt_while_waiting_for_approval_clears_pending() {
        let machine = StatusMachine::replay(&[
            ev(StatusEventKind::UserPrompt, 0),
            tool_use(&["a"], 1),
            ev(StatusEventKind::UserPrompt, 2),
        ]);
        assert_eq!(machine.state(), MachineState::Working);
        assert!(!machine.context().has_pending_tool_use);
        assert!(machine.context().pending_tool_ids.is_empty());
        assert_eq!(machine.context().message_count, 3);
    }

    #[test]
    fn test_streaming_while_waiting_for_input_refreshes_activity_only() {
        let machine = StatusMachine::replay(&[ev(StatusEventKind::AssistantStreaming, 5)]);
        assert_eq!(machine.state(), MachineState::WaitingForInput);
        assert_eq!(machine.context().last_activity_at, Some(t(5)));
        assert_eq!(machine.context().message_count, 0);
    }

    #[test]
    fn test_unlisted_transitions_are_ignored() {
        let mut machine = StatusMachine::replay(&[
            ev(StatusEventKind::UserPrompt, 0),
            tool_use(&["a"], 1),
        ]);
        let before = machine.clone();

        machine.apply(&tool_use(&["b"], 2));
        machine.apply(&ev(StatusEventKind::AssistantStreaming, 3));
        assert_eq!(machine, before);

        let mut idle = StatusMachine::new();
        idle.apply(&tool_result(&["a"], 1));
        idle.apply(&tool_use(&["a"], 2));
        idle.apply(&ev(StatusEventKind::StaleTimeout, 3));
        assert_eq!(idle, StatusMachine::new());
    }

    #[test]
    fn test_stale_correction_after_tool_use() {
        let threshold = Duration::seconds(15);
        let events = [ev(StatusEventKind::UserPrompt, 0), tool_use(&["x"], 1)];

        let mut early = StatusMachine::replay(&events);
        assert!(!early.apply_stale_correction(t(11), threshold));
        assert_eq!(early.state(), MachineState::WaitingForApproval);

        let mut late = StatusMachine::replay(&events);
        assert!(late.apply_stale_correction(t(17), threshold));
        assert_eq!(late.state(), MachineState::WaitingForInput);
        assert_eq!(late.status(), SessionStatus::Waiting);
        assert!(!late.context().has_pending_tool_use);
        assert_eq!(late.context().last_activity_at, Some(t(1)));

        // Already corrected: nothing more to do.
        assert!(!late.apply_stale_correction(t(60), threshold));
    }

    #[test]
    fn test_stale_correction_working_without_pending() {
        let threshold = Duration::seconds(15);
        let mut machine = StatusMachine::replay(&[ev(StatusEventKind::UserPrompt, 0)]);
        assert!(machine.apply_stale_correction(t(16), threshold));
        assert_eq!(machine.state(), MachineState::WaitingForInput);
    }

    #[test]
    fn test_stale_correction_skips_working_with_pending_tool() {
        let threshold = Duration::seconds(15);
        let mut machine = StatusMachine::replay(&[
            ev(StatusEventKind::UserPrompt, 0),
            tool_use(&["a", "b"], 1),
            tool_result(&["a"], 2),
        ]);
        assert!(!machine.apply_stale_correction(t(600), threshold));
        assert_eq!(machine.state(), MachineState::Working);
    }
}
