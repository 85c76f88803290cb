//! Overlays hook signals on the transcript-derived status.
//!
//! Precedence, highest first: ended, permission, stop, working, then the
//! status machine. The signal producer is expected never to assert `working`
//! and `stop` together; if it does, `stop` wins by precedence alone.

use crate::machine::StatusMachine;
use sessionwatch_types::{HookSignals, PermissionRequest, SessionStatus, StatusSource};

/// Effective status of a session after reconciliation.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciled {
    pub status: SessionStatus,
    pub has_pending_tool_use: bool,
    pub source: StatusSource,
    pub pending_permission: Option<PermissionRequest>,
}

impl Reconciled {
    /// The part of the result that decides whether subscribers hear about it.
    pub fn effective(&self) -> (SessionStatus, bool) {
        (self.status, self.has_pending_tool_use)
    }
}

pub fn reconcile(machine: &StatusMachine, signals: &HookSignals) -> Reconciled {
    if signals.ended.is_some() {
        return Reconciled {
            status: SessionStatus::Waiting,
            has_pending_tool_use: false,
            source: StatusSource::Ended,
            pending_permission: None,
        };
    }

    if let Some(request) = &signals.permission {
        return Reconciled {
            status: SessionStatus::Waiting,
            has_pending_tool_use: true,
            source: StatusSource::Permission,
            pending_permission: Some(request.clone()),
        };
    }

    if signals.stop.is_some() {
        return Reconciled {
            status: SessionStatus::Waiting,
            has_pending_tool_use: false,
            source: StatusSource::Stop,
            pending_permission: None,
        };
    }

    let has_pending_tool_use = machine.context().has_pending_tool_use;
    if signals.working.is_some() {
        return Reconciled {
            status: SessionStatus::Working,
            has_pending_tool_use,
            source: StatusSource::Working,
            pending_permission: None,
        };
    }

    Reconciled {
        status: machine.status(),
        has_pending_tool_use,
        source: StatusSource::Log,
        pending_permission: None,
    }
}
