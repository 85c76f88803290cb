//! Lifecycle events published to registry subscribers.

use crate::{SessionState, SessionStatus};
use serde::Serialize;

/// A change to the set of tracked sessions.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LifecycleEvent {
    Created {
        session: SessionState,
    },
    Updated {
        session: SessionState,
        previous_status: SessionStatus,
    },
    Deleted {
        session: SessionState,
    },
}

impl LifecycleEvent {
    pub fn session(&self) -> &SessionState {
        match self {
            LifecycleEvent::Created { session }
            | LifecycleEvent::Updated { session, .. }
            | LifecycleEvent::Deleted { session } => session,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session().session_id
    }

    pub fn kind(&self) -> &'static str {
        match self {
            LifecycleEvent::Created { .. } => "created",
            LifecycleEvent::Updated { .. } => "updated",
            LifecycleEvent::Deleted { .. } => "deleted",
        }
    }
}
