//! Types for out-of-band hook signal files.
//!
//! Agent hooks drop small JSON files named `<sessionId>.<kind>.json` into a
//! signal directory. They assert session status sooner than the transcript
//! does and override the transcript-derived status while present.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

/// Kind of hook signal, taken from the file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookSignalKind {
    Working,
    Permission,
    Stop,
    Ended,
}

/// What removing a signal file does to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalEffect {
    /// Recompute the transcript-derived status from scratch.
    Replay,
    /// Drop the flag and re-reconcile against the current derived status.
    ClearFlag,
}

impl HookSignalKind {
    pub const ALL: [HookSignalKind; 4] = [
        HookSignalKind::Working,
        HookSignalKind::Permission,
        HookSignalKind::Stop,
        HookSignalKind::Ended,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HookSignalKind::Working => "working",
            HookSignalKind::Permission => "permission",
            HookSignalKind::Stop => "stop",
            HookSignalKind::Ended => "ended",
        }
    }

    pub fn removal_effect(&self) -> RemovalEffect {
        match self {
            HookSignalKind::Permission | HookSignalKind::Stop => RemovalEffect::Replay,
            HookSignalKind::Working | HookSignalKind::Ended => RemovalEffect::ClearFlag,
        }
    }

    /// File name for this kind of signal for `session_id`.
    pub fn file_name(&self, session_id: &str) -> String {
        format!("{}.{}.json", session_id, self.as_str())
    }
}

impl std::str::FromStr for HookSignalKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "working" => Ok(HookSignalKind::Working),
            "permission" => Ok(HookSignalKind::Permission),
            "stop" => Ok(HookSignalKind::Stop),
            "ended" => Ok(HookSignalKind::Ended),
            _ => Err(format!("Unknown signal kind: '{}'", s)),
        }
    }
}

/// Split a signal file path into `(session_id, kind)`.
///
/// Returns `None` for anything not shaped like `<sessionId>.<kind>.json`.
pub fn parse_signal_file_name(path: &Path) -> Option<(String, HookSignalKind)> {
    let name = path.file_name()?.to_str()?;
    let stem = name.strip_suffix(".json")?;
    let (session_id, kind) = stem.rsplit_once('.')?;
    if session_id.is_empty() {
        return None;
    }
    Some((session_id.to_string(), kind.parse::<HookSignalKind>().ok()?))
}

/// A tool call waiting on the user's approval.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PermissionRequest {
    #[serde(default, alias = "toolName")]
    pub tool_name: Option<String>,
    #[serde(default, alias = "toolInput")]
    pub tool_input: Option<Value>,
    #[serde(default, alias = "toolUseId")]
    pub tool_use_id: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Payload of the markers that carry nothing but a timestamp.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalMarker {
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HookSignalPayload {
    Permission(PermissionRequest),
    Marker(SignalMarker),
}

impl HookSignalPayload {
    fn into_marker(self) -> SignalMarker {
        match self {
            HookSignalPayload::Marker(m) => m,
            HookSignalPayload::Permission(p) => SignalMarker { timestamp: p.timestamp },
        }
    }
}

/// One hook signal file, parsed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HookSignal {
    pub session_id: String,
    pub kind: HookSignalKind,
    pub payload: HookSignalPayload,
}

impl HookSignal {
    /// Parse the file body for a signal of `kind`. An empty body is a valid
    /// marker with no timestamp.
    pub fn from_bytes(
        session_id: impl Into<String>,
        kind: HookSignalKind,
        body: &[u8],
    ) -> serde_json::Result<Self> {
        let empty = body.iter().all(|b| b.is_ascii_whitespace());
        let payload = match kind {
            HookSignalKind::Permission if empty => {
                HookSignalPayload::Permission(PermissionRequest::default())
            }
            HookSignalKind::Permission => HookSignalPayload::Permission(serde_json::from_slice(body)?),
            _ if empty => HookSignalPayload::Marker(SignalMarker::default()),
            _ => HookSignalPayload::Marker(serde_json::from_slice(body)?),
        };
        Ok(Self {
            session_id: session_id.into(),
            kind,
            payload,
        })
    }

    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        match &self.payload {
            HookSignalPayload::Permission(p) => p.timestamp,
            HookSignalPayload::Marker(m) => m.timestamp,
        }
    }
}

/// The hook signals currently asserted for one session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HookSignals {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working: Option<SignalMarker>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permission: Option<PermissionRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop: Option<SignalMarker>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended: Option<SignalMarker>,
}

impl HookSignals {
    /// Record `signal`, replacing any earlier signal of the same kind.
    pub fn assert(&mut self, signal: HookSignal) {
        match signal.kind {
            HookSignalKind::Permission => {
                self.permission = Some(match signal.payload {
                    HookSignalPayload::Permission(p) => p,
                    HookSignalPayload::Marker(m) => PermissionRequest {
                        timestamp: m.timestamp,
                        ..PermissionRequest::default()
                    },
                })
            }
            HookSignalKind::Working => self.working = Some(signal.payload.into_marker()),
            HookSignalKind::Stop => self.stop = Some(signal.payload.into_marker()),
            HookSignalKind::Ended => self.ended = Some(signal.payload.into_marker()),
        }
    }

    /// Drop the signal of `kind`. Returns whether one was asserted.
    pub fn retract(&mut self, kind: HookSignalKind) -> bool {
        match kind {
            HookSignalKind::Working => self.working.take().is_some(),
            HookSignalKind::Permission => self.permission.take().is_some(),
            HookSignalKind::Stop => self.stop.take().is_some(),
            HookSignalKind::Ended => self.ended.take().is_some(),
        }
    }

    pub fn is_asserted(&self, kind: HookSignalKind) -> bool {
        match kind {
            HookSignalKind::Working => self.working.is_some(),
            HookSignalKind::Permission => self.permission.is_some(),
            HookSignalKind::Stop => self.stop.is_some(),
            HookSignalKind::Ended => self.ended.is_some(),
        }
    }

    pub fn is_empty(&self) -> bool {
        HookSignalKind::ALL.iter().all(|k| !self.is_asserted(*k))
    }
}
