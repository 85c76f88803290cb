//! Writes lifecycle events as JSON lines.

use anyhow::Result;
use chrono::{DateTime, Utc};
use sessionwatch_types::LifecycleEvent;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};

/// One output line: the event plus the status a consumer should display.
pub fn render_line(
    event: &LifecycleEvent,
    now: DateTime<Utc>,
    idle_after: chrono::Duration,
) -> serde_json::Result<String> {
    let mut value = serde_json::to_value(event)?;
    let session = event.session();
    let visible = session
        .status
        .visible(session.last_activity(), now, idle_after);
    if let Some(object) = value.as_object_mut() {
        object.insert("visible_status".to_string(), serde_json::to_value(visible)?);
    }
    serde_json::to_string(&value)
}

/// Forward events from `rx` to `out` until every sender is gone.
pub async fn run<W>(
    mut rx: broadcast::Receiver<LifecycleEvent>,
    mut out: W,
    idle_after: chrono::Duration,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    loop {
        let event = match rx.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                warn!(
                    target: "sessionwatch::publish",
                    "Publisher fell behind; skipped {} events",
                    skipped
                );
                continue;
            }
            Err(RecvError::Closed) => break,
        };

        let mut line = render_line(&event, Utc::now(), idle_after)?;
        line.push('\n');
        out.write_all(line.as_bytes()).await?;
        out.flush().await?;
        debug!(
            target: "sessionwatch::publish",
            "Published {} for {}",
            event.kind(),
            event.session_id()
        );
    }
    Ok(())
}
