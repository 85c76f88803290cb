//! Periodic re-evaluation of sessions that still claim to be working.
//!
//! A session whose transcript stops growing never receives another change
//! event, so without a sweep it would stay `working` forever.

use crate::registry::SessionRegistry;
use chrono::{DateTime, Utc};
use sessionwatch_types::LifecycleEvent;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

#[derive(Debug, Clone, Copy)]
pub struct StaleSweeper {
    interval: Duration,
}

impl StaleSweeper {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Recompute every `working` session from its full history.
    pub async fn sweep(
        &self,
        registry: &mut SessionRegistry,
        now: DateTime<Utc>,
    ) -> Vec<LifecycleEvent> {
        let ids = registry.working_session_ids();
        let mut events = Vec::new();
        for id in &ids {
            if let Some(event) = registry.recompute_full(id, now).await {
                events.push(event);
            }
        }
        if !ids.is_empty() {
            debug!(
                target: "sessionwatch::sweeper",
                "Swept {} working sessions, {} changed",
                ids.len(),
                events.len()
            );
        }
        events
    }

    /// Send `msg` on `tx` every interval until the receiver goes away.
    pub fn spawn_ticker<M>(&self, tx: mpsc::UnboundedSender<M>, msg: M) -> JoinHandle<()>
    where
        M: Clone + Send + 'static,
    {
        let period = self.interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if tx.send(msg.clone()).is_err() {
                    break;
                }
            }
        })
    }
}

impl Default for StaleSweeper {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}
