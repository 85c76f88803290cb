//! The process-wide monitor: watches, debouncers, registry and sweeper wired
//! around one worker task.
//!
//! All registry mutation happens on the worker. Filesystem events are
//! debounced per path; removals skip the debounce and cancel any pending
//! timer for the path. A watched directory missing at startup is picked up
//! on a later sweep tick.

use crate::debounce::Debouncer;
use crate::git::{GitInfoCache, GitInfoProvider, PrPollTrigger};
use crate::registry::{RegistryConfig, SessionRegistry};
use crate::signals::list_signal_files;
use crate::sweeper::StaleSweeper;
use crate::watch::{DirWatches, WatchEvent, initial_scan};
use crate::Result;
use chrono::Utc;
use sessionwatch_types::LifecycleEvent;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Root of the transcript tree (`<projects>/<project>/<session>.jsonl`).
    pub projects_dir: PathBuf,
    /// Directory holding `<session>.<kind>.json` hook signal files.
    pub signals_dir: PathBuf,
    pub transcript_debounce: Duration,
    pub signal_debounce: Duration,
    pub sweep_interval: Duration,
    pub stale_threshold: Duration,
    pub git_cache_ttl: Duration,
    /// Skip transcripts older than this during the startup scan.
    pub initial_scan_max_age: Option<Duration>,
    pub event_capacity: usize,
}

impl MonitorConfig {
    pub fn new(projects_dir: PathBuf, signals_dir: PathBuf) -> Self {
        Self {
            projects_dir,
            signals_dir,
            transcript_debounce: Duration::from_millis(200),
            signal_debounce: Duration::from_millis(500),
            sweep_interval: Duration::from_secs(10),
            stale_threshold: Duration::from_secs(15),
            git_cache_ttl: Duration::from_secs(5),
            initial_scan_max_age: None,
            event_capacity: 256,
        }
    }

    fn registry_config(&self) -> RegistryConfig {
        RegistryConfig {
            stale_threshold: chrono::Duration::from_std(self.stale_threshold)
                .unwrap_or_else(|_| RegistryConfig::default().stale_threshold),
            event_capacity: self.event_capacity,
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        let claude_dir = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".claude");
        Self::new(claude_dir.join("projects"), claude_dir.join("session-signals"))
    }
}

#[derive(Debug, Clone)]
enum WorkerMessage {
    /// Debounced transcript change, tagged with its timer generation.
    ProcessTranscript(PathBuf, u64),
    ProcessSignal(PathBuf, u64),
    Sweep,
}

pub struct SessionMonitor {
    config: MonitorConfig,
    registry: SessionRegistry,
}

impl SessionMonitor {
    pub fn new(
        config: MonitorConfig,
        git: Arc<dyn GitInfoProvider>,
        pr: Arc<dyn PrPollTrigger>,
    ) -> Self {
        let cache = GitInfoCache::new(git, config.git_cache_ttl);
        let registry = SessionRegistry::new(config.registry_config(), cache, pr);
        Self { config, registry }
    }

    /// Subscribe before `start` to also see sessions found by the initial scan.
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.registry.subscribe()
    }

    /// Install watches and spawn the worker and sweep ticker.
    pub fn start(self) -> Result<MonitorHandle> {
        let (fs_tx, fs_rx) = mpsc::unbounded_channel();
        let mut watches = DirWatches::new(
            self.config.projects_dir.clone(),
            self.config.signals_dir.clone(),
            fs_tx,
        );
        watches.ensure()?;
        if !watches.watching_transcripts() {
            warn!(
                target: "sessionwatch::watch",
                "Projects directory {} does not exist yet; will retry each sweep",
                self.config.projects_dir.display()
            );
        }
        if !watches.watching_signals() {
            warn!(
                target: "sessionwatch::watch",
                "Signal directory {} does not exist yet; will retry each sweep",
                self.config.signals_dir.display()
            );
        }

        let (msg_tx, msg_rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = mpsc::unbounded_channel::<()>();
        let sweeper = StaleSweeper::new(self.config.sweep_interval);
        let ticker = sweeper.spawn_ticker(msg_tx.clone(), WorkerMessage::Sweep);
        let event_tx = self.registry.event_sender();

        let worker = Worker {
            config: self.config,
            registry: self.registry,
            sweeper,
            watches,
            transcripts: Debouncer::new(),
            signals: Debouncer::new(),
            msg_tx,
        };
        let worker = tokio::spawn(worker.run(fs_rx, msg_rx, stop_rx));

        info!(target: "sessionwatch::startup", "Session monitor started");
        Ok(MonitorHandle {
            stop_tx,
            event_tx,
            worker,
            ticker,
        })
    }
}

/// Handle to a running monitor. Dropping it stops the watches and the worker
/// without waiting; [`MonitorHandle::shutdown`] waits.
pub struct MonitorHandle {
    stop_tx: mpsc::UnboundedSender<()>,
    event_tx: broadcast::Sender<LifecycleEvent>,
    worker: JoinHandle<()>,
    ticker: JoinHandle<()>,
}

impl MonitorHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.event_tx.subscribe()
    }

    /// Stop the worker and wait for it to finish its current handler.
    pub async fn shutdown(self) {
        self.ticker.abort();
        let _ = self.stop_tx.send(());
        if let Err(e) = self.worker.await {
            warn!(target: "sessionwatch::startup", "Monitor worker ended abnormally: {}", e);
        }
        info!(target: "sessionwatch::startup", "Session monitor stopped");
    }
}

struct Worker {
    config: MonitorConfig,
    registry: SessionRegistry,
    sweeper: StaleSweeper,
    watches: DirWatches,
    transcripts: Debouncer<PathBuf>,
    signals: Debouncer<PathBuf>,
    msg_tx: mpsc::UnboundedSender<WorkerMessage>,
}

impl Worker {
    async fn run(
        mut self,
        mut fs_rx: mpsc::UnboundedReceiver<WatchEvent>,
        mut msg_rx: mpsc::UnboundedReceiver<WorkerMessage>,
        mut stop_rx: mpsc::UnboundedReceiver<()>,
    ) {
        self.load_existing().await;

        loop {
            tokio::select! {
                biased;
                _ = stop_rx.recv() => {
                    debug!(target: "sessionwatch::startup", "Stopping monitor worker");
                    break;
                }
                Some(event) = fs_rx.recv() => self.on_watch_event(event).await,
                Some(msg) = msg_rx.recv() => self.on_message(msg).await,
                else => break,
            }
        }

        self.transcripts.clear();
        self.signals.clear();
    }

    async fn load_existing(&mut self) {
        let transcripts =
            initial_scan(&self.config.projects_dir, self.config.initial_scan_max_age).await;
        let signals = list_signal_files(&self.config.signals_dir).await;

        for path in &transcripts {
            self.registry.handle_transcript_change(path, Utc::now()).await;
        }
        for path in &signals {
            self.registry.handle_signal_change(path, Utc::now()).await;
        }

        info!(
            target: "sessionwatch::startup",
            "Initial scan: {} transcripts, {} signal files, {} sessions tracked",
            transcripts.len(),
            signals.len(),
            self.registry.len()
        );
    }

    /// Watch directories that have appeared since startup and load what
    /// they already hold.
    async fn ensure_watches(&mut self) {
        let installed = match self.watches.ensure() {
            Ok(installed) => installed,
            Err(e) => {
                warn!(target: "sessionwatch::watch", "Failed to install watch: {}", e);
                return;
            }
        };

        if installed.transcripts {
            let transcripts =
                initial_scan(&self.config.projects_dir, self.config.initial_scan_max_age).await;
            for path in &transcripts {
                self.registry.handle_transcript_change(path, Utc::now()).await;
            }
        }
        if installed.signals {
            for path in list_signal_files(&self.config.signals_dir).await {
                self.registry.handle_signal_change(&path, Utc::now()).await;
            }
        }
    }

    async fn on_watch_event(&mut self, event: WatchEvent) {
        match event {
            WatchEvent::TranscriptChanged(path) => {
                let key = path.clone();
                self.transcripts.schedule(
                    key,
                    self.config.transcript_debounce,
                    self.msg_tx.clone(),
                    |generation| WorkerMessage::ProcessTranscript(path, generation),
                );
            }
            WatchEvent::SignalChanged(path) => {
                let key = path.clone();
                self.signals.schedule(
                    key,
                    self.config.signal_debounce,
                    self.msg_tx.clone(),
                    |generation| WorkerMessage::ProcessSignal(path, generation),
                );
            }
            WatchEvent::TranscriptRemoved(path) => {
                self.transcripts.cancel(&path);
                self.registry.handle_transcript_removed(&path);
            }
            WatchEvent::SignalRemoved(path) => {
                self.signals.cancel(&path);
                self.registry.handle_signal_removed(&path, Utc::now()).await;
            }
        }
    }

    async fn on_message(&mut self, msg: WorkerMessage) {
        match msg {
            WorkerMessage::ProcessTranscript(path, generation) => {
                self.transcripts.complete(&path, generation);
                self.registry.handle_transcript_change(&path, Utc::now()).await;
            }
            WorkerMessage::ProcessSignal(path, generation) => {
                self.signals.complete(&path, generation);
                self.registry.handle_signal_change(&path, Utc::now()).await;
            }
            WorkerMessage::Sweep => {
                self.ensure_watches().await;
                self.sweeper.sweep(&mut self.registry, Utc::now()).await;
            }
        }
    }
}
