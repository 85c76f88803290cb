//! Transcript tailing and session status derivation for sessionwatch.

mod classifier;
mod debounce;
mod error;
mod git;
mod machine;
mod monitor;
mod reconciler;
mod registry;
mod signals;
mod sweeper;
mod tailer;
mod watch;

pub use classifier::{AUTO_APPROVED_TOOLS, classify, classify_all, is_auto_approved};
pub use debounce::Debouncer;
pub use error::WatchError;
pub use git::{GitCli, GitInfo, GitInfoCache, GitInfoProvider, NoopPrPoller, PrPollTrigger, normalize_repo_id};
pub use machine::StatusMachine;
pub use monitor::{MonitorConfig, MonitorHandle, SessionMonitor};
pub use reconciler::{Reconciled, reconcile};
pub use registry::{RegistryConfig, SessionRegistry};
pub use signals::{list_signal_files, read_signal_file};
pub use sweeper::StaleSweeper;
pub use tailer::{TailRead, read_new_lines, split_complete_lines};
pub use watch::{
    DirWatches, Installed, WatchEvent, initial_scan, is_signal_path, is_transcript_path,
};

/// Result type for sessionwatch operations.
pub type Result<T> = std::result::Result<T, WatchError>;
