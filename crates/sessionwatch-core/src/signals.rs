//! Reading hook signal files from the signal directory.

use crate::{Result, WatchError};
use sessionwatch_types::{HookSignal, parse_signal_file_name};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Read and parse one signal file.
///
/// Returns `Ok(None)` when the file vanished before it could be read or
/// holds a half-written body; the watcher will see a later event for it.
pub async fn read_signal_file(path: &Path) -> Result<Option<HookSignal>> {
    let (session_id, kind) =
        parse_signal_file_name(path).ok_or_else(|| WatchError::InvalidSignalName(path.to_path_buf()))?;

    let body = match tokio::fs::read(path).await {
        Ok(body) => body,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(
                target: "sessionwatch::signals",
                "Signal file {} vanished before read",
                path.display()
            );
            return Ok(None);
        }
        Err(e) => return Err(e.into()),
    };

    match HookSignal::from_bytes(session_id, kind, &body) {
        Ok(signal) => Ok(Some(signal)),
        Err(e) => {
            debug!(
                target: "sessionwatch::signals",
                "Ignoring unreadable signal file {}: {}",
                path.display(),
                e
            );
            Ok(None)
        }
    }
}

/// List signal files currently present in `dir`.
pub async fn list_signal_files(dir: &Path) -> Vec<PathBuf> {
    let mut read_dir = match tokio::fs::read_dir(dir).await {
        Ok(rd) => rd,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
        Err(e) => {
            warn!(
                target: "sessionwatch::signals",
                "Failed to read signal dir {}: {}",
                dir.display(),
                e
            );
            return Vec::new();
        }
    };

    let mut paths = Vec::new();
    loop {
        match read_dir.next_entry().await {
            Ok(Some(entry)) => {
                let path = entry.path();
                if parse_signal_file_name(&path).is_some() {
                    paths.push(path);
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!(
                    target: "sessionwatch::signals",
                    "Failed while listing signal dir {}: {}",
                    dir.display(),
                    e
                );
                break;
            }
        }
    }
    paths.sort();
    paths
}

#[cfg(test)]
mod tests {
    use super::*;
    use sessionwatch_types::{HookSignalKind, HookSignalPayload};

    #[tokio::test]
    async fn test_read_permission_signal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s1.permission.json");
        std::fs::write(&path, r#"{"tool_name":"Bash","tool_input":{"command":"make"}}"#).unwrap();

        let signal = read_signal_file(&path).await.unwrap().unwrap();
        assert_eq!(signal.session_id, "s1");
        assert_eq!(signal.kind, HookSignalKind::Permission);
        assert!(matches!(signal.payload, HookSignalPayload::Permission(ref p) if p.tool_name.as_deref() == Some("Bash")));
    }

    #[tokio::test]
    async fn test_missing_and_garbled_files_are_swallowed() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_signal_file(&dir.path().join("s1.stop.json")).await.unwrap().is_none());

        let garbled = dir.path().join("s1.working.json");
        std::fs::write(&garbled, "{\"timest").unwrap();
        assert!(read_signal_file(&garbled).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_bad_name_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_signal_file(&dir.path().join("notes.json")).await.unwrap_err();
        assert!(matches!(err, WatchError::InvalidSignalName(_)));
    }

    #[tokio::test]
    async fn test_list_signal_files_filters_names() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.working.json"), "").unwrap();
        std::fs::write(dir.path().join("b.ended.json"), "").unwrap();
        std::fs::write(dir.path().join("readme.txt"), "").unwrap();
        std::fs::write(dir.path().join("c.other.json"), "").unwrap();

        let files = list_signal_files(dir.path()).await;
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.working.json", "b.ended.json"]);

        assert!(list_signal_files(&dir.path().join("missing")).await.is_empty());
    }
}
