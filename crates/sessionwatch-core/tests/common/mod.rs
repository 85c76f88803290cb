//! Shared helpers for sessionwatch-core integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::json;
use sessionwatch_types::HookSignalKind;
use sessionwatch_core::{
    GitInfo, GitInfoCache, GitInfoProvider, PrPollTrigger, RegistryConfig, SessionRegistry,
};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// Path to a file under `tests/fixtures/<kind>/`.
pub fn fixture_path(kind: &str, name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(kind)
        .join(name)
}

/// Complete lines of a transcript fixture.
pub fn load_transcript_lines(name: &str) -> Vec<String> {
    let path = fixture_path("transcripts", name);
    std::fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("Failed to read fixture {}: {}", path.display(), e))
        .lines()
        .map(str::to_string)
        .collect()
}

/// Fixed base time for transcripts written by tests.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 0).unwrap()
}

pub fn at(secs: i64) -> DateTime<Utc> {
    t0() + Duration::seconds(secs)
}

fn stamp(secs: i64) -> String {
    at(secs).to_rfc3339()
}

pub fn user_prompt(session_id: &str, cwd: &str, secs: i64, text: &str) -> String {
    json!({
        "type": "user",
        "sessionId": session_id,
        "cwd": cwd,
        "timestamp": stamp(secs),
        "message": {"role": "user", "content": text},
    })
    .to_string()
}

pub fn tool_use(session_id: &str, secs: i64, id: &str, name: &str) -> String {
    json!({
        "type": "assistant",
        "sessionId": session_id,
        "timestamp": stamp(secs),
        "message": {
            "role": "assistant",
            "content": [{"type": "tool_use", "id": id, "name": name, "input": {}}],
        },
    })
    .to_string()
}

pub fn tool_result(session_id: &str, secs: i64, id: &str) -> String {
    json!({
        "type": "user",
        "sessionId": session_id,
        "timestamp": stamp(secs),
        "message": {
            "role": "user",
            "content": [{"type": "tool_result", "tool_use_id": id, "content": "ok"}],
        },
    })
    .to_string()
}

pub fn assistant_text(session_id: &str, secs: i64, text: &str) -> String {
    json!({
        "type": "assistant",
        "sessionId": session_id,
        "timestamp": stamp(secs),
        "message": {"role": "assistant", "content": [{"type": "text", "text": text}]},
    })
    .to_string()
}

pub fn turn_end(session_id: &str, secs: i64) -> String {
    json!({
        "type": "system",
        "sessionId": session_id,
        "subtype": "turn_duration",
        "timestamp": stamp(secs),
    })
    .to_string()
}

/// A projects tree and a signal directory in a temp dir.
pub struct TestDirs {
    _tmp: TempDir,
    pub projects: PathBuf,
    pub signals: PathBuf,
}

impl TestDirs {
    pub fn new() -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let projects = tmp.path().join("projects");
        let signals = tmp.path().join("signals");
        std::fs::create_dir_all(projects.join("-work-app")).unwrap();
        std::fs::create_dir_all(&signals).unwrap();
        Self {
            _tmp: tmp,
            projects,
            signals,
        }
    }

    pub fn transcript(&self, session_id: &str) -> PathBuf {
        self.projects
            .join("-work-app")
            .join(format!("{session_id}.jsonl"))
    }

    pub fn signal(&self, session_id: &str, kind: &str) -> PathBuf {
        let kind: HookSignalKind = kind.parse().unwrap();
        self.signals.join(kind.file_name(session_id))
    }
}

/// Append newline-terminated lines.
pub fn append_lines(path: &Path, lines: &[String]) {
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .unwrap();
    for line in lines {
        writeln!(file, "{line}").unwrap();
    }
}

/// Append raw bytes with no terminator added.
pub fn append_raw(path: &Path, raw: &str) {
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .unwrap();
    file.write_all(raw.as_bytes()).unwrap();
}

/// Git provider whose answer tests can change.
#[derive(Default)]
pub struct FakeGit {
    info: Mutex<Option<GitInfo>>,
}

impl FakeGit {
    pub fn on_branch(branch: &str) -> Arc<Self> {
        let fake = Arc::new(Self::default());
        fake.set_branch(Some(branch));
        fake
    }

    pub fn set_branch(&self, branch: Option<&str>) {
        *self.info.lock().unwrap() = branch.map(|b| GitInfo {
            branch: Some(b.to_string()),
            repo_url: Some("git@github.com:acme/app.git".to_string()),
            repo_id: Some("github.com/acme/app".to_string()),
        });
    }
}

#[async_trait]
impl GitInfoProvider for FakeGit {
    async fn lookup(&self, _cwd: &Path) -> Option<GitInfo> {
        self.info.lock().unwrap().clone()
    }
}

/// PR trigger that records its calls.
#[derive(Default)]
pub struct RecordingPrPoller {
    pub calls: Mutex<Vec<String>>,
}

impl RecordingPrPoller {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl PrPollTrigger for RecordingPrPoller {
    fn trigger(&self, cwd: &Path, branch: &str, session_id: &str) {
        self.calls
            .lock()
            .unwrap()
            .push(format!("trigger {} {branch} {session_id}", cwd.display()));
    }

    fn invalidate(&self, cwd: &Path, branch: &str) {
        self.calls
            .lock()
            .unwrap()
            .push(format!("invalidate {} {branch}", cwd.display()));
    }
}

/// Registry with no git cache TTL, so every refresh asks the provider.
pub fn registry_with(git: Arc<dyn GitInfoProvider>, pr: Arc<dyn PrPollTrigger>) -> SessionRegistry {
    SessionRegistry::new(
        RegistryConfig::default(),
        GitInfoCache::new(git, std::time::Duration::ZERO),
        pr,
    )
}

pub fn registry() -> SessionRegistry {
    registry_with(Arc::new(FakeGit::default()), Arc::new(RecordingPrPoller::default()))
}
