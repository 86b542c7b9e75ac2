#![allow(dead_code)]

use std::collections::HashSet;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use serde_json::Map;
use tempfile::TempDir;

use gatesync_client::testing::ScriptedTransport;
use gatesync_core::{
    DaemonStateStore, GatewayPaths, ManualClock, SyncConfig, TokenRecord, TokenStore,
};
use gatesync_daemon::{InstanceGuard, OutputSink, ProcessControl, SyncOrchestrator};

pub const NOW: u64 = 1_700_000_000;
pub const OWNER: &str = "/usr/local/bin/gatesync";
pub const SERVERS_URL: &str = "https://mcp.dev.example.com/api/servers";

/// Liveness is whatever the test says; terminate optionally "kills".
#[derive(Default)]
pub struct FakeProcesses {
    pub alive: Mutex<HashSet<u32>>,
    pub terminate_kills: bool,
    pub terminated: Mutex<Vec<u32>>,
    pub killed: Mutex<Vec<u32>>,
}

impl FakeProcesses {
    pub fn with_alive(pids: &[u32]) -> Self {
        Self {
            alive: Mutex::new(pids.iter().copied().collect()),
            ..Self::default()
        }
    }
}

impl ProcessControl for FakeProcesses {
    fn is_alive(&self, pid: u32) -> bool {
        self.alive.lock().unwrap().contains(&pid)
    }

    fn terminate(&self, pid: u32) -> io::Result<()> {
        self.terminated.lock().unwrap().push(pid);
        if self.terminate_kills {
            self.alive.lock().unwrap().remove(&pid);
        }
        Ok(())
    }

    fn kill(&self, pid: u32) -> io::Result<()> {
        self.killed.lock().unwrap().push(pid);
        self.alive.lock().unwrap().remove(&pid);
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingSink {
    pub lines: Mutex<Vec<String>>,
}

impl RecordingSink {
    pub fn contains(&self, needle: &str) -> bool {
        self.lines.lock().unwrap().iter().any(|l| l.contains(needle))
    }
}

impl OutputSink for RecordingSink {
    fn info(&self, message: &str) {
        self.lines.lock().unwrap().push(message.to_string());
    }

    fn warn(&self, message: &str) {
        self.lines.lock().unwrap().push(format!("WARN {message}"));
    }
}

pub fn config() -> SyncConfig {
    SyncConfig::from_lookup(|key| match key {
        "HORIZON_DOMAIN" => Some("dev.example.com".to_string()),
        _ => None,
    })
    .expect("config")
}

pub fn token(access: &str, obtained_at: u64, expires_in: u64) -> TokenRecord {
    TokenRecord {
        access_token: access.to_string(),
        refresh_token: Some("ref".to_string()),
        expires_in,
        obtained_at,
        extra: Map::new(),
    }
}

pub struct Harness {
    pub home: TempDir,
    pub paths: GatewayPaths,
    pub transport: Arc<ScriptedTransport>,
    pub processes: Arc<FakeProcesses>,
    pub clock: Arc<ManualClock>,
    pub sink: Arc<RecordingSink>,
}

impl Harness {
    /// Every pid counts as alive except those the test removes.
    pub fn new() -> Self {
        let home = TempDir::new().expect("home");
        let paths = GatewayPaths::at(home.path());
        paths.ensure_layout().expect("layout");
        Self {
            home,
            paths,
            transport: Arc::new(ScriptedTransport::new()),
            processes: Arc::new(FakeProcesses::with_alive(&[std::process::id()])),
            clock: Arc::new(ManualClock::new(NOW)),
            sink: Arc::new(RecordingSink::default()),
        }
    }

    pub fn tokens(&self) -> TokenStore {
        TokenStore::new(&self.paths.token)
    }

    pub fn state(&self) -> DaemonStateStore {
        DaemonStateStore::new(&self.paths.state)
    }

    pub fn guard(&self) -> InstanceGuard {
        InstanceGuard::new(self.state(), self.processes.clone(), PathBuf::from(OWNER))
    }

    pub fn orchestrator(&self) -> SyncOrchestrator {
        SyncOrchestrator::new(&config(), &self.paths, self.transport.clone(), self.guard())
            .with_clock(self.clock.clone())
            .with_sink(self.sink.clone())
    }

    pub fn settings_json(&self) -> serde_json::Value {
        let raw = std::fs::read_to_string(&self.paths.settings).expect("settings");
        serde_json::from_str(&raw).expect("settings json")
    }
}
