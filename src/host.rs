//! Host-facing interfaces: settings persistence, path resolution and the
//! console sink. The orchestrator supplies its own implementations; the ones
//! here back the standalone binary and the tests.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{ManagerError, Result};
use crate::supervisor::ConsoleLine;

/// Per-server key/value settings owned by the host.
pub trait SettingsStore: Send + Sync {
    fn get_setting(&self, server_id: &str, key: &str) -> Option<String>;
    fn set_setting(&self, server_id: &str, key: &str, value: &str) -> Result<()>;
}

/// Maps a server id (+ optional relative path) to an absolute path under that
/// server's files root.
pub trait PathResolver: Send + Sync {
    fn server_files(&self, server_id: &str, relative: Option<&Path>) -> PathBuf;
}

/// Receives captured console lines one at a time. Implementations must not
/// block for long: they run on the forwarding task of the supervised process.
pub trait ConsoleSink: Send + Sync {
    fn push_line(&self, server_id: &str, line: &ConsoleLine);
}

// ─── Settings ────────────────────────────────────────────────

type SettingsMap = BTreeMap<String, BTreeMap<String, String>>;

/// Settings store backed by a pretty-printed JSON file
/// (`{ "<server id>": { "<key>": "<value>" } }`).
pub struct JsonSettingsStore {
    file_path: PathBuf,
    lock: Mutex<()>,
}

impl JsonSettingsStore {
    pub fn new(file_path: impl Into<PathBuf>) -> Self {
        Self {
            file_path: file_path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }

    fn load(&self) -> Result<SettingsMap> {
        if !self.file_path.exists() {
            return Ok(SettingsMap::new());
        }
        let content = fs::read_to_string(&self.file_path)
            .map_err(|e| ManagerError::Settings(format!("{}: {}", self.file_path.display(), e)))?;
        if content.trim().is_empty() {
            return Ok(SettingsMap::new());
        }
        serde_json::from_str(&content)
            .map_err(|e| ManagerError::Settings(format!("{}: {}", self.file_path.display(), e)))
    }

    fn save(&self, map: &SettingsMap) -> Result<()> {
        if let Some(parent) = self.file_path.parent() {
            fs::create_dir_all(parent).map_err(|e| ManagerError::Settings(e.to_string()))?;
        }
        let content = serde_json::to_string_pretty(map).map_err(|e| ManagerError::Settings(e.to_string()))?;
        fs::write(&self.file_path, content)
            .map_err(|e| ManagerError::Settings(format!("{}: {}", self.file_path.display(), e)))
    }
}

impl SettingsStore for JsonSettingsStore {
    fn get_setting(&self, server_id: &str, key: &str) -> Option<String> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        match self.load() {
            Ok(map) => map.get(server_id).and_then(|s| s.get(key)).cloned(),
            Err(e) => {
                tracing::warn!("Failed to read settings: {}", e);
                None
            }
        }
    }

    fn set_setting(&self, server_id: &str, key: &str, value: &str) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut map = self.load()?;
        map.entry(server_id.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
        self.save(&map)?;
        tracing::debug!("Setting {}.{} = {}", server_id, key, value);
        Ok(())
    }
}

// ─── Paths ───────────────────────────────────────────────────

/// `<root>/servers/<id>/serverfiles[/<relative>]`
#[derive(Debug, Clone)]
pub struct ServersRoot {
    root: PathBuf,
}

impl ServersRoot {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl PathResolver for ServersRoot {
    fn server_files(&self, server_id: &str, relative: Option<&Path>) -> PathBuf {
        let base = self.root.join("servers").join(server_id).join("serverfiles");
        match relative {
            Some(rel) => base.join(rel),
            None => base,
        }
    }
}

// ─── Console ─────────────────────────────────────────────────

/// Forwards console lines into `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingConsoleSink;

impl ConsoleSink for TracingConsoleSink {
    fn push_line(&self, server_id: &str, line: &ConsoleLine) {
        use crate::supervisor::LogLevel;
        match line.level {
            LogLevel::Error => tracing::error!(target: "server_console", "[{}] {}", server_id, line.content),
            LogLevel::Warn => tracing::warn!(target: "server_console", "[{}] {}", server_id, line.content),
            LogLevel::Debug => tracing::debug!(target: "server_console", "[{}] {}", server_id, line.content),
            LogLevel::Info => tracing::info!(target: "server_console", "[{}] {}", server_id, line.content),
        }
    }
}
