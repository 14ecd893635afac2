//! In-memory capability doubles for unit tests.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use impostor_updater::error::Result;
use impostor_updater::{HttpFetcher, UpdaterError};
use tokio_util::sync::CancellationToken;

use crate::host::{ConsoleSink, SettingsStore};
use crate::supervisor::ConsoleLine;

/// Serves canned bodies by URL; unknown URLs fail like an unreachable host.
#[derive(Default)]
pub struct StaticFetcher {
    texts: HashMap<String, String>,
    fallback_text: Option<String>,
    files: HashMap<String, Vec<u8>>,
    pub downloads: AtomicUsize,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `get_text` answers `body`, or fails when `None`.
    pub fn text(body: Option<&str>) -> Self {
        Self {
            fallback_text: body.map(str::to_string),
            ..Self::default()
        }
    }

    pub fn with_text(mut self, url: &str, body: &str) -> Self {
        self.texts.insert(url.to_string(), body.to_string());
        self
    }

    pub fn with_file(mut self, url: &str, bytes: Vec<u8>) -> Self {
        self.files.insert(url.to_string(), bytes);
        self
    }

    fn unreachable(url: &str) -> UpdaterError {
        UpdaterError::Network {
            message: format!("{}: connection refused", url),
            timed_out: false,
        }
    }
}

#[async_trait]
impl HttpFetcher for StaticFetcher {
    async fn get_text(&self, url: &str) -> Result<String> {
        self.texts
            .get(url)
            .or(self.fallback_text.as_ref())
            .cloned()
            .ok_or_else(|| Self::unreachable(url))
    }

    async fn download_to_file(&self, url: &str, dest: &Path, cancel: &CancellationToken) -> Result<u64> {
        if cancel.is_cancelled() {
            return Err(UpdaterError::Cancelled("download"));
        }
        let bytes = self.files.get(url).ok_or_else(|| Self::unreachable(url))?;
        self.downloads.fetch_add(1, Ordering::SeqCst);
        tokio::fs::write(dest, bytes)
            .await
            .map_err(|e| UpdaterError::io("write", dest, e))?;
        Ok(bytes.len() as u64)
    }
}

#[derive(Default)]
pub struct MemorySettings {
    values: Mutex<HashMap<(String, String), String>>,
}

impl SettingsStore for MemorySettings {
    fn get_setting(&self, server_id: &str, key: &str) -> Option<String> {
        self.values
            .lock()
            .unwrap()
            .get(&(server_id.to_string(), key.to_string()))
            .cloned()
    }

    fn set_setting(&self, server_id: &str, key: &str, value: &str) -> crate::error::Result<()> {
        self.values
            .lock()
            .unwrap()
            .insert((server_id.to_string(), key.to_string()), value.to_string());
        Ok(())
    }
}

/// Collects every forwarded console line.
#[derive(Default)]
pub struct CollectingSink {
    pub lines: Mutex<Vec<(String, ConsoleLine)>>,
}

impl CollectingSink {
    pub fn contents(&self) -> Vec<String> {
        self.lines.lock().unwrap().iter().map(|(_, l)| l.content.clone()).collect()
    }
}

impl ConsoleSink for CollectingSink {
    fn push_line(&self, server_id: &str, line: &ConsoleLine) {
        self.lines.lock().unwrap().push((server_id.to_string(), line.clone()));
    }
}

/// Builds an in-memory zip from `(name, content)` pairs.
pub fn zip_bytes(files: &[(&str, &[u8])]) -> Vec<u8> {
    use std::io::Write;
    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options = zip::write::FileOptions::default().compression_method(zip::CompressionMethod::Stored);
    for (name, content) in files {
        writer.start_file(*name, options).unwrap();
        writer.write_all(content).unwrap();
    }
    writer.finish().unwrap().into_inner()
}
