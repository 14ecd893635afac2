use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::descriptor::GameDescriptor;
use crate::error::{ManagerError, Result};

pub const DEFAULT_CONFIG_PATH: &str = "config/manager.toml";
pub const CONFIG_ENV: &str = "IMPOSTOR_MANAGER_CONFIG";

/// Settings for the standalone host binary (`config/manager.toml`).
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ManagerConfig {
    /// Root holding `servers/<id>/serverfiles` and `settings.json`.
    pub servers_root: PathBuf,
    pub server_id: String,
    pub listen_ip: String,
    pub port: u16,
    pub query_port: u16,
    pub embed_console: bool,
    pub stop_timeout_secs: u64,
    pub version_api: Option<String>,
    pub ip_echo_url: Option<String>,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        let game = GameDescriptor::default();
        Self {
            servers_root: PathBuf::from("."),
            server_id: "1".to_string(),
            listen_ip: "0.0.0.0".to_string(),
            port: game.default_port,
            query_port: game.default_query_port,
            embed_console: game.allows_embed_console,
            stop_timeout_secs: game.stop_timeout.as_secs(),
            version_api: None,
            ip_echo_url: None,
        }
    }
}

impl ManagerConfig {
    /// `explicit` path, else `$IMPOSTOR_MANAGER_CONFIG`, else the default location.
    pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
        if let Some(path) = explicit {
            return path.to_path_buf();
        }
        match std::env::var(CONFIG_ENV) {
            Ok(path) if !path.is_empty() => PathBuf::from(path),
            _ => PathBuf::from(DEFAULT_CONFIG_PATH),
        }
    }

    /// A missing file yields the defaults; a malformed one is an error.
    pub fn load(path: &Path) -> Result<Self> {
        let s = match std::fs::read_to_string(path) {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No manager config at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(e) => return Err(ManagerError::io(format!("read {}", path.display()), e)),
        };
        toml::from_str(&s).map_err(|e| ManagerError::ConfigParse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    pub fn settings_path(&self) -> PathBuf {
        self.servers_root.join("settings.json")
    }

    /// Game descriptor with this file's overrides applied.
    pub fn descriptor(&self) -> GameDescriptor {
        let mut game = GameDescriptor {
            stop_timeout: Duration::from_secs(self.stop_timeout_secs),
            ..GameDescriptor::default()
        };
        if let Some(api) = &self.version_api {
            game.version_api = api.clone();
        }
        if let Some(url) = &self.ip_echo_url {
            game.ip_echo_url = url.clone();
        }
        game
    }
}
