//! Keeps the server's on-disk configuration in step with the network identity
//! assigned by the host. Runs before every launch.

pub mod document;

use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;

use impostor_updater::HttpFetcher;

use crate::error::{ManagerError, Result};
use crate::identity::ServerIdentity;

pub use document::{NetworkOverlay, ServerConfigDocument};

/// Best-effort lookup of the host's public address through an IP-echo endpoint.
pub struct PublicIpLookup {
    http: Arc<dyn HttpFetcher>,
    url: String,
}

impl PublicIpLookup {
    pub fn new(http: Arc<dyn HttpFetcher>, url: &str) -> Self {
        Self {
            http,
            url: url.to_string(),
        }
    }

    /// `None` on any failure. Binding and running the server does not depend
    /// on knowing the public address.
    pub async fn lookup(&self) -> Option<String> {
        let body = match self.http.get_text(&self.url).await {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!("Public IP lookup via {} failed: {}", self.url, e);
                return None;
            }
        };

        let candidate = body.trim_end_matches(['\r', '\n']).trim();
        match candidate.parse::<IpAddr>() {
            Ok(_) => Some(candidate.to_string()),
            Err(_) => {
                tracing::warn!("IP echo endpoint returned a non-address body: {:?}", candidate);
                None
            }
        }
    }
}

pub struct ConfigSynchronizer {
    config_path: PathBuf,
    ip_lookup: PublicIpLookup,
}

impl ConfigSynchronizer {
    /// `config_path` is relative to the server files root.
    pub fn new(config_path: impl Into<PathBuf>, ip_lookup: PublicIpLookup) -> Self {
        Self {
            config_path: config_path.into(),
            ip_lookup,
        }
    }

    /// Load, overlay the network identity, write back. Running it twice with
    /// the same identity leaves the file byte-identical.
    pub async fn sync(&self, identity: &ServerIdentity) -> Result<ServerConfigDocument> {
        let path = identity.path(&self.config_path);
        let mut document = load_document(&path).await?;

        let public_ip = self.ip_lookup.lookup().await;
        let overlay = NetworkOverlay::from_identity(identity, public_ip);
        document.apply_network(&overlay);

        let content = document.to_pretty_string().map_err(|e| ManagerError::ConfigParse {
            path: path.clone(),
            message: e.to_string(),
        })?;
        tokio::fs::write(&path, content)
            .await
            .map_err(|e| ManagerError::io(format!("write {}", path.display()), e))?;

        tracing::info!(
            "[{}] Synced {} (public {}:{}, listen {}:{}, http {}:{})",
            identity.server_id,
            path.display(),
            overlay.public_ip.as_deref().unwrap_or("<unknown>"),
            overlay.public_port,
            overlay.listen_ip,
            overlay.listen_port,
            overlay.http_listen_ip,
            overlay.http_listen_port,
        );
        Ok(document)
    }
}

/// Read and shape-check a configuration document.
pub async fn load_document(path: &std::path::Path) -> Result<ServerConfigDocument> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ManagerError::ConfigMissing(path.to_path_buf()));
        }
        Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
            return Err(ManagerError::ConfigParse {
                path: path.to_path_buf(),
                message: e.to_string(),
            });
        }
        Err(e) => return Err(ManagerError::io(format!("read {}", path.display()), e)),
    };

    ServerConfigDocument::parse(&content).map_err(|message| ManagerError::ConfigParse {
        path: path.to_path_buf(),
        message,
    })
}
