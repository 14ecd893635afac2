//! Installer — resolve → download to a scratch archive → extract → clean up
//! → record the installed version.
//!
//! Nothing under the server directory is written until the release has been
//! resolved, and the version record only changes after a fully successful run.
//! A failure part-way through extraction is not rolled back: files already
//! overwritten stay overwritten.

use std::path::Path;
use std::sync::Arc;

use impostor_updater::{ArchiveExtractor, HttpFetcher, ReleaseResolver, ResolvedRelease};
use tokio_util::sync::CancellationToken;

use crate::descriptor::GameDescriptor;
use crate::error::{ManagerError, Result};
use crate::host::SettingsStore;
use crate::identity::ServerIdentity;
use crate::server_config::ServerConfigDocument;

/// Outcome of a successful install or update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    /// Version as recorded (leading `v` stripped).
    pub version: String,
    pub tag: String,
    pub download_url: String,
    pub files_extracted: usize,
    /// The archive shipped no configuration, so a default one was written.
    pub created_default_config: bool,
    /// An existing configuration was put back after the install.
    pub restored_config: bool,
}

pub struct Installer {
    resolver: ReleaseResolver,
    http: Arc<dyn HttpFetcher>,
    extractor: Arc<dyn ArchiveExtractor>,
    settings: Arc<dyn SettingsStore>,
    descriptor: Arc<GameDescriptor>,
}

impl Installer {
    pub fn new(
        descriptor: Arc<GameDescriptor>,
        http: Arc<dyn HttpFetcher>,
        extractor: Arc<dyn ArchiveExtractor>,
        settings: Arc<dyn SettingsStore>,
    ) -> Self {
        let resolver = ReleaseResolver::new(http.clone(), &descriptor.version_api, &descriptor.platform_marker);
        Self {
            resolver,
            http,
            extractor,
            settings,
            descriptor,
        }
    }

    pub fn resolver(&self) -> &ReleaseResolver {
        &self.resolver
    }

    /// Fresh install (or overwrite) of the latest release into the server directory.
    pub async fn install(&self, identity: &ServerIdentity, cancel: &CancellationToken) -> Result<InstallReport> {
        let resolved = self.resolver.resolve(cancel).await?;
        tracing::info!(
            "[{}] Installing {} {} from {}",
            identity.server_id,
            self.descriptor.full_name,
            resolved.tag,
            resolved.download_url
        );

        tokio::fs::create_dir_all(&identity.files_root)
            .await
            .map_err(|e| ManagerError::io(format!("create {}", identity.files_root.display()), e))?;

        let scratch = identity.path(&self.descriptor.scratch_file);
        let outcome = self.fetch_and_unpack(&resolved, &scratch, &identity.files_root, cancel).await;
        remove_scratch(&scratch).await;
        let files_extracted = outcome?;

        let created_default_config = self.ensure_default_config(identity).await?;

        let version = resolved.version();
        self.settings
            .set_setting(&identity.server_id, &self.descriptor.version_key, &version)?;
        tracing::info!("[{}] Installed version {}", identity.server_id, version);

        Ok(InstallReport {
            version,
            tag: resolved.tag,
            download_url: resolved.download_url,
            files_extracted,
            created_default_config,
            restored_config: false,
        })
    }

    /// Install while keeping the current configuration: the archive's default
    /// config overwrites it during extraction, then the held copy is written back.
    pub async fn update(&self, identity: &ServerIdentity, cancel: &CancellationToken) -> Result<InstallReport> {
        let config_path = identity.path(&self.descriptor.config_path);
        let held = match tokio::fs::read(&config_path).await {
            Ok(bytes) => Some(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(ManagerError::io(format!("read {}", config_path.display()), e)),
        };

        let result = self.install(identity, cancel).await;

        let Some(held) = held else {
            return result;
        };

        let restored = restore_config(&config_path, &held).await;
        match (result, restored) {
            (Ok(mut report), Ok(changed)) => {
                report.restored_config = changed;
                Ok(report)
            }
            (Ok(_), Err(e)) => Err(e),
            (Err(e), restored) => {
                if let Err(restore_err) = restored {
                    tracing::error!("[{}] Failed to restore configuration: {}", identity.server_id, restore_err);
                }
                Err(e)
            }
        }
    }

    async fn fetch_and_unpack(
        &self,
        resolved: &ResolvedRelease,
        scratch: &Path,
        target: &Path,
        cancel: &CancellationToken,
    ) -> Result<usize> {
        self.http
            .download_to_file(&resolved.download_url, scratch, cancel)
            .await?;

        if cancel.is_cancelled() {
            return Err(ManagerError::Cancelled("install".to_string()));
        }

        Ok(self.extractor.extract(scratch, target).await?)
    }

    async fn ensure_default_config(&self, identity: &ServerIdentity) -> Result<bool> {
        let path = identity.path(&self.descriptor.config_path);
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(false);
        }

        let document = ServerConfigDocument::defaults(identity);
        let content = document.to_pretty_string().map_err(|e| ManagerError::ConfigParse {
            path: path.clone(),
            message: e.to_string(),
        })?;
        write_file(&path, content.as_bytes()).await?;
        tracing::info!("[{}] Created default config at {}", identity.server_id, path.display());
        Ok(true)
    }
}

/// Puts `held` back unless the file already holds exactly those bytes.
async fn restore_config(path: &Path, held: &[u8]) -> Result<bool> {
    if let Ok(current) = tokio::fs::read(path).await {
        if current == held {
            return Ok(false);
        }
    }
    write_file(path, held).await?;
    tracing::info!("Restored previous configuration at {}", path.display());
    Ok(true)
}

async fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| ManagerError::io(format!("create {}", parent.display()), e))?;
    }
    tokio::fs::write(path, bytes)
        .await
        .map_err(|e| ManagerError::io(format!("write {}", path.display()), e))
}

/// Best-effort removal; a leftover archive is logged, never fatal.
async fn remove_scratch(scratch: &Path) {
    match tokio::fs::remove_file(scratch).await {
        Ok(()) => tracing::debug!("Removed scratch archive {}", scratch.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("Failed to remove scratch archive {}: {}", scratch.display(), e),
    }
}
