//! `ServerManager`: the lifecycle surface the host calls for one server
//! instance. Wires the installer, the config synchronizer and the process
//! supervisor to a shared descriptor and identity.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use impostor_updater::{is_update_available, ArchiveExtractor, HttpFetcher, ReqwestFetcher, ZipExtractor};
use tokio_util::sync::CancellationToken;

use crate::descriptor::GameDescriptor;
use crate::error::{ManagerError, Result};
use crate::host::{ConsoleSink, SettingsStore};
use crate::identity::ServerIdentity;
use crate::installer::{InstallReport, Installer};
use crate::server_config::{ConfigSynchronizer, PublicIpLookup};
use crate::supervisor::{ProcessSupervisor, StopOutcome, SupervisedProcess};

pub struct ServerManager {
    descriptor: Arc<GameDescriptor>,
    identity: ServerIdentity,
    settings: Arc<dyn SettingsStore>,
    installer: Installer,
    supervisor: ProcessSupervisor,
}

impl ServerManager {
    /// Manager backed by the real HTTP client and zip extractor.
    pub fn new(
        descriptor: GameDescriptor,
        identity: ServerIdentity,
        settings: Arc<dyn SettingsStore>,
        sink: Option<Arc<dyn ConsoleSink>>,
    ) -> Result<Self> {
        let http = ReqwestFetcher::new(&descriptor.user_agent, descriptor.request_timeout)?;
        Ok(Self::with_capabilities(
            descriptor,
            identity,
            settings,
            sink,
            Arc::new(http),
            Arc::new(ZipExtractor),
        ))
    }

    pub fn with_capabilities(
        descriptor: GameDescriptor,
        identity: ServerIdentity,
        settings: Arc<dyn SettingsStore>,
        sink: Option<Arc<dyn ConsoleSink>>,
        http: Arc<dyn HttpFetcher>,
        extractor: Arc<dyn ArchiveExtractor>,
    ) -> Self {
        let descriptor = Arc::new(descriptor);
        let installer = Installer::new(descriptor.clone(), http.clone(), extractor, settings.clone());
        let lookup = PublicIpLookup::new(http, &descriptor.ip_echo_url);
        let sync = ConfigSynchronizer::new(descriptor.config_path.clone(), lookup);
        let supervisor = ProcessSupervisor::new(descriptor.clone(), sync, sink);

        Self {
            descriptor,
            identity,
            settings,
            installer,
            supervisor,
        }
    }

    pub fn descriptor(&self) -> &GameDescriptor {
        &self.descriptor
    }

    pub fn identity(&self) -> &ServerIdentity {
        &self.identity
    }

    pub async fn install(&self, cancel: &CancellationToken) -> Result<InstallReport> {
        self.installer.install(&self.identity, cancel).await
    }

    /// Reinstall the latest release, keeping the current configuration file.
    pub async fn update(&self, cancel: &CancellationToken) -> Result<InstallReport> {
        self.installer.update(&self.identity, cancel).await
    }

    /// Sync the configuration and launch the server.
    pub async fn start(&self) -> Result<SupervisedProcess> {
        self.supervisor.launch(&self.identity).await
    }

    /// Two-phase stop with the descriptor's timeout.
    pub async fn stop(&self, process: &SupervisedProcess) -> Result<StopOutcome> {
        self.supervisor.stop(process, self.descriptor.stop_timeout).await
    }

    pub async fn stop_with_timeout(&self, process: &SupervisedProcess, timeout: Duration) -> Result<StopOutcome> {
        self.supervisor.stop(process, timeout).await
    }

    pub fn is_install_valid(&self) -> bool {
        self.identity.path(&self.descriptor.start_path).is_file()
    }

    /// Checks that an existing installation at `path` can be imported.
    pub fn is_import_valid(&self, path: &Path) -> Result<()> {
        if path.join(&self.descriptor.start_path).is_file() {
            Ok(())
        } else {
            Err(ManagerError::InvalidImport(self.descriptor.start_path.display().to_string()))
        }
    }

    pub fn local_build(&self) -> Option<String> {
        self.settings
            .get_setting(&self.identity.server_id, &self.descriptor.version_key)
            .filter(|v| !v.is_empty())
    }

    pub async fn remote_build(&self, cancel: &CancellationToken) -> Result<String> {
        Ok(self.installer.resolver().latest_version(cancel).await?)
    }

    pub async fn update_available(&self, cancel: &CancellationToken) -> Result<bool> {
        let remote = self.remote_build(cancel).await?;
        let local = self.local_build();
        let available = is_update_available(local.as_deref(), &remote);
        tracing::info!(
            "[{}] local build {:?}, remote build {}, update available: {}",
            self.identity.server_id,
            local,
            remote,
            available
        );
        Ok(available)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{zip_bytes, MemorySettings, StaticFetcher};

    const API: &str = "http://mock/releases/latest";

    fn manager(root: &Path, fetcher: StaticFetcher, settings: Arc<MemorySettings>) -> ServerManager {
        let descriptor = GameDescriptor {
            version_api: API.to_string(),
            ip_echo_url: "http://mock/ip".to_string(),
            ..GameDescriptor::default()
        };
        let identity = ServerIdentity {
            server_id: "7".into(),
            files_root: root.to_path_buf(),
            listen_ip: "0.0.0.0".into(),
            port: 22023,
            query_port: 22023,
            embed_console: false,
        };
        ServerManager::with_capabilities(
            descriptor,
            identity,
            settings,
            None,
            Arc::new(fetcher),
            Arc::new(ZipExtractor),
        )
    }

    fn release(tag: &str) -> String {
        serde_json::json!({
            "tag_name": tag,
            "assets": [{ "name": "Impostor-Server_win-x64.zip", "browser_download_url": "http://x/Impostor-Server_win-x64.zip" }]
        })
        .to_string()
    }

    #[tokio::test]
    async fn install_then_validity_and_builds() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = StaticFetcher::new().with_text(API, &release("v1.9.2")).with_file(
            "http://x/Impostor-Server_win-x64.zip",
            zip_bytes(&[("Impostor.Server.exe", b"MZ".as_slice())]),
        );
        let settings = Arc::new(MemorySettings::default());
        let manager = manager(dir.path(), fetcher, settings);
        let cancel = CancellationToken::new();

        assert!(!manager.is_install_valid());
        assert_eq!(manager.local_build(), None);
        assert!(manager.update_available(&cancel).await.unwrap());

        let report = manager.install(&cancel).await.unwrap();
        assert_eq!(report.version, "1.9.2");
        assert!(manager.is_install_valid());
        assert_eq!(manager.local_build().as_deref(), Some("1.9.2"));
        assert_eq!(manager.remote_build(&cancel).await.unwrap(), "1.9.2");
        assert!(!manager.update_available(&cancel).await.unwrap());
    }

    #[tokio::test]
    async fn newer_remote_build_is_an_update() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Arc::new(MemorySettings::default());
        settings.set_setting("7", "InstalledVersion", "1.2.0").unwrap();
        let manager = manager(dir.path(), StaticFetcher::new().with_text(API, &release("v1.10.0")), settings);

        assert!(manager.update_available(&CancellationToken::new()).await.unwrap());
    }

    #[tokio::test]
    async fn unreachable_api_surfaces_network_error() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path(), StaticFetcher::new(), Arc::new(MemorySettings::default()));

        let err = manager.remote_build(&CancellationToken::new()).await.unwrap_err();
        assert_eq!(err.error_code(), "NETWORK_ERROR");
    }

    #[test]
    fn import_requires_the_executable() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path(), StaticFetcher::new(), Arc::new(MemorySettings::default()));

        let err = manager.is_import_valid(dir.path()).unwrap_err();
        assert_eq!(err.to_string(), "Invalid path! Fail to find Impostor.Server.exe");

        std::fs::write(dir.path().join("Impostor.Server.exe"), b"MZ").unwrap();
        assert!(manager.is_import_valid(dir.path()).is_ok());
    }
}
