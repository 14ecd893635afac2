//! GitHub Release API 클라이언트
//!
//! Fetches the latest release document, picks the platform archive and reports
//! the tag plus download URL. Nothing is persisted here.

use std::sync::Arc;

use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, UpdaterError};
use crate::http::HttpFetcher;

/// GitHub Release 응답 (필요한 필드만)
#[derive(Debug, Clone, Deserialize)]
pub struct GitHubRelease {
    pub tag_name: String,
    #[serde(default)]
    pub assets: Vec<GitHubAsset>,
}

/// GitHub Release Asset
#[derive(Debug, Clone, Deserialize)]
pub struct GitHubAsset {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub browser_download_url: String,
}

impl GitHubRelease {
    /// First asset whose download URL (or name) contains `marker`, in response order.
    pub fn find_platform_asset(&self, marker: &str) -> Option<&GitHubAsset> {
        self.assets.iter().find(|a| {
            !a.browser_download_url.trim().is_empty()
                && (a.browser_download_url.contains(marker) || a.name.contains(marker))
        })
    }
}

/// A freshly queried release: tag as published plus the selected download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRelease {
    /// Tag exactly as the API reported it, e.g. `v1.9.0`.
    pub tag: String,
    pub download_url: String,
    pub asset_name: String,
}

impl ResolvedRelease {
    /// Tag with one leading `v` removed, the form stored in the version record.
    pub fn version(&self) -> String {
        normalize_tag(&self.tag)
    }
}

/// Strips one leading `v` from a release tag (`v1.2.3` → `1.2.3`).
pub fn normalize_tag(tag: &str) -> String {
    let tag = tag.trim();
    tag.strip_prefix('v').unwrap_or(tag).to_string()
}

/// Queries the release-metadata endpoint and selects the platform archive.
pub struct ReleaseResolver {
    http: Arc<dyn HttpFetcher>,
    api_url: String,
    platform_marker: String,
}

impl ReleaseResolver {
    pub fn new(http: Arc<dyn HttpFetcher>, api_url: &str, platform_marker: &str) -> Self {
        Self {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
            platform_marker: platform_marker.to_string(),
        }
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// 최신 릴리스 가져오기
    pub async fn fetch_latest_release(&self, cancel: &CancellationToken) -> Result<GitHubRelease> {
        let body = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(UpdaterError::Cancelled("release query")),
            body = self.http.get_text(&self.api_url) => body?,
        };

        serde_json::from_str::<GitHubRelease>(&body).map_err(|e| UpdaterError::Parse {
            url: self.api_url.clone(),
            message: e.to_string(),
        })
    }

    /// Resolve the latest release to `(tag, download URL)`.
    ///
    /// Fails with [`UpdaterError::NotFound`] when the release carries no asset
    /// for the platform marker, even though the query itself succeeded.
    pub async fn resolve(&self, cancel: &CancellationToken) -> Result<ResolvedRelease> {
        let release = self.fetch_latest_release(cancel).await?;

        let asset = release
            .find_platform_asset(&self.platform_marker)
            .ok_or_else(|| UpdaterError::NotFound {
                tag: release.tag_name.clone(),
                marker: self.platform_marker.clone(),
            })?;

        tracing::info!(
            "[Resolver] release {} → {} ({})",
            release.tag_name,
            asset.name,
            asset.browser_download_url
        );

        Ok(ResolvedRelease {
            tag: release.tag_name.clone(),
            download_url: asset.browser_download_url.clone(),
            asset_name: asset.name.clone(),
        })
    }

    /// Latest published version with the leading `v` stripped. Reads the same
    /// `tag_name` field as [`resolve`](Self::resolve) and does not require a platform asset.
    pub async fn latest_version(&self, cancel: &CancellationToken) -> Result<String> {
        let release = self.fetch_latest_release(cancel).await?;
        Ok(normalize_tag(&release.tag_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::path::Path;

    struct CannedFetcher {
        body: std::result::Result<String, u16>,
    }

    #[async_trait]
    impl HttpFetcher for CannedFetcher {
        async fn get_text(&self, url: &str) -> Result<String> {
            match &self.body {
                Ok(b) => Ok(b.clone()),
                Err(code) => Err(UpdaterError::Status { code: *code, url: url.to_string() }),
            }
        }

        async fn download_to_file(&self, _url: &str, _dest: &Path, _cancel: &CancellationToken) -> Result<u64> {
            Ok(0)
        }
    }

    fn resolver(body: std::result::Result<&str, u16>) -> ReleaseResolver {
        let fetcher = CannedFetcher { body: body.map(str::to_string) };
        ReleaseResolver::new(Arc::new(fetcher), "http://mock/releases/latest", "_win-x64.zip")
    }

    #[tokio::test]
    async fn picks_first_matching_asset_in_order() {
        let body = r#"{
            "tag_name": "v1.9.0",
            "assets": [
                { "name": "Impostor-Server_1.9.0_linux-x64.tar.gz", "browser_download_url": "http://x/linux.tar.gz" },
                { "name": "Impostor-Server_1.9.0_win-x64.zip", "browser_download_url": "http://x/first_win-x64.zip" },
                { "name": "Impostor-Server_1.9.0_win-x64.zip.sha256", "browser_download_url": "http://x/second_win-x64.zip" }
            ]
        }"#;

        let resolved = resolver(Ok(body)).resolve(&CancellationToken::new()).await.unwrap();
        assert_eq!(resolved.tag, "v1.9.0");
        assert_eq!(resolved.version(), "1.9.0");
        assert_eq!(resolved.download_url, "http://x/first_win-x64.zip");
    }

    #[tokio::test]
    async fn no_platform_asset_is_not_found() {
        let body = r#"{ "tag_name": "v1.9.0", "assets": [
            { "name": "linux.tar.gz", "browser_download_url": "http://x/linux.tar.gz" }
        ] }"#;

        let err = resolver(Ok(body)).resolve(&CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, UpdaterError::NotFound { ref tag, .. } if tag == "v1.9.0"));
    }

    #[tokio::test]
    async fn malformed_body_is_parse_error() {
        let err = resolver(Ok("<html>rate limited</html>"))
            .resolve(&CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, UpdaterError::Parse { .. }));

        // tag_name 누락 → 구조 불일치
        let err = resolver(Ok(r#"{ "tagName": "v1.0.0", "assets": [] }"#))
            .resolve(&CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, UpdaterError::Parse { .. }));
    }

    #[tokio::test]
    async fn bad_status_is_propagated() {
        let err = resolver(Err(403)).resolve(&CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, UpdaterError::Status { code: 403, .. }));
    }

    #[tokio::test]
    async fn latest_version_reads_tag_name_without_asset() {
        let body = r#"{ "tag_name": "v3.1.0", "assets": [] }"#;
        let version = resolver(Ok(body)).latest_version(&CancellationToken::new()).await.unwrap();
        assert_eq!(version, "3.1.0");
    }

    #[tokio::test]
    async fn cancelled_query_returns_cancelled() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = resolver(Ok(r#"{ "tag_name": "v1", "assets": [] }"#))
            .resolve(&cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, UpdaterError::Cancelled(_)));
    }

    #[test]
    fn normalize_strips_single_leading_v() {
        assert_eq!(normalize_tag("v2.0.0"), "2.0.0");
        assert_eq!(normalize_tag("2.0.0"), "2.0.0");
        assert_eq!(normalize_tag("v1.0.0-dev"), "1.0.0-dev");
    }
}
