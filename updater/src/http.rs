//! HTTP capability used by the resolver, the installer and the public-IP lookup.
//!
//! Everything that touches the network goes through [`HttpFetcher`] so tests
//! can swap in canned responses without a socket.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, UpdaterError};

/// Minimal HTTP surface: fetch a small text body, or stream a large body to disk.
#[async_trait]
pub trait HttpFetcher: Send + Sync {
    /// GET `url` and return the body as text. Non-2xx statuses are errors.
    async fn get_text(&self, url: &str) -> Result<String>;

    /// GET `url` and stream the body into `dest`, returning the byte count.
    /// Honors `cancel` between chunks. A response or chunk that takes longer
    /// than the request timeout is a timed-out network error.
    async fn download_to_file(&self, url: &str, dest: &Path, cancel: &CancellationToken) -> Result<u64>;
}

/// [`HttpFetcher`] backed by a shared `reqwest::Client`.
#[derive(Clone)]
pub struct ReqwestFetcher {
    http: reqwest::Client,
    request_timeout: Duration,
}

impl ReqwestFetcher {
    /// The remote release API rejects anonymous clients, so `user_agent` must be non-empty.
    pub fn new(user_agent: &str, request_timeout: Duration) -> Result<Self> {
        let user_agent = if user_agent.trim().is_empty() {
            concat!("impostor-updater/", env!("CARGO_PKG_VERSION"))
        } else {
            user_agent
        };
        let http = reqwest::Client::builder()
            .user_agent(user_agent)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| UpdaterError::Network {
                message: format!("failed to create HTTP client: {}", e),
                timed_out: false,
            })?;

        Ok(Self { http, request_timeout })
    }

    async fn fetch_text(&self, url: &str) -> Result<String> {
        let response = self
            .http
            .get(url)
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| UpdaterError::from_reqwest(&e, url))?;

        if !response.status().is_success() {
            return Err(UpdaterError::Status {
                code: response.status().as_u16(),
                url: url.to_string(),
            });
        }

        response
            .text()
            .await
            .map_err(|e| UpdaterError::from_reqwest(&e, url))
    }

    async fn stream_to_file(&self, url: &str, dest: &Path, cancel: &CancellationToken) -> Result<u64> {
        tracing::info!("Downloading {} → {}", url, dest.display());

        let timeout = self.request_timeout;
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(UpdaterError::Cancelled("download")),
            sent = tokio::time::timeout(timeout, self.http.get(url).send()) => sent
                .map_err(|_| UpdaterError::stalled(url, "request", timeout))?
                .map_err(|e| UpdaterError::from_reqwest(&e, url))?,
        };

        if !response.status().is_success() {
            return Err(UpdaterError::Status {
                code: response.status().as_u16(),
                url: url.to_string(),
            });
        }

        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| UpdaterError::io("create", dest, e))?;
        let mut stream = response.bytes_stream();
        let mut written: u64 = 0;

        // idle timeout: each chunk gets the full budget
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(UpdaterError::Cancelled("download")),
                next = tokio::time::timeout(timeout, stream.next()) => {
                    next.map_err(|_| UpdaterError::stalled(url, "body read", timeout))?
                }
            };
            let Some(chunk) = next else { break };
            let chunk = chunk.map_err(|e| UpdaterError::from_reqwest(&e, url))?;
            file.write_all(&chunk)
                .await
                .map_err(|e| UpdaterError::io("write", dest, e))?;
            written += chunk.len() as u64;
        }

        file.flush().await.map_err(|e| UpdaterError::io("flush", dest, e))?;
        tracing::info!("Downloaded {} bytes", written);
        Ok(written)
    }
}

#[async_trait]
impl HttpFetcher for ReqwestFetcher {
    async fn get_text(&self, url: &str) -> Result<String> {
        self.fetch_text(url).await
    }

    async fn download_to_file(&self, url: &str, dest: &Path, cancel: &CancellationToken) -> Result<u64> {
        self.stream_to_file(url, dest, cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unreachable_host_is_network_error() {
        let fetcher = ReqwestFetcher::new("test-agent", Duration::from_secs(2)).unwrap();
        // port 9 (discard) on loopback is closed on any sane test host
        let err = fetcher.get_text("http://127.0.0.1:9/").await.unwrap_err();
        assert!(matches!(err, UpdaterError::Network { .. }), "got {:?}", err);
    }

    /// Serves one connection: reads the request, writes `reply`, then holds
    /// the socket open without sending anything else.
    async fn stalling_server(reply: &'static [u8]) -> String {
        use tokio::io::AsyncReadExt;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 1024];
            let _ = socket.read(&mut request).await;
            let _ = socket.write_all(reply).await;
            tokio::time::sleep(Duration::from_secs(30)).await;
            drop(socket);
        });
        format!("http://{}/Impostor-Server_linux-x64.zip", addr)
    }

    async fn download_with_guard(url: &str) -> Result<u64> {
        let fetcher = ReqwestFetcher::new("test-agent", Duration::from_millis(500)).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("install.zip");
        tokio::time::timeout(Duration::from_secs(5), fetcher.download_to_file(url, &dest, &CancellationToken::new()))
            .await
            .expect("download did not give up on a stalled server")
    }

    #[tokio::test]
    async fn stalled_body_times_out() {
        let url = stalling_server(b"HTTP/1.1 200 OK\r\nContent-Length: 1000\r\n\r\n0123456789").await;

        let err = download_with_guard(&url).await.unwrap_err();
        assert!(matches!(err, UpdaterError::Network { timed_out: true, .. }), "got {:?}", err);
        assert!(err.is_recoverable());
    }

    #[tokio::test]
    async fn silent_server_times_out_before_headers() {
        let url = stalling_server(b"").await;

        let err = download_with_guard(&url).await.unwrap_err();
        assert!(matches!(err, UpdaterError::Network { timed_out: true, .. }), "got {:?}", err);
    }

    #[tokio::test]
    async fn cancelled_download_stops_before_request() {
        let fetcher = ReqwestFetcher::new("test-agent", Duration::from_secs(2)).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let dest = dir.path().join("install.zip");
        let err = fetcher
            .download_to_file("http://127.0.0.1:9/a.zip", &dest, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, UpdaterError::Cancelled(_)));
        assert!(!dest.exists());
    }
}
