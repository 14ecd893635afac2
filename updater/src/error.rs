//! 에러 처리
//!
//! ## 지원하는 에러 상황
//! - 네트워크 끊김 / 타임아웃 / 비정상 HTTP 상태
//! - 릴리스 응답 파싱 실패
//! - 플랫폼 에셋 없음
//! - 파일 시스템 / 압축 해제 오류
//! - 호출자 취소

use std::path::PathBuf;
use std::time::Duration;

/// 업데이터 에러 타입
#[derive(thiserror::Error, Debug)]
pub enum UpdaterError {
    /// Connection failure, timeout or body read failure.
    #[error("Network error: {message}")]
    Network { message: String, timed_out: bool },

    /// The endpoint answered with a non-success status.
    #[error("HTTP {code} from {url}")]
    Status { code: u16, url: String },

    /// The response body did not have the expected structure.
    #[error("Unexpected response from {url}: {message}")]
    Parse { url: String, message: String },

    /// No release asset matched the platform marker.
    #[error("No asset matching '{marker}' found in release {tag}")]
    NotFound { tag: String, marker: String },

    #[error("File system error during {operation} on '{}': {source}", .path.display())]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Archive error in '{}': {message}", .path.display())]
    Archive { path: PathBuf, message: String },

    #[error("Operation cancelled: {0}")]
    Cancelled(&'static str),
}

impl UpdaterError {
    /// Whether retrying the same call later has a chance of succeeding.
    pub fn is_recoverable(&self) -> bool {
        match self {
            UpdaterError::Network { .. } => true,
            // 5xx / 429 는 재시도 가능, 나머지 4xx 는 불가능
            UpdaterError::Status { code, .. } => *code >= 500 || *code == 429,
            UpdaterError::Parse { .. } => false,
            UpdaterError::NotFound { .. } => false,
            UpdaterError::Io { .. } => false,
            UpdaterError::Archive { .. } => false,
            UpdaterError::Cancelled(_) => false,
        }
    }

    /// Suggested delay before retry attempt `attempt` (exponential, capped at one minute).
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let base: u64 = match self {
            UpdaterError::Status { code: 429, .. } => 30,
            UpdaterError::Network { timed_out: true, .. } => 5,
            UpdaterError::Network { .. } => 2,
            _ => 1,
        };
        let multiplier = 2u64.saturating_pow(attempt);
        Duration::from_secs(base.saturating_mul(multiplier).min(60))
    }

    /// reqwest 에러를 UpdaterError로 변환
    pub fn from_reqwest(err: &reqwest::Error, url: &str) -> Self {
        if let Some(status) = err.status() {
            return UpdaterError::Status {
                code: status.as_u16(),
                url: url.to_string(),
            };
        }
        UpdaterError::Network {
            message: format!("{}: {}", url, err),
            timed_out: err.is_timeout(),
        }
    }

    /// `what` on `url` produced nothing for `after`.
    pub fn stalled(url: &str, what: &str, after: Duration) -> Self {
        UpdaterError::Network {
            message: format!("{}: {} timed out after {:?}", url, what, after),
            timed_out: true,
        }
    }

    pub fn io(operation: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        UpdaterError::Io {
            operation,
            path: path.into(),
            source,
        }
    }
}

pub type Result<T, E = UpdaterError> = std::result::Result<T, E>;
