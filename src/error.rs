//! Manager 전용 에러 타입 — 호스트가 에러 종류별로 처리할 수 있도록
//! 각 라이프사이클 작업이 타입이 있는 결과를 반환합니다.

use std::path::PathBuf;

use impostor_updater::UpdaterError;

/// Errors surfaced by install / update / sync / start / stop.
#[derive(thiserror::Error, Debug)]
pub enum ManagerError {
    /// Remote endpoint unreachable, timed out, bad status or unparsable body.
    #[error("Network error: {0}")]
    Network(String),

    /// The release carries no artifact for this platform.
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration file '{}' does not exist", .0.display())]
    ConfigMissing(PathBuf),

    #[error("Configuration file '{}' is malformed: {message}", .path.display())]
    ConfigParse { path: PathBuf, message: String },

    /// The OS refused to start the server executable.
    #[error("Failed to start '{}': {message}", .program.display())]
    Spawn { program: PathBuf, message: String },

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    /// Forced termination itself failed.
    #[error("Failed to terminate process {pid}: {message}")]
    Terminate { pid: u32, message: String },

    #[error("Invalid path! Fail to find {0}")]
    InvalidImport(String),

    #[error("Settings store error: {0}")]
    Settings(String),
}

impl ManagerError {
    /// 머신 리더블 에러 코드
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Network(_) => "NETWORK_ERROR",
            Self::NotFound(_) => "NOT_FOUND",
            Self::ConfigMissing(_) => "CONFIG_MISSING",
            Self::ConfigParse { .. } => "CONFIG_PARSE_ERROR",
            Self::Spawn { .. } => "SPAWN_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::Cancelled(_) => "CANCELLED",
            Self::Terminate { .. } => "TERMINATE_FAILED",
            Self::InvalidImport(_) => "INVALID_IMPORT",
            Self::Settings(_) => "SETTINGS_ERROR",
        }
    }

    pub fn io(context: impl std::fmt::Display, err: std::io::Error) -> Self {
        Self::Io(format!("{}: {}", context, err))
    }
}

impl From<UpdaterError> for ManagerError {
    fn from(err: UpdaterError) -> Self {
        match err {
            UpdaterError::Network { .. } | UpdaterError::Status { .. } | UpdaterError::Parse { .. } => {
                Self::Network(err.to_string())
            }
            UpdaterError::NotFound { ref tag, ref marker } => {
                Self::NotFound(format!("No Windows executable ({}) found in version {}", marker, tag))
            }
            UpdaterError::Io { .. } | UpdaterError::Archive { .. } => Self::Io(err.to_string()),
            UpdaterError::Cancelled(what) => Self::Cancelled(what.to_string()),
        }
    }
}

pub type Result<T, E = ManagerError> = std::result::Result<T, E>;
