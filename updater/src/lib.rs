//! # impostor-updater
//!
//! 릴리스 조회, 아티팩트 다운로드, 압축 해제를 담당하는 라이브러리입니다.
//!
//! ## 구성
//! - **github.rs**: 최신 릴리스 조회 + 플랫폼 에셋 선택 (`ReleaseResolver`)
//! - **http.rs**: HTTP capability (`HttpFetcher`, reqwest 구현)
//! - **archive.rs**: 압축 해제 capability (`ArchiveExtractor`, zip 구현)
//! - **version.rs**: 설치 버전 vs 최신 버전 비교
//! - **error.rs**: 네트워크/파싱/파일 시스템 에러
//!
//! ## 릴리스 응답
//! GitHub `releases/latest` 형식의 JSON에서 `tag_name`과
//! `assets[].browser_download_url`만 사용합니다:
//! ```json
//! {
//!   "tag_name": "v1.9.0",
//!   "assets": [
//!     { "name": "Impostor-Server_1.9.0_win-x64.zip", "browser_download_url": "https://..." }
//!   ]
//! }
//! ```

pub mod archive;
pub mod error;
pub mod github;
pub mod http;
pub mod version;

pub use archive::{ArchiveExtractor, ZipExtractor};
pub use error::UpdaterError;
pub use github::{normalize_tag, GitHubAsset, GitHubRelease, ReleaseResolver, ResolvedRelease};
pub use http::{HttpFetcher, ReqwestFetcher};
pub use version::{is_update_available, SemVer};
