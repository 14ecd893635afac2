//! Static description of the managed game: where releases come from, which
//! file to launch, which config file to keep in sync. Passed in at
//! construction; every field can be overridden.

use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct GameDescriptor {
    pub name: String,
    pub full_name: String,
    pub author: String,
    pub description: String,
    pub version: String,
    pub url: String,
    pub color: String,

    /// Executable, relative to the server files root.
    pub start_path: PathBuf,
    /// Server configuration document, relative to the server files root.
    pub config_path: PathBuf,
    /// Scratch archive name, created inside the server files root.
    pub scratch_file: PathBuf,

    pub version_api: String,
    /// Substring identifying the platform archive among release assets.
    pub platform_marker: String,
    /// Settings key of the installed-version record.
    pub version_key: String,
    pub ip_echo_url: String,
    pub user_agent: String,
    pub request_timeout: Duration,

    pub allows_embed_console: bool,
    pub port_increments: u16,
    pub default_port: u16,
    pub default_query_port: u16,
    pub default_map: String,
    pub max_players: u32,
    pub additional_args: String,

    pub stop_timeout: Duration,
}

impl Default for GameDescriptor {
    fn default() -> Self {
        Self {
            name: "WindowsGSM.Imposter".to_string(),
            full_name: "Impostor: AmongUS Server".to_string(),
            author: "Raziel7893".to_string(),
            description: "WindowsGSM plugin for supporting AmongUS Imposter Server".to_string(),
            version: "1.0".to_string(),
            url: "https://github.com/Raziel7893/WindowsGSM.Imposter".to_string(),
            color: "#ffffff".to_string(),

            start_path: PathBuf::from("Impostor.Server.exe"),
            config_path: PathBuf::from("config.json"),
            scratch_file: PathBuf::from("install.zip"),

            version_api: "https://api.github.com/repos/Impostor/Impostor/releases/latest".to_string(),
            platform_marker: "_win-x64.zip".to_string(),
            version_key: "InstalledVersion".to_string(),
            ip_echo_url: "https://ipinfo.io/ip".to_string(),
            user_agent: concat!("impostor-manager/", env!("CARGO_PKG_VERSION")).to_string(),
            request_timeout: Duration::from_secs(30),

            allows_embed_console: true,
            port_increments: 1,
            default_port: 22023,
            default_query_port: 22023,
            default_map: "world".to_string(),
            max_players: 99,
            additional_args: String::new(),

            stop_timeout: Duration::from_secs(10),
        }
    }
}
