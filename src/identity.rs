use std::path::{Path, PathBuf};

use crate::host::PathResolver;

/// Host-assigned identity of one server instance. Immutable for the lifetime
/// of a manager; components only borrow it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerIdentity {
    pub server_id: String,
    /// Working directory: the server's files root.
    pub files_root: PathBuf,
    pub listen_ip: String,
    pub port: u16,
    /// Admin / HTTP interface port.
    pub query_port: u16,
    pub embed_console: bool,
}

impl ServerIdentity {
    pub fn resolve(
        resolver: &dyn PathResolver,
        server_id: &str,
        listen_ip: &str,
        port: u16,
        query_port: u16,
        embed_console: bool,
    ) -> Self {
        Self {
            server_id: server_id.to_string(),
            files_root: resolver.server_files(server_id, None),
            listen_ip: listen_ip.to_string(),
            port,
            query_port,
            embed_console,
        }
    }

    /// Absolute path of `relative` under the files root.
    pub fn path(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.files_root.join(relative)
    }
}
