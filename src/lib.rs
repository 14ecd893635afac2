//! Lifecycle manager for an Impostor (Among Us) dedicated server: release
//! install/update, config sync against the host-assigned network identity,
//! and a supervised server process with a two-phase stop.

pub mod config;
pub mod descriptor;
pub mod error;
pub mod host;
pub mod identity;
pub mod installer;
pub mod manager;
pub mod server_config;
pub mod supervisor;
pub mod utils;

#[cfg(test)]
mod testing;

pub use descriptor::GameDescriptor;
pub use error::{ManagerError, Result};
pub use identity::ServerIdentity;
pub use manager::ServerManager;
