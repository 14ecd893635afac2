//! Launches the server executable and stops it in two phases: a graceful
//! interrupt, then a forced kill once the timeout runs out.

pub mod managed_process;
pub mod signal;
pub mod state_machine;

use std::sync::Arc;
use std::time::Duration;

use regex::Regex;

use crate::descriptor::GameDescriptor;
use crate::error::Result;
use crate::host::ConsoleSink;
use crate::identity::ServerIdentity;
use crate::server_config::ConfigSynchronizer;

pub use managed_process::{ConsoleLine, ExitInfo, LogLevel, LogSource, SupervisedProcess, IMPOSTOR_LOG_PATTERN};
pub use state_machine::ProcessState;

/// How a stop request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// The process was gone before the interrupt was sent.
    AlreadyExited(ExitInfo),
    /// Exited on its own within the graceful window.
    Graceful(ExitInfo),
    /// Killed after the graceful phase failed or timed out.
    Forced(ExitInfo),
}

impl StopOutcome {
    pub fn exit(&self) -> ExitInfo {
        match self {
            StopOutcome::AlreadyExited(exit) | StopOutcome::Graceful(exit) | StopOutcome::Forced(exit) => *exit,
        }
    }

    pub fn was_forced(&self) -> bool {
        matches!(self, StopOutcome::Forced(_))
    }
}

pub struct ProcessSupervisor {
    descriptor: Arc<GameDescriptor>,
    sync: ConfigSynchronizer,
    sink: Option<Arc<dyn ConsoleSink>>,
    log_pattern: Option<Arc<Regex>>,
}

impl ProcessSupervisor {
    pub fn new(descriptor: Arc<GameDescriptor>, sync: ConfigSynchronizer, sink: Option<Arc<dyn ConsoleSink>>) -> Self {
        let log_pattern = match Regex::new(IMPOSTOR_LOG_PATTERN) {
            Ok(re) => Some(Arc::new(re)),
            Err(e) => {
                tracing::warn!("Invalid log pattern, console levels disabled: {}", e);
                None
            }
        };
        Self {
            descriptor,
            sync,
            sink,
            log_pattern,
        }
    }

    /// Re-sync the config document, then spawn the executable inside the
    /// files root with no arguments.
    pub async fn launch(&self, identity: &ServerIdentity) -> Result<SupervisedProcess> {
        self.sync.sync(identity).await?;

        let program = identity.path(&self.descriptor.start_path);
        let embed = identity.embed_console && self.descriptor.allows_embed_console;
        tracing::info!(
            "Launching server '{}': {} (embed console: {})",
            identity.server_id,
            program.display(),
            embed
        );

        let process = SupervisedProcess::spawn(
            &identity.server_id,
            &program,
            &identity.files_root,
            embed,
            self.sink.clone(),
            self.log_pattern.clone(),
        )
        .await?;

        tracing::info!("Server '{}' started with PID {}", identity.server_id, process.pid());
        Ok(process)
    }

    /// Interrupt, wait up to `timeout`, then force. The process is `Exited`
    /// whenever this returns `Ok`.
    pub async fn stop(&self, process: &SupervisedProcess, timeout: Duration) -> Result<StopOutcome> {
        if process.exit_info().is_some() {
            return Ok(StopOutcome::AlreadyExited(process.wait().await));
        }

        process.begin_stop();
        let pid = process.pid();
        tracing::info!("Stopping server '{}' (PID {}), timeout {:?}", process.server_id(), pid, timeout);

        match tokio::task::spawn_blocking(move || signal::send_interrupt(pid)).await {
            Ok(Ok(())) => {
                // the timeout covers the process only; output drains afterwards
                if tokio::time::timeout(timeout, process.wait_exited()).await.is_ok()
                    || process.exit_info().is_some()
                {
                    tracing::info!("Server '{}' exited gracefully", process.server_id());
                    return Ok(StopOutcome::Graceful(process.wait().await));
                }
                tracing::warn!(
                    "Server '{}' still running after {:?}, forcing termination",
                    process.server_id(),
                    timeout
                );
            }
            Ok(Err(e)) => {
                if process.exit_info().is_some() {
                    return Ok(StopOutcome::AlreadyExited(process.wait().await));
                }
                tracing::warn!("Graceful interrupt failed, forcing termination: {}", e);
            }
            Err(e) => tracing::warn!("Interrupt task failed, forcing termination: {}", e),
        }

        let exit = process.force_kill().await?;
        tracing::info!("Server '{}' terminated", process.server_id());
        Ok(StopOutcome::Forced(exit))
    }
}
