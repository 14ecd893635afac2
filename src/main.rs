use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use impostor_manager::config::ManagerConfig;
use impostor_manager::host::{ConsoleSink, JsonSettingsStore, ServersRoot, TracingConsoleSink};
use impostor_manager::{ServerIdentity, ServerManager};

/// Installs, updates and runs an Impostor server.
#[derive(Parser, Debug)]
#[command(name = "impostor-manager", version)]
struct Cli {
    /// Path to the manager config (default: $IMPOSTOR_MANAGER_CONFIG or config/manager.toml)
    #[arg(long, short)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Command {
    /// Download and install the latest release.
    Install,
    /// Reinstall the latest release, keeping the current config.json.
    Update,
    /// Compare the installed build with the latest release.
    Check,
    /// Sync config.json and run the server until Ctrl-C.
    Start,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config_path = ManagerConfig::resolve_path(cli.config.as_deref());
    let config = ManagerConfig::load(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;

    let paths = ServersRoot::new(&config.servers_root);
    let identity = ServerIdentity::resolve(
        &paths,
        &config.server_id,
        &config.listen_ip,
        config.port,
        config.query_port,
        config.embed_console,
    );
    let settings = Arc::new(JsonSettingsStore::new(config.settings_path()));
    let sink: Arc<dyn ConsoleSink> = Arc::new(TracingConsoleSink);
    let manager = ServerManager::new(config.descriptor(), identity, settings, Some(sink))?;

    // Ctrl-C cancels downloads; during `start` it triggers the stop sequence instead.
    let cancel = CancellationToken::new();
    if !matches!(cli.command, Command::Start) {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Interrupted, cancelling");
                cancel.cancel();
            }
        });
    }

    match cli.command {
        Command::Install => {
            let report = manager.install(&cancel).await?;
            println!(
                "✓ Installed {} ({} files) into {}",
                report.version,
                report.files_extracted,
                manager.identity().files_root.display()
            );
        }
        Command::Update => {
            let report = manager.update(&cancel).await?;
            println!("✓ Updated to {}", report.version);
            if report.restored_config {
                println!("  previous {} restored", manager.descriptor().config_path.display());
            }
        }
        Command::Check => {
            let remote = manager.remote_build(&cancel).await?;
            let local = manager.local_build();
            println!("installed: {}", local.as_deref().unwrap_or("-"));
            println!("latest:    {}", remote);
            println!("valid install: {}", manager.is_install_valid());
            if manager.update_available(&cancel).await? {
                println!("→ update available");
            } else {
                println!("✓ up to date");
            }
        }
        Command::Start => run_server(&manager).await?,
    }

    Ok(())
}

async fn run_server(manager: &ServerManager) -> anyhow::Result<()> {
    let process = manager.start().await?;

    tokio::select! {
        exit = process.wait() => {
            tracing::info!("Server exited on its own (code {:?})", exit.code);
        }
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                tracing::warn!("Ctrl-C handler failed: {}", e);
            }
            let outcome = manager.stop(&process).await?;
            tracing::info!("Server stopped: {:?}", outcome);
        }
    }

    Ok(())
}
