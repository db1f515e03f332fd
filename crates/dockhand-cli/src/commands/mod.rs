//! CLI command definitions and dispatch.

pub mod backup;
pub mod config;
pub mod migrate;
pub mod restore;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use dockhand_backup::coordinator::BackupCoordinator;
use dockhand_common::config::ConsoleConfig;
use dockhand_runtime::command::SystemRunner;
use dockhand_runtime::containers::Containers;
use dockhand_runtime::daemon_config::ConfigStore;
use dockhand_runtime::gateway::RuntimeGateway;
use dockhand_runtime::preflight;
use dockhand_runtime::service::SystemdService;

use crate::prompt::TerminalConfirm;

/// dockhand — container runtime maintenance console.
#[derive(Parser, Debug)]
#[command(name = "dockhand", version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Options shared by every subcommand.
    #[command(flatten)]
    pub global: GlobalArgs,
}

/// Session-wide flags; each path falls back to an environment variable,
/// then to the stock Docker location.
#[derive(Args, Debug)]
pub struct GlobalArgs {
    /// Answer yes to every confirmation prompt.
    #[arg(short, long, global = true)]
    pub yes: bool,

    /// Log debug output to stderr.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Runtime command-line binary.
    #[arg(long, global = true, env = "DOCKHAND_RUNTIME")]
    pub runtime: Option<String>,

    /// Runtime control socket.
    #[arg(long, global = true, env = "DOCKHAND_SOCKET")]
    pub socket: Option<PathBuf>,

    /// Daemon configuration file.
    #[arg(long, global = true, env = "DOCKHAND_DAEMON_CONFIG")]
    pub daemon_config: Option<PathBuf>,

    /// Configuration directory captured by configuration snapshots.
    #[arg(long, global = true, env = "DOCKHAND_CONFIG_DIR")]
    pub config_dir: Option<PathBuf>,

    /// Directory holding snapshots.
    #[arg(long, global = true, env = "DOCKHAND_BACKUP_DIR")]
    pub backup_dir: Option<PathBuf>,

    /// Service units, in stop order.
    #[arg(long, global = true, env = "DOCKHAND_SERVICE_UNITS", value_delimiter = ',')]
    pub service_units: Option<Vec<String>>,

    /// Data root assumed when the runtime cannot report one.
    #[arg(long, global = true, env = "DOCKHAND_FALLBACK_DATA_ROOT")]
    pub fallback_data_root: Option<PathBuf>,
}

impl GlobalArgs {
    /// Applies the overrides to the default configuration.
    pub fn console_config(&self) -> ConsoleConfig {
        let mut config = ConsoleConfig::default();
        if let Some(runtime) = &self.runtime {
            config.runtime_binary.clone_from(runtime);
        }
        if let Some(socket) = &self.socket {
            config.socket_path.clone_from(socket);
        }
        if let Some(path) = &self.daemon_config {
            config.daemon_config.clone_from(path);
        }
        if let Some(dir) = &self.config_dir {
            config.config_dir.clone_from(dir);
        }
        if let Some(dir) = &self.backup_dir {
            config.backup_dir.clone_from(dir);
        }
        if let Some(units) = self.service_units.as_ref().filter(|u| !u.is_empty()) {
            config.service_units.clone_from(units);
        }
        if let Some(root) = &self.fallback_data_root {
            config.fallback_data_root.clone_from(root);
        }
        config
    }
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Inspect and change the daemon configuration.
    Config(config::ConfigArgs),
    /// Move the runtime's data root to another directory.
    Migrate(migrate::MigrateArgs),
    /// Snapshot containers or the configuration directory, list or delete snapshots.
    Backup(backup::BackupArgs),
    /// Restore a container or the configuration from a snapshot.
    Restore(restore::RestoreArgs),
}

/// Resolved configuration and capabilities shared by command handlers.
pub struct Session {
    /// Paths and names for this run.
    pub config: ConsoleConfig,
    /// Confirmation prompt.
    pub confirm: TerminalConfirm,
    /// Whether the effective user is root.
    pub is_root: bool,
}

impl Session {
    /// Fails `operation` up front unless running as root.
    ///
    /// # Errors
    ///
    /// Returns a precondition error for non-root users.
    pub fn require_root(&self, operation: &str) -> anyhow::Result<()> {
        Ok(preflight::check_root(self.is_root, operation)?)
    }

    /// Locates the runtime and selects the privilege mode.
    ///
    /// # Errors
    ///
    /// Returns a precondition error if the runtime cannot be reached.
    pub fn gateway(&self) -> anyhow::Result<RuntimeGateway> {
        Ok(preflight::open_gateway(&self.config, Arc::new(SystemRunner))?)
    }

    /// Like [`Session::gateway`], and also requires the daemon to answer.
    ///
    /// # Errors
    ///
    /// Returns a precondition error if the daemon is not running.
    pub fn live_gateway(&self) -> anyhow::Result<RuntimeGateway> {
        let gateway = self.gateway()?;
        let version = preflight::require_daemon(&gateway)?;
        tracing::debug!(%version, "daemon answered");
        Ok(gateway)
    }

    /// Returns the daemon configuration store.
    pub fn store(&self) -> ConfigStore {
        ConfigStore::new(&self.config.daemon_config)
    }

    /// Returns the service controller for `gateway`.
    pub fn service(&self, gateway: RuntimeGateway) -> SystemdService {
        SystemdService::new(gateway, self.config.service_units.clone())
    }

    /// Returns a backup coordinator over `gateway`.
    pub fn coordinator(&self, gateway: RuntimeGateway) -> BackupCoordinator<'_> {
        BackupCoordinator::new(
            &self.config.backup_dir,
            &self.config.config_dir,
            Containers::new(gateway),
            &self.confirm,
        )
    }
}

/// Dispatches the parsed CLI command to its handler.
///
/// # Errors
///
/// Returns an error if the command execution fails.
pub fn execute(cli: Cli) -> anyhow::Result<()> {
    let session = Session {
        config: cli.global.console_config(),
        confirm: TerminalConfirm::new(cli.global.yes),
        is_root: preflight::is_root(),
    };
    tracing::debug!(config = ?session.config, "session configuration");
    match cli.command {
        Command::Config(args) => config::execute(args, &session),
        Command::Migrate(args) => migrate::execute(args, &session),
        Command::Backup(args) => backup::execute(args, &session),
        Command::Restore(args) => restore::execute(args, &session),
    }
}
