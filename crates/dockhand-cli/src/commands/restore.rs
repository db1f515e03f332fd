//! `dockhand restore` — Restore from a snapshot.

use clap::{Args, Subcommand};
use dockhand_common::types::ContainerName;

use super::Session;

/// Arguments for the `restore` command.
#[derive(Args, Debug)]
pub struct RestoreArgs {
    /// Restore action.
    #[command(subcommand)]
    pub action: RestoreAction,
}

/// Restore actions.
#[derive(Subcommand, Debug)]
pub enum RestoreAction {
    /// Create a new container from a container snapshot.
    Container {
        /// Snapshot id or path.
        snapshot: String,
        /// Name of the new container; must not exist yet.
        new_name: String,
        /// Command the new container runs (default `sh`).
        #[arg(last = true)]
        command: Vec<String>,
    },
    /// Overwrite the configuration directory from a configuration snapshot.
    ///
    /// The runtime is not restarted.
    Config {
        /// Snapshot id or path.
        snapshot: String,
    },
}

/// Executes the `restore` command.
///
/// # Errors
///
/// Returns an error if the snapshot is missing, the name is taken, or the
/// runtime rejects the import.
pub fn execute(args: RestoreArgs, session: &Session) -> anyhow::Result<()> {
    match args.action {
        RestoreAction::Container {
            snapshot,
            new_name,
            command,
        } => {
            let new_name = ContainerName::parse(new_name)?;
            let coordinator = session.coordinator(session.live_gateway()?);
            let path = coordinator.resolve(&snapshot)?;
            let id = coordinator.restore_container(&path, &new_name, &command)?;
            println!("Container {new_name} created ({id}); start it with `docker start {new_name}`.");
        }
        RestoreAction::Config { snapshot } => {
            session.require_root("configuration restore")?;
            let coordinator = session.coordinator(session.gateway()?);
            let path = coordinator.resolve(&snapshot)?;
            let entries = coordinator.restore_config(&path)?;
            println!(
                "Restored {entries} entries into {}. Restart the runtime to apply: dockhand config restart",
                session.config.config_dir.display()
            );
        }
    }
    Ok(())
}
