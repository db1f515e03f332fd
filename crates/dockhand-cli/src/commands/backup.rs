//! `dockhand backup` — Snapshot containers and configuration.

use anyhow::bail;
use clap::{Args, Subcommand};
use dockhand_backup::snapshot::{self, Snapshot};
use dockhand_common::types::ContainerName;

use super::Session;
use crate::output::{format_bytes, snapshot_table};

/// Arguments for the `backup` command.
#[derive(Args, Debug)]
pub struct BackupArgs {
    /// Backup action.
    #[command(subcommand)]
    pub action: BackupAction,
}

/// Backup actions.
#[derive(Subcommand, Debug)]
pub enum BackupAction {
    /// Export one container's filesystem.
    Container {
        /// Container name.
        name: String,
    },
    /// Export every container, continuing past failures.
    All,
    /// Archive the runtime configuration directory.
    Config,
    /// List snapshots in the backup directory.
    List,
    /// Permanently delete a snapshot.
    Delete {
        /// Snapshot id, as shown by `backup list`.
        id: String,
    },
}

/// Executes the `backup` command.
///
/// # Errors
///
/// Returns an error if a snapshot cannot be written, listed or deleted.
pub fn execute(args: BackupArgs, session: &Session) -> anyhow::Result<()> {
    match args.action {
        BackupAction::Container { name } => {
            let name = ContainerName::parse(name)?;
            let coordinator = session.coordinator(session.live_gateway()?);
            let snapshot = coordinator.snapshot_container(&name)?;
            report_written(&snapshot);
        }
        BackupAction::All => {
            let coordinator = session.coordinator(session.live_gateway()?);
            let tally = coordinator.snapshot_all()?;
            for snapshot in &tally.snapshots {
                report_written(snapshot);
            }
            for (name, err) in &tally.failures {
                println!("Failed {name}: {err}");
            }
            println!(
                "{}/{} containers backed up to {}.",
                tally.succeeded(),
                tally.total,
                coordinator.root().display()
            );
            if !tally.failures.is_empty() {
                bail!("{} of {} snapshots failed", tally.failures.len(), tally.total);
            }
        }
        BackupAction::Config => {
            let coordinator = session.coordinator(session.gateway()?);
            let snapshot = coordinator.snapshot_config()?;
            report_written(&snapshot);
        }
        BackupAction::List => {
            let snapshots = snapshot::list(&session.config.backup_dir)?;
            if snapshots.is_empty() {
                println!("No snapshots in {}.", session.config.backup_dir.display());
            } else {
                print!("{}", snapshot_table(&snapshots));
            }
        }
        BackupAction::Delete { id } => {
            let coordinator = session.coordinator(session.gateway()?);
            let deleted = coordinator.delete_snapshot(&id)?;
            println!("Deleted {}.", deleted.path.display());
        }
    }
    Ok(())
}

fn report_written(snapshot: &Snapshot) {
    let size = snapshot.size().map_or_else(|_| "?".into(), format_bytes);
    println!("Snapshot written: {} ({size})", snapshot.path.display());
}
