//! `dockhand migrate` — Move the runtime's data root.

use std::path::PathBuf;

use clap::Args;
use dockhand_runtime::fs::LocalFs;
use dockhand_runtime::migration::{MigrationEngine, MigrationOutcome, OldDataPolicy};

use super::Session;
use crate::output::format_bytes;

/// Arguments for the `migrate` command.
#[derive(Args, Debug)]
pub struct MigrateArgs {
    /// New data root directory.
    pub target: PathBuf,

    /// Delete the old data after a verified migration without asking.
    #[arg(long, conflicts_with = "keep_old")]
    pub delete_old: bool,

    /// Keep the old data after a verified migration without asking.
    #[arg(long)]
    pub keep_old: bool,
}

impl MigrateArgs {
    const fn old_data_policy(&self) -> OldDataPolicy {
        if self.delete_old {
            OldDataPolicy::Delete
        } else if self.keep_old {
            OldDataPolicy::Keep
        } else {
            OldDataPolicy::Ask
        }
    }
}

/// Executes the `migrate` command.
///
/// # Errors
///
/// Returns an error if the plan is rejected, the migration was rolled
/// back, or the rollback itself failed.
pub fn execute(args: MigrateArgs, session: &Session) -> anyhow::Result<()> {
    session.require_root("data-root migration")?;
    let service = session.service(session.live_gateway()?);
    let store = session.store();

    let mut engine = MigrationEngine::new(
        &store,
        &service,
        &LocalFs,
        &session.confirm,
        &session.config.fallback_data_root,
    )
    .with_old_data_policy(args.old_data_policy())
    .with_observer(|state| println!("  -> {state}"));

    let report = engine.migrate(&args.target)?;
    drop(engine);

    if let Some(stats) = &report.sync {
        println!(
            "Copied {} files ({}), {} unchanged, {} links, {} special files, {} stale entries removed.",
            stats.files_copied,
            format_bytes(stats.bytes_copied),
            stats.files_skipped,
            stats.links,
            stats.specials,
            stats.pruned
        );
    }
    match report.outcome {
        MigrationOutcome::Complete {
            old_data_deleted,
            warnings,
        } => {
            println!("Data root is now {}.", report.plan.target.display());
            if old_data_deleted {
                println!("Old data at {} deleted.", report.plan.staging.display());
            } else {
                println!("Old data kept at {}.", report.plan.staging.display());
            }
            print_warnings(&warnings);
            Ok(())
        }
        MigrationOutcome::RolledBack { cause, warnings } => {
            print_warnings(&warnings);
            Err(anyhow::Error::new(cause).context(format!(
                "migration rolled back, data root is still {}",
                report.plan.previous.display()
            )))
        }
    }
}

fn print_warnings(warnings: &[String]) {
    for warning in warnings {
        println!("warning: {warning}");
    }
}
