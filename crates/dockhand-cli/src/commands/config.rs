//! `dockhand config` — Inspect and change the daemon configuration.

use anyhow::Context;
use clap::{Args, Subcommand};
use dockhand_common::confirm::Confirm;
use dockhand_common::error::DockhandError;
use dockhand_runtime::daemon_config::DaemonSetting;
use dockhand_runtime::service::ServiceControl;

use super::Session;

/// Arguments for the `config` command.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Configuration action.
    #[command(subcommand)]
    pub action: ConfigAction,
}

/// Configuration actions.
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the daemon configuration document.
    Show,
    /// Change one daemon setting, keeping every other key.
    ///
    /// Settings: log-level, storage-opts (comma separated), ipv6,
    /// default-runtime, log-driver, storage-driver, registry-mirror.
    Set {
        /// Setting name.
        setting: String,
        /// New value.
        value: String,
    },
    /// Restart the runtime so it rereads its configuration.
    Restart,
}

/// Executes the `config` command.
///
/// # Errors
///
/// Returns an error if the document cannot be read or written, or the
/// service cannot be restarted.
pub fn execute(args: ConfigArgs, session: &Session) -> anyhow::Result<()> {
    match args.action {
        ConfigAction::Show => show(session),
        ConfigAction::Set { setting, value } => set(session, &setting, &value),
        ConfigAction::Restart => restart(session),
    }
}

fn show(session: &Session) -> anyhow::Result<()> {
    let store = session.store();
    let doc = store.read()?;
    println!("# {}", store.path().display());
    println!("{}", serde_json::to_string_pretty(&doc)?);
    Ok(())
}

fn set(session: &Session, key: &str, value: &str) -> anyhow::Result<()> {
    session.require_root("daemon configuration change")?;
    let setting = DaemonSetting::parse(key, value)?;
    let store = session.store();
    let doc = store
        .apply(&setting)
        .with_context(|| format!("updating {}", setting.key()))?;
    println!(
        "Updated {} in {}:",
        setting.key(),
        store.path().display()
    );
    println!("{}", serde_json::to_string_pretty(&doc)?);

    if session
        .confirm
        .confirm("Restart the container runtime now to apply the change?")
    {
        restart_service(session)?;
    } else {
        println!("The change takes effect on the next runtime restart.");
    }
    Ok(())
}

fn restart(session: &Session) -> anyhow::Result<()> {
    if !session.confirm.confirm("Restart the container runtime?") {
        return Err(DockhandError::Cancelled {
            operation: "service restart".into(),
        }
        .into());
    }
    restart_service(session)
}

fn restart_service(session: &Session) -> anyhow::Result<()> {
    let service = session.service(session.gateway()?);
    service.restart().context("restarting the container runtime")?;
    println!("Container runtime restarted.");
    Ok(())
}
