//! Managed service control.
//!
//! Start/stop/restart go through the host service manager; the active
//! data root is read back from the runtime itself.

use dockhand_common::error::Result;

use crate::gateway::RuntimeGateway;

/// Control over the runtime daemon as a host service.
pub trait ServiceControl {
    /// Stops the service.
    ///
    /// # Errors
    ///
    /// Returns an error if any unit fails to stop.
    fn stop(&self) -> Result<()>;

    /// Starts the service.
    ///
    /// # Errors
    ///
    /// Returns an error if any unit fails to start.
    fn start(&self) -> Result<()>;

    /// Restarts the service so it rereads its configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the restart fails.
    fn restart(&self) -> Result<()>;

    /// Returns the data root reported by the running service, trimmed.
    ///
    /// # Errors
    ///
    /// Returns an error if the service does not answer.
    fn data_root(&self) -> Result<String>;
}

/// Service controlled through `systemctl`.
///
/// Units are stopped in the configured order (socket first, so socket
/// activation cannot respawn the daemon) and started in reverse.
#[derive(Debug, Clone)]
pub struct SystemdService {
    gateway: RuntimeGateway,
    units: Vec<String>,
}

impl SystemdService {
    /// Creates a controller for `units`, listed in stop order.
    #[must_use]
    pub const fn new(gateway: RuntimeGateway, units: Vec<String>) -> Self {
        Self { gateway, units }
    }

    fn systemctl(&self, verb: &str, unit: &str) -> Result<()> {
        tracing::info!(verb, unit, "systemctl");
        let _ = self.gateway.run_host("systemctl", &[verb, unit])?;
        Ok(())
    }
}

impl ServiceControl for SystemdService {
    fn stop(&self) -> Result<()> {
        for unit in &self.units {
            self.systemctl("stop", unit)?;
        }
        Ok(())
    }

    fn start(&self) -> Result<()> {
        for unit in self.units.iter().rev() {
            self.systemctl("start", unit)?;
        }
        Ok(())
    }

    fn restart(&self) -> Result<()> {
        match self.units.last() {
            Some(primary) => self.systemctl("restart", primary),
            None => Ok(()),
        }
    }

    fn data_root(&self) -> Result<String> {
        let out = self
            .gateway
            .invoke(&["info", "--format", "{{.DockerRootDir}}"])?;
        Ok(out.stdout.trim().to_string())
    }
}
