//! Container enumeration and the export/import primitives used by backups.

use std::path::Path;

use dockhand_common::error::{DockhandError, Result};
use dockhand_common::types::ContainerName;

use crate::gateway::RuntimeGateway;

/// Container-level operations delegated to the runtime.
#[derive(Debug, Clone)]
pub struct Containers {
    gateway: RuntimeGateway,
}

impl Containers {
    /// Creates a container facade over `gateway`.
    #[must_use]
    pub const fn new(gateway: RuntimeGateway) -> Self {
        Self { gateway }
    }

    /// Returns the gateway used for invocations.
    #[must_use]
    pub const fn gateway(&self) -> &RuntimeGateway {
        &self.gateway
    }

    /// Lists the names of all containers, running or not.
    ///
    /// Lines the runtime prints that are not valid names are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the listing command fails.
    pub fn names(&self) -> Result<Vec<ContainerName>> {
        let out = self.gateway.invoke(&["ps", "-a", "--format", "{{.Names}}"])?;
        Ok(out
            .stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .filter_map(|line| match ContainerName::parse(line) {
                Ok(name) => Some(name),
                Err(e) => {
                    tracing::warn!(line, error = %e, "skipping unparseable container name");
                    None
                }
            })
            .collect())
    }

    /// Returns whether a container with `name` exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the listing command fails.
    pub fn exists(&self, name: &ContainerName) -> Result<bool> {
        Ok(self.names()?.iter().any(|n| n == name))
    }

    /// Exports the container's filesystem to `dest`.
    ///
    /// # Errors
    ///
    /// Returns an error if the export command fails.
    pub fn export(&self, name: &ContainerName, dest: &Path) -> Result<()> {
        let dest = path_arg(dest)?;
        tracing::info!(container = %name, dest, "exporting container");
        let _ = self.gateway.invoke(&["export", "-o", dest, name.as_str()])?;
        Ok(())
    }

    /// Imports an exported filesystem as image `reference`, returning the
    /// new image id.
    ///
    /// # Errors
    ///
    /// Returns an error if the import command fails.
    pub fn import(&self, archive: &Path, reference: &str) -> Result<String> {
        let archive = path_arg(archive)?;
        tracing::info!(archive, reference, "importing snapshot");
        let out = self.gateway.invoke(&["import", archive, reference])?;
        Ok(out.stdout.trim().to_string())
    }

    /// Creates (without starting) a container named `name` from `image`.
    ///
    /// # Errors
    ///
    /// Returns an error if the create command fails.
    pub fn create(&self, name: &ContainerName, image: &str, command: &[String]) -> Result<String> {
        let mut args = vec!["create", "--name", name.as_str(), image];
        args.extend(command.iter().map(String::as_str));
        tracing::info!(container = %name, image, "creating container");
        let out = self.gateway.invoke(&args)?;
        Ok(out.stdout.trim().to_string())
    }
}

fn path_arg(path: &Path) -> Result<&str> {
    path.to_str().ok_or_else(|| DockhandError::Validation {
        message: format!("path is not valid UTF-8: {}", path.display()),
    })
}
