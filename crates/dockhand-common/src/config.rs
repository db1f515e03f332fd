//! Console configuration model.
//!
//! Holds the host paths and unit names the console operates on. Every
//! field has a default matching a stock Docker installation and can be
//! overridden from the command line.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::constants;

/// Root configuration for a console session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsoleConfig {
    /// Runtime command-line binary.
    pub runtime_binary: String,
    /// Control socket probed to select the privilege mode.
    pub socket_path: PathBuf,
    /// Daemon configuration document.
    pub daemon_config: PathBuf,
    /// Directory captured by configuration snapshots.
    pub config_dir: PathBuf,
    /// Directory holding snapshot artifacts.
    pub backup_dir: PathBuf,
    /// Host service units, in stop order.
    pub service_units: Vec<String>,
    /// Data root assumed when the service cannot report one.
    pub fallback_data_root: PathBuf,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            runtime_binary: constants::DEFAULT_RUNTIME_BINARY.to_string(),
            socket_path: PathBuf::from(constants::DEFAULT_SOCKET_PATH),
            daemon_config: PathBuf::from(constants::DEFAULT_DAEMON_CONFIG),
            config_dir: PathBuf::from(constants::DEFAULT_CONFIG_DIR),
            backup_dir: constants::backup_dir().clone(),
            service_units: constants::DEFAULT_SERVICE_UNITS
                .iter()
                .map(ToString::to_string)
                .collect(),
            fallback_data_root: PathBuf::from(constants::DEFAULT_DATA_ROOT),
        }
    }
}
