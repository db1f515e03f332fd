//! System-wide constants and default paths.

use std::path::PathBuf;
use std::sync::OnceLock;

/// Runtime command-line binary invoked by the gateway.
pub const DEFAULT_RUNTIME_BINARY: &str = "docker";

/// Control socket used to decide whether elevation is required.
pub const DEFAULT_SOCKET_PATH: &str = "/var/run/docker.sock";

/// Daemon configuration document.
pub const DEFAULT_DAEMON_CONFIG: &str = "/etc/docker/daemon.json";

/// Directory archived by configuration snapshots.
pub const DEFAULT_CONFIG_DIR: &str = "/etc/docker";

/// Data root assumed when the service cannot report one.
pub const DEFAULT_DATA_ROOT: &str = "/var/lib/docker";

/// Backup root used when no home directory is available.
pub const SYSTEM_BACKUP_DIR: &str = "/var/backups/dockhand";

/// Host service units stopped in this order and started in reverse.
pub const DEFAULT_SERVICE_UNITS: &[&str] = &["docker.socket", "docker"];

/// Suffix appended to the previous data root while a migration is in flight.
pub const STAGING_SUFFIX: &str = ".old";

/// Daemon configuration key holding the data root.
pub const DATA_ROOT_KEY: &str = "data-root";

/// Subject name used for configuration snapshots.
pub const CONFIG_SNAPSHOT_SUBJECT: &str = "docker_config";

/// `chrono` format of snapshot timestamp labels (`YYYYMMDD_HHMMSS`).
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Extension of container export snapshots.
pub const CONTAINER_SNAPSHOT_EXT: &str = "tar";

/// Extension of configuration snapshots.
pub const CONFIG_SNAPSHOT_EXT: &str = "tar.gz";

/// Application name used in CLI output.
pub const APP_NAME: &str = "dockhand";

/// Returns the backup root, preferring `$HOME/.docker_backups` and falling
/// back to [`SYSTEM_BACKUP_DIR`].
fn resolve_backup_dir() -> PathBuf {
    std::env::var("HOME").map_or_else(
        |_| PathBuf::from(SYSTEM_BACKUP_DIR),
        |home| PathBuf::from(home).join(".docker_backups"),
    )
}

static BACKUP_DIR: OnceLock<PathBuf> = OnceLock::new();

/// Returns the resolved backup root for this session.
pub fn backup_dir() -> &'static PathBuf {
    BACKUP_DIR.get_or_init(resolve_backup_dir)
}
