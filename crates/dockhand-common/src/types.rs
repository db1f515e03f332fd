//! Domain primitive types used across the dockhand workspace.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{DockhandError, Result};

/// Name of a container as understood by the runtime.
///
/// Names follow the runtime's rule: an ASCII alphanumeric first character
/// followed by alphanumerics, `_`, `.` or `-`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContainerName(String);

impl ContainerName {
    /// Validates and wraps a container name.
    ///
    /// # Errors
    ///
    /// Returns [`DockhandError::Validation`] if the name is empty or
    /// contains characters the runtime rejects.
    pub fn parse(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let mut chars = name.chars();
        let valid_head = chars.next().is_some_and(|c| c.is_ascii_alphanumeric());
        let valid_tail = chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'));
        if !valid_head || !valid_tail {
            return Err(DockhandError::Validation {
                message: format!("invalid container name: {name:?}"),
            });
        }
        Ok(Self(name))
    }

    /// Returns the inner string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Daemon log verbosity, stored under `log-level`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Debug output.
    Debug,
    /// Informational output (daemon default).
    Info,
    /// Warnings only.
    Warn,
    /// Errors only.
    Error,
}

impl LogLevel {
    /// Returns the value as written to the daemon configuration.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = DockhandError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            other => Err(DockhandError::Validation {
                message: format!("unknown log level {other:?} (expected debug|info|warn|error)"),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn container_name_accepts_runtime_names() {
        for name in ["web1", "my_app", "db.primary", "a-b-c", "X"] {
            assert!(ContainerName::parse(name).is_ok(), "{name} should be valid");
        }
    }

    #[test]
    fn container_name_rejects_bad_names() {
        for name in ["", "-web", "_x", "has space", "slash/name"] {
            assert!(ContainerName::parse(name).is_err(), "{name} should be rejected");
        }
    }

    #[test]
    fn log_level_parses_and_displays() {
        let level: LogLevel = "warn".parse().expect("parse");
        assert_eq!(level, LogLevel::Warn);
        assert_eq!(level.to_string(), "warn");
        assert!("verbose".parse::<LogLevel>().is_err());
    }

    #[test]
    fn log_level_serializes_lowercase() {
        let json = serde_json::to_string(&LogLevel::Error).expect("serialize");
        assert_eq!(json, "\"error\"");
    }
}
