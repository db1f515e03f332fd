//! Migration plans and path normalization.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use dockhand_common::constants::STAGING_SUFFIX;
use dockhand_common::error::{DockhandError, Result};
use path_absolutize::Absolutize;
use serde_json::Value;

/// One validated data-root change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationPlan {
    /// Normalized absolute target path.
    pub target: PathBuf,
    /// Data root reported by the service before the change.
    pub previous: PathBuf,
    /// Where the old tree is parked until the change is verified.
    pub staging: PathBuf,
    /// Whether the engine created the target directory.
    pub created_target: bool,
    /// The `data-root` value present before the change, if any.
    pub prior_data_root: Option<Value>,
}

impl MigrationPlan {
    /// Returns the target as written to the configuration document.
    #[must_use]
    pub fn target_str(&self) -> String {
        self.target.to_string_lossy().into_owned()
    }
}

/// Normalizes a data-root path for exact comparison.
///
/// Surrounding whitespace is trimmed, the path is made absolute, and `.`,
/// `..` and trailing separators are resolved lexically. Symlinks are not
/// followed.
///
/// # Errors
///
/// Returns [`DockhandError::Validation`] for an empty path.
pub fn normalize_root(raw: &str) -> Result<PathBuf> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(DockhandError::Validation {
            message: "data root path is empty".into(),
        });
    }
    let absolute = Path::new(trimmed)
        .absolutize()
        .map_err(|e| DockhandError::io(trimmed, e))?;
    Ok(absolute.into_owned())
}

/// Returns the side location for the old tree: `<previous>.old`.
#[must_use]
pub fn staging_path(previous: &Path) -> PathBuf {
    let mut staged = OsString::from(previous.as_os_str());
    staged.push(STAGING_SUFFIX);
    PathBuf::from(staged)
}
