//! Daemon configuration store.
//!
//! Read-modify-write access to the runtime's JSON configuration document.
//! Updates are merges: only the named key changes and every other key,
//! known or not, round-trips unchanged (key order included). Writes go to
//! a temporary file in the same directory which is then renamed over the
//! document, so readers never observe a partial file.

use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use dockhand_common::constants::DATA_ROOT_KEY;
use dockhand_common::error::{DockhandError, Result};
use dockhand_common::types::LogLevel;
use serde_json::{Map, Value, json};

/// The parsed configuration document.
pub type Document = Map<String, Value>;

/// Mode given to a newly created document.
const DEFAULT_MODE: u32 = 0o644;

/// Owner of the daemon configuration document.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    /// Creates a store for the document at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the document path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the document.
    ///
    /// A missing or empty file yields an empty document.
    ///
    /// # Errors
    ///
    /// Returns [`DockhandError::Parse`] if the file is not a JSON object,
    /// or [`DockhandError::Io`] if it cannot be read.
    pub fn read(&self) -> Result<Document> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Document::new()),
            Err(e) => return Err(DockhandError::io(&self.path, e)),
        };
        if text.trim().is_empty() {
            return Ok(Document::new());
        }
        serde_json::from_str(&text).map_err(|source| DockhandError::Parse {
            path: self.path.clone(),
            source,
        })
    }

    /// Merges `{key: value}` into the document and persists it.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be read, parsed, or written.
    pub fn update(&self, key: &str, value: Value) -> Result<Document> {
        tracing::info!(path = %self.path.display(), key, "updating daemon configuration");
        self.modify(|doc| {
            let _ = doc.insert(key.to_string(), value);
        })
    }

    /// Removes `key` from the document, returning its previous value.
    ///
    /// The file is left untouched when the key is absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be read, parsed, or written.
    pub fn remove(&self, key: &str) -> Result<Option<Value>> {
        let mut doc = self.read()?;
        let previous = doc.shift_remove(key);
        if previous.is_some() {
            tracing::info!(path = %self.path.display(), key, "removing daemon configuration key");
            self.write(&doc)?;
        }
        Ok(previous)
    }

    /// Applies a typed setting.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be read, parsed, or written.
    pub fn apply(&self, setting: &DaemonSetting) -> Result<Document> {
        tracing::info!(path = %self.path.display(), key = setting.key(), "applying daemon setting");
        self.modify(|doc| setting.merge_into(doc))
    }

    fn modify(&self, change: impl FnOnce(&mut Document)) -> Result<Document> {
        let mut doc = self.read()?;
        change(&mut doc);
        self.write(&doc)?;
        Ok(doc)
    }

    fn write(&self, doc: &Document) -> Result<()> {
        let write_err = |source| DockhandError::Write {
            path: self.path.clone(),
            source,
        };
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir).map_err(write_err)?;

        let mode = std::fs::metadata(&self.path).map_or(DEFAULT_MODE, |m| m.permissions().mode() & 0o7777);
        let mut body = serde_json::to_vec_pretty(doc)?;
        body.push(b'\n');

        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(write_err)?;
        tmp.write_all(&body).map_err(write_err)?;
        tmp.as_file().sync_all().map_err(write_err)?;
        std::fs::set_permissions(tmp.path(), std::fs::Permissions::from_mode(mode))
            .map_err(write_err)?;
        let _ = tmp.persist(&self.path).map_err(|e| write_err(e.error))?;
        tracing::debug!(path = %self.path.display(), "daemon configuration written");
        Ok(())
    }
}

/// A typed change to the daemon configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DaemonSetting {
    /// `log-level`.
    LogLevel(LogLevel),
    /// `storage-opts`, e.g. `dm.basesize=20G`.
    StorageOpts(Vec<String>),
    /// `ipv6`.
    Ipv6(bool),
    /// `default-runtime`.
    DefaultRuntime(String),
    /// `log-driver`; `json-file` also sets rotation `log-opts`.
    LogDriver(String),
    /// `storage-driver`.
    StorageDriver(String),
    /// One entry appended to `registry-mirrors`.
    RegistryMirror(String),
}

const RUNTIMES: &[&str] = &["runc", "containerd"];
const LOG_DRIVERS: &[&str] = &["json-file", "local", "syslog"];
const STORAGE_DRIVERS: &[&str] = &["overlay2", "devicemapper", "btrfs"];

impl DaemonSetting {
    /// Parses a setting from operator input.
    ///
    /// `data-root` is rejected: relocating the data root requires a
    /// migration, not a bare key change.
    ///
    /// # Errors
    ///
    /// Returns [`DockhandError::Validation`] for unknown keys or values.
    pub fn parse(key: &str, value: &str) -> Result<Self> {
        let value = value.trim();
        match key {
            "log-level" => Ok(Self::LogLevel(value.parse()?)),
            "storage-opts" => Ok(Self::StorageOpts(
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(ToString::to_string)
                    .collect(),
            )),
            "ipv6" => value.parse().map(Self::Ipv6).map_err(|_| DockhandError::Validation {
                message: format!("ipv6 expects true or false, got {value:?}"),
            }),
            "default-runtime" => choose(key, value, RUNTIMES).map(Self::DefaultRuntime),
            "log-driver" => choose(key, value, LOG_DRIVERS).map(Self::LogDriver),
            "storage-driver" => choose(key, value, STORAGE_DRIVERS).map(Self::StorageDriver),
            "registry-mirror" if value.is_empty() => Err(DockhandError::Validation {
                message: "registry mirror URL is empty".into(),
            }),
            "registry-mirror" => Ok(Self::RegistryMirror(value.to_string())),
            DATA_ROOT_KEY => Err(DockhandError::Validation {
                message: "data-root can only be changed with a migration".into(),
            }),
            other => Err(DockhandError::Validation {
                message: format!("unknown daemon setting {other:?}"),
            }),
        }
    }

    /// Returns the document key this setting writes.
    #[must_use]
    pub const fn key(&self) -> &'static str {
        match self {
            Self::LogLevel(_) => "log-level",
            Self::StorageOpts(_) => "storage-opts",
            Self::Ipv6(_) => "ipv6",
            Self::DefaultRuntime(_) => "default-runtime",
            Self::LogDriver(_) => "log-driver",
            Self::StorageDriver(_) => "storage-driver",
            Self::RegistryMirror(_) => "registry-mirrors",
        }
    }

    fn merge_into(&self, doc: &mut Document) {
        let value = match self {
            Self::LogLevel(level) => json!(level.as_str()),
            Self::StorageOpts(opts) => json!(opts),
            Self::Ipv6(enabled) => json!(enabled),
            Self::DefaultRuntime(name) | Self::StorageDriver(name) => json!(name),
            Self::LogDriver(driver) => {
                if driver == "json-file" {
                    let _ = doc.insert(
                        "log-opts".into(),
                        json!({ "max-size": "10m", "max-file": "3" }),
                    );
                }
                json!(driver)
            }
            Self::RegistryMirror(url) => {
                let mut mirrors = match doc.get(self.key()) {
                    Some(Value::Array(items)) => items.clone(),
                    _ => Vec::new(),
                };
                if !mirrors.iter().any(|m| m.as_str() == Some(url)) {
                    mirrors.push(json!(url));
                }
                Value::Array(mirrors)
            }
        };
        let _ = doc.insert(self.key().to_string(), value);
    }
}

fn choose(key: &str, value: &str, allowed: &[&str]) -> Result<String> {
    if allowed.contains(&value) {
        Ok(value.to_string())
    } else {
        Err(DockhandError::Validation {
            message: format!("{key} must be one of {}, got {value:?}", allowed.join("|")),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with(content: Option<&str>) -> (tempfile::TempDir, ConfigStore) {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("daemon.json");
        if let Some(content) = content {
            std::fs::write(&path, content).expect("seed");
        }
        (dir, ConfigStore::new(path))
    }

    #[test]
    fn read_missing_file_is_empty_document() {
        let (_dir, store) = store_with(None);
        assert!(store.read().expect("read").is_empty());
    }

    #[test]
    fn read_empty_file_is_empty_document() {
        let (_dir, store) = store_with(Some("  \n"));
        assert!(store.read().expect("read").is_empty());
    }

    #[test]
    fn read_malformed_file_is_parse_error() {
        let (_dir, store) = store_with(Some("{ not json"));
        assert!(matches!(store.read(), Err(DockhandError::Parse { .. })));
    }

    #[test]
    fn read_non_object_is_parse_error() {
        let (_dir, store) = store_with(Some("[1, 2]"));
        assert!(matches!(store.read(), Err(DockhandError::Parse { .. })));
    }

    #[test]
    fn update_merges_into_existing_document() {
        let (_dir, store) = store_with(Some(r#"{"log-level":"info"}"#));
        let _ = store.update("ipv6", json!(true)).expect("update");
        let doc = store.read().expect("read");
        assert_eq!(Value::Object(doc), json!({"log-level": "info", "ipv6": true}));
    }

    #[test]
    fn update_preserves_unknown_keys_verbatim() {
        let original = r#"{"experimental":{"nested":[1,2,{"x":null}]},"dns":["1.1.1.1"],"log-level":"warn"}"#;
        let (_dir, store) = store_with(Some(original));
        let before: Document = serde_json::from_str(original).unwrap();

        let _ = store.update("log-level", json!("debug")).expect("update");
        let after = store.read().expect("read");

        for (key, value) in &before {
            if key != "log-level" {
                assert_eq!(after.get(key), Some(value), "key {key} changed");
            }
        }
        let keys: Vec<_> = after.keys().cloned().collect();
        assert_eq!(keys, vec!["experimental", "dns", "log-level"]);
    }

    #[test]
    fn update_is_idempotent() {
        let (_dir, store) = store_with(Some(r#"{"a":1}"#));
        let _ = store.update("storage-opts", json!(["dm.basesize=20G"])).expect("first");
        let once = std::fs::read(store.path()).unwrap();
        let _ = store.update("storage-opts", json!(["dm.basesize=20G"])).expect("second");
        let twice = std::fs::read(store.path()).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn update_creates_missing_document_and_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ConfigStore::new(dir.path().join("etc/docker/daemon.json"));
        let _ = store.update("data-root", json!("/mnt/data")).expect("update");
        assert_eq!(
            store.read().unwrap().get("data-root"),
            Some(&json!("/mnt/data"))
        );
    }

    #[test]
    fn update_leaves_no_temporary_files_behind() {
        let (dir, store) = store_with(Some("{}"));
        let _ = store.update("ipv6", json!(false)).expect("update");
        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn update_keeps_existing_file_mode() {
        let (_dir, store) = store_with(Some("{}"));
        std::fs::set_permissions(store.path(), std::fs::Permissions::from_mode(0o600)).unwrap();
        let _ = store.update("ipv6", json!(true)).expect("update");
        let mode = std::fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn update_refuses_to_clobber_malformed_document() {
        let (_dir, store) = store_with(Some("{ broken"));
        assert!(store.update("ipv6", json!(true)).is_err());
        assert_eq!(std::fs::read_to_string(store.path()).unwrap(), "{ broken");
    }

    #[test]
    fn remove_drops_only_the_named_key() {
        let (_dir, store) = store_with(Some(r#"{"data-root":"/mnt","ipv6":true}"#));
        let prev = store.remove("data-root").expect("remove");
        assert_eq!(prev, Some(json!("/mnt")));
        assert_eq!(Value::Object(store.read().unwrap()), json!({"ipv6": true}));
        assert_eq!(store.remove("data-root").expect("absent"), None);
    }

    #[test]
    fn json_file_log_driver_sets_rotation_options() {
        let (_dir, store) = store_with(None);
        let setting = DaemonSetting::parse("log-driver", "json-file").expect("parse");
        let doc = store.apply(&setting).expect("apply");
        assert_eq!(doc.get("log-driver"), Some(&json!("json-file")));
        assert_eq!(
            doc.get("log-opts"),
            Some(&json!({"max-size": "10m", "max-file": "3"}))
        );
    }

    #[test]
    fn registry_mirror_appends_without_duplicates() {
        let (_dir, store) = store_with(Some(r#"{"registry-mirrors":["https://a.example"]}"#));
        let b = DaemonSetting::parse("registry-mirror", "https://b.example").unwrap();
        let _ = store.apply(&b).expect("first");
        let doc = store.apply(&b).expect("second");
        assert_eq!(
            doc.get("registry-mirrors"),
            Some(&json!(["https://a.example", "https://b.example"]))
        );
    }

    #[test]
    fn parse_rejects_unknown_values_and_data_root() {
        assert!(DaemonSetting::parse("log-level", "loud").is_err());
        assert!(DaemonSetting::parse("ipv6", "yes").is_err());
        assert!(DaemonSetting::parse("storage-driver", "zfs").is_err());
        assert!(DaemonSetting::parse("data-root", "/mnt").is_err());
        assert!(DaemonSetting::parse("mystery", "x").is_err());
    }

    #[test]
    fn parse_splits_storage_opts() {
        let setting = DaemonSetting::parse("storage-opts", "dm.basesize=20G, dm.fs=xfs").unwrap();
        assert_eq!(
            setting,
            DaemonSetting::StorageOpts(vec!["dm.basesize=20G".into(), "dm.fs=xfs".into()])
        );
    }
}
