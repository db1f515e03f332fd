//! # dockhand-backup
//!
//! Snapshots of container filesystems and of the runtime configuration
//! directory.
//!
//! Handles:
//! - **Snapshots**: naming, parsing and enumeration of snapshot files.
//! - **Archives**: compressed tarballs of the configuration directory.
//! - **Coordinator**: export, import, restore and deletion through the
//!   runtime gateway.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod archive;
pub mod clock;
pub mod coordinator;
pub mod snapshot;
