//! Runtime control for the dockhand console.
//!
//! Wraps the container runtime's command-line interface behind a single
//! gateway, owns the daemon configuration document, and implements the
//! data-root migration state machine with its rollback path.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod command;
pub mod containers;
pub mod daemon_config;
pub mod fs;
pub mod gateway;
pub mod migration;
pub mod preflight;
pub mod service;
