//! Formatted output helpers for CLI commands.
//!
//! Provides snapshot tables and human-readable byte formatting.

use std::fmt::Write;

use dockhand_backup::snapshot::Snapshot;
use dockhand_common::constants::TIMESTAMP_FORMAT;

/// Formats a byte count into a human-readable string (e.g., "128 MiB").
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = KIB * 1024;
    const GIB: u64 = MIB * 1024;

    if bytes >= GIB {
        format!("{:.1} GiB", bytes as f64 / GIB as f64)
    } else if bytes >= MIB {
        format!("{:.1} MiB", bytes as f64 / MIB as f64)
    } else if bytes >= KIB {
        format!("{:.1} KiB", bytes as f64 / KIB as f64)
    } else {
        format!("{bytes} B")
    }
}

/// Renders snapshots as an aligned table, one row per snapshot.
///
/// Sizes that cannot be read show as `?`.
#[must_use]
pub fn snapshot_table(snapshots: &[Snapshot]) -> String {
    let rows: Vec<[String; 4]> = snapshots
        .iter()
        .map(|s| {
            [
                s.id(),
                s.kind.to_string(),
                s.label.format(TIMESTAMP_FORMAT).to_string(),
                s.size().map_or_else(|_| "?".to_string(), format_bytes),
            ]
        })
        .collect();
    let id_width = rows
        .iter()
        .map(|r| r[0].len())
        .max()
        .unwrap_or(0)
        .max("SNAPSHOT".len());

    let mut table = format!("{:<id_width$}  {:<9}  {:<15}  SIZE\n", "SNAPSHOT", "KIND", "TAKEN");
    for [id, kind, taken, size] in rows {
        let _ = writeln!(table, "{id:<id_width$}  {kind:<9}  {taken:<15}  {size}");
    }
    table
}
