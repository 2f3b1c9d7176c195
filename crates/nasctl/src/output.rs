//! Human-readable and JSON rendering of command results.

use serde::Serialize;
use storage::batch::BatchOutcome;
use storage::discovery::NasHint;
use storage::tree::TransferReport;
use storage::{ConnectionProfile, FileEntry};

/// Print any serializable value as pretty JSON.
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Format a byte count with binary units.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

pub fn print_entries_table(entries: &[FileEntry]) {
    if entries.is_empty() {
        println!("(empty)");
        return;
    }

    let type_width = entries
        .iter()
        .map(|e| type_label(e).len())
        .max()
        .unwrap_or(4)
        .max(4);

    println!(
        "{:<type_width$}  {:>10}  NAME",
        "TYPE",
        "SIZE",
        type_width = type_width
    );
    println!("{}", "-".repeat(type_width + 18));

    for entry in entries {
        let size = if entry.is_directory {
            "-".to_string()
        } else {
            format_size(entry.size)
        };
        let name = if entry.is_directory {
            format!("{}/", entry.name)
        } else {
            entry.name.clone()
        };
        println!(
            "{:<type_width$}  {:>10}  {}",
            type_label(entry),
            size,
            name,
            type_width = type_width
        );
    }
}

fn type_label(entry: &FileEntry) -> String {
    if entry.is_directory {
        return "dir".to_string();
    }
    entry
        .file_type
        .as_ref()
        .map(|t| t.display_name.clone())
        .unwrap_or_else(|| "file".to_string())
}

pub fn print_paths(entries: &[FileEntry]) {
    if entries.is_empty() {
        println!("No matches.");
        return;
    }
    for entry in entries {
        if entry.is_directory {
            println!("{}/", entry.path);
        } else {
            println!("{}", entry.path);
        }
    }
}

/// Warn on stderr about directories a search could not read.
pub fn print_skipped(skipped: &[String]) {
    for dir in skipped {
        eprintln!("warning: not searched (permission denied): {dir}");
    }
}

pub fn print_profiles_table(profiles: &[ConnectionProfile]) {
    if profiles.is_empty() {
        println!("No saved connections.");
        return;
    }

    let name_width = profiles
        .iter()
        .map(|p| p.name.len())
        .max()
        .unwrap_or(4)
        .max(4);

    println!("  {:<name_width$}  TARGET", "NAME", name_width = name_width);
    println!("{}", "-".repeat(name_width + 30));
    for profile in profiles {
        let marker = if profile.is_default { '*' } else { ' ' };
        let share = if profile.share.is_empty() {
            String::new()
        } else {
            format!("/{}", profile.share)
        };
        println!(
            "{} {:<name_width$}  {}{}",
            marker,
            profile.name,
            profile.display_target(),
            share,
            name_width = name_width
        );
    }
}

pub fn print_hints(hints: &[NasHint]) {
    if hints.is_empty() {
        println!("No SMB servers found.");
        return;
    }
    for hint in hints {
        if hint.shares.is_empty() {
            println!("{}", hint.host);
        } else {
            println!("{}  [{}]", hint.host, hint.shares.join(", "));
        }
    }
}

pub fn print_batch(operation: &str, outcome: &BatchOutcome) {
    println!(
        "{operation}: {} succeeded, {} failed",
        outcome.succeeded,
        outcome.failed.len()
    );
    for failure in &outcome.failed {
        println!("  {}: {}", failure.path, failure.error);
    }
}

/// JSON body for a finished copy or move.
pub fn relocation_json(src: &str, dst: &str) -> serde_json::Value {
    serde_json::json!({ "src": src, "dst": dst })
}

pub fn print_relocation(verb: &str, src: &str, dst: &str, json: bool) -> anyhow::Result<()> {
    if json {
        print_json(&relocation_json(src, dst))
    } else {
        println!("{verb} {src} -> {dst}");
        Ok(())
    }
}

pub fn print_transfer(report: &TransferReport) {
    println!(
        "Transferred {} file(s), {} director{}, {}",
        report.files,
        report.directories,
        if report.directories == 1 { "y" } else { "ies" },
        format_size(report.bytes)
    );
    for checksum in &report.checksums {
        println!("  {}  {}", checksum.sha256, checksum.path);
    }
}
