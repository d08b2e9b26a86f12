//! Diagnostics module for Counter POS.
//!
//! Provides:
//! - **About info**: version, build timestamp, git SHA, platform
//! - **System health**: schema version, record counts per store, print failures
//! - **Diagnostics export**: about, health, a snapshot of every store and the
//!   log files, packed into a zip bundle.
//! - **Log rotation helpers**: used by `lib.rs` to configure rolling log files.

use crate::db::{self, DbState};
use crate::store::{read_json, Store, StoreKey};
use serde_json::{json, Value};
use std::fs;
use std::io::{Read as _, Write as _};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Maximum number of log files to retain.
pub const MAX_LOG_FILES: usize = 14;

/// Maximum size per log file copied into an export (5 MB).
pub const MAX_LOG_SIZE: u64 = 5 * 1024 * 1024;

/// Prefix of the rolling log files.
pub const LOG_FILE_PREFIX: &str = "pos";

#[derive(Debug, Clone, Copy)]
pub struct DiagnosticsExportOptions {
    pub include_logs: bool,
    /// Replace embedded image data with a size marker.
    pub strip_images: bool,
}

impl Default for DiagnosticsExportOptions {
    fn default() -> Self {
        Self {
            include_logs: true,
            strip_images: true,
        }
    }
}

/// Returns version, build timestamp, git SHA, and platform info.
pub fn get_about_info() -> Value {
    json!({
        "version": env!("CARGO_PKG_VERSION"),
        "buildTimestamp": env!("BUILD_TIMESTAMP"),
        "gitSha": env!("BUILD_GIT_SHA"),
        "platform": std::env::consts::OS,
        "arch": std::env::consts::ARCH,
    })
}

fn collection_len(db: &DbState, key: StoreKey) -> Result<usize, String> {
    let value = read_json(db, key).map_err(|e| e.to_string())?;
    Ok(value.as_array().map(Vec::len).unwrap_or(0))
}

/// Collects store counts and print history for the health screen.
pub fn get_system_health(db: &DbState) -> Result<Value, String> {
    let categories = collection_len(db, StoreKey::Categories)?;
    let items = collection_len(db, StoreKey::Items)?;
    let sales = collection_len(db, StoreKey::Sales)?;
    let settings_saved = db
        .load(StoreKey::Settings)
        .map_err(|e| e.to_string())?
        .is_some();

    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let schema_version = db::schema_version(&conn);
    let print_failures: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM print_attempts WHERE status = 'failed'",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);
    let last_print: Value = conn
        .query_row(
            "SELECT status, last_error, created_at FROM print_attempts
             ORDER BY created_at DESC LIMIT 1",
            [],
            |row| {
                Ok(json!({
                    "status": row.get::<_, String>(0)?,
                    "lastError": row.get::<_, Option<String>>(1)?,
                    "createdAt": row.get::<_, String>(2)?,
                }))
            },
        )
        .unwrap_or(Value::Null);

    Ok(json!({
        "schemaVersion": schema_version,
        "dbPath": db.db_path.to_string_lossy(),
        "counts": {
            "categories": categories,
            "items": items,
            "sales": sales,
        },
        "settingsSaved": settings_saved,
        "printFailures": print_failures,
        "lastPrint": last_print,
    }))
}

/// Replace `data:` URLs anywhere in `value` with a size marker.
fn strip_embedded_images(value: Value) -> Value {
    match value {
        Value::String(s) if s.starts_with("data:") => {
            Value::String(format!("<embedded image, {} bytes>", s.len()))
        }
        Value::Array(items) => Value::Array(items.into_iter().map(strip_embedded_images).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, strip_embedded_images(v)))
                .collect(),
        ),
        other => other,
    }
}

fn write_json_entry(
    zip: &mut zip::ZipWriter<fs::File>,
    name: &str,
    value: &Value,
    options: zip::write::SimpleFileOptions,
) -> Result<(), String> {
    let pretty = serde_json::to_string_pretty(value).map_err(|e| e.to_string())?;
    zip.start_file(name, options).map_err(|e| e.to_string())?;
    zip.write_all(pretty.as_bytes()).map_err(|e| e.to_string())
}

/// Collects diagnostics data and writes a zip file to `output_dir`.
/// Returns the path to the zip file.
pub fn export_diagnostics(
    db: &DbState,
    output_dir: &Path,
    log_dir: Option<&Path>,
    export_options: DiagnosticsExportOptions,
) -> Result<String, String> {
    fs::create_dir_all(output_dir).map_err(|e| format!("Failed to create export dir: {e}"))?;
    let timestamp = chrono::Utc::now().format("%Y%m%d_%H%M%S").to_string();
    let zip_path = output_dir.join(format!("counter-pos-diagnostics-{timestamp}.zip"));

    let file = fs::File::create(&zip_path)
        .map_err(|e| format!("Failed to create diagnostics zip: {e}"))?;
    let mut zip = zip::ZipWriter::new(file);
    let zip_options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);

    write_json_entry(&mut zip, "about.json", &get_about_info(), zip_options)?;
    write_json_entry(&mut zip, "system_health.json", &get_system_health(db)?, zip_options)?;

    for key in StoreKey::ALL {
        let mut snapshot = read_json(db, key).map_err(|e| e.to_string())?;
        if export_options.strip_images {
            snapshot = strip_embedded_images(snapshot);
        }
        write_json_entry(
            &mut zip,
            &format!("stores/{}.json", key.as_str()),
            &snapshot,
            zip_options,
        )?;
    }

    if let Some(log_dir) = log_dir.filter(|d| export_options.include_logs && d.exists()) {
        if let Ok(entries) = fs::read_dir(log_dir) {
            for entry in entries.flatten() {
                let path = entry.path();
                let Some(fname) = path.file_name().and_then(|n| n.to_str()) else {
                    continue;
                };
                if !fname.starts_with(LOG_FILE_PREFIX) {
                    continue;
                }
                if zip.start_file(format!("logs/{fname}"), zip_options).is_ok() {
                    if let Ok(f) = fs::File::open(&path) {
                        let mut buf = Vec::new();
                        let _ = f.take(MAX_LOG_SIZE).read_to_end(&mut buf);
                        let _ = zip.write_all(&buf);
                    }
                }
            }
        }
    }

    zip.finish().map_err(|e| e.to_string())?;
    info!(path = %zip_path.display(), "Diagnostics exported");

    Ok(zip_path.to_string_lossy().to_string())
}

// ---------------------------------------------------------------------------
// Log rotation
// ---------------------------------------------------------------------------

/// Log directory under the data dir (same location used by lib.rs).
pub fn get_log_dir(data_dir: &Path) -> PathBuf {
    data_dir.join("logs")
}

/// Prune old log files, keeping only the most recent `MAX_LOG_FILES`.
pub fn prune_old_logs(log_dir: &Path) {
    if !log_dir.exists() {
        return;
    }

    let mut log_files: Vec<(PathBuf, std::time::SystemTime)> = Vec::new();
    if let Ok(entries) = fs::read_dir(log_dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            let is_log = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(LOG_FILE_PREFIX));
            if path.is_file() && is_log {
                let modified = entry
                    .metadata()
                    .ok()
                    .and_then(|m| m.modified().ok())
                    .unwrap_or(std::time::UNIX_EPOCH);
                log_files.push((path, modified));
            }
        }
    }

    // Newest first
    log_files.sort_by(|a, b| b.1.cmp(&a.1));

    for (path, _) in log_files.iter().skip(MAX_LOG_FILES) {
        if let Err(e) = fs::remove_file(path) {
            warn!("Failed to prune log file {}: {e}", path.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog;

    fn temp_dir(label: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("{label}_{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_about_info_has_required_fields() {
        let info = get_about_info();
        for key in ["version", "buildTimestamp", "gitSha", "platform", "arch"] {
            assert!(info.get(key).is_some(), "missing {key}");
        }
    }

    #[test]
    fn test_system_health_counts_stores() {
        let db = db::init_in_memory();
        catalog::create_category(&db, "Dairy").unwrap();
        let health = get_system_health(&db).unwrap();
        assert_eq!(health["counts"]["categories"], 1);
        assert_eq!(health["counts"]["items"], 0);
        assert_eq!(health["settingsSaved"], false);
        assert_eq!(health["schemaVersion"], db::CURRENT_SCHEMA_VERSION);
        assert!(health["lastPrint"].is_null());
    }

    #[test]
    fn test_export_diagnostics_creates_zip() {
        let dir = temp_dir("diag_export");
        let db = db::init(&dir).unwrap();
        let log_dir = get_log_dir(&dir);
        fs::create_dir_all(&log_dir).unwrap();
        fs::write(log_dir.join("pos.2026-01-01"), "line").unwrap();

        let zip_path = export_diagnostics(
            &db,
            &dir.join("exports"),
            Some(&log_dir),
            DiagnosticsExportOptions::default(),
        )
        .unwrap();
        let file = fs::File::open(&zip_path).unwrap();
        let archive = zip::ZipArchive::new(file).unwrap();
        let names: Vec<&str> = archive.file_names().collect();
        assert!(names.contains(&"about.json"));
        assert!(names.contains(&"stores/pos-sales.json"));
        assert!(names.contains(&"logs/pos.2026-01-01"));
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_strip_embedded_images_recurses() {
        let value = json!({"logo": "data:image/png;base64,AAAA", "nested": [{"q": "data:x"}], "name": "Shop"});
        let stripped = strip_embedded_images(value);
        assert_eq!(stripped["logo"], "<embedded image, 26 bytes>");
        assert_eq!(stripped["nested"][0]["q"], "<embedded image, 6 bytes>");
        assert_eq!(stripped["name"], "Shop");
    }

    #[test]
    fn test_prune_keeps_newest_logs() {
        let dir = temp_dir("diag_prune");
        for n in 0..(MAX_LOG_FILES + 3) {
            fs::write(dir.join(format!("pos.{n:02}")), "x").unwrap();
        }
        fs::write(dir.join("other.txt"), "x").unwrap();
        prune_old_logs(&dir);
        let remaining = fs::read_dir(&dir).unwrap().count();
        assert_eq!(remaining, MAX_LOG_FILES + 1);
        let _ = fs::remove_dir_all(&dir);
    }
}
