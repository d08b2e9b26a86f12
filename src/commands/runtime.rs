use serde_json::{json, Value};

use crate::AppState;

pub fn app_get_version() -> Result<Value, String> {
    Ok(json!({ "version": env!("CARGO_PKG_VERSION") }))
}

/// Where this process keeps its store, logs and staged receipts.
pub fn app_get_paths(state: &AppState) -> Result<Value, String> {
    Ok(json!({
        "dataDir": state.data_dir.to_string_lossy(),
        "database": state.db.db_path.to_string_lossy(),
        "logs": crate::diagnostics::get_log_dir(&state.data_dir).to_string_lossy(),
    }))
}
