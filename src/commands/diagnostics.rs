use serde_json::Value;

use crate::{diagnostics, AppState};

fn parse_diagnostics_export_payload(arg0: Option<Value>) -> diagnostics::DiagnosticsExportOptions {
    let mut options = diagnostics::DiagnosticsExportOptions::default();

    match arg0 {
        Some(Value::Bool(include_logs)) => {
            options.include_logs = include_logs;
        }
        Some(Value::Object(obj)) => {
            if let Some(include_logs) = obj
                .get("includeLogs")
                .or_else(|| obj.get("include_logs"))
                .or_else(|| obj.get("logs"))
                .and_then(|v| v.as_bool())
            {
                options.include_logs = include_logs;
            }
            if let Some(strip_images) = obj
                .get("stripImages")
                .or_else(|| obj.get("strip_images"))
                .and_then(|v| v.as_bool())
            {
                options.strip_images = strip_images;
            }
        }
        _ => {}
    }

    options
}

pub fn diagnostics_get_about() -> Result<Value, String> {
    Ok(diagnostics::get_about_info())
}

pub fn diagnostics_get_system_health(state: &AppState) -> Result<Value, String> {
    diagnostics::get_system_health(&state.db)
}

pub fn diagnostics_export(arg0: Option<Value>, state: &AppState) -> Result<Value, String> {
    let options = parse_diagnostics_export_payload(arg0);
    let log_dir = diagnostics::get_log_dir(&state.data_dir);
    let zip_path = diagnostics::export_diagnostics(
        &state.db,
        &state.data_dir.join("exports"),
        Some(&log_dir),
        options,
    )?;
    Ok(serde_json::json!({
        "success": true,
        "path": zip_path,
        "options": {
            "includeLogs": options.include_logs,
            "stripImages": options.strip_images,
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_diagnostics_export_payload_supports_defaults_and_bool_form() {
        let defaults = parse_diagnostics_export_payload(None);
        let from_bool = parse_diagnostics_export_payload(Some(json!(false)));
        assert!(defaults.include_logs);
        assert!(defaults.strip_images);
        assert!(!from_bool.include_logs);
        assert!(from_bool.strip_images);
    }

    #[test]
    fn test_parse_diagnostics_export_payload_supports_object_aliases() {
        let parsed = parse_diagnostics_export_payload(Some(json!({
            "include_logs": false,
            "stripImages": false,
        })));
        assert!(!parsed.include_logs);
        assert!(!parsed.strip_images);
    }

    #[test]
    fn test_health_reports_schema_version() {
        let state = AppState::in_memory();
        let health = diagnostics_get_system_health(&state).unwrap();
        assert_eq!(health["schemaVersion"], crate::db::CURRENT_SCHEMA_VERSION);
    }
}
