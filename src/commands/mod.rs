//! IPC-style command handlers.
//!
//! Every handler takes the raw JSON payload (`arg0`) and the app state and
//! returns `Result<Value, String>`, the shape the UI bridge expects. Payload
//! structs accept both camelCase and snake_case keys.

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::AppState;

pub mod catalog;
pub mod diagnostics;
pub mod print;
pub mod runtime;
pub mod sales;
pub mod settings;

/// Deserialize a payload object; a missing payload reads as `{}`.
pub(crate) fn parse_payload<T: DeserializeOwned>(arg0: Option<Value>) -> Result<T, String> {
    let value = match arg0 {
        None | Some(Value::Null) => Value::Object(Default::default()),
        Some(v) => v,
    };
    serde_json::from_value(value).map_err(|e| format!("Invalid payload: {e}"))
}

/// Accept either a bare string payload or an object carrying one of `keys`.
pub(crate) fn payload_arg0_as_string(arg0: Option<Value>, keys: &[&str]) -> Option<String> {
    match arg0 {
        Some(Value::String(s)) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Object(obj)) => keys.iter().find_map(|key| match obj.get(*key) {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        }),
        _ => None,
    }
}

pub(crate) fn to_value<T: serde::Serialize>(value: &T) -> Result<Value, String> {
    serde_json::to_value(value).map_err(|e| e.to_string())
}

/// Route a command by name.
pub async fn dispatch(state: &AppState, command: &str, arg0: Option<Value>) -> Result<Value, String> {
    debug!(command = %command, "dispatch");
    match command {
        // Categories
        "category_list" => catalog::category_list(state),
        "category_create" => catalog::category_create(arg0, state),
        "category_update" => catalog::category_update(arg0, state),
        "category_delete" => catalog::category_delete(arg0, state),
        // Items
        "item_list" => catalog::item_list(state),
        "item_create" => catalog::item_create(arg0, state),
        "item_update" => catalog::item_update(arg0, state),
        "item_delete" => catalog::item_delete(arg0, state),
        "item_search" => catalog::item_search(arg0, state),
        "item_lookup" => catalog::item_lookup(arg0, state),
        // Sale composer
        "sale_current" => sales::sale_current(state),
        "sale_add_item" => sales::sale_add_item(arg0, state),
        "sale_set_quantity" => sales::sale_set_quantity(arg0, state),
        "sale_remove_line" => sales::sale_remove_line(arg0, state),
        "sale_set_customer" => sales::sale_set_customer(arg0, state),
        "sale_clear" => sales::sale_clear(state),
        "sale_suggest" => sales::sale_suggest(arg0, state),
        "sale_search_enter" => sales::sale_search_enter(arg0, state),
        "sale_quantity_enter" => sales::sale_quantity_enter(arg0, state),
        "sale_complete" => sales::sale_complete(state),
        "sale_load_for_edit" => sales::sale_load_for_edit(arg0, state),
        // Sale history
        "history_list" => sales::history_list(state),
        "history_search" => sales::history_search(arg0, state),
        "history_delete" => sales::history_delete(arg0, state),
        "history_mark_for_edit" => sales::history_mark_for_edit(arg0, state),
        "history_summary" => sales::history_summary(state),
        // Settings
        "settings_get" => settings::settings_get(state),
        "settings_save" => settings::settings_save(arg0, state),
        "settings_update_field" => settings::settings_update_field(arg0, state),
        "settings_reset" => settings::settings_reset(arg0, state),
        "settings_load_image" => settings::settings_load_image(arg0, state),
        "settings_clear_image" => settings::settings_clear_image(arg0, state),
        // Receipts
        "receipt_render_sale" => print::receipt_render_sale(arg0, state),
        "receipt_render_current" => print::receipt_render_current(state),
        "print_sale" => print::print_sale(arg0, state).await,
        "print_current" => print::print_current(state).await,
        // Runtime
        "app_get_version" => runtime::app_get_version(),
        "app_get_paths" => runtime::app_get_paths(state),
        // Diagnostics
        "diagnostics_get_about" => diagnostics::diagnostics_get_about(),
        "diagnostics_get_system_health" => diagnostics::diagnostics_get_system_health(state),
        "diagnostics_export" => diagnostics::diagnostics_export(arg0, state),
        other => Err(format!("Unknown command: {other}")),
    }
}
