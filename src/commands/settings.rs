use base64::Engine as _;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::MutexGuard;

use super::{parse_payload, to_value};
use crate::settings::{self, BusinessSettings, ImageSlot};
use crate::AppState;

/// The settings form edits a draft; nothing is stored until `settings_save`.
fn draft_guard(state: &AppState) -> Result<MutexGuard<'_, Option<BusinessSettings>>, String> {
    state.settings_draft.lock().map_err(|e| e.to_string())
}

fn current_draft<'a>(
    guard: &'a mut MutexGuard<'_, Option<BusinessSettings>>,
    state: &AppState,
) -> Result<&'a mut BusinessSettings, String> {
    if guard.is_none() {
        let stored = settings::get_settings(&state.db).map_err(|e| e.to_string())?;
        **guard = Some(stored);
    }
    guard.as_mut().ok_or_else(|| "Settings draft unavailable".to_string())
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct SavePayload {
    #[serde(default)]
    settings: Option<BusinessSettings>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateFieldPayload {
    #[serde(alias = "key", alias = "name")]
    field: String,
    #[serde(default)]
    value: Value,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ConfirmPayload {
    #[serde(default)]
    confirmed: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoadImagePayload {
    #[serde(alias = "field")]
    slot: ImageSlot,
    #[serde(default)]
    path: Option<String>,
    #[serde(default, alias = "data_base64", alias = "data")]
    data_base64: Option<String>,
    #[serde(default, alias = "mimeType", alias = "mime_type")]
    mime: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClearImagePayload {
    #[serde(alias = "field")]
    slot: ImageSlot,
}

/// Returns the draft when one is open, otherwise the stored record.
pub fn settings_get(state: &AppState) -> Result<Value, String> {
    let guard = draft_guard(state)?;
    match guard.as_ref() {
        Some(draft) => to_value(draft),
        None => {
            let stored = settings::get_settings(&state.db).map_err(|e| e.to_string())?;
            to_value(&stored)
        }
    }
}

/// Overlay the recognised settings fields of `fields` onto `base`. Returns
/// `None` when `fields` names no settings field at all.
fn overlay_fields(
    base: &BusinessSettings,
    fields: &serde_json::Map<String, Value>,
) -> Result<Option<BusinessSettings>, String> {
    let mut merged = to_value(base)?;
    let Value::Object(target) = &mut merged else {
        return Err("Settings did not serialize to an object".into());
    };
    let mut touched = false;
    for (key, value) in fields {
        if target.contains_key(key) {
            target.insert(key.clone(), value.clone());
            touched = true;
        }
    }
    if !touched {
        return Ok(None);
    }
    serde_json::from_value(merged)
        .map(Some)
        .map_err(|e| format!("Invalid settings: {e}"))
}

/// Persist the open draft. A payload under `settings` replaces the record
/// wholesale; bare settings fields are applied on top of the draft first.
/// An empty payload saves the draft as is.
pub fn settings_save(arg0: Option<Value>, state: &AppState) -> Result<Value, String> {
    let mut guard = draft_guard(state)?;
    let to_save = match arg0 {
        Some(Value::Object(map)) if map.contains_key("settings") => {
            match parse_payload::<SavePayload>(Some(Value::Object(map)))?.settings {
                Some(settings) => settings,
                None => current_draft(&mut guard, state)?.clone(),
            }
        }
        Some(Value::Object(map)) => {
            let draft = current_draft(&mut guard, state)?;
            overlay_fields(draft, &map)?.unwrap_or_else(|| draft.clone())
        }
        _ => current_draft(&mut guard, state)?.clone(),
    };
    settings::save_settings(&state.db, &to_save).map_err(|e| e.to_string())?;
    *guard = None;
    Ok(json!({ "success": true, "settings": to_save }))
}

pub fn settings_update_field(arg0: Option<Value>, state: &AppState) -> Result<Value, String> {
    let payload: UpdateFieldPayload = parse_payload(arg0)?;
    let value = match payload.value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    };
    let mut guard = draft_guard(state)?;
    let draft = current_draft(&mut guard, state)?;
    draft
        .update_field(&payload.field, &value)
        .map_err(|e| e.to_string())?;
    to_value(&*draft)
}

pub fn settings_reset(arg0: Option<Value>, state: &AppState) -> Result<Value, String> {
    let payload: ConfirmPayload = parse_payload(arg0)?;
    let defaults =
        settings::reset_settings(&state.db, payload.confirmed).map_err(|e| e.to_string())?;
    let mut guard = draft_guard(state)?;
    *guard = Some(defaults.clone());
    to_value(&defaults)
}

/// Load an image into one of the draft's image slots, from a file path or
/// from base64 bytes handed over by the UI.
pub fn settings_load_image(arg0: Option<Value>, state: &AppState) -> Result<Value, String> {
    let payload: LoadImagePayload = parse_payload(arg0)?;
    let bytes = match (&payload.path, &payload.data_base64) {
        (Some(path), _) => {
            let size = std::fs::metadata(path)
                .map_err(|e| format!("Failed to read {path}: {e}"))?
                .len();
            if size > settings::MAX_IMAGE_BYTES as u64 {
                return Err("File size must be less than 2MB".into());
            }
            std::fs::read(path).map_err(|e| format!("Failed to read {path}: {e}"))?
        }
        (None, Some(data)) => base64::engine::general_purpose::STANDARD
            .decode(data.trim())
            .map_err(|e| format!("Invalid image data: {e}"))?,
        (None, None) => return Err("Missing path or dataBase64".into()),
    };

    let data_url =
        settings::load_image(&bytes, payload.mime.as_deref()).map_err(|e| e.to_string())?;
    let mut guard = draft_guard(state)?;
    let draft = current_draft(&mut guard, state)?;
    draft.set_image(payload.slot, data_url);
    to_value(&*draft)
}

pub fn settings_clear_image(arg0: Option<Value>, state: &AppState) -> Result<Value, String> {
    let payload: ClearImagePayload = match arg0 {
        Some(Value::String(slot)) => parse_payload(Some(json!({ "slot": slot })))?,
        other => parse_payload(other)?,
    };
    let mut guard = draft_guard(state)?;
    let draft = current_draft(&mut guard, state)?;
    draft.clear_image(payload.slot);
    to_value(&*draft)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_draft_is_not_persisted_until_saved() {
        let state = AppState::in_memory();
        settings_update_field(
            Some(json!({"field": "businessName", "value": "Corner Mart"})),
            &state,
        )
        .unwrap();
        assert_eq!(settings_get(&state).unwrap()["businessName"], "Corner Mart");
        assert_eq!(
            settings::get_settings(&state.db).unwrap().business_name,
            ""
        );

        settings_save(None, &state).unwrap();
        assert_eq!(
            settings::get_settings(&state.db).unwrap().business_name,
            "Corner Mart"
        );
    }

    #[test]
    fn test_save_accepts_full_object() {
        let state = AppState::in_memory();
        settings_save(
            Some(json!({"businessName": "Shop", "receiptLayout": "layout2"})),
            &state,
        )
        .unwrap();
        let stored = settings_get(&state).unwrap();
        assert_eq!(stored["businessName"], "Shop");
        assert_eq!(stored["receiptLayout"], "layout2");
        assert_eq!(stored["currency"], "PKR");
    }

    #[test]
    fn test_empty_save_payload_keeps_profile_and_draft() {
        let state = AppState::in_memory();
        settings_save(
            Some(json!({"settings": {"businessName": "Corner Mart", "currency": "USD"}})),
            &state,
        )
        .unwrap();
        settings_update_field(Some(json!({"field": "phone", "value": "0300"})), &state).unwrap();

        settings_save(Some(json!({})), &state).unwrap();
        let stored = settings::get_settings(&state.db).unwrap();
        assert_eq!(stored.business_name, "Corner Mart");
        assert_eq!(stored.currency, "USD");
        assert_eq!(stored.phone, "0300");

        settings_save(Some(json!({"unrelated": true})), &state).unwrap();
        assert_eq!(settings::get_settings(&state.db).unwrap(), stored);
    }

    #[test]
    fn test_bare_fields_apply_on_top_of_draft() {
        let state = AppState::in_memory();
        settings_update_field(Some(json!({"field": "ownerName", "value": "Ayesha"})), &state)
            .unwrap();
        settings_save(Some(json!({"businessName": "Shop"})), &state).unwrap();
        let stored = settings::get_settings(&state.db).unwrap();
        assert_eq!(stored.business_name, "Shop");
        assert_eq!(stored.owner_name, "Ayesha");
    }

    #[test]
    fn test_oversized_image_file_is_rejected_before_reading() {
        let state = AppState::in_memory();
        let path = std::env::temp_dir().join(format!("pos_big_logo_{}.png", uuid::Uuid::new_v4()));
        let file = std::fs::File::create(&path).unwrap();
        file.set_len(settings::MAX_IMAGE_BYTES as u64 + 1).unwrap();

        let err = settings_load_image(
            Some(json!({"slot": "logo", "path": path.to_string_lossy()})),
            &state,
        )
        .unwrap_err();
        assert_eq!(err, "File size must be less than 2MB");
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_image_slots_via_base64() {
        let state = AppState::in_memory();
        let png = base64::engine::general_purpose::STANDARD
            .encode([0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0]);
        let draft = settings_load_image(
            Some(json!({"slot": "paymentQR", "dataBase64": png})),
            &state,
        )
        .unwrap();
        assert!(draft["paymentQR"]
            .as_str()
            .unwrap()
            .starts_with("data:image/png;base64,"));

        let err = settings_load_image(
            Some(json!({"slot": "logo", "dataBase64": "aGVsbG8=", "mime": "text/plain"})),
            &state,
        )
        .unwrap_err();
        assert_eq!(err, "Please select an image file");

        let cleared = settings_clear_image(Some(json!("paymentQR")), &state).unwrap();
        assert_eq!(cleared["paymentQR"], "");
    }

    #[test]
    fn test_reset_needs_confirmation() {
        let state = AppState::in_memory();
        settings_save(Some(json!({"businessName": "Shop"})), &state).unwrap();
        assert!(settings_reset(None, &state).is_err());
        let defaults = settings_reset(Some(json!({"confirmed": true})), &state).unwrap();
        assert_eq!(defaults["businessName"], "");
        assert_eq!(defaults["thankYouText"], settings::DEFAULT_THANK_YOU_TEXT);
    }
}
