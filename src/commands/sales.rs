use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use super::{parse_payload, payload_arg0_as_string, to_value};
use crate::catalog;
use crate::sales::{self, SaleComposer};
use crate::AppState;

fn composer_snapshot(composer: &SaleComposer) -> Result<Value, String> {
    let mut value = to_value(composer)?;
    if let Value::Object(map) = &mut value {
        map.insert("total".into(), json!(composer.total()));
    }
    Ok(value)
}

fn lock_composer(state: &AppState) -> Result<std::sync::MutexGuard<'_, SaleComposer>, String> {
    state.composer.lock().map_err(|e| e.to_string())
}

// -- Composer ----------------------------------------------------------------

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct AddItemPayload {
    /// Item name or catalog index.
    #[serde(default, alias = "search", alias = "query")]
    term: Option<String>,
    #[serde(default, alias = "item_id")]
    item_id: Option<String>,
    #[serde(default, alias = "qty")]
    quantity: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuantityPayload {
    #[serde(alias = "item_id", alias = "id")]
    item_id: String,
    #[serde(alias = "qty")]
    quantity: f64,
}

pub fn sale_current(state: &AppState) -> Result<Value, String> {
    let composer = lock_composer(state)?;
    composer_snapshot(&composer)
}

pub fn sale_add_item(arg0: Option<Value>, state: &AppState) -> Result<Value, String> {
    let payload: AddItemPayload = parse_payload(arg0)?;
    let items = catalog::list_items(&state.db).map_err(|e| e.to_string())?;
    let item = match (&payload.item_id, &payload.term) {
        (Some(id), _) => items.iter().find(|item| &item.id == id),
        (None, Some(term)) => catalog::lookup_item(&items, term),
        (None, None) => return Err("Missing itemId or term".into()),
    }
    .ok_or("Item not found")?;

    let mut composer = lock_composer(state)?;
    composer
        .add_item(item, payload.quantity.unwrap_or(1.0))
        .map_err(|e| e.to_string())?;
    composer_snapshot(&composer)
}

pub fn sale_set_quantity(arg0: Option<Value>, state: &AppState) -> Result<Value, String> {
    let payload: QuantityPayload = parse_payload(arg0)?;
    let mut composer = lock_composer(state)?;
    composer
        .set_quantity(&payload.item_id, payload.quantity)
        .map_err(|e| e.to_string())?;
    composer_snapshot(&composer)
}

pub fn sale_remove_line(arg0: Option<Value>, state: &AppState) -> Result<Value, String> {
    let item_id =
        payload_arg0_as_string(arg0, &["itemId", "item_id", "id"]).ok_or("Missing itemId")?;
    let mut composer = lock_composer(state)?;
    composer.remove_line(&item_id);
    composer_snapshot(&composer)
}

pub fn sale_set_customer(arg0: Option<Value>, state: &AppState) -> Result<Value, String> {
    let name = match arg0 {
        Some(Value::String(name)) => name,
        other => payload_arg0_as_string(other, &["customerName", "customer_name", "name"])
            .unwrap_or_default(),
    };
    let mut composer = lock_composer(state)?;
    composer.set_customer_name(&name);
    composer_snapshot(&composer)
}

pub fn sale_clear(state: &AppState) -> Result<Value, String> {
    let mut composer = lock_composer(state)?;
    composer.clear();
    composer_snapshot(&composer)
}

pub fn sale_suggest(arg0: Option<Value>, state: &AppState) -> Result<Value, String> {
    let term = payload_arg0_as_string(arg0, &["term", "query", "search"]).unwrap_or_default();
    let items = catalog::list_items(&state.db).map_err(|e| e.to_string())?;
    to_value(&catalog::suggest_items(&items, &term))
}

pub fn sale_search_enter(arg0: Option<Value>, state: &AppState) -> Result<Value, String> {
    let term = payload_arg0_as_string(arg0, &["term", "query", "search"]).unwrap_or_default();
    let items = catalog::list_items(&state.db).map_err(|e| e.to_string())?;
    let mut composer = lock_composer(state)?;
    let found = composer.search_enter(&items, &term);
    Ok(json!({
        "item": found,
        "focus": composer.focus(),
    }))
}

pub fn sale_quantity_enter(arg0: Option<Value>, state: &AppState) -> Result<Value, String> {
    let payload: AddItemPayload = parse_payload(arg0)?;
    let term = payload.term.unwrap_or_default();
    let items = catalog::list_items(&state.db).map_err(|e| e.to_string())?;
    let mut composer = lock_composer(state)?;
    let line = composer
        .quantity_enter(&items, &term, payload.quantity.unwrap_or(1.0))
        .map_err(|e| e.to_string())?;
    Ok(json!({
        "line": line,
        "focus": composer.focus(),
        "sale": composer_snapshot(&composer)?,
    }))
}

pub fn sale_complete(state: &AppState) -> Result<Value, String> {
    let mut composer = lock_composer(state)?;
    let sale = composer
        .complete(&state.db, Utc::now())
        .map_err(|e| e.to_string())?;
    match sale {
        Some(sale) => Ok(json!({ "success": true, "sale": sale })),
        None => {
            warn!("sale_complete: cart is empty");
            Ok(json!({ "success": false, "sale": null }))
        }
    }
}

/// Enter edit mode from an explicit id, or from the flag left by history.
pub fn sale_load_for_edit(arg0: Option<Value>, state: &AppState) -> Result<Value, String> {
    let explicit = payload_arg0_as_string(arg0, &["saleId", "sale_id", "id"]);
    let mut composer = lock_composer(state)?;
    let loaded = composer
        .begin_edit(&state.db, explicit.as_deref())
        .map_err(|e| e.to_string())?;
    Ok(json!({
        "editing": loaded.is_some(),
        "saleId": loaded,
        "sale": composer_snapshot(&composer)?,
    }))
}

// -- History -----------------------------------------------------------------

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct SaleDeletePayload {
    #[serde(default, alias = "sale_id", alias = "id")]
    sale_id: Option<String>,
    #[serde(default)]
    confirmed: bool,
}

pub fn history_list(state: &AppState) -> Result<Value, String> {
    let sales = sales::list_sales(&state.db).map_err(|e| e.to_string())?;
    to_value(&sales)
}

pub fn history_search(arg0: Option<Value>, state: &AppState) -> Result<Value, String> {
    let term = payload_arg0_as_string(arg0, &["term", "query", "search"]).unwrap_or_default();
    let all = sales::list_sales(&state.db).map_err(|e| e.to_string())?;
    let matches = sales::search_sales(&all, &term);
    let grand_total: f64 = matches.iter().map(|sale| sale.total).sum();
    Ok(json!({
        "sales": matches,
        "summary": { "count": matches.len(), "grandTotal": grand_total },
    }))
}

pub fn history_delete(arg0: Option<Value>, state: &AppState) -> Result<Value, String> {
    let (sale_id, confirmed) = match arg0 {
        Some(Value::String(id)) => (id, false),
        other => {
            let payload: SaleDeletePayload = parse_payload(other)?;
            (payload.sale_id.ok_or("Missing saleId")?, payload.confirmed)
        }
    };
    sales::delete_sale(&state.db, &sale_id, confirmed).map_err(|e| e.to_string())?;
    Ok(json!({ "success": true, "saleId": sale_id }))
}

pub fn history_mark_for_edit(arg0: Option<Value>, state: &AppState) -> Result<Value, String> {
    let sale_id =
        payload_arg0_as_string(arg0, &["saleId", "sale_id", "id"]).ok_or("Missing saleId")?;
    sales::mark_sale_for_edit(&state.db, &sale_id).map_err(|e| e.to_string())?;
    info!(sale_id = %sale_id, "history_mark_for_edit: flag set");
    Ok(json!({ "success": true, "saleId": sale_id }))
}

pub fn history_summary(state: &AppState) -> Result<Value, String> {
    let all = sales::list_sales(&state.db).map_err(|e| e.to_string())?;
    to_value(&sales::sales_summary(&all))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::catalog::{category_create, item_create};

    fn seed(state: &AppState) {
        category_create(Some(json!("Dairy")), state).unwrap();
        item_create(
            Some(json!({"name": "Milk", "price": 2.5, "category": "Dairy", "unit": "liter"})),
            state,
        )
        .unwrap();
    }

    #[test]
    fn test_quick_entry_moves_focus() {
        let state = AppState::in_memory();
        seed(&state);

        let hit = sale_search_enter(Some(json!("milk")), &state).unwrap();
        assert_eq!(hit["item"]["name"], "Milk");
        assert_eq!(hit["focus"], "quantity");

        let entered =
            sale_quantity_enter(Some(json!({"term": "milk", "quantity": 3})), &state).unwrap();
        assert_eq!(entered["line"]["total"], 7.5);
        assert_eq!(entered["focus"], "search");

        let miss = sale_search_enter(Some(json!("bread")), &state).unwrap();
        assert!(miss["item"].is_null());
        assert_eq!(miss["focus"], "search");
    }

    #[test]
    fn test_empty_complete_writes_nothing() {
        let state = AppState::in_memory();
        let result = sale_complete(&state).unwrap();
        assert_eq!(result["success"], false);
        assert_eq!(history_list(&state).unwrap(), json!([]));
    }

    #[test]
    fn test_edit_round_trip_through_history_flag() {
        let state = AppState::in_memory();
        seed(&state);
        sale_add_item(Some(json!({"term": "Milk", "quantity": 2})), &state).unwrap();
        sale_set_customer(Some(json!("Ayesha")), &state).unwrap();
        let done = sale_complete(&state).unwrap();
        let sale_id = done["sale"]["id"].as_str().unwrap().to_string();
        assert_eq!(done["sale"]["customerName"], "Ayesha");

        history_mark_for_edit(Some(json!({"saleId": sale_id})), &state).unwrap();
        let loaded = sale_load_for_edit(None, &state).unwrap();
        assert_eq!(loaded["editing"], true);
        assert_eq!(loaded["sale"]["editingSaleId"], sale_id.as_str());

        let line_id = loaded["sale"]["lines"][0]["id"].as_str().unwrap().to_string();
        sale_set_quantity(Some(json!({"itemId": line_id, "quantity": 4})), &state).unwrap();
        let updated = sale_complete(&state).unwrap();
        assert_eq!(updated["sale"]["id"], sale_id.as_str());
        assert_eq!(updated["sale"]["total"], 10.0);

        let summary = history_summary(&state).unwrap();
        assert_eq!(summary["count"], 1);
        assert_eq!(summary["grandTotal"], 10.0);

        let again = sale_load_for_edit(None, &state).unwrap();
        assert_eq!(again["editing"], false);
    }

    #[test]
    fn test_history_delete_requires_confirmation() {
        let state = AppState::in_memory();
        seed(&state);
        sale_add_item(Some(json!({"term": "1"})), &state).unwrap();
        let sale_id = sale_complete(&state).unwrap()["sale"]["id"]
            .as_str()
            .unwrap()
            .to_string();

        assert!(history_delete(Some(json!(sale_id.clone())), &state).is_err());
        history_delete(Some(json!({"saleId": sale_id, "confirmed": true})), &state).unwrap();
        assert_eq!(history_summary(&state).unwrap()["count"], 0);
    }
}
