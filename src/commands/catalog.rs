use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use super::{parse_payload, payload_arg0_as_string, to_value};
use crate::catalog::{self, ItemDraft, PriceInput};
use crate::AppState;

// -- Categories --------------------------------------------------------------

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct CategoryPayload {
    #[serde(default, alias = "categoryId", alias = "category_id")]
    id: Option<String>,
    #[serde(default, alias = "categoryName", alias = "category_name")]
    name: String,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct DeletePayload {
    #[serde(
        default,
        alias = "categoryId",
        alias = "category_id",
        alias = "itemId",
        alias = "item_id"
    )]
    id: Option<String>,
    #[serde(default)]
    confirmed: bool,
}

fn parse_delete_payload(arg0: Option<Value>) -> Result<(String, bool), String> {
    if let Some(Value::String(id)) = &arg0 {
        // A bare id is an unconfirmed request.
        return Ok((id.trim().to_string(), false));
    }
    let payload: DeletePayload = parse_payload(arg0)?;
    let id = payload
        .id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .ok_or("Missing id")?;
    Ok((id, payload.confirmed))
}

pub fn category_list(state: &AppState) -> Result<Value, String> {
    let categories = catalog::list_categories(&state.db).map_err(|e| e.to_string())?;
    to_value(&categories)
}

pub fn category_create(arg0: Option<Value>, state: &AppState) -> Result<Value, String> {
    let name = match &arg0 {
        Some(Value::String(name)) => name.clone(),
        _ => parse_payload::<CategoryPayload>(arg0)?.name,
    };
    let category = catalog::create_category(&state.db, &name).map_err(|e| e.to_string())?;
    to_value(&category)
}

pub fn category_update(arg0: Option<Value>, state: &AppState) -> Result<Value, String> {
    let payload: CategoryPayload = parse_payload(arg0)?;
    let id = payload.id.ok_or("Missing categoryId")?;
    let category =
        catalog::update_category(&state.db, &id, &payload.name).map_err(|e| e.to_string())?;
    to_value(&category)
}

pub fn category_delete(arg0: Option<Value>, state: &AppState) -> Result<Value, String> {
    let (id, confirmed) = parse_delete_payload(arg0)?;
    catalog::delete_category(&state.db, &id, confirmed).map_err(|e| e.to_string())?;
    info!(category_id = %id, "category_delete: removed");
    Ok(json!({ "success": true, "id": id }))
}

// -- Items -------------------------------------------------------------------

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ItemPayload {
    #[serde(default, alias = "itemId", alias = "item_id")]
    id: Option<String>,
    #[serde(default)]
    name: String,
    #[serde(default)]
    price: Option<PriceInput>,
    #[serde(default)]
    category: String,
    #[serde(default)]
    unit: Option<String>,
}

impl ItemPayload {
    fn into_parts(self) -> (Option<String>, ItemDraft) {
        (
            self.id,
            ItemDraft {
                name: self.name,
                price: self.price,
                category: self.category,
                unit: self.unit,
            },
        )
    }
}

pub fn item_list(state: &AppState) -> Result<Value, String> {
    let items = catalog::list_items(&state.db).map_err(|e| e.to_string())?;
    to_value(&items)
}

pub fn item_create(arg0: Option<Value>, state: &AppState) -> Result<Value, String> {
    let (_, draft) = parse_payload::<ItemPayload>(arg0)?.into_parts();
    let item = catalog::create_item(&state.db, &draft).map_err(|e| e.to_string())?;
    to_value(&item)
}

pub fn item_update(arg0: Option<Value>, state: &AppState) -> Result<Value, String> {
    let (id, draft) = parse_payload::<ItemPayload>(arg0)?.into_parts();
    let id = id.ok_or("Missing itemId")?;
    let item = catalog::update_item(&state.db, &id, &draft).map_err(|e| e.to_string())?;
    to_value(&item)
}

pub fn item_delete(arg0: Option<Value>, state: &AppState) -> Result<Value, String> {
    let (id, confirmed) = parse_delete_payload(arg0)?;
    catalog::delete_item(&state.db, &id, confirmed).map_err(|e| e.to_string())?;
    Ok(json!({ "success": true, "id": id }))
}

pub fn item_search(arg0: Option<Value>, state: &AppState) -> Result<Value, String> {
    let term = payload_arg0_as_string(arg0, &["term", "query", "search"]).unwrap_or_default();
    let items = catalog::list_items(&state.db).map_err(|e| e.to_string())?;
    to_value(&catalog::search_items(&items, &term))
}

pub fn item_lookup(arg0: Option<Value>, state: &AppState) -> Result<Value, String> {
    let term = payload_arg0_as_string(arg0, &["term", "query", "name", "index"])
        .ok_or("Missing term")?;
    let items = catalog::list_items(&state.db).map_err(|e| e.to_string())?;
    match catalog::lookup_item(&items, &term) {
        Some(item) => to_value(item),
        None => Ok(Value::Null),
    }
}
