//! Catalog layer: categories and items.
//!
//! Both collections are persisted whole after every mutation. Items refer to
//! their category by name; the only integrity check is that a category
//! cannot be deleted while an item still carries its name.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{require_confirmation, PosError, PosResult};
use crate::store::{
    next_timestamp_id, read_collection, read_collection_strict, write_collection, Store, StoreKey,
};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Category {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Unit {
    Kg,
    Gram,
    Liter,
    Ml,
    #[default]
    Piece,
    Dozen,
    Box,
    Pack,
}

impl Unit {
    pub const ALL: [Unit; 8] = [
        Self::Kg,
        Self::Gram,
        Self::Liter,
        Self::Ml,
        Self::Piece,
        Self::Dozen,
        Self::Box,
        Self::Pack,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Kg => "kg",
            Self::Gram => "gram",
            Self::Liter => "liter",
            Self::Ml => "ml",
            Self::Piece => "piece",
            Self::Dozen => "dozen",
            Self::Box => "box",
            Self::Pack => "pack",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let wanted = value.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|u| u.as_str() == wanted)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Item {
    pub id: String,
    pub name: String,
    pub price: f64,
    pub category: String,
    #[serde(default)]
    pub unit: Unit,
    pub index: u32,
}

/// Price as typed by the operator: either a JSON number or free text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum PriceInput {
    Number(f64),
    Text(String),
}

impl PriceInput {
    fn is_blank(&self) -> bool {
        matches!(self, Self::Text(text) if text.trim().is_empty())
    }

    /// Positive finite price, or `None` when the input is not one.
    pub fn parse(&self) -> Option<f64> {
        let value = match self {
            Self::Number(n) => *n,
            Self::Text(text) => text.trim().parse::<f64>().ok()?,
        };
        (value.is_finite() && value > 0.0).then_some(value)
    }
}

/// Fields the item form submits for create and update.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ItemDraft {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub price: Option<PriceInput>,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub unit: Option<String>,
}

struct ValidItem {
    name: String,
    price: f64,
    category: String,
    unit: Unit,
}

// ---------------------------------------------------------------------------
// Categories
// ---------------------------------------------------------------------------

pub fn list_categories(store: &dyn Store) -> PosResult<Vec<Category>> {
    read_collection(store, StoreKey::Categories)
}

fn validate_category_name(
    categories: &[Category],
    name: &str,
    exclude_id: Option<&str>,
) -> PosResult<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(PosError::validation("Please enter a category name"));
    }
    let lowered = trimmed.to_lowercase();
    let duplicate = categories
        .iter()
        .any(|c| c.name.to_lowercase() == lowered && Some(c.id.as_str()) != exclude_id);
    if duplicate {
        return Err(PosError::validation("Category name already exists"));
    }
    Ok(trimmed.to_string())
}

pub fn create_category(store: &dyn Store, name: &str) -> PosResult<Category> {
    let mut categories = read_collection_strict::<Category>(store, StoreKey::Categories)?;
    let name = validate_category_name(&categories, name, None)?;
    let id = next_timestamp_id(
        Utc::now().timestamp_millis(),
        categories.iter().map(|c| c.id.as_str()),
    );
    let category = Category { id, name };
    categories.push(category.clone());
    write_collection(store, StoreKey::Categories, &categories)?;
    info!(category_id = %category.id, name = %category.name, "Category created");
    Ok(category)
}

pub fn update_category(store: &dyn Store, id: &str, name: &str) -> PosResult<Category> {
    let mut categories = read_collection_strict::<Category>(store, StoreKey::Categories)?;
    let name = validate_category_name(&categories, name, Some(id))?;
    let category = categories
        .iter_mut()
        .find(|c| c.id == id)
        .ok_or_else(|| PosError::not_found("Category", id))?;
    category.name = name;
    let updated = category.clone();
    write_collection(store, StoreKey::Categories, &categories)?;
    info!(category_id = %id, name = %updated.name, "Category updated");
    Ok(updated)
}

/// Delete a category that no item references.
///
/// The in-use check runs before confirmation so the operator is told about
/// the blocking items instead of being asked to confirm a doomed delete.
pub fn delete_category(store: &dyn Store, id: &str, confirmed: bool) -> PosResult<()> {
    let categories = read_collection_strict::<Category>(store, StoreKey::Categories)?;
    let target = categories
        .iter()
        .find(|c| c.id == id)
        .ok_or_else(|| PosError::not_found("Category", id))?;

    let items = read_collection_strict::<Item>(store, StoreKey::Items)?;
    if items.iter().any(|item| item.category == target.name) {
        return Err(PosError::validation(
            "Cannot delete category that is being used by items",
        ));
    }

    require_confirmation(confirmed, "Are you sure you want to delete this category?")?;

    let name = target.name.clone();
    let remaining: Vec<Category> = categories.into_iter().filter(|c| c.id != id).collect();
    write_collection(store, StoreKey::Categories, &remaining)?;
    info!(category_id = %id, name = %name, "Category deleted");
    Ok(())
}

// ---------------------------------------------------------------------------
// Items
// ---------------------------------------------------------------------------

pub fn list_items(store: &dyn Store) -> PosResult<Vec<Item>> {
    read_collection(store, StoreKey::Items)
}

fn validate_item(store: &dyn Store, draft: &ItemDraft) -> PosResult<ValidItem> {
    let name = draft.name.trim();
    let category = draft.category.trim();
    let price_missing = draft.price.as_ref().map_or(true, PriceInput::is_blank);
    if name.is_empty() || category.is_empty() || price_missing {
        return Err(PosError::validation("Please fill in all required fields"));
    }

    let price = draft
        .price
        .as_ref()
        .and_then(PriceInput::parse)
        .ok_or_else(|| PosError::validation("Please enter a valid price"))?;

    let categories = read_collection_strict::<Category>(store, StoreKey::Categories)?;
    if !categories.iter().any(|c| c.name == category) {
        return Err(PosError::validation("Please select an existing category"));
    }

    let unit = match draft.unit.as_deref().map(str::trim) {
        None | Some("") => Unit::default(),
        Some(raw) => {
            Unit::parse(raw).ok_or_else(|| PosError::validation("Please select a valid unit"))?
        }
    };

    Ok(ValidItem {
        name: name.to_string(),
        price,
        category: category.to_string(),
        unit,
    })
}

pub fn create_item(store: &dyn Store, draft: &ItemDraft) -> PosResult<Item> {
    let valid = validate_item(store, draft)?;
    let mut items = read_collection_strict::<Item>(store, StoreKey::Items)?;
    let id = next_timestamp_id(
        Utc::now().timestamp_millis(),
        items.iter().map(|i| i.id.as_str()),
    );
    let item = Item {
        id,
        name: valid.name,
        price: valid.price,
        category: valid.category,
        unit: valid.unit,
        index: items.len() as u32 + 1,
    };
    items.push(item.clone());
    write_collection(store, StoreKey::Items, &items)?;
    info!(item_id = %item.id, index = item.index, name = %item.name, "Item created");
    Ok(item)
}

/// Replace name, price, category and unit in place. The index is kept.
pub fn update_item(store: &dyn Store, id: &str, draft: &ItemDraft) -> PosResult<Item> {
    let valid = validate_item(store, draft)?;
    let mut items = read_collection_strict::<Item>(store, StoreKey::Items)?;
    let item = items
        .iter_mut()
        .find(|i| i.id == id)
        .ok_or_else(|| PosError::not_found("Item", id))?;
    item.name = valid.name;
    item.price = valid.price;
    item.category = valid.category;
    item.unit = valid.unit;
    let updated = item.clone();
    write_collection(store, StoreKey::Items, &items)?;
    info!(item_id = %id, index = updated.index, "Item updated");
    Ok(updated)
}

/// Remove an item and renumber the survivors 1..N in list order.
pub fn delete_item(store: &dyn Store, id: &str, confirmed: bool) -> PosResult<()> {
    let items = read_collection_strict::<Item>(store, StoreKey::Items)?;
    if !items.iter().any(|i| i.id == id) {
        return Err(PosError::not_found("Item", id));
    }
    require_confirmation(confirmed, "Are you sure you want to delete this item?")?;

    let remaining = reindex(items.into_iter().filter(|i| i.id != id).collect());
    write_collection(store, StoreKey::Items, &remaining)?;
    info!(item_id = %id, remaining = remaining.len(), "Item deleted, catalog reindexed");
    Ok(())
}

fn reindex(mut items: Vec<Item>) -> Vec<Item> {
    for (position, item) in items.iter_mut().enumerate() {
        item.index = position as u32 + 1;
    }
    items
}

/// Case-insensitive substring filter over name and category.
pub fn search_items<'a>(items: &'a [Item], term: &str) -> Vec<&'a Item> {
    let needle = term.trim().to_lowercase();
    items
        .iter()
        .filter(|item| {
            needle.is_empty()
                || item.name.to_lowercase().contains(&needle)
                || item.category.to_lowercase().contains(&needle)
        })
        .collect()
}

/// Exact lookup used by quick entry: case-insensitive name, or the catalog
/// index typed as a number. First match in list order wins.
pub fn lookup_item<'a>(items: &'a [Item], term: &str) -> Option<&'a Item> {
    let needle = term.trim();
    if needle.is_empty() {
        return None;
    }
    let lowered = needle.to_lowercase();
    let found = items
        .iter()
        .find(|item| item.name.to_lowercase() == lowered || item.index.to_string() == needle);
    debug!(term = %needle, hit = found.is_some(), "Item lookup");
    found
}

/// Suggestion list for the sale composer: name substring or exact index.
pub fn suggest_items<'a>(items: &'a [Item], term: &str) -> Vec<&'a Item> {
    let needle = term.trim();
    if needle.is_empty() {
        return Vec::new();
    }
    let lowered = needle.to_lowercase();
    items
        .iter()
        .filter(|item| {
            item.name.to_lowercase().contains(&lowered) || item.index.to_string() == needle
        })
        .collect()
}
