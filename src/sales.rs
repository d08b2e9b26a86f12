//! Sale composer and sale history.
//!
//! The composer accumulates line items in memory; nothing reaches the store
//! until the sale is completed. Line items are snapshots of the catalog item
//! at the time it was added, so later catalog edits never rewrite history.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::catalog::{lookup_item, Item};
use crate::error::{require_confirmation, PosError, PosResult};
use crate::store::{
    next_timestamp_id, read_collection, read_collection_strict, read_record, write_collection,
    write_record, Store, StoreKey,
};

pub const DEFAULT_CUSTOMER_NAME: &str = "Walk-in Customer";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LineItem {
    #[serde(flatten)]
    pub item: Item,
    pub quantity: f64,
    pub total: f64,
}

impl LineItem {
    fn new(item: &Item, quantity: f64) -> Self {
        Self {
            item: item.clone(),
            quantity,
            total: quantity * item.price,
        }
    }

    fn set_quantity(&mut self, quantity: f64) {
        self.quantity = quantity;
        self.total = quantity * self.item.price;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Sale {
    pub id: String,
    pub customer_name: String,
    pub items: Vec<LineItem>,
    pub total: f64,
    pub date: String,
}

fn lines_total(lines: &[LineItem]) -> f64 {
    lines.iter().map(|line| line.total).sum()
}

fn customer_or_default(name: &str) -> String {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        DEFAULT_CUSTOMER_NAME.to_string()
    } else {
        trimmed.to_string()
    }
}

fn validate_quantity(quantity: f64) -> PosResult<()> {
    if quantity.is_finite() && quantity > 0.0 {
        Ok(())
    } else {
        Err(PosError::validation("Please enter a valid quantity"))
    }
}

// ---------------------------------------------------------------------------
// Composer
// ---------------------------------------------------------------------------

/// Where keyboard quick entry currently sits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum EntryFocus {
    #[default]
    Search,
    Quantity,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleComposer {
    customer_name: String,
    lines: Vec<LineItem>,
    editing_sale_id: Option<String>,
    focus: EntryFocus,
}

impl SaleComposer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> &[LineItem] {
        &self.lines
    }

    pub fn customer_name(&self) -> &str {
        &self.customer_name
    }

    pub fn set_customer_name(&mut self, name: &str) {
        self.customer_name = name.to_string();
    }

    pub fn editing_sale_id(&self) -> Option<&str> {
        self.editing_sale_id.as_deref()
    }

    pub fn focus(&self) -> EntryFocus {
        self.focus
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn total(&self) -> f64 {
        lines_total(&self.lines)
    }

    /// Add `quantity` of `item`. A line for the same item id is merged and
    /// its total recomputed from the line's own snapshot price.
    pub fn add_item(&mut self, item: &Item, quantity: f64) -> PosResult<&LineItem> {
        validate_quantity(quantity)?;
        let position = match self.lines.iter().position(|line| line.item.id == item.id) {
            Some(position) => {
                let line = &mut self.lines[position];
                let merged = line.quantity + quantity;
                line.set_quantity(merged);
                position
            }
            None => {
                self.lines.push(LineItem::new(item, quantity));
                self.lines.len() - 1
            }
        };
        debug!(item_id = %item.id, quantity, "Line item added");
        Ok(&self.lines[position])
    }

    /// Set a line's quantity; zero or less removes the line.
    pub fn set_quantity(&mut self, item_id: &str, quantity: f64) -> PosResult<()> {
        if quantity <= 0.0 {
            self.remove_line(item_id);
            return Ok(());
        }
        validate_quantity(quantity)?;
        let line = self
            .lines
            .iter_mut()
            .find(|line| line.item.id == item_id)
            .ok_or_else(|| PosError::not_found("Line item", item_id))?;
        line.set_quantity(quantity);
        Ok(())
    }

    pub fn remove_line(&mut self, item_id: &str) {
        self.lines.retain(|line| line.item.id != item_id);
    }

    /// Drop the cart and leave edit mode.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Enter on the search field: jump to quantity entry when `term`
    /// resolves to exactly one catalog item.
    pub fn search_enter<'a>(&mut self, catalog: &'a [Item], term: &str) -> Option<&'a Item> {
        let found = lookup_item(catalog, term);
        if found.is_some() {
            self.focus = EntryFocus::Quantity;
        }
        found
    }

    /// Enter on the quantity field: commit the line for the exact match and
    /// return focus to search. No match leaves everything unchanged.
    pub fn quantity_enter(
        &mut self,
        catalog: &[Item],
        term: &str,
        quantity: f64,
    ) -> PosResult<Option<LineItem>> {
        let Some(item) = lookup_item(catalog, term) else {
            return Ok(None);
        };
        let line = self.add_item(item, quantity)?.clone();
        self.focus = EntryFocus::Search;
        Ok(Some(line))
    }

    /// Preload the composer from a stored sale. Unknown ids leave the
    /// composer untouched and return `false`.
    pub fn load_for_edit(&mut self, store: &dyn Store, sale_id: &str) -> PosResult<bool> {
        let sales = list_sales(store)?;
        let Some(sale) = sales.into_iter().find(|s| s.id == sale_id) else {
            warn!(sale_id = %sale_id, "Sale to edit not found");
            return Ok(false);
        };
        self.lines = sale.items;
        self.customer_name = sale.customer_name;
        self.editing_sale_id = Some(sale.id);
        self.focus = EntryFocus::Search;
        info!(sale_id = %sale_id, lines = self.lines.len(), "Sale loaded for editing");
        Ok(true)
    }

    /// Enter edit mode from an explicit id (query parameter) or, failing
    /// that, from the transient flag. The flag is consumed either way.
    pub fn begin_edit(
        &mut self,
        store: &dyn Store,
        explicit_id: Option<&str>,
    ) -> PosResult<Option<String>> {
        let flagged = take_edit_flag(store)?;
        let requested = explicit_id
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .or(flagged);
        let Some(id) = requested else {
            return Ok(None);
        };
        Ok(self.load_for_edit(store, &id)?.then_some(id))
    }

    /// Persist the cart. Returns `None` without writing when the cart is
    /// empty. In edit mode the original record is replaced in place and
    /// keeps its id and date.
    pub fn complete(&mut self, store: &dyn Store, now: DateTime<Utc>) -> PosResult<Option<Sale>> {
        if self.lines.is_empty() {
            debug!("Complete requested on an empty sale, ignoring");
            return Ok(None);
        }

        let mut sales = read_collection_strict::<Sale>(store, StoreKey::Sales)?;
        let customer_name = customer_or_default(&self.customer_name);
        let total = self.total();

        let sale = match self.editing_sale_id.as_deref() {
            Some(editing_id) => {
                let existing = sales
                    .iter_mut()
                    .find(|s| s.id == editing_id)
                    .ok_or_else(|| PosError::not_found("Sale", editing_id))?;
                existing.customer_name = customer_name;
                existing.items = self.lines.clone();
                existing.total = total;
                let updated = existing.clone();
                write_collection(store, StoreKey::Sales, &sales)?;
                info!(sale_id = %updated.id, total, "Sale updated");
                updated
            }
            None => {
                let id = next_timestamp_id(
                    now.timestamp_millis(),
                    sales.iter().map(|s| s.id.as_str()),
                );
                let sale = Sale {
                    id,
                    customer_name,
                    items: self.lines.clone(),
                    total,
                    date: now.to_rfc3339_opts(SecondsFormat::Millis, true),
                };
                sales.push(sale.clone());
                write_collection(store, StoreKey::Sales, &sales)?;
                info!(sale_id = %sale.id, lines = sale.items.len(), total, "Sale completed");
                sale
            }
        };

        self.clear();
        Ok(Some(sale))
    }
}

// ---------------------------------------------------------------------------
// History
// ---------------------------------------------------------------------------

pub fn list_sales(store: &dyn Store) -> PosResult<Vec<Sale>> {
    read_collection(store, StoreKey::Sales)
}

pub fn find_sale(store: &dyn Store, sale_id: &str) -> PosResult<Sale> {
    list_sales(store)?
        .into_iter()
        .find(|s| s.id == sale_id)
        .ok_or_else(|| PosError::not_found("Sale", sale_id))
}

/// Customer name (case-insensitive), id or date substring.
pub fn search_sales<'a>(sales: &'a [Sale], term: &str) -> Vec<&'a Sale> {
    let needle = term.trim();
    if needle.is_empty() {
        return sales.iter().collect();
    }
    let lowered = needle.to_lowercase();
    sales
        .iter()
        .filter(|sale| {
            sale.customer_name.to_lowercase().contains(&lowered)
                || sale.id.contains(needle)
                || sale.date.contains(needle)
        })
        .collect()
}

pub fn delete_sale(store: &dyn Store, sale_id: &str, confirmed: bool) -> PosResult<()> {
    let sales = read_collection_strict::<Sale>(store, StoreKey::Sales)?;
    if !sales.iter().any(|s| s.id == sale_id) {
        return Err(PosError::not_found("Sale", sale_id));
    }
    require_confirmation(confirmed, "Are you sure you want to delete this sale?")?;
    let remaining: Vec<Sale> = sales.into_iter().filter(|s| s.id != sale_id).collect();
    write_collection(store, StoreKey::Sales, &remaining)?;
    info!(sale_id = %sale_id, "Sale deleted");
    Ok(())
}

/// Leave a flag telling the next composer to open this sale for editing.
pub fn mark_sale_for_edit(store: &dyn Store, sale_id: &str) -> PosResult<()> {
    find_sale(store, sale_id)?;
    write_record(store, StoreKey::EditSaleFlag, &sale_id)?;
    info!(sale_id = %sale_id, "Sale flagged for editing");
    Ok(())
}

/// Read and clear the edit flag.
pub fn take_edit_flag(store: &dyn Store) -> PosResult<Option<String>> {
    let flag: Option<String> = read_record(store, StoreKey::EditSaleFlag)?;
    if flag.is_some() {
        store.remove(StoreKey::EditSaleFlag)?;
    }
    Ok(flag.filter(|id| !id.trim().is_empty()))
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SalesSummary {
    pub count: usize,
    pub grand_total: f64,
}

pub fn sales_summary(sales: &[Sale]) -> SalesSummary {
    SalesSummary {
        count: sales.len(),
        grand_total: sales.iter().map(|s| s.total).sum(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Unit;
    use crate::store::MemoryStore;
    use chrono::TimeZone;

    fn item(id: &str, name: &str, price: f64, index: u32) -> Item {
        Item {
            id: id.to_string(),
            name: name.to_string(),
            price,
            category: "Dairy".to_string(),
            unit: Unit::Liter,
            index,
        }
    }

    fn at(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(ms).single().unwrap()
    }

    #[test]
    fn test_adding_same_item_twice_merges_the_line() {
        let milk = item("1", "Milk", 2.5, 1);
        let mut composer = SaleComposer::new();
        composer.add_item(&milk, 2.0).unwrap();
        composer.add_item(&milk, 3.0).unwrap();
        assert_eq!(composer.lines().len(), 1);
        assert_eq!(composer.lines()[0].quantity, 5.0);
        assert_eq!(composer.lines()[0].total, 12.5);
        assert_eq!(composer.total(), 12.5);
    }

    #[test]
    fn test_line_keeps_snapshot_price() {
        let milk = item("1", "Milk", 2.0, 1);
        let mut composer = SaleComposer::new();
        composer.add_item(&milk, 1.0).unwrap();
        let repriced = item("1", "Milk", 9.0, 1);
        composer.add_item(&repriced, 1.0).unwrap();
        assert_eq!(composer.lines()[0].total, 4.0);
    }

    #[test]
    fn test_invalid_quantities_are_rejected() {
        let milk = item("1", "Milk", 2.0, 1);
        let mut composer = SaleComposer::new();
        assert!(composer.add_item(&milk, 0.0).is_err());
        assert!(composer.add_item(&milk, f64::NAN).is_err());
        assert!(composer.is_empty());
    }

    #[test]
    fn test_set_quantity_recomputes_or_removes() {
        let milk = item("1", "Milk", 2.0, 1);
        let mut composer = SaleComposer::new();
        composer.add_item(&milk, 1.0).unwrap();
        composer.set_quantity("1", 4.0).unwrap();
        assert_eq!(composer.lines()[0].total, 8.0);
        composer.set_quantity("1", 0.0).unwrap();
        assert!(composer.is_empty());
        assert!(composer.set_quantity("missing", 1.0).is_err());
    }

    #[test]
    fn test_unreadable_history_is_not_overwritten() {
        let store = MemoryStore::new();
        store.save(StoreKey::Sales, "[{\"id\":\"1\",\"total\":").unwrap();
        let mut composer = SaleComposer::new();
        composer.add_item(&item("1", "Milk", 2.5, 1), 1.0).unwrap();

        let err = composer.complete(&store, at(1_000)).unwrap_err();
        assert!(matches!(err, PosError::Storage(_)));
        assert!(!composer.is_empty());
        assert_eq!(
            store.load(StoreKey::Sales).unwrap().as_deref(),
            Some("[{\"id\":\"1\",\"total\":")
        );
        assert!(delete_sale(&store, "1", true).is_err());
    }

    #[test]
    fn test_empty_sale_is_not_persisted() {
        let store = MemoryStore::new();
        let mut composer = SaleComposer::new();
        assert!(composer.complete(&store, at(1_000)).unwrap().is_none());
        assert!(store.load(StoreKey::Sales).unwrap().is_none());
    }

    #[test]
    fn test_completing_appends_a_sale_with_default_customer() {
        let store = MemoryStore::new();
        let mut composer = SaleComposer::new();
        composer.add_item(&item("1", "Milk", 2.5, 1), 2.0).unwrap();
        composer.add_item(&item("2", "Cheese", 7.0, 2), 1.0).unwrap();

        let sale = composer.complete(&store, at(1_700_000_000_000)).unwrap().unwrap();
        assert_eq!(sale.id, "1700000000000");
        assert_eq!(sale.customer_name, DEFAULT_CUSTOMER_NAME);
        assert_eq!(sale.total, 12.0);
        assert_eq!(sale.date, "2023-11-14T22:13:20.000Z");
        assert!(composer.is_empty());
        assert_eq!(list_sales(&store).unwrap(), vec![sale]);
    }

    #[test]
    fn test_editing_replaces_the_sale_in_place() {
        let store = MemoryStore::new();
        let mut composer = SaleComposer::new();
        composer.set_customer_name("Ayesha");
        composer.add_item(&item("1", "Milk", 2.5, 1), 1.0).unwrap();
        let original = composer.complete(&store, at(5_000)).unwrap().unwrap();

        composer.add_item(&item("9", "Eggs", 3.0, 2), 1.0).unwrap();
        let other = composer.complete(&store, at(6_000)).unwrap().unwrap();

        assert!(composer.load_for_edit(&store, &original.id).unwrap());
        assert_eq!(composer.customer_name(), "Ayesha");
        assert_eq!(composer.editing_sale_id(), Some(original.id.as_str()));
        composer.add_item(&item("1", "Milk", 2.5, 1), 1.0).unwrap();
        let edited = composer.complete(&store, at(9_000)).unwrap().unwrap();

        assert_eq!(edited.id, original.id);
        assert_eq!(edited.date, original.date);
        assert_eq!(edited.total, 5.0);
        let sales = list_sales(&store).unwrap();
        assert_eq!(sales.len(), 2);
        assert_eq!(sales[0], edited);
        assert_eq!(sales[1], other);
        assert!(composer.editing_sale_id().is_none());
    }

    #[test]
    fn test_edit_of_vanished_sale_keeps_the_cart() {
        let store = MemoryStore::new();
        let mut composer = SaleComposer::new();
        composer.add_item(&item("1", "Milk", 2.5, 1), 1.0).unwrap();
        let sale = composer.complete(&store, at(5_000)).unwrap().unwrap();
        composer.load_for_edit(&store, &sale.id).unwrap();
        delete_sale(&store, &sale.id, true).unwrap();

        let err = composer.complete(&store, at(6_000)).unwrap_err();
        assert!(matches!(err, PosError::NotFound { .. }));
        assert_eq!(composer.lines().len(), 1);
        assert!(list_sales(&store).unwrap().is_empty());
    }

    #[test]
    fn test_quick_entry_by_name_or_index() {
        let catalog = vec![item("1", "Milk", 2.5, 1), item("2", "Cheese", 7.0, 2)];
        let mut composer = SaleComposer::new();

        assert!(composer.search_enter(&catalog, "chee").is_none());
        assert_eq!(composer.focus(), EntryFocus::Search);

        let hit = composer.search_enter(&catalog, "2").map(|i| i.id.clone());
        assert_eq!(hit.as_deref(), Some("2"));
        assert_eq!(composer.focus(), EntryFocus::Quantity);

        let line = composer.quantity_enter(&catalog, "2", 3.0).unwrap().unwrap();
        assert_eq!(line.total, 21.0);
        assert_eq!(composer.focus(), EntryFocus::Search);

        assert!(composer.quantity_enter(&catalog, "nope", 1.0).unwrap().is_none());
        composer.quantity_enter(&catalog, "milk", 1.0).unwrap();
        assert_eq!(composer.lines().len(), 2);
    }

    #[test]
    fn test_edit_flag_is_consumed_and_explicit_id_wins() {
        let store = MemoryStore::new();
        let mut composer = SaleComposer::new();
        composer.add_item(&item("1", "Milk", 2.5, 1), 1.0).unwrap();
        let first = composer.complete(&store, at(1_000)).unwrap().unwrap();
        composer.add_item(&item("2", "Cheese", 7.0, 2), 1.0).unwrap();
        let second = composer.complete(&store, at(2_000)).unwrap().unwrap();

        mark_sale_for_edit(&store, &first.id).unwrap();
        let opened = composer.begin_edit(&store, Some(&second.id)).unwrap();
        assert_eq!(opened.as_deref(), Some(second.id.as_str()));
        assert!(store.load(StoreKey::EditSaleFlag).unwrap().is_none());

        composer.clear();
        mark_sale_for_edit(&store, &first.id).unwrap();
        let opened = composer.begin_edit(&store, None).unwrap();
        assert_eq!(opened.as_deref(), Some(first.id.as_str()));
        assert_eq!(composer.lines()[0].item.name, "Milk");

        composer.clear();
        assert!(composer.begin_edit(&store, None).unwrap().is_none());
        assert!(mark_sale_for_edit(&store, "missing").is_err());
    }

    #[test]
    fn test_history_search_delete_and_summary() {
        let store = MemoryStore::new();
        let mut composer = SaleComposer::new();
        composer.set_customer_name("Bilal Traders");
        composer.add_item(&item("1", "Milk", 2.5, 1), 2.0).unwrap();
        let first = composer.complete(&store, at(1_700_000_000_000)).unwrap().unwrap();
        composer.add_item(&item("2", "Cheese", 7.0, 2), 1.0).unwrap();
        composer.complete(&store, at(1_700_000_100_000)).unwrap();

        let sales = list_sales(&store).unwrap();
        assert_eq!(search_sales(&sales, "bilal").len(), 1);
        assert_eq!(search_sales(&sales, "walk-in").len(), 1);
        assert_eq!(search_sales(&sales, "2023-11-14").len(), 2);
        assert_eq!(search_sales(&sales, "").len(), 2);

        let summary = sales_summary(&sales);
        assert_eq!(summary.count, 2);
        assert_eq!(summary.grand_total, 12.0);

        assert!(matches!(
            delete_sale(&store, &first.id, false),
            Err(PosError::ConfirmationRequired(_))
        ));
        delete_sale(&store, &first.id, true).unwrap();
        assert_eq!(list_sales(&store).unwrap().len(), 1);
    }

    #[test]
    fn test_sale_json_uses_camel_case_and_flat_line_items() {
        let mut composer = SaleComposer::new();
        composer.add_item(&item("1", "Milk", 2.5, 1), 2.0).unwrap();
        let store = MemoryStore::new();
        composer.complete(&store, at(1_000)).unwrap();
        let raw: serde_json::Value =
            serde_json::from_str(&store.load(StoreKey::Sales).unwrap().unwrap()).unwrap();
        let sale = &raw[0];
        assert_eq!(sale["customerName"], "Walk-in Customer");
        assert_eq!(sale["items"][0]["name"], "Milk");
        assert_eq!(sale["items"][0]["unit"], "liter");
        assert_eq!(sale["items"][0]["quantity"], 2.0);
        assert_eq!(sale["items"][0]["total"], 5.0);
    }
}
