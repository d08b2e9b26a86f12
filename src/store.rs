//! Repository interface over the local key-value store.
//!
//! Each collection lives under one key as a whole JSON blob. Callers load the
//! full collection, mutate an owned copy and write the full collection back;
//! there is no incremental update. Handlers receive a `&dyn Store` instead
//! of reaching for a global.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use crate::db::{self, DbState};
use crate::error::{PosError, PosResult};

/// Top-level keys in the local store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreKey {
    Categories,
    Items,
    Sales,
    Settings,
    /// Transient "open this sale in the composer" flag.
    EditSaleFlag,
}

impl StoreKey {
    pub const ALL: [StoreKey; 5] = [
        StoreKey::Categories,
        StoreKey::Items,
        StoreKey::Sales,
        StoreKey::Settings,
        StoreKey::EditSaleFlag,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Categories => "pos-categories",
            Self::Items => "pos-items",
            Self::Sales => "pos-sales",
            Self::Settings => "pos-settings",
            Self::EditSaleFlag => "editSaleId",
        }
    }
}

/// Get/set-all access to named blobs.
pub trait Store: Send + Sync {
    fn load(&self, key: StoreKey) -> PosResult<Option<String>>;
    fn save(&self, key: StoreKey, raw: &str) -> PosResult<()>;
    fn remove(&self, key: StoreKey) -> PosResult<()>;
}

impl Store for DbState {
    fn load(&self, key: StoreKey) -> PosResult<Option<String>> {
        let conn = self.conn.lock().map_err(|e| PosError::Storage(e.to_string()))?;
        db::get_value(&conn, key.as_str()).map_err(PosError::Storage)
    }

    fn save(&self, key: StoreKey, raw: &str) -> PosResult<()> {
        let conn = self.conn.lock().map_err(|e| PosError::Storage(e.to_string()))?;
        db::set_value(&conn, key.as_str(), raw).map_err(PosError::Storage)
    }

    fn remove(&self, key: StoreKey) -> PosResult<()> {
        let conn = self.conn.lock().map_err(|e| PosError::Storage(e.to_string()))?;
        db::delete_value(&conn, key.as_str()).map_err(PosError::Storage)
    }
}

/// Volatile store, used by tests and dry runs.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<StoreKey, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemoryStore {
    fn load(&self, key: StoreKey) -> PosResult<Option<String>> {
        let entries = self
            .entries
            .lock()
            .map_err(|e| PosError::Storage(e.to_string()))?;
        Ok(entries.get(&key).cloned())
    }

    fn save(&self, key: StoreKey, raw: &str) -> PosResult<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| PosError::Storage(e.to_string()))?;
        entries.insert(key, raw.to_string());
        Ok(())
    }

    fn remove(&self, key: StoreKey) -> PosResult<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| PosError::Storage(e.to_string()))?;
        entries.remove(&key);
        Ok(())
    }
}

/// Load a JSON array stored under `key`. Missing or unparseable blobs read
/// as an empty collection.
pub fn read_collection<T: DeserializeOwned>(store: &dyn Store, key: StoreKey) -> PosResult<Vec<T>> {
    let Some(raw) = store.load(key)? else {
        return Ok(Vec::new());
    };
    match serde_json::from_str::<Vec<T>>(&raw) {
        Ok(records) => Ok(records),
        Err(e) => {
            warn!(key = key.as_str(), error = %e, "Stored collection is unreadable, treating as empty");
            Ok(Vec::new())
        }
    }
}

/// Load a collection that is about to be rewritten. Unlike
/// [`read_collection`], a blob that exists but does not parse is a storage
/// error: writing back a partial list would drop every stored record.
pub fn read_collection_strict<T: DeserializeOwned>(
    store: &dyn Store,
    key: StoreKey,
) -> PosResult<Vec<T>> {
    let Some(raw) = store.load(key)? else {
        return Ok(Vec::new());
    };
    serde_json::from_str::<Vec<T>>(&raw).map_err(|e| {
        warn!(key = key.as_str(), error = %e, "Refusing to rewrite unreadable collection");
        PosError::Storage(format!("Stored {} could not be read: {e}", key.as_str()))
    })
}

/// Replace the whole collection stored under `key`.
pub fn write_collection<T: Serialize>(
    store: &dyn Store,
    key: StoreKey,
    records: &[T],
) -> PosResult<()> {
    let raw = serde_json::to_string(records)?;
    store.save(key, &raw)
}

/// Load a single JSON record stored under `key`.
pub fn read_record<T: DeserializeOwned>(store: &dyn Store, key: StoreKey) -> PosResult<Option<T>> {
    let Some(raw) = store.load(key)? else {
        return Ok(None);
    };
    match serde_json::from_str::<T>(&raw) {
        Ok(record) => Ok(Some(record)),
        Err(e) => {
            warn!(key = key.as_str(), error = %e, "Stored record is unreadable, ignoring");
            Ok(None)
        }
    }
}

pub fn write_record<T: Serialize>(store: &dyn Store, key: StoreKey, record: &T) -> PosResult<()> {
    let raw = serde_json::to_string(record)?;
    store.save(key, &raw)
}

/// Raw JSON view of a key, `null` when absent or unreadable.
pub fn read_json(store: &dyn Store, key: StoreKey) -> PosResult<serde_json::Value> {
    Ok(store
        .load(key)?
        .and_then(|raw| serde_json::from_str(&raw).ok())
        .unwrap_or(serde_json::Value::Null))
}

/// Next timestamp-derived id for a collection.
///
/// Uses `now_ms`, bumped past the largest numeric id already present so two
/// records created in the same millisecond still get distinct ids.
pub fn next_timestamp_id<'a>(now_ms: i64, existing: impl IntoIterator<Item = &'a str>) -> String {
    let max_existing = existing
        .into_iter()
        .filter_map(|id| id.parse::<i64>().ok())
        .max();
    let id = match max_existing {
        Some(max) if max >= now_ms => max + 1,
        _ => now_ms,
    };
    id.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Row {
        id: String,
    }

    fn exercise(store: &dyn Store) {
        let empty: Vec<Row> = read_collection(store, StoreKey::Items).unwrap();
        assert!(empty.is_empty());

        let rows = vec![Row { id: "1".into() }, Row { id: "2".into() }];
        write_collection(store, StoreKey::Items, &rows).unwrap();
        let loaded: Vec<Row> = read_collection(store, StoreKey::Items).unwrap();
        assert_eq!(loaded, rows);

        store.remove(StoreKey::Items).unwrap();
        let cleared: Vec<Row> = read_collection(store, StoreKey::Items).unwrap();
        assert!(cleared.is_empty());
    }

    #[test]
    fn test_memory_store_collections() {
        exercise(&MemoryStore::new());
    }

    #[test]
    fn test_sqlite_store_collections() {
        exercise(&db::init_in_memory());
    }

    #[test]
    fn test_corrupt_blob_reads_as_empty() {
        let store = MemoryStore::new();
        store.save(StoreKey::Sales, "{not json").unwrap();
        let sales: Vec<Row> = read_collection(&store, StoreKey::Sales).unwrap();
        assert!(sales.is_empty());
        let record: Option<Row> = read_record(&store, StoreKey::Sales).unwrap();
        assert!(record.is_none());
        assert!(read_json(&store, StoreKey::Sales).unwrap().is_null());
    }

    #[test]
    fn test_strict_read_rejects_unreadable_blob() {
        let store = MemoryStore::new();
        let missing: Vec<Row> = read_collection_strict(&store, StoreKey::Items).unwrap();
        assert!(missing.is_empty());

        store.save(StoreKey::Items, r#"[{"id":"1"},{"name":"no id"}]"#).unwrap();
        let err = read_collection_strict::<Row>(&store, StoreKey::Items).unwrap_err();
        assert!(matches!(err, PosError::Storage(_)));
        assert!(err.to_string().contains("pos-items"));
    }

    #[test]
    fn test_keys_match_persisted_layout() {
        assert_eq!(StoreKey::Categories.as_str(), "pos-categories");
        assert_eq!(StoreKey::Items.as_str(), "pos-items");
        assert_eq!(StoreKey::Sales.as_str(), "pos-sales");
        assert_eq!(StoreKey::Settings.as_str(), "pos-settings");
        assert_eq!(StoreKey::EditSaleFlag.as_str(), "editSaleId");
    }

    #[test]
    fn test_timestamp_ids_stay_unique_within_a_millisecond() {
        assert_eq!(next_timestamp_id(1_000, []), "1000");
        assert_eq!(next_timestamp_id(1_000, ["999"]), "1000");
        assert_eq!(next_timestamp_id(1_000, ["1000"]), "1001");
        assert_eq!(next_timestamp_id(1_000, ["abc", "1005"]), "1006");
    }
}
