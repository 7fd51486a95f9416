use crate::errors::StoreError;
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::{
    cmp::Ordering,
    collections::BTreeMap,
    path::{Path, PathBuf},
};
use tokio::{fs, sync::Mutex};
use tracing::{debug, error};

pub type Record = Map<String, Value>;

pub const MAX_BLOB_BYTES: usize = 10_000_000;
pub const BLOB_URL_PREFIX: &str = "/blobs";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Collection {
    Users,
    SharedHabits,
    SharedReports,
    VerifiedActivity,
}

impl Collection {
    pub fn name(self) -> &'static str {
        match self {
            Collection::Users => "users",
            Collection::SharedHabits => "shared_habits",
            Collection::SharedReports => "shared_reports",
            Collection::VerifiedActivity => "verified_activity",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct OrderBy {
    pub field: &'static str,
    pub descending: bool,
}

impl OrderBy {
    pub const fn newest_first() -> Self {
        Self {
            field: "created_at",
            descending: true,
        }
    }
}

/// Table-like persistence collaborator. Records are JSON objects keyed by a
/// string `id`.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Inserts a record, assigning `id` and `created_at` when absent, and
    /// returns the stored row.
    async fn insert(&self, collection: Collection, record: Record) -> Result<Record, StoreError>;

    async fn select_all(
        &self,
        collection: Collection,
        order: OrderBy,
    ) -> Result<Vec<Record>, StoreError>;

    async fn select_by_id(
        &self,
        collection: Collection,
        id: &str,
    ) -> Result<Option<Record>, StoreError>;

    /// Overwrites the given top-level fields of one record.
    async fn update_fields(
        &self,
        collection: Collection,
        id: &str,
        fields: Record,
    ) -> Result<(), StoreError>;

    /// Returns whether a row was removed. With an owner filter only a row
    /// whose `user_id` matches is removed.
    async fn delete_by_id(
        &self,
        collection: Collection,
        id: &str,
        owner: Option<&str>,
    ) -> Result<bool, StoreError>;

    /// Stores the bytes and returns the public URL they are served under.
    async fn upload_blob(&self, bytes: &[u8], extension: &str) -> Result<String, StoreError>;

    async fn fetch_blob(&self, name: &str) -> Result<Option<Vec<u8>>, StoreError>;
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StoreData {
    #[serde(default)]
    pub collections: BTreeMap<String, Vec<Record>>,
}

/// Single JSON document holding every collection, rewritten after each
/// mutation. Without a path it never touches the disk.
pub struct JsonStore {
    data_path: Option<PathBuf>,
    blob_dir: Option<PathBuf>,
    data: Mutex<StoreData>,
    memory_blobs: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl JsonStore {
    pub async fn open(data_path: PathBuf, blob_dir: PathBuf) -> Result<Self, StoreError> {
        if let Some(parent) = data_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::create_dir_all(&blob_dir).await?;
        let data = load_data(&data_path).await;
        Ok(Self {
            data_path: Some(data_path),
            blob_dir: Some(blob_dir),
            data: Mutex::new(data),
            memory_blobs: Mutex::new(BTreeMap::new()),
        })
    }

    pub fn in_memory() -> Self {
        Self {
            data_path: None,
            blob_dir: None,
            data: Mutex::new(StoreData::default()),
            memory_blobs: Mutex::new(BTreeMap::new()),
        }
    }

    async fn persist(&self, data: &StoreData) -> Result<(), StoreError> {
        match &self.data_path {
            Some(path) => persist_data(path, data).await,
            None => Ok(()),
        }
    }
}

#[async_trait]
impl RecordStore for JsonStore {
    async fn insert(
        &self,
        collection: Collection,
        mut record: Record,
    ) -> Result<Record, StoreError> {
        if !matches!(record.get("id"), Some(Value::String(id)) if !id.is_empty()) {
            record.insert(
                "id".to_string(),
                Value::String(uuid::Uuid::new_v4().to_string()),
            );
        }
        if !record.contains_key("created_at") {
            record.insert(
                "created_at".to_string(),
                Value::String(Utc::now().to_rfc3339()),
            );
        }

        let mut data = self.data.lock().await;
        data.collections
            .entry(collection.name().to_string())
            .or_default()
            .push(record.clone());
        self.persist(&data).await?;
        Ok(record)
    }

    async fn select_all(
        &self,
        collection: Collection,
        order: OrderBy,
    ) -> Result<Vec<Record>, StoreError> {
        let data = self.data.lock().await;
        let mut rows = data
            .collections
            .get(collection.name())
            .cloned()
            .unwrap_or_default();
        rows.sort_by(|left, right| {
            let ordering = compare_field(left, right, order.field);
            if order.descending {
                ordering.reverse()
            } else {
                ordering
            }
        });
        Ok(rows)
    }

    async fn select_by_id(
        &self,
        collection: Collection,
        id: &str,
    ) -> Result<Option<Record>, StoreError> {
        let data = self.data.lock().await;
        Ok(data
            .collections
            .get(collection.name())
            .and_then(|rows| rows.iter().find(|row| record_id(row) == Some(id)))
            .cloned())
    }

    async fn update_fields(
        &self,
        collection: Collection,
        id: &str,
        fields: Record,
    ) -> Result<(), StoreError> {
        let mut data = self.data.lock().await;
        let row = data
            .collections
            .get_mut(collection.name())
            .and_then(|rows| rows.iter_mut().find(|row| record_id(row) == Some(id)))
            .ok_or_else(|| StoreError::NotFound {
                collection: collection.name(),
                id: id.to_string(),
            })?;
        for (key, value) in fields {
            row.insert(key, value);
        }
        self.persist(&data).await
    }

    async fn delete_by_id(
        &self,
        collection: Collection,
        id: &str,
        owner: Option<&str>,
    ) -> Result<bool, StoreError> {
        let mut data = self.data.lock().await;
        let Some(rows) = data.collections.get_mut(collection.name()) else {
            return Ok(false);
        };
        let before = rows.len();
        rows.retain(|row| {
            let id_matches = record_id(row) == Some(id);
            let owner_matches = match owner {
                Some(owner) => row.get("user_id").and_then(Value::as_str) == Some(owner),
                None => true,
            };
            !(id_matches && owner_matches)
        });
        let removed = rows.len() != before;
        if removed {
            self.persist(&data).await?;
        }
        Ok(removed)
    }

    async fn upload_blob(&self, bytes: &[u8], extension: &str) -> Result<String, StoreError> {
        let name = format!("{}.{}", uuid::Uuid::new_v4(), sanitize_extension(extension));
        match &self.blob_dir {
            Some(dir) => fs::write(dir.join(&name), bytes).await?,
            None => {
                self.memory_blobs
                    .lock()
                    .await
                    .insert(name.clone(), bytes.to_vec());
            }
        }
        debug!("stored blob {name} ({} bytes)", bytes.len());
        Ok(format!("{BLOB_URL_PREFIX}/{name}"))
    }

    async fn fetch_blob(&self, name: &str) -> Result<Option<Vec<u8>>, StoreError> {
        if !is_blob_name(name) {
            return Ok(None);
        }
        match &self.blob_dir {
            Some(dir) => match fs::read(dir.join(name)).await {
                Ok(bytes) => Ok(Some(bytes)),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
                Err(err) => Err(err.into()),
            },
            None => Ok(self.memory_blobs.lock().await.get(name).cloned()),
        }
    }
}

pub async fn load_data(path: &Path) -> StoreData {
    match fs::read(path).await {
        Ok(bytes) => match serde_json::from_slice(&bytes) {
            Ok(data) => data,
            Err(err) => {
                error!("failed to parse data file: {err}");
                StoreData::default()
            }
        },
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => StoreData::default(),
        Err(err) => {
            error!("failed to read data file: {err}");
            StoreData::default()
        }
    }
}

pub async fn persist_data(path: &Path, data: &StoreData) -> Result<(), StoreError> {
    let payload = serde_json::to_vec_pretty(data)?;
    fs::write(path, payload).await?;
    Ok(())
}

fn record_id(row: &Record) -> Option<&str> {
    row.get("id").and_then(Value::as_str)
}

fn compare_field(left: &Record, right: &Record, field: &str) -> Ordering {
    match (left.get(field), right.get(field)) {
        (Some(Value::String(a)), Some(Value::String(b))) => a.cmp(b),
        (Some(Value::Number(a)), Some(Value::Number(b))) => a
            .as_f64()
            .partial_cmp(&b.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        _ => Ordering::Equal,
    }
}

fn sanitize_extension(extension: &str) -> String {
    let cleaned: String = extension
        .trim_start_matches('.')
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .take(8)
        .collect::<String>()
        .to_ascii_lowercase();
    if cleaned.is_empty() {
        "bin".to_string()
    } else {
        cleaned
    }
}

fn is_blob_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '.')
        && !name.starts_with('.')
        && !name.contains("..")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[tokio::test]
    async fn insert_assigns_id_and_timestamp() {
        let store = JsonStore::in_memory();
        let row = store
            .insert(Collection::SharedHabits, record(json!({ "user_id": "u1" })))
            .await
            .unwrap();
        assert!(row.get("id").and_then(Value::as_str).is_some());
        assert!(row.get("created_at").and_then(Value::as_str).is_some());
    }

    #[tokio::test]
    async fn select_all_orders_newest_first() {
        let store = JsonStore::in_memory();
        for stamp in ["2025-01-02T00:00:00Z", "2025-01-03T00:00:00Z", "2025-01-01T00:00:00Z"] {
            store
                .insert(Collection::SharedReports, record(json!({ "created_at": stamp })))
                .await
                .unwrap();
        }
        let rows = store
            .select_all(Collection::SharedReports, OrderBy::newest_first())
            .await
            .unwrap();
        let stamps: Vec<_> = rows
            .iter()
            .map(|row| row["created_at"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(
            stamps,
            vec![
                "2025-01-03T00:00:00Z",
                "2025-01-02T00:00:00Z",
                "2025-01-01T00:00:00Z"
            ]
        );
    }

    #[tokio::test]
    async fn update_missing_record_is_not_found() {
        let store = JsonStore::in_memory();
        let err = store
            .update_fields(Collection::SharedHabits, "missing", Record::new())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn delete_respects_owner_filter() {
        let store = JsonStore::in_memory();
        let row = store
            .insert(Collection::SharedReports, record(json!({ "user_id": "owner" })))
            .await
            .unwrap();
        let id = row["id"].as_str().unwrap().to_string();

        let removed = store
            .delete_by_id(Collection::SharedReports, &id, Some("someone-else"))
            .await
            .unwrap();
        assert!(!removed);

        let removed = store
            .delete_by_id(Collection::SharedReports, &id, Some("owner"))
            .await
            .unwrap();
        assert!(removed);
        assert!(store
            .select_by_id(Collection::SharedReports, &id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn blobs_round_trip_in_memory() {
        let store = JsonStore::in_memory();
        let url = store.upload_blob(b"jpeg bytes", ".JPG").await.unwrap();
        assert!(url.starts_with("/blobs/"));
        assert!(url.ends_with(".jpg"));
        let name = url.trim_start_matches("/blobs/");
        let bytes = store.fetch_blob(name).await.unwrap();
        assert_eq!(bytes.as_deref(), Some(&b"jpeg bytes"[..]));
        assert!(store.fetch_blob("../state.json").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn file_store_reloads_after_restart() {
        let dir = std::env::temp_dir().join(format!("recycle_store_{}", uuid::Uuid::new_v4()));
        let data_path = dir.join("state.json");
        let blob_dir = dir.join("blobs");

        let store = JsonStore::open(data_path.clone(), blob_dir.clone()).await.unwrap();
        store
            .insert(Collection::Users, record(json!({ "id": "u1", "nickname": "alice" })))
            .await
            .unwrap();
        drop(store);

        let reopened = JsonStore::open(data_path, blob_dir).await.unwrap();
        let row = reopened
            .select_by_id(Collection::Users, "u1")
            .await
            .unwrap()
            .expect("persisted user");
        assert_eq!(row["nickname"], "alice");
        let _ = std::fs::remove_dir_all(dir);
    }
}
