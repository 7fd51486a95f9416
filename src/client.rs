use crate::errors::StoreError;
use crate::models::{
    Avatar, Category, Habit, Report, ResolutionEvidence, UserRecord, VerifiedActivity,
};
use crate::storage::{Collection, OrderBy, Record, RecordStore};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tracing::warn;

/// Fields supplied when a habit is shared with the community.
#[derive(Debug, Clone, Serialize)]
pub struct NewHabit {
    pub user_id: String,
    pub user_nickname: String,
    pub user_avatar: Avatar,
    pub category: Category,
    pub description: Option<String>,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewReport {
    pub user_id: String,
    pub user_nickname: String,
    pub user_avatar: Avatar,
    pub location: String,
    pub description: Option<String>,
    pub image_url: String,
}

/// Typed access to the record store. Every read-modify-write sequence runs
/// under [`StoreClient::write`], which serializes mutations in this process.
#[derive(Clone)]
pub struct StoreClient {
    store: Arc<dyn RecordStore>,
    write_lock: Arc<Mutex<()>>,
}

impl StoreClient {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            store,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn store(&self) -> &dyn RecordStore {
        self.store.as_ref()
    }

    pub async fn write(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock().await
    }

    pub async fn habits(&self) -> Result<Vec<Habit>, StoreError> {
        self.list(Collection::SharedHabits).await
    }

    pub async fn habit(&self, id: &str) -> Result<Option<Habit>, StoreError> {
        self.get(Collection::SharedHabits, id).await
    }

    pub async fn reports(&self) -> Result<Vec<Report>, StoreError> {
        self.list(Collection::SharedReports).await
    }

    pub async fn report(&self, id: &str) -> Result<Option<Report>, StoreError> {
        self.get(Collection::SharedReports, id).await
    }

    pub async fn users(&self) -> Result<Vec<UserRecord>, StoreError> {
        self.list(Collection::Users).await
    }

    pub async fn user(&self, id: &str) -> Result<Option<UserRecord>, StoreError> {
        self.get(Collection::Users, id).await
    }

    pub async fn user_by_nickname(&self, nickname: &str) -> Result<Option<UserRecord>, StoreError> {
        let nickname = nickname.trim().to_lowercase();
        Ok(self
            .users()
            .await?
            .into_iter()
            .find(|user| user.nickname == nickname))
    }

    pub async fn verified_activity(&self) -> Result<Vec<VerifiedActivity>, StoreError> {
        self.list(Collection::VerifiedActivity).await
    }

    pub async fn create_habit(&self, habit: NewHabit) -> Result<Habit, StoreError> {
        let mut record = encode(Collection::SharedHabits, &habit)?;
        record.insert("checks".to_string(), Value::Array(Vec::new()));
        record.insert("comments".to_string(), Value::Array(Vec::new()));
        record.insert("verified".to_string(), Value::Bool(false));
        let row = self.store.insert(Collection::SharedHabits, record).await?;
        decode(Collection::SharedHabits, row)
    }

    pub async fn create_report(&self, report: NewReport) -> Result<Report, StoreError> {
        let mut record = encode(Collection::SharedReports, &report)?;
        for key in ["checks", "comments", "resolution_evidences"] {
            record.insert(key.to_string(), Value::Array(Vec::new()));
        }
        record.insert("resolved".to_string(), Value::Bool(false));
        record.insert("verified".to_string(), Value::Bool(false));
        let row = self.store.insert(Collection::SharedReports, record).await?;
        decode(Collection::SharedReports, row)
    }

    pub async fn insert_user(&self, user: &UserRecord) -> Result<UserRecord, StoreError> {
        let record = encode(Collection::Users, user)?;
        let row = self.store.insert(Collection::Users, record).await?;
        decode(Collection::Users, row)
    }

    pub async fn record_verified(&self, activity: &VerifiedActivity) -> Result<(), StoreError> {
        let record = encode(Collection::VerifiedActivity, activity)?;
        self.store
            .insert(Collection::VerifiedActivity, record)
            .await
            .map(|_| ())
    }

    pub async fn save_checks(
        &self,
        collection: Collection,
        id: &str,
        checks: &[String],
        flag: (&str, bool),
    ) -> Result<(), StoreError> {
        let mut fields = Record::new();
        fields.insert("checks".to_string(), to_value(collection, checks)?);
        fields.insert(flag.0.to_string(), Value::Bool(flag.1));
        self.store.update_fields(collection, id, fields).await
    }

    pub async fn save_evidences(
        &self,
        report_id: &str,
        evidences: &[ResolutionEvidence],
        resolved: bool,
    ) -> Result<(), StoreError> {
        let mut fields = Record::new();
        fields.insert(
            "resolution_evidences".to_string(),
            to_value(Collection::SharedReports, evidences)?,
        );
        fields.insert("resolved".to_string(), Value::Bool(resolved));
        self.store
            .update_fields(Collection::SharedReports, report_id, fields)
            .await
    }

    /// Replaces a single field with the serialized value.
    pub async fn save_field<T: Serialize + ?Sized>(
        &self,
        collection: Collection,
        id: &str,
        field: &str,
        value: &T,
    ) -> Result<(), StoreError> {
        let mut fields = Record::new();
        fields.insert(field.to_string(), to_value(collection, value)?);
        self.store.update_fields(collection, id, fields).await
    }

    pub async fn delete(
        &self,
        collection: Collection,
        id: &str,
        owner: Option<&str>,
    ) -> Result<bool, StoreError> {
        self.store.delete_by_id(collection, id, owner).await
    }

    pub async fn upload_image(&self, bytes: &[u8], extension: &str) -> Result<String, StoreError> {
        self.store.upload_blob(bytes, extension).await
    }

    async fn list<T: DeserializeOwned>(
        &self,
        collection: Collection,
    ) -> Result<Vec<T>, StoreError> {
        let rows = self
            .store
            .select_all(collection, OrderBy::newest_first())
            .await?;
        Ok(rows
            .into_iter()
            .filter_map(|row| match decode(collection, row) {
                Ok(item) => Some(item),
                Err(err) => {
                    warn!("skipping unreadable row: {err}");
                    None
                }
            })
            .collect())
    }

    async fn get<T: DeserializeOwned>(
        &self,
        collection: Collection,
        id: &str,
    ) -> Result<Option<T>, StoreError> {
        self.store
            .select_by_id(collection, id)
            .await?
            .map(|row| decode(collection, row))
            .transpose()
    }
}

fn decode<T: DeserializeOwned>(collection: Collection, row: Record) -> Result<T, StoreError> {
    serde_json::from_value(Value::Object(row)).map_err(|err| StoreError::InvalidRecord {
        collection: collection.name(),
        reason: err.to_string(),
    })
}

fn encode<T: Serialize + ?Sized>(collection: Collection, value: &T) -> Result<Record, StoreError> {
    match to_value(collection, value)? {
        Value::Object(map) => Ok(map),
        _ => Err(StoreError::InvalidRecord {
            collection: collection.name(),
            reason: "record must serialize to an object".to_string(),
        }),
    }
}

fn to_value<T: Serialize + ?Sized>(collection: Collection, value: &T) -> Result<Value, StoreError> {
    serde_json::to_value(value).map_err(|err| StoreError::InvalidRecord {
        collection: collection.name(),
        reason: err.to_string(),
    })
}
