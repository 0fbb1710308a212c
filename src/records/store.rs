//! Record persistence
//!
//! `RecordStore` is the adapter the core needs: put/get/delete/list by id.
//! `SqliteRecordStore` is the durable backend, `MemoryRecordStore` backs
//! tests and ephemeral sessions.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::SecondsFormat;
use sqlx::SqlitePool;
use tokio::sync::RwLock;

use super::types::{InspectionRecord, StorageError};

/// Key-value store for inspection records
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert or replace by id
    async fn put(&self, record: &InspectionRecord) -> Result<(), StorageError>;

    async fn get(&self, id: &str) -> Result<Option<InspectionRecord>, StorageError>;

    /// Returns whether a record was removed
    async fn delete(&self, id: &str) -> Result<bool, StorageError>;

    /// All records, most recently updated first
    async fn list(&self) -> Result<Vec<InspectionRecord>, StorageError>;
}

// ============================================================================
// SQLite
// ============================================================================

/// SQLite-backed record store
#[derive(Clone)]
pub struct SqliteRecordStore {
    pool: SqlitePool,
}

impl SqliteRecordStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn timestamp(dt: &chrono::DateTime<chrono::Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn put(&self, record: &InspectionRecord) -> Result<(), StorageError> {
        let record_json = serde_json::to_string(record)?;

        sqlx::query(
            r#"
            INSERT INTO inspection_records (
                id, form_id, category_id, title, status, record_json, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                status = excluded.status,
                record_json = excluded.record_json,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&record.id)
        .bind(&record.form_id)
        .bind(&record.category_id)
        .bind(&record.title)
        .bind(record.status.as_str())
        .bind(&record_json)
        .bind(timestamp(&record.created_at))
        .bind(timestamp(&record.updated_at))
        .execute(&self.pool)
        .await?;

        tracing::debug!(record_id = %record.id, status = record.status.as_str(), "Stored record");

        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<InspectionRecord>, StorageError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT record_json FROM inspection_records WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        match row {
            Some((json,)) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn delete(&self, id: &str) -> Result<bool, StorageError> {
        let result = sqlx::query("DELETE FROM inspection_records WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list(&self) -> Result<Vec<InspectionRecord>, StorageError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT record_json FROM inspection_records ORDER BY updated_at DESC, id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(json,)| serde_json::from_str(&json).map_err(StorageError::from))
            .collect()
    }
}

// ============================================================================
// In-memory
// ============================================================================

/// In-memory record store
#[derive(Default)]
pub struct MemoryRecordStore {
    records: RwLock<HashMap<String, InspectionRecord>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn put(&self, record: &InspectionRecord) -> Result<(), StorageError> {
        let mut records = self.records.write().await;
        records.insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<InspectionRecord>, StorageError> {
        let records = self.records.read().await;
        Ok(records.get(id).cloned())
    }

    async fn delete(&self, id: &str) -> Result<bool, StorageError> {
        let mut records = self.records.write().await;
        Ok(records.remove(id).is_some())
    }

    async fn list(&self) -> Result<Vec<InspectionRecord>, StorageError> {
        let records = self.records.read().await;
        let mut all: Vec<InspectionRecord> = records.values().cloned().collect();
        all.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| a.id.cmp(&b.id)));
        Ok(all)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_memory_pool;
    use crate::form::{FieldSpec, FieldType, FormSchema};
    use crate::records::RecordStatus;

    fn schema() -> FormSchema {
        FormSchema {
            id: "pump".to_string(),
            name: "Pump Check".to_string(),
            category_id: "equipment".to_string(),
            description: None,
            fields: vec![FieldSpec::new("serial", FieldType::Text, "Serial")],
            pdf_template_ref: None,
            estimated_minutes: 5,
        }
    }

    async fn exercise(store: &dyn RecordStore) {
        let form = schema();
        let mut first = InspectionRecord::new(&form, Some("First"));
        first.data.set("serial", "SN-1");
        store.put(&first).await.unwrap();

        let mut second = InspectionRecord::new(&form, Some("Second"));
        second.updated_at = first.updated_at + chrono::Duration::seconds(5);
        store.put(&second).await.unwrap();

        let loaded = store.get(&first.id).await.unwrap().unwrap();
        assert_eq!(loaded, first);

        // Upsert by id
        first.status = RecordStatus::Exported;
        first.updated_at = second.updated_at + chrono::Duration::seconds(5);
        store.put(&first).await.unwrap();
        assert_eq!(
            store.get(&first.id).await.unwrap().unwrap().status,
            RecordStatus::Exported
        );

        let listed = store.list().await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, first.id);

        assert!(store.delete(&first.id).await.unwrap());
        assert!(!store.delete(&first.id).await.unwrap());
        assert!(store.get(&first.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sqlite_store() {
        let pool = create_memory_pool().await.unwrap();
        let store = SqliteRecordStore::new(pool);
        exercise(&store).await;
    }

    #[tokio::test]
    async fn test_memory_store() {
        let store = MemoryRecordStore::new();
        exercise(&store).await;
    }
}
