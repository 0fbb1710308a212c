//! Inspection records and their persistence

mod store;
mod types;

pub use store::{MemoryRecordStore, RecordStore, SqliteRecordStore};
pub use types::{collect_photos, generate_record_id, InspectionRecord, RecordStatus, StorageError};
