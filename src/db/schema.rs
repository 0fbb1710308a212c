//! Database schema initialization

use sqlx::SqlitePool;

/// Initialize the database schema
pub async fn initialize_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(SCHEMA_SQL)
        .execute(pool)
        .await?;

    Ok(())
}

const SCHEMA_SQL: &str = r#"
-- Inspection records (the full record is kept as JSON, listing columns alongside)
CREATE TABLE IF NOT EXISTS inspection_records (
    id TEXT PRIMARY KEY,
    form_id TEXT NOT NULL,
    category_id TEXT NOT NULL,
    title TEXT NOT NULL,
    status TEXT NOT NULL,
    record_json TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_records_form ON inspection_records(form_id);
CREATE INDEX IF NOT EXISTS idx_records_status ON inspection_records(status);
CREATE INDEX IF NOT EXISTS idx_records_updated ON inspection_records(updated_at);
"#;
