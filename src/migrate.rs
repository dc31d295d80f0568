use sqlx::SqlitePool;

use crate::error::Result;

/// Create the index schema. Idempotent.
///
/// `records` holds every chunk of both channels; `seq` gives insertion order
/// for retention. `index_meta` remembers which embedding model wrote the
/// vectors.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS records (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            id TEXT NOT NULL UNIQUE,
            text TEXT NOT NULL,
            channel TEXT NOT NULL,
            source TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            embedding BLOB NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS index_meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_records_channel ON records(channel)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_records_source ON records(source)")
        .execute(pool)
        .await?;

    Ok(())
}
