mod file;
mod log;
mod models;

pub use file::FileBackend;
pub use log::JsonLog;
pub use models::*;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::Arc;

use crate::error::StoreError;

pub type DbPool = Arc<PgPool>;

pub const SUBMISSIONS_KEY: &str = "submissions";
pub const NOTIFICATIONS_KEY: &str = "userNotifications";
pub const AUDIT_KEY: &str = "adminLog";
pub const RECEIPTS_KEY: &str = "receipts";

pub fn preferences_key(actor: &str) -> String {
    format!("preferences_{}", actor)
}

pub async fn create_pool(database_url: &str) -> Result<DbPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await?;

    Ok(Arc::new(pool))
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

/// The shared key/value space every actor reads and writes. Values are whole
/// documents; logs are append-only sequences of entries.
#[derive(Debug)]
pub enum Backend {
    File(FileBackend),
    Postgres(DbPool),
}

impl Backend {
    pub async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        match self {
            Backend::File(files) => files.get(key).await,
            Backend::Postgres(pool) => {
                let value: Option<String> =
                    sqlx::query_scalar("SELECT value FROM kv_store WHERE key = $1")
                        .bind(key)
                        .fetch_optional(pool.as_ref())
                        .await?;
                Ok(value)
            }
        }
    }

    /// Replaces the value under `key` in one step; readers never observe a
    /// partial write.
    pub async fn put(&self, key: &str, value: String) -> Result<(), StoreError> {
        match self {
            Backend::File(files) => files.put(key, value).await,
            Backend::Postgres(pool) => {
                sqlx::query(
                    r#"
                    INSERT INTO kv_store (key, value, updated_at)
                    VALUES ($1, $2, now())
                    ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, updated_at = now()
                    "#,
                )
                .bind(key)
                .bind(value)
                .execute(pool.as_ref())
                .await?;
                Ok(())
            }
        }
    }

    pub async fn append(&self, key: &str, entry: String) -> Result<(), StoreError> {
        match self {
            Backend::File(files) => files.append(key, entry).await,
            Backend::Postgres(pool) => {
                sqlx::query("INSERT INTO kv_log (key, value) VALUES ($1, $2)")
                    .bind(key)
                    .bind(entry)
                    .execute(pool.as_ref())
                    .await?;
                Ok(())
            }
        }
    }

    pub async fn read_log(&self, key: &str) -> Result<Vec<String>, StoreError> {
        match self {
            Backend::File(files) => files.read_log(key).await,
            Backend::Postgres(pool) => {
                let entries: Vec<String> =
                    sqlx::query_scalar("SELECT value FROM kv_log WHERE key = $1 ORDER BY seq")
                        .bind(key)
                        .fetch_all(pool.as_ref())
                        .await?;
                Ok(entries)
            }
        }
    }
}
