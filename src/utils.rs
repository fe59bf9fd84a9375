//! Helper functions could be used in api/, whatsapp/, web/, ...

use crate::config::AppConfig;
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqliteJournalMode},
};
use std::{future::Future, str::FromStr};

const MIGRATION_MESSAGING: &str = include_str!("../migrations/001_whatsapp_messaging.sql");

pub async fn setup_sqlite_db_pool(app_config: &AppConfig) -> anyhow::Result<SqlitePool> {
    if app_config.is_prod() {
        return Ok(SqlitePool::connect_with(
            SqliteConnectOptions::from_str(&app_config.db_host)?
                .pragma("key", app_config.db_pass_encrypt.clone())
                .pragma("cipher_page_size", "1024")
                .pragma("kdf_iter", "64000")
                .pragma("cipher_hmac_algorithm", "HMAC_SHA1")
                .pragma("cipher_kdf_algorithm", "PBKDF2_HMAC_SHA1")
                .pragma("foreign_keys", "ON")
                .journal_mode(SqliteJournalMode::Delete)
                .create_if_missing(true),
        )
        .await?);
    }

    Ok(SqlitePool::connect_with(
        SqliteConnectOptions::from_str(&app_config.db_host)?
            .pragma("foreign_keys", "ON")
            .create_if_missing(true),
    )
    .await?)
}

/// Creates the messaging tables when they don't exist yet.
pub async fn run_migrations(db_pool: &SqlitePool) -> anyhow::Result<()> {
    sqlx::raw_sql(MIGRATION_MESSAGING).execute(db_pool).await?;
    Ok(())
}

/// Awaits a side-channel write and records its outcome without propagating it.
///
/// Chat session and message log writes go through here so a storage hiccup
/// never fails the send or receive that triggered them.
pub async fn best_effort<T, F>(what: &str, write: F) -> Option<T>
where
    F: Future<Output = anyhow::Result<T>>,
{
    match write.await {
        Ok(value) => Some(value),
        Err(e) => {
            logfire::warn!(
                "best-effort write failed ({what}): {error}",
                what = what.to_string(),
                error = e.to_string()
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[ntex::test]
    async fn test_best_effort_swallows_errors() {
        assert_eq!(best_effort("ok", async { Ok(3) }).await, Some(3));
        assert_eq!(
            best_effort::<(), _>("boom", async { Err(anyhow::anyhow!("db is gone")) }).await,
            None
        );
    }
}
