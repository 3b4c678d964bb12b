//! # Credential Store
//!
//! Durable mapping of users to their registered credentials, backed by SQLite.
//!
//! - `models`: `User`, `StoredCredential` and their row types
//! - `users`: user lookup and idempotent creation
//! - `credentials`: credential insert, lookup and counter updates
//!
//! Both submodules add methods to [`CredentialStore`]. Uniqueness is left to
//! the database (`PRIMARY KEY`, `UNIQUE`, `ON CONFLICT DO NOTHING`) so that
//! concurrent requests cannot create duplicates between a check and an insert.

pub mod credentials;
pub mod models;
pub mod users;

use crate::error::AppResult;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool};
use std::str::FromStr;

/// Handle to the credential database. Cheap to clone.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    pool: SqlitePool,
}

impl CredentialStore {
    /// Connects to `database_url` and brings the schema up to date.
    pub async fn connect(database_url: &str) -> AppResult<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?.foreign_keys(true);
        let pool = SqlitePool::connect_with(options).await?;
        Self::from_pool(pool).await
    }

    /// Wraps an existing pool, running migrations on it.
    pub async fn from_pool(pool: SqlitePool) -> AppResult<Self> {
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    /// A fresh in-memory store.
    ///
    /// Every connection to `sqlite::memory:` opens its own database, so the
    /// pool is capped at one connection.
    #[cfg(test)]
    pub async fn in_memory() -> AppResult<Self> {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        Self::from_pool(pool).await
    }

    /// The underlying pool, shared with the session store.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
