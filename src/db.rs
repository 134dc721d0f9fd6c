use std::sync::Once;

use anyhow::Context;
use sqlx::any::{AnyArguments, AnyPoolOptions};
use sqlx::{Any, AnyConnection, AnyPool, Row};
use tracing::info;

use crate::config::DatabaseConfig;

static DRIVERS: Once = Once::new();

/// Which relational engine backs the pool. Callers only consult this to
/// phrase INSERT statements; everything else is engine-neutral.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Sqlite,
    Postgres,
}

/// Uniform handle over the embedded (SQLite file) and networked (Postgres)
/// engines. Connections are pooled; each logical unit of work acquires one
/// for its duration and releases it on every exit path.
///
/// SQLite accepts the `$n` placeholder form, so non-insert statements share
/// a single SQL string across both backends.
#[derive(Clone)]
pub struct Db {
    pool: AnyPool,
    backend: Backend,
}

impl Db {
    /// Connects per the selection policy: a configured network URL wins,
    /// otherwise the embedded engine at the configured file path.
    /// Misconfiguration is fatal here, not per-request.
    pub async fn connect(cfg: &DatabaseConfig) -> anyhow::Result<Self> {
        DRIVERS.call_once(sqlx::any::install_default_drivers);

        let (url, backend) = match &cfg.url {
            Some(url) => (url.clone(), Backend::Postgres),
            None => (
                // mode=rwc lets a fresh deployment create the file.
                format!("sqlite://{}?mode=rwc", cfg.sqlite_path.display()),
                Backend::Sqlite,
            ),
        };

        let pool = AnyPoolOptions::new()
            .max_connections(10)
            .connect(&url)
            .await
            .context("connect to database")?;

        info!(backend = ?backend, "database connected");
        Ok(Self { pool, backend })
    }

    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    /// Creates the three tables if absent. Idempotent, run on every start.
    ///
    /// Timestamps are stored as RFC 3339 TEXT written by the application:
    /// the Any driver exposes no engine-native datetime, and the textual
    /// form orders chronologically. Preference flags are INTEGER so both
    /// engines decode them identically.
    pub async fn init_schema(&self) -> anyhow::Result<()> {
        let statements: &[&str] = match self.backend {
            Backend::Postgres => &[
                r#"
                CREATE TABLE IF NOT EXISTS users (
                    id BIGSERIAL PRIMARY KEY,
                    email TEXT UNIQUE NOT NULL,
                    name TEXT NOT NULL,
                    password_hash TEXT NOT NULL,
                    created_at TEXT NOT NULL
                )
                "#,
                r#"
                CREATE TABLE IF NOT EXISTS favorite_cities (
                    id BIGSERIAL PRIMARY KEY,
                    user_id BIGINT NOT NULL,
                    city_name TEXT NOT NULL,
                    added_at TEXT NOT NULL,
                    UNIQUE (user_id, city_name)
                )
                "#,
                r#"
                CREATE TABLE IF NOT EXISTS user_preferences (
                    id BIGSERIAL PRIMARY KEY,
                    user_id BIGINT UNIQUE NOT NULL,
                    theme TEXT NOT NULL DEFAULT 'dark',
                    notifications_enabled INTEGER NOT NULL DEFAULT 1,
                    alert_threshold INTEGER NOT NULL DEFAULT 150
                )
                "#,
            ],
            Backend::Sqlite => &[
                r#"
                CREATE TABLE IF NOT EXISTS users (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    email TEXT UNIQUE NOT NULL,
                    name TEXT NOT NULL,
                    password_hash TEXT NOT NULL,
                    created_at TEXT NOT NULL
                )
                "#,
                r#"
                CREATE TABLE IF NOT EXISTS favorite_cities (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id INTEGER NOT NULL,
                    city_name TEXT NOT NULL,
                    added_at TEXT NOT NULL,
                    FOREIGN KEY (user_id) REFERENCES users (id),
                    UNIQUE (user_id, city_name)
                )
                "#,
                r#"
                CREATE TABLE IF NOT EXISTS user_preferences (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id INTEGER UNIQUE NOT NULL,
                    theme TEXT NOT NULL DEFAULT 'dark',
                    notifications_enabled INTEGER NOT NULL DEFAULT 1,
                    alert_threshold INTEGER NOT NULL DEFAULT 150,
                    FOREIGN KEY (user_id) REFERENCES users (id)
                )
                "#,
            ],
        };

        for sql in statements {
            sqlx::query(sql)
                .execute(&self.pool)
                .await
                .context("create schema")?;
        }
        Ok(())
    }
}

/// Runs an INSERT and returns the new row id as a plain integer, hiding
/// how each engine reports it: Postgres via a `RETURNING id` clause the
/// caller already appended, SQLite via the auto-increment rowid.
pub async fn insert_id<'q>(
    conn: &mut AnyConnection,
    backend: Backend,
    query: sqlx::query::Query<'q, Any, AnyArguments<'q>>,
) -> sqlx::Result<i64> {
    match backend {
        Backend::Postgres => {
            let row = query.fetch_one(&mut *conn).await?;
            row.try_get(0)
        }
        Backend::Sqlite => {
            let done = query.execute(&mut *conn).await?;
            done.last_insert_id().ok_or(sqlx::Error::RowNotFound)
        }
    }
}

/// True when the error is a unique-constraint violation on either engine.
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.is_unique_violation(),
        _ => false,
    }
}
