use std::path::PathBuf;

use anyhow::Context;
use serde::Deserialize;

/// Storage selection. A configured `DATABASE_URL` picks the networked
/// Postgres engine; otherwise the embedded SQLite file is used.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub sqlite_path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenConfig {
    pub secret: String,
    pub ttl_days: i64,
}

/// External identity provider. All fields optional: with no base URL or
/// anon key the delegate reports every token as unknown.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IdpConfig {
    pub base_url: Option<String>,
    pub anon_key: Option<String>,
    pub service_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub token: TokenConfig,
    pub idp: IdpConfig,
}

impl AppConfig {
    /// Reads the environment exactly once at startup. Components receive
    /// this struct through their constructors and never touch env state.
    pub fn from_env() -> anyhow::Result<Self> {
        let database = DatabaseConfig {
            url: std::env::var("DATABASE_URL").ok(),
            sqlite_path: std::env::var("USERS_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| default_sqlite_path()),
        };

        // No baked-in fallback secret: tokens signed with a known default
        // would be forgeable, so startup fails instead.
        let secret = std::env::var("SECRET_KEY")
            .context("SECRET_KEY must be set; refusing to sign tokens with a default secret")?;

        let token = TokenConfig {
            secret,
            ttl_days: std::env::var("TOKEN_TTL_DAYS")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(7),
        };

        let idp = IdpConfig {
            base_url: std::env::var("IDP_URL").ok(),
            anon_key: std::env::var("IDP_ANON_KEY").ok(),
            service_key: std::env::var("IDP_SERVICE_KEY").ok(),
        };

        Ok(Self {
            database,
            token,
            idp,
        })
    }
}

fn default_sqlite_path() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join("users.db")))
        .unwrap_or_else(|| PathBuf::from("users.db"))
}
