use rand::{distributions::Alphanumeric, Rng};
use serde::Serialize;
use sqlx::any::AnyRow;
use sqlx::{FromRow, Row};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::{debug, info};

use crate::auth::password;
use crate::db::{insert_id, is_unique_violation, Backend, Db};
use crate::error::AuthError;

/// Local identity record. Owned by this module; never mutated after
/// creation.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub name: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize)]
pub struct FavoriteCity {
    pub city: String,
    #[serde(with = "time::serde::rfc3339")]
    pub added_at: OffsetDateTime,
}

/// One row per user, created in the same transaction as the user itself.
#[derive(Debug, Clone, Serialize)]
pub struct UserPreference {
    pub user_id: i64,
    pub theme: String,
    pub notifications_enabled: bool,
    pub alert_threshold: i32,
}

fn parse_timestamp(raw: &str, column: &str) -> sqlx::Result<OffsetDateTime> {
    OffsetDateTime::parse(raw, &Rfc3339).map_err(|e| sqlx::Error::ColumnDecode {
        index: column.into(),
        source: Box::new(e),
    })
}

impl FromRow<'_, AnyRow> for User {
    fn from_row(row: &AnyRow) -> sqlx::Result<Self> {
        let created_at: String = row.try_get("created_at")?;
        Ok(Self {
            id: row.try_get("id")?,
            email: row.try_get("email")?,
            name: row.try_get("name")?,
            password_hash: row.try_get("password_hash")?,
            created_at: parse_timestamp(&created_at, "created_at")?,
        })
    }
}

impl FromRow<'_, AnyRow> for FavoriteCity {
    fn from_row(row: &AnyRow) -> sqlx::Result<Self> {
        let added_at: String = row.try_get("added_at")?;
        Ok(Self {
            city: row.try_get("city_name")?,
            added_at: parse_timestamp(&added_at, "added_at")?,
        })
    }
}

impl FromRow<'_, AnyRow> for UserPreference {
    fn from_row(row: &AnyRow) -> sqlx::Result<Self> {
        let notifications: i32 = row.try_get("notifications_enabled")?;
        Ok(Self {
            user_id: row.try_get("user_id")?,
            theme: row.try_get("theme")?,
            notifications_enabled: notifications != 0,
            alert_threshold: row.try_get("alert_threshold")?,
        })
    }
}

/// Truncated to whole seconds so the textual ordering of `added_at` is
/// exact; same-second inserts are tie-broken by row id.
fn now_rfc3339() -> String {
    let now = OffsetDateTime::now_utc();
    let now = now.replace_nanosecond(0).unwrap_or(now);
    now.format(&Rfc3339).unwrap_or_else(|_| now.to_string())
}

/// Exact lookup; email case is preserved as registered, no normalization.
pub async fn find_by_email(db: &Db, email: &str) -> sqlx::Result<Option<User>> {
    sqlx::query_as::<_, User>(
        "SELECT id, email, name, password_hash, created_at FROM users WHERE email = $1",
    )
    .bind(email)
    .fetch_optional(db.pool())
    .await
}

/// Inserts the user and its default preference row in one transaction:
/// concurrent registrations can never leave a user without preferences.
pub async fn create_user(
    db: &Db,
    email: &str,
    name: &str,
    password: &str,
) -> Result<i64, AuthError> {
    let password_hash = password::hash_password(password)?;
    let created_at = now_rfc3339();

    let mut tx = db.pool().begin().await?;

    let sql = match db.backend() {
        Backend::Postgres => {
            "INSERT INTO users (email, name, password_hash, created_at) \
             VALUES ($1, $2, $3, $4) RETURNING id"
        }
        Backend::Sqlite => {
            "INSERT INTO users (email, name, password_hash, created_at) \
             VALUES ($1, $2, $3, $4)"
        }
    };
    let insert = sqlx::query(sql)
        .bind(email)
        .bind(name)
        .bind(&password_hash)
        .bind(&created_at);

    let user_id = match insert_id(&mut tx, db.backend(), insert).await {
        Ok(id) => id,
        Err(e) if is_unique_violation(&e) => return Err(AuthError::DuplicateEmail),
        Err(e) => return Err(e.into()),
    };

    sqlx::query("INSERT INTO user_preferences (user_id) VALUES ($1)")
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    info!(user_id, email, "user created");
    Ok(user_id)
}

pub async fn find_preferences(db: &Db, user_id: i64) -> sqlx::Result<Option<UserPreference>> {
    sqlx::query_as::<_, UserPreference>(
        "SELECT user_id, theme, notifications_enabled, alert_threshold \
         FROM user_preferences WHERE user_id = $1",
    )
    .bind(user_id)
    .fetch_optional(db.pool())
    .await
}

/// Newest first.
pub async fn list_favorites(db: &Db, user_id: i64) -> sqlx::Result<Vec<FavoriteCity>> {
    sqlx::query_as::<_, FavoriteCity>(
        "SELECT city_name, added_at FROM favorite_cities \
         WHERE user_id = $1 ORDER BY added_at DESC, id DESC",
    )
    .bind(user_id)
    .fetch_all(db.pool())
    .await
}

/// Returns false when the (user, city) pair already exists. Duplicate
/// adds are a no-op outcome, not an error.
pub async fn add_favorite(db: &Db, user_id: i64, city: &str) -> sqlx::Result<bool> {
    let res = sqlx::query(
        "INSERT INTO favorite_cities (user_id, city_name, added_at) VALUES ($1, $2, $3)",
    )
    .bind(user_id)
    .bind(city)
    .bind(now_rfc3339())
    .execute(db.pool())
    .await;

    match res {
        Ok(_) => Ok(true),
        Err(e) if is_unique_violation(&e) => Ok(false),
        Err(e) => Err(e),
    }
}

/// Unconditional delete; removing an absent favorite is a silent no-op.
pub async fn remove_favorite(db: &Db, user_id: i64, city: &str) -> sqlx::Result<()> {
    sqlx::query("DELETE FROM favorite_cities WHERE user_id = $1 AND city_name = $2")
        .bind(user_id)
        .bind(city)
        .execute(db.pool())
        .await?;
    Ok(())
}

/// Maps an externally authenticated identity onto a local user id.
///
/// A user known by email is returned unchanged. Otherwise a shadow record
/// is provisioned with a random, discarded password so the storage
/// invariants hold while direct login stays impossible, together with the
/// default preference row exactly as in normal registration.
pub async fn reconcile_external(
    db: &Db,
    email: &str,
    name: Option<&str>,
) -> Result<i64, AuthError> {
    if let Some(user) = find_by_email(db, email).await? {
        return Ok(user.id);
    }

    let shadow_password: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect();

    match create_user(db, email, name.unwrap_or(email), &shadow_password).await {
        Ok(id) => {
            debug!(user_id = id, email, "shadow record provisioned");
            Ok(id)
        }
        // A concurrent reconcile for the same email won the insert race.
        Err(AuthError::DuplicateEmail) => {
            let user = find_by_email(db, email)
                .await?
                .ok_or(AuthError::Unauthorized)?;
            Ok(user.id)
        }
        Err(e) => Err(e),
    }
}
