use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, instrument, warn};

use crate::auth::dto::{
    FavoritesResponse, LoginRequest, PublicUser, RegisterRequest, StatusMessage, TokenResponse,
    UserProfile,
};
use crate::auth::resolver::CurrentUser;
use crate::auth::{password, store};
use crate::error::AuthError;
use crate::state::AppState;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
        .route("/api/auth/me", get(me))
}

pub fn favorites_routes() -> Router<AppState> {
    Router::new()
        .route("/api/favorites", get(list_favorites))
        .route("/api/favorites/:city", post(add_favorite).delete(remove_favorite))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<Json<TokenResponse>, AuthError> {
    if !is_valid_email(&payload.email) {
        warn!(email = %payload.email, "invalid email");
        return Err(AuthError::BadRequest("Invalid email".into()));
    }

    // Email case is preserved as sent; later lookups must match it exactly.
    let user_id =
        store::create_user(&state.db, &payload.email, &payload.name, &payload.password).await?;
    let access_token = state.tokens.issue(&payload.email)?;

    info!(user_id, email = %payload.email, "user registered");
    Ok(Json(TokenResponse {
        access_token,
        token_type: "bearer".into(),
        user: PublicUser {
            id: user_id,
            email: payload.email,
            name: payload.name,
        },
    }))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<TokenResponse>, AuthError> {
    let user = match store::find_by_email(&state.db, &payload.email).await? {
        Some(user) if password::verify_password(&payload.password, &user.password_hash) => user,
        _ => {
            warn!(email = %payload.email, "login rejected");
            return Err(AuthError::BadCredentials);
        }
    };

    let access_token = state.tokens.issue(&user.email)?;

    info!(user_id = user.id, "user logged in");
    Ok(Json(TokenResponse {
        access_token,
        token_type: "bearer".into(),
        user: PublicUser {
            id: user.id,
            email: user.email,
            name: user.name,
        },
    }))
}

#[instrument(skip(state, user), fields(user_id = user.id))]
pub async fn me(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<UserProfile>, AuthError> {
    let favorites = store::list_favorites(&state.db, user.id).await?;
    Ok(Json(UserProfile {
        id: user.id,
        email: user.email,
        name: user.name,
        created_at: user.created_at,
        favorite_cities: favorites.into_iter().map(|f| f.city).collect(),
    }))
}

#[instrument(skip(state, user), fields(user_id = user.id))]
pub async fn add_favorite(
    State(state): State<AppState>,
    Path(city): Path<String>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<StatusMessage>, AuthError> {
    let added = store::add_favorite(&state.db, user.id, &city).await?;
    if !added {
        return Err(AuthError::BadRequest("City already in favorites".into()));
    }
    Ok(Json(StatusMessage::success(format!(
        "{city} added to favorites"
    ))))
}

#[instrument(skip(state, user), fields(user_id = user.id))]
pub async fn remove_favorite(
    State(state): State<AppState>,
    Path(city): Path<String>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<StatusMessage>, AuthError> {
    store::remove_favorite(&state.db, user.id, &city).await?;
    Ok(Json(StatusMessage::success(format!(
        "{city} removed from favorites"
    ))))
}

#[instrument(skip(state, user), fields(user_id = user.id))]
pub async fn list_favorites(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<FavoritesResponse>, AuthError> {
    let favorites = store::list_favorites(&state.db, user.id).await?;
    Ok(Json(FavoritesResponse { favorites }))
}
