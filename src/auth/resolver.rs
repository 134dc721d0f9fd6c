use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use tracing::debug;

use crate::auth::store::{self, User};
use crate::error::AuthError;
use crate::state::AppState;

/// Resolves a bearer token to the local user it authenticates.
///
/// Locally issued tokens are tried first; anything the token service does
/// not recognize is offered to the external identity provider, and an
/// externally authenticated identity is reconciled into a local record on
/// the way through. Both paths failing, or an external identity without
/// an email claim, yields `Unauthorized`.
pub async fn resolve(state: &AppState, token: &str) -> Result<User, AuthError> {
    if let Ok(claims) = state.tokens.validate(token) {
        if let Some(user) = store::find_by_email(&state.db, &claims.sub).await? {
            return Ok(user);
        }
        debug!(subject = %claims.sub, "valid token but no local record, trying delegate");
    }

    let Some(identity) = state.idp.validate_token(token).await else {
        return Err(AuthError::Unauthorized);
    };
    let Some(email) = identity.email.clone() else {
        return Err(AuthError::Unauthorized);
    };

    store::reconcile_external(&state.db, &email, identity.display_name()).await?;
    store::find_by_email(&state.db, &email)
        .await?
        .ok_or(AuthError::Unauthorized)
}

/// Same resolution, but authentication failure means "no user" instead of
/// an error. Storage failures still propagate.
pub async fn resolve_optional(
    state: &AppState,
    token: Option<&str>,
) -> Result<Option<User>, AuthError> {
    let Some(token) = token else {
        return Ok(None);
    };
    match resolve(state, token).await {
        Ok(user) => Ok(Some(user)),
        Err(AuthError::Unauthorized | AuthError::InvalidToken) => Ok(None),
        Err(e) => Err(e),
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    let header = parts
        .headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?;
    header
        .strip_prefix("Bearer ")
        .or_else(|| header.strip_prefix("bearer "))
}

/// Extractor for endpoints that require an authenticated user.
pub struct CurrentUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or(AuthError::Unauthorized)?;
        let user = resolve(state, token).await?;
        Ok(CurrentUser(user))
    }
}

/// Extractor for endpoints that work with or without authentication.
pub struct MaybeUser(pub Option<User>);

#[async_trait]
impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = resolve_optional(state, bearer_token(parts)).await?;
        Ok(MaybeUser(user))
    }
}
