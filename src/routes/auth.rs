use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use chrono::NaiveDateTime;
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::db::UserRepository;
use crate::error::AppError;
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/me", get(me))
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: String,
    pub name: String,
    pub email: String,
    pub created_at: NaiveDateTime,
}

/// Claims asserted by the external identity provider. The core trusts `sub`
/// unconditionally; `name` and `email` are display fields used to provision
/// the local user row.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub name: String,
    pub email: String,
    pub iat: usize,
    pub exp: usize,
}

// ============================================================================
// Handlers
// ============================================================================

/// Get current user info
async fn me(
    State(_state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> Result<Json<UserResponse>, AppError> {
    Ok(Json(UserResponse {
        id: user.id,
        name: user.name,
        email: user.email,
        created_at: user.created_at,
    }))
}

// ============================================================================
// Helper functions
// ============================================================================

/// Resolve a bearer token into a local user, provisioning the row on first
/// sight and refreshing display fields when the claims changed.
pub async fn get_user_from_token(
    state: &Arc<AppState>,
    token: &str,
) -> Result<crate::db::User, AppError> {
    let claims = decode_jwt(state, token)?;

    let user = match UserRepository::find_by_id(&state.db, &claims.sub).await? {
        Some(user) if user.name == claims.name && user.email == claims.email => user,
        Some(user) => {
            UserRepository::update_profile(&state.db, &user.id, &claims.name, &claims.email).await?
        }
        None => {
            tracing::info!("Provisioning user {} from identity claims", claims.sub);
            UserRepository::insert(&state.db, &claims.sub, &claims.name, &claims.email).await?
        }
    };

    Ok(user)
}

/// Decode and validate a JWT, returning the claims
fn decode_jwt(state: &Arc<AppState>, token: &str) -> Result<Claims, AppError> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(state.config.jwt.secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(token_data.claims)
}

// ============================================================================
// Auth Middleware / Extractor
// ============================================================================

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

/// Extractor for authenticated user
pub struct AuthUser(pub crate::db::User);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                tracing::debug!("Missing or invalid Authorization header");
                AppError::Unauthorized
            })?;

        if !auth_header.to_ascii_lowercase().starts_with("bearer ") {
            tracing::debug!("Authorization header doesn't start with 'Bearer '");
            return Err(AppError::Unauthorized);
        }

        let token = auth_header[7..].trim();
        if token.is_empty() {
            return Err(AppError::Unauthorized);
        }

        let user = get_user_from_token(state, token).await.map_err(|e| {
            tracing::debug!("Failed to get user from token: {:?}", e);
            e
        })?;

        Ok(AuthUser(user))
    }
}
