use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A user row provisioned from identity-provider claims.
/// Credentials never live here; authentication happens upstream.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,

    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}
