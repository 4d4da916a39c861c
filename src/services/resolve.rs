//! Read-side reference resolver.
//!
//! Query handlers fetch raw rows and hand them here to expand user and slot
//! references into display-ready summaries. Kept separate from the write
//! path: nothing in this module mutates state.

use chrono::NaiveDateTime;
use serde::Serialize;
use sqlx::SqlitePool;

use crate::db::models::{Event, SlotStatus, SwapRequest, SwapStatus, User};
use crate::db::{EventRepository, UserRepository};
use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Serialize)]
pub struct UserSummary {
    pub id: String,
    pub name: String,
    pub email: String,
}

impl From<User> for UserSummary {
    fn from(user: User) -> Self {
        UserSummary {
            id: user.id,
            name: user.name,
            email: user.email,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SlotSummary {
    pub id: String,
    pub title: String,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    pub status: SlotStatus,
}

impl From<Event> for SlotSummary {
    fn from(event: Event) -> Self {
        SlotSummary {
            id: event.id,
            title: event.title,
            start_time: event.start_time,
            end_time: event.end_time,
            status: event.status,
        }
    }
}

/// A swap request with its references expanded for the client.
///
/// Slots of long-resolved requests may have been deleted since, so the slot
/// summaries are optional; users are never deleted and always resolve.
#[derive(Debug, Serialize)]
pub struct ResolvedSwapRequest {
    pub id: String,
    pub status: SwapStatus,
    pub requester: UserSummary,
    pub target: UserSummary,
    pub requester_slot: Option<SlotSummary>,
    pub target_slot: Option<SlotSummary>,
    pub created_at: NaiveDateTime,
    pub responded_at: Option<NaiveDateTime>,
}

pub async fn resolve_user(pool: &SqlitePool, user_id: &str) -> AppResult<UserSummary> {
    let user = UserRepository::find_by_id(pool, user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;
    Ok(user.into())
}

pub async fn resolve_request(
    pool: &SqlitePool,
    request: SwapRequest,
) -> AppResult<ResolvedSwapRequest> {
    let requester = resolve_user(pool, &request.requester_user_id).await?;
    let target = resolve_user(pool, &request.target_user_id).await?;
    let requester_slot = EventRepository::find_by_id(pool, &request.requester_slot_id)
        .await?
        .map(SlotSummary::from);
    let target_slot = EventRepository::find_by_id(pool, &request.target_slot_id)
        .await?
        .map(SlotSummary::from);

    Ok(ResolvedSwapRequest {
        id: request.id,
        status: request.status,
        requester,
        target,
        requester_slot,
        target_slot,
        created_at: request.created_at,
        responded_at: request.responded_at,
    })
}

pub async fn resolve_requests(
    pool: &SqlitePool,
    requests: Vec<SwapRequest>,
) -> AppResult<Vec<ResolvedSwapRequest>> {
    let mut resolved = Vec::with_capacity(requests.len());
    for request in requests {
        resolved.push(resolve_request(pool, request).await?);
    }
    Ok(resolved)
}
