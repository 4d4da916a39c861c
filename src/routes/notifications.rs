use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use chrono::NaiveDateTime;
use serde::Serialize;

use crate::db::models::SwapStatus;
use crate::db::SwapRequestRepository;
use crate::error::AppResult;
use crate::routes::auth::AuthUser;
use crate::services::resolve;
use crate::AppState;

const RECENT_LIMIT: i64 = 10;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/count", get(notification_count))
        .route("/recent", get(recent_notifications))
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct NotificationCountResponse {
    pub count: i64,
}

#[derive(Debug, Serialize)]
pub struct NotificationResponse {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub status: SwapStatus,
    pub message: String,
    pub created_at: NaiveDateTime,
    pub is_read: bool,
}

// ============================================================================
// Handlers
// ============================================================================

/// Number of pending requests awaiting the caller's answer (badge count)
async fn notification_count(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> AppResult<Json<NotificationCountResponse>> {
    let count = SwapRequestRepository::count_pending_for_target(&state.db, &user.id).await?;
    Ok(Json(NotificationCountResponse { count }))
}

/// Recent swap activity involving the caller, newest first
async fn recent_notifications(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> AppResult<Json<Vec<NotificationResponse>>> {
    let requests =
        SwapRequestRepository::list_recent_touching(&state.db, &user.id, RECENT_LIMIT).await?;
    let resolved = resolve::resolve_requests(&state.db, requests).await?;

    let notifications = resolved
        .into_iter()
        .map(|request| {
            let incoming = request.target.id == user.id;
            let requester_title = slot_title(request.requester_slot.as_ref());
            let target_title = slot_title(request.target_slot.as_ref());

            let message = if incoming {
                format!(
                    "{} wants to swap \"{}\" for your \"{}\"",
                    request.requester.name, requester_title, target_title
                )
            } else {
                format!(
                    "Your swap request for \"{}\" is {}",
                    target_title,
                    status_word(request.status)
                )
            };

            NotificationResponse {
                id: request.id,
                kind: if incoming { "incoming" } else { "outgoing" }.to_string(),
                status: request.status,
                message,
                created_at: request.created_at,
                is_read: request.status != SwapStatus::Pending,
            }
        })
        .collect();

    Ok(Json(notifications))
}

fn slot_title(slot: Option<&resolve::SlotSummary>) -> String {
    slot.map(|s| s.title.clone())
        .unwrap_or_else(|| "(deleted slot)".to_string())
}

fn status_word(status: SwapStatus) -> &'static str {
    match status {
        SwapStatus::Pending => "pending",
        SwapStatus::Accepted => "accepted",
        SwapStatus::Rejected => "rejected",
    }
}
