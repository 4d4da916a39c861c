use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, patch},
    Json, Router,
};
use chrono::NaiveDateTime;
use serde::Deserialize;

use crate::db::models::{Event, RequestedStatus, SlotStatus};
use crate::db::{EventRepository, SwapRequestRepository};
use crate::error::{AppError, AppResult};
use crate::routes::auth::AuthUser;
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_events).post(create_event))
        .route("/:id/status", patch(update_status))
        .route("/:id", delete(delete_event))
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateEventRequest {
    pub title: String,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// List the caller's slots, earliest first
async fn list_events(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> AppResult<Json<Vec<Event>>> {
    let events = EventRepository::list_for_owner(&state.db, &user.id).await?;
    Ok(Json(events))
}

/// Create a new slot (always starts out BUSY)
async fn create_event(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Json(request): Json<CreateEventRequest>,
) -> AppResult<(StatusCode, Json<Event>)> {
    let title = request.title.trim();
    if title.is_empty() {
        return Err(AppError::Validation("Title is required".to_string()));
    }
    if request.end_time <= request.start_time {
        return Err(AppError::Validation(
            "End time must be after start time".to_string(),
        ));
    }

    let event = EventRepository::create(
        &state.db,
        &user.id,
        title,
        request.start_time,
        request.end_time,
    )
    .await?;

    Ok((StatusCode::CREATED, Json(event)))
}

/// Toggle a slot between BUSY and SWAPPABLE.
///
/// SWAP_PENDING is rejected as input (reserved for the swap engine), and a
/// slot currently held by a pending negotiation cannot be toggled out of it.
async fn update_status(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    Json(request): Json<UpdateStatusRequest>,
) -> AppResult<Json<Event>> {
    let requested = RequestedStatus::parse(&request.status)?;

    let event = EventRepository::find_by_id_for_owner(&state.db, &id, &user.id)
        .await?
        .ok_or_else(|| AppError::NotFound("Event not found".to_string()))?;

    if event.status == SlotStatus::SwapPending {
        return Err(AppError::Conflict(
            "Slot has a pending swap request".to_string(),
        ));
    }

    let updated = EventRepository::set_status_for_owner(&state.db, &id, &user.id, requested.into())
        .await?
        .ok_or_else(|| AppError::NotFound("Event not found".to_string()))?;

    Ok(Json(updated))
}

/// Delete a slot. Refused while any pending swap request references it.
///
/// Guard and delete run in one transaction so a swap initiated concurrently
/// cannot slip in between the check and the delete.
async fn delete_event(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    let mut tx = state.db.begin().await?;

    EventRepository::find_by_id_for_owner(&mut *tx, &id, &user.id)
        .await?
        .ok_or_else(|| AppError::NotFound("Event not found".to_string()))?;

    if SwapRequestRepository::find_pending_touching(&mut *tx, &id, &id)
        .await?
        .is_some()
    {
        return Err(AppError::Conflict(
            "Cannot delete a slot with a pending swap request".to_string(),
        ));
    }

    if !EventRepository::delete(&mut *tx, &id, &user.id).await? {
        return Err(AppError::NotFound("Event not found".to_string()));
    }

    tx.commit().await?;

    Ok(Json(
        serde_json::json!({ "message": "Event deleted successfully" }),
    ))
}
