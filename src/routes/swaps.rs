use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::db::models::SlotStatus;
use crate::db::{EventRepository, SwapRequestRepository};
use crate::error::AppResult;
use crate::routes::auth::AuthUser;
use crate::services::resolve::{self, ResolvedSwapRequest, UserSummary};
use crate::services::swaps::SwapService;
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/swappable-slots", get(swappable_slots))
        .route("/swap-request", post(create_swap_request))
        .route("/swap-response/:request_id", post(respond_to_swap))
        .route("/incoming", get(incoming_requests))
        .route("/outgoing", get(outgoing_requests))
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateSwapRequest {
    pub my_slot_id: String,
    pub their_slot_id: String,
}

#[derive(Debug, Deserialize)]
pub struct SwapResponseRequest {
    pub accept: bool,
}

#[derive(Debug, Serialize)]
pub struct SwappableSlotResponse {
    pub id: String,
    pub title: String,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    pub status: SlotStatus,
    pub owner: UserSummary,
}

// ============================================================================
// Handlers
// ============================================================================

/// Marketplace listing: other users' swappable slots, earliest first
async fn swappable_slots(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> AppResult<Json<Vec<SwappableSlotResponse>>> {
    let rows = EventRepository::list_swappable_excluding(&state.db, &user.id).await?;

    let slots = rows
        .into_iter()
        .map(|(event, owner_name, owner_email)| SwappableSlotResponse {
            id: event.id,
            title: event.title,
            start_time: event.start_time,
            end_time: event.end_time,
            status: event.status,
            owner: UserSummary {
                id: event.user_id,
                name: owner_name,
                email: owner_email,
            },
        })
        .collect();

    Ok(Json(slots))
}

/// Initiate a swap negotiation between one of my slots and someone else's
async fn create_swap_request(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Json(request): Json<CreateSwapRequest>,
) -> AppResult<(StatusCode, Json<ResolvedSwapRequest>)> {
    let created = SwapService::initiate_swap(
        &state.db,
        &user.id,
        &request.my_slot_id,
        &request.their_slot_id,
    )
    .await?;

    let resolved = resolve::resolve_request(&state.db, created).await?;
    Ok((StatusCode::CREATED, Json(resolved)))
}

/// Accept or reject a pending swap request targeting the caller
async fn respond_to_swap(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(request_id): Path<String>,
    Json(request): Json<SwapResponseRequest>,
) -> AppResult<Json<ResolvedSwapRequest>> {
    let updated =
        SwapService::respond_to_swap(&state.db, &user.id, &request_id, request.accept).await?;

    let resolved = resolve::resolve_request(&state.db, updated).await?;
    Ok(Json(resolved))
}

/// Requests where the caller is being asked to swap, newest first
async fn incoming_requests(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> AppResult<Json<Vec<ResolvedSwapRequest>>> {
    let requests = SwapRequestRepository::list_by_target(&state.db, &user.id).await?;
    let resolved = resolve::resolve_requests(&state.db, requests).await?;
    Ok(Json(resolved))
}

/// Requests the caller initiated, newest first
async fn outgoing_requests(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> AppResult<Json<Vec<ResolvedSwapRequest>>> {
    let requests = SwapRequestRepository::list_by_requester(&state.db, &user.id).await?;
    let resolved = resolve::resolve_requests(&state.db, requests).await?;
    Ok(Json(resolved))
}
