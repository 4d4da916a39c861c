use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Lifecycle of a swap negotiation. `Accepted` and `Rejected` are terminal;
/// a resolved request is never mutated again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SwapStatus {
    Pending,
    Accepted,
    Rejected,
}

/// A negotiation between two slots. While this is `Pending`, both referenced
/// slots are held in `SWAP_PENDING` and no other pending request may touch
/// either of them.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SwapRequest {
    pub id: String,
    pub requester_user_id: String,
    /// Owner of the target slot at the time the request was created.
    pub target_user_id: String,
    pub requester_slot_id: String,
    pub target_slot_id: String,
    pub status: SwapStatus,
    pub created_at: NaiveDateTime,
    /// Set exactly once, on the PENDING -> ACCEPTED/REJECTED transition.
    pub responded_at: Option<NaiveDateTime>,
}
