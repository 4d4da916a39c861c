use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::error::{AppError, AppResult};

/// Full lifecycle status of a calendar slot.
///
/// `SwapPending` is written only by the swap engine while a negotiation is
/// in flight; it must never be accepted as direct user input (see
/// [`RequestedStatus`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SlotStatus {
    Busy,
    Swappable,
    SwapPending,
}

/// The subset of [`SlotStatus`] a slot owner may set directly.
///
/// Keeping this as its own type means handlers physically cannot hand
/// `SWAP_PENDING` to the store; only the swap engine converts past it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestedStatus {
    Busy,
    Swappable,
}

impl RequestedStatus {
    /// Parse user-supplied status input, rejecting the reserved value with a
    /// specific message.
    pub fn parse(input: &str) -> AppResult<Self> {
        match input {
            "BUSY" => Ok(RequestedStatus::Busy),
            "SWAPPABLE" => Ok(RequestedStatus::Swappable),
            "SWAP_PENDING" => Err(AppError::Validation(
                "Cannot manually set status to SWAP_PENDING".to_string(),
            )),
            other => Err(AppError::Validation(format!("Invalid status: {}", other))),
        }
    }
}

impl From<RequestedStatus> for SlotStatus {
    fn from(status: RequestedStatus) -> Self {
        match status {
            RequestedStatus::Busy => SlotStatus::Busy,
            RequestedStatus::Swappable => SlotStatus::Swappable,
        }
    }
}

/// A calendar slot owned by a single user.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    pub status: SlotStatus,
    pub created_at: NaiveDateTime,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requested_status_accepts_owner_settable_values() {
        assert_eq!(RequestedStatus::parse("BUSY").unwrap(), RequestedStatus::Busy);
        assert_eq!(
            RequestedStatus::parse("SWAPPABLE").unwrap(),
            RequestedStatus::Swappable
        );
    }

    #[test]
    fn requested_status_rejects_reserved_value() {
        let err = RequestedStatus::parse("SWAP_PENDING").unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn requested_status_rejects_unknown_values() {
        assert!(RequestedStatus::parse("FREE").is_err());
        assert!(RequestedStatus::parse("").is_err());
        // lowercase is not accepted; the wire format is SCREAMING_SNAKE_CASE
        assert!(RequestedStatus::parse("busy").is_err());
    }
}
