use chrono::{NaiveDateTime, Utc};

use sqlx::{Row, SqliteExecutor, SqlitePool};
use uuid::Uuid;

use crate::db::models::{SwapRequest, SwapStatus};
use crate::error::{AppError, AppResult};

// ============================================================================
// Swap Request Repository
// ============================================================================

pub struct SwapRequestRepository;

const REQUEST_COLUMNS: &str = "id, requester_user_id, target_user_id, requester_slot_id, \
     target_slot_id, status, created_at, responded_at";

impl SwapRequestRepository {
    pub async fn create<'e>(
        executor: impl SqliteExecutor<'e>,
        requester_user_id: &str,
        target_user_id: &str,
        requester_slot_id: &str,
        target_slot_id: &str,
    ) -> AppResult<SwapRequest> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().naive_utc();

        let request = sqlx::query_as::<_, SwapRequest>(&format!(
            r#"
            INSERT INTO swap_requests (
                id, requester_user_id, target_user_id,
                requester_slot_id, target_slot_id, status, created_at, responded_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, NULL)
            RETURNING {REQUEST_COLUMNS}
            "#
        ))
        .bind(&id)
        .bind(requester_user_id)
        .bind(target_user_id)
        .bind(requester_slot_id)
        .bind(target_slot_id)
        .bind(SwapStatus::Pending)
        .bind(now)
        .fetch_one(executor)
        .await
        .map_err(AppError::Database)?;

        Ok(request)
    }

    pub async fn find_by_id<'e>(
        executor: impl SqliteExecutor<'e>,
        id: &str,
    ) -> AppResult<Option<SwapRequest>> {
        let request = sqlx::query_as::<_, SwapRequest>(&format!(
            "SELECT {REQUEST_COLUMNS} FROM swap_requests WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(executor)
        .await
        .map_err(AppError::Database)?;

        Ok(request)
    }

    /// Conflict probe: any PENDING request referencing either slot, on either
    /// side of the negotiation.
    pub async fn find_pending_touching<'e>(
        executor: impl SqliteExecutor<'e>,
        slot_a: &str,
        slot_b: &str,
    ) -> AppResult<Option<SwapRequest>> {
        let request = sqlx::query_as::<_, SwapRequest>(&format!(
            r#"
            SELECT {REQUEST_COLUMNS}
            FROM swap_requests
            WHERE status = 'PENDING'
              AND (requester_slot_id IN (?, ?) OR target_slot_id IN (?, ?))
            LIMIT 1
            "#
        ))
        .bind(slot_a)
        .bind(slot_b)
        .bind(slot_a)
        .bind(slot_b)
        .fetch_optional(executor)
        .await
        .map_err(AppError::Database)?;

        Ok(request)
    }

    /// Terminal transition. The `status = 'PENDING'` guard makes a second
    /// response (or a racing one) a no-op; the caller treats zero rows
    /// affected as the request no longer being pending.
    pub async fn set_outcome<'e>(
        executor: impl SqliteExecutor<'e>,
        id: &str,
        outcome: SwapStatus,
        responded_at: NaiveDateTime,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE swap_requests SET status = ?, responded_at = ? WHERE id = ? AND status = 'PENDING'",
        )
        .bind(outcome)
        .bind(responded_at)
        .bind(id)
        .execute(executor)
        .await
        .map_err(AppError::Database)?;

        Ok(result.rows_affected() == 1)
    }

    /// Requests where the user is being asked to swap, newest first.
    pub async fn list_by_target(pool: &SqlitePool, user_id: &str) -> AppResult<Vec<SwapRequest>> {
        let requests = sqlx::query_as::<_, SwapRequest>(&format!(
            "SELECT {REQUEST_COLUMNS} FROM swap_requests WHERE target_user_id = ? ORDER BY created_at DESC"
        ))
        .bind(user_id)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(requests)
    }

    /// Requests the user initiated, newest first.
    pub async fn list_by_requester(
        pool: &SqlitePool,
        user_id: &str,
    ) -> AppResult<Vec<SwapRequest>> {
        let requests = sqlx::query_as::<_, SwapRequest>(&format!(
            "SELECT {REQUEST_COLUMNS} FROM swap_requests WHERE requester_user_id = ? ORDER BY created_at DESC"
        ))
        .bind(user_id)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(requests)
    }

    /// Pending requests awaiting the user's answer (the notification badge).
    pub async fn count_pending_for_target(pool: &SqlitePool, user_id: &str) -> AppResult<i64> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS cnt FROM swap_requests WHERE target_user_id = ? AND status = 'PENDING'",
        )
        .bind(user_id)
        .fetch_one(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row.get("cnt"))
    }

    /// Most recent requests involving the user on either side.
    pub async fn list_recent_touching(
        pool: &SqlitePool,
        user_id: &str,
        limit: i64,
    ) -> AppResult<Vec<SwapRequest>> {
        let requests = sqlx::query_as::<_, SwapRequest>(&format!(
            r#"
            SELECT {REQUEST_COLUMNS}
            FROM swap_requests
            WHERE target_user_id = ? OR requester_user_id = ?
            ORDER BY created_at DESC
            LIMIT ?
            "#
        ))
        .bind(user_id)
        .bind(user_id)
        .bind(limit)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(requests)
    }
}
