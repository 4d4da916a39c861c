use chrono::{NaiveDateTime, Utc};

use sqlx::{Row, SqliteExecutor, SqlitePool};
use uuid::Uuid;

use crate::db::models::{Event, SlotStatus};
use crate::error::{AppError, AppResult};

// ============================================================================
// Event (slot) Repository
// ============================================================================

/// Persistence for calendar slots.
///
/// Methods that the swap engine runs inside a transaction take a
/// `SqliteExecutor` so they work against both the pool and `&mut *tx`.
pub struct EventRepository;

const EVENT_COLUMNS: &str = "id, user_id, title, start_time, end_time, status, created_at";

impl EventRepository {
    pub async fn create(
        pool: &SqlitePool,
        user_id: &str,
        title: &str,
        start_time: NaiveDateTime,
        end_time: NaiveDateTime,
    ) -> AppResult<Event> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().naive_utc();

        let event = sqlx::query_as::<_, Event>(&format!(
            r#"
            INSERT INTO events (id, user_id, title, start_time, end_time, status, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            RETURNING {EVENT_COLUMNS}
            "#
        ))
        .bind(&id)
        .bind(user_id)
        .bind(title)
        .bind(start_time)
        .bind(end_time)
        .bind(SlotStatus::Busy)
        .bind(now)
        .fetch_one(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(event)
    }

    pub async fn find_by_id<'e>(
        executor: impl SqliteExecutor<'e>,
        id: &str,
    ) -> AppResult<Option<Event>> {
        let event = sqlx::query_as::<_, Event>(&format!(
            "SELECT {EVENT_COLUMNS} FROM events WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(executor)
        .await
        .map_err(AppError::Database)?;

        Ok(event)
    }

    pub async fn find_by_id_for_owner<'e>(
        executor: impl SqliteExecutor<'e>,
        id: &str,
        user_id: &str,
    ) -> AppResult<Option<Event>> {
        let event = sqlx::query_as::<_, Event>(&format!(
            "SELECT {EVENT_COLUMNS} FROM events WHERE id = ? AND user_id = ?"
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(executor)
        .await
        .map_err(AppError::Database)?;

        Ok(event)
    }

    /// All slots owned by `user_id`, earliest first.
    pub async fn list_for_owner(pool: &SqlitePool, user_id: &str) -> AppResult<Vec<Event>> {
        let events = sqlx::query_as::<_, Event>(&format!(
            "SELECT {EVENT_COLUMNS} FROM events WHERE user_id = ? ORDER BY start_time ASC"
        ))
        .bind(user_id)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(events)
    }

    /// Marketplace listing: other users' SWAPPABLE slots with the owner's
    /// display fields joined in, earliest first.
    pub async fn list_swappable_excluding(
        pool: &SqlitePool,
        user_id: &str,
    ) -> AppResult<Vec<(Event, String, String)>> {
        let rows = sqlx::query(
            r#"
            SELECT
                e.id, e.user_id, e.title, e.start_time, e.end_time, e.status, e.created_at,
                u.name AS owner_name, u.email AS owner_email
            FROM events e
            JOIN users u ON u.id = e.user_id
            WHERE e.status = 'SWAPPABLE' AND e.user_id != ?
            ORDER BY e.start_time ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(rows
            .into_iter()
            .map(|r| {
                (
                    Event {
                        id: r.get("id"),
                        user_id: r.get("user_id"),
                        title: r.get("title"),
                        start_time: r.get("start_time"),
                        end_time: r.get("end_time"),
                        status: r.get("status"),
                        created_at: r.get("created_at"),
                    },
                    r.get("owner_name"),
                    r.get("owner_email"),
                )
            })
            .collect())
    }

    /// Owner-driven BUSY/SWAPPABLE toggle. Returns the updated row, or `None`
    /// when no slot with that id belongs to the caller.
    pub async fn set_status_for_owner(
        pool: &SqlitePool,
        id: &str,
        user_id: &str,
        status: SlotStatus,
    ) -> AppResult<Option<Event>> {
        let event = sqlx::query_as::<_, Event>(&format!(
            r#"
            UPDATE events
            SET status = ?
            WHERE id = ? AND user_id = ?
            RETURNING {EVENT_COLUMNS}
            "#
        ))
        .bind(status)
        .bind(id)
        .bind(user_id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(event)
    }

    /// Claim a slot for a pending swap. The `status = 'SWAPPABLE'` guard is
    /// the conditional update that makes a racing claim lose cleanly: of two
    /// transactions touching the same slot, only one sees a row to update.
    pub async fn mark_swap_pending<'e>(executor: impl SqliteExecutor<'e>, id: &str) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE events SET status = 'SWAP_PENDING' WHERE id = ? AND status = 'SWAPPABLE'",
        )
        .bind(id)
        .execute(executor)
        .await
        .map_err(AppError::Database)?;

        Ok(result.rows_affected() == 1)
    }

    /// Engine-side status write, used when resolving a negotiation.
    pub async fn set_status<'e>(
        executor: impl SqliteExecutor<'e>,
        id: &str,
        status: SlotStatus,
    ) -> AppResult<()> {
        sqlx::query("UPDATE events SET status = ? WHERE id = ?")
            .bind(status)
            .bind(id)
            .execute(executor)
            .await
            .map_err(AppError::Database)?;

        Ok(())
    }

    /// The ownership-exchange write: hand the slot to `new_owner` and settle
    /// it back to BUSY. Only the swap engine calls this, inside a transaction.
    pub async fn transfer_owner<'e>(
        executor: impl SqliteExecutor<'e>,
        id: &str,
        new_owner: &str,
    ) -> AppResult<()> {
        sqlx::query("UPDATE events SET user_id = ?, status = 'BUSY' WHERE id = ?")
            .bind(new_owner)
            .bind(id)
            .execute(executor)
            .await
            .map_err(AppError::Database)?;

        Ok(())
    }

    /// Delete a slot owned by the caller. Returns false when nothing matched.
    pub async fn delete<'e>(
        executor: impl SqliteExecutor<'e>,
        id: &str,
        user_id: &str,
    ) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM events WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(user_id)
            .execute(executor)
            .await
            .map_err(AppError::Database)?;

        Ok(result.rows_affected() > 0)
    }
}
