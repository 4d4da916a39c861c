use chrono::Utc;
use sqlx::SqlitePool;

use crate::db::models::{Event, SlotStatus, SwapRequest, SwapStatus};
use crate::db::{EventRepository, SwapRequestRepository};
use crate::error::{AppError, AppResult};

/// The swap negotiation engine.
///
/// Both operations run their entire precondition chain and all effects inside
/// one transaction: the first violated precondition returns early and the
/// dropped transaction rolls back, so a failed call leaves zero side effects.
/// The conditional updates on slot status and request status are what make
/// racing callers lose with a clean error instead of corrupting state.
pub struct SwapService;

impl SwapService {
    /// Create a swap request between the requester's slot and someone else's.
    ///
    /// On success both slots move to SWAP_PENDING and a PENDING request is
    /// recorded, atomically.
    pub async fn initiate_swap(
        pool: &SqlitePool,
        requester_id: &str,
        my_slot_id: &str,
        their_slot_id: &str,
    ) -> AppResult<SwapRequest> {
        let mut tx = pool.begin().await?;

        let my_slot = EventRepository::find_by_id_for_owner(&mut *tx, my_slot_id, requester_id)
            .await?
            .ok_or_else(|| {
                AppError::InvalidState("Your slot is not available for swapping".to_string())
            })?;
        Self::check_swappable(&my_slot, "Your slot is not available for swapping")?;

        let their_slot = EventRepository::find_by_id(&mut *tx, their_slot_id)
            .await?
            .ok_or_else(|| {
                AppError::InvalidState("Target slot is not available for swapping".to_string())
            })?;
        Self::check_swappable(&their_slot, "Target slot is not available for swapping")?;

        if their_slot.user_id == requester_id {
            return Err(AppError::InvalidOperation(
                "Cannot swap with your own slot".to_string(),
            ));
        }

        if SwapRequestRepository::find_pending_touching(&mut *tx, my_slot_id, their_slot_id)
            .await?
            .is_some()
        {
            return Err(AppError::Conflict(
                "One of the slots already has a pending swap request".to_string(),
            ));
        }

        // Claim both slots. The guarded update fails if a concurrent
        // transaction got there first, even though we just read SWAPPABLE.
        for slot_id in [my_slot_id, their_slot_id] {
            if !EventRepository::mark_swap_pending(&mut *tx, slot_id).await? {
                return Err(AppError::Conflict(
                    "One of the slots already has a pending swap request".to_string(),
                ));
            }
        }

        let request = SwapRequestRepository::create(
            &mut *tx,
            requester_id,
            &their_slot.user_id,
            my_slot_id,
            their_slot_id,
        )
        .await?;

        tx.commit().await?;

        tracing::info!(
            "Swap request {} created: {} offers slot {} for slot {}",
            request.id,
            requester_id,
            my_slot_id,
            their_slot_id
        );

        Ok(request)
    }

    /// Accept or reject a pending swap request.
    ///
    /// Accepting exchanges slot ownership (both updates commit together or
    /// not at all); rejecting releases both slots back to SWAPPABLE. Either
    /// way the request becomes terminal and `responded_at` is set.
    pub async fn respond_to_swap(
        pool: &SqlitePool,
        responder_id: &str,
        request_id: &str,
        accept: bool,
    ) -> AppResult<SwapRequest> {
        let mut tx = pool.begin().await?;

        let request = SwapRequestRepository::find_by_id(&mut *tx, request_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Swap request not found".to_string()))?;

        if request.target_user_id != responder_id {
            return Err(AppError::Forbidden(
                "Not authorized to respond to this request".to_string(),
            ));
        }

        if request.status != SwapStatus::Pending {
            return Err(AppError::InvalidState(
                "Swap request is no longer pending".to_string(),
            ));
        }

        let outcome = if accept {
            let requester_slot =
                EventRepository::find_by_id(&mut *tx, &request.requester_slot_id).await?;
            let target_slot =
                EventRepository::find_by_id(&mut *tx, &request.target_slot_id).await?;

            if requester_slot.is_none() || target_slot.is_none() {
                // A slot vanished mid-flight; abort without touching anything.
                return Err(AppError::InvalidState(
                    "One or both slots no longer exist".to_string(),
                ));
            }

            // The ownership exchange: requester's slot goes to the target
            // user and vice versa, both settling to BUSY.
            EventRepository::transfer_owner(
                &mut *tx,
                &request.requester_slot_id,
                &request.target_user_id,
            )
            .await?;
            EventRepository::transfer_owner(
                &mut *tx,
                &request.target_slot_id,
                &request.requester_user_id,
            )
            .await?;

            SwapStatus::Accepted
        } else {
            // Release both slots; ownership unchanged.
            EventRepository::set_status(&mut *tx, &request.requester_slot_id, SlotStatus::Swappable)
                .await?;
            EventRepository::set_status(&mut *tx, &request.target_slot_id, SlotStatus::Swappable)
                .await?;

            SwapStatus::Rejected
        };

        let responded_at = Utc::now().naive_utc();
        if !SwapRequestRepository::set_outcome(&mut *tx, request_id, outcome, responded_at).await? {
            // Lost a race with another response between our read and this write.
            return Err(AppError::InvalidState(
                "Swap request is no longer pending".to_string(),
            ));
        }

        let updated = SwapRequestRepository::find_by_id(&mut *tx, request_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Swap request not found".to_string()))?;

        tx.commit().await?;

        tracing::info!("Swap request {} resolved: {:?}", request_id, outcome);

        Ok(updated)
    }

    /// A slot already claimed by a negotiation is a Conflict (someone holds a
    /// pending request on it); any other non-SWAPPABLE state is InvalidState.
    fn check_swappable(slot: &Event, message: &str) -> AppResult<()> {
        match slot.status {
            SlotStatus::Swappable => Ok(()),
            SlotStatus::SwapPending => Err(AppError::Conflict(
                "One of the slots already has a pending swap request".to_string(),
            )),
            SlotStatus::Busy => Err(AppError::InvalidState(message.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::{Duration, NaiveDateTime};
    use sqlx::sqlite::SqlitePoolOptions;

    use crate::db::UserRepository;

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("failed to open in-memory database");
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .expect("migrations failed");
        pool
    }

    fn tomorrow_at(hour: u32, minute: u32) -> NaiveDateTime {
        (Utc::now() + Duration::days(1))
            .date_naive()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    async fn user(pool: &SqlitePool, id: &str, name: &str) -> String {
        UserRepository::insert(pool, id, name, &format!("{}@example.com", id))
            .await
            .unwrap();
        id.to_string()
    }

    async fn swappable_slot(
        pool: &SqlitePool,
        owner: &str,
        title: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Event {
        let event = EventRepository::create(pool, owner, title, start, end)
            .await
            .unwrap();
        EventRepository::set_status_for_owner(pool, &event.id, owner, SlotStatus::Swappable)
            .await
            .unwrap()
            .unwrap()
    }

    async fn slot_status(pool: &SqlitePool, id: &str) -> (String, SlotStatus) {
        let event = EventRepository::find_by_id(pool, id).await.unwrap().unwrap();
        (event.user_id, event.status)
    }

    #[tokio::test]
    async fn initiate_then_accept_exchanges_ownership() {
        let pool = test_pool().await;
        let alice = user(&pool, "alice", "Alice").await;
        let bob = user(&pool, "bob", "Bob").await;

        let standup = swappable_slot(
            &pool,
            &alice,
            "Standup",
            tomorrow_at(9, 0),
            tomorrow_at(9, 30),
        )
        .await;
        let review = swappable_slot(
            &pool,
            &bob,
            "Review",
            tomorrow_at(14, 0),
            tomorrow_at(14, 30),
        )
        .await;

        // Bob offers his Review slot for Alice's Standup slot.
        let request = SwapService::initiate_swap(&pool, &bob, &review.id, &standup.id)
            .await
            .unwrap();

        assert_eq!(request.status, SwapStatus::Pending);
        assert_eq!(request.requester_user_id, bob);
        assert_eq!(request.target_user_id, alice);
        assert!(request.responded_at.is_none());
        assert_eq!(
            slot_status(&pool, &review.id).await,
            (bob.clone(), SlotStatus::SwapPending)
        );
        assert_eq!(
            slot_status(&pool, &standup.id).await,
            (alice.clone(), SlotStatus::SwapPending)
        );

        let resolved = SwapService::respond_to_swap(&pool, &alice, &request.id, true)
            .await
            .unwrap();

        assert_eq!(resolved.status, SwapStatus::Accepted);
        assert!(resolved.responded_at.is_some());
        // Standup now belongs to Bob, Review to Alice, both settled to BUSY.
        assert_eq!(
            slot_status(&pool, &standup.id).await,
            (bob, SlotStatus::Busy)
        );
        assert_eq!(
            slot_status(&pool, &review.id).await,
            (alice, SlotStatus::Busy)
        );
    }

    #[tokio::test]
    async fn reject_releases_slots_with_owners_unchanged() {
        let pool = test_pool().await;
        let alice = user(&pool, "alice", "Alice").await;
        let bob = user(&pool, "bob", "Bob").await;

        let a = swappable_slot(&pool, &alice, "A", tomorrow_at(9, 0), tomorrow_at(10, 0)).await;
        let b = swappable_slot(&pool, &bob, "B", tomorrow_at(11, 0), tomorrow_at(12, 0)).await;

        let request = SwapService::initiate_swap(&pool, &bob, &b.id, &a.id)
            .await
            .unwrap();
        let resolved = SwapService::respond_to_swap(&pool, &alice, &request.id, false)
            .await
            .unwrap();

        assert_eq!(resolved.status, SwapStatus::Rejected);
        assert!(resolved.responded_at.is_some());
        assert_eq!(
            slot_status(&pool, &a.id).await,
            (alice, SlotStatus::Swappable)
        );
        assert_eq!(slot_status(&pool, &b.id).await, (bob, SlotStatus::Swappable));
    }

    #[tokio::test]
    async fn busy_slot_cannot_initiate() {
        let pool = test_pool().await;
        let alice = user(&pool, "alice", "Alice").await;
        let bob = user(&pool, "bob", "Bob").await;

        // Bob's slot stays BUSY (never marked swappable).
        let busy = EventRepository::create(&pool, &bob, "B", tomorrow_at(9, 0), tomorrow_at(10, 0))
            .await
            .unwrap();
        let theirs =
            swappable_slot(&pool, &alice, "A", tomorrow_at(11, 0), tomorrow_at(12, 0)).await;

        let err = SwapService::initiate_swap(&pool, &bob, &busy.id, &theirs.id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));

        // Nothing was created or mutated.
        assert!(
            SwapRequestRepository::find_pending_touching(&pool, &busy.id, &theirs.id)
                .await
                .unwrap()
                .is_none()
        );
        assert_eq!(slot_status(&pool, &busy.id).await.1, SlotStatus::Busy);
        assert_eq!(slot_status(&pool, &theirs.id).await.1, SlotStatus::Swappable);
    }

    #[tokio::test]
    async fn target_slot_must_be_swappable() {
        let pool = test_pool().await;
        let alice = user(&pool, "alice", "Alice").await;
        let bob = user(&pool, "bob", "Bob").await;

        let mine = swappable_slot(&pool, &bob, "B", tomorrow_at(9, 0), tomorrow_at(10, 0)).await;
        let busy =
            EventRepository::create(&pool, &alice, "A", tomorrow_at(11, 0), tomorrow_at(12, 0))
                .await
                .unwrap();

        let err = SwapService::initiate_swap(&pool, &bob, &mine.id, &busy.id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));
        assert_eq!(slot_status(&pool, &mine.id).await.1, SlotStatus::Swappable);
    }

    #[tokio::test]
    async fn self_swap_is_rejected() {
        let pool = test_pool().await;
        let alice = user(&pool, "alice", "Alice").await;

        let one = swappable_slot(&pool, &alice, "One", tomorrow_at(9, 0), tomorrow_at(10, 0)).await;
        let two = swappable_slot(&pool, &alice, "Two", tomorrow_at(11, 0), tomorrow_at(12, 0)).await;

        let err = SwapService::initiate_swap(&pool, &alice, &one.id, &two.id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidOperation(_)));
        assert_eq!(slot_status(&pool, &one.id).await.1, SlotStatus::Swappable);
        assert_eq!(slot_status(&pool, &two.id).await.1, SlotStatus::Swappable);
    }

    #[tokio::test]
    async fn at_most_one_active_request_per_slot() {
        let pool = test_pool().await;
        let alice = user(&pool, "alice", "Alice").await;
        let bob = user(&pool, "bob", "Bob").await;
        let carol = user(&pool, "carol", "Carol").await;

        let prize = swappable_slot(&pool, &alice, "Prize", tomorrow_at(9, 0), tomorrow_at(10, 0))
            .await;
        let bobs = swappable_slot(&pool, &bob, "Bobs", tomorrow_at(11, 0), tomorrow_at(12, 0)).await;
        let carols =
            swappable_slot(&pool, &carol, "Carols", tomorrow_at(13, 0), tomorrow_at(14, 0)).await;

        let winner = SwapService::initiate_swap(&pool, &bob, &bobs.id, &prize.id)
            .await
            .unwrap();

        let err = SwapService::initiate_swap(&pool, &carol, &carols.id, &prize.id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        // Final state reflects only the winner's request.
        let touching = SwapRequestRepository::find_pending_touching(&pool, &prize.id, &prize.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(touching.id, winner.id);
        assert_eq!(slot_status(&pool, &carols.id).await.1, SlotStatus::Swappable);
    }

    #[tokio::test]
    async fn concurrent_initiations_one_wins() {
        let pool = test_pool().await;
        let alice = user(&pool, "alice", "Alice").await;
        let bob = user(&pool, "bob", "Bob").await;
        let carol = user(&pool, "carol", "Carol").await;

        let prize =
            swappable_slot(&pool, &alice, "Prize", tomorrow_at(9, 0), tomorrow_at(10, 0)).await;
        let bobs = swappable_slot(&pool, &bob, "Bobs", tomorrow_at(11, 0), tomorrow_at(12, 0)).await;
        let carols =
            swappable_slot(&pool, &carol, "Carols", tomorrow_at(13, 0), tomorrow_at(14, 0)).await;

        let (r1, r2) = tokio::join!(
            SwapService::initiate_swap(&pool, &bob, &bobs.id, &prize.id),
            SwapService::initiate_swap(&pool, &carol, &carols.id, &prize.id),
        );

        let (ok, lost) = match (r1, r2) {
            (Ok(req), Err(e)) | (Err(e), Ok(req)) => (req, e),
            other => panic!("expected exactly one winner, got {:?}", other),
        };
        assert!(matches!(lost, AppError::Conflict(_)));
        assert_eq!(ok.target_slot_id, prize.id);
        assert_eq!(slot_status(&pool, &prize.id).await.1, SlotStatus::SwapPending);
    }

    #[tokio::test]
    async fn second_response_is_invalid_state_and_changes_nothing() {
        let pool = test_pool().await;
        let alice = user(&pool, "alice", "Alice").await;
        let bob = user(&pool, "bob", "Bob").await;

        let a = swappable_slot(&pool, &alice, "A", tomorrow_at(9, 0), tomorrow_at(10, 0)).await;
        let b = swappable_slot(&pool, &bob, "B", tomorrow_at(11, 0), tomorrow_at(12, 0)).await;

        let request = SwapService::initiate_swap(&pool, &bob, &b.id, &a.id)
            .await
            .unwrap();
        let accepted = SwapService::respond_to_swap(&pool, &alice, &request.id, true)
            .await
            .unwrap();

        // A second response, even a reject, must fail and leave state alone.
        let err = SwapService::respond_to_swap(&pool, &alice, &request.id, false)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));

        let after = SwapRequestRepository::find_by_id(&pool, &request.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(after.status, SwapStatus::Accepted);
        assert_eq!(after.responded_at, accepted.responded_at);
        assert_eq!(slot_status(&pool, &a.id).await, (bob, SlotStatus::Busy));
        assert_eq!(slot_status(&pool, &b.id).await, (alice, SlotStatus::Busy));
    }

    #[tokio::test]
    async fn only_the_target_user_may_respond() {
        let pool = test_pool().await;
        let alice = user(&pool, "alice", "Alice").await;
        let bob = user(&pool, "bob", "Bob").await;

        let a = swappable_slot(&pool, &alice, "A", tomorrow_at(9, 0), tomorrow_at(10, 0)).await;
        let b = swappable_slot(&pool, &bob, "B", tomorrow_at(11, 0), tomorrow_at(12, 0)).await;

        let request = SwapService::initiate_swap(&pool, &bob, &b.id, &a.id)
            .await
            .unwrap();

        // The requester cannot answer their own request.
        let err = SwapService::respond_to_swap(&pool, &bob, &request.id, true)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
        assert_eq!(slot_status(&pool, &a.id).await.1, SlotStatus::SwapPending);
    }

    #[tokio::test]
    async fn responding_to_unknown_request_is_not_found() {
        let pool = test_pool().await;
        let alice = user(&pool, "alice", "Alice").await;

        let err = SwapService::respond_to_swap(&pool, &alice, "missing", true)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn pending_request_holds_both_slots_until_resolved() {
        let pool = test_pool().await;
        let alice = user(&pool, "alice", "Alice").await;
        let bob = user(&pool, "bob", "Bob").await;

        let a = swappable_slot(&pool, &alice, "A", tomorrow_at(9, 0), tomorrow_at(10, 0)).await;
        let b = swappable_slot(&pool, &bob, "B", tomorrow_at(11, 0), tomorrow_at(12, 0)).await;

        let request = SwapService::initiate_swap(&pool, &bob, &b.id, &a.id)
            .await
            .unwrap();
        assert_eq!(slot_status(&pool, &a.id).await.1, SlotStatus::SwapPending);
        assert_eq!(slot_status(&pool, &b.id).await.1, SlotStatus::SwapPending);

        SwapService::respond_to_swap(&pool, &alice, &request.id, false)
            .await
            .unwrap();
        assert_ne!(slot_status(&pool, &a.id).await.1, SlotStatus::SwapPending);
        assert_ne!(slot_status(&pool, &b.id).await.1, SlotStatus::SwapPending);
    }
}
