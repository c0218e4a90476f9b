use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use reserva_domain::{
    BookingRecord, BookingStatus, BookingStore, BookingTx, Clock, Hold, SharedClock,
};

use crate::codegen::CodeGenerator;
use crate::error::BookingError;
use crate::validator;

/// Converts a hold into a booking inside one transaction: lock the
/// resource, re-validate under the lock, generate the code, insert,
/// bump the tenant counter, commit. Business rejections are terminal;
/// transient store failures roll back cleanly and may be retried by
/// the caller.
pub struct BookingCoordinator {
    store: Arc<dyn BookingStore>,
    codes: CodeGenerator,
    clock: SharedClock,
}

impl BookingCoordinator {
    pub fn new(store: Arc<dyn BookingStore>, codes: CodeGenerator, clock: SharedClock) -> Self {
        Self {
            store,
            codes,
            clock,
        }
    }

    pub async fn confirm(&self, hold: &Hold) -> Result<BookingRecord, BookingError> {
        let mut tx = self.store.begin().await?;
        match self.run(&mut *tx, hold).await {
            Ok(record) => {
                tx.commit().await?;
                info!(code = %record.code, resource = %record.resource_id, "booking confirmed");
                Ok(record)
            }
            Err(e) => {
                if let Err(rb) = tx.rollback().await {
                    warn!("rollback failed after {}: {}", e, rb);
                }
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        tx: &mut dyn BookingTx,
        hold: &Hold,
    ) -> Result<BookingRecord, BookingError> {
        let tenant_id = hold.tenant_id;
        let slot = &hold.slot;
        let starts_at = slot.starts_at();

        // 1. Exclusive lock scoped to the resource. The conflict query
        //    alone cannot prevent double-booking: two in-flight
        //    confirmations could both pass it before either commits.
        tx.lock_resource(tenant_id, &slot.resource_id).await?;

        // 2. Authoritative re-validation, now protected by the lock.
        //    Time has passed since selection; the advisory result from
        //    back then cannot be trusted.
        let resource = tx.get_resource(tenant_id, &slot.resource_id).await?;
        let conflict = tx
            .find_active_booking(tenant_id, &slot.resource_id, starts_at)
            .await?;
        let now = self.clock.now();
        let check = validator::assess(starts_at, resource.as_ref(), conflict.as_ref(), now);
        if let Some(reason) = check.reason {
            return Err(reason.into_error(&slot.resource_id));
        }

        // 3. Code generation shares the insert transaction.
        let code = self.codes.generate(tx, tenant_id).await?;

        let record = BookingRecord {
            id: Uuid::new_v4(),
            code,
            tenant_id,
            customer_id: hold.customer_id.clone(),
            resource_id: slot.resource_id.clone(),
            service_id: slot.service_id.clone(),
            starts_at,
            ends_at: slot.ends_at(),
            status: BookingStatus::Confirmed,
            created_at: now,
        };
        tx.insert_booking(&record).await?;

        // 4. Usage counter under the same lock, so concurrent
        //    confirmations cannot lose updates.
        tx.increment_usage(tenant_id).await?;

        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate, NaiveTime, Utc};
    use reserva_domain::{HoldKey, ManualClock, Resource, SlotDetails};
    use reserva_store::MemoryBookingStore;

    fn slot() -> SlotDetails {
        SlotDetails {
            date: NaiveDate::from_ymd_opt(2025, 11, 10).unwrap(),
            time: NaiveTime::from_hms_opt(15, 0, 0).unwrap(),
            resource_id: "m123".to_string(),
            resource_name: "Maria".to_string(),
            service_id: "svc-cut".to_string(),
            service_name: "Haircut".to_string(),
            duration_minutes: 30,
            price_cents: 4500,
        }
    }

    fn setup() -> (
        Arc<MemoryBookingStore>,
        Arc<ManualClock>,
        BookingCoordinator,
    ) {
        let store = Arc::new(MemoryBookingStore::new());
        let clock = Arc::new(ManualClock::at(slot().starts_at() - Duration::hours(2)));
        let coordinator = BookingCoordinator::new(
            store.clone(),
            CodeGenerator::new("RSV-", 6, 10),
            clock.clone(),
        );
        (store, clock, coordinator)
    }

    fn hold_for(tenant: Uuid, customer: &str, now: chrono::DateTime<Utc>) -> Hold {
        Hold::new(
            &HoldKey::new(customer, tenant),
            slot(),
            now,
            Duration::seconds(900),
        )
    }

    async fn add_active_resource(store: &MemoryBookingStore, tenant: Uuid) {
        store
            .add_resource(Resource {
                id: "m123".to_string(),
                tenant_id: tenant,
                name: "Maria".to_string(),
                active: true,
            })
            .await;
    }

    #[tokio::test]
    async fn confirm_persists_record_and_bumps_usage() {
        let tenant = Uuid::new_v4();
        let (store, clock, coordinator) = setup();
        add_active_resource(&store, tenant).await;

        let record = coordinator
            .confirm(&hold_for(tenant, "wa:+111", clock.now()))
            .await
            .unwrap();

        assert_eq!(record.status, BookingStatus::Confirmed);
        assert_eq!(record.starts_at, slot().starts_at());
        assert_eq!(record.ends_at - record.starts_at, Duration::minutes(30));
        assert!(record.code.starts_with("RSV-"));

        assert_eq!(store.bookings().await.len(), 1);
        assert_eq!(store.usage_count(tenant).await, 1);
    }

    #[tokio::test]
    async fn second_confirm_for_same_slot_is_a_conflict() {
        let tenant = Uuid::new_v4();
        let (store, clock, coordinator) = setup();
        add_active_resource(&store, tenant).await;

        let winner = coordinator
            .confirm(&hold_for(tenant, "wa:+111", clock.now()))
            .await
            .unwrap();

        let err = coordinator
            .confirm(&hold_for(tenant, "wa:+222", clock.now()))
            .await
            .unwrap_err();

        match err {
            BookingError::Conflict { code } => assert_eq!(code, winner.code),
            other => panic!("expected Conflict, got {:?}", other),
        }

        // The losing transaction left nothing behind.
        assert_eq!(store.bookings().await.len(), 1);
        assert_eq!(store.usage_count(tenant).await, 1);
    }

    #[tokio::test]
    async fn time_advancing_past_the_slot_fails_the_recheck() {
        let tenant = Uuid::new_v4();
        let (store, clock, coordinator) = setup();
        add_active_resource(&store, tenant).await;

        let hold = hold_for(tenant, "wa:+111", clock.now());
        clock.advance(Duration::hours(3));

        let err = coordinator.confirm(&hold).await.unwrap_err();
        assert!(matches!(err, BookingError::Past));
        assert!(store.bookings().await.is_empty());
    }

    #[tokio::test]
    async fn deactivated_resource_fails_the_recheck() {
        let tenant = Uuid::new_v4();
        let (store, clock, coordinator) = setup();
        store
            .add_resource(Resource {
                id: "m123".to_string(),
                tenant_id: tenant,
                name: "Maria".to_string(),
                active: false,
            })
            .await;

        let err = coordinator
            .confirm(&hold_for(tenant, "wa:+111", clock.now()))
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::ResourceUnavailable(_)));
    }

    #[tokio::test]
    async fn concurrent_confirms_for_same_slot_yield_one_winner() {
        let tenant = Uuid::new_v4();
        let (store, clock, coordinator) = setup();
        add_active_resource(&store, tenant).await;
        let coordinator = Arc::new(coordinator);

        let a = hold_for(tenant, "wa:+111", clock.now());
        let b = hold_for(tenant, "wa:+222", clock.now());

        let (ra, rb) = tokio::join!(coordinator.confirm(&a), coordinator.confirm(&b));

        let outcomes = [ra, rb];
        let wins = outcomes.iter().filter(|r| r.is_ok()).count();
        let conflicts = outcomes
            .iter()
            .filter(|r| matches!(r, Err(BookingError::Conflict { .. })))
            .count();

        assert_eq!(wins, 1);
        assert_eq!(conflicts, 1);
        assert_eq!(store.bookings().await.len(), 1);
        assert_eq!(store.usage_count(tenant).await, 1);
    }
}
