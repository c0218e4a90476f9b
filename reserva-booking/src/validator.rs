use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use reserva_domain::{BookingRecord, BookingStore, Clock, Resource, SharedClock, SlotCandidate};

use crate::error::BookingError;

/// Why a candidate slot was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "reason")]
pub enum RejectReason {
    Past,
    ResourceUnavailable,
    /// The slot is taken; carries the conflicting booking's code.
    Occupied { code: String },
}

impl RejectReason {
    pub fn into_error(self, resource_id: &str) -> BookingError {
        match self {
            RejectReason::Past => BookingError::Past,
            RejectReason::ResourceUnavailable => {
                BookingError::ResourceUnavailable(resource_id.to_string())
            }
            RejectReason::Occupied { code } => BookingError::Conflict { code },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotCheck {
    pub available: bool,
    pub reason: Option<RejectReason>,
}

impl SlotCheck {
    fn available() -> Self {
        Self {
            available: true,
            reason: None,
        }
    }

    fn rejected(reason: RejectReason) -> Self {
        Self {
            available: false,
            reason: Some(reason),
        }
    }
}

/// Pure rule evaluation over pre-fetched state. The advisory path
/// feeds it plain store reads; the coordinator feeds it rows read
/// under the resource lock. Check order: past time, then resource
/// availability, then existing active booking at the exact start.
pub fn assess(
    starts_at: DateTime<Utc>,
    resource: Option<&Resource>,
    conflict: Option<&BookingRecord>,
    now: DateTime<Utc>,
) -> SlotCheck {
    if starts_at < now {
        return SlotCheck::rejected(RejectReason::Past);
    }

    match resource {
        None => return SlotCheck::rejected(RejectReason::ResourceUnavailable),
        Some(r) if !r.active => return SlotCheck::rejected(RejectReason::ResourceUnavailable),
        Some(_) => {}
    }

    if let Some(existing) = conflict {
        return SlotCheck::rejected(RejectReason::Occupied {
            code: existing.code.clone(),
        });
    }

    SlotCheck::available()
}

/// Advisory validation for fast feedback at selection time. Runs
/// outside any transaction; only the in-lock re-check inside the
/// coordinator may be trusted for correctness.
pub struct SlotValidator {
    store: Arc<dyn BookingStore>,
    clock: SharedClock,
}

impl SlotValidator {
    pub fn new(store: Arc<dyn BookingStore>, clock: SharedClock) -> Self {
        Self { store, clock }
    }

    pub async fn validate(&self, candidate: &SlotCandidate) -> Result<SlotCheck, BookingError> {
        let starts_at = candidate.starts_at();
        let resource = self
            .store
            .get_resource(candidate.tenant_id, &candidate.resource_id)
            .await?;
        let conflict = self
            .store
            .find_active_booking(candidate.tenant_id, &candidate.resource_id, starts_at)
            .await?;

        Ok(assess(
            starts_at,
            resource.as_ref(),
            conflict.as_ref(),
            self.clock.now(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate, NaiveTime, Utc};
    use reserva_domain::{BookingStatus, ManualClock};
    use reserva_store::MemoryBookingStore;
    use uuid::Uuid;

    fn resource(tenant_id: Uuid, active: bool) -> Resource {
        Resource {
            id: "m123".to_string(),
            tenant_id,
            name: "Maria".to_string(),
            active,
        }
    }

    fn booking(tenant_id: Uuid, starts_at: DateTime<Utc>) -> BookingRecord {
        BookingRecord {
            id: Uuid::new_v4(),
            code: "RSV-424242".to_string(),
            tenant_id,
            customer_id: "wa:+4915110".to_string(),
            resource_id: "m123".to_string(),
            service_id: "svc-cut".to_string(),
            starts_at,
            ends_at: starts_at + Duration::minutes(30),
            status: BookingStatus::Confirmed,
            created_at: Utc::now(),
        }
    }

    fn candidate(tenant_id: Uuid) -> SlotCandidate {
        SlotCandidate::new(
            NaiveDate::from_ymd_opt(2025, 11, 10).unwrap(),
            NaiveTime::from_hms_opt(15, 0, 0).unwrap(),
            "m123",
            tenant_id,
        )
    }

    fn clock_before_slot() -> Arc<ManualClock> {
        let slot_start = NaiveDate::from_ymd_opt(2025, 11, 10)
            .unwrap()
            .and_hms_opt(15, 0, 0)
            .unwrap()
            .and_utc();
        Arc::new(ManualClock::at(slot_start - Duration::hours(2)))
    }

    #[tokio::test]
    async fn free_future_slot_is_available() {
        let tenant = Uuid::new_v4();
        let store = Arc::new(MemoryBookingStore::new());
        store.add_resource(resource(tenant, true)).await;

        let validator = SlotValidator::new(store, clock_before_slot());
        let check = validator.validate(&candidate(tenant)).await.unwrap();
        assert!(check.available);
        assert_eq!(check.reason, None);
    }

    #[tokio::test]
    async fn past_slot_is_rejected_before_anything_else() {
        let tenant = Uuid::new_v4();
        let store = Arc::new(MemoryBookingStore::new());
        // Resource intentionally missing: the past check must win.
        let clock = clock_before_slot();
        clock.advance(Duration::hours(3));

        let validator = SlotValidator::new(store, clock);
        let check = validator.validate(&candidate(tenant)).await.unwrap();
        assert_eq!(check.reason, Some(RejectReason::Past));
    }

    #[tokio::test]
    async fn unknown_or_inactive_resource_is_rejected() {
        let tenant = Uuid::new_v4();
        let store = Arc::new(MemoryBookingStore::new());
        let validator = SlotValidator::new(store.clone(), clock_before_slot());

        let check = validator.validate(&candidate(tenant)).await.unwrap();
        assert_eq!(check.reason, Some(RejectReason::ResourceUnavailable));

        store.add_resource(resource(tenant, false)).await;
        let check = validator.validate(&candidate(tenant)).await.unwrap();
        assert_eq!(check.reason, Some(RejectReason::ResourceUnavailable));
    }

    #[tokio::test]
    async fn occupied_slot_reports_conflicting_code() {
        let tenant = Uuid::new_v4();
        let store = Arc::new(MemoryBookingStore::new());
        store.add_resource(resource(tenant, true)).await;
        let cand = candidate(tenant);
        store.seed_booking(booking(tenant, cand.starts_at())).await;

        let validator = SlotValidator::new(store, clock_before_slot());
        let check = validator.validate(&cand).await.unwrap();
        assert_eq!(
            check.reason,
            Some(RejectReason::Occupied { code: "RSV-424242".to_string() })
        );
    }

    #[tokio::test]
    async fn cancelled_booking_does_not_block_the_slot() {
        let tenant = Uuid::new_v4();
        let store = Arc::new(MemoryBookingStore::new());
        store.add_resource(resource(tenant, true)).await;
        let cand = candidate(tenant);
        let mut cancelled = booking(tenant, cand.starts_at());
        cancelled.status = BookingStatus::Cancelled;
        store.seed_booking(cancelled).await;

        let validator = SlotValidator::new(store, clock_before_slot());
        assert!(validator.validate(&cand).await.unwrap().available);
    }
}
