use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;
use uuid::Uuid;

use reserva_domain::{
    BookingConfirmedEvent, BookingEvent, BookingRecord, BookingStore, Clock, Hold, HoldKey,
    HoldStore, SharedClock, SlotDetails, SlotHeldEvent,
};
use reserva_store::BookingRules;

use crate::codegen::CodeGenerator;
use crate::coordinator::BookingCoordinator;
use crate::error::BookingError;
use crate::retry::RetryPolicy;
use crate::validator::{RejectReason, SlotValidator};

// How many duration-sized steps away from the requested time the
// alternatives search probes before giving up on the day.
const ALTERNATIVE_PROBES: i64 = 12;

/// Payload handed to the message-rendering collaborator when a slot
/// was held for the customer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotProposal {
    pub slot: SlotDetails,
    pub expires_at: DateTime<Utc>,
}

/// A nearby free slot offered when the requested one is unavailable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlternativeSlot {
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub resource_name: String,
    pub preferred: bool,
}

/// Outcome of a selection attempt. Rejections come back as data, not
/// errors: the chat layer renders alternatives instead of failing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SlotOutcome {
    Proposal(SlotProposal),
    Alternatives {
        reason: RejectReason,
        slots: Vec<AlternativeSlot>,
    },
}

/// The two public entry points of the engine: `select_slot` writes a
/// TTL-bounded hold, `confirm` converts it into a booking through the
/// retry-wrapped transaction coordinator.
pub struct BookingOrchestrator {
    holds: Arc<dyn HoldStore>,
    store: Arc<dyn BookingStore>,
    validator: SlotValidator,
    coordinator: BookingCoordinator,
    retry: RetryPolicy,
    clock: SharedClock,
    hold_ttl: Duration,
    alternatives_limit: usize,
    events: broadcast::Sender<BookingEvent>,
}

impl BookingOrchestrator {
    pub fn new(
        holds: Arc<dyn HoldStore>,
        store: Arc<dyn BookingStore>,
        clock: SharedClock,
        rules: &BookingRules,
    ) -> Self {
        let validator = SlotValidator::new(store.clone(), clock.clone());
        let coordinator = BookingCoordinator::new(
            store.clone(),
            CodeGenerator::from_rules(rules),
            clock.clone(),
        );
        let (events, _) = broadcast::channel(64);

        Self {
            holds,
            store,
            validator,
            coordinator,
            retry: RetryPolicy::from_rules(rules),
            clock,
            hold_ttl: Duration::seconds(rules.hold_ttl_seconds as i64),
            alternatives_limit: rules.alternatives_limit,
            events,
        }
    }

    /// In-process listeners (availability caches, reminder schedulers).
    pub fn subscribe(&self) -> broadcast::Receiver<BookingEvent> {
        self.events.subscribe()
    }

    /// Advisory validation, then a hold. A re-selection by the same
    /// customer supersedes the prior hold (last-write-wins).
    pub async fn select_slot(
        &self,
        slot: SlotDetails,
        customer_id: &str,
        tenant_id: Uuid,
    ) -> Result<SlotOutcome, BookingError> {
        let candidate = slot.candidate(tenant_id);
        let check = self.validator.validate(&candidate).await?;

        match check.reason {
            None => {
                let key = HoldKey::new(customer_id, tenant_id);
                let hold = Hold::new(&key, slot.clone(), self.clock.now(), self.hold_ttl);
                let expires_at = hold.expires_at;
                self.holds.put(hold).await?;

                info!(customer = customer_id, resource = %slot.resource_id, "slot held");
                let _ = self.events.send(BookingEvent::SlotHeld(SlotHeldEvent {
                    tenant_id,
                    customer_id: customer_id.to_string(),
                    resource_id: slot.resource_id.clone(),
                    starts_at: slot.starts_at(),
                    expires_at,
                }));

                Ok(SlotOutcome::Proposal(SlotProposal { slot, expires_at }))
            }
            Some(reason) => {
                let slots = self.alternatives(&slot, tenant_id).await?;
                Ok(SlotOutcome::Alternatives { reason, slots })
            }
        }
    }

    /// Converts the customer's hold into a booking. Terminal
    /// conflict/past outcomes clear the stale hold so the caller can
    /// offer alternatives; exhausted transient retries leave it intact
    /// so the customer may retry confirm without re-selecting.
    pub async fn confirm(
        &self,
        customer_id: &str,
        tenant_id: Uuid,
    ) -> Result<BookingRecord, BookingError> {
        let key = HoldKey::new(customer_id, tenant_id);
        let hold = self
            .holds
            .get(&key)
            .await?
            .ok_or(BookingError::SessionExpired)?;

        let result = self.retry.execute(|| self.coordinator.confirm(&hold)).await;

        match result {
            Ok(record) => {
                self.holds.remove(&key).await?;
                let _ = self
                    .events
                    .send(BookingEvent::BookingConfirmed(BookingConfirmedEvent {
                        booking_id: record.id,
                        tenant_id,
                        customer_id: customer_id.to_string(),
                        resource_id: record.resource_id.clone(),
                        code: record.code.clone(),
                        starts_at: record.starts_at,
                    }));
                Ok(record)
            }
            Err(e) if e.invalidates_hold() => {
                info!(customer = customer_id, "hold cleared after terminal rejection: {}", e);
                self.holds.remove(&key).await?;
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Nearby free slots on the same day for the same resource,
    /// nearest to the requested time first.
    pub async fn alternatives(
        &self,
        requested: &SlotDetails,
        tenant_id: Uuid,
    ) -> Result<Vec<AlternativeSlot>, BookingError> {
        let resource = match self
            .store
            .get_resource(tenant_id, &requested.resource_id)
            .await?
        {
            Some(r) if r.active => r,
            _ => return Ok(Vec::new()),
        };

        let day_start = requested.date.and_time(NaiveTime::MIN).and_utc();
        let day_end = day_start + Duration::days(1);
        let occupied: HashSet<DateTime<Utc>> = self
            .store
            .booked_starts(tenant_id, &requested.resource_id, day_start, day_end)
            .await?
            .into_iter()
            .collect();

        let now = self.clock.now();
        let step = Duration::minutes(requested.duration_minutes.max(1) as i64);
        let base = requested.date.and_time(requested.time);

        let mut slots = Vec::new();
        'probe: for k in 1..=ALTERNATIVE_PROBES {
            for sign in [1, -1] {
                let candidate = base + step * (k * sign) as i32;
                if candidate.date() != requested.date {
                    continue;
                }
                let starts_at = candidate.and_utc();
                if starts_at < now || occupied.contains(&starts_at) {
                    continue;
                }

                slots.push(AlternativeSlot {
                    date: candidate.date(),
                    time: candidate.time(),
                    resource_name: resource.name.clone(),
                    preferred: slots.is_empty(),
                });
                if slots.len() >= self.alternatives_limit {
                    break 'probe;
                }
            }
        }

        Ok(slots)
    }
}
