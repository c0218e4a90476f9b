use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::slot::SlotCandidate;

/// Composite key for the hold arena: one hold per customer per tenant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HoldKey {
    pub customer_id: String,
    pub tenant_id: Uuid,
}

impl HoldKey {
    pub fn new(customer_id: impl Into<String>, tenant_id: Uuid) -> Self {
        Self {
            customer_id: customer_id.into(),
            tenant_id,
        }
    }
}

/// Everything about the slot a customer picked, carried verbatim from
/// selection to confirmation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotDetails {
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub resource_id: String,
    pub resource_name: String,
    pub service_id: String,
    pub service_name: String,
    pub duration_minutes: u32,
    pub price_cents: i64,
}

impl SlotDetails {
    pub fn starts_at(&self) -> DateTime<Utc> {
        self.date.and_time(self.time).and_utc()
    }

    pub fn ends_at(&self) -> DateTime<Utc> {
        self.starts_at() + Duration::minutes(self.duration_minutes as i64)
    }

    pub fn candidate(&self, tenant_id: Uuid) -> SlotCandidate {
        SlotCandidate::new(self.date, self.time, self.resource_id.clone(), tenant_id)
    }
}

/// A customer's provisional claim on a slot, pending confirmation.
/// Ephemeral: lives only in the reservation store, bounded by TTL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hold {
    pub customer_id: String,
    pub tenant_id: Uuid,
    pub slot: SlotDetails,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Hold {
    pub fn new(key: &HoldKey, slot: SlotDetails, now: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            customer_id: key.customer_id.clone(),
            tenant_id: key.tenant_id,
            slot,
            created_at: now,
            expires_at: now + ttl,
        }
    }

    pub fn key(&self) -> HoldKey {
        HoldKey::new(self.customer_id.clone(), self.tenant_id)
    }

    /// Expired holds are treated as absent everywhere.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}
