use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Published when a hold is written for a customer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotHeldEvent {
    pub tenant_id: Uuid,
    pub customer_id: String,
    pub resource_id: String,
    pub starts_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Published once a booking transaction commits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingConfirmedEvent {
    pub booking_id: Uuid,
    pub tenant_id: Uuid,
    pub customer_id: String,
    pub resource_id: String,
    pub code: String,
    pub starts_at: DateTime<Utc>,
}

/// In-process event stream for listeners (availability caches,
/// reminder schedulers). Cross-process transport is not owned here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum BookingEvent {
    SlotHeld(SlotHeldEvent),
    BookingConfirmed(BookingConfirmedEvent),
}
