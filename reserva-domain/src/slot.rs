use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A candidate (date, time, resource) tuple a customer is asking about.
/// Never persisted; only used to query for conflicts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotCandidate {
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub resource_id: String,
    pub tenant_id: Uuid,
}

impl SlotCandidate {
    pub fn new(date: NaiveDate, time: NaiveTime, resource_id: impl Into<String>, tenant_id: Uuid) -> Self {
        Self {
            date,
            time,
            resource_id: resource_id.into(),
            tenant_id,
        }
    }

    /// Start instant of the slot. Slot coordinates are stored in UTC;
    /// timezone conversion belongs to the chat layer.
    pub fn starts_at(&self) -> DateTime<Utc> {
        self.date.and_time(self.time).and_utc()
    }
}
