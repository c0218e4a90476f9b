use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::booking::{BookingRecord, Resource};
use crate::hold::{Hold, HoldKey};

/// Storage-layer failures, split so the retry controller can tell
/// transient infrastructure conditions from everything else.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error("statement timed out")]
    Timeout,

    #[error("deadlock detected")]
    Deadlock,

    #[error("transaction serialization failure")]
    Serialization,

    #[error("connection failure: {0}")]
    Connection(String),

    #[error("transaction is no longer usable")]
    TxClosed,

    #[error("storage error: {0}")]
    Database(String),

    #[error("encoding error: {0}")]
    Encoding(String),
}

impl StoreError {
    /// Conditions expected to resolve on retry: timeouts, deadlocks,
    /// serialization aborts, dropped connections.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StoreError::Timeout
                | StoreError::Deadlock
                | StoreError::Serialization
                | StoreError::Connection(_)
        )
    }
}

/// Ephemeral hold arena keyed by (customer, tenant). The in-memory
/// implementation is the default; a networked TTL cache slots in
/// behind the same four methods for multi-process deployments.
#[async_trait]
pub trait HoldStore: Send + Sync {
    /// Overwrites any existing hold for the same key (last-hold-wins).
    async fn put(&self, hold: Hold) -> Result<(), StoreError>;

    /// Returns the hold if present and unexpired. Expired entries are
    /// treated as absent and may be evicted lazily.
    async fn get(&self, key: &HoldKey) -> Result<Option<Hold>, StoreError>;

    /// Idempotent delete.
    async fn remove(&self, key: &HoldKey) -> Result<(), StoreError>;

    /// Evict expired holds; returns how many were removed.
    async fn sweep(&self) -> Result<usize, StoreError>;
}

/// The authoritative transactional store for bookings.
///
/// Non-transactional reads serve advisory validation and the
/// alternatives search; anything that decides a booking goes through
/// a [`BookingTx`].
#[async_trait]
pub trait BookingStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn BookingTx>, StoreError>;

    async fn get_resource(
        &self,
        tenant_id: Uuid,
        resource_id: &str,
    ) -> Result<Option<Resource>, StoreError>;

    async fn find_active_booking(
        &self,
        tenant_id: Uuid,
        resource_id: &str,
        starts_at: DateTime<Utc>,
    ) -> Result<Option<BookingRecord>, StoreError>;

    /// Start instants of active bookings for a resource inside a
    /// window, used to skip occupied slots when offering alternatives.
    async fn booked_starts(
        &self,
        tenant_id: Uuid,
        resource_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<DateTime<Utc>>, StoreError>;
}

/// One booking transaction. The resource lock taken by
/// `lock_resource` is what serializes concurrent confirmations for
/// the same resource; reads made after it can be trusted.
#[async_trait]
pub trait BookingTx: Send {
    async fn lock_resource(&mut self, tenant_id: Uuid, resource_id: &str)
        -> Result<(), StoreError>;

    async fn get_resource(
        &mut self,
        tenant_id: Uuid,
        resource_id: &str,
    ) -> Result<Option<Resource>, StoreError>;

    async fn find_active_booking(
        &mut self,
        tenant_id: Uuid,
        resource_id: &str,
        starts_at: DateTime<Utc>,
    ) -> Result<Option<BookingRecord>, StoreError>;

    async fn code_exists(&mut self, tenant_id: Uuid, code: &str) -> Result<bool, StoreError>;

    async fn insert_booking(&mut self, record: &BookingRecord) -> Result<(), StoreError>;

    /// Read-modify-write under the same transaction as the insert so
    /// concurrent confirmations cannot lose updates.
    async fn increment_usage(&mut self, tenant_id: Uuid) -> Result<i64, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

impl std::fmt::Debug for dyn BookingTx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("BookingTx")
    }
}
