use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::debug;
use uuid::Uuid;

use reserva_domain::{BookingRecord, BookingStore, BookingTx, Resource, StoreError};

#[derive(Default)]
struct MemoryState {
    resources: HashMap<(Uuid, String), Resource>,
    bookings: HashMap<Uuid, BookingRecord>,
    usage: HashMap<Uuid, i64>,
}

struct Inner {
    state: RwLock<MemoryState>,
    // One async mutex per (tenant, resource); holding its guard for
    // the transaction lifetime is the in-process equivalent of a
    // row-level lock.
    locks: Mutex<HashMap<(Uuid, String), Arc<Mutex<()>>>>,
    fault_plan: std::sync::Mutex<VecDeque<StoreError>>,
    begin_calls: AtomicUsize,
}

/// In-memory authoritative store, used by tests and single-process
/// deployments. Same transaction semantics as the Postgres store:
/// writes are buffered until commit, the resource lock serializes
/// concurrent confirmations, and commit re-checks code uniqueness as
/// the constraint backstop.
#[derive(Clone)]
pub struct MemoryBookingStore {
    inner: Arc<Inner>,
}

impl MemoryBookingStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: RwLock::new(MemoryState::default()),
                locks: Mutex::new(HashMap::new()),
                fault_plan: std::sync::Mutex::new(VecDeque::new()),
                begin_calls: AtomicUsize::new(0),
            }),
        }
    }

    pub async fn add_resource(&self, resource: Resource) {
        let mut state = self.inner.state.write().await;
        state
            .resources
            .insert((resource.tenant_id, resource.id.clone()), resource);
    }

    /// Insert a committed booking directly, bypassing the transaction
    /// path. Seeding only.
    pub async fn seed_booking(&self, record: BookingRecord) {
        let mut state = self.inner.state.write().await;
        state.bookings.insert(record.id, record);
    }

    pub async fn bookings(&self) -> Vec<BookingRecord> {
        self.inner.state.read().await.bookings.values().cloned().collect()
    }

    pub async fn usage_count(&self, tenant_id: Uuid) -> i64 {
        self.inner
            .state
            .read()
            .await
            .usage
            .get(&tenant_id)
            .copied()
            .unwrap_or(0)
    }

    /// Queue transient failures for the next `n` calls to `begin`,
    /// so tests can exercise the retry path.
    pub fn inject_transient_failures(&self, n: usize) {
        let mut plan = self.inner.fault_plan.lock().unwrap();
        for _ in 0..n {
            plan.push_back(StoreError::Connection("injected connection reset".to_string()));
        }
    }

    pub fn begin_calls(&self) -> usize {
        self.inner.begin_calls.load(Ordering::SeqCst)
    }
}

impl Default for MemoryBookingStore {
    fn default() -> Self {
        Self::new()
    }
}

fn find_active(
    bookings: impl Iterator<Item = BookingRecord>,
    tenant_id: Uuid,
    resource_id: &str,
    starts_at: DateTime<Utc>,
) -> Option<BookingRecord> {
    bookings.into_iter().find(|b| {
        b.tenant_id == tenant_id
            && b.resource_id == resource_id
            && b.starts_at == starts_at
            && b.status.is_active()
    })
}

#[async_trait]
impl BookingStore for MemoryBookingStore {
    async fn begin(&self) -> Result<Box<dyn BookingTx>, StoreError> {
        self.inner.begin_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(fault) = self.inner.fault_plan.lock().unwrap().pop_front() {
            return Err(fault);
        }
        Ok(Box::new(MemoryTx {
            inner: self.inner.clone(),
            guards: Vec::new(),
            pending_bookings: Vec::new(),
            pending_usage: HashMap::new(),
        }))
    }

    async fn get_resource(
        &self,
        tenant_id: Uuid,
        resource_id: &str,
    ) -> Result<Option<Resource>, StoreError> {
        let state = self.inner.state.read().await;
        Ok(state.resources.get(&(tenant_id, resource_id.to_string())).cloned())
    }

    async fn find_active_booking(
        &self,
        tenant_id: Uuid,
        resource_id: &str,
        starts_at: DateTime<Utc>,
    ) -> Result<Option<BookingRecord>, StoreError> {
        let state = self.inner.state.read().await;
        Ok(find_active(
            state.bookings.values().cloned(),
            tenant_id,
            resource_id,
            starts_at,
        ))
    }

    async fn booked_starts(
        &self,
        tenant_id: Uuid,
        resource_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<DateTime<Utc>>, StoreError> {
        let state = self.inner.state.read().await;
        let mut starts: Vec<_> = state
            .bookings
            .values()
            .filter(|b| {
                b.tenant_id == tenant_id
                    && b.resource_id == resource_id
                    && b.status.is_active()
                    && b.starts_at >= from
                    && b.starts_at < to
            })
            .map(|b| b.starts_at)
            .collect();
        starts.sort();
        Ok(starts)
    }
}

struct MemoryTx {
    inner: Arc<Inner>,
    guards: Vec<OwnedMutexGuard<()>>,
    pending_bookings: Vec<BookingRecord>,
    pending_usage: HashMap<Uuid, i64>,
}

#[async_trait]
impl BookingTx for MemoryTx {
    async fn lock_resource(
        &mut self,
        tenant_id: Uuid,
        resource_id: &str,
    ) -> Result<(), StoreError> {
        let lock = {
            let mut locks = self.inner.locks.lock().await;
            locks
                .entry((tenant_id, resource_id.to_string()))
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        // Blocks until the competing transaction commits or rolls
        // back, exactly like a row lock would.
        let guard = lock.lock_owned().await;
        self.guards.push(guard);
        debug!(resource = resource_id, "resource lock acquired");
        Ok(())
    }

    async fn get_resource(
        &mut self,
        tenant_id: Uuid,
        resource_id: &str,
    ) -> Result<Option<Resource>, StoreError> {
        let state = self.inner.state.read().await;
        Ok(state.resources.get(&(tenant_id, resource_id.to_string())).cloned())
    }

    async fn find_active_booking(
        &mut self,
        tenant_id: Uuid,
        resource_id: &str,
        starts_at: DateTime<Utc>,
    ) -> Result<Option<BookingRecord>, StoreError> {
        let state = self.inner.state.read().await;
        let committed = state.bookings.values().cloned();
        let pending = self.pending_bookings.iter().cloned();
        Ok(find_active(
            committed.chain(pending),
            tenant_id,
            resource_id,
            starts_at,
        ))
    }

    async fn code_exists(&mut self, tenant_id: Uuid, code: &str) -> Result<bool, StoreError> {
        let state = self.inner.state.read().await;
        let committed = state
            .bookings
            .values()
            .any(|b| b.tenant_id == tenant_id && b.code == code);
        let pending = self
            .pending_bookings
            .iter()
            .any(|b| b.tenant_id == tenant_id && b.code == code);
        Ok(committed || pending)
    }

    async fn insert_booking(&mut self, record: &BookingRecord) -> Result<(), StoreError> {
        self.pending_bookings.push(record.clone());
        Ok(())
    }

    async fn increment_usage(&mut self, tenant_id: Uuid) -> Result<i64, StoreError> {
        let delta = self.pending_usage.entry(tenant_id).or_insert(0);
        *delta += 1;
        let committed = self
            .inner
            .state
            .read()
            .await
            .usage
            .get(&tenant_id)
            .copied()
            .unwrap_or(0);
        Ok(committed + *delta)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryTx {
            inner,
            guards,
            pending_bookings,
            pending_usage,
        } = *self;

        {
            let mut state = inner.state.write().await;

            // Constraint backstop: reject the whole transaction if any
            // pending code collides with a committed one.
            for rec in &pending_bookings {
                if state
                    .bookings
                    .values()
                    .any(|b| b.tenant_id == rec.tenant_id && b.code == rec.code)
                {
                    return Err(StoreError::UniqueViolation(format!(
                        "bookings(tenant_id, code)=({}, {})",
                        rec.tenant_id, rec.code
                    )));
                }
            }

            for rec in pending_bookings {
                state.bookings.insert(rec.id, rec);
            }
            for (tenant, delta) in pending_usage {
                *state.usage.entry(tenant).or_insert(0) += delta;
            }
        }

        // Only now release the resource locks.
        drop(guards);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        // Buffered writes are discarded with self; locks release on drop.
        Ok(())
    }
}
