use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use reserva_domain::{BookingRecord, BookingStatus, BookingStore, BookingTx, Resource, StoreError};

const ACTIVE_STATUSES: [&str; 2] = ["CONFIRMED", "IN_PROGRESS"];

/// Postgres-backed authoritative store. Row-level `FOR UPDATE` locks
/// on the resource serialize concurrent confirmations; the unique
/// index on (tenant_id, code) is the code-uniqueness backstop.
#[derive(Clone)]
pub struct PgBookingStore {
    pool: PgPool,
}

impl PgBookingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// Row structs for type-safe querying
#[derive(sqlx::FromRow)]
struct BookingRow {
    id: Uuid,
    code: String,
    tenant_id: Uuid,
    customer_id: String,
    resource_id: String,
    service_id: String,
    starts_at: DateTime<Utc>,
    ends_at: DateTime<Utc>,
    status: String,
    created_at: DateTime<Utc>,
}

impl BookingRow {
    fn into_record(self) -> Result<BookingRecord, StoreError> {
        let status: BookingStatus = self.status.parse().map_err(StoreError::Encoding)?;
        Ok(BookingRecord {
            id: self.id,
            code: self.code,
            tenant_id: self.tenant_id,
            customer_id: self.customer_id,
            resource_id: self.resource_id,
            service_id: self.service_id,
            starts_at: self.starts_at,
            ends_at: self.ends_at,
            status,
            created_at: self.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ResourceRow {
    id: String,
    tenant_id: Uuid,
    name: String,
    active: bool,
}

impl From<ResourceRow> for Resource {
    fn from(row: ResourceRow) -> Self {
        Resource {
            id: row.id,
            tenant_id: row.tenant_id,
            name: row.name,
            active: row.active,
        }
    }
}

fn map_sqlx(e: sqlx::Error) -> StoreError {
    match e {
        sqlx::Error::Database(db) => match db.code().as_deref() {
            Some("23505") => StoreError::UniqueViolation(db.message().to_string()),
            Some("40001") => StoreError::Serialization,
            Some("40P01") => StoreError::Deadlock,
            // statement_timeout / lock_timeout cancellations
            Some("57014") | Some("55P03") => StoreError::Timeout,
            _ => StoreError::Database(db.message().to_string()),
        },
        sqlx::Error::PoolTimedOut => StoreError::Timeout,
        sqlx::Error::Io(io) => StoreError::Connection(io.to_string()),
        sqlx::Error::Decode(e) => StoreError::Encoding(e.to_string()),
        other => StoreError::Database(other.to_string()),
    }
}

const SELECT_BOOKING: &str = "SELECT id, code, tenant_id, customer_id, resource_id, service_id, \
     starts_at, ends_at, status, created_at FROM bookings \
     WHERE tenant_id = $1 AND resource_id = $2 AND starts_at = $3 AND status = ANY($4)";

const SELECT_RESOURCE: &str =
    "SELECT id, tenant_id, name, active FROM resources WHERE tenant_id = $1 AND id = $2";

#[async_trait]
impl BookingStore for PgBookingStore {
    async fn begin(&self) -> Result<Box<dyn BookingTx>, StoreError> {
        let tx = self.pool.begin().await.map_err(map_sqlx)?;
        Ok(Box::new(PgBookingTx { tx: Some(tx) }))
    }

    async fn get_resource(
        &self,
        tenant_id: Uuid,
        resource_id: &str,
    ) -> Result<Option<Resource>, StoreError> {
        let row = sqlx::query_as::<_, ResourceRow>(SELECT_RESOURCE)
            .bind(tenant_id)
            .bind(resource_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(row.map(Resource::from))
    }

    async fn find_active_booking(
        &self,
        tenant_id: Uuid,
        resource_id: &str,
        starts_at: DateTime<Utc>,
    ) -> Result<Option<BookingRecord>, StoreError> {
        let row = sqlx::query_as::<_, BookingRow>(SELECT_BOOKING)
            .bind(tenant_id)
            .bind(resource_id)
            .bind(starts_at)
            .bind(&ACTIVE_STATUSES[..])
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?;
        row.map(BookingRow::into_record).transpose()
    }

    async fn booked_starts(
        &self,
        tenant_id: Uuid,
        resource_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<DateTime<Utc>>, StoreError> {
        sqlx::query_scalar::<_, DateTime<Utc>>(
            "SELECT starts_at FROM bookings \
             WHERE tenant_id = $1 AND resource_id = $2 AND status = ANY($3) \
               AND starts_at >= $4 AND starts_at < $5 \
             ORDER BY starts_at",
        )
        .bind(tenant_id)
        .bind(resource_id)
        .bind(&ACTIVE_STATUSES[..])
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)
    }
}

struct PgBookingTx {
    tx: Option<Transaction<'static, Postgres>>,
}

impl PgBookingTx {
    fn tx(&mut self) -> Result<&mut Transaction<'static, Postgres>, StoreError> {
        self.tx.as_mut().ok_or(StoreError::TxClosed)
    }
}

#[async_trait]
impl BookingTx for PgBookingTx {
    async fn lock_resource(
        &mut self,
        tenant_id: Uuid,
        resource_id: &str,
    ) -> Result<(), StoreError> {
        let tx = self.tx()?;
        // Row-level exclusive lock; blocks until a competing
        // confirmation for the same resource commits or rolls back.
        // No row means an unknown resource, which re-validation
        // rejects right after.
        sqlx::query("SELECT id FROM resources WHERE tenant_id = $1 AND id = $2 FOR UPDATE")
            .bind(tenant_id)
            .bind(resource_id)
            .fetch_optional(&mut **tx)
            .await
            .map_err(map_sqlx)?;
        Ok(())
    }

    async fn get_resource(
        &mut self,
        tenant_id: Uuid,
        resource_id: &str,
    ) -> Result<Option<Resource>, StoreError> {
        let tx = self.tx()?;
        let row = sqlx::query_as::<_, ResourceRow>(SELECT_RESOURCE)
            .bind(tenant_id)
            .bind(resource_id)
            .fetch_optional(&mut **tx)
            .await
            .map_err(map_sqlx)?;
        Ok(row.map(Resource::from))
    }

    async fn find_active_booking(
        &mut self,
        tenant_id: Uuid,
        resource_id: &str,
        starts_at: DateTime<Utc>,
    ) -> Result<Option<BookingRecord>, StoreError> {
        let tx = self.tx()?;
        let row = sqlx::query_as::<_, BookingRow>(SELECT_BOOKING)
            .bind(tenant_id)
            .bind(resource_id)
            .bind(starts_at)
            .bind(&ACTIVE_STATUSES[..])
            .fetch_optional(&mut **tx)
            .await
            .map_err(map_sqlx)?;
        row.map(BookingRow::into_record).transpose()
    }

    async fn code_exists(&mut self, tenant_id: Uuid, code: &str) -> Result<bool, StoreError> {
        let tx = self.tx()?;
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM bookings WHERE tenant_id = $1 AND code = $2)",
        )
        .bind(tenant_id)
        .bind(code)
        .fetch_one(&mut **tx)
        .await
        .map_err(map_sqlx)
    }

    async fn insert_booking(&mut self, record: &BookingRecord) -> Result<(), StoreError> {
        let tx = self.tx()?;
        sqlx::query(
            "INSERT INTO bookings (id, code, tenant_id, customer_id, resource_id, service_id, \
             starts_at, ends_at, status, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(record.id)
        .bind(&record.code)
        .bind(record.tenant_id)
        .bind(&record.customer_id)
        .bind(&record.resource_id)
        .bind(&record.service_id)
        .bind(record.starts_at)
        .bind(record.ends_at)
        .bind(record.status.as_str())
        .bind(record.created_at)
        .execute(&mut **tx)
        .await
        .map_err(map_sqlx)?;
        Ok(())
    }

    async fn increment_usage(&mut self, tenant_id: Uuid) -> Result<i64, StoreError> {
        let tx = self.tx()?;
        sqlx::query_scalar::<_, i64>(
            "INSERT INTO tenant_usage (tenant_id, bookings_count) VALUES ($1, 1) \
             ON CONFLICT (tenant_id) \
             DO UPDATE SET bookings_count = tenant_usage.bookings_count + 1, updated_at = NOW() \
             RETURNING bookings_count",
        )
        .bind(tenant_id)
        .fetch_one(&mut **tx)
        .await
        .map_err(map_sqlx)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let mut this = self;
        let tx = this.tx.take().ok_or(StoreError::TxClosed)?;
        tx.commit().await.map_err(map_sqlx)
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        let mut this = self;
        let tx = this.tx.take().ok_or(StoreError::TxClosed)?;
        tx.rollback().await.map_err(map_sqlx)
    }
}
