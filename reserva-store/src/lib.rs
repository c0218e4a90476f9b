pub mod app_config;
pub mod database;
pub mod holds;
pub mod memory;
pub mod postgres;
pub mod redis_holds;

pub use app_config::{BookingRules, Config};
pub use database::DbClient;
pub use holds::{spawn_sweeper, MemoryHoldStore};
pub use memory::MemoryBookingStore;
pub use postgres::PgBookingStore;
pub use redis_holds::RedisHoldStore;
