pub mod booking;
pub mod clock;
pub mod events;
pub mod hold;
pub mod repository;
pub mod slot;

pub use booking::{BookingRecord, BookingStatus, Resource};
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use events::{BookingConfirmedEvent, BookingEvent, SlotHeldEvent};
pub use hold::{Hold, HoldKey, SlotDetails};
pub use repository::{BookingStore, BookingTx, HoldStore, StoreError};
pub use slot::SlotCandidate;
