//! Salon reservation engine: weekly schedule windows, seat and stylist
//! conflict detection, and race-free create/update/cancel of reservations.

pub mod clock;
pub mod config;
pub mod engine;
pub mod limits;
pub mod locks;
pub mod maintenance;
pub mod model;
pub mod observability;
pub mod store;
pub mod wal;

pub use engine::{BookingError, Engine, ErrorKind, NewReservation, ReservationChanges};
pub use store::{BookingStore, InMemoryStore, StoreError};
