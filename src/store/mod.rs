//! Persistence seam for the reservation engine.
//!
//! The engine reads fresh state through [`BookingStore`] on every evaluation and
//! performs all reads and the final commit while holding the guard returned by
//! [`BookingStore::lock_scopes`].

mod journal;
mod memory;

pub use memory::InMemoryStore;

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;

use crate::locks::LockKey;
use crate::model::*;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(ulid::Ulid),

    #[error("invalid record: {0}")]
    Invalid(&'static str),

    #[error("limit exceeded: {0}")]
    LimitExceeded(&'static str),

    #[error("scope lock not acquired within {waited:?}")]
    LockTimeout { waited: Duration },

    #[error("journal error: {0}")]
    Journal(String),
}

#[async_trait]
pub trait BookingStore: Send + Sync + 'static {
    /// Held scope locks; dropping it releases them.
    type Guard: Send + 'static;

    async fn fetch_shop_schedule(&self, shop_id: ShopId) -> Result<Option<ShopSchedule>, StoreError>;

    /// Looked up by id alone; the caller checks `shop_id` ownership.
    async fn fetch_stylist_schedule(
        &self,
        stylist_id: StylistId,
    ) -> Result<Option<StylistSchedule>, StoreError>;

    /// Looked up by id alone; the caller checks `shop_id` ownership.
    async fn fetch_menu(&self, menu_id: MenuId) -> Result<Option<Menu>, StoreError>;

    async fn fetch_reservation(&self, id: ReservationId) -> Result<Option<Reservation>, StoreError>;

    /// Reserved reservations of `shop_id` starting on `day`, ordered by start.
    async fn fetch_same_day_reservations(
        &self,
        shop_id: ShopId,
        day: NaiveDate,
        exclude: Option<ReservationId>,
    ) -> Result<Vec<Reservation>, StoreError>;

    /// Reserved reservations assigned to `stylist_id` starting on `day`, ordered by start.
    async fn fetch_same_day_stylist_reservations(
        &self,
        stylist_id: StylistId,
        day: NaiveDate,
        exclude: Option<ReservationId>,
    ) -> Result<Vec<Reservation>, StoreError>;

    /// Block until every key is held, or fail with `LockTimeout` after `timeout`.
    async fn lock_scopes(&self, keys: &[LockKey], timeout: Duration) -> Result<Self::Guard, StoreError>;

    /// Insert, or replace wholesale when the id exists.
    async fn commit_reservation(&self, reservation: &Reservation) -> Result<(), StoreError>;

    async fn commit_cancel(&self, id: ReservationId) -> Result<Reservation, StoreError>;

    async fn commit_complete(&self, id: ReservationId) -> Result<Reservation, StoreError>;
}
