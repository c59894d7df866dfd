//! Reservation orchestration.
//!
//! Every mutation locks the shop/stylist days it touches, re-reads schedules and
//! same-day reservations under that lock, validates, and commits before the lock
//! is released. Two writers on the same scope are therefore serialized and the
//! loser sees the winner's commit.

mod conflict;
mod error;
mod mutations;
mod queries;
mod window;

pub use conflict::{find_overlaps, peak_occupancy, BookedSlot};
pub use error::{BookingError, Entity, ErrorKind, ScheduleViolation, Scope};
pub use window::{is_within_window, window_miss, WindowMiss};

use std::sync::Arc;
use std::time::Instant;

use chrono::NaiveDateTime;

use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::model::*;
use crate::store::BookingStore;

use conflict::{seat_blockers, stylist_blockers};

/// A reservation request from a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReservation {
    pub client_id: ClientId,
    pub shop_id: ShopId,
    pub menu_id: MenuId,
    pub stylist_id: Option<StylistId>,
    pub start_at: NaiveDateTime,
}

/// Fields to change on an existing reservation. `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReservationChanges {
    pub menu_id: Option<MenuId>,
    /// `Some(None)` removes the stylist assignment.
    pub stylist_id: Option<Option<StylistId>>,
    pub start_at: Option<NaiveDateTime>,
}

/// What a reservation would look like once validated.
#[derive(Debug, Clone, Copy)]
pub(super) struct Candidate {
    pub shop_id: ShopId,
    pub menu_id: MenuId,
    pub stylist_id: Option<StylistId>,
    pub start_at: NaiveDateTime,
}

/// Validates and commits reservations against a [`BookingStore`].
pub struct Engine<S: BookingStore> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
}

impl<S: BookingStore> Clone for Engine<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            clock: self.clock.clone(),
            config: self.config.clone(),
        }
    }
}

impl<S: BookingStore> Engine<S> {
    pub fn new(store: Arc<S>, config: EngineConfig) -> Self {
        Self::with_clock(store, config, Arc::new(SystemClock))
    }

    pub fn with_clock(store: Arc<S>, config: EngineConfig, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock, config }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run every schedule and capacity check for `candidate` and return its span.
    ///
    /// Checks run in a fixed order and the first failure wins: shop, start in the
    /// past, menu, shop window, shop seats, then the stylist's existence, window
    /// and diary. `exclude` leaves one reservation out of both conflict sets.
    /// Mutations call this while holding the candidate's scope locks.
    pub(super) async fn assess(
        &self,
        candidate: &Candidate,
        exclude: Option<ReservationId>,
    ) -> Result<Span, BookingError> {
        let shop = self
            .store
            .fetch_shop_schedule(candidate.shop_id)
            .await?
            .ok_or(BookingError::not_found(Entity::Shop, candidate.shop_id))?;

        let now = self.clock.now();
        if candidate.start_at < now {
            return Err(BookingError::OutOfSchedule(ScheduleViolation::StartsInPast {
                start_at: candidate.start_at,
                now,
            }));
        }

        let menu = self
            .store
            .fetch_menu(candidate.menu_id)
            .await?
            .ok_or(BookingError::not_found(Entity::Menu, candidate.menu_id))?;
        self.check_menu(&menu, shop.shop_id)?;

        let span = Span::starting_at(candidate.start_at, menu.duration_minutes);
        if let Some(miss) = window_miss(&shop.window, span.start, span.end) {
            return Err(BookingError::OutOfSchedule(ScheduleViolation::OutsideWindow {
                scope: Scope::Shop(shop.shop_id),
                miss,
            }));
        }

        let booked = self
            .store
            .fetch_same_day_reservations(shop.shop_id, span.day(), exclude)
            .await?;
        let slots: Vec<BookedSlot> = booked.iter().map(BookedSlot::from).collect();
        if let Some(blocking) = seat_blockers(self.config.capacity_rule, shop.seats, &span, &slots) {
            return Err(BookingError::Unavailable {
                scope: Scope::Shop(shop.shop_id),
                blocking,
            });
        }

        let Some(stylist_id) = candidate.stylist_id else {
            return Ok(span);
        };
        let stylist = self
            .store
            .fetch_stylist_schedule(stylist_id)
            .await?
            .ok_or(BookingError::not_found(Entity::Stylist, stylist_id))?;
        if stylist.shop_id != shop.shop_id {
            return Err(BookingError::invalid_params(format!(
                "stylist {stylist_id} does not work at shop {}",
                shop.shop_id
            )));
        }
        if let Some(miss) = window_miss(&stylist.window, span.start, span.end) {
            return Err(BookingError::OutOfSchedule(ScheduleViolation::OutsideWindow {
                scope: Scope::Stylist(stylist_id),
                miss,
            }));
        }

        let diary = self
            .store
            .fetch_same_day_stylist_reservations(stylist_id, span.day(), exclude)
            .await?;
        let slots: Vec<BookedSlot> = diary.iter().map(BookedSlot::from).collect();
        if let Some(blocking) = stylist_blockers(&span, &slots) {
            return Err(BookingError::Unavailable {
                scope: Scope::Stylist(stylist_id),
                blocking,
            });
        }

        Ok(span)
    }

    /// The menu must belong to the shop and fit the booking grid.
    pub(super) fn check_menu(&self, menu: &Menu, shop_id: ShopId) -> Result<(), BookingError> {
        if menu.shop_id != shop_id {
            return Err(BookingError::invalid_params(format!(
                "menu {} is not offered by shop {shop_id}",
                menu.id
            )));
        }
        let grid = self.config.slot_minutes.max(1);
        if menu.duration_minutes == 0 || menu.duration_minutes % grid != 0 {
            return Err(BookingError::invalid_params(format!(
                "menu duration {} min is not a positive multiple of {grid} min",
                menu.duration_minutes
            )));
        }
        Ok(())
    }

    /// Count and time one public operation.
    pub(super) fn observe<T>(&self, operation: &'static str, started: Instant, result: &Result<T, BookingError>) {
        let outcome = crate::observability::outcome_label(result);
        metrics::counter!(
            crate::observability::OPERATIONS_TOTAL,
            "operation" => operation,
            "outcome" => outcome
        )
        .increment(1);
        metrics::histogram!(crate::observability::OPERATION_DURATION_SECONDS, "operation" => operation)
            .record(started.elapsed().as_secs_f64());
        if let Err(e) = result {
            tracing::debug!(operation, outcome, "rejected: {e}");
        }
    }
}
