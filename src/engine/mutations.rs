use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use ulid::Ulid;

use crate::locks::LockKey;
use crate::model::*;
use crate::store::{BookingStore, StoreError};

use super::{BookingError, Candidate, Engine, Entity, NewReservation, ReservationChanges};

/// Lock keys for a reservation in `shop_id` starting on the day of `start_at`.
fn scope_keys(shop_id: ShopId, stylist_id: Option<StylistId>, start_at: chrono::NaiveDateTime) -> Vec<LockKey> {
    let day = start_at.date();
    let mut keys = vec![LockKey::ShopDay(shop_id, day)];
    if let Some(stylist) = stylist_id {
        keys.push(LockKey::StylistDay(stylist, day));
    }
    keys
}

/// The reservation as it would read after applying `changes`.
fn candidate_after(current: &Reservation, changes: &ReservationChanges) -> Candidate {
    Candidate {
        shop_id: current.shop_id,
        menu_id: changes.menu_id.unwrap_or(current.menu_id),
        stylist_id: changes.stylist_id.unwrap_or(current.stylist_id),
        start_at: changes.start_at.unwrap_or(current.start_at),
    }
}

/// The old day stays locked while a reservation moves so nothing slips into the gap.
fn update_keys(current: &Reservation, target: &Candidate) -> Vec<LockKey> {
    let mut keys = vec![LockKey::ShopDay(current.shop_id, current.day())];
    keys.extend(scope_keys(target.shop_id, target.stylist_id, target.start_at));
    keys
}

impl<S: BookingStore> Engine<S> {
    /// Validate a new reservation and commit it as `Reserved`.
    pub async fn create(&self, request: NewReservation) -> Result<Reservation, BookingError> {
        let started = Instant::now();
        let result = self.create_locked(request).await;
        self.observe("create", started, &result);
        result
    }

    async fn create_locked(&self, request: NewReservation) -> Result<Reservation, BookingError> {
        let keys = scope_keys(request.shop_id, request.stylist_id, request.start_at);
        let guard = self.store.lock_scopes(&keys, self.config.lock_timeout).await?;

        let candidate = Candidate {
            shop_id: request.shop_id,
            menu_id: request.menu_id,
            stylist_id: request.stylist_id,
            start_at: request.start_at,
        };
        let span = self.assess(&candidate, None).await?;

        let reservation = Reservation {
            id: Ulid::new(),
            shop_id: request.shop_id,
            client_id: request.client_id,
            menu_id: request.menu_id,
            stylist_id: request.stylist_id,
            start_at: span.start,
            duration_minutes: span.duration().num_minutes() as u32,
            status: ReservationStatus::Reserved,
        };
        let committed = reservation.clone();
        self.commit_under(guard, |store| async move { store.commit_reservation(&committed).await })
            .await?;
        tracing::info!(
            reservation = %reservation.id,
            shop = %reservation.shop_id,
            "reserved {span}"
        );
        Ok(reservation)
    }

    /// Re-validate a `Reserved` reservation with `changes` applied and replace it.
    /// The reservation never conflicts with its own current slot.
    pub async fn update(
        &self,
        id: ReservationId,
        changes: ReservationChanges,
    ) -> Result<Reservation, BookingError> {
        let started = Instant::now();
        let result = self.update_locked(id, changes).await;
        self.observe("update", started, &result);
        result
    }

    async fn update_locked(
        &self,
        id: ReservationId,
        changes: ReservationChanges,
    ) -> Result<Reservation, BookingError> {
        let seen = self.load_reservation(id).await?;
        let keys = update_keys(&seen, &candidate_after(&seen, &changes));
        let locked_at = Instant::now();
        let guard = self.store.lock_scopes(&keys, self.config.lock_timeout).await?;

        // Whatever we saw before locking may have moved; the lock only covers the old keys.
        let current = self.load_reservation(id).await?;
        let target = candidate_after(&current, &changes);
        if update_keys(&current, &target) != keys {
            return Err(BookingError::Conflict { waited: locked_at.elapsed() });
        }
        if current.status != ReservationStatus::Reserved {
            return Err(BookingError::InvalidState { id, status: current.status });
        }

        let span = self.assess(&target, Some(id)).await?;
        let updated = Reservation {
            menu_id: target.menu_id,
            stylist_id: target.stylist_id,
            start_at: span.start,
            duration_minutes: span.duration().num_minutes() as u32,
            ..current
        };
        let committed = updated.clone();
        self.commit_under(guard, |store| async move { store.commit_reservation(&committed).await })
            .await?;
        tracing::info!(reservation = %id, shop = %updated.shop_id, "rescheduled to {span}");
        Ok(updated)
    }

    /// Move a reservation to `Cancelled`. Cancelling twice returns the cancelled
    /// reservation unchanged; a completed one cannot be cancelled.
    pub async fn cancel(&self, id: ReservationId) -> Result<Reservation, BookingError> {
        let started = Instant::now();
        let result = self.finish(id, ReservationStatus::Cancelled).await;
        self.observe("cancel", started, &result);
        result
    }

    /// Move a reservation to `Completed`. Completing twice is a no-op; a
    /// cancelled one cannot be completed.
    pub async fn complete(&self, id: ReservationId) -> Result<Reservation, BookingError> {
        let started = Instant::now();
        let result = self.finish(id, ReservationStatus::Completed).await;
        self.observe("complete", started, &result);
        result
    }

    /// Shared terminal transition. No schedule checks: releasing a slot cannot
    /// break any invariant.
    async fn finish(&self, id: ReservationId, to: ReservationStatus) -> Result<Reservation, BookingError> {
        let seen = self.load_reservation(id).await?;
        let keys = [LockKey::ShopDay(seen.shop_id, seen.day())];
        let locked_at = Instant::now();
        let guard = self.store.lock_scopes(&keys, self.config.lock_timeout).await?;

        // An update may have moved it to a day this lock does not cover.
        let current = self.load_reservation(id).await?;
        if current.day() != seen.day() {
            return Err(BookingError::Conflict { waited: locked_at.elapsed() });
        }
        if current.status == to {
            tracing::debug!(reservation = %id, "already {to}");
            return Ok(current);
        }
        if current.status.is_terminal() {
            return Err(BookingError::InvalidState { id, status: current.status });
        }

        let finished = match to {
            ReservationStatus::Cancelled => {
                self.commit_under(guard, move |store| async move { store.commit_cancel(id).await })
                    .await?
            }
            ReservationStatus::Completed => {
                self.commit_under(guard, move |store| async move { store.commit_complete(id).await })
                    .await?
            }
            ReservationStatus::Reserved => {
                return Err(BookingError::invalid_params("cannot return a reservation to reserved"));
            }
        };
        tracing::info!(reservation = %id, shop = %finished.shop_id, "{to}");
        Ok(finished)
    }

    /// Run a store commit on its own task that keeps `guard` until the write
    /// lands. A caller dropped mid-commit then cannot release the scope while
    /// the write is still in flight.
    async fn commit_under<T, F, Fut>(&self, guard: S::Guard, commit: F) -> Result<T, BookingError>
    where
        F: FnOnce(Arc<S>) -> Fut,
        Fut: Future<Output = Result<T, StoreError>> + Send + 'static,
        T: Send + 'static,
    {
        let pending = commit(self.store.clone());
        let task = tokio::spawn(async move {
            let result = pending.await;
            drop(guard);
            result
        });
        let committed = task
            .await
            .map_err(|e| BookingError::Storage(format!("commit task failed: {e}")))?;
        committed.map_err(BookingError::from)
    }

    pub(super) async fn load_reservation(&self, id: ReservationId) -> Result<Reservation, BookingError> {
        self.store
            .fetch_reservation(id)
            .await?
            .ok_or(BookingError::not_found(Entity::Reservation, id))
    }
}
