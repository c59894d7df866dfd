use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot};

use crate::limits::*;
use crate::locks::{DayLocks, LockKey, ScopeGuard};
use crate::model::*;
use crate::wal::Wal;

use super::journal::{run_writer, JournalCommand};
use super::{BookingStore, StoreError};

/// Records and per-day indexes. Shared with the journal writer, which applies
/// each event as soon as it is durable.
#[derive(Default)]
pub(super) struct StoreState {
    shops: DashMap<ShopId, ShopSchedule>,
    stylists: DashMap<StylistId, StylistSchedule>,
    menus: DashMap<MenuId, Menu>,
    reservations: DashMap<ReservationId, Reservation>,
    /// Every reservation id (any status) by the shop and day it starts on.
    shop_days: DashMap<(ShopId, NaiveDate), Vec<ReservationId>>,
    stylist_days: DashMap<(StylistId, NaiveDate), Vec<ReservationId>>,
}

impl StoreState {
    /// The minimal event list that rebuilds this state.
    pub(super) fn snapshot(&self) -> Vec<Event> {
        let mut events = Vec::with_capacity(
            self.shops.len() + self.stylists.len() + self.menus.len() + self.reservations.len(),
        );
        events.extend(self.shops.iter().map(|e| Event::ShopSaved { schedule: e.value().clone() }));
        events.extend(
            self.stylists
                .iter()
                .map(|e| Event::StylistSaved { schedule: e.value().clone() }),
        );
        events.extend(self.menus.iter().map(|e| Event::MenuSaved { menu: e.value().clone() }));
        events.extend(
            self.reservations
                .iter()
                .map(|e| Event::ReservationCommitted { reservation: e.value().clone() }),
        );
        events
    }

    pub(super) fn apply(&self, event: &Event) {
        match event {
            Event::ShopSaved { schedule } => {
                self.shops.insert(schedule.shop_id, schedule.clone());
            }
            Event::StylistSaved { schedule } => {
                self.stylists.insert(schedule.stylist_id, schedule.clone());
            }
            Event::MenuSaved { menu } => {
                self.menus.insert(menu.id, menu.clone());
            }
            Event::ReservationCommitted { reservation } => {
                let previous = self.reservations.get(&reservation.id).map(|r| r.value().clone());
                if let Some(previous) = previous {
                    self.unindex(&previous);
                }
                self.index(reservation);
                self.reservations.insert(reservation.id, reservation.clone());
            }
            Event::ReservationCancelled { id } => {
                self.set_status(*id, ReservationStatus::Cancelled);
            }
            Event::ReservationCompleted { id } => {
                self.set_status(*id, ReservationStatus::Completed);
            }
        }
    }

    fn set_status(&self, id: ReservationId, status: ReservationStatus) {
        if let Some(mut r) = self.reservations.get_mut(&id) {
            r.status = status;
        }
    }

    fn index(&self, r: &Reservation) {
        let day = r.day();
        let mut ids = self.shop_days.entry((r.shop_id, day)).or_default();
        if !ids.contains(&r.id) {
            ids.push(r.id);
        }
        drop(ids);
        if let Some(stylist) = r.stylist_id {
            let mut ids = self.stylist_days.entry((stylist, day)).or_default();
            if !ids.contains(&r.id) {
                ids.push(r.id);
            }
        }
    }

    fn unindex(&self, r: &Reservation) {
        let day = r.day();
        if let Some(mut ids) = self.shop_days.get_mut(&(r.shop_id, day)) {
            ids.retain(|id| *id != r.id);
        }
        self.shop_days.remove_if(&(r.shop_id, day), |_, ids| ids.is_empty());
        if let Some(stylist) = r.stylist_id {
            if let Some(mut ids) = self.stylist_days.get_mut(&(stylist, day)) {
                ids.retain(|id| *id != r.id);
            }
            self.stylist_days.remove_if(&(stylist, day), |_, ids| ids.is_empty());
        }
    }

    fn indexed<K>(&self, index: &DashMap<K, Vec<ReservationId>>, key: K) -> Vec<ReservationId>
    where
        K: std::hash::Hash + Eq,
    {
        index.get(&key).map(|ids| ids.value().clone()).unwrap_or_default()
    }

    fn collect(&self, ids: Vec<ReservationId>, keep: impl Fn(&Reservation) -> bool) -> Vec<Reservation> {
        let mut found: Vec<Reservation> = ids
            .iter()
            .filter_map(|id| self.reservations.get(id).map(|r| r.value().clone()))
            .filter(|r| keep(r))
            .collect();
        found.sort_by_key(|r| (r.start_at, r.id));
        found
    }

    fn shop_day(&self, shop_id: ShopId, day: NaiveDate, keep: impl Fn(&Reservation) -> bool) -> Vec<Reservation> {
        self.collect(self.indexed(&self.shop_days, (shop_id, day)), keep)
    }

    fn stylist_day(&self, stylist_id: StylistId, day: NaiveDate, keep: impl Fn(&Reservation) -> bool) -> Vec<Reservation> {
        self.collect(self.indexed(&self.stylist_days, (stylist_id, day)), keep)
    }
}

/// DashMap-backed store with per-day indexes, advisory day locks and an
/// optional group-committed journal.
pub struct InMemoryStore {
    state: Arc<StoreState>,
    locks: DayLocks,
    journal: Option<mpsc::Sender<JournalCommand>>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl InMemoryStore {
    /// A store with no journal. State lives only as long as the process.
    pub fn in_memory() -> Self {
        Self {
            state: Arc::new(StoreState::default()),
            locks: DayLocks::new(),
            journal: None,
        }
    }

    /// Replay the journal at `path` and keep appending to it.
    /// Spawns the journal writer, so it must run inside a Tokio runtime.
    pub fn open(path: &Path) -> io::Result<Self> {
        let events = Wal::replay(path)?;
        let wal = Wal::open(path)?;

        let mut store = Self::in_memory();
        for event in &events {
            store.state.apply(event);
        }
        let (tx, rx) = mpsc::channel(4096);
        tokio::spawn(run_writer(wal, store.state.clone(), rx));
        store.journal = Some(tx);
        tracing::info!("replayed {} journal events from {}", events.len(), path.display());
        Ok(store)
    }

    // ── Administration ───────────────────────────────────────

    pub async fn save_shop(&self, schedule: ShopSchedule) -> Result<(), StoreError> {
        schedule.window.validate().map_err(StoreError::Invalid)?;
        if schedule.seats == 0 {
            return Err(StoreError::Invalid("shop needs at least one seat"));
        }
        if schedule.seats > MAX_SEATS {
            return Err(StoreError::LimitExceeded("too many seats"));
        }
        self.persist_and_apply(Event::ShopSaved { schedule }).await
    }

    pub async fn save_stylist(&self, schedule: StylistSchedule) -> Result<(), StoreError> {
        schedule.window.validate().map_err(StoreError::Invalid)?;
        if !self.state.shops.contains_key(&schedule.shop_id) {
            return Err(StoreError::NotFound(schedule.shop_id));
        }
        self.persist_and_apply(Event::StylistSaved { schedule }).await
    }

    pub async fn save_menu(&self, menu: Menu) -> Result<(), StoreError> {
        if menu.duration_minutes == 0 {
            return Err(StoreError::Invalid("menu duration must be positive"));
        }
        if menu.duration_minutes > MAX_MENU_DURATION_MINUTES {
            return Err(StoreError::LimitExceeded("menu duration too long"));
        }
        if !self.state.shops.contains_key(&menu.shop_id) {
            return Err(StoreError::NotFound(menu.shop_id));
        }
        self.persist_and_apply(Event::MenuSaved { menu }).await
    }

    /// Every reservation of a shop starting on `day`, whatever its status, ordered by start.
    pub fn day_sheet(&self, shop_id: ShopId, day: NaiveDate) -> Vec<Reservation> {
        self.state.shop_day(shop_id, day, |_| true)
    }

    /// Drop idle lock slots. Returns how many were removed.
    pub fn prune_locks(&self) -> usize {
        self.locks.prune_idle()
    }

    // ── Journal ──────────────────────────────────────────────

    /// Make the event durable and visible.
    ///
    /// With a journal the writer applies the event right after its fsync, so a
    /// caller dropped while waiting for the reply cannot leave the event
    /// journaled but missing from memory.
    async fn persist_and_apply(&self, event: Event) -> Result<(), StoreError> {
        let Some(tx) = &self.journal else {
            self.state.apply(&event);
            return Ok(());
        };
        let (response, rx) = oneshot::channel();
        tx.send(JournalCommand::Append { event, response })
            .await
            .map_err(|_| StoreError::Journal("journal writer shut down".into()))?;
        rx.await
            .map_err(|_| StoreError::Journal("journal writer dropped response".into()))?
            .map_err(|e| StoreError::Journal(e.to_string()))
    }

    /// Rewrite the journal as the minimal event list that rebuilds current state.
    pub async fn compact_journal(&self) -> Result<(), StoreError> {
        let Some(tx) = &self.journal else {
            return Ok(());
        };
        let (response, rx) = oneshot::channel();
        tx.send(JournalCommand::Compact { response })
            .await
            .map_err(|_| StoreError::Journal("journal writer shut down".into()))?;
        rx.await
            .map_err(|_| StoreError::Journal("journal writer dropped response".into()))?
            .map_err(|e| StoreError::Journal(e.to_string()))
    }

    pub async fn journal_appends_since_compact(&self) -> u64 {
        let Some(tx) = &self.journal else {
            return 0;
        };
        let (response, rx) = oneshot::channel();
        if tx.send(JournalCommand::AppendsSinceCompact { response }).await.is_err() {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

#[async_trait]
impl BookingStore for InMemoryStore {
    type Guard = ScopeGuard;

    async fn fetch_shop_schedule(&self, shop_id: ShopId) -> Result<Option<ShopSchedule>, StoreError> {
        Ok(self.state.shops.get(&shop_id).map(|s| s.value().clone()))
    }

    async fn fetch_stylist_schedule(
        &self,
        stylist_id: StylistId,
    ) -> Result<Option<StylistSchedule>, StoreError> {
        Ok(self.state.stylists.get(&stylist_id).map(|s| s.value().clone()))
    }

    async fn fetch_menu(&self, menu_id: MenuId) -> Result<Option<Menu>, StoreError> {
        Ok(self.state.menus.get(&menu_id).map(|m| m.value().clone()))
    }

    async fn fetch_reservation(&self, id: ReservationId) -> Result<Option<Reservation>, StoreError> {
        Ok(self.state.reservations.get(&id).map(|r| r.value().clone()))
    }

    async fn fetch_same_day_reservations(
        &self,
        shop_id: ShopId,
        day: NaiveDate,
        exclude: Option<ReservationId>,
    ) -> Result<Vec<Reservation>, StoreError> {
        Ok(self.state.shop_day(shop_id, day, |r| r.is_active() && Some(r.id) != exclude))
    }

    async fn fetch_same_day_stylist_reservations(
        &self,
        stylist_id: StylistId,
        day: NaiveDate,
        exclude: Option<ReservationId>,
    ) -> Result<Vec<Reservation>, StoreError> {
        Ok(self
            .state
            .stylist_day(stylist_id, day, |r| r.is_active() && Some(r.id) != exclude))
    }

    async fn lock_scopes(&self, keys: &[LockKey], timeout: Duration) -> Result<ScopeGuard, StoreError> {
        self.locks.acquire(keys, timeout).await
    }

    async fn commit_reservation(&self, reservation: &Reservation) -> Result<(), StoreError> {
        if reservation.duration_minutes == 0 {
            return Err(StoreError::Invalid("reservation duration must be positive"));
        }
        let active_that_day = self
            .state
            .shop_day(reservation.shop_id, reservation.day(), |r| {
                r.is_active() && r.id != reservation.id
            })
            .len();
        if active_that_day >= MAX_RESERVATIONS_PER_SHOP_DAY {
            return Err(StoreError::LimitExceeded("too many reservations for one shop day"));
        }
        self.persist_and_apply(Event::ReservationCommitted {
            reservation: reservation.clone(),
        })
        .await
    }

    async fn commit_cancel(&self, id: ReservationId) -> Result<Reservation, StoreError> {
        if !self.state.reservations.contains_key(&id) {
            return Err(StoreError::NotFound(id));
        }
        self.persist_and_apply(Event::ReservationCancelled { id }).await?;
        self.fetch_reservation(id).await?.ok_or(StoreError::NotFound(id))
    }

    async fn commit_complete(&self, id: ReservationId) -> Result<Reservation, StoreError> {
        if !self.state.reservations.contains_key(&id) {
            return Err(StoreError::NotFound(id));
        }
        self.persist_and_apply(Event::ReservationCompleted { id }).await?;
        self.fetch_reservation(id).await?.ok_or(StoreError::NotFound(id))
    }
}
