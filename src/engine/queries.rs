use chrono::{NaiveDate, NaiveDateTime, TimeDelta};

use crate::model::*;
use crate::store::BookingStore;

use super::conflict::{seat_blockers, stylist_blockers};
use super::{is_within_window, BookedSlot, BookingError, Engine, Entity};

impl<S: BookingStore> Engine<S> {
    pub async fn reservation(&self, id: ReservationId) -> Result<Reservation, BookingError> {
        self.load_reservation(id).await
    }

    /// Start times on `day`, on the slot grid, at which `menu_id` could be booked
    /// right now, optionally with `stylist_id`.
    ///
    /// Takes no locks. The answer is a snapshot and `create` checks again.
    pub async fn open_slots(
        &self,
        shop_id: ShopId,
        day: NaiveDate,
        menu_id: MenuId,
        stylist_id: Option<StylistId>,
    ) -> Result<Vec<NaiveDateTime>, BookingError> {
        let shop = self
            .store
            .fetch_shop_schedule(shop_id)
            .await?
            .ok_or(BookingError::not_found(Entity::Shop, shop_id))?;
        let menu = self
            .store
            .fetch_menu(menu_id)
            .await?
            .ok_or(BookingError::not_found(Entity::Menu, menu_id))?;
        self.check_menu(&menu, shop_id)?;

        let stylist = match stylist_id {
            Some(id) => {
                let stylist = self
                    .store
                    .fetch_stylist_schedule(id)
                    .await?
                    .ok_or(BookingError::not_found(Entity::Stylist, id))?;
                if stylist.shop_id != shop_id {
                    return Err(BookingError::invalid_params(format!(
                        "stylist {id} does not work at shop {shop_id}"
                    )));
                }
                Some(stylist)
            }
            None => None,
        };

        let shop_slots: Vec<BookedSlot> = self
            .store
            .fetch_same_day_reservations(shop_id, day, None)
            .await?
            .iter()
            .map(BookedSlot::from)
            .collect();
        let stylist_slots: Vec<BookedSlot> = match &stylist {
            Some(s) => self
                .store
                .fetch_same_day_stylist_reservations(s.stylist_id, day, None)
                .await?
                .iter()
                .map(BookedSlot::from)
                .collect(),
            None => Vec::new(),
        };

        let now = self.clock.now();
        let step = TimeDelta::minutes(i64::from(self.config.slot_minutes.max(1)));
        let midnight = TimeOfDay::MIDNIGHT.on(day);
        let last_start = TimeOfDay::END_OF_DAY.on(day) - TimeDelta::minutes(i64::from(menu.duration_minutes));

        let mut open = Vec::new();
        let mut start = midnight;
        while start <= last_start {
            let span = Span::starting_at(start, menu.duration_minutes);
            let bookable = start >= now
                && is_within_window(&shop.window, span.start, span.end)
                && seat_blockers(self.config.capacity_rule, shop.seats, &span, &shop_slots).is_none()
                && stylist.as_ref().is_none_or(|s| {
                    is_within_window(&s.window, span.start, span.end)
                        && stylist_blockers(&span, &stylist_slots).is_none()
                });
            if bookable {
                open.push(start);
            }
            start += step;
        }
        Ok(open)
    }
}
