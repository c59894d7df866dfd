use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Weekday};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

pub type ShopId = Ulid;
pub type StylistId = Ulid;
pub type MenuId = Ulid;
pub type ClientId = Ulid;
pub type ReservationId = Ulid;

pub const MINUTES_PER_DAY: u16 = 24 * 60;

/// Salon-local wall-clock time as minutes since midnight.
///
/// `24:00` is a valid value so a window can close at midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimeOfDay(u16);

impl TimeOfDay {
    pub const MIDNIGHT: TimeOfDay = TimeOfDay(0);
    pub const END_OF_DAY: TimeOfDay = TimeOfDay(MINUTES_PER_DAY);

    pub fn from_minutes(minutes: u16) -> Option<Self> {
        (minutes <= MINUTES_PER_DAY).then_some(Self(minutes))
    }

    pub fn from_hm(hour: u16, minute: u16) -> Option<Self> {
        if minute >= 60 {
            return None;
        }
        Self::from_minutes(hour.checked_mul(60)?.checked_add(minute)?)
    }

    pub fn minutes(self) -> u16 {
        self.0
    }

    pub(crate) fn seconds(self) -> i64 {
        i64::from(self.0) * 60
    }

    /// The instant this time of day falls on `day`. `24:00` maps to the next midnight.
    pub fn on(self, day: NaiveDate) -> NaiveDateTime {
        day.and_time(NaiveTime::MIN) + TimeDelta::minutes(i64::from(self.0))
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.0 / 60, self.0 % 60)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid time of day {0:?}: expected HH:MM between 00:00 and 24:00")]
pub struct ParseTimeOfDayError(String);

impl FromStr for TimeOfDay {
    type Err = ParseTimeOfDayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseTimeOfDayError(s.to_string());
        let (h, m) = s.split_once(':').ok_or_else(err)?;
        if m.len() != 2 {
            return Err(err());
        }
        let hour: u16 = h.parse().map_err(|_| err())?;
        let minute: u16 = m.parse().map_err(|_| err())?;
        Self::from_hm(hour, minute).ok_or_else(err)
    }
}

/// Set of weekdays, one bit per day starting at Monday.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OpenDays(u8);

impl OpenDays {
    pub const NONE: OpenDays = OpenDays(0);
    pub const MON_FRI: OpenDays = OpenDays(0b001_1111);
    pub const EVERY_DAY: OpenDays = OpenDays(0b111_1111);

    fn bit(day: Weekday) -> u8 {
        1 << day.num_days_from_monday()
    }

    pub fn with(self, day: Weekday) -> Self {
        Self(self.0 | Self::bit(day))
    }

    pub fn without(self, day: Weekday) -> Self {
        Self(self.0 & !Self::bit(day))
    }

    pub fn contains(self, day: Weekday) -> bool {
        self.0 & Self::bit(day) != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn iter(self) -> impl Iterator<Item = Weekday> {
        [
            Weekday::Mon,
            Weekday::Tue,
            Weekday::Wed,
            Weekday::Thu,
            Weekday::Fri,
            Weekday::Sat,
            Weekday::Sun,
        ]
        .into_iter()
        .filter(move |d| self.contains(*d))
    }
}

impl FromIterator<Weekday> for OpenDays {
    fn from_iter<I: IntoIterator<Item = Weekday>>(iter: I) -> Self {
        iter.into_iter().fold(Self::NONE, OpenDays::with)
    }
}

/// Recurring weekly availability: open days plus one daily opening/closing pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub days: OpenDays,
    pub opens: TimeOfDay,
    pub closes: TimeOfDay,
}

impl Window {
    pub fn new(days: OpenDays, opens: TimeOfDay, closes: TimeOfDay) -> Self {
        Self { days, opens, closes }
    }

    pub fn validate(&self) -> Result<(), &'static str> {
        if self.days.is_empty() {
            return Err("window has no open days");
        }
        if self.opens >= self.closes {
            return Err("window must open before it closes");
        }
        Ok(())
    }
}

/// Half-open interval `[start, end)` in salon-local time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl Span {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    /// The span covering `minutes` from `start`.
    pub fn starting_at(start: NaiveDateTime, minutes: u32) -> Self {
        Self::new(start, start + TimeDelta::minutes(i64::from(minutes)))
    }

    pub fn duration(&self) -> TimeDelta {
        self.end - self.start
    }

    /// Calendar day the span starts on.
    pub fn day(&self) -> NaiveDate {
        self.start.date()
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains_instant(&self, t: NaiveDateTime) -> bool {
        self.start <= t && t < self.end
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShopSchedule {
    pub shop_id: ShopId,
    pub window: Window,
    /// Max concurrent reservations.
    pub seats: u32,
}

/// A stylist's personal window. Stylists serve one client at a time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StylistSchedule {
    pub stylist_id: StylistId,
    pub shop_id: ShopId,
    pub window: Window,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Menu {
    pub id: MenuId,
    pub shop_id: ShopId,
    pub duration_minutes: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReservationStatus {
    Reserved,
    Cancelled,
    Completed,
}

impl ReservationStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, ReservationStatus::Reserved)
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ReservationStatus::Reserved => "reserved",
            ReservationStatus::Cancelled => "cancelled",
            ReservationStatus::Completed => "completed",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: ReservationId,
    pub shop_id: ShopId,
    pub client_id: ClientId,
    pub menu_id: MenuId,
    pub stylist_id: Option<StylistId>,
    pub start_at: NaiveDateTime,
    /// Menu duration captured when the reservation was validated.
    pub duration_minutes: u32,
    pub status: ReservationStatus,
}

impl Reservation {
    /// Always `start_at + duration_minutes`; never stored on its own.
    pub fn end_at(&self) -> NaiveDateTime {
        self.span().end
    }

    pub fn span(&self) -> Span {
        Span::starting_at(self.start_at, self.duration_minutes)
    }

    pub fn day(&self) -> NaiveDate {
        self.start_at.date()
    }

    /// Only reserved reservations take part in capacity accounting.
    pub fn is_active(&self) -> bool {
        self.status == ReservationStatus::Reserved
    }
}

/// Journal record format. Flat, one variant per state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    ShopSaved { schedule: ShopSchedule },
    StylistSaved { schedule: StylistSchedule },
    MenuSaved { menu: Menu },
    /// Insert, or wholesale replace when the id already exists.
    ReservationCommitted { reservation: Reservation },
    ReservationCancelled { id: ReservationId },
    ReservationCompleted { id: ReservationId },
}

pub(crate) fn weekday_of(t: NaiveDateTime) -> Weekday {
    t.date().weekday()
}
