use std::fmt;

use chrono::{NaiveDateTime, NaiveTime, Weekday};

use crate::model::{weekday_of, TimeOfDay, Window};

/// Which part of a weekly window a candidate interval missed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowMiss {
    ClosedDay(Weekday),
    BeforeOpening { opens: TimeOfDay },
    AfterClosing { closes: TimeOfDay },
}

impl fmt::Display for WindowMiss {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WindowMiss::ClosedDay(day) => write!(f, "closed on {day}"),
            WindowMiss::BeforeOpening { opens } => write!(f, "starts before opening at {opens}"),
            WindowMiss::AfterClosing { closes } => write!(f, "ends after closing at {closes}"),
        }
    }
}

/// Seconds from midnight of `start`'s day to `t`. Exceeds one day when `t`
/// falls on a later day.
fn seconds_into_start_day(start: NaiveDateTime, t: NaiveDateTime) -> i64 {
    (t - start.date().and_time(NaiveTime::MIN)).num_seconds()
}

/// First rule of `window` that `[start, end)` breaks, if any.
///
/// The weekday comes from `start`. Both ends are measured from midnight of the
/// start day, so an interval running past midnight lands beyond any closing
/// time and is rejected. Ending exactly at closing time is allowed.
pub fn window_miss(window: &Window, start: NaiveDateTime, end: NaiveDateTime) -> Option<WindowMiss> {
    let day = weekday_of(start);
    if !window.days.contains(day) {
        return Some(WindowMiss::ClosedDay(day));
    }
    if seconds_into_start_day(start, start) < window.opens.seconds() {
        return Some(WindowMiss::BeforeOpening { opens: window.opens });
    }
    if seconds_into_start_day(start, end) > window.closes.seconds() {
        return Some(WindowMiss::AfterClosing { closes: window.closes });
    }
    None
}

pub fn is_within_window(window: &Window, start: NaiveDateTime, end: NaiveDateTime) -> bool {
    window_miss(window, start, end).is_none()
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::model::OpenDays;

    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2030, 6, 3).unwrap()
    }

    fn at(day: NaiveDate, h: u32, m: u32) -> NaiveDateTime {
        day.and_hms_opt(h, m, 0).unwrap()
    }

    fn hm(h: u16, m: u16) -> TimeOfDay {
        TimeOfDay::from_hm(h, m).unwrap()
    }

    fn shop_window() -> Window {
        Window::new(OpenDays::MON_FRI, hm(10, 0), hm(20, 0))
    }

    #[test]
    fn inside_window() {
        let d = monday();
        assert!(is_within_window(&shop_window(), at(d, 10, 0), at(d, 11, 0)));
        assert!(is_within_window(&shop_window(), at(d, 14, 30), at(d, 15, 30)));
    }

    #[test]
    fn ending_exactly_at_closing_is_allowed() {
        let d = monday();
        assert!(is_within_window(&shop_window(), at(d, 19, 0), at(d, 20, 0)));
    }

    #[test]
    fn running_past_closing_is_rejected() {
        let d = monday();
        assert_eq!(
            window_miss(&shop_window(), at(d, 19, 30), at(d, 20, 30)),
            Some(WindowMiss::AfterClosing { closes: hm(20, 0) })
        );
    }

    #[test]
    fn starting_before_opening_is_rejected() {
        let d = monday();
        assert_eq!(
            window_miss(&shop_window(), at(d, 9, 30), at(d, 10, 30)),
            Some(WindowMiss::BeforeOpening { opens: hm(10, 0) })
        );
    }

    #[test]
    fn closed_weekday_is_rejected() {
        let saturday = NaiveDate::from_ymd_opt(2030, 6, 8).unwrap();
        assert_eq!(
            window_miss(&shop_window(), at(saturday, 11, 0), at(saturday, 12, 0)),
            Some(WindowMiss::ClosedDay(Weekday::Sat))
        );
    }

    #[test]
    fn weekday_is_taken_from_the_start() {
        // Friday 23:00 → Saturday 00:00 on a window open Friday only until midnight.
        let friday = NaiveDate::from_ymd_opt(2030, 6, 7).unwrap();
        let late = Window::new(OpenDays::NONE.with(Weekday::Fri), hm(18, 0), TimeOfDay::END_OF_DAY);
        let saturday = NaiveDate::from_ymd_opt(2030, 6, 8).unwrap();
        assert!(is_within_window(&late, at(friday, 23, 0), at(saturday, 0, 0)));
    }

    #[test]
    fn crossing_midnight_is_rejected() {
        let d = monday();
        let late = Window::new(OpenDays::EVERY_DAY, hm(18, 0), TimeOfDay::END_OF_DAY);
        let next = d.succ_opt().unwrap();
        assert_eq!(
            window_miss(&late, at(d, 23, 30), at(next, 0, 30)),
            Some(WindowMiss::AfterClosing { closes: TimeOfDay::END_OF_DAY })
        );
    }

    #[test]
    fn nested_stylist_window() {
        let d = monday();
        let stylist = Window::new(OpenDays::MON_FRI, hm(10, 0), hm(15, 0));
        assert!(is_within_window(&shop_window(), at(d, 14, 30), at(d, 15, 30)));
        assert!(!is_within_window(&stylist, at(d, 14, 30), at(d, 15, 30)));
        assert!(is_within_window(&stylist, at(d, 14, 0), at(d, 15, 0)));
    }
}
