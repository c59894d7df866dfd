use chrono::NaiveDateTime;

use crate::config::CapacityRule;
use crate::model::*;

/// An occupied interval and the reservation holding it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookedSlot {
    pub span: Span,
    pub owner: ReservationId,
}

impl From<&Reservation> for BookedSlot {
    fn from(r: &Reservation) -> Self {
        Self {
            span: r.span(),
            owner: r.id,
        }
    }
}

/// Every slot in `existing` whose span overlaps `candidate` under the half-open
/// predicate `s1 < e2 && s2 < e1`. Back-to-back slots do not overlap; containment
/// in either direction does.
pub fn find_overlaps(candidate: &Span, existing: &[BookedSlot]) -> Vec<BookedSlot> {
    existing
        .iter()
        .filter(|slot| slot.span.overlaps(candidate))
        .copied()
        .collect()
}

/// Sweep line: the largest number of `slots` active at one instant inside `candidate`.
pub fn peak_occupancy(candidate: &Span, slots: &[BookedSlot]) -> u32 {
    let mut events: Vec<(NaiveDateTime, i32)> = Vec::with_capacity(slots.len() * 2);
    for slot in slots.iter().filter(|s| s.span.overlaps(candidate)) {
        events.push((slot.span.start.max(candidate.start), 1));
        events.push((slot.span.end.min(candidate.end), -1));
    }
    // Ends sort before starts at the same instant: back-to-back slots never stack.
    events.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));

    let mut count: i32 = 0;
    let mut peak: i32 = 0;
    for (_, delta) in &events {
        count += delta;
        peak = peak.max(count);
    }
    peak as u32
}

/// Reservations that leave no free seat for `candidate`, or `None` if a seat is free.
pub(crate) fn seat_blockers(
    rule: CapacityRule,
    seats: u32,
    candidate: &Span,
    existing: &[BookedSlot],
) -> Option<Vec<ReservationId>> {
    let overlaps = find_overlaps(candidate, existing);
    let saturated = match rule {
        CapacityRule::OverlapCount => overlaps.len() as u64 >= u64::from(seats),
        CapacityRule::PeakOccupancy => peak_occupancy(candidate, &overlaps) >= seats,
    };
    saturated.then(|| overlaps.iter().map(|s| s.owner).collect())
}

/// A stylist has capacity one: any overlap blocks.
pub(crate) fn stylist_blockers(candidate: &Span, existing: &[BookedSlot]) -> Option<Vec<ReservationId>> {
    let overlaps = find_overlaps(candidate, existing);
    (!overlaps.is_empty()).then(|| overlaps.iter().map(|s| s.owner).collect())
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use ulid::Ulid;

    use super::*;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2030, 6, 3)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn span(from: (u32, u32), to: (u32, u32)) -> Span {
        Span::new(at(from.0, from.1), at(to.0, to.1))
    }

    fn slot(from: (u32, u32), to: (u32, u32)) -> BookedSlot {
        BookedSlot {
            span: span(from, to),
            owner: Ulid::new(),
        }
    }

    #[test]
    fn back_to_back_does_not_overlap() {
        let existing = vec![slot((10, 0), (11, 0)), slot((12, 0), (13, 0))];
        assert!(find_overlaps(&span((11, 0), (12, 0)), &existing).is_empty());
    }

    #[test]
    fn partial_overlap_either_side() {
        let existing = vec![slot((10, 0), (11, 0))];
        assert_eq!(find_overlaps(&span((10, 30), (11, 30)), &existing).len(), 1);
        assert_eq!(find_overlaps(&span((9, 30), (10, 30)), &existing).len(), 1);
    }

    #[test]
    fn candidate_inside_existing_overlaps() {
        let existing = vec![slot((10, 0), (13, 0))];
        assert_eq!(find_overlaps(&span((11, 0), (11, 30)), &existing).len(), 1);
    }

    #[test]
    fn candidate_swallowing_existing_overlaps() {
        // Neither endpoint of the candidate falls inside the existing slot.
        let inner = slot((11, 0), (11, 30));
        let found = find_overlaps(&span((10, 0), (13, 0)), &[inner]);
        assert_eq!(found, vec![inner]);
    }

    #[test]
    fn identical_spans_overlap() {
        let existing = vec![slot((10, 0), (11, 0))];
        assert_eq!(find_overlaps(&span((10, 0), (11, 0)), &existing).len(), 1);
    }

    #[test]
    fn returns_only_the_blocking_slots() {
        let a = slot((9, 0), (10, 0));
        let b = slot((10, 30), (11, 0));
        let c = slot((11, 0), (12, 0));
        let found = find_overlaps(&span((10, 0), (11, 0)), &[a, b, c]);
        assert_eq!(found, vec![b]);
    }

    #[test]
    fn peak_counts_simultaneous_only() {
        let sequential = vec![slot((10, 0), (11, 0)), slot((11, 0), (12, 0))];
        assert_eq!(peak_occupancy(&span((10, 0), (12, 0)), &sequential), 1);

        let stacked = vec![
            slot((10, 0), (12, 0)),
            slot((10, 30), (11, 0)),
            slot((10, 45), (11, 30)),
        ];
        assert_eq!(peak_occupancy(&span((10, 0), (12, 0)), &stacked), 3);
        // Clipped to the candidate, only the long slot and the last one remain.
        assert_eq!(peak_occupancy(&span((11, 0), (12, 0)), &stacked), 2);
    }

    #[test]
    fn peak_of_nothing_is_zero() {
        assert_eq!(peak_occupancy(&span((10, 0), (11, 0)), &[]), 0);
    }

    #[test]
    fn seat_rules_differ_on_sequential_bookings() {
        let existing = vec![slot((10, 0), (11, 0)), slot((11, 0), (12, 0))];
        let candidate = span((10, 0), (12, 0));
        let blockers = seat_blockers(CapacityRule::OverlapCount, 2, &candidate, &existing);
        assert_eq!(blockers.map(|b| b.len()), Some(2));
        assert!(seat_blockers(CapacityRule::PeakOccupancy, 2, &candidate, &existing).is_none());
    }

    #[test]
    fn seats_free_below_capacity() {
        let existing = vec![slot((10, 0), (11, 0))];
        let candidate = span((10, 0), (11, 0));
        assert!(seat_blockers(CapacityRule::OverlapCount, 2, &candidate, &existing).is_none());
        assert!(seat_blockers(CapacityRule::OverlapCount, 1, &candidate, &existing).is_some());
    }

    #[test]
    fn stylist_blocked_by_any_overlap() {
        let booked = slot((13, 0), (14, 0));
        assert_eq!(
            stylist_blockers(&span((13, 30), (14, 30)), &[booked]),
            Some(vec![booked.owner])
        );
        assert!(stylist_blockers(&span((14, 0), (15, 0)), &[booked]).is_none());
    }
}
