use std::collections::BTreeMap;

use crate::model::*;

use super::EngineError;

/// Free spans per wash-window, keyed by window number.
pub type WindowSlots = BTreeMap<u32, Vec<Span>>;

// ── Availability Algorithm ────────────────────────────────────────

/// Compute the free spans of every wash-window `1..=window_count` between
/// `opening` and `closing` that can fit `duration` minutes.
///
/// Windows are independent: bookings for one window never affect another.
/// Every window is present in the result, with an empty vector when no gap
/// is long enough. Bookings keyed by a window outside `1..=window_count`
/// are ignored.
pub fn compute_slots(
    opening: Minute,
    closing: Minute,
    window_count: u32,
    duration: Minute,
    bookings_by_window: &BTreeMap<u32, Vec<Span>>,
) -> Result<WindowSlots, EngineError> {
    if duration <= 0 {
        return Err(EngineError::invalid(format!(
            "service duration must be positive, got {duration}"
        )));
    }
    if window_count < 1 {
        return Err(EngineError::invalid("facility must have at least one wash-window"));
    }
    if opening >= closing {
        return Err(EngineError::invalid("facility opening must be before closing"));
    }

    let mut slots = WindowSlots::new();
    for window in 1..=window_count {
        let mut bookings = bookings_by_window.get(&window).cloned().unwrap_or_default();
        bookings.sort();
        slots.insert(window, free_gaps(opening, closing, &bookings, duration));
    }
    Ok(slots)
}

/// Sweep a cursor from `opening` across bookings sorted by start, emitting
/// every gap of at least `duration` minutes.
///
/// The cursor only moves forward (`max`), so a booking contained in an
/// earlier one cannot pull it back and expose time that is still taken.
pub fn free_gaps(opening: Minute, closing: Minute, sorted: &[Span], duration: Minute) -> Vec<Span> {
    let mut free = Vec::new();
    let mut cursor = opening;

    for booking in sorted {
        if cursor >= closing {
            break;
        }
        let gap_end = booking.start.min(closing);
        if cursor < gap_end && gap_end - cursor >= duration {
            free.push(Span::new(cursor, gap_end));
        }
        cursor = cursor.max(booking.end);
    }

    if cursor < closing && closing - cursor >= duration {
        free.push(Span::new(cursor, closing));
    }
    free
}

/// Group reservation spans by wash-window.
pub fn group_by_window<'a, I>(reservations: I) -> BTreeMap<u32, Vec<Span>>
where
    I: IntoIterator<Item = &'a Reservation>,
{
    let mut grouped: BTreeMap<u32, Vec<Span>> = BTreeMap::new();
    for r in reservations {
        grouped.entry(r.window).or_default().push(r.span);
    }
    grouped
}

#[cfg(test)]
mod tests {
    use super::*;

    const H: Minute = 60;

    fn one_window(bookings: Vec<Span>) -> BTreeMap<u32, Vec<Span>> {
        BTreeMap::from([(1, bookings)])
    }

    // ── compute_slots ────────────────────────────────

    #[test]
    fn single_booking_splits_day() {
        let bookings = one_window(vec![Span::new(10 * H, 10 * H + 30)]);
        let slots = compute_slots(8 * H, 20 * H, 1, 30, &bookings).unwrap();
        assert_eq!(
            slots[&1],
            vec![Span::new(8 * H, 10 * H), Span::new(10 * H + 30, 20 * H)]
        );
    }

    #[test]
    fn empty_window_is_whole_day() {
        let slots = compute_slots(8 * H, 20 * H, 1, 90, &BTreeMap::new()).unwrap();
        assert_eq!(slots[&1], vec![Span::new(8 * H, 20 * H)]);
    }

    #[test]
    fn empty_window_too_short_for_service() {
        let slots = compute_slots(8 * H, 9 * H, 1, 90, &BTreeMap::new()).unwrap();
        assert_eq!(slots[&1], Vec::<Span>::new());
    }

    #[test]
    fn every_window_is_present() {
        let bookings = one_window(vec![Span::new(8 * H, 20 * H)]);
        let slots = compute_slots(8 * H, 20 * H, 3, 30, &bookings).unwrap();
        assert_eq!(slots.len(), 3);
        assert!(slots[&1].is_empty());
        assert_eq!(slots[&2], vec![Span::new(8 * H, 20 * H)]);
        assert_eq!(slots[&3], vec![Span::new(8 * H, 20 * H)]);
    }

    #[test]
    fn windows_are_independent() {
        let bookings = BTreeMap::from([
            (1, vec![Span::new(9 * H, 10 * H)]),
            (2, vec![Span::new(12 * H, 13 * H)]),
        ]);
        let slots = compute_slots(8 * H, 14 * H, 2, 60, &bookings).unwrap();
        assert_eq!(slots[&1], vec![Span::new(8 * H, 9 * H), Span::new(10 * H, 14 * H)]);
        assert_eq!(slots[&2], vec![Span::new(8 * H, 12 * H), Span::new(13 * H, 14 * H)]);
    }

    #[test]
    fn short_gaps_are_dropped() {
        // 20-minute gap between bookings, 30-minute service
        let bookings = one_window(vec![Span::new(9 * H, 10 * H), Span::new(10 * H + 20, 11 * H)]);
        let slots = compute_slots(9 * H, 12 * H, 1, 30, &bookings).unwrap();
        assert_eq!(slots[&1], vec![Span::new(11 * H, 12 * H)]);
    }

    #[test]
    fn gap_exactly_duration_is_kept() {
        let bookings = one_window(vec![Span::new(9 * H, 10 * H), Span::new(10 * H + 30, 11 * H)]);
        let slots = compute_slots(9 * H, 11 * H, 1, 30, &bookings).unwrap();
        assert_eq!(slots[&1], vec![Span::new(10 * H, 10 * H + 30)]);
    }

    #[test]
    fn unsorted_input_is_sorted() {
        let bookings = one_window(vec![Span::new(14 * H, 15 * H), Span::new(9 * H, 10 * H)]);
        let slots = compute_slots(8 * H, 16 * H, 1, 30, &bookings).unwrap();
        assert_eq!(
            slots[&1],
            vec![
                Span::new(8 * H, 9 * H),
                Span::new(10 * H, 14 * H),
                Span::new(15 * H, 16 * H),
            ]
        );
    }

    #[test]
    fn contained_booking_does_not_move_cursor_back() {
        // 09:00–12:00 contains 10:00–10:30; nothing is free until 12:00
        let bookings = one_window(vec![Span::new(9 * H, 12 * H), Span::new(10 * H, 10 * H + 30)]);
        let slots = compute_slots(8 * H, 14 * H, 1, 30, &bookings).unwrap();
        assert_eq!(slots[&1], vec![Span::new(8 * H, 9 * H), Span::new(12 * H, 14 * H)]);
    }

    #[test]
    fn bookings_outside_hours_are_clamped() {
        let bookings = one_window(vec![Span::new(6 * H, 9 * H), Span::new(21 * H, 22 * H)]);
        let slots = compute_slots(8 * H, 20 * H, 1, 30, &bookings).unwrap();
        assert_eq!(slots[&1], vec![Span::new(9 * H, 20 * H)]);
    }

    #[test]
    fn out_of_range_window_bookings_ignored() {
        let bookings = BTreeMap::from([(5, vec![Span::new(8 * H, 20 * H)])]);
        let slots = compute_slots(8 * H, 20 * H, 2, 30, &bookings).unwrap();
        assert_eq!(slots.keys().copied().collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(slots[&1], vec![Span::new(8 * H, 20 * H)]);
    }

    #[test]
    fn identical_inputs_identical_output() {
        let bookings = one_window(vec![Span::new(9 * H, 10 * H), Span::new(13 * H, 15 * H)]);
        let a = compute_slots(8 * H, 20 * H, 2, 45, &bookings).unwrap();
        let b = compute_slots(8 * H, 20 * H, 2, 45, &bookings).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn rejects_non_positive_duration() {
        assert!(matches!(
            compute_slots(8 * H, 20 * H, 1, 0, &BTreeMap::new()),
            Err(EngineError::InvalidInput(_))
        ));
        assert!(matches!(
            compute_slots(8 * H, 20 * H, 1, -15, &BTreeMap::new()),
            Err(EngineError::InvalidInput(_))
        ));
    }

    #[test]
    fn rejects_zero_windows() {
        assert!(matches!(
            compute_slots(8 * H, 20 * H, 0, 30, &BTreeMap::new()),
            Err(EngineError::InvalidInput(_))
        ));
    }

    #[test]
    fn rejects_inverted_hours() {
        assert!(compute_slots(20 * H, 8 * H, 1, 30, &BTreeMap::new()).is_err());
    }

    // ── group_by_window ──────────────────────────────

    #[test]
    fn groups_by_window() {
        use chrono::NaiveDate;
        use ulid::Ulid;

        let make = |window, start, end| Reservation {
            id: Ulid::new(),
            facility_id: Ulid::nil(),
            service_id: Ulid::nil(),
            client_id: Ulid::nil(),
            date: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            span: Span::new(start, end),
            window,
            state: ReservationState::PENDING,
        };
        let rs = vec![make(2, 60, 90), make(1, 0, 30), make(2, 0, 30)];
        let grouped = group_by_window(&rs);
        assert_eq!(grouped[&1], vec![Span::new(0, 30)]);
        assert_eq!(grouped[&2], vec![Span::new(60, 90), Span::new(0, 30)]);
    }
}
