use ulid::Ulid;

use crate::model::*;

use super::EngineError;

/// True when `candidate` overlaps any reservation sharing its
/// (facility, date, window) partition. `existing` may be unfiltered.
pub fn has_conflict(existing: &[Reservation], candidate: &Reservation) -> bool {
    find_conflict(existing, &candidate.partition(), &candidate.span).is_some()
}

/// Id of the first reservation in `key`'s partition whose span overlaps `span`.
pub fn find_conflict<'a, I>(existing: I, key: &PartitionKey, span: &Span) -> Option<Ulid>
where
    I: IntoIterator<Item = &'a Reservation>,
{
    existing
        .into_iter()
        .filter(|r| r.partition() == *key)
        .find(|r| r.span.overlaps(span))
        .map(|r| r.id)
}

/// Build a span from untrusted minute values.
pub(crate) fn validate_span(start: Minute, end: Minute) -> Result<Span, EngineError> {
    if start < 0 || end > MINUTES_PER_DAY {
        return Err(EngineError::invalid("time of day out of range"));
    }
    if start >= end {
        return Err(EngineError::invalid(format!(
            "start {} must be before end {}",
            format_time_of_day(start),
            format_time_of_day(end)
        )));
    }
    Ok(Span::new(start, end))
}

/// Caller holds the partition write lock.
pub(crate) fn check_no_conflict(partition: &PartitionState, span: &Span) -> Result<(), EngineError> {
    match find_conflict(partition.overlapping(span), &partition.key, span) {
        Some(id) => Err(EngineError::Conflict(id)),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()
    }

    fn at(facility_id: Ulid, window: u32, start: Minute, end: Minute) -> Reservation {
        Reservation {
            id: Ulid::new(),
            facility_id,
            service_id: Ulid::nil(),
            client_id: Ulid::nil(),
            date: day(),
            span: Span::new(start, end),
            window,
            state: ReservationState::PENDING,
        }
    }

    #[test]
    fn empty_partition_never_conflicts() {
        let f = Ulid::new();
        assert!(!has_conflict(&[], &at(f, 1, 600, 660)));
    }

    #[test]
    fn touching_boundaries_do_not_conflict() {
        let f = Ulid::new();
        let existing = vec![at(f, 1, 540, 600)];
        assert!(!has_conflict(&existing, &at(f, 1, 600, 660)));
        assert!(!has_conflict(&existing, &at(f, 1, 480, 540)));
    }

    #[test]
    fn identical_spans_conflict() {
        let f = Ulid::new();
        let existing = vec![at(f, 1, 540, 600)];
        assert!(has_conflict(&existing, &at(f, 1, 540, 600)));
    }

    #[test]
    fn partial_and_contained_overlaps_conflict() {
        let f = Ulid::new();
        let existing = vec![at(f, 1, 540, 600)];
        assert!(has_conflict(&existing, &at(f, 1, 570, 630)));
        assert!(has_conflict(&existing, &at(f, 1, 500, 560)));
        assert!(has_conflict(&existing, &at(f, 1, 550, 560)));
        assert!(has_conflict(&existing, &at(f, 1, 480, 720)));
    }

    #[test]
    fn other_partitions_are_ignored() {
        let f = Ulid::new();
        let mut other_day = at(f, 1, 540, 600);
        other_day.date = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap();
        let existing = vec![
            at(f, 2, 540, 600),          // other window
            at(Ulid::new(), 1, 540, 600), // other facility
            other_day,
        ];
        assert!(!has_conflict(&existing, &at(f, 1, 540, 600)));
    }

    #[test]
    fn find_conflict_reports_first_match() {
        let f = Ulid::new();
        let first = at(f, 1, 540, 600);
        let second = at(f, 1, 600, 690);
        let existing = vec![first.clone(), second.clone()];
        let candidate = at(f, 1, 570, 630);
        let hit = find_conflict(&existing, &candidate.partition(), &candidate.span);
        assert_eq!(hit, Some(first.id));
    }

    #[test]
    fn scenario_back_to_back_bookings() {
        // 09:00–10:00 and 10:00–11:30 booked in window 1
        let f = Ulid::new();
        let existing = vec![at(f, 1, 540, 600), at(f, 1, 600, 690)];
        assert!(has_conflict(&existing, &at(f, 1, 570, 630)));
        assert!(!has_conflict(&existing, &at(f, 1, 690, 780)));
    }

    #[test]
    fn check_no_conflict_uses_partition() {
        let f = Ulid::new();
        let r = at(f, 1, 540, 600);
        let mut partition = PartitionState::new(r.partition());
        partition.insert_reservation(r.clone());
        assert!(matches!(
            check_no_conflict(&partition, &Span::new(590, 620)),
            Err(EngineError::Conflict(id)) if id == r.id
        ));
        assert!(check_no_conflict(&partition, &Span::new(600, 620)).is_ok());
    }

    #[test]
    fn validate_span_rejects_bad_ordering() {
        assert!(validate_span(600, 600).is_err());
        assert!(validate_span(660, 600).is_err());
        assert!(validate_span(-1, 60).is_err());
        assert!(validate_span(1380, MINUTES_PER_DAY + 1).is_err());
        assert_eq!(validate_span(600, 660).unwrap(), Span::new(600, 660));
    }
}
