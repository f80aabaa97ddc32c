use chrono::{NaiveDate, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Minutes since midnight.
pub type Minute = i32;

pub const MINUTES_PER_DAY: Minute = 24 * 60;

/// Half-open interval `[start, end)` within one calendar day.
///
/// Ordering is by `start`, then `end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Span {
    pub start: Minute,
    pub end: Minute,
}

impl Span {
    pub fn new(start: Minute, end: Minute) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn duration_minutes(&self) -> Minute {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TimeOfDayError {
    #[error("malformed time of day: {0:?} (expected HH:MM or HH:MM:SS)")]
    Malformed(String),
    #[error("time of day {0:?} is not a whole minute")]
    SubMinute(String),
}

/// Parse `HH:MM` or `HH:MM:SS` into minutes since midnight. A non-zero
/// seconds part is rejected, not truncated.
pub fn parse_time_of_day(raw: &str) -> Result<Minute, TimeOfDayError> {
    let raw = raw.trim();
    let time = NaiveTime::parse_from_str(raw, "%H:%M:%S%.f")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"))
        .map_err(|_| TimeOfDayError::Malformed(raw.to_string()))?;
    if time.second() != 0 || time.nanosecond() != 0 {
        return Err(TimeOfDayError::SubMinute(raw.to_string()));
    }
    Ok((time.hour() * 60 + time.minute()) as Minute)
}

pub fn format_time_of_day(minute: Minute) -> String {
    format!("{:02}:{:02}", minute / 60, minute % 60)
}

/// Lifecycle state code. `1` and `2` are fixed; anything above is
/// facility-defined and carried through untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReservationState(pub u8);

impl ReservationState {
    pub const PENDING: Self = Self(1);
    pub const CONFIRMED: Self = Self(2);

    pub fn code(self) -> u8 {
        self.0
    }
}

impl Default for ReservationState {
    fn default() -> Self {
        Self::PENDING
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Facility {
    pub id: Ulid,
    pub name: String,
    pub address: String,
    pub latitude: f64,
    pub longitude: f64,
    pub opening: Minute,
    pub closing: Minute,
    /// Number of wash-windows, numbered `1..=windows`.
    pub windows: u32,
    pub rating: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub id: Ulid,
    pub facility_id: Ulid,
    pub name: String,
    pub description: String,
    pub duration: Minute,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    pub id: Ulid,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Ulid,
    pub facility_id: Ulid,
    pub service_id: Ulid,
    pub client_id: Ulid,
    pub date: NaiveDate,
    pub span: Span,
    pub window: u32,
    pub state: ReservationState,
}

impl Reservation {
    pub fn partition(&self) -> PartitionKey {
        PartitionKey {
            facility_id: self.facility_id,
            date: self.date,
            window: self.window,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feedback {
    pub id: Ulid,
    pub client_id: Ulid,
    pub facility_id: Ulid,
    pub comment: String,
}

/// A facility before it has been assigned an identity.
#[derive(Debug, Clone, PartialEq)]
pub struct NewFacility {
    pub name: String,
    pub address: String,
    pub latitude: f64,
    pub longitude: f64,
    pub opening: Minute,
    pub closing: Minute,
    pub windows: u32,
    pub rating: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewService {
    pub facility_id: Ulid,
    pub name: String,
    pub description: String,
    pub duration: Minute,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFeedback {
    pub client_id: Ulid,
    pub facility_id: Ulid,
    pub comment: String,
}

/// A reservation before it has been assigned an identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReservation {
    pub facility_id: Ulid,
    pub service_id: Ulid,
    pub client_id: Ulid,
    pub date: NaiveDate,
    pub start: Minute,
    pub end: Minute,
    pub window: u32,
    pub state: ReservationState,
}

impl NewReservation {
    pub fn partition(&self) -> PartitionKey {
        PartitionKey {
            facility_id: self.facility_id,
            date: self.date,
            window: self.window,
        }
    }
}

/// The unit within which reservations may not overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PartitionKey {
    pub facility_id: Ulid,
    pub date: NaiveDate,
    pub window: u32,
}

/// All reservations of one wash-window on one day.
#[derive(Debug, Clone)]
pub struct PartitionState {
    pub key: PartitionKey,
    /// Sorted by `span.start`.
    pub reservations: Vec<Reservation>,
}

impl PartitionState {
    pub fn new(key: PartitionKey) -> Self {
        Self {
            key,
            reservations: Vec::new(),
        }
    }

    /// Insert maintaining sort order by span.start.
    pub fn insert_reservation(&mut self, reservation: Reservation) {
        let pos = self
            .reservations
            .binary_search_by_key(&reservation.span.start, |r| r.span.start)
            .unwrap_or_else(|e| e);
        self.reservations.insert(pos, reservation);
    }

    pub fn get_mut(&mut self, id: Ulid) -> Option<&mut Reservation> {
        self.reservations.iter_mut().find(|r| r.id == id)
    }

    /// Reservations whose span overlaps `query`.
    /// Binary search skips everything starting at or after `query.end`.
    pub fn overlapping(&self, query: &Span) -> impl Iterator<Item = &Reservation> {
        let right_bound = self
            .reservations
            .partition_point(|r| r.span.start < query.end);
        self.reservations[..right_bound]
            .iter()
            .filter(move |r| r.span.end > query.start)
    }
}

// ── Query result types ───────────────────────────────────────────

/// Free spans per wash-window for one facility, date and service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Availability {
    pub facility_id: Ulid,
    pub service_id: Ulid,
    pub date: NaiveDate,
    pub duration: Minute,
    /// Every window `1..=facility.windows`, each in chronological order.
    pub windows: std::collections::BTreeMap<u32, Vec<Span>>,
}

/// Journal record format. One variant per state change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    FacilityCreated(Facility),
    FacilityDeleted { id: Ulid },
    ServiceCreated(Service),
    ServiceDeleted { id: Ulid },
    ClientRegistered(Client),
    ReservationCreated(Reservation),
    ReservationStateChanged { id: Ulid, state: ReservationState },
    FeedbackCreated(Feedback),
    FeedbackDeleted { id: Ulid },
}
