use std::io;
use std::sync::Arc;

use chrono::NaiveDate;
use dashmap::DashMap;
use tokio::sync::RwLock;
use ulid::Ulid;

use crate::model::*;

/// A facility behind its gate lock. Reservation and feedback writers hold
/// the read side while they work; deletion takes the write side and leaves
/// `None` behind.
pub type SharedFacility = Arc<RwLock<Option<Facility>>>;

pub type SharedPartition = Arc<RwLock<PartitionState>>;

/// Keyed in-memory store. Holds no business rules: validation and locking
/// discipline live in the engine.
pub struct InMemoryStore {
    facilities: DashMap<Ulid, SharedFacility>,
    services: DashMap<Ulid, Service>,
    clients: DashMap<Ulid, Client>,
    feedback: DashMap<Ulid, Feedback>,
    partitions: DashMap<PartitionKey, SharedPartition>,
    /// Reverse lookup: reservation id → partition key
    reservation_index: DashMap<Ulid, PartitionKey>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            facilities: DashMap::new(),
            services: DashMap::new(),
            clients: DashMap::new(),
            feedback: DashMap::new(),
            partitions: DashMap::new(),
            reservation_index: DashMap::new(),
        }
    }

    // ── Facilities ───────────────────────────────────────────

    pub fn facility_count(&self) -> usize {
        self.facilities.len()
    }

    pub fn facility_entry(&self, id: &Ulid) -> Option<SharedFacility> {
        self.facilities.get(id).map(|e| e.value().clone())
    }

    pub fn facility_entries(&self) -> Vec<SharedFacility> {
        self.facilities.iter().map(|e| e.value().clone()).collect()
    }

    pub fn insert_facility(&self, facility: Facility) {
        self.facilities
            .insert(facility.id, Arc::new(RwLock::new(Some(facility))));
    }

    /// Drop a facility and everything that hangs off it: services, feedback,
    /// and every reservation partition.
    pub fn purge_facility(&self, id: &Ulid) {
        self.facilities.remove(id);
        self.services.retain(|_, s| s.facility_id != *id);
        self.feedback.retain(|_, f| f.facility_id != *id);
        self.partitions.retain(|key, _| key.facility_id != *id);
        self.reservation_index.retain(|_, key| key.facility_id != *id);
    }

    // ── Services ─────────────────────────────────────────────

    pub fn contains_service(&self, id: &Ulid) -> bool {
        self.services.contains_key(id)
    }

    pub fn get_service(&self, id: &Ulid) -> Option<Service> {
        self.services.get(id).map(|e| e.value().clone())
    }

    pub fn services(&self) -> Vec<Service> {
        self.services.iter().map(|e| e.value().clone()).collect()
    }

    pub fn insert_service(&self, service: Service) {
        self.services.insert(service.id, service);
    }

    pub fn remove_service(&self, id: &Ulid) -> Option<Service> {
        self.services.remove(id).map(|(_, s)| s)
    }

    // ── Clients ──────────────────────────────────────────────

    pub fn contains_client(&self, id: &Ulid) -> bool {
        self.clients.contains_key(id)
    }

    pub fn get_client(&self, id: &Ulid) -> Option<Client> {
        self.clients.get(id).map(|e| e.value().clone())
    }

    pub fn clients(&self) -> Vec<Client> {
        self.clients.iter().map(|e| e.value().clone()).collect()
    }

    pub fn insert_client(&self, client: Client) {
        self.clients.insert(client.id, client);
    }

    // ── Feedback ─────────────────────────────────────────────

    pub fn contains_feedback(&self, id: &Ulid) -> bool {
        self.feedback.contains_key(id)
    }

    pub fn get_feedback(&self, id: &Ulid) -> Option<Feedback> {
        self.feedback.get(id).map(|e| e.value().clone())
    }

    pub fn feedback_for(&self, facility_id: &Ulid) -> Vec<Feedback> {
        self.feedback
            .iter()
            .filter(|e| e.value().facility_id == *facility_id)
            .map(|e| e.value().clone())
            .collect()
    }

    pub fn all_feedback(&self) -> Vec<Feedback> {
        self.feedback.iter().map(|e| e.value().clone()).collect()
    }

    pub fn insert_feedback(&self, feedback: Feedback) {
        self.feedback.insert(feedback.id, feedback);
    }

    pub fn remove_feedback(&self, id: &Ulid) -> Option<Feedback> {
        self.feedback.remove(id).map(|(_, f)| f)
    }

    // ── Reservation partitions ───────────────────────────────

    /// Get or create the partition for `key`.
    pub fn partition(&self, key: PartitionKey) -> SharedPartition {
        self.partitions
            .entry(key)
            .or_insert_with(|| Arc::new(RwLock::new(PartitionState::new(key))))
            .value()
            .clone()
    }

    pub fn get_partition(&self, key: &PartitionKey) -> Option<SharedPartition> {
        self.partitions.get(key).map(|e| e.value().clone())
    }

    /// Every partition of a facility, optionally limited to one date,
    /// ordered by (date, window).
    pub fn partitions_of(&self, facility_id: &Ulid, date: Option<NaiveDate>) -> Vec<SharedPartition> {
        let mut found: Vec<(PartitionKey, SharedPartition)> = self
            .partitions
            .iter()
            .filter(|e| {
                let key = e.key();
                key.facility_id == *facility_id && date.is_none_or(|d| key.date == d)
            })
            .map(|e| (*e.key(), e.value().clone()))
            .collect();
        found.sort_by_key(|(key, _)| (key.date, key.window));
        found.into_iter().map(|(_, p)| p).collect()
    }

    pub fn all_partitions(&self) -> Vec<SharedPartition> {
        self.partitions.iter().map(|e| e.value().clone()).collect()
    }

    pub fn partition_key_for(&self, reservation_id: &Ulid) -> Option<PartitionKey> {
        self.reservation_index.get(reservation_id).map(|e| *e.value())
    }

    pub fn reservation_count(&self) -> usize {
        self.reservation_index.len()
    }

    // ── Event application ────────────────────────────────────

    /// Apply a reservation event to its partition (caller holds the lock)
    /// and keep the reverse index in step.
    pub fn apply_to_partition(&self, partition: &mut PartitionState, event: &Event) {
        match event {
            Event::ReservationCreated(reservation) => {
                self.reservation_index
                    .insert(reservation.id, reservation.partition());
                partition.insert_reservation(reservation.clone());
            }
            Event::ReservationStateChanged { id, state } => {
                if let Some(r) = partition.get_mut(*id) {
                    r.state = *state;
                }
            }
            _ => {}
        }
    }

    /// Apply a non-reservation event.
    pub fn apply_catalog(&self, event: &Event) {
        match event {
            Event::FacilityCreated(facility) => self.insert_facility(facility.clone()),
            Event::FacilityDeleted { id } => self.purge_facility(id),
            Event::ServiceCreated(service) => self.insert_service(service.clone()),
            Event::ServiceDeleted { id } => {
                self.remove_service(id);
            }
            Event::ClientRegistered(client) => self.insert_client(client.clone()),
            Event::FeedbackCreated(feedback) => self.insert_feedback(feedback.clone()),
            Event::FeedbackDeleted { id } => {
                self.remove_feedback(id);
            }
            Event::ReservationCreated(_) | Event::ReservationStateChanged { .. } => {}
        }
    }

    /// Apply an event read back from the journal. Nothing else holds a lock
    /// during recovery, so every `try_write` succeeds.
    pub fn apply_replayed(&self, event: &Event) -> io::Result<()> {
        let key = match event {
            Event::ReservationCreated(reservation) => Some(reservation.partition()),
            Event::ReservationStateChanged { id, .. } => self.partition_key_for(id),
            other => {
                self.apply_catalog(other);
                return Ok(());
            }
        };
        // State change for a reservation purged with its facility.
        let Some(key) = key else { return Ok(()) };
        let partition = self.partition(key);
        let mut guard = partition
            .try_write()
            .map_err(|_| io::Error::other("replay: partition unexpectedly locked"))?;
        self.apply_to_partition(&mut guard, event);
        Ok(())
    }

    /// Minimal event list that rebuilds the current state.
    pub fn snapshot_events(&self) -> io::Result<Vec<Event>> {
        let mut events = Vec::new();
        for entry in self.facility_entries() {
            let guard = entry
                .try_read()
                .map_err(|_| io::Error::other("snapshot: facility unexpectedly locked"))?;
            if let Some(facility) = guard.as_ref() {
                events.push(Event::FacilityCreated(facility.clone()));
            }
        }
        events.extend(self.clients().into_iter().map(Event::ClientRegistered));
        events.extend(self.services().into_iter().map(Event::ServiceCreated));
        for partition in self.all_partitions() {
            let guard = partition
                .try_read()
                .map_err(|_| io::Error::other("snapshot: partition unexpectedly locked"))?;
            events.extend(
                guard
                    .reservations
                    .iter()
                    .cloned()
                    .map(Event::ReservationCreated),
            );
        }
        events.extend(self.all_feedback().into_iter().map(Event::FeedbackCreated));
        Ok(events)
    }
}
