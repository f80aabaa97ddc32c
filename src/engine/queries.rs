use chrono::NaiveDate;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::availability::{compute_slots, group_by_window};
use super::{Engine, EngineError};

fn search_needle(name: &str) -> Result<String, EngineError> {
    let needle = name.trim();
    if needle.is_empty() {
        return Err(EngineError::invalid("search query must not be empty"));
    }
    if needle.len() > MAX_SEARCH_LEN {
        return Err(EngineError::LimitExceeded("search query too long"));
    }
    Ok(needle.to_lowercase())
}

impl Engine {
    // ── Facilities ───────────────────────────────────────────

    pub async fn get_facility(&self, id: Ulid) -> Result<Facility, EngineError> {
        let entry = self
            .store
            .facility_entry(&id)
            .ok_or(EngineError::not_found("facility", id))?;
        let guard = entry.read().await;
        guard.clone().ok_or(EngineError::not_found("facility", id))
    }

    /// All facilities ordered by name.
    pub async fn list_facilities(&self) -> Vec<Facility> {
        let mut out = Vec::new();
        for entry in self.store.facility_entries() {
            if let Some(facility) = entry.read().await.as_ref() {
                out.push(facility.clone());
            }
        }
        out.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        out
    }

    /// Case-insensitive substring match on the facility name.
    pub async fn search_facilities(&self, name: &str) -> Result<Vec<Facility>, EngineError> {
        let needle = search_needle(name)?;
        let mut found = self.list_facilities().await;
        found.retain(|f| f.name.to_lowercase().contains(&needle));
        Ok(found)
    }

    // ── Services ─────────────────────────────────────────────

    pub fn list_services(&self) -> Vec<Service> {
        let mut out = self.store.services();
        out.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        out
    }

    pub fn search_services(&self, name: &str) -> Result<Vec<Service>, EngineError> {
        let needle = search_needle(name)?;
        let mut found = self.list_services();
        found.retain(|s| s.name.to_lowercase().contains(&needle));
        Ok(found)
    }

    // ── Clients ──────────────────────────────────────────────

    pub fn get_client(&self, id: Ulid) -> Result<Client, EngineError> {
        self.store
            .get_client(&id)
            .ok_or(EngineError::not_found("client", id))
    }

    // ── Reservations ─────────────────────────────────────────

    pub async fn get_reservation(&self, id: Ulid) -> Result<Reservation, EngineError> {
        let key = self
            .store
            .partition_key_for(&id)
            .ok_or(EngineError::not_found("reservation", id))?;
        let partition = self
            .store
            .get_partition(&key)
            .ok_or(EngineError::not_found("reservation", id))?;
        let guard = partition.read().await;
        guard
            .reservations
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or(EngineError::not_found("reservation", id))
    }

    /// A facility's reservations, optionally for one date, ordered by
    /// `(date, start)`. Empty for an unknown facility.
    pub async fn reservations_by_facility(
        &self,
        facility_id: Ulid,
        date: Option<NaiveDate>,
    ) -> Vec<Reservation> {
        let mut out = Vec::new();
        for partition in self.store.partitions_of(&facility_id, date) {
            out.extend(partition.read().await.reservations.iter().cloned());
        }
        out.sort_by_key(|r| (r.date, r.span, r.window));
        out
    }

    /// A client's reservations, most recent first.
    pub async fn reservations_by_client(&self, client_id: Ulid) -> Vec<Reservation> {
        let mut out = Vec::new();
        for partition in self.store.all_partitions() {
            let guard = partition.read().await;
            out.extend(
                guard
                    .reservations
                    .iter()
                    .filter(|r| r.client_id == client_id)
                    .cloned(),
            );
        }
        out.sort_by_key(|r| std::cmp::Reverse((r.date, r.span)));
        out
    }

    // ── Feedback ─────────────────────────────────────────────

    /// Feedback left for a facility, ordered by comment text.
    pub fn feedback_for_facility(&self, facility_id: Ulid) -> Vec<Feedback> {
        let mut out = self.store.feedback_for(&facility_id);
        out.sort_by(|a, b| a.comment.cmp(&b.comment).then(a.id.cmp(&b.id)));
        out
    }

    // ── Availability ─────────────────────────────────────────

    /// Free spans per wash-window on `date` long enough for `service_id`.
    ///
    /// Each partition is read-locked while its spans are copied out; the
    /// computation itself runs on the copies.
    pub async fn available_windows(
        &self,
        facility_id: Ulid,
        date: NaiveDate,
        service_id: Ulid,
    ) -> Result<Availability, EngineError> {
        let facility = self.get_facility(facility_id).await?;
        let service = self
            .store
            .get_service(&service_id)
            .ok_or(EngineError::not_found("service", service_id))?;

        let mut booked = Vec::new();
        for partition in self.store.partitions_of(&facility_id, Some(date)) {
            booked.extend(partition.read().await.reservations.iter().cloned());
        }
        let windows = compute_slots(
            facility.opening,
            facility.closing,
            facility.windows,
            service.duration,
            &group_by_window(&booked),
        )?;

        Ok(Availability {
            facility_id,
            service_id,
            date,
            duration: service.duration,
            windows,
        })
    }
}
