use tracing::{debug, info};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability;

use super::conflict::{check_no_conflict, validate_span};
use super::{Engine, EngineError};

fn check_len(value: &str, max: usize, what: &'static str) -> Result<(), EngineError> {
    if value.len() > max {
        return Err(EngineError::LimitExceeded(what));
    }
    Ok(())
}

fn check_not_blank(value: &str, what: &str) -> Result<(), EngineError> {
    if value.trim().is_empty() {
        return Err(EngineError::invalid(format!("{what} must not be empty")));
    }
    Ok(())
}

impl Engine {
    // ── Facilities ───────────────────────────────────────────

    pub async fn create_facility(&self, new: NewFacility) -> Result<Facility, EngineError> {
        check_not_blank(&new.name, "facility name")?;
        check_len(&new.name, MAX_NAME_LEN, "facility name too long")?;
        check_len(&new.address, MAX_ADDRESS_LEN, "address too long")?;
        validate_span(new.opening, new.closing)?;
        if new.windows < 1 {
            return Err(EngineError::invalid("facility must have at least one wash-window"));
        }
        if new.windows > MAX_WINDOWS_PER_FACILITY {
            return Err(EngineError::LimitExceeded("too many wash-windows"));
        }
        if !(-90.0..=90.0).contains(&new.latitude) || !(-180.0..=180.0).contains(&new.longitude) {
            return Err(EngineError::invalid("coordinates out of range"));
        }
        if self.store.facility_count() >= MAX_FACILITIES {
            return Err(EngineError::LimitExceeded("too many facilities"));
        }

        let facility = Facility {
            id: Ulid::new(),
            name: new.name,
            address: new.address,
            latitude: new.latitude,
            longitude: new.longitude,
            opening: new.opening,
            closing: new.closing,
            windows: new.windows,
            rating: new.rating,
        };
        self.persist_catalog(&Event::FacilityCreated(facility.clone()))
            .await?;
        info!("created facility {} ({:?})", facility.id, facility.name);
        Ok(facility)
    }

    /// Delete a facility together with its services, reservations and
    /// feedback. Waits for in-flight writers on the facility to finish.
    pub async fn delete_facility(&self, id: Ulid) -> Result<(), EngineError> {
        let entry = self
            .store
            .facility_entry(&id)
            .ok_or(EngineError::not_found("facility", id))?;
        let mut gate = entry.write().await;
        if gate.is_none() {
            return Err(EngineError::not_found("facility", id));
        }

        let event = Event::FacilityDeleted { id };
        self.persist_catalog(&event).await?;
        *gate = None;
        info!("deleted facility {id}");
        Ok(())
    }

    // ── Services ─────────────────────────────────────────────

    pub async fn create_service(&self, new: NewService) -> Result<Service, EngineError> {
        check_not_blank(&new.name, "service name")?;
        check_len(&new.name, MAX_NAME_LEN, "service name too long")?;
        check_len(&new.description, MAX_DESCRIPTION_LEN, "description too long")?;
        if new.duration <= 0 {
            return Err(EngineError::invalid(format!(
                "service duration must be positive, got {}",
                new.duration
            )));
        }
        if new.duration > MINUTES_PER_DAY {
            return Err(EngineError::invalid("service duration longer than a day"));
        }

        let entry = self
            .store
            .facility_entry(&new.facility_id)
            .ok_or(EngineError::not_found("facility", new.facility_id))?;
        let gate = entry.read().await;
        if gate.is_none() {
            return Err(EngineError::not_found("facility", new.facility_id));
        }

        let service = Service {
            id: Ulid::new(),
            facility_id: new.facility_id,
            name: new.name,
            description: new.description,
            duration: new.duration,
        };
        self.persist_catalog(&Event::ServiceCreated(service.clone()))
            .await?;
        info!("created service {} for facility {}", service.id, service.facility_id);
        Ok(service)
    }

    /// Existing reservations keep their service reference. Deletes of one
    /// facility's services run one at a time under its gate.
    pub async fn delete_service(&self, id: Ulid) -> Result<(), EngineError> {
        let service = self
            .store
            .get_service(&id)
            .ok_or(EngineError::not_found("service", id))?;
        let entry = self
            .store
            .facility_entry(&service.facility_id)
            .ok_or(EngineError::not_found("service", id))?;
        let gate = entry.write().await;
        if gate.is_none() || !self.store.contains_service(&id) {
            return Err(EngineError::not_found("service", id));
        }

        self.persist_catalog(&Event::ServiceDeleted { id }).await?;
        info!("deleted service {id}");
        Ok(())
    }

    // ── Clients ──────────────────────────────────────────────

    pub async fn register_client(&self, name: String) -> Result<Client, EngineError> {
        check_not_blank(&name, "client name")?;
        check_len(&name, MAX_NAME_LEN, "client name too long")?;
        let client = Client {
            id: Ulid::new(),
            name,
        };
        self.persist_catalog(&Event::ClientRegistered(client.clone()))
            .await?;
        info!("registered client {}", client.id);
        Ok(client)
    }

    // ── Reservations ─────────────────────────────────────────

    /// Validate references, check the partition for overlaps, and persist.
    ///
    /// The conflict check and the insert both run under the partition's
    /// write lock, so of several concurrent overlapping candidates for one
    /// (facility, date, window) exactly one succeeds.
    pub async fn create_reservation(&self, new: NewReservation) -> Result<Reservation, EngineError> {
        let span = validate_span(new.start, new.end)?;
        if new.window < 1 {
            return Err(EngineError::invalid("wash-window numbers start at 1"));
        }

        let entry = self
            .store
            .facility_entry(&new.facility_id)
            .ok_or(EngineError::not_found("facility", new.facility_id))?;
        let gate = entry.read().await;
        let facility = gate
            .as_ref()
            .ok_or(EngineError::not_found("facility", new.facility_id))?;
        if !self.store.contains_service(&new.service_id) {
            return Err(EngineError::not_found("service", new.service_id));
        }
        if new.window > facility.windows {
            return Err(EngineError::invalid(format!(
                "wash-window {} does not exist (facility has {})",
                new.window, facility.windows
            )));
        }

        let partition = self.store.partition(new.partition());
        let mut guard = partition.write().await;
        if guard.reservations.len() >= MAX_RESERVATIONS_PER_PARTITION {
            return Err(EngineError::LimitExceeded("too many reservations in wash-window"));
        }
        if let Err(e) = check_no_conflict(&guard, &span) {
            metrics::counter!(observability::RESERVATION_CONFLICTS_TOTAL).increment(1);
            debug!(
                "reservation {} {}-{} window {} at {} rejected: {e}",
                new.date,
                format_time_of_day(span.start),
                format_time_of_day(span.end),
                new.window,
                new.facility_id
            );
            return Err(e);
        }

        let reservation = Reservation {
            id: Ulid::new(),
            facility_id: new.facility_id,
            service_id: new.service_id,
            client_id: new.client_id,
            date: new.date,
            span,
            window: new.window,
            state: new.state,
        };
        self.persist_and_apply(&mut guard, &Event::ReservationCreated(reservation.clone()))
            .await?;
        metrics::counter!(observability::RESERVATIONS_CREATED_TOTAL).increment(1);
        info!(
            "reservation {} booked {} {}-{} window {} at {}",
            reservation.id,
            reservation.date,
            format_time_of_day(span.start),
            format_time_of_day(span.end),
            reservation.window,
            reservation.facility_id
        );
        Ok(reservation)
    }

    /// Overwrite a reservation's state. Any code is accepted, from any
    /// current state.
    pub async fn update_reservation_state(
        &self,
        id: Ulid,
        state: ReservationState,
    ) -> Result<Reservation, EngineError> {
        let key = self
            .store
            .partition_key_for(&id)
            .ok_or(EngineError::not_found("reservation", id))?;
        let entry = self
            .store
            .facility_entry(&key.facility_id)
            .ok_or(EngineError::not_found("reservation", id))?;
        let gate = entry.read().await;
        if gate.is_none() {
            return Err(EngineError::not_found("reservation", id));
        }
        let partition = self
            .store
            .get_partition(&key)
            .ok_or(EngineError::not_found("reservation", id))?;
        let mut guard = partition.write().await;
        if guard.get_mut(id).is_none() {
            return Err(EngineError::not_found("reservation", id));
        }

        self.persist_and_apply(&mut guard, &Event::ReservationStateChanged { id, state })
            .await?;
        let updated = guard
            .get_mut(id)
            .map(|r| r.clone())
            .ok_or(EngineError::not_found("reservation", id))?;
        info!("reservation {id} state -> {}", state.code());
        Ok(updated)
    }

    // ── Feedback ─────────────────────────────────────────────

    pub async fn create_feedback(&self, new: NewFeedback) -> Result<Feedback, EngineError> {
        check_len(&new.comment, MAX_COMMENT_LEN, "comment too long")?;
        if !self.store.contains_client(&new.client_id) {
            return Err(EngineError::not_found("client", new.client_id));
        }
        let entry = self
            .store
            .facility_entry(&new.facility_id)
            .ok_or(EngineError::not_found("facility", new.facility_id))?;
        let gate = entry.read().await;
        if gate.is_none() {
            return Err(EngineError::not_found("facility", new.facility_id));
        }

        let feedback = Feedback {
            id: Ulid::new(),
            client_id: new.client_id,
            facility_id: new.facility_id,
            comment: new.comment,
        };
        self.persist_catalog(&Event::FeedbackCreated(feedback.clone()))
            .await?;
        info!("feedback {} for facility {}", feedback.id, feedback.facility_id);
        Ok(feedback)
    }

    pub async fn delete_feedback(&self, id: Ulid) -> Result<(), EngineError> {
        let feedback = self
            .store
            .get_feedback(&id)
            .ok_or(EngineError::not_found("feedback", id))?;
        let entry = self
            .store
            .facility_entry(&feedback.facility_id)
            .ok_or(EngineError::not_found("feedback", id))?;
        let gate = entry.write().await;
        if gate.is_none() || !self.store.contains_feedback(&id) {
            return Err(EngineError::not_found("feedback", id));
        }

        self.persist_catalog(&Event::FeedbackDeleted { id }).await?;
        info!("deleted feedback {id}");
        Ok(())
    }
}
