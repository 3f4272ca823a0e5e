mod availability;
mod error;
mod hours;
mod reservations;
mod slots;
mod sweep;

pub use error::EngineError;
pub use hours::{DayHours, HoursRule, OpeningCalendar};
pub use slots::{DeltaMode, MemorySlotStore, SlotKey, SlotRow, SlotStore, slot_starts};

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use ulid::Ulid;

use crate::model::{Booking, Experience, Reservation, ReservationRef, Resource};

/// Availability + reservation engine. Requests are stateless compute; all
/// shared state lives in the registries and behind the slot-store port, so
/// concurrency correctness rests on the store's per-row atomic
/// read-modify-write.
pub struct Engine {
    slots: Arc<dyn SlotStore>,
    pub hours: OpeningCalendar,
    resources: DashMap<Ulid, Resource>,
    experiences: DashMap<Ulid, Experience>,
    /// Keyed by booking number. Pending holds and committed audit rows.
    reservations: DashMap<Ulid, Reservation>,
    /// Permanent bookings, keyed by booking id.
    bookings: DashMap<Ulid, Booking>,
    /// Group id → booking numbers of its members.
    groups: DashMap<Ulid, Vec<Ulid>>,
}

impl Engine {
    pub fn new(slots: Arc<dyn SlotStore>) -> Self {
        Self {
            slots,
            hours: OpeningCalendar::new(),
            resources: DashMap::new(),
            experiences: DashMap::new(),
            reservations: DashMap::new(),
            bookings: DashMap::new(),
            groups: DashMap::new(),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemorySlotStore::new()))
    }

    pub fn register_resource(&self, resource: Resource) {
        self.resources.insert(resource.id, resource);
    }

    pub fn register_experience(&self, experience: Experience) {
        self.experiences.insert(experience.id, experience);
    }

    pub(super) fn resource(&self, id: &Ulid) -> Result<Resource, EngineError> {
        self.resources
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or(EngineError::ResourceNotFound(*id))
    }

    pub(super) fn experience(&self, id: &Ulid) -> Result<Experience, EngineError> {
        self.experiences
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or(EngineError::ExperienceNotFound(*id))
    }

    pub fn get_reservation(&self, booking_number: &Ulid) -> Option<Reservation> {
        self.reservations
            .get(booking_number)
            .map(|entry| entry.value().clone())
    }

    pub fn group_members(&self, group_id: &Ulid) -> Vec<Ulid> {
        self.groups
            .get(group_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    pub fn reservations_by_session(&self, session_id: &str) -> Vec<Ulid> {
        self.reservations
            .iter()
            .filter(|entry| entry.value().session_id.as_deref() == Some(session_id))
            .map(|entry| *entry.key())
            .collect()
    }

    pub fn bookings_by_session(&self, session_id: &str) -> Vec<Booking> {
        self.bookings
            .iter()
            .filter(|entry| entry.value().session_id == session_id)
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Snapshot of reservations still holding slots and not yet expired.
    pub(super) fn active_reservations(&self, now: DateTime<Utc>) -> Vec<Reservation> {
        self.reservations
            .iter()
            .filter(|entry| entry.value().is_active(now))
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Booking numbers a selector resolves to.
    pub(super) fn resolve_ref(&self, target: &ReservationRef) -> Vec<Ulid> {
        match target {
            ReservationRef::BookingNumber(bn) => {
                if self.reservations.contains_key(bn) {
                    vec![*bn]
                } else {
                    Vec::new()
                }
            }
            ReservationRef::Group(group_id) => self.group_members(group_id),
            ReservationRef::Session(session_id) => self.reservations_by_session(session_id),
        }
    }

    pub(super) fn ref_not_found(target: &ReservationRef) -> EngineError {
        match target {
            ReservationRef::BookingNumber(bn) => EngineError::ReservationNotFound(*bn),
            ReservationRef::Group(group_id) => EngineError::GroupNotFound(*group_id),
            ReservationRef::Session(session_id) => {
                EngineError::SessionNotFound(session_id.clone())
            }
        }
    }
}
