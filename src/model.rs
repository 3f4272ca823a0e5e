use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::timemath::{DaySegment, day_segments, format_time};

/// A bookable item (rental product or add-on) with finite concurrent
/// capacity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub id: Ulid,
    pub name: Option<String>,
    /// Max units committed to any single slot.
    pub capacity: u32,
    /// Add-ons may opt out of availability tracking; they are then always
    /// offerable regardless of capacity.
    pub tracks_availability: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSelection {
    pub resource_id: Ulid,
    pub quantity: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DurationKind {
    Hours,
    Overnights,
}

/// An offering whose bookings share a minimum advance-notice window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Experience {
    pub id: Ulid,
    pub name: Option<String>,
    /// Minimum hours of notice before a booking may start.
    pub foresight_hours: i64,
}

/// Incoming booking payload. Times arrive as `HH:MM` strings from the edge
/// and are validated by the reservation manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingData {
    pub experience_id: Ulid,
    pub start_location_id: Ulid,
    pub duration_id: Ulid,
    pub duration_kind: DurationKind,
    /// Nights for overnight bookings; informational for hourly ones.
    pub duration_value: u32,
    pub start_date: NaiveDate,
    pub start_time: String,
    pub end_time: String,
    pub selections: Vec<ResourceSelection>,
}

/// Availability query: which start times are offerable for this shape of
/// booking on `date`?
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityRequest {
    pub date: NaiveDate,
    pub duration_kind: DurationKind,
    pub duration_value: u32,
    pub selections: Vec<ResourceSelection>,
    pub experience_id: Ulid,
    /// A reservation the caller already holds; skipped when merging in-flight
    /// holds so the caller does not count itself.
    pub exclude_reservation: Option<Ulid>,
}

/// A time-boxed, tentative hold on slot capacity pending payment
/// confirmation. After commit the record stays as an audit trail with
/// `availability_reserved = false`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub booking_number: Ulid,
    /// Checkout-cart grouping; siblings share one expiry.
    pub group_id: Ulid,
    pub experience_id: Ulid,
    pub start_location_id: Ulid,
    pub duration_id: Ulid,
    pub duration_kind: DurationKind,
    pub selections: Vec<ResourceSelection>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub start_minute: u16,
    pub end_minute: u16,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// True while the slots are held but not yet a confirmed booking.
    pub availability_reserved: bool,
    /// Set once a payment session is attached; guards against user cancel
    /// and against the pending-expiry sweep rule.
    pub session_id: Option<String>,
}

impl Reservation {
    /// The per-day slot ranges this reservation consumes.
    pub fn segments(&self) -> Vec<DaySegment> {
        day_segments(
            self.start_date,
            self.end_date,
            self.start_minute,
            self.end_minute,
        )
    }

    /// Still holding slots and not past its expiry.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.availability_reserved && self.expires_at > now
    }
}

/// Permanent, confirmed consumption of slot capacity. Never touched by the
/// expiry path; only an explicit reschedule/cancel flow releases it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Ulid,
    pub booking_number: Ulid,
    pub group_id: Ulid,
    pub experience_id: Ulid,
    pub selections: Vec<ResourceSelection>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub start_minute: u16,
    pub end_minute: u16,
    pub session_id: String,
    pub created_at: DateTime<Utc>,
}

/// An offerable start/end pair, in minutes since midnight of the window's
/// first day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start_minute: u16,
    pub end_minute: u16,
}

impl TimeWindow {
    pub fn start_time(&self) -> String {
        format_time(self.start_minute)
    }

    pub fn end_time(&self) -> String {
        format_time(self.end_minute)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationReceipt {
    pub group_id: Ulid,
    pub booking_number: Ulid,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetimeReceipt {
    pub group_id: Ulid,
    pub booking_number: Ulid,
    pub expires_at: DateTime<Utc>,
    pub old_window: TimeWindow,
    pub new_window: TimeWindow,
}

/// Selector for cancel and targeted release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReservationRef {
    BookingNumber(Ulid),
    Group(Ulid),
    Session(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepOutcome {
    pub booking_number: Ulid,
    pub success: bool,
    pub error: Option<String>,
}

/// Per-item result list of one expiry sweep or targeted release.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    pub cleaned_up: usize,
    pub results: Vec<SweepOutcome>,
}
