use chrono::{DateTime, Duration, NaiveDate, Utc};
use tracing::{error, info};
use ulid::Ulid;

use crate::limits::{HOLD_TTL_MINUTES, MAX_GROUP_SIZE, MAX_NIGHTS, MAX_SELECTIONS_PER_BOOKING};
use crate::model::{
    Booking, BookingData, DurationKind, Reservation, ReservationReceipt, ReservationRef,
    ResourceSelection, RetimeReceipt, TimeWindow,
};
use crate::timemath::{DaySegment, day_segments, end_date_for_overnight, parse_time};

use super::slots::{DeltaMode, SlotKey};
use super::{Engine, EngineError};

/// One applied slot delta, remembered so a failed multi-step sequence can be
/// compensated in reverse order.
struct AppliedDelta {
    key: SlotKey,
    from: u16,
    to: u16,
    qty: u32,
}

fn validate_booking_data(data: &BookingData) -> Result<(u16, u16, NaiveDate), EngineError> {
    if data.selections.is_empty() {
        return Err(EngineError::Validation("at least one resource selection required"));
    }
    if data.selections.len() > MAX_SELECTIONS_PER_BOOKING {
        return Err(EngineError::Validation("too many resource selections"));
    }
    if data.selections.iter().any(|s| s.quantity == 0) {
        return Err(EngineError::Validation("selection quantity must be positive"));
    }
    let start_minute = parse_time(&data.start_time)
        .ok_or_else(|| EngineError::MalformedTime(data.start_time.clone()))?;
    let end_minute = parse_time(&data.end_time)
        .ok_or_else(|| EngineError::MalformedTime(data.end_time.clone()))?;
    let end_date = match data.duration_kind {
        DurationKind::Hours => {
            if end_minute <= start_minute {
                return Err(EngineError::Validation("end time must be after start time"));
            }
            data.start_date
        }
        DurationKind::Overnights => {
            if data.duration_value == 0 {
                return Err(EngineError::Validation("overnight booking needs at least one night"));
            }
            if data.duration_value > MAX_NIGHTS {
                return Err(EngineError::Validation("too many nights"));
            }
            end_date_for_overnight(data.start_date, data.duration_value)
                .ok_or(EngineError::Validation("end date out of range"))?
        }
    };
    Ok((start_minute, end_minute, end_date))
}

impl Engine {
    /// Create a reservation, or extend an existing group with a sibling when
    /// `group_id` is given. Slots are consumed immediately; the record
    /// expires unless a session is attached and committed in time.
    pub async fn reserve(
        &self,
        group_id: Option<Ulid>,
        data: &BookingData,
    ) -> Result<ReservationReceipt, EngineError> {
        self.reserve_at(group_id, data, Utc::now()).await
    }

    pub async fn reserve_at(
        &self,
        group_id: Option<Ulid>,
        data: &BookingData,
        now: DateTime<Utc>,
    ) -> Result<ReservationReceipt, EngineError> {
        let (start_minute, end_minute, end_date) = validate_booking_data(data)?;
        self.experience(&data.experience_id)?;

        let siblings = match group_id {
            Some(group_id) => {
                let members = self.group_members(&group_id);
                if members.is_empty() {
                    return Err(EngineError::GroupNotFound(group_id));
                }
                if members.len() >= MAX_GROUP_SIZE {
                    return Err(EngineError::Validation("reservation group is full"));
                }
                members
            }
            None => Vec::new(),
        };
        let group_id = group_id.unwrap_or_else(Ulid::new);

        let segments = day_segments(data.start_date, end_date, start_minute, end_minute);
        if segments.is_empty() {
            return Err(EngineError::Validation("booking covers no slots"));
        }

        self.add_span(&data.selections, &segments).await?;

        let booking_number = Ulid::new();
        // The hold window scales with cart size: each sibling already in the
        // group buys the whole group another base window.
        let expires_at =
            now + Duration::minutes(HOLD_TTL_MINUTES * (siblings.len() as i64 + 1));
        self.reservations.insert(
            booking_number,
            Reservation {
                booking_number,
                group_id,
                experience_id: data.experience_id,
                start_location_id: data.start_location_id,
                duration_id: data.duration_id,
                duration_kind: data.duration_kind,
                selections: data.selections.clone(),
                start_date: data.start_date,
                end_date,
                start_minute,
                end_minute,
                created_at: now,
                expires_at,
                availability_reserved: true,
                session_id: None,
            },
        );
        self.groups.entry(group_id).or_default().push(booking_number);
        for sibling in &siblings {
            if let Some(mut r) = self.reservations.get_mut(sibling) {
                r.expires_at = expires_at;
            }
        }
        metrics::counter!(crate::observability::RESERVATIONS_CREATED_TOTAL).increment(1);
        info!(%booking_number, %group_id, %expires_at, "reserved slots");
        Ok(ReservationReceipt { group_id, booking_number, expires_at })
    }

    /// Move a pending reservation to a new start/end on the same dates.
    /// Subtract-then-add is strictly sequential so the add observes the
    /// post-subtract state; on add failure the old span is restored.
    pub async fn retime(
        &self,
        group_id: Ulid,
        booking_number: Ulid,
        new_start: &str,
        new_end: &str,
    ) -> Result<RetimeReceipt, EngineError> {
        self.retime_at(group_id, booking_number, new_start, new_end, Utc::now())
            .await
    }

    pub async fn retime_at(
        &self,
        group_id: Ulid,
        booking_number: Ulid,
        new_start: &str,
        new_end: &str,
        now: DateTime<Utc>,
    ) -> Result<RetimeReceipt, EngineError> {
        let new_start_minute =
            parse_time(new_start).ok_or_else(|| EngineError::MalformedTime(new_start.into()))?;
        let new_end_minute =
            parse_time(new_end).ok_or_else(|| EngineError::MalformedTime(new_end.into()))?;

        let reservation = self
            .get_reservation(&booking_number)
            .ok_or(EngineError::ReservationNotFound(booking_number))?;
        if reservation.group_id != group_id {
            return Err(EngineError::GroupNotFound(group_id));
        }
        if !reservation.availability_reserved {
            return Err(EngineError::Validation("reservation is already committed"));
        }
        if reservation.expires_at <= now {
            return Err(EngineError::Expired(booking_number));
        }
        if reservation.start_date == reservation.end_date && new_end_minute <= new_start_minute {
            return Err(EngineError::Validation("end time must be after start time"));
        }

        let old_window = TimeWindow {
            start_minute: reservation.start_minute,
            end_minute: reservation.end_minute,
        };
        let new_window = TimeWindow {
            start_minute: new_start_minute,
            end_minute: new_end_minute,
        };
        if old_window == new_window {
            return Ok(RetimeReceipt {
                group_id,
                booking_number,
                expires_at: reservation.expires_at,
                old_window,
                new_window,
            });
        }

        let old_segments = reservation.segments();
        let new_segments = day_segments(
            reservation.start_date,
            reservation.end_date,
            new_start_minute,
            new_end_minute,
        );
        if new_segments.is_empty() {
            return Err(EngineError::Validation("booking covers no slots"));
        }

        self.subtract_span(&reservation.selections, &old_segments).await?;
        if let Err(err) = self.add_span(&reservation.selections, &new_segments).await {
            // add_span already compensated the partial new span; put the old
            // one back before surfacing the original error.
            if let Err(rollback_err) =
                self.add_span(&reservation.selections, &old_segments).await
            {
                error!(%booking_number, "retime rollback failed: {rollback_err}");
            }
            return Err(err);
        }

        let expires_at = reservation
            .expires_at
            .max(now + Duration::minutes(HOLD_TTL_MINUTES));
        // A cancel or sweep may have claimed the record across the await
        // points above. The new span then has no owner; give it back instead
        // of leaking consumed slots.
        let updated = if let Some(mut r) = self.reservations.get_mut(&booking_number) {
            r.start_minute = new_start_minute;
            r.end_minute = new_end_minute;
            true
        } else {
            false
        };
        if !updated {
            if let Err(compensation_err) = self
                .subtract_span(&reservation.selections, &new_segments)
                .await
            {
                error!(%booking_number, "retime compensation failed: {compensation_err}");
            }
            return Err(EngineError::ReservationNotFound(booking_number));
        }
        for member in self.group_members(&group_id) {
            if let Some(mut r) = self.reservations.get_mut(&member) {
                r.expires_at = expires_at;
            }
        }
        info!(
            %booking_number,
            old = %old_window.start_time(),
            new = %new_window.start_time(),
            "retimed reservation"
        );
        Ok(RetimeReceipt { group_id, booking_number, expires_at, old_window, new_window })
    }

    /// Record the opaque payment session on all members of a group.
    /// Idempotent for the same session; a different one is rejected.
    pub fn attach_session(&self, group_id: Ulid, session_id: &str) -> Result<(), EngineError> {
        let members = self.group_members(&group_id);
        if members.is_empty() {
            return Err(EngineError::GroupNotFound(group_id));
        }
        for member in &members {
            if let Some(r) = self.reservations.get(member)
                && let Some(existing) = r.session_id.as_deref()
                && existing != session_id
            {
                return Err(EngineError::Unauthorized(*member));
            }
        }
        for member in &members {
            if let Some(mut r) = self.reservations.get_mut(member) {
                r.session_id = Some(session_id.to_string());
            }
        }
        Ok(())
    }

    /// Payment-success hook. Creates a permanent booking per still-pending
    /// reservation under the session and flips it to a committed audit row;
    /// slots stay consumed. Safe to receive more than once.
    pub fn commit_session(&self, session_id: &str) -> Result<Vec<Ulid>, EngineError> {
        let members = self.reservations_by_session(session_id);
        if members.is_empty() {
            return Err(EngineError::SessionNotFound(session_id.to_string()));
        }
        let mut committed = Vec::new();
        let now = Utc::now();
        for booking_number in members {
            let Some(mut r) = self.reservations.get_mut(&booking_number) else {
                continue;
            };
            if !r.availability_reserved {
                // Duplicate webhook delivery; slots were consumed once.
                continue;
            }
            r.availability_reserved = false;
            let booking = Booking {
                id: Ulid::new(),
                booking_number,
                group_id: r.group_id,
                experience_id: r.experience_id,
                selections: r.selections.clone(),
                start_date: r.start_date,
                end_date: r.end_date,
                start_minute: r.start_minute,
                end_minute: r.end_minute,
                session_id: session_id.to_string(),
                created_at: now,
            };
            drop(r);
            self.bookings.insert(booking.id, booking);
            committed.push(booking_number);
            metrics::counter!(crate::observability::RESERVATIONS_COMMITTED_TOTAL).increment(1);
        }
        if !committed.is_empty() {
            info!(session_id, count = committed.len(), "committed reservations");
        }
        Ok(committed)
    }

    /// User-facing cancel. Refused once a payment session is attached; the
    /// payment-failure path goes through `release_now` instead.
    pub async fn cancel(&self, target: &ReservationRef) -> Result<(), EngineError> {
        let members = self.resolve_ref(target);
        if members.is_empty() {
            return Err(Self::ref_not_found(target));
        }
        for member in &members {
            if let Some(r) = self.reservations.get(member)
                && r.session_id.is_some()
            {
                return Err(EngineError::Unauthorized(*member));
            }
        }
        for member in members {
            self.release_one(member).await?;
        }
        Ok(())
    }

    /// Apply `Add` deltas across all tracked selections and segments. On any
    /// failure, previously applied deltas are compensated in reverse before
    /// the original error is surfaced.
    pub(super) async fn add_span(
        &self,
        selections: &[ResourceSelection],
        segments: &[DaySegment],
    ) -> Result<(), EngineError> {
        let mut applied: Vec<AppliedDelta> = Vec::new();
        for selection in selections {
            let resource = match self.resource(&selection.resource_id) {
                Ok(resource) => resource,
                Err(err) => {
                    self.rollback(&applied).await;
                    return Err(err);
                }
            };
            if !resource.tracks_availability {
                continue;
            }
            for segment in segments {
                let key = SlotKey { resource_id: resource.id, date: segment.date };
                if let Err(err) = self.slots.ensure_row(key).await {
                    self.rollback(&applied).await;
                    return Err(err);
                }
                if let Err(err) = self
                    .slots
                    .apply_delta(
                        key,
                        segment.from,
                        segment.to,
                        selection.quantity,
                        resource.capacity,
                        DeltaMode::Add,
                    )
                    .await
                {
                    if matches!(err, EngineError::CapacityExceeded { .. }) {
                        metrics::counter!(crate::observability::CAPACITY_REJECTIONS_TOTAL)
                            .increment(1);
                    }
                    self.rollback(&applied).await;
                    return Err(err);
                }
                applied.push(AppliedDelta {
                    key,
                    from: segment.from,
                    to: segment.to,
                    qty: selection.quantity,
                });
            }
        }
        Ok(())
    }

    /// Release the slot contribution of all tracked selections and segments.
    pub(super) async fn subtract_span(
        &self,
        selections: &[ResourceSelection],
        segments: &[DaySegment],
    ) -> Result<(), EngineError> {
        for selection in selections {
            let resource = self.resource(&selection.resource_id)?;
            if !resource.tracks_availability {
                continue;
            }
            for segment in segments {
                let key = SlotKey { resource_id: resource.id, date: segment.date };
                self.slots
                    .apply_delta(
                        key,
                        segment.from,
                        segment.to,
                        selection.quantity,
                        0,
                        DeltaMode::Subtract,
                    )
                    .await?;
            }
        }
        Ok(())
    }

    /// Execute compensating subtractions in reverse order. Failures are
    /// logged and never mask the error that triggered the rollback.
    async fn rollback(&self, applied: &[AppliedDelta]) {
        for delta in applied.iter().rev() {
            if let Err(err) = self
                .slots
                .apply_delta(delta.key, delta.from, delta.to, delta.qty, 0, DeltaMode::Subtract)
                .await
            {
                error!(
                    "rollback failed for resource {} on {}: {err}",
                    delta.key.resource_id, delta.key.date
                );
            }
        }
    }
}
