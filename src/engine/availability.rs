use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Timelike, Utc};
use ulid::Ulid;

use crate::limits::{MAX_NIGHTS, MINUTES_PER_DAY, SLOT_STEP};
use crate::model::{AvailabilityRequest, DurationKind, Resource, TimeWindow};
use crate::timemath::{DaySegment, ceil_to_slot, date_range, day_segments, end_date_for_overnight};

use super::slots::{SlotKey, SlotRow, slot_starts};
use super::{Engine, EngineError};

/// Earliest offerable minute on `date` after applying the foresight window.
/// `None` when the deadline spills past the end of `date` entirely — the
/// whole day is then unbookable.
pub(super) fn effective_open_minute(
    date: NaiveDate,
    open_minute: u16,
    foresight_hours: i64,
    now: DateTime<Utc>,
) -> Option<u16> {
    let deadline = now + chrono::Duration::hours(foresight_hours);
    let deadline_date = deadline.date_naive();
    if deadline_date > date {
        return None;
    }
    if deadline_date < date {
        return Some(open_minute);
    }
    let deadline_minute = (deadline.time().hour() * 60 + deadline.time().minute()) as u16;
    Some(open_minute.max(ceil_to_slot(deadline_minute)))
}

/// True when every slot of every segment leaves room for `quantity` more
/// units on every tracked resource. Non-tracking resources always pass.
pub(super) fn candidate_fits(
    resources: &[(Resource, u32)],
    booked: &HashMap<(Ulid, NaiveDate), SlotRow>,
    segments: &[DaySegment],
) -> bool {
    for (resource, quantity) in resources {
        if !resource.tracks_availability {
            continue;
        }
        for segment in segments {
            let row = booked.get(&(resource.id, segment.date));
            for slot in slot_starts(segment.from, segment.to) {
                let committed = row.map_or(0, |r| r.get(slot));
                if committed.saturating_add(*quantity) > resource.capacity {
                    return false;
                }
            }
        }
    }
    true
}

impl Engine {
    /// Offerable start windows for a candidate request, in chronological
    /// order. An empty vec — not an error — means nothing fits.
    pub async fn available_times(
        &self,
        req: &AvailabilityRequest,
    ) -> Result<Vec<TimeWindow>, EngineError> {
        self.available_times_at(req, Utc::now()).await
    }

    pub async fn available_times_at(
        &self,
        req: &AvailabilityRequest,
        now: DateTime<Utc>,
    ) -> Result<Vec<TimeWindow>, EngineError> {
        metrics::counter!(crate::observability::AVAILABILITY_QUERIES_TOTAL).increment(1);
        let started = std::time::Instant::now();
        let result = self.compute_available_times(req, now).await;
        metrics::histogram!(crate::observability::AVAILABILITY_QUERY_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());
        result
    }

    async fn compute_available_times(
        &self,
        req: &AvailabilityRequest,
        now: DateTime<Utc>,
    ) -> Result<Vec<TimeWindow>, EngineError> {
        if req.selections.is_empty() {
            return Err(EngineError::Validation("at least one resource selection required"));
        }
        if req.selections.iter().any(|s| s.quantity == 0) {
            return Err(EngineError::Validation("selection quantity must be positive"));
        }

        let hours = self.hours.resolve(req.date)?;
        let experience = self.experience(&req.experience_id)?;

        let Some(open) =
            effective_open_minute(req.date, hours.open_minute, experience.foresight_hours, now)
        else {
            return Ok(Vec::new());
        };
        let open = ceil_to_slot(open);

        // Shape of the candidate span: same-day duration for hourly
        // bookings, checkout at the last day's closing time for overnights.
        let (end_date, last_close, duration_minutes) = match req.duration_kind {
            DurationKind::Hours => {
                let minutes = req
                    .duration_value
                    .checked_mul(60)
                    .filter(|m| *m > 0 && *m <= u32::from(MINUTES_PER_DAY))
                    .ok_or(EngineError::Validation("hourly duration must fit within one day"))?;
                (req.date, hours.close_minute, minutes as u16)
            }
            DurationKind::Overnights => {
                if req.duration_value == 0 {
                    return Err(EngineError::Validation("overnight booking needs at least one night"));
                }
                if req.duration_value > MAX_NIGHTS {
                    return Err(EngineError::Validation("too many nights"));
                }
                let end = end_date_for_overnight(req.date, req.duration_value)
                    .ok_or(EngineError::Validation("end date out of range"))?;
                let close = self.hours.resolve(end)?.close_minute;
                (end, close, 0)
            }
        };

        let mut resources = Vec::with_capacity(req.selections.len());
        for selection in &req.selections {
            resources.push((self.resource(&selection.resource_id)?, selection.quantity));
        }

        // Booked view per tracked resource per affected date: persisted rows
        // merged with the replayed spans of other in-flight reservations.
        // Conservative by construction; apply_delta stays authoritative.
        let dates = date_range(req.date, end_date);
        let mut booked: HashMap<(Ulid, NaiveDate), SlotRow> = HashMap::new();
        for (resource, _) in &resources {
            if !resource.tracks_availability {
                continue;
            }
            for &date in &dates {
                let key = SlotKey { resource_id: resource.id, date };
                booked.insert((resource.id, date), self.slots.read_row(key).await?);
            }
        }
        for reservation in self.active_reservations(now) {
            if req.exclude_reservation == Some(reservation.booking_number) {
                continue;
            }
            for selection in &reservation.selections {
                for segment in reservation.segments() {
                    let Some(row) = booked.get_mut(&(selection.resource_id, segment.date))
                    else {
                        continue;
                    };
                    for slot in slot_starts(segment.from, segment.to) {
                        let merged = row.get(slot).saturating_add(selection.quantity);
                        row.set(slot, merged);
                    }
                }
            }
        }

        let mut windows = Vec::new();
        match req.duration_kind {
            DurationKind::Hours => {
                let mut start = open;
                while start + duration_minutes <= hours.close_minute {
                    let end = start + duration_minutes;
                    let segments = [DaySegment { date: req.date, from: start, to: end }];
                    if candidate_fits(&resources, &booked, &segments) {
                        windows.push(TimeWindow { start_minute: start, end_minute: end });
                    }
                    start += SLOT_STEP;
                }
            }
            DurationKind::Overnights => {
                let mut start = open;
                while start + SLOT_STEP <= hours.close_minute {
                    let segments = day_segments(req.date, end_date, start, last_close);
                    if candidate_fits(&resources, &booked, &segments) {
                        windows.push(TimeWindow { start_minute: start, end_minute: last_close });
                    }
                    start += SLOT_STEP;
                }
            }
        }
        Ok(windows)
    }
}
