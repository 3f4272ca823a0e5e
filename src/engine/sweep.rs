use chrono::{DateTime, Duration, Utc};
use tracing::debug;
use ulid::Ulid;

use crate::limits::{COMMITTED_RETENTION_MINUTES, SWEEP_CREATION_GRACE_MINUTES};
use crate::model::{ReservationRef, SweepOutcome, SweepReport};

use super::{Engine, EngineError};

impl Engine {
    /// Rows the sweep may touch: expired sessionless pending holds past the
    /// creation grace, and committed audit rows past retention. A session in
    /// progress protects a pending row even when its expiry has passed.
    pub fn collect_sweep_candidates(&self, now: DateTime<Utc>) -> Vec<Ulid> {
        let grace_cutoff = now - Duration::minutes(SWEEP_CREATION_GRACE_MINUTES);
        let retention_cutoff = now - Duration::minutes(COMMITTED_RETENTION_MINUTES);
        self.reservations
            .iter()
            .filter(|entry| {
                let r = entry.value();
                if r.availability_reserved {
                    r.expires_at < now && r.session_id.is_none() && r.created_at < grace_cutoff
                } else {
                    r.created_at < retention_cutoff
                }
            })
            .map(|entry| *entry.key())
            .collect()
    }

    /// Idempotent expiry sweep; safe to run concurrently with itself and
    /// with user operations. Per-item failures are isolated and reported.
    pub async fn sweep_expired(&self) -> SweepReport {
        self.sweep_expired_at(Utc::now()).await
    }

    pub async fn sweep_expired_at(&self, now: DateTime<Utc>) -> SweepReport {
        let started = std::time::Instant::now();
        let candidates = self.collect_sweep_candidates(now);
        let report = self.release_all(candidates).await;
        metrics::histogram!(crate::observability::SWEEP_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());
        metrics::counter!(crate::observability::SWEEP_REAPED_TOTAL)
            .increment(report.cleaned_up as u64);
        report
    }

    /// Targeted immediate release: scheduler or payment-failure path. No
    /// session guard, unlike user cancel.
    pub async fn release_now(&self, target: &ReservationRef) -> Result<SweepReport, EngineError> {
        let members = self.resolve_ref(target);
        if members.is_empty() {
            return Err(Self::ref_not_found(target));
        }
        Ok(self.release_all(members).await)
    }

    async fn release_all(&self, booking_numbers: Vec<Ulid>) -> SweepReport {
        let mut report = SweepReport::default();
        for booking_number in booking_numbers {
            match self.release_one(booking_number).await {
                Ok(true) => {
                    report.cleaned_up += 1;
                    report.results.push(SweepOutcome {
                        booking_number,
                        success: true,
                        error: None,
                    });
                }
                Ok(false) => debug!("sweep skip {booking_number}: already released"),
                Err(err) => report.results.push(SweepOutcome {
                    booking_number,
                    success: false,
                    error: Some(err.to_string()),
                }),
            }
        }
        report
    }

    /// Claim the record, release its slot contribution, drop it from the
    /// group index. The claim-by-remove makes concurrent releases of the
    /// same record race-safe; on a store failure the record is re-inserted
    /// so a later sweep can retry. Committed audit rows are deleted without
    /// subtracting: their consumption belongs to the permanent booking.
    pub(super) async fn release_one(&self, booking_number: Ulid) -> Result<bool, EngineError> {
        let Some((_, reservation)) = self.reservations.remove(&booking_number) else {
            return Ok(false);
        };
        if reservation.availability_reserved
            && let Err(err) = self
                .subtract_span(&reservation.selections, &reservation.segments())
                .await
        {
            self.reservations.insert(booking_number, reservation);
            return Err(err);
        }
        let group_id = reservation.group_id;
        if let Some(mut members) = self.groups.get_mut(&group_id) {
            members.retain(|member| member != &booking_number);
        }
        self.groups.remove_if(&group_id, |_, members| members.is_empty());
        metrics::counter!(crate::observability::RESERVATIONS_RELEASED_TOTAL).increment(1);
        Ok(true)
    }
}
