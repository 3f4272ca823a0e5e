use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::engine::Engine;

/// Background task that periodically releases expired reservations.
pub async fn run_reaper(engine: Arc<Engine>, every: Duration) {
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        let report = engine.sweep_expired().await;
        if report.cleaned_up > 0 {
            info!("reaped {} expired reservations", report.cleaned_up);
        }
        for outcome in &report.results {
            if !outcome.success
                && let Some(err) = &outcome.error
            {
                warn!("sweep failed for {}: {err}", outcome.booking_number);
            }
        }
    }
}
