use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::limits::{MINUTES_PER_DAY, SLOT_STEP};

/// Parse a strict `HH:MM` clock time into minutes since midnight.
/// `24:00` is accepted as the end-of-day sentinel (1440).
pub fn parse_time(s: &str) -> Option<u16> {
    let (hh, mm) = s.split_once(':')?;
    if hh.len() != 2 || mm.len() != 2 {
        return None;
    }
    let h: u16 = hh.parse().ok()?;
    let m: u16 = mm.parse().ok()?;
    if h == 24 && m == 0 {
        return Some(MINUTES_PER_DAY);
    }
    if h > 23 || m > 59 {
        return None;
    }
    Some(h * 60 + m)
}

/// Format minutes since midnight as zero-padded `HH:MM`. No implicit
/// mod-1440: 1440 renders as `24:00`, wrapping is the caller's business.
pub fn format_time(minute: u16) -> String {
    format!("{:02}:{:02}", minute / 60, minute % 60)
}

/// Round up to the next 15-minute boundary.
pub fn ceil_to_slot(minute: u16) -> u16 {
    minute.div_ceil(SLOT_STEP) * SLOT_STEP
}

/// Inclusive calendar-day range. Empty when `end < start`.
pub fn date_range(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    let mut out = Vec::new();
    let mut day = start;
    while day <= end {
        out.push(day);
        match day.succ_opt() {
            Some(next) => day = next,
            None => break,
        }
    }
    out
}

/// An overnight booking ending after `nights` nights checks out on
/// `start + nights` days.
pub fn end_date_for_overnight(start: NaiveDate, nights: u32) -> Option<NaiveDate> {
    start.checked_add_days(chrono::Days::new(u64::from(nights)))
}

/// One contiguous slot range `[from, to)` on a single calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaySegment {
    pub date: NaiveDate,
    pub from: u16,
    pub to: u16,
}

/// Decompose a possibly multi-day span into per-day slot ranges: first day
/// from the start minute to midnight, middle days in full, last day from
/// midnight to the end minute. Zero-length segments are omitted.
pub fn day_segments(
    start_date: NaiveDate,
    end_date: NaiveDate,
    start_minute: u16,
    end_minute: u16,
) -> Vec<DaySegment> {
    let mut out = Vec::new();
    for date in date_range(start_date, end_date) {
        let (from, to) = if start_date == end_date {
            (start_minute, end_minute)
        } else if date == start_date {
            (start_minute, MINUTES_PER_DAY)
        } else if date == end_date {
            (0, end_minute)
        } else {
            (0, MINUTES_PER_DAY)
        };
        if from < to {
            out.push(DaySegment { date, from, to });
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn parse_time_valid() {
        assert_eq!(parse_time("00:00"), Some(0));
        assert_eq!(parse_time("09:05"), Some(545));
        assert_eq!(parse_time("23:45"), Some(1425));
        assert_eq!(parse_time("24:00"), Some(1440));
    }

    #[test]
    fn parse_time_malformed() {
        assert_eq!(parse_time(""), None);
        assert_eq!(parse_time("9:00"), None);
        assert_eq!(parse_time("09:0"), None);
        assert_eq!(parse_time("24:15"), None);
        assert_eq!(parse_time("12:60"), None);
        assert_eq!(parse_time("ab:cd"), None);
        assert_eq!(parse_time("12-30"), None);
    }

    #[test]
    fn format_time_zero_padded() {
        assert_eq!(format_time(0), "00:00");
        assert_eq!(format_time(545), "09:05");
        assert_eq!(format_time(1425), "23:45");
        assert_eq!(format_time(1440), "24:00");
    }

    #[test]
    fn ceil_to_slot_boundaries() {
        assert_eq!(ceil_to_slot(0), 0);
        assert_eq!(ceil_to_slot(1), 15);
        assert_eq!(ceil_to_slot(15), 15);
        assert_eq!(ceil_to_slot(674), 675);
        assert_eq!(ceil_to_slot(676), 690);
    }

    #[test]
    fn date_range_inclusive() {
        let range = date_range(date("2024-06-29"), date("2024-07-02"));
        assert_eq!(
            range,
            vec![
                date("2024-06-29"),
                date("2024-06-30"),
                date("2024-07-01"),
                date("2024-07-02"),
            ]
        );
    }

    #[test]
    fn date_range_single_day() {
        assert_eq!(
            date_range(date("2024-06-01"), date("2024-06-01")),
            vec![date("2024-06-01")]
        );
    }

    #[test]
    fn date_range_inverted_is_empty() {
        assert!(date_range(date("2024-06-02"), date("2024-06-01")).is_empty());
    }

    #[test]
    fn overnight_end_date() {
        assert_eq!(
            end_date_for_overnight(date("2024-06-01"), 2),
            Some(date("2024-06-03"))
        );
        assert_eq!(
            end_date_for_overnight(date("2024-12-30"), 3),
            Some(date("2025-01-02"))
        );
    }

    #[test]
    fn segments_single_day() {
        let segs = day_segments(date("2024-06-01"), date("2024-06-01"), 600, 660);
        assert_eq!(
            segs,
            vec![DaySegment {
                date: date("2024-06-01"),
                from: 600,
                to: 660,
            }]
        );
    }

    #[test]
    fn segments_two_nights() {
        // 2024-06-01 16:00 → 2024-06-03 12:00
        let segs = day_segments(date("2024-06-01"), date("2024-06-03"), 960, 720);
        assert_eq!(
            segs,
            vec![
                DaySegment { date: date("2024-06-01"), from: 960, to: 1440 },
                DaySegment { date: date("2024-06-02"), from: 0, to: 1440 },
                DaySegment { date: date("2024-06-03"), from: 0, to: 720 },
            ]
        );
    }

    #[test]
    fn segments_omit_zero_length() {
        // Checkout at midnight: the last day contributes nothing.
        let segs = day_segments(date("2024-06-01"), date("2024-06-02"), 960, 0);
        assert_eq!(
            segs,
            vec![DaySegment { date: date("2024-06-01"), from: 960, to: 1440 }]
        );
    }

    #[test]
    fn segments_empty_single_day_span() {
        assert!(day_segments(date("2024-06-01"), date("2024-06-01"), 600, 600).is_empty());
    }
}
