use std::sync::{PoisonError, RwLock};

use chrono::NaiveDate;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use super::EngineError;

/// Opening and closing minute of one day. `close_minute` may be 1440 for
/// resources open until midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayHours {
    pub open_minute: u16,
    pub close_minute: u16,
}

/// Interval rule covering `[from, to]` inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HoursRule {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub hours: DayHours,
}

/// Opening-hours calendar. A specific-date override always wins over an
/// interval rule covering the same date.
#[derive(Default)]
pub struct OpeningCalendar {
    overrides: DashMap<NaiveDate, DayHours>,
    rules: RwLock<Vec<HoursRule>>,
}

impl OpeningCalendar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_override(&self, date: NaiveDate, hours: DayHours) {
        self.overrides.insert(date, hours);
    }

    pub fn add_rule(&self, rule: HoursRule) {
        self.rules
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(rule);
    }

    pub fn resolve(&self, date: NaiveDate) -> Result<DayHours, EngineError> {
        if let Some(hours) = self.overrides.get(&date) {
            return Ok(*hours);
        }
        let rules = self.rules.read().unwrap_or_else(PoisonError::into_inner);
        rules
            .iter()
            .find(|rule| rule.from <= date && date <= rule.to)
            .map(|rule| rule.hours)
            .ok_or(EngineError::NoOpeningHours(date))
    }
}
