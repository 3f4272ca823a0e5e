//! Engine limits and time constants.

/// Slot granularity in minutes. Fixed, not configurable.
pub const SLOT_STEP: u16 = 15;

/// Minutes in a calendar day; exclusive upper bound for segment ends.
pub const MINUTES_PER_DAY: u16 = 1440;

/// Start minute of the last slot of a day.
pub const LAST_SLOT_MINUTE: u16 = 1425;

/// Slots per calendar day.
pub const SLOTS_PER_DAY: usize = 96;

pub const MAX_SELECTIONS_PER_BOOKING: usize = 16;
pub const MAX_NIGHTS: u32 = 60;
pub const MAX_GROUP_SIZE: usize = 20;

/// Base hold window for a fresh reservation. The effective window scales
/// with the number of reservations already in the group.
pub const HOLD_TTL_MINUTES: i64 = 30;

/// Grace after creation before the sweep may touch an expired pending row.
/// Guards against a row read as expired microseconds after it was written.
pub const SWEEP_CREATION_GRACE_MINUTES: i64 = 5;

/// Retention for committed audit rows before the sweep deletes them.
pub const COMMITTED_RETENTION_MINUTES: i64 = 60;
