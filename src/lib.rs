//! Slot-granular booking availability engine.
//!
//! Tracks committed units per resource, per calendar date, per 15-minute
//! slot; computes offerable start times; and runs the optimistic
//! reserve-then-confirm-or-expire lifecycle without ever letting a slot's
//! committed quantity exceed the resource's capacity.

pub mod engine;
pub mod limits;
pub mod model;
pub mod observability;
pub mod reaper;
pub mod timemath;

pub use engine::{
    DayHours, DeltaMode, Engine, EngineError, HoursRule, MemorySlotStore, OpeningCalendar,
    SlotKey, SlotRow, SlotStore,
};
