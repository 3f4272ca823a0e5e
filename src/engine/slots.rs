use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use ulid::Ulid;

use crate::limits::{MINUTES_PER_DAY, SLOT_STEP};

use super::EngineError;

/// Composite row key: one row per resource per calendar date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SlotKey {
    pub resource_id: Ulid,
    pub date: NaiveDate,
}

/// One date's slot map: slot start minute (multiples of 15 in `0..=1425`) →
/// committed quantity. Sparse; an absent slot holds zero units.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotRow {
    slots: BTreeMap<u16, u32>,
}

impl SlotRow {
    pub fn get(&self, slot: u16) -> u32 {
        self.slots.get(&slot).copied().unwrap_or(0)
    }

    pub fn set(&mut self, slot: u16, value: u32) {
        if value == 0 {
            self.slots.remove(&slot);
        } else {
            self.slots.insert(slot, value);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u16, u32)> + '_ {
        self.slots.iter().map(|(slot, qty)| (*slot, *qty))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaMode {
    Add,
    Subtract,
}

/// Slot start minutes covering `[from, to)`.
pub fn slot_starts(from: u16, to: u16) -> impl Iterator<Item = u16> {
    (from..to).step_by(SLOT_STEP as usize)
}

fn validate_slot_span(from: u16, to: u16) -> Result<(), EngineError> {
    if from % SLOT_STEP != 0 || to % SLOT_STEP != 0 {
        return Err(EngineError::Validation("slot span must be 15-minute aligned"));
    }
    if from >= to || to > MINUTES_PER_DAY {
        return Err(EngineError::Validation("slot span out of range"));
    }
    Ok(())
}

/// Injected row-store port. `apply_delta` is the authoritative capacity
/// check: implementations must hold a per-row lock (or transaction) across
/// the read-validate-write, never a naive read-then-write.
#[async_trait]
pub trait SlotStore: Send + Sync {
    /// Idempotent row insert; concurrent first-writers for the same key race
    /// safely (insert, ignore conflict).
    async fn ensure_row(&self, key: SlotKey) -> Result<(), EngineError>;

    /// Snapshot of a row; empty when absent.
    async fn read_row(&self, key: SlotKey) -> Result<SlotRow, EngineError>;

    /// Apply `qty` to every slot in `[from, to)` step 15. Add fails with
    /// `CapacityExceeded` — writing nothing — when any resulting slot would
    /// exceed `capacity`. Subtract saturates at zero and never fails;
    /// `capacity` is ignored.
    async fn apply_delta(
        &self,
        key: SlotKey,
        from: u16,
        to: u16,
        qty: u32,
        capacity: u32,
        mode: DeltaMode,
    ) -> Result<(), EngineError>;
}

/// In-memory slot store: one `RwLock` per row gives the per-row atomic
/// read-modify-write the port contract requires.
#[derive(Default)]
pub struct MemorySlotStore {
    rows: DashMap<SlotKey, Arc<RwLock<SlotRow>>>,
}

impl MemorySlotStore {
    pub fn new() -> Self {
        Self { rows: DashMap::new() }
    }

    fn row(&self, key: SlotKey) -> Arc<RwLock<SlotRow>> {
        self.rows.entry(key).or_default().clone()
    }
}

#[async_trait]
impl SlotStore for MemorySlotStore {
    async fn ensure_row(&self, key: SlotKey) -> Result<(), EngineError> {
        self.rows.entry(key).or_default();
        Ok(())
    }

    async fn read_row(&self, key: SlotKey) -> Result<SlotRow, EngineError> {
        let row = match self.rows.get(&key) {
            Some(entry) => entry.value().clone(),
            None => return Ok(SlotRow::default()),
        };
        let guard = row.read().await;
        Ok(guard.clone())
    }

    async fn apply_delta(
        &self,
        key: SlotKey,
        from: u16,
        to: u16,
        qty: u32,
        capacity: u32,
        mode: DeltaMode,
    ) -> Result<(), EngineError> {
        validate_slot_span(from, to)?;
        let row = self.row(key);
        let mut guard = row.write().await;
        match mode {
            DeltaMode::Add => {
                // Validate the whole span before touching anything; the write
                // lock spans read-validate-write, so a rejection leaves the
                // row byte-identical.
                for slot in slot_starts(from, to) {
                    if guard.get(slot).saturating_add(qty) > capacity {
                        return Err(EngineError::CapacityExceeded {
                            resource_id: key.resource_id,
                            date: key.date,
                        });
                    }
                }
                for slot in slot_starts(from, to) {
                    let next = guard.get(slot) + qty;
                    guard.set(slot, next);
                }
            }
            DeltaMode::Subtract => {
                for slot in slot_starts(from, to) {
                    let next = guard.get(slot).saturating_sub(qty);
                    guard.set(slot, next);
                }
            }
        }
        Ok(())
    }
}
