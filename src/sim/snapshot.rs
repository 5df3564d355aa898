//! Undo snapshot ring
//!
//! Fixed-capacity ring of deep copies of the entity and tile arrays. Pushing
//! into a full ring overwrites the oldest snapshot; popping hands back the most
//! recent one.

use serde::{Deserialize, Serialize};

use super::entity::Entity;
use super::error::{SimError, SimResult};
use super::grid::Tile;
use crate::consts::MAX_BACKUPS;

/// Saved copy of the live arrays at a step boundary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub entities: Vec<Entity>,
    pub tiles: Vec<Tile>,
}

impl Snapshot {
    #[inline]
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }
}

#[derive(Debug, Clone)]
pub struct SnapshotStack {
    slots: Vec<Option<Snapshot>>,
    /// Slot the next push writes to
    head: usize,
    len: usize,
}

impl Default for SnapshotStack {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotStack {
    pub fn new() -> Self {
        Self::with_capacity(MAX_BACKUPS)
    }

    /// Ring with a custom bound (at least one slot)
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity.max(1)],
            head: 0,
            len: 0,
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Copy the arrays into the next slot; returns true if the oldest
    /// snapshot was evicted to make room
    pub fn push(&mut self, entities: &[Entity], tiles: &[Tile]) -> bool {
        let evicted = self.len == self.capacity();
        self.slots[self.head] = Some(Snapshot {
            entities: entities.to_vec(),
            tiles: tiles.to_vec(),
        });
        self.head = (self.head + 1) % self.capacity();
        if !evicted {
            self.len += 1;
        }
        evicted
    }

    /// Remove and return the most recent snapshot
    pub fn pop(&mut self) -> SimResult<Snapshot> {
        if self.len == 0 {
            return Err(SimError::EmptyStack);
        }
        self.head = (self.head + self.capacity() - 1) % self.capacity();
        self.len -= 1;
        self.slots[self.head].take().ok_or(SimError::EmptyStack)
    }

    /// Most recent snapshot without removing it
    pub fn peek(&self) -> Option<&Snapshot> {
        if self.len == 0 {
            return None;
        }
        let top = (self.head + self.capacity() - 1) % self.capacity();
        self.slots[top].as_ref()
    }

    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = None);
        self.head = 0;
        self.len = 0;
    }
}
