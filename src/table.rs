//! Descriptor Table
//!
//! Fixed-capacity arena mapping small integer handles to open-file or
//! open-directory state. A slot is either `None` or a fully populated value;
//! capacity is set at construction and never grows.
//!
//! The table itself is not synchronized. Backends keep it behind their
//! serialization lock so that search-and-claim is atomic with respect to
//! other callers.

use crate::error::{FsError, Result};

/// Fixed-size descriptor table
pub struct HandleTable<T> {
    slots: Box<[Option<T>]>,
}

impl<T> HandleTable<T> {
    /// Create a table with `capacity` empty slots
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| None).collect(),
        }
    }

    /// Total number of slots
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of occupied slots
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    /// Index of the first empty slot, without claiming it
    ///
    /// Returns `TooManyOpen` when every slot is occupied.
    pub fn vacant(&self) -> Result<usize> {
        self.slots
            .iter()
            .position(Option::is_none)
            .ok_or(FsError::TooManyOpen)
    }

    /// Claim the first empty slot for `value` and return its index
    pub fn allocate(&mut self, value: T) -> Result<usize> {
        let index = self.vacant()?;
        self.slots[index] = Some(value);
        Ok(index)
    }

    /// Populate a slot previously reported by [`vacant`](Self::vacant)
    ///
    /// Fails with `BadHandle` if the index is out of range or already taken.
    pub fn fill(&mut self, index: usize, value: T) -> Result<()> {
        let slot = self.slots.get_mut(index).ok_or(FsError::BadHandle)?;
        if slot.is_some() {
            return Err(FsError::BadHandle);
        }
        *slot = Some(value);
        Ok(())
    }

    /// Look up an occupied slot
    pub fn get(&self, index: usize) -> Result<&T> {
        self.slots
            .get(index)
            .and_then(Option::as_ref)
            .ok_or(FsError::BadHandle)
    }

    /// Look up an occupied slot for mutation
    pub fn get_mut(&mut self, index: usize) -> Result<&mut T> {
        self.slots
            .get_mut(index)
            .and_then(Option::as_mut)
            .ok_or(FsError::BadHandle)
    }

    /// Empty a slot, handing its value back to the caller
    pub fn release(&mut self, index: usize) -> Result<T> {
        self.slots
            .get_mut(index)
            .and_then(Option::take)
            .ok_or(FsError::BadHandle)
    }

    /// Occupied slots in index order
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (usize, &mut T)> {
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_mut().map(|value| (index, value)))
    }

    /// Empty every slot, returning the values in index order
    pub fn drain(&mut self) -> Vec<T> {
        self.slots.iter_mut().filter_map(Option::take).collect()
    }
}
