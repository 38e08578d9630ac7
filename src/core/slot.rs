//! Slot Arena
//!
//! Fixed-capacity tables where each slot is explicitly empty or occupied.
//! The `0xFF` empty marker only exists at the serialization boundary; in
//! memory every table uses [`Slot`].

use serde::{Deserialize, Serialize};

/// A single table slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Slot<T> {
    /// Unused slot.
    #[default]
    Empty,
    /// Slot holding a value.
    Occupied(T),
}

impl<T> Slot<T> {
    /// Check if the slot is unused.
    #[inline]
    pub fn is_empty(&self) -> bool {
        matches!(self, Slot::Empty)
    }

    /// Borrow the value, if any.
    #[inline]
    pub fn as_ref(&self) -> Option<&T> {
        match self {
            Slot::Empty => None,
            Slot::Occupied(value) => Some(value),
        }
    }

    /// Mutably borrow the value, if any.
    #[inline]
    pub fn as_mut(&mut self) -> Option<&mut T> {
        match self {
            Slot::Empty => None,
            Slot::Occupied(value) => Some(value),
        }
    }

    /// Take the value out, leaving the slot empty.
    #[inline]
    pub fn take(&mut self) -> Option<T> {
        match std::mem::take(self) {
            Slot::Empty => None,
            Slot::Occupied(value) => Some(value),
        }
    }
}

impl<T> From<Option<T>> for Slot<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => Slot::Occupied(v),
            None => Slot::Empty,
        }
    }
}

/// Fixed-capacity arena of indexed slots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotArena<T> {
    slots: Vec<Slot<T>>,
}

impl<T> SlotArena<T> {
    /// Create an arena with every slot empty.
    pub fn with_capacity(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || Slot::Empty);
        Self { slots }
    }

    /// Number of slots.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Borrow a slot.
    #[inline]
    pub fn slot(&self, index: usize) -> Option<&Slot<T>> {
        self.slots.get(index)
    }

    /// Borrow an occupied slot's value.
    #[inline]
    pub fn get(&self, index: usize) -> Option<&T> {
        self.slots.get(index).and_then(Slot::as_ref)
    }

    /// Mutably borrow an occupied slot's value.
    #[inline]
    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.slots.get_mut(index).and_then(Slot::as_mut)
    }

    /// Overwrite a slot. Out-of-range indices are ignored and return `false`.
    pub fn set(&mut self, index: usize, value: T) -> bool {
        match self.slots.get_mut(index) {
            Some(slot) => {
                *slot = Slot::Occupied(value);
                true
            }
            None => false,
        }
    }

    /// Empty a slot, returning its previous value.
    pub fn clear(&mut self, index: usize) -> Option<T> {
        self.slots.get_mut(index).and_then(Slot::take)
    }

    /// Index of the first empty slot.
    pub fn first_empty(&self) -> Option<usize> {
        self.slots.iter().position(Slot::is_empty)
    }

    /// Store a value in the first empty slot.
    pub fn insert(&mut self, value: T) -> Option<usize> {
        let index = self.first_empty()?;
        self.slots[index] = Slot::Occupied(value);
        Some(index)
    }

    /// Iterate all slots in index order.
    pub fn slots(&self) -> impl Iterator<Item = &Slot<T>> {
        self.slots.iter()
    }

    /// Iterate occupied slots with their index.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|v| (i, v)))
    }

    /// Mutably iterate occupied slots with their index.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (usize, &mut T)> {
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_mut().map(|v| (i, v)))
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| !s.is_empty()).count()
    }

    /// Check if every slot is empty.
    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Slot::is_empty)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_fills_first_empty() {
        let mut arena = SlotArena::with_capacity(3);
        assert_eq!(arena.insert(10), Some(0));
        assert_eq!(arena.insert(20), Some(1));
        arena.clear(0);
        assert_eq!(arena.insert(30), Some(0));
        assert_eq!(arena.insert(40), Some(2));
        assert_eq!(arena.insert(50), None);
        assert_eq!(arena.len(), 3);
    }

    #[test]
    fn test_out_of_range_is_ignored() {
        let mut arena: SlotArena<u8> = SlotArena::with_capacity(2);
        assert!(!arena.set(5, 1));
        assert_eq!(arena.get(5), None);
        assert_eq!(arena.clear(5), None);
        assert!(arena.is_empty());
    }

    #[test]
    fn test_iter_skips_empty() {
        let mut arena = SlotArena::with_capacity(4);
        arena.set(1, 'a');
        arena.set(3, 'b');
        let occupied: Vec<_> = arena.iter().collect();
        assert_eq!(occupied, vec![(1, &'a'), (3, &'b')]);
    }
}
