//! A single wheel level: a fixed power-of-two array of [`Slot`]s with a
//! rotating cursor, lazily allocating slots on first use so an idle level
//! costs nothing but its (empty) array.

use slotmap::SlotMap;

use crate::error::{Error, Result};
use crate::slot::Slot;
use crate::timer::{SlotRef, TimerKey, TimerRecord};

type Arena = SlotMap<TimerKey, TimerRecord>;

pub(crate) struct WheelLevel {
    slots: Vec<Option<Slot>>,
    pos: usize,
    mask: usize,
    bit: u32,
}

impl WheelLevel {
    /// Build a level with `size` slots. `size` must be a power of two.
    pub(crate) fn new(size: usize) -> Result<Self> {
        if size == 0 || !size.is_power_of_two() {
            return Err(Error::config(format!(
                "wheel level size {size} is not a power of two"
            )));
        }
        Ok(Self {
            slots: (0..size).map(|_| None).collect(),
            pos: 0,
            mask: size - 1,
            bit: size.trailing_zeros(),
        })
    }

    /// This level's resolution in bits: `log2(size)`.
    pub(crate) fn bit(&self) -> u32 {
        self.bit
    }

    fn physical_index(&self, offset: usize) -> usize {
        (self.pos.wrapping_add(offset)) & self.mask
    }

    /// Insert `key` at logical `offset` ahead of the cursor, lazily
    /// allocating the target slot.
    pub(crate) fn push(&mut self, arena: &mut Arena, offset: usize, key: TimerKey, level: usize) {
        let index = self.physical_index(offset);
        let slot = self.slots[index].get_or_insert_with(Slot::new);
        slot.push_back(arena, key, SlotRef { level, index });
    }

    /// Remove and return the tail of the slot at logical `offset`, or
    /// `None` if that slot is empty or never allocated.
    ///
    /// The original source's `Wheel.Pop` has an apparent inversion (it
    /// calls `.Pop()` on a slot only when the lookup found `nil`). This
    /// is the corrected contract per the original spec's design notes.
    pub(crate) fn pop(&mut self, arena: &mut Arena, offset: usize) -> Option<TimerKey> {
        let index = self.physical_index(offset);
        self.slots[index].as_mut()?.pop_back(arena)
    }

    /// Unlink `key` from the slot at physical `index` directly — used by
    /// cancellation, which already knows the exact slot via
    /// `TimerRecord::slot_ref`.
    pub(crate) fn remove_at(&mut self, arena: &mut Arena, index: usize, key: TimerKey) {
        if let Some(slot) = self.slots[index & self.mask].as_mut() {
            slot.remove(arena, key);
        }
    }

    /// Advance the cursor by one tick, returning the new physical index.
    pub(crate) fn step(&mut self) -> usize {
        self.pos = self.pos.wrapping_add(1);
        self.pos & self.mask
    }

    /// Take ownership of (and clear) the slot at `index`, leaving the
    /// array entry empty so a later cascade doesn't walk stale structure.
    pub(crate) fn take_slot(&mut self, index: usize) -> Option<Slot> {
        self.slots[index & self.mask].take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timer::{Timer, TimerHandle};

    #[test]
    fn rejects_non_power_of_two() {
        assert!(WheelLevel::new(3).is_err());
        assert!(WheelLevel::new(0).is_err());
        assert!(WheelLevel::new(64).is_ok());
    }

    #[test]
    fn bit_is_log2_of_size() {
        assert_eq!(WheelLevel::new(1).unwrap().bit(), 0);
        assert_eq!(WheelLevel::new(64).unwrap().bit(), 6);
        assert_eq!(WheelLevel::new(256).unwrap().bit(), 8);
    }

    #[test]
    fn push_then_step_drains_the_slot_the_cursor_reaches() {
        let mut arena = Arena::default();
        let mut level = WheelLevel::new(8).unwrap();
        let key = arena.insert(TimerRecord::new(TimerHandle(1), Timer::one_shot(0, || {})));
        level.push(&mut arena, 3, key, 0);

        for _ in 0..2 {
            let idx = level.step();
            assert!(level.take_slot(idx).is_none());
        }
        let idx = level.step();
        let slot = level.take_slot(idx).expect("slot at offset 3 should be populated");
        assert_eq!(slot.front(), Some(key));
    }

    #[test]
    fn pop_on_empty_or_unallocated_slot_is_none() {
        let mut arena = Arena::default();
        let mut level = WheelLevel::new(4).unwrap();
        assert_eq!(level.pop(&mut arena, 0), None);
    }
}
