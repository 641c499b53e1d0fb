//! The intrusive slot list: a circular doubly-linked list of timers
//! living inside a single wheel bucket, addressed through arena keys
//! rather than raw pointers.
//!
//! All operations are O(1) and allocate nothing beyond the timer records
//! already resident in the arena (see [`crate::timer::TimerRecord`]).

use slotmap::SlotMap;

use crate::timer::{SlotRef, TimerKey, TimerRecord};

type Arena = SlotMap<TimerKey, TimerRecord>;

/// A circular doubly-linked list of pending timers. `root` is the head;
/// `root`'s `prev` link (inside the arena) is the tail. Empty iff
/// `root.is_none()`.
#[derive(Default)]
pub(crate) struct Slot {
    root: Option<TimerKey>,
    len: usize,
}

impl Slot {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    pub(crate) fn front(&self) -> Option<TimerKey> {
        self.root
    }

    /// Append `key` at the tail, recording `slot_ref` as its back-reference.
    pub(crate) fn push_back(&mut self, arena: &mut Arena, key: TimerKey, slot_ref: SlotRef) {
        match self.root {
            None => {
                arena[key].prev = Some(key);
                arena[key].next = Some(key);
                self.root = Some(key);
            }
            Some(root) => {
                let tail = arena[root].prev.expect("non-empty slot has a tail");
                arena[key].next = Some(root);
                arena[key].prev = Some(tail);
                arena[tail].next = Some(key);
                arena[root].prev = Some(key);
            }
        }
        arena[key].slot_ref = Some(slot_ref);
        self.len += 1;
    }

    /// Remove and return the tail, or `None` if the slot is empty.
    pub(crate) fn pop_back(&mut self, arena: &mut Arena) -> Option<TimerKey> {
        let root = self.root?;
        let tail = arena[root].prev.expect("non-empty slot has a tail");
        self.remove(arena, tail);
        Some(tail)
    }

    /// Remove and return the head, or `None` if the slot is empty. Used by
    /// cascade's drain-and-reinsert (§4.4), which must re-place timers in
    /// head-to-tail (insertion) order.
    pub(crate) fn pop_front(&mut self, arena: &mut Arena) -> Option<TimerKey> {
        let root = self.root?;
        self.remove(arena, root);
        Some(root)
    }

    /// Unlink `key` from this slot. `key` must currently belong to this
    /// slot (callers locate the right `Slot` via `TimerRecord::slot_ref`
    /// before calling this, so no `list == self` check is needed here).
    pub(crate) fn remove(&mut self, arena: &mut Arena, key: TimerKey) {
        let prev = arena[key].prev;
        let next = arena[key].next;

        if self.root == Some(key) {
            self.root = if next == Some(key) { None } else { next };
        }
        if let Some(p) = prev {
            arena[p].next = next;
        }
        if let Some(n) = next {
            arena[n].prev = prev;
        }

        arena[key].slot_ref = None;
        self.len -= 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timer::{Timer, TimerHandle};

    fn insert(arena: &mut Arena, count: i64) -> TimerKey {
        arena.insert(TimerRecord::new(TimerHandle(count as u64), Timer::one_shot(count, || {})))
    }

    fn ref_at(index: usize) -> SlotRef {
        SlotRef { level: 0, index }
    }

    #[test]
    fn push_and_traverse_forward() {
        let mut arena = Arena::default();
        let mut slot = Slot::new();
        let a = insert(&mut arena, 1);
        let b = insert(&mut arena, 2);
        let c = insert(&mut arena, 3);
        slot.push_back(&mut arena, a, ref_at(0));
        slot.push_back(&mut arena, b, ref_at(0));
        slot.push_back(&mut arena, c, ref_at(0));

        assert_eq!(slot.len(), 3);
        let mut seen = vec![];
        let mut cur = slot.front();
        for _ in 0..slot.len() {
            let key = cur.unwrap();
            seen.push(arena[key].count);
            cur = arena[key].next;
        }
        assert_eq!(seen, vec![1, 2, 3]);
    }

    #[test]
    fn remove_head_middle_tail() {
        let mut arena = Arena::default();
        let mut slot = Slot::new();
        let a = insert(&mut arena, 1);
        let b = insert(&mut arena, 2);
        let c = insert(&mut arena, 3);
        slot.push_back(&mut arena, a, ref_at(0));
        slot.push_back(&mut arena, b, ref_at(0));
        slot.push_back(&mut arena, c, ref_at(0));

        slot.remove(&mut arena, b);
        assert_eq!(slot.len(), 2);
        assert!(arena[b].slot_ref.is_none());

        slot.remove(&mut arena, a); // head
        assert_eq!(slot.len(), 1);
        assert_eq!(slot.front(), Some(c));

        slot.remove(&mut arena, c); // last remaining
        assert_eq!(slot.len(), 0);
        assert!(slot.is_empty());
    }

    #[test]
    fn pop_back_returns_tail_then_empty() {
        let mut arena = Arena::default();
        let mut slot = Slot::new();
        let a = insert(&mut arena, 1);
        let b = insert(&mut arena, 2);
        slot.push_back(&mut arena, a, ref_at(0));
        slot.push_back(&mut arena, b, ref_at(0));

        assert_eq!(slot.pop_back(&mut arena), Some(b));
        assert_eq!(slot.pop_back(&mut arena), Some(a));
        assert_eq!(slot.pop_back(&mut arena), None);
    }

    #[test]
    fn pop_front_returns_head_then_empty_in_insertion_order() {
        let mut arena = Arena::default();
        let mut slot = Slot::new();
        let a = insert(&mut arena, 1);
        let b = insert(&mut arena, 2);
        let c = insert(&mut arena, 3);
        slot.push_back(&mut arena, a, ref_at(0));
        slot.push_back(&mut arena, b, ref_at(0));
        slot.push_back(&mut arena, c, ref_at(0));

        assert_eq!(slot.pop_front(&mut arena), Some(a));
        assert_eq!(slot.pop_front(&mut arena), Some(b));
        assert_eq!(slot.pop_front(&mut arena), Some(c));
        assert_eq!(slot.pop_front(&mut arena), None);
    }

    #[test]
    fn length_matches_forward_and_backward_traversal() {
        let mut arena = Arena::default();
        let mut slot = Slot::new();
        for i in 0..5 {
            let k = insert(&mut arena, i);
            slot.push_back(&mut arena, k, ref_at(0));
        }

        let mut forward = 0;
        let mut cur = slot.front();
        let start = cur;
        loop {
            let key = cur.unwrap();
            forward += 1;
            cur = arena[key].next;
            if cur == start {
                break;
            }
        }
        assert_eq!(forward, slot.len());
    }

    fn forward_len(slot: &Slot, arena: &Arena) -> usize {
        let Some(start) = slot.front() else { return 0 };
        let mut n = 1;
        let mut cur = arena[start].next.unwrap();
        while cur != start {
            n += 1;
            cur = arena[cur].next.unwrap();
        }
        n
    }

    fn backward_len(slot: &Slot, arena: &Arena) -> usize {
        let Some(start) = slot.front() else { return 0 };
        let tail = arena[start].prev.unwrap();
        let mut n = 1;
        let mut cur = arena[tail].prev.unwrap();
        while cur != tail {
            n += 1;
            cur = arena[cur].prev.unwrap();
        }
        n
    }

    proptest::proptest! {
        // §8 invariant: for every slot, `length` equals the node count
        // reachable from `root` by `next`, and equals the count by `prev`,
        // across arbitrary interleavings of push/remove-by-position.
        #[test]
        fn length_matches_traversal_under_arbitrary_churn(
            ops in proptest::collection::vec(proptest::prop_oneof![
                proptest::num::i64::ANY.prop_map(Op::Push),
                (0usize..32).prop_map(Op::RemoveNth),
            ], 0..200)
        ) {
            let mut arena = Arena::default();
            let mut slot = Slot::new();
            let mut live: Vec<TimerKey> = Vec::new();

            for op in ops {
                match op {
                    Op::Push(count) => {
                        let k = insert(&mut arena, count);
                        slot.push_back(&mut arena, k, ref_at(0));
                        live.push(k);
                    }
                    Op::RemoveNth(n) => {
                        if !live.is_empty() {
                            let idx = n % live.len();
                            let k = live.remove(idx);
                            slot.remove(&mut arena, k);
                        }
                    }
                }
            }

            proptest::prop_assert_eq!(slot.len(), live.len());
            proptest::prop_assert_eq!(forward_len(&slot, &arena), slot.len());
            proptest::prop_assert_eq!(backward_len(&slot, &arena), slot.len());
        }
    }

    #[derive(Debug, Clone)]
    enum Op {
        Push(i64),
        RemoveNth(usize),
    }
}
