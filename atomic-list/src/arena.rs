use crossbeam_utils::Backoff;

use super::{
  cell::{Cell, Marker, Snapshot, NONE},
  common::*,
  Payload,
};

#[allow(unused_imports)]
use std::boxed::Box;

/// The slot reserved for the list sentinel. It is never handed out.
pub(crate) const SENTINEL: u32 = 0;

struct Slot<T> {
  cell: Cell<T>,
  /// The next slot on the free stack, only meaningful while the slot is free.
  ///
  /// Kept apart from the cell so that a retired node keeps its last link
  /// until the slot is handed out again.
  free_next: AtomicU32,
}

/// A fixed pool of node slots with a lock-free free stack.
///
/// All slots are allocated once at construction. A slot is handed out by
/// [`Arena::acquire`] with its generation bumped and comes back through
/// [`Arena::release`] marked as retired, so a thread still holding the index
/// of a released slot observes a different word instead of mixed old/new
/// content. Generations never wrap: a slot that used up all of them is
/// retired for good until the arena is reset.
pub(crate) struct Arena<T> {
  slots: Box<[Slot<T>]>,
  /// Multiple parts of the free stack head are encoded as a single `u64` so
  /// that they can be atomically loaded and stored:
  /// - top slot index: `u32` (bits 0-31)
  /// - ABA tag: `u32` (bits 32-63)
  free: AtomicU64,
  capacity: u32,
}

impl<T: Payload> Arena<T> {
  /// Allocates `capacity` node slots plus the sentinel.
  pub(crate) fn new(capacity: u32) -> Self {
    let slots = (SENTINEL..=capacity)
      .map(|index| {
        let (marker, free_next) = initial_state(index, capacity);
        Slot {
          cell: Cell::new(Snapshot::vacant(marker, 0)),
          free_next: AtomicU32::new(free_next),
        }
      })
      .collect::<Box<[_]>>();

    Self {
      slots,
      free: AtomicU64::new(encode_free(initial_top(capacity), 0)),
      capacity,
    }
  }

  /// Puts every slot back into the state [`Arena::new`] leaves it in,
  /// including slots that ran out of generations.
  ///
  /// Exclusive access guarantees that no cursor into the arena is alive, so
  /// generations can start over.
  pub(crate) fn reset(&mut self) {
    for (index, slot) in (SENTINEL..).zip(self.slots.iter()) {
      let (marker, free_next) = initial_state(index, self.capacity);
      slot.cell.store(Snapshot::vacant(marker, 0));
      slot.free_next.store(free_next, Ordering::Relaxed);
    }

    self.free.store(
      encode_free(initial_top(self.capacity), 0),
      Ordering::Release,
    );
  }

  #[inline]
  pub(crate) const fn capacity(&self) -> u32 {
    self.capacity
  }

  #[inline]
  pub(crate) fn sentinel(&self) -> &Cell<T> {
    &self.slots[SENTINEL as usize].cell
  }

  #[inline]
  pub(crate) fn cell(&self, index: u32) -> &Cell<T> {
    &self.slots[index as usize].cell
  }

  /// Pops a free slot.
  ///
  /// On success the slot's word has already been reset to an unlinked,
  /// pending node of the next generation, which is returned together with
  /// the slot index. Returns `None` when every slot is in use.
  pub(crate) fn acquire(&self) -> Option<(u32, Snapshot<T>)> {
    let backoff = Backoff::new();
    let mut current = self.free.load(Ordering::Acquire);

    loop {
      let (top, tag) = decode_free(current);
      if top == NONE {
        return None;
      }

      let next = self.slots[top as usize].free_next.load(Ordering::Acquire);
      match self.free.compare_exchange_weak(
        current,
        encode_free(next, tag.wrapping_add(1)),
        Ordering::AcqRel,
        Ordering::Acquire,
      ) {
        Ok(_) => {
          let cell = self.cell(top);
          let freed = cell.load();
          debug_assert!(freed.is_retired(), "acquired a slot that was not free");

          let fresh = Snapshot::vacant(Marker::PENDING, freed.next_generation());
          cell.store(fresh);
          return Some((top, fresh));
        }
        Err(actual) => {
          current = actual;
          backoff.spin();
        }
      }
    }
  }

  /// Marks a node the caller has just unlinked as retired and pushes its
  /// slot back on the free stack.
  ///
  /// A slot whose generation cannot grow any further stays off the stack
  /// until the next [`Arena::reset`], so no `(slot, generation)` pair ever
  /// names two different nodes.
  pub(crate) fn release(&self, index: u32) {
    debug_assert!(
      index != SENTINEL && index <= self.capacity,
      "released slot {index} is out of range"
    );

    let cell = self.cell(index);
    let node = cell.load();
    cell.store(node.with_marker(Marker::RETIRED));

    if node.generation() == Snapshot::<T>::MAX_GENERATION {
      #[cfg(feature = "tracing")]
      tracing::debug!("slot {index} ran out of generations, retiring it");
      return;
    }

    self.push(index);
  }

  /// Gives back a slot that was acquired but never linked.
  ///
  /// No cursor can name a node that was never linked, so the slot goes back
  /// with the generation it had before [`Arena::acquire`] and failed
  /// insertions do not wear it out.
  pub(crate) fn abandon(&self, index: u32) {
    debug_assert!(
      index != SENTINEL && index <= self.capacity,
      "abandoned slot {index} is out of range"
    );

    let cell = self.cell(index);
    let node = cell.load();
    debug_assert!(node.is_pending(), "abandoned slot {index} was published");
    cell.store(Snapshot::vacant(Marker::RETIRED, node.previous_generation()));

    self.push(index);
  }

  fn push(&self, index: u32) {
    let slot = &self.slots[index as usize];
    let backoff = Backoff::new();
    let mut current = self.free.load(Ordering::Acquire);
    loop {
      let (top, tag) = decode_free(current);
      slot.free_next.store(top, Ordering::Release);

      match self.free.compare_exchange_weak(
        current,
        encode_free(index, tag.wrapping_add(1)),
        Ordering::AcqRel,
        Ordering::Acquire,
      ) {
        Ok(_) => return,
        Err(actual) => {
          current = actual;
          backoff.spin();
        }
      }
    }
  }
}

/// The marker and free-stack link of a slot in a fresh arena.
#[inline]
const fn initial_state(index: u32, capacity: u32) -> (Marker, u32) {
  if index == SENTINEL {
    (Marker::empty(), NONE)
  } else if index == capacity {
    (Marker::RETIRED, NONE)
  } else {
    (Marker::RETIRED, index + 1)
  }
}

#[inline]
const fn initial_top(capacity: u32) -> u32 {
  if capacity == 0 {
    NONE
  } else {
    SENTINEL + 1
  }
}

#[inline]
const fn encode_free(top: u32, tag: u32) -> u64 {
  (tag as u64) << 32 | top as u64
}

#[inline]
const fn decode_free(word: u64) -> (u32, u32) {
  (word as u32, (word >> 32) as u32)
}

#[cfg(test)]
mod tests;
