use core::marker::PhantomData;

use super::{common::*, Payload};

/// The width of a node link.
pub(crate) const INDEX_BITS: u32 = 20;
/// The link value meaning "no next node".
pub(crate) const NONE: u32 = (1 << INDEX_BITS) - 1;

const INDEX_MASK: u64 = NONE as u64;
const MARKER_BITS: u32 = 3;
const MARKER_MASK: u64 = (1 << MARKER_BITS) - 1;

bitflags::bitflags! {
  /// Per-node flags, packed next to the payload and the link.
  #[derive(Debug, Clone, Copy, PartialEq, Eq)]
  pub(crate) struct Marker: u8 {
    /// The node can be neither erased nor used as an insertion anchor.
    const LOCKED = 1;
    /// The node has been unlinked, or its slot is free.
    const RETIRED = 1 << 1;
    /// The node is changing hands: populated but not yet published by its
    /// creator, or, together with `RETIRED`, being removed.
    const PENDING = 1 << 2;
  }
}

/// A decoded copy of a node's word.
///
/// ```text
/// 63                                                         0
/// | generation | marker (3) | next (20) | payload (T::BITS) |
/// ```
///
/// The generation takes whatever is left of the word, capped at 32 bits, and
/// is bumped every time the slot is handed out again.
pub(crate) struct Snapshot<T> {
  word: u64,
  _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Snapshot<T> {
  #[inline]
  fn clone(&self) -> Self {
    *self
  }
}

impl<T> Copy for Snapshot<T> {}

impl<T> PartialEq for Snapshot<T> {
  #[inline]
  fn eq(&self, other: &Self) -> bool {
    self.word == other.word
  }
}

impl<T> Eq for Snapshot<T> {}

impl<T: Payload> core::fmt::Debug for Snapshot<T> {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    f.debug_struct("Snapshot")
      .field("payload", &self.payload_bits())
      .field("next", &self.next())
      .field("marker", &self.marker())
      .field("generation", &self.generation())
      .finish()
  }
}

impl<T: Payload> Snapshot<T> {
  const LAYOUT: () = assert!(
    T::BITS > 0 && T::BITS <= 32,
    "`Payload::BITS` must be in 1..=32"
  );

  const NEXT_SHIFT: u32 = T::BITS;
  const MARKER_SHIFT: u32 = Self::NEXT_SHIFT + INDEX_BITS;
  const GENERATION_SHIFT: u32 = Self::MARKER_SHIFT + MARKER_BITS;

  pub(crate) const GENERATION_BITS: u32 = {
    let free = 64 - Self::GENERATION_SHIFT;
    if free > 32 {
      32
    } else {
      free
    }
  };

  const PAYLOAD_MASK: u64 = (1u64 << T::BITS) - 1;
  const GENERATION_MASK: u64 = (1u64 << Self::GENERATION_BITS) - 1;

  /// The last generation a slot can reach.
  pub(crate) const MAX_GENERATION: u32 = Self::GENERATION_MASK as u32;

  #[inline]
  pub(crate) fn new(payload: u32, next: u32, marker: Marker, generation: u32) -> Self {
    let () = Self::LAYOUT;

    Self::from_word(
      (payload as u64 & Self::PAYLOAD_MASK)
        | ((next as u64 & INDEX_MASK) << Self::NEXT_SHIFT)
        | ((marker.bits() as u64 & MARKER_MASK) << Self::MARKER_SHIFT)
        | ((generation as u64 & Self::GENERATION_MASK) << Self::GENERATION_SHIFT),
    )
  }

  /// An unlinked word with no payload.
  #[inline]
  pub(crate) fn vacant(marker: Marker, generation: u32) -> Self {
    Self::new(0, NONE, marker, generation)
  }

  #[inline]
  const fn from_word(word: u64) -> Self {
    Self {
      word,
      _marker: PhantomData,
    }
  }

  #[inline]
  fn payload_bits(&self) -> u32 {
    (self.word & Self::PAYLOAD_MASK) as u32
  }

  #[inline]
  pub(crate) fn payload(&self) -> T {
    T::from_bits(self.payload_bits())
  }

  #[inline]
  pub(crate) fn next(&self) -> u32 {
    ((self.word >> Self::NEXT_SHIFT) & INDEX_MASK) as u32
  }

  #[inline]
  pub(crate) fn marker(&self) -> Marker {
    Marker::from_bits_truncate(((self.word >> Self::MARKER_SHIFT) & MARKER_MASK) as u8)
  }

  #[inline]
  pub(crate) fn generation(&self) -> u32 {
    ((self.word >> Self::GENERATION_SHIFT) & Self::GENERATION_MASK) as u32
  }

  /// The generation the slot gets when it is handed out again.
  #[inline]
  pub(crate) fn next_generation(&self) -> u32 {
    (self.generation() as u64).wrapping_add(1) as u32 & Self::MAX_GENERATION
  }

  /// The generation the slot had before it was last handed out.
  #[inline]
  pub(crate) fn previous_generation(&self) -> u32 {
    self.generation().wrapping_sub(1) & Self::MAX_GENERATION
  }

  #[inline]
  pub(crate) fn is_locked(&self) -> bool {
    self.marker().contains(Marker::LOCKED)
  }

  #[inline]
  pub(crate) fn is_retired(&self) -> bool {
    self.marker().contains(Marker::RETIRED)
  }

  #[inline]
  pub(crate) fn is_pending(&self) -> bool {
    self.marker().contains(Marker::PENDING)
  }

  /// Published and not being removed.
  #[inline]
  pub(crate) fn is_live(&self) -> bool {
    !self.marker().intersects(Marker::RETIRED | Marker::PENDING)
  }

  #[inline]
  pub(crate) fn with_payload(self, value: T) -> Self {
    Self::new(
      value.into_bits(),
      self.next(),
      self.marker(),
      self.generation(),
    )
  }

  #[inline]
  pub(crate) fn with_next(self, next: u32) -> Self {
    Self::new(self.payload_bits(), next, self.marker(), self.generation())
  }

  #[inline]
  pub(crate) fn with_marker(self, marker: Marker) -> Self {
    Self::new(self.payload_bits(), self.next(), marker, self.generation())
  }
}

/// The versioned cell of a node: payload, link and marker behind one atomic
/// word.
///
/// Every mutation of a linked node goes through [`Cell::compare_and_set`]
/// against a snapshot obtained from [`Cell::load`], so a structural change
/// and a value change to the same node can never both succeed from the same
/// observed state.
#[repr(transparent)]
pub(crate) struct Cell<T> {
  word: AtomicU64,
  _marker: PhantomData<fn() -> T>,
}

impl<T: Payload> Cell<T> {
  #[inline]
  pub(crate) fn new(snapshot: Snapshot<T>) -> Self {
    Self {
      word: AtomicU64::new(snapshot.word),
      _marker: PhantomData,
    }
  }

  #[inline]
  pub(crate) fn load(&self) -> Snapshot<T> {
    Snapshot::from_word(self.word.load(Ordering::Acquire))
  }

  /// Replaces the word with `new` if it still equals `expected`.
  ///
  /// On success returns `new`, the word the cell now holds. On failure
  /// returns the word that was found instead.
  #[inline]
  pub(crate) fn compare_and_set(
    &self,
    expected: Snapshot<T>,
    new: Snapshot<T>,
  ) -> Result<Snapshot<T>, Snapshot<T>> {
    self
      .word
      .compare_exchange(expected.word, new.word, Ordering::AcqRel, Ordering::Acquire)
      .map(|_| new)
      .map_err(Snapshot::from_word)
  }

  /// Overwrites the word.
  ///
  /// Only the exclusive owner of the slot may do this: the creator of a node
  /// that is still pending, or the arena while handing the slot out or
  /// taking it back.
  #[inline]
  pub(crate) fn store(&self, snapshot: Snapshot<T>) {
    self.word.store(snapshot.word, Ordering::Release);
  }

  /// Clears `marker` and returns the resulting word.
  #[inline]
  pub(crate) fn clear_marker(&self, marker: Marker) -> Snapshot<T> {
    let mask = !((marker.bits() as u64 & MARKER_MASK) << Snapshot::<T>::MARKER_SHIFT);
    Snapshot::from_word(self.word.fetch_and(mask, Ordering::AcqRel) & mask)
  }
}
