use core::iter::FusedIterator;

use super::{arena::SENTINEL, cell::NONE, AtomicList, Payload};

/// A position in an [`AtomicList`].
///
/// A cursor names one node slot together with the generation the slot had
/// when the cursor was created. Once that node is erased and its slot is
/// reused, the generations no longer match and every operation through the
/// cursor fails instead of acting on the new occupant.
///
/// Cursors are cheap to copy and never keep a node alive; iteration through
/// them is a best-effort view of a list that other threads may be changing.
pub struct Cursor<'a, T> {
  pub(crate) list: &'a AtomicList<T>,
  pub(crate) index: u32,
  pub(crate) generation: u32,
}

impl<T> Clone for Cursor<'_, T> {
  #[inline]
  fn clone(&self) -> Self {
    *self
  }
}

impl<T> Copy for Cursor<'_, T> {}

impl<T> PartialEq for Cursor<'_, T> {
  #[inline]
  fn eq(&self, other: &Self) -> bool {
    core::ptr::eq(self.list, other.list)
      && self.index == other.index
      && self.generation == other.generation
  }
}

impl<T> Eq for Cursor<'_, T> {}

impl<T> core::fmt::Debug for Cursor<'_, T> {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    match self.index {
      NONE => f.write_str("Cursor(end)"),
      SENTINEL => f.write_str("Cursor(before_begin)"),
      index => f
        .debug_struct("Cursor")
        .field("index", &index)
        .field("generation", &self.generation)
        .finish(),
    }
  }
}

impl<'a, T: Payload> Cursor<'a, T> {
  #[inline]
  pub(crate) const fn new(list: &'a AtomicList<T>, index: u32, generation: u32) -> Self {
    Self {
      list,
      index,
      generation,
    }
  }

  #[inline]
  pub(crate) const fn end(list: &'a AtomicList<T>) -> Self {
    Self::new(list, NONE, 0)
  }

  /// Returns `true` if this cursor is past the last element.
  #[inline]
  pub const fn is_end(&self) -> bool {
    self.index == NONE
  }

  /// Returns `true` if this cursor is the position before the first element.
  #[inline]
  pub const fn is_before_begin(&self) -> bool {
    self.index == SENTINEL
  }

  /// Returns the current payload of the node.
  ///
  /// Returns `None` at the end or before-begin positions, and for a node
  /// that has been erased (or whose slot has since been reused).
  ///
  /// # Example
  ///
  /// ```
  /// use atomic_list::AtomicList;
  ///
  /// let list = AtomicList::<u32>::new(4).unwrap();
  /// let it = list.push_front(7).unwrap();
  /// assert_eq!(it.get(), Some(7));
  /// assert_eq!(list.end().get(), None);
  /// ```
  #[inline]
  pub fn get(&self) -> Option<T> {
    self.list.payload(self)
  }

  /// Returns the cursor to the node that currently follows this one.
  ///
  /// Advancing the end position, or a cursor whose slot has been reused,
  /// yields the end position. An erased node whose slot is not yet reused
  /// still leads to the node that followed it when it was unlinked.
  #[inline]
  pub fn advance(self) -> Self {
    self.list.follow(&self)
  }

  /// Replaces the payload and locks the node, see [`AtomicList::update`].
  #[inline]
  pub fn update(&self, value: T) -> bool {
    self.list.update(self, value)
  }

  /// Clears the lock set by [`update`](Cursor::update), see [`AtomicList::unlock`].
  #[inline]
  pub fn unlock(&self) -> bool {
    self.list.unlock(self)
  }

  /// Returns `true` if the node is locked against removal.
  #[inline]
  pub fn is_locked(&self) -> bool {
    self.list.locked(self)
  }
}

/// An iterator over the payloads of an [`AtomicList`].
///
/// This struct is created by [`AtomicList::iter`]. Nodes erased while the
/// iterator walks past them are skipped.
pub struct Iter<'a, T> {
  cursor: Cursor<'a, T>,
}

impl<'a, T: Payload> Iter<'a, T> {
  #[inline]
  pub(crate) const fn new(cursor: Cursor<'a, T>) -> Self {
    Self { cursor }
  }
}

impl<T: Payload> Iterator for Iter<'_, T> {
  type Item = T;

  fn next(&mut self) -> Option<T> {
    while !self.cursor.is_end() {
      let current = self.cursor;
      self.cursor = current.advance();
      if let Some(value) = current.get() {
        return Some(value);
      }
    }
    None
  }
}

impl<T: Payload> FusedIterator for Iter<'_, T> {}

impl<'a, T: Payload> IntoIterator for &'a AtomicList<T> {
  type Item = T;
  type IntoIter = Iter<'a, T>;

  #[inline]
  fn into_iter(self) -> Self::IntoIter {
    self.iter()
  }
}
