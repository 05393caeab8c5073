use crossbeam_utils::Backoff;

use super::{
  arena::{Arena, SENTINEL},
  cell::{Cell, Marker, Snapshot, NONE},
  common::*,
  Cursor, Error, Iter, Options, Payload,
};

/// Lock-free, fixed-capacity singly linked list.
///
/// Every node lives in a slot of a preallocated arena, and a node's payload,
/// link and marker share one atomic word. Structural changes are a single
/// compare-and-swap on the word of the node they hang off, so an insertion,
/// an erasure and an [`update`](AtomicList::update) racing on the same node
/// are linearized by whichever swap lands first; the others observe the new
/// word and fail.
///
/// Positional operations are *weak*: [`insert_after_weak`](AtomicList::insert_after_weak)
/// and [`erase_after_weak`](AtomicList::erase_after_weak) make one attempt and
/// report contention as `None`, leaving the retry policy to the caller.
/// [`push_front`](AtomicList::push_front) and [`update`](AtomicList::update)
/// have no position to lose and retry until they succeed.
///
/// A node locked by [`update`](AtomicList::update) can never be erased, nor
/// used as an insertion anchor, until it is [`unlock`](AtomicList::unlock)ed.
pub struct AtomicList<T> {
  arena: Arena<T>,
  len: AtomicUsize,
}

impl<T: Payload> AtomicList<T> {
  /// Creates an empty list that can hold at most `capacity` nodes.
  ///
  /// The capacity bounds the nodes that are live at the same time, including
  /// nodes reserved by insertions that are still in flight. It is a shortcut
  /// for `Options::new().with_capacity(capacity).build()`.
  ///
  /// Each erasure uses up one generation of the erased node's slot. A slot
  /// that has used up all of them (511 for 32-bit payloads, many more for
  /// narrower ones) is no longer handed out until [`clear`](AtomicList::clear),
  /// so a cursor to an erased node can never be mistaken for a newer one.
  ///
  /// # Example
  ///
  /// ```
  /// use atomic_list::AtomicList;
  ///
  /// let list = AtomicList::<u32>::new(32).unwrap();
  /// assert_eq!(list.capacity(), 32);
  /// assert!(AtomicList::<u32>::new(0).is_err());
  /// ```
  #[inline]
  pub fn new(capacity: u32) -> Result<Self, Error> {
    Options::new().with_capacity(capacity).build()
  }

  /// The caller has validated the options.
  pub(crate) fn with_options(opts: Options) -> Self {
    Self {
      arena: Arena::new(opts.capacity()),
      len: AtomicUsize::new(0),
    }
  }

  /// Returns the maximum number of nodes the list can hold.
  #[inline]
  pub fn capacity(&self) -> usize {
    self.arena.capacity() as usize
  }

  /// Returns the number of nodes in the list.
  ///
  /// The counter moves together with each successful structural change, so
  /// it is exact whenever no operation is in flight.
  #[inline]
  pub fn size(&self) -> usize {
    self.len.load(Ordering::Acquire)
  }

  /// Alias of [`size`](AtomicList::size).
  #[inline]
  pub fn len(&self) -> usize {
    self.size()
  }

  /// Returns `true` if the list contains no nodes.
  #[inline]
  pub fn is_empty(&self) -> bool {
    self.size() == 0
  }

  /// Returns a cursor to the position before the first node.
  ///
  /// It cannot be dereferenced, but it is a valid anchor for
  /// [`insert_after_weak`](AtomicList::insert_after_weak) and
  /// [`erase_after_weak`](AtomicList::erase_after_weak), which then act on
  /// the front of the list.
  #[inline]
  pub fn before_begin(&self) -> Cursor<'_, T> {
    Cursor::new(self, SENTINEL, self.arena.sentinel().load().generation())
  }

  /// Returns a cursor to the first node, or [`end`](AtomicList::end) if the
  /// list is empty.
  #[inline]
  pub fn begin(&self) -> Cursor<'_, T> {
    self.before_begin().advance()
  }

  /// Returns the position past the last node.
  #[inline]
  pub fn end(&self) -> Cursor<'_, T> {
    Cursor::end(self)
  }

  /// Returns an iterator over the payloads, front to back.
  ///
  /// # Example
  ///
  /// ```
  /// use atomic_list::AtomicList;
  ///
  /// let list = AtomicList::<i32>::new(8).unwrap();
  /// for value in [1, 2, 3] {
  ///   list.push_front(value).unwrap();
  /// }
  ///
  /// assert_eq!(list.iter().collect::<Vec<_>>(), [3, 2, 1]);
  /// ```
  #[inline]
  pub fn iter(&self) -> Iter<'_, T> {
    Iter::new(self.begin())
  }

  /// Inserts `value` at the front of the list.
  ///
  /// Retries until its swap on the list head lands, so the only way it can
  /// fail is running out of slots, in which case the list is left untouched.
  ///
  /// # Example
  ///
  /// ```
  /// use atomic_list::{AtomicList, Error};
  ///
  /// let list = AtomicList::<u32>::new(1).unwrap();
  /// let it = list.push_front(1).unwrap();
  /// assert_eq!(it, list.begin());
  /// assert_eq!(list.push_front(2).unwrap_err(), Error::Full { capacity: 1 });
  /// ```
  pub fn push_front(&self, value: T) -> Result<Cursor<'_, T>, Error> {
    let (index, fresh) = self.reserve()?;
    let node = self.arena.cell(index);
    let sentinel = self.arena.sentinel();

    let backoff = Backoff::new();
    let mut head = sentinel.load();
    loop {
      // the node is still pending, nobody else writes to it
      node.store(fresh.with_payload(value).with_next(head.next()));

      match sentinel.compare_and_set(head, head.with_next(index)) {
        Ok(_) => return Ok(self.publish(index)),
        Err(actual) => {
          head = actual;
          backoff.spin();
        }
      }
    }
  }

  /// Makes one attempt to insert `value` right after `pos`.
  ///
  /// Returns `Ok(None)` without changing the list if `pos` is the end, has
  /// been erased, is locked, or if another thread changed the node at `pos`
  /// between the read and the swap. Returns [`Error::Full`] if no slot is
  /// free.
  ///
  /// # Panics
  ///
  /// Panics if `pos` was obtained from another list.
  ///
  /// # Example
  ///
  /// ```
  /// use atomic_list::AtomicList;
  ///
  /// let list = AtomicList::<u32>::new(4).unwrap();
  /// let first = list.push_front(1).unwrap();
  /// let second = list.insert_after_weak(&first, 2).unwrap().unwrap();
  /// assert_eq!(first.advance(), second);
  ///
  /// // locked anchors refuse insertions
  /// first.update(10);
  /// assert!(list.insert_after_weak(&first, 3).unwrap().is_none());
  /// ```
  pub fn insert_after_weak(
    &self,
    pos: &Cursor<'_, T>,
    value: T,
  ) -> Result<Option<Cursor<'_, T>>, Error> {
    self.check_owner(pos);

    let Some((anchor_cell, anchor)) = self.load(pos) else {
      return Ok(None);
    };

    if !anchor.marker().is_empty() {
      return Ok(None);
    }

    let (index, fresh) = self.reserve()?;
    self
      .arena
      .cell(index)
      .store(fresh.with_payload(value).with_next(anchor.next()));

    match anchor_cell.compare_and_set(anchor, anchor.with_next(index)) {
      Ok(_) => Ok(Some(self.publish(index))),
      Err(_) => {
        self.arena.abandon(index);
        Ok(None)
      }
    }
  }

  /// Makes one attempt to erase the node right after `pos`.
  ///
  /// On success returns the cursor to the node that followed the erased one
  /// (possibly the end). Returns `None` without changing the list if `pos`
  /// is the end or has been erased, if there is no node after it, if that
  /// node is locked, or if another thread changed either node concurrently.
  ///
  /// `pos` itself may be locked: a lock protects a node from removal, not its
  /// successors.
  ///
  /// # Panics
  ///
  /// Panics if `pos` was obtained from another list.
  ///
  /// # Example
  ///
  /// ```
  /// use atomic_list::AtomicList;
  ///
  /// let list = AtomicList::<u32>::new(4).unwrap();
  /// list.push_front(2).unwrap();
  /// let first = list.push_front(1).unwrap();
  ///
  /// let after = list.erase_after_weak(&first).unwrap();
  /// assert!(after.is_end());
  /// assert_eq!(list.iter().collect::<Vec<_>>(), [1]);
  /// assert!(list.erase_after_weak(&first).is_none());
  /// ```
  pub fn erase_after_weak(&self, pos: &Cursor<'_, T>) -> Option<Cursor<'_, T>> {
    self.check_owner(pos);
    self
      .unlink_after(pos)
      .map(|removed| self.cursor_at(removed.next()))
  }

  /// Same as [`erase_after_weak`](AtomicList::erase_after_weak), but returns
  /// the payload of the erased node.
  ///
  /// # Panics
  ///
  /// Panics if `pos` was obtained from another list.
  ///
  /// # Example
  ///
  /// ```
  /// use atomic_list::AtomicList;
  ///
  /// let list = AtomicList::<char>::new(4).unwrap();
  /// list.push_front('b').unwrap();
  /// list.push_front('a').unwrap();
  ///
  /// assert_eq!(list.remove_after_weak(&list.before_begin()), Some('a'));
  /// assert_eq!(list.iter().collect::<String>(), "b");
  /// ```
  pub fn remove_after_weak(&self, pos: &Cursor<'_, T>) -> Option<T> {
    self.check_owner(pos);
    self.unlink_after(pos).map(|removed| removed.payload())
  }

  /// Replaces the payload of the node at `pos` and locks it, in one atomic
  /// step.
  ///
  /// Retries until its swap lands. Returns `false`, with no effect, if `pos`
  /// is not a node or the node has been erased.
  ///
  /// # Panics
  ///
  /// Panics if `pos` was obtained from another list.
  pub fn update(&self, pos: &Cursor<'_, T>, value: T) -> bool {
    self.check_owner(pos);
    self.modify(pos, |node| {
      node
        .with_payload(value)
        .with_marker(node.marker() | Marker::LOCKED)
    })
  }

  /// Clears the lock set by [`update`](AtomicList::update), leaving the
  /// payload untouched.
  ///
  /// Retries until its swap lands. Returns `false`, with no effect, if `pos`
  /// is not a node or the node has been erased. Unlocking a node that is not
  /// locked succeeds and changes nothing.
  ///
  /// # Panics
  ///
  /// Panics if `pos` was obtained from another list.
  pub fn unlock(&self, pos: &Cursor<'_, T>) -> bool {
    self.check_owner(pos);
    self.modify(pos, |node| node.with_marker(node.marker() - Marker::LOCKED))
  }

  /// Removes every node.
  ///
  /// Taking `&mut self` guarantees no other operation is in flight and no
  /// cursor is alive, so every slot is handed back, including slots that
  /// were retired after running out of generations.
  pub fn clear(&mut self) {
    #[cfg(feature = "tracing")]
    tracing::debug!("clearing list of {} nodes", self.size());

    self.arena.reset();
    self.len.store(0, Ordering::Release);
  }

  pub(crate) fn payload(&self, pos: &Cursor<'_, T>) -> Option<T> {
    if pos.is_before_begin() {
      return None;
    }

    self
      .load(pos)
      .and_then(|(_, node)| node.is_live().then(|| node.payload()))
  }

  pub(crate) fn locked(&self, pos: &Cursor<'_, T>) -> bool {
    self
      .load(pos)
      .is_some_and(|(_, node)| node.is_live() && node.is_locked())
  }

  pub(crate) fn follow(&self, pos: &Cursor<'_, T>) -> Cursor<'_, T> {
    match self.load(pos) {
      Some((_, node)) => self.cursor_at(node.next()),
      None => self.end(),
    }
  }

  /// Loads the node `pos` names, as long as its slot has not been reused.
  #[inline]
  fn load(&self, pos: &Cursor<'_, T>) -> Option<(&Cell<T>, Snapshot<T>)> {
    if pos.is_end() {
      return None;
    }

    let cell = self.arena.cell(pos.index);
    let node = cell.load();
    (node.generation() == pos.generation).then_some((cell, node))
  }

  #[inline]
  fn cursor_at(&self, index: u32) -> Cursor<'_, T> {
    if index == NONE {
      return self.end();
    }

    Cursor::new(self, index, self.arena.cell(index).load().generation())
  }

  #[inline]
  fn check_owner(&self, pos: &Cursor<'_, T>) {
    assert!(
      core::ptr::eq(pos.list, self),
      "cursor belongs to a different list"
    );
  }

  fn reserve(&self) -> Result<(u32, Snapshot<T>), Error> {
    self.arena.acquire().ok_or_else(|| {
      #[cfg(feature = "tracing")]
      tracing::debug!(
        "no free slot left, all {} slots are in use",
        self.arena.capacity()
      );

      Error::full(self.arena.capacity())
    })
  }

  /// Completes an insertion whose swap has landed.
  fn publish(&self, index: u32) -> Cursor<'_, T> {
    // count before clearing the pending flag, the node cannot be erased
    // until then, so the counter never dips below the true length
    self.len.fetch_add(1, Ordering::AcqRel);
    let node = self.arena.cell(index).clear_marker(Marker::PENDING);
    Cursor::new(self, index, node.generation())
  }

  /// Two-phase unlink of the node after `pos`.
  ///
  /// 1. Mark the target as being removed. This is the point where a
  ///    concurrent lock is observed: a locked target fails the swap, and
  ///    once marked the target can no longer be locked, anchored or erased
  ///    by anyone else.
  /// 2. Swing the anchor's link past the target. If the anchor changed in
  ///    the meantime the target is restored, leaving the list as it was.
  ///
  /// Returns the target's word as it was when it was unlinked.
  fn unlink_after(&self, pos: &Cursor<'_, T>) -> Option<Snapshot<T>> {
    let (anchor_cell, anchor) = self.load(pos)?;
    if !anchor.is_live() || anchor.next() == NONE {
      return None;
    }

    let index = anchor.next();
    let target_cell = self.arena.cell(index);
    let target = target_cell.load();
    if !target.marker().is_empty() {
      return None;
    }

    let removing = target.with_marker(Marker::RETIRED | Marker::PENDING);
    target_cell.compare_and_set(target, removing).ok()?;

    match anchor_cell.compare_and_set(anchor, anchor.with_next(target.next())) {
      Ok(_) => {
        self.len.fetch_sub(1, Ordering::AcqRel);
        self.arena.release(index);
        Some(target)
      }
      Err(_) => {
        #[cfg(feature = "tracing")]
        tracing::trace!("anchor changed while erasing slot {index}, restoring it");

        // a node being removed is only ever written by its remover
        let restored = target_cell.compare_and_set(removing, target);
        debug_assert!(restored.is_ok(), "node being removed was modified by another thread");
        None
      }
    }
  }

  fn modify(&self, pos: &Cursor<'_, T>, f: impl Fn(Snapshot<T>) -> Snapshot<T>) -> bool {
    if pos.is_before_begin() {
      return false;
    }

    let Some((cell, mut node)) = self.load(pos) else {
      return false;
    };

    let backoff = Backoff::new();
    loop {
      if node.generation() != pos.generation {
        return false;
      }

      if node.is_pending() {
        // being published or being removed, either way it settles shortly
        #[cfg(not(feature = "loom"))]
        backoff.snooze();
        #[cfg(feature = "loom")]
        loom::thread::yield_now();
        node = cell.load();
        continue;
      }

      if node.is_retired() {
        return false;
      }

      match cell.compare_and_set(node, f(node)) {
        Ok(_) => return true,
        Err(actual) => {
          node = actual;
          backoff.spin();
        }
      }
    }
  }
}

impl<T: Payload + core::fmt::Debug> core::fmt::Debug for AtomicList<T> {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    f.debug_list().entries(self.iter()).finish()
  }
}
