use super::{cell::NONE, AtomicList, Error, Payload};

/// The largest number of nodes a list can hold.
///
/// Slot `0` is reserved for the list sentinel and the all-ones link value
/// means "no next node", so the addressable slot range is one short of the
/// link width on both ends.
pub const MAX_CAPACITY: u32 = NONE - 1;

/// Options for creating an [`AtomicList`].
#[derive(Debug, Clone, Copy)]
pub struct Options {
  capacity: u32,
}

impl Default for Options {
  #[inline]
  fn default() -> Self {
    Self::new()
  }
}

impl Options {
  /// Create an options for creating a list with default values.
  #[inline]
  pub const fn new() -> Self {
    Self { capacity: 1024 }
  }

  /// Set the capacity of the list, the maximum number of nodes that can be
  /// live at the same time, including nodes reserved by in-flight
  /// insertions.
  ///
  /// All slots are allocated up front when the list is built.
  ///
  /// The capacity must be in `1..=MAX_CAPACITY`.
  /// The default capacity is `1024`.
  ///
  /// # Example
  ///
  /// ```
  /// use atomic_list::Options;
  ///
  /// let opts = Options::new().with_capacity(2048);
  /// ```
  #[inline]
  pub const fn with_capacity(mut self, capacity: u32) -> Self {
    self.capacity = capacity;
    self
  }

  /// Get the capacity of the list.
  ///
  /// # Example
  ///
  /// ```
  /// use atomic_list::Options;
  ///
  /// let opts = Options::new().with_capacity(2048);
  ///
  /// assert_eq!(opts.capacity(), 2048);
  /// ```
  #[inline]
  pub const fn capacity(&self) -> u32 {
    self.capacity
  }

  /// Build an empty list with these options.
  ///
  /// # Example
  ///
  /// ```
  /// use atomic_list::Options;
  ///
  /// let list = Options::new().with_capacity(16).build::<u32>().unwrap();
  /// assert_eq!(list.capacity(), 16);
  /// assert!(list.is_empty());
  /// ```
  #[inline]
  pub fn build<T: Payload>(self) -> Result<AtomicList<T>, Error> {
    if self.capacity == 0 || self.capacity > MAX_CAPACITY {
      return Err(Error::invalid_capacity(self.capacity, MAX_CAPACITY));
    }

    Ok(AtomicList::with_options(self))
  }
}
