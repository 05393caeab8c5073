/// Errors returned by [`AtomicList`](crate::AtomicList).
///
/// Losing a race in a weak operation is not an error; those operations
/// report contention as `None`.
#[derive(Debug, Clone, PartialEq, Eq, Copy)]
pub enum Error {
  /// No slot of the list can be handed out: all of them are in use, or
  /// retired until the next `clear` after running out of generations.
  Full {
    /// The fixed number of slots the list was built with.
    capacity: u32,
  },

  /// The requested capacity cannot be addressed by a node link.
  InvalidCapacity {
    /// The requested capacity
    requested: u32,
    /// The largest supported capacity
    maximum: u32,
  },
}

impl Error {
  #[inline]
  pub(crate) const fn full(capacity: u32) -> Self {
    Self::Full { capacity }
  }

  #[inline]
  pub(crate) const fn invalid_capacity(requested: u32, maximum: u32) -> Self {
    Self::InvalidCapacity { requested, maximum }
  }
}

impl core::fmt::Display for Error {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    match self {
      Self::Full { capacity } => write!(
        f,
        "Allocation failed: none of the {} node slots is free",
        capacity
      ),
      Self::InvalidCapacity { requested, maximum } => write!(
        f,
        "Invalid capacity: requested {} slots, but the capacity must be between 1 and {}",
        requested, maximum
      ),
    }
  }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}
