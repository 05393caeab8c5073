/// A value that can be stored in a node of an [`AtomicList`](crate::AtomicList).
///
/// A node keeps its payload, its link and its marker in a single 64-bit word
/// so that all three change together in one compare-and-swap. The payload
/// therefore has to encode into at most 32 bits. Narrower payloads leave more
/// room for the generation counter that detects reused slots.
///
/// # Example
///
/// ```
/// use atomic_list::Payload;
///
/// #[derive(Debug, Clone, Copy, PartialEq)]
/// struct Ticket(u16);
///
/// impl Payload for Ticket {
///   const BITS: u32 = 16;
///
///   fn into_bits(self) -> u32 {
///     self.0 as u32
///   }
///
///   fn from_bits(bits: u32) -> Self {
///     Ticket(bits as u16)
///   }
/// }
/// ```
pub trait Payload: Copy + Send + Sync + 'static {
  /// The number of bits `into_bits` may set. Must be in `1..=32`.
  const BITS: u32;

  /// Encodes the value. Only the low [`BITS`](Payload::BITS) bits are kept.
  fn into_bits(self) -> u32;

  /// Decodes a value previously produced by [`into_bits`](Payload::into_bits).
  fn from_bits(bits: u32) -> Self;
}

macro_rules! impl_payload {
  ($($ty:ty as $unsigned:ty),+ $(,)?) => {
    $(
      impl Payload for $ty {
        const BITS: u32 = <$unsigned>::BITS;

        #[inline]
        fn into_bits(self) -> u32 {
          self as $unsigned as u32
        }

        #[inline]
        fn from_bits(bits: u32) -> Self {
          bits as $unsigned as $ty
        }
      }
    )+
  };
}

impl_payload!(u8 as u8, u16 as u16, u32 as u32, i8 as u8, i16 as u16, i32 as u32);

impl Payload for bool {
  const BITS: u32 = 1;

  #[inline]
  fn into_bits(self) -> u32 {
    self as u32
  }

  #[inline]
  fn from_bits(bits: u32) -> Self {
    bits != 0
  }
}

impl Payload for char {
  const BITS: u32 = 21;

  #[inline]
  fn into_bits(self) -> u32 {
    self as u32
  }

  #[inline]
  fn from_bits(bits: u32) -> Self {
    char::from_u32(bits).unwrap_or(char::REPLACEMENT_CHARACTER)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn signed_values_survive_truncation() {
    assert_eq!(i8::from_bits(i8::MIN.into_bits()), i8::MIN);
    assert_eq!(i16::from_bits((-2i16).into_bits()), -2);
    assert_eq!(i32::from_bits((-1i32).into_bits()), -1);
    assert_eq!((-1i8).into_bits(), 0xFF);
  }

  #[test]
  fn char_and_bool() {
    assert_eq!(char::from_bits('\u{10FFFF}'.into_bits()), '\u{10FFFF}');
    assert_eq!(char::from_bits(0xD800), char::REPLACEMENT_CHARACTER);
    assert!(bool::from_bits(true.into_bits()));
    assert!(!bool::from_bits(0));
  }
}
