/// Rounds `value` up to the header word granularity (`u32`, 4 bytes).
///
/// Every block inside a scratch buffer starts and ends on this granularity,
/// which is what lets the header be recovered by stepping back one word at a
/// time.
///
/// # Examples
///
/// ```rust
/// use scratchring::align;
///
/// assert_eq!(align!(1), 4);
/// assert_eq!(align!(4), 4);
/// assert_eq!(align!(13), 16);
/// ```
#[macro_export]
macro_rules! align {
  ($value:expr) => {
    $crate::align_to!($value, ::core::mem::size_of::<u32>())
  };
}

/// Rounds `value` up to the next multiple of `alignment`.
///
/// `alignment` must be a power of two.
///
/// ```rust
/// use scratchring::align_to;
///
/// assert_eq!(align_to!(17, 16), 32);
/// assert_eq!(align_to!(64, 64), 64);
/// ```
#[macro_export]
macro_rules! align_to {
  ($value:expr, $alignment:expr) => {
    ($value + $alignment - 1) & !($alignment - 1)
  };
}

/// Overflow-checked form of [`align_to!`], for sizes that come from callers.
#[inline]
pub fn checked_align_up(
  value: usize,
  alignment: usize,
) -> Option<usize> {
  debug_assert!(alignment.is_power_of_two());
  value
    .checked_add(alignment - 1)
    .map(|v| v & !(alignment - 1))
}
