/// Calculates the machine word alignment for the given size.
///
/// # Examples
///
/// ```rust
/// use std::mem;
/// use arenalloc::align;
///
/// match mem::size_of::<usize>() {
///     8 => assert_eq!(align!(13), 16), // 64 bit machine.
///     4 => assert_eq!(align!(11), 12), // 32 bit machine.
///     _ => {},
/// };
/// ```
#[macro_export]
macro_rules! align {
  ($value:expr) => {
    $crate::align_to!($value, ::std::mem::size_of::<usize>())
  };
}

/// Rounds `value` up to the next multiple of `alignment`.
///
/// `alignment` must be a power of two, otherwise the mask is meaningless.
///
/// ```rust
/// use arenalloc::align_to;
///
/// assert_eq!(align_to!(1, 4), 4);
/// assert_eq!(align_to!(64, 4), 64);
/// assert_eq!(align_to!(65, 16), 80);
/// ```
#[macro_export]
macro_rules! align_to {
  ($value:expr, $alignment:expr) => {
    ($value + $alignment - 1) & !($alignment - 1)
  };
}

/// Same as [`align_to!`](crate::align_to) but returns `None` instead of
/// wrapping around when the rounded value does not fit in a `usize`.
pub fn checked_align_to(
  value: usize,
  alignment: usize,
) -> Option<usize> {
  value.checked_add(alignment - 1).map(|v| v & !(alignment - 1))
}

pub fn is_valid_alignment(alignment: usize) -> bool {
  alignment.is_power_of_two()
}
