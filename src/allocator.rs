use std::num::NonZeroUsize;

use crate::error::{AllocatorError, Result};

/// Address returned by [`MemAlloc::allocate`] when no placement exists.
///
/// Neither allocator ever issues it for a successful request.
pub const NULL_ADDRESS: usize = 0;

/// The capability shared by every allocator in this crate.
///
/// Consumers should depend on this trait rather than on a concrete
/// allocator, so the placement strategy can be swapped freely.
pub trait MemAlloc {
  /// Reserves at least `size` bytes and returns the address of the region,
  /// or [`NULL_ADDRESS`] when the request cannot be satisfied.
  ///
  /// A request of zero bytes is served as one alignment unit.
  fn allocate(
    &mut self,
    size: usize,
  ) -> usize;

  /// Releases a region previously returned by [`MemAlloc::allocate`].
  fn free(
    &mut self,
    address: usize,
  );

  /// Total number of bytes managed by the allocator.
  fn capacity(&self) -> usize;

  /// Like [`MemAlloc::allocate`], with the failure sentinel turned into an
  /// error.
  fn try_allocate(
    &mut self,
    size: usize,
  ) -> Result<NonZeroUsize> {
    NonZeroUsize::new(self.allocate(size)).ok_or(AllocatorError::OutOfSpace { requested: size })
  }
}
