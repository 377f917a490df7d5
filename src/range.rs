use std::collections::BTreeMap;

use log::{debug, trace};

use crate::{
  align::{checked_align_to, is_valid_alignment},
  allocator::{MemAlloc, NULL_ADDRESS},
  error::{AllocatorError, Result},
};

pub const DEFAULT_ALIGNMENT: usize = 1;
pub const DEFAULT_BASE_ADDRESS: usize = 0;

/// Half-open interval `[start, end)` of offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressRange {
  pub start: usize,
  pub end: usize,
}

impl AddressRange {
  pub fn new(
    start: usize,
    end: usize,
  ) -> Self {
    debug_assert!(start < end, "empty range {start}..{end}");
    Self { start, end }
  }

  pub fn len(&self) -> usize {
    self.end - self.start
  }

  pub fn overlaps(
    &self,
    other: &AddressRange,
  ) -> bool {
    self.end > other.start && self.start < other.end
  }

  pub fn contains(
    &self,
    offset: usize,
  ) -> bool {
    self.start <= offset && offset < self.end
  }
}

/// Hands out non-overlapping ranges of an abstract offset space.
///
/// No memory is owned: the allocator only remembers which intervals are in
/// use, which makes it suitable for carving up device windows, simulated
/// address spaces or any other region that cannot be touched directly.
///
/// ```text
///   base_address
///        │
///        ▼
///   ┌────┬────────┬──────┬────────────┬──────┬──────────────┐
///   │ 0  │   A1   │ free │     A2     │  A3  │     free     │
///   └────┴────────┴──────┴────────────┴──────┴──────────────┘
///     ▲   ▲                                                 ▲
///     │   └── first candidate = alignment     alignment + capacity
///     └── reserved, never issued
/// ```
///
/// Offset `0` is reserved so that, with a zero base address, a successful
/// allocation can never be confused with [`NULL_ADDRESS`].
#[derive(Debug)]
pub struct RangeTrackingAllocator {
  capacity: usize,
  alignment: usize,
  base_address: usize,
  bytes_used: usize,
  live_ranges: BTreeMap<usize, AddressRange>,
}

impl RangeTrackingAllocator {
  pub fn new(capacity: usize) -> Result<Self> {
    Self::with_base_address(capacity, DEFAULT_ALIGNMENT, DEFAULT_BASE_ADDRESS)
  }

  pub fn with_alignment(
    capacity: usize,
    alignment: usize,
  ) -> Result<Self> {
    Self::with_base_address(capacity, alignment, DEFAULT_BASE_ADDRESS)
  }

  /// Creates an allocator whose issued addresses are `base_address + offset`.
  ///
  /// # Errors
  ///
  /// Fails when `alignment` is not a power of two, when `capacity` is zero,
  /// or when the highest issuable address would overflow a `usize`.
  pub fn with_base_address(
    capacity: usize,
    alignment: usize,
    base_address: usize,
  ) -> Result<Self> {
    if !is_valid_alignment(alignment) {
      return Err(AllocatorError::InvalidAlignment(alignment));
    }

    if capacity == 0 {
      return Err(AllocatorError::ZeroCapacity);
    }

    base_address
      .checked_add(alignment)
      .and_then(|end| end.checked_add(capacity))
      .ok_or(AllocatorError::AddressOverflow { base_address, capacity })?;

    Ok(Self {
      capacity,
      alignment,
      base_address,
      bytes_used: 0,
      live_ranges: BTreeMap::new(),
    })
  }

  pub fn alignment(&self) -> usize {
    self.alignment
  }

  pub fn base_address(&self) -> usize {
    self.base_address
  }

  pub fn bytes_used(&self) -> usize {
    self.bytes_used
  }

  pub fn bytes_free(&self) -> usize {
    self.capacity - self.bytes_used
  }

  pub fn allocation_count(&self) -> usize {
    self.live_ranges.len()
  }

  /// Returns `true` if `address` is the start of a live allocation.
  pub fn is_allocated(
    &self,
    address: usize,
  ) -> bool {
    address
      .checked_sub(self.base_address)
      .is_some_and(|offset| self.live_ranges.contains_key(&offset))
  }

  /// Live ranges in ascending order, expressed as offsets from the base address.
  pub fn live_ranges(&self) -> impl Iterator<Item = AddressRange> + '_ {
    self.live_ranges.values().copied()
  }

  /// Releases every live range at once.
  pub fn reset(&mut self) {
    debug!("releasing {} live ranges", self.live_ranges.len());
    self.live_ranges.clear();
    self.bytes_used = 0;
  }

  /// Frees `address`, reporting addresses that are not live.
  pub fn try_free(
    &mut self,
    address: usize,
  ) -> Result<()> {
    let offset = address
      .checked_sub(self.base_address)
      .ok_or(AllocatorError::InvalidFree(address))?;

    let range = self
      .live_ranges
      .remove(&offset)
      .ok_or(AllocatorError::InvalidFree(address))?;

    self.bytes_used -= range.len();
    debug!("freed {:#x}, {} bytes", address, range.len());

    Ok(())
  }

  /// Returns the live range that prevents `candidate` from being placed, if any.
  ///
  /// Live ranges never overlap each other, so the only one that can reach
  /// into `candidate` is the last one starting before its end.
  fn blocking_range(
    &self,
    candidate: &AddressRange,
  ) -> Option<AddressRange> {
    self
      .live_ranges
      .range(..candidate.end)
      .next_back()
      .map(|(_, range)| *range)
      .filter(|range| range.overlaps(candidate))
  }

  /// First-fit search over aligned offsets, starting at `alignment`.
  ///
  /// Every candidate below the end of a blocking range would overlap it as
  /// well, so the scan resumes at the next aligned offset past that range.
  fn find_placement(
    &self,
    size: usize,
  ) -> Option<usize> {
    let limit = self.alignment + self.capacity;
    let mut start = self.alignment;

    loop {
      let end = start.checked_add(size)?;
      if end > limit {
        return None;
      }

      let candidate = AddressRange::new(start, end);
      match self.blocking_range(&candidate) {
        None => return Some(start),
        Some(blocker) => {
          trace!(
            "candidate {start:#x}..{end:#x} blocked by {:#x}..{:#x}",
            blocker.start,
            blocker.end
          );
          start = checked_align_to(blocker.end, self.alignment)?;
        }
      }
    }
  }
}

impl MemAlloc for RangeTrackingAllocator {
  fn allocate(
    &mut self,
    size: usize,
  ) -> usize {
    let Some(aligned) = checked_align_to(size.max(1), self.alignment) else {
      debug!("request of {size} bytes overflows when aligned");
      return NULL_ADDRESS;
    };

    // Admission only: fragmentation can still leave no room below.
    match self.bytes_used.checked_add(aligned) {
      Some(total) if total <= self.capacity => {}
      _ => {
        debug!("{aligned} bytes requested, {} of {} in use", self.bytes_used, self.capacity);
        return NULL_ADDRESS;
      }
    }

    let Some(offset) = self.find_placement(aligned) else {
      debug!("no contiguous {aligned} bytes available");
      return NULL_ADDRESS;
    };

    self.live_ranges.insert(offset, AddressRange::new(offset, offset + aligned));
    self.bytes_used += aligned;

    let address = self.base_address + offset;
    debug!("allocated {aligned} bytes at {address:#x}");

    address
  }

  fn free(
    &mut self,
    address: usize,
  ) {
    if let Err(err) = self.try_free(address) {
      debug!("ignoring free: {err}");
    }
  }

  fn capacity(&self) -> usize {
    self.capacity
  }
}

#[cfg(test)]
mod tests {
  use std::collections::HashSet;

  use super::*;

  fn assert_bookkeeping(allocator: &RangeTrackingAllocator) {
    let total: usize = allocator.live_ranges().map(|range| range.len()).sum();
    assert_eq!(total, allocator.bytes_used());

    let ranges: Vec<_> = allocator.live_ranges().collect();
    for pair in ranges.windows(2) {
      assert!(!pair[0].overlaps(&pair[1]));
    }
    assert!(ranges.iter().all(|range| range.start != 0));
  }

  #[test]
  fn test_non_null() {
    let mut allocator = RangeTrackingAllocator::new(32).unwrap();

    assert_ne!(allocator.allocate(1), NULL_ADDRESS);
  }

  #[test_log::test]
  fn test_multiple_allocations() {
    let mut allocator = RangeTrackingAllocator::new(32).unwrap();
    let mut addresses = HashSet::new();

    for _ in 0..allocator.capacity() {
      let address = allocator.allocate(1);

      assert_ne!(address, NULL_ADDRESS);
      assert!(addresses.insert(address));
    }

    assert_eq!(allocator.allocate(1), NULL_ADDRESS);
    assert_eq!(allocator.bytes_used(), 32);
    assert_bookkeeping(&allocator);
  }

  #[test]
  fn test_out_of_memory() {
    let mut allocator = RangeTrackingAllocator::new(1).unwrap();
    assert_eq!(allocator.allocate(4), NULL_ADDRESS);

    let mut allocator = RangeTrackingAllocator::with_alignment(1, 4).unwrap();
    assert_eq!(allocator.allocate(1), NULL_ADDRESS);
    assert_eq!(allocator.bytes_used(), 0);
  }

  #[test]
  fn test_allocate_with_base_address() {
    let mut allocator = RangeTrackingAllocator::with_base_address(2048, 4, 0xdead0000).unwrap();

    let address = allocator.allocate(4);

    assert!(address > 0xdead0000);
    assert!(allocator.is_allocated(address));
    assert!(!allocator.is_allocated(0xdead0000));
  }

  #[test]
  fn test_allocate_and_free() {
    let mut allocator = RangeTrackingAllocator::with_alignment(2048, 4).unwrap();

    let address = allocator.allocate(64);
    assert_ne!(address, NULL_ADDRESS);

    allocator.free(address);
    assert_eq!(allocator.bytes_used(), 0);

    assert_eq!(allocator.allocate(64), address);
  }

  #[test]
  fn test_zero_size_takes_one_alignment_unit() {
    let mut allocator = RangeTrackingAllocator::with_alignment(64, 8).unwrap();

    let first = allocator.allocate(0);
    let second = allocator.allocate(0);

    assert_eq!(first, 8);
    assert_eq!(second, 16);
    assert_eq!(allocator.bytes_used(), 16);
  }

  #[test]
  fn test_sizes_are_rounded() {
    let mut allocator = RangeTrackingAllocator::with_alignment(64, 4).unwrap();

    let first = allocator.allocate(5);
    let second = allocator.allocate(1);

    assert_eq!(first, 4);
    assert_eq!(second, 12);
    assert_eq!(allocator.bytes_used(), 12);
    assert_bookkeeping(&allocator);
  }

  #[test_log::test]
  fn test_free_unknown_address_is_noop() {
    let mut allocator = RangeTrackingAllocator::with_alignment(64, 4).unwrap();
    let first = allocator.allocate(8);

    allocator.free(first + 4);
    allocator.free(0);
    allocator.free(usize::MAX);

    assert_eq!(allocator.bytes_used(), 8);
    assert_eq!(allocator.allocate(8), first + 8);
    assert_bookkeeping(&allocator);
  }

  #[test]
  fn test_double_free_is_noop() {
    let mut allocator = RangeTrackingAllocator::with_alignment(64, 4).unwrap();
    let first = allocator.allocate(8);
    let second = allocator.allocate(8);

    allocator.free(first);
    allocator.free(first);

    assert_eq!(allocator.bytes_used(), 8);
    assert!(allocator.is_allocated(second));
  }

  #[test]
  fn test_try_free_reports_invalid_free() {
    let mut allocator = RangeTrackingAllocator::with_base_address(64, 4, 0x1000).unwrap();
    let address = allocator.allocate(4);

    assert_eq!(allocator.try_free(0x10), Err(AllocatorError::InvalidFree(0x10)));
    assert_eq!(allocator.try_free(address), Ok(()));
    assert_eq!(allocator.try_free(address), Err(AllocatorError::InvalidFree(address)));
  }

  #[test_log::test]
  fn test_fragmentation_fails_without_charging() {
    let mut allocator = RangeTrackingAllocator::with_alignment(16, 4).unwrap();
    let addresses: Vec<_> = (0..4).map(|_| allocator.allocate(4)).collect();
    assert_eq!(addresses, vec![4, 8, 12, 16]);

    allocator.free(8);
    allocator.free(16);
    assert_eq!(allocator.bytes_used(), 8);

    // Eight bytes are free in total, but not contiguously.
    assert_eq!(allocator.allocate(8), NULL_ADDRESS);
    assert_eq!(allocator.bytes_used(), 8);
    assert_eq!(allocator.bytes_free(), 8);
    assert_eq!(allocator.allocation_count(), 2);

    assert_eq!(allocator.allocate(4), 8);
    assert_bookkeeping(&allocator);
  }

  #[test]
  fn test_first_fit_fills_lowest_hole() {
    let mut allocator = RangeTrackingAllocator::with_alignment(128, 8).unwrap();
    let addresses: Vec<_> = (0..6).map(|_| allocator.allocate(16)).collect();

    allocator.free(addresses[1]);
    allocator.free(addresses[2]);
    allocator.free(addresses[4]);

    assert_eq!(allocator.allocate(24), addresses[1]);
    assert_eq!(allocator.allocate(8), addresses[2] + 8);
    assert_eq!(allocator.allocate(16), addresses[4]);
    assert_bookkeeping(&allocator);
  }

  #[test]
  fn test_huge_request_fails() {
    let mut allocator = RangeTrackingAllocator::with_alignment(64, 8).unwrap();

    assert_eq!(allocator.allocate(usize::MAX), NULL_ADDRESS);
    assert_eq!(allocator.allocate(usize::MAX - 3), NULL_ADDRESS);
    assert_eq!(allocator.bytes_used(), 0);
  }

  #[test]
  fn test_used_plus_request_overflow_fails() {
    let mut allocator = RangeTrackingAllocator::new(32).unwrap();
    let first = allocator.allocate(1);

    assert_eq!(allocator.allocate(usize::MAX), NULL_ADDRESS);
    assert_eq!(allocator.bytes_used(), 1);
    assert_eq!(allocator.allocation_count(), 1);
    assert_eq!(allocator.allocate(1), first + 1);
  }

  #[test]
  fn test_defaults() {
    let allocator = RangeTrackingAllocator::new(8).unwrap();

    assert_eq!(allocator.alignment(), crate::RANGE_DEFAULT_ALIGNMENT);
    assert_eq!(allocator.base_address(), crate::DEFAULT_BASE_ADDRESS);
  }

  #[test]
  fn test_reset() {
    let mut allocator = RangeTrackingAllocator::with_alignment(64, 8).unwrap();
    let first = allocator.allocate(8);
    allocator.allocate(8);

    allocator.reset();

    assert_eq!(allocator.bytes_used(), 0);
    assert_eq!(allocator.allocation_count(), 0);
    assert_eq!(allocator.allocate(8), first);
  }

  #[test]
  fn test_invalid_construction() {
    assert_eq!(
      RangeTrackingAllocator::with_alignment(32, 3).unwrap_err(),
      AllocatorError::InvalidAlignment(3)
    );
    assert_eq!(
      RangeTrackingAllocator::with_alignment(32, 0).unwrap_err(),
      AllocatorError::InvalidAlignment(0)
    );
    assert_eq!(RangeTrackingAllocator::new(0).unwrap_err(), AllocatorError::ZeroCapacity);
    assert!(matches!(
      RangeTrackingAllocator::with_base_address(16, 1, usize::MAX - 8),
      Err(AllocatorError::AddressOverflow { .. })
    ));
  }

  #[test]
  fn test_half_open_ranges_do_not_overlap() {
    let left = AddressRange::new(4, 8);
    let right = AddressRange::new(8, 12);
    let straddle = AddressRange::new(6, 10);

    assert!(!left.overlaps(&right));
    assert!(!right.overlaps(&left));
    assert!(straddle.overlaps(&left));
    assert!(straddle.overlaps(&right));
    assert!(left.contains(7));
    assert!(!left.contains(8));
  }

  #[test]
  fn test_adjacent_allocations_touch() {
    let mut allocator = RangeTrackingAllocator::with_alignment(64, 4).unwrap();

    let first = allocator.allocate(4);
    let second = allocator.allocate(4);

    assert_eq!(second, first + 4);
    assert_bookkeeping(&allocator);
  }

  #[test]
  fn test_distinct_under_churn() {
    let mut allocator = RangeTrackingAllocator::with_alignment(1024, 8).unwrap();
    let mut live = Vec::new();

    for round in 0..200usize {
      let size = (round * 7) % 40 + 1;
      let address = allocator.allocate(size);
      if address != NULL_ADDRESS {
        live.push(address);
      }
      if round % 3 == 0 && !live.is_empty() {
        let victim = live.remove((round * 5) % live.len());
        allocator.free(victim);
      }
      assert_bookkeeping(&allocator);
    }

    assert_eq!(live.iter().collect::<HashSet<_>>().len(), live.len());
    assert_eq!(allocator.allocation_count(), live.len());
  }
}
