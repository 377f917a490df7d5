use std::mem;

use crate::error::{AllocatorError, Result};

const WORD_SIZE: usize = mem::size_of::<usize>();

/// Bytes occupied by a [`BlockHeader`] inside the buffer.
pub const HEADER_SIZE: usize = 2 * WORD_SIZE;

/// Encoded `next` value marking the end of the free chain.
const END_OF_CHAIN: usize = usize::MAX;

/// Metadata stored in-place at the start of every block, free or allocated.
///
/// ```text
///   offset          offset + WORD_SIZE      offset + HEADER_SIZE
///   ┌───────────────┬───────────────────────┬──────────────────────┐
///   │ next (offset) │ size (usable bytes)   │       payload        │
///   └───────────────┴───────────────────────┴──────────────────────┘
/// ```
///
/// Both fields are native-endian words; `next` is only meaningful while the
/// block sits on the free chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
  pub next: Option<usize>,
  pub size: usize,
}

impl BlockHeader {
  pub fn new(
    size: usize,
    next: Option<usize>,
  ) -> Self {
    Self { next, size }
  }

  pub fn read(
    buffer: &[u8],
    offset: usize,
  ) -> Result<Self> {
    let bytes = Self::slot(buffer, offset)?;
    let (next, size) = bytes.split_at(WORD_SIZE);

    let next = Self::decode(next, offset)?;
    let size = Self::decode(size, offset)?;

    Ok(Self {
      next: (next != END_OF_CHAIN).then_some(next),
      size,
    })
  }

  pub fn write(
    &self,
    buffer: &mut [u8],
    offset: usize,
  ) -> Result<()> {
    let end = Self::end_of(offset, self.size).ok_or(AllocatorError::CorruptHeader(offset))?;
    if end > buffer.len() {
      return Err(AllocatorError::CorruptHeader(offset));
    }

    let bytes = Self::slot_mut(buffer, offset)?;
    let (next, size) = bytes.split_at_mut(WORD_SIZE);

    next.copy_from_slice(&self.next.unwrap_or(END_OF_CHAIN).to_ne_bytes());
    size.copy_from_slice(&self.size.to_ne_bytes());

    Ok(())
  }

  /// Offset one past the payload of a block whose header sits at `offset`.
  pub fn end_of(
    offset: usize,
    size: usize,
  ) -> Option<usize> {
    offset.checked_add(HEADER_SIZE)?.checked_add(size)
  }

  fn slot(
    buffer: &[u8],
    offset: usize,
  ) -> Result<&[u8]> {
    offset
      .checked_add(HEADER_SIZE)
      .and_then(|end| buffer.get(offset..end))
      .ok_or(AllocatorError::CorruptHeader(offset))
  }

  fn slot_mut(
    buffer: &mut [u8],
    offset: usize,
  ) -> Result<&mut [u8]> {
    offset
      .checked_add(HEADER_SIZE)
      .and_then(|end| buffer.get_mut(offset..end))
      .ok_or(AllocatorError::CorruptHeader(offset))
  }

  fn decode(
    word: &[u8],
    offset: usize,
  ) -> Result<usize> {
    word
      .try_into()
      .map(usize::from_ne_bytes)
      .map_err(|_| AllocatorError::CorruptHeader(offset))
  }
}
