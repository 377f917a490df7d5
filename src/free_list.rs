use std::{mem, slice};

use log::{debug, trace, warn};

use crate::{
  align::{checked_align_to, is_valid_alignment},
  allocator::{MemAlloc, NULL_ADDRESS},
  block::{BlockHeader, HEADER_SIZE},
  error::{AllocatorError, Result},
};

pub const DEFAULT_ALIGNMENT: usize = mem::size_of::<usize>();

/// Smallest buffer that can hold one header and one byte of payload.
pub const MIN_BUFFER_SIZE: usize = HEADER_SIZE + 1;

/// Sequential-fit allocator over a caller-owned byte buffer.
///
/// Every block starts with a [`BlockHeader`]. Free blocks are chained in
/// ascending address order through the `next` field of their headers, so the
/// whole bookkeeping lives inside the buffer itself:
///
/// ```text
///   head
///    │
///    ▼
///   ┌────┬──────┬────┬──────────┬────┬──────┬────┬─────────────────┐
///   │ H  │ free │ H  │  in use  │ H  │ free │ H  │     in use      │
///   └────┴──────┴────┴──────────┴────┴──────┴────┴─────────────────┘
///    │                            ▲
///    └──────────── next ──────────┘
/// ```
///
/// Allocation walks the chain first-fit and splits the chosen block, leaving
/// the remainder on the chain in the same position. Freeing splices the block
/// back in address order and merges it with touching neighbours.
///
/// Issued addresses are `buffer.as_ptr() + header offset + HEADER_SIZE`.
/// Only request sizes are rounded to `alignment`: payloads start on an
/// `alignment` boundary when the buffer itself is aligned to it and
/// `alignment` divides [`HEADER_SIZE`], otherwise they carry the buffer's
/// misalignment.
#[derive(Debug)]
pub struct FreeListAllocator<'a> {
  buffer: &'a mut [u8],
  alignment: usize,
  head: Option<usize>,
}

impl<'a> FreeListAllocator<'a> {
  pub fn new(buffer: &'a mut [u8]) -> Result<Self> {
    Self::with_alignment(buffer, DEFAULT_ALIGNMENT)
  }

  /// Takes over `buffer` as a single free block.
  ///
  /// # Errors
  ///
  /// Fails when `alignment` is not a power of two or the buffer is shorter
  /// than [`MIN_BUFFER_SIZE`].
  pub fn with_alignment(
    buffer: &'a mut [u8],
    alignment: usize,
  ) -> Result<Self> {
    if !is_valid_alignment(alignment) {
      return Err(AllocatorError::InvalidAlignment(alignment));
    }

    if buffer.len() < MIN_BUFFER_SIZE {
      return Err(AllocatorError::BufferTooSmall {
        size: buffer.len(),
        required: MIN_BUFFER_SIZE,
      });
    }

    let size = buffer.len() - HEADER_SIZE;
    BlockHeader::new(size, None).write(buffer, 0)?;

    debug!("managing {} bytes at {:p}, {} usable", buffer.len(), buffer.as_ptr(), size);

    Ok(Self {
      buffer,
      alignment,
      head: Some(0),
    })
  }

  /// Builds an allocator over memory acquired outside of Rust, e.g. `sbrk`.
  ///
  /// # Safety
  ///
  /// `ptr` must be valid for reads and writes of `len` bytes for the whole of
  /// `'a`, and nothing else may access that memory while the allocator lives.
  pub unsafe fn from_raw_parts(
    ptr: *mut u8,
    len: usize,
    alignment: usize,
  ) -> Result<Self> {
    if ptr.is_null() {
      return Err(AllocatorError::BufferTooSmall {
        size: 0,
        required: MIN_BUFFER_SIZE,
      });
    }

    let buffer = unsafe { slice::from_raw_parts_mut(ptr, len) };

    Self::with_alignment(buffer, alignment)
  }

  pub fn alignment(&self) -> usize {
    self.alignment
  }

  /// Free blocks in chain order, as `(header offset, usable size)` pairs.
  pub fn free_blocks(&self) -> FreeBlocks<'_> {
    FreeBlocks {
      buffer: &*self.buffer,
      cursor: self.head,
    }
  }

  /// Usable bytes on the free chain. Headers are not counted.
  pub fn free_bytes(&self) -> usize {
    self.free_blocks().map(|(_, size)| size).sum()
  }

  pub fn largest_free_block(&self) -> usize {
    self.free_blocks().map(|(_, size)| size).max().unwrap_or(0)
  }

  /// Payload of the live allocation at `address`.
  pub fn block_mut(
    &mut self,
    address: usize,
  ) -> Result<&mut [u8]> {
    let offset = self.header_offset(address)?;
    self.find_block(offset).map_err(|_| AllocatorError::InvalidFree(address))?;

    let block = BlockHeader::read(self.buffer, offset)?;
    let end = BlockHeader::end_of(offset, block.size)
      .ok_or(AllocatorError::InvalidFree(address))?;
    self
      .buffer
      .get_mut(offset + HEADER_SIZE..end)
      .ok_or(AllocatorError::InvalidFree(address))
  }

  /// Merges every run of address-contiguous free blocks and returns how many
  /// headers were absorbed.
  pub fn coalesce(&mut self) -> usize {
    match self.merge_adjacent() {
      Ok(merged) => merged,
      Err(err) => {
        warn!("coalesce aborted: {err}");
        0
      }
    }
  }

  /// Frees `address`, reporting addresses that are not a live block.
  ///
  /// Headers tile the buffer, so `address` is accepted only when walking
  /// them from the start lands exactly on its header and that block is not
  /// already on the free chain.
  pub fn try_free(
    &mut self,
    address: usize,
  ) -> Result<()> {
    let offset = self.header_offset(address)?;
    self.find_block(offset).map_err(|_| AllocatorError::InvalidFree(address))?;

    let mut block = BlockHeader::read(self.buffer, offset)?;
    let end = BlockHeader::end_of(offset, block.size)
      .ok_or(AllocatorError::CorruptHeader(offset))?;

    let mut prev = None;
    let mut cursor = self.head;
    while let Some(current) = cursor {
      if current >= offset {
        break;
      }
      prev = cursor;
      cursor = BlockHeader::read(self.buffer, current)?.next;
    }

    if cursor == Some(offset) {
      return Err(AllocatorError::InvalidFree(address));
    }

    let touches_prev = match prev {
      Some(prev) => {
        let prev_block = BlockHeader::read(self.buffer, prev)?;
        BlockHeader::end_of(prev, prev_block.size) == Some(offset)
      }
      None => false,
    };
    let touches_next = cursor == Some(end);

    block.next = cursor;
    block.write(self.buffer, offset)?;
    self.relink(prev, Some(offset))?;

    debug!("freed {} bytes at offset {offset:#x}", block.size);

    if touches_prev || touches_next {
      self.merge_adjacent()?;
    }

    Ok(())
  }

  /// Walks the headers from the start of the buffer until one starts at or
  /// past `offset`, failing unless it starts exactly there.
  fn find_block(
    &self,
    offset: usize,
  ) -> Result<()> {
    let mut cursor = 0;

    while cursor < offset {
      let block = BlockHeader::read(self.buffer, cursor)?;
      cursor = BlockHeader::end_of(cursor, block.size)
        .filter(|end| *end <= self.buffer.len())
        .ok_or(AllocatorError::CorruptHeader(cursor))?;
    }

    if cursor == offset {
      Ok(())
    } else {
      Err(AllocatorError::CorruptHeader(offset))
    }
  }

  fn base(&self) -> usize {
    self.buffer.as_ptr() as usize
  }

  fn header_offset(
    &self,
    address: usize,
  ) -> Result<usize> {
    address
      .checked_sub(self.base())
      .and_then(|offset| offset.checked_sub(HEADER_SIZE))
      .filter(|offset| offset + HEADER_SIZE < self.buffer.len())
      .ok_or(AllocatorError::InvalidFree(address))
  }

  /// Points `prev` (or the head when `prev` is `None`) at `next`.
  fn relink(
    &mut self,
    prev: Option<usize>,
    next: Option<usize>,
  ) -> Result<()> {
    match prev {
      None => self.head = next,
      Some(prev) => {
        let mut block = BlockHeader::read(self.buffer, prev)?;
        block.next = next;
        block.write(self.buffer, prev)?;
      }
    }

    Ok(())
  }

  /// First-fit scan; returns the header offset of the carved block.
  fn carve(
    &mut self,
    size: usize,
  ) -> Result<Option<usize>> {
    let mut prev = None;
    let mut cursor = self.head;

    while let Some(offset) = cursor {
      let block = BlockHeader::read(self.buffer, offset)?;

      if block.size >= size {
        self.split(prev, offset, block, size)?;
        return Ok(Some(offset));
      }

      trace!("block at {offset:#x} holds {} < {size} bytes", block.size);
      prev = cursor;
      cursor = block.next;
    }

    Ok(None)
  }

  /// Takes `size` bytes from the front of the free block at `offset`.
  ///
  /// The remainder keeps the block's place on the chain. When it could not
  /// host a header and at least one byte, the block is handed out whole.
  fn split(
    &mut self,
    prev: Option<usize>,
    offset: usize,
    block: BlockHeader,
    size: usize,
  ) -> Result<()> {
    let replacement = if block.size - size > HEADER_SIZE {
      let tail = offset + HEADER_SIZE + size;
      let tail_size = block.size - size - HEADER_SIZE;

      BlockHeader::new(tail_size, block.next).write(self.buffer, tail)?;
      BlockHeader::new(size, None).write(self.buffer, offset)?;

      debug!("split block at {offset:#x}: {size} bytes taken, {tail_size} left at {tail:#x}");
      Some(tail)
    } else {
      BlockHeader::new(block.size, None).write(self.buffer, offset)?;

      debug!("handing out whole block at {offset:#x} ({} bytes for {size})", block.size);
      block.next
    };

    self.relink(prev, replacement)
  }

  fn merge_adjacent(&mut self) -> Result<usize> {
    let mut merged = 0;
    let mut cursor = self.head;

    while let Some(offset) = cursor {
      let mut block = BlockHeader::read(self.buffer, offset)?;

      match block.next {
        Some(next) if Some(next) == BlockHeader::end_of(offset, block.size) => {
          let neighbour = BlockHeader::read(self.buffer, next)?;

          block.size += HEADER_SIZE + neighbour.size;
          block.next = neighbour.next;
          block.write(self.buffer, offset)?;

          trace!("merged block at {next:#x} into {offset:#x}");
          merged += 1;
        }
        _ => cursor = block.next,
      }
    }

    if merged > 0 {
      debug!("coalesced {merged} free blocks");
    }

    Ok(merged)
  }
}

impl MemAlloc for FreeListAllocator<'_> {
  fn allocate(
    &mut self,
    size: usize,
  ) -> usize {
    let Some(aligned) = checked_align_to(size.max(1), self.alignment) else {
      debug!("request of {size} bytes overflows when aligned");
      return NULL_ADDRESS;
    };

    let carved = match self.carve(aligned) {
      Ok(None) => {
        debug!("no free block holds {aligned} bytes, coalescing");
        self.merge_adjacent().and_then(|_| self.carve(aligned))
      }
      carved => carved,
    };

    match carved {
      Ok(Some(offset)) => self.base() + offset + HEADER_SIZE,
      Ok(None) => {
        debug!("out of space for {aligned} bytes");
        NULL_ADDRESS
      }
      Err(err) => {
        warn!("allocation of {aligned} bytes aborted: {err}");
        NULL_ADDRESS
      }
    }
  }

  fn free(
    &mut self,
    address: usize,
  ) {
    if let Err(err) = self.try_free(address) {
      warn!("ignoring free: {err}");
    }
  }

  fn capacity(&self) -> usize {
    self.buffer.len()
  }
}

/// Iterator over the free chain of a [`FreeListAllocator`].
pub struct FreeBlocks<'b> {
  buffer: &'b [u8],
  cursor: Option<usize>,
}

impl Iterator for FreeBlocks<'_> {
  type Item = (usize, usize);

  fn next(&mut self) -> Option<Self::Item> {
    let offset = self.cursor?;

    match BlockHeader::read(self.buffer, offset) {
      Ok(block) => {
        self.cursor = block.next;
        Some((offset, block.size))
      }
      Err(err) => {
        warn!("free chain broken: {err}");
        self.cursor = None;
        None
      }
    }
  }
}
