//! # arenalloc - Sub-allocators for Bounded Address Ranges
//!
//! This crate provides two interchangeable allocators that place fixed-size
//! regions inside a bounded range without going through the system
//! allocator. Both implement the [`MemAlloc`] capability, so consumers can be
//! written once and pointed at either strategy.
//!
//! ## Overview
//!
//! ```text
//!   RangeTrackingAllocator (bookkeeping only):
//!
//!   base ┌───┬──────┬──────┬──────────┬──────────────────────────────┐
//!        │ 0 │  A1  │ free │    A2    │            free              │
//!        └───┴──────┴──────┴──────────┴──────────────────────────────┘
//!          ▲
//!          └── reserved: a zero address always means "no space"
//!
//!   FreeListAllocator (headers live inside a caller-owned buffer):
//!
//!   buffer ┌───┬──────┬───┬──────────┬───┬───────────────────────────┐
//!          │ H │  A1  │ H │   free   │ H │           free            │
//!          └───┴──────┴───┴──────────┴───┴───────────────────────────┘
//!                           ▲              ▲
//!                          head ── next ───┘
//! ```
//!
//! ## Crate Structure
//!
//! ```text
//!   arenalloc
//!   ├── align      - Alignment macros and helpers (align!, align_to!)
//!   ├── allocator  - MemAlloc capability and the failure sentinel
//!   ├── block      - In-band block header codec (internal)
//!   ├── error      - AllocatorError
//!   ├── free_list  - FreeListAllocator implementation
//!   └── range      - RangeTrackingAllocator implementation
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use arenalloc::{FreeListAllocator, MemAlloc, NULL_ADDRESS, RangeTrackingAllocator};
//!
//! // Carve a simulated 2 KiB device window starting at 0xdead0000.
//! let mut window = RangeTrackingAllocator::with_base_address(2048, 4, 0xdead0000).unwrap();
//! let register_block = window.allocate(64);
//! assert!(register_block > 0xdead0000);
//! window.free(register_block);
//! assert_eq!(window.allocate(64), register_block);
//!
//! // Partition a buffer we own.
//! let mut buffer = vec![0u8; 1024];
//! let mut heap = FreeListAllocator::new(&mut buffer).unwrap();
//! let node = heap.allocate(48);
//! assert_ne!(node, NULL_ADDRESS);
//! heap.block_mut(node).unwrap().fill(0);
//! heap.free(node);
//! ```
//!
//! ## How It Works
//!
//! [`RangeTrackingAllocator`] keeps an ordered set of live `[start, end)`
//! intervals. A request is rounded up to the alignment, admitted if the
//! running total still fits the capacity, then placed at the lowest aligned
//! offset that overlaps nothing.
//!
//! [`FreeListAllocator`] writes a header in front of every block:
//!
//! ```text
//!   Single Allocation:
//!   ┌───────────────────────┬────────────────────────────────┐
//!   │    Block Header       │         User Data              │
//!   │  ┌─────────────────┐  │                                │
//!   │  │ next: chain/end │  │  ┌──────────────────────────┐  │
//!   │  │ size: N         │  │  │     N bytes usable       │  │
//!   │  └─────────────────┘  │  └──────────────────────────┘  │
//!   │   2 machine words     │                                │
//!   └───────────────────────┴────────────────────────────────┘
//!                           ▲
//!                           └── Address returned to user
//! ```
//!
//! Free blocks are linked in address order. Allocation splits the first
//! block that fits; freeing splices the block back and merges neighbours
//! that touch it. If nothing fits, the whole chain is coalesced once before
//! giving up.
//!
//! ## Limitations
//!
//! - **Single-threaded only**: No synchronization primitives
//! - **Caller-owned memory**: `FreeListAllocator` never acquires or releases
//!   its buffer
//! - **No compaction**: Only adjacent free blocks are merged
//!
//! ## Failure Reporting
//!
//! `allocate` returns [`NULL_ADDRESS`] when a request cannot be placed and
//! never mutates state in that case. `free` of an unknown address is ignored
//! and logged; `try_allocate` and `try_free` surface the same conditions as
//! [`AllocatorError`] values.

pub mod align;
mod allocator;
mod block;
mod error;
mod free_list;
mod range;

pub use allocator::{MemAlloc, NULL_ADDRESS};
pub use block::{BlockHeader, HEADER_SIZE};
pub use error::{AllocatorError, Result};
pub use free_list::{
  DEFAULT_ALIGNMENT as FREE_LIST_DEFAULT_ALIGNMENT, FreeBlocks, FreeListAllocator, MIN_BUFFER_SIZE,
};
pub use range::{
  AddressRange, DEFAULT_ALIGNMENT as RANGE_DEFAULT_ALIGNMENT, DEFAULT_BASE_ADDRESS,
  RangeTrackingAllocator,
};
