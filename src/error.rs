use std::{error::Error, fmt};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllocatorError {
  /// Alignment was zero or not a power of two.
  InvalidAlignment(usize),
  ZeroCapacity,
  /// Base address plus capacity does not fit in the address width.
  AddressOverflow { base_address: usize, capacity: usize },
  BufferTooSmall { size: usize, required: usize },
  /// No placement exists for a request of this many bytes.
  OutOfSpace { requested: usize },
  /// The address was never issued by this allocator, or was already freed.
  InvalidFree(usize),
  /// A block header would lie outside the managed buffer.
  CorruptHeader(usize),
}

impl fmt::Display for AllocatorError {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    match self {
      Self::InvalidAlignment(alignment) => {
        write!(f, "alignment {alignment} is not a non-zero power of two")
      }
      Self::ZeroCapacity => write!(f, "allocator capacity must be non-zero"),
      Self::AddressOverflow { base_address, capacity } => {
        write!(f, "{capacity} bytes above {base_address:#x} overflow the address space")
      }
      Self::BufferTooSmall { size, required } => {
        write!(f, "buffer of {size} bytes is too small, need at least {required}")
      }
      Self::OutOfSpace { requested } => write!(f, "no space left for {requested} bytes"),
      Self::InvalidFree(address) => write!(f, "address {address:#x} is not a live allocation"),
      Self::CorruptHeader(offset) => {
        write!(f, "block header at offset {offset:#x} is out of bounds")
      }
    }
  }
}

impl Error for AllocatorError {}

pub type Result<T> = std::result::Result<T, AllocatorError>;
