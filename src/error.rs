use thiserror::Error;

/// Recoverable allocation failures.
///
/// These are ordinary outcomes: a full scratch buffer, an exhausted arena or
/// a request with a nonsensical alignment. Broken invariants go through
/// [`assume!`](crate::assume) instead and never reach this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AllocError {
  #[error("out of memory: cannot allocate {size} bytes aligned to {align}")]
  OutOfMemory { size: usize, align: usize },

  #[error("invalid alignment {align}: must be a power of two")]
  InvalidAlignment { align: usize },

  #[error("allocation of {size} bytes aligned to {align} overflows the address space")]
  SizeOverflow { size: usize, align: usize },

  /// The scratch buffer could not hold the request and no backing
  /// allocator was configured to take it instead.
  #[error("scratch buffer cannot hold {size} bytes and there is no backing allocator")]
  NoBackingAllocator { size: usize },
}

pub type AllocResult<T> = Result<T, AllocError>;

impl AllocError {
  /// True for failures caused by lack of space rather than a bad request.
  pub fn is_exhaustion(&self) -> bool {
    matches!(
      self,
      AllocError::OutOfMemory { .. } | AllocError::NoBackingAllocator { .. }
    )
  }
}
