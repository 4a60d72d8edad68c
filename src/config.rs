//! Sizes and tunables shared by the allocators.

/// Buffer size a scratch allocator acquires when none is given (2 MiB).
pub const SCRATCH_DEFAULT_BUFFER_SIZE: usize = 2 * 1024 * 1024;

/// Buffers smaller than this are not worth managing; the scratch allocator
/// forwards everything to its backer instead.
pub const SCRATCH_MIN_BUFFER_SIZE: usize = 128;

/// Region size a heap arena maps for itself when none is given (1 MiB).
pub const HEAP_DEFAULT_REGION_SIZE: usize = 1024 * 1024;

/// Granularity of block headers and of every scratch allocation.
pub const MIN_ALIGNMENT: usize = core::mem::size_of::<u32>();

/// Largest span a single block header can describe (31 bits).
pub const MAX_BLOCK_SIZE: usize = (1 << 31) - 1;

/// Largest buffer a scratch allocator manages: the header range, rounded
/// down to whole words.
pub const MAX_BUFFER_SIZE: usize = MAX_BLOCK_SIZE & !(MIN_ALIGNMENT - 1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScratchConfig {
  /// Bytes to acquire from the backer. 0 selects the default. Buffers
  /// supplied by the caller are managed whole and ignore this.
  pub buffer_size: usize,
  pub min_buffer_size: usize,
}

impl Default for ScratchConfig {
  fn default() -> Self {
    Self {
      buffer_size: SCRATCH_DEFAULT_BUFFER_SIZE,
      min_buffer_size: SCRATCH_MIN_BUFFER_SIZE,
    }
  }
}

impl ScratchConfig {
  pub fn with_buffer_size(
    mut self,
    buffer_size: usize,
  ) -> Self {
    self.buffer_size = buffer_size;
    self
  }

  pub fn with_min_buffer_size(
    mut self,
    min_buffer_size: usize,
  ) -> Self {
    self.min_buffer_size = min_buffer_size;
    self
  }

  /// Buffer size after applying the default and the header size limit.
  pub fn effective_buffer_size(&self) -> usize {
    let size = if self.buffer_size == 0 {
      SCRATCH_DEFAULT_BUFFER_SIZE
    } else {
      self.buffer_size
    };
    size.min(MAX_BUFFER_SIZE)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapArenaConfig {
  /// Bytes to map when the caller does not supply a region. 0 selects the
  /// default.
  pub region_size: usize,
}

impl Default for HeapArenaConfig {
  fn default() -> Self {
    Self {
      region_size: HEAP_DEFAULT_REGION_SIZE,
    }
  }
}

impl HeapArenaConfig {
  pub fn with_region_size(
    mut self,
    region_size: usize,
  ) -> Self {
    self.region_size = region_size;
    self
  }

  pub fn effective_region_size(&self) -> usize {
    if self.region_size == 0 {
      HEAP_DEFAULT_REGION_SIZE
    } else {
      self.region_size
    }
  }
}
