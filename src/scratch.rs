use std::{cell::Cell, marker::PhantomData, ptr::NonNull};

use crate::{
  align::checked_align_up,
  allocator::{Allocator, check_alignment},
  assume,
  config::{MAX_BUFFER_SIZE, MIN_ALIGNMENT, ScratchConfig},
  error::{AllocError, AllocResult},
  header::{BlockHeader, HEADER_SIZE, find_header, write_header},
};

/// A ring of variable-size blocks over one fixed buffer.
///
/// Blocks are carved at `alloc_at` and reclaimed, strictly oldest first, at
/// `free_at`. The bytes in `[free_at, alloc_at)`, read circularly, are in
/// use; everything else is free. `alloc_at == free_at` means the ring is
/// empty, so an allocation is never allowed to make the two meet.
///
/// When a request does not fit in the ring it is passed to the backing
/// allocator, if there is one. Frees of pointers outside the ring go there
/// too.
pub struct ScratchAllocator<'a> {
  backer: Option<&'a dyn Allocator>,
  start: Option<NonNull<u8>>,
  capacity: usize,
  owns_buffer: bool,
  /// Offset of the next header.
  alloc_at: Cell<usize>,
  /// Offset of the oldest block not yet reclaimed.
  free_at: Cell<usize>,
  _buffer: PhantomData<&'a mut [u8]>,
}

/// Where a new block would go.
struct Placement {
  at: usize,
  data: usize,
  end: usize,
  /// Set when the block wrapped; the old `alloc_at` becomes a free tail.
  tail: Option<usize>,
}

impl<'a> ScratchAllocator<'a> {
  /// Acquires a buffer of the default size from `backer`.
  pub fn new(backer: Option<&'a dyn Allocator>) -> Self {
    Self::with_config(ScratchConfig::default(), backer)
  }

  /// Acquires a buffer of `config.buffer_size` bytes from `backer`. Without a
  /// backer there is nothing to acquire from and the allocator starts with no
  /// local buffer.
  pub fn with_config(
    config: ScratchConfig,
    backer: Option<&'a dyn Allocator>,
  ) -> Self {
    let size = config.effective_buffer_size();

    let buffer = match backer {
      Some(backer) if size >= config.min_buffer_size => {
        match backer.allocate(size, MIN_ALIGNMENT) {
          Ok(ptr) => Some(ptr),
          Err(err) => {
            tracing::warn!(size, %err, "backer refused scratch buffer");
            None
          }
        }
      }
      _ => None,
    };

    match buffer {
      Some(ptr) => Self::from_raw(ptr, size, true, backer),
      None => Self::unbuffered(backer),
    }
  }

  /// Manages all of `buffer`, which is never freed by the allocator.
  pub fn with_buffer(
    buffer: &'a mut [u8],
    backer: Option<&'a dyn Allocator>,
  ) -> Self {
    Self::with_buffer_and_config(buffer, ScratchConfig::default(), backer)
  }

  /// Like [`ScratchAllocator::with_buffer`]. Only `config.min_buffer_size`
  /// applies; the buffer's own length sets the capacity.
  pub fn with_buffer_and_config(
    buffer: &'a mut [u8],
    config: ScratchConfig,
    backer: Option<&'a dyn Allocator>,
  ) -> Self {
    // Headers are u32 words; use the word-aligned interior of the slice.
    let skip = buffer.as_ptr().align_offset(MIN_ALIGNMENT).min(buffer.len());
    let buffer = &mut buffer[skip..];
    let size = (buffer.len() & !(MIN_ALIGNMENT - 1)).min(MAX_BUFFER_SIZE);

    if size < config.min_buffer_size {
      tracing::warn!(size, min = config.min_buffer_size, "scratch buffer too small");
      return Self::unbuffered(backer);
    }

    Self::from_raw(NonNull::from(buffer).cast(), size, false, backer)
  }

  fn from_raw(
    start: NonNull<u8>,
    capacity: usize,
    owns_buffer: bool,
    backer: Option<&'a dyn Allocator>,
  ) -> Self {
    unsafe {
      write_header(
        start.as_ptr(),
        start.as_ptr().add(HEADER_SIZE),
        BlockHeader::new(capacity, true),
      );
    }

    tracing::debug!(
      capacity,
      owns_buffer,
      has_backer = backer.is_some(),
      "scratch allocator created"
    );

    Self {
      backer,
      start: Some(start),
      capacity,
      owns_buffer,
      alloc_at: Cell::new(0),
      free_at: Cell::new(0),
      _buffer: PhantomData,
    }
  }

  fn unbuffered(backer: Option<&'a dyn Allocator>) -> Self {
    tracing::warn!(
      has_backer = backer.is_some(),
      "scratch allocator has no local buffer, forwarding everything"
    );

    Self {
      backer,
      start: None,
      capacity: 0,
      owns_buffer: false,
      alloc_at: Cell::new(0),
      free_at: Cell::new(0),
      _buffer: PhantomData,
    }
  }

  pub fn capacity(&self) -> usize {
    self.capacity
  }

  pub fn has_buffer(&self) -> bool {
    self.start.is_some()
  }

  pub fn owns_buffer(&self) -> bool {
    self.owns_buffer
  }

  pub fn alloc_cursor(&self) -> usize {
    self.alloc_at.get()
  }

  pub fn free_cursor(&self) -> usize {
    self.free_at.get()
  }

  pub fn is_empty(&self) -> bool {
    self.alloc_at.get() == self.free_at.get()
  }

  /// Bytes between the cursors, including freed blocks that are still
  /// waiting behind an older live one.
  pub fn in_use_bytes(&self) -> usize {
    let (alloc_at, free_at) = (self.alloc_at.get(), self.free_at.get());
    if alloc_at >= free_at {
      alloc_at - free_at
    } else {
      self.capacity - free_at + alloc_at
    }
  }

  /// True if `ptr` points into the local buffer.
  pub fn contains(
    &self,
    ptr: *const u8,
  ) -> bool {
    self.start.is_some_and(|start| {
      let start = start.as_ptr() as usize;
      let address = ptr as usize;
      address >= start && address < start + self.capacity
    })
  }

  /// Computes the data and end offsets of a block whose header sits at `at`.
  fn place(
    start: NonNull<u8>,
    at: usize,
    size: usize,
    alignment: usize,
  ) -> Option<(usize, usize)> {
    let base = start.as_ptr() as usize;
    let data = checked_align_up(base + at + HEADER_SIZE, alignment)? - base;
    Some((data, data.checked_add(size)?))
  }

  fn find_placement(
    &self,
    start: NonNull<u8>,
    size: usize,
    alignment: usize,
  ) -> Option<Placement> {
    let (alloc_at, free_at) = (self.alloc_at.get(), self.free_at.get());

    if alloc_at == free_at {
      let (data, end) = Self::place(start, 0, size, alignment)?;
      return (end <= self.capacity).then_some(Placement {
        at: 0,
        data,
        end,
        tail: None,
      });
    }

    if free_at < alloc_at {
      if let Some((data, end)) = Self::place(start, alloc_at, size, alignment) {
        if end <= self.capacity {
          return Some(Placement {
            at: alloc_at,
            data,
            end,
            tail: None,
          });
        }
      }

      // Wrap: the block must end strictly before the oldest live block.
      let (data, end) = Self::place(start, 0, size, alignment)?;
      return (end < free_at).then_some(Placement {
        at: 0,
        data,
        end,
        tail: Some(alloc_at),
      });
    }

    // The free space is the gap [alloc_at, free_at); both ends of the block
    // have to land inside it.
    let (data, end) = Self::place(start, alloc_at, size, alignment)?;
    (end < free_at).then_some(Placement {
      at: alloc_at,
      data,
      end,
      tail: None,
    })
  }

  fn allocate_from_buffer(
    &self,
    size: usize,
    alignment: usize,
  ) -> Option<NonNull<u8>> {
    let start = self.start?;

    let size = checked_align_up(size.max(1), MIN_ALIGNMENT)?;
    let alignment = alignment.max(MIN_ALIGNMENT);

    let placement = self.find_placement(start, size, alignment)?;
    let base = start.as_ptr();

    unsafe {
      if let Some(tail) = placement.tail.filter(|&tail| tail < self.capacity) {
        write_header(
          base.add(tail),
          base.add(tail + HEADER_SIZE),
          BlockHeader::new(self.capacity - tail, true),
        );
      }

      write_header(
        base.add(placement.at),
        base.add(placement.data),
        BlockHeader::new(placement.end - placement.at, false),
      );
    }

    if self.is_empty() {
      self.free_at.set(0);
    }
    self.alloc_at.set(placement.end);

    tracing::trace!(
      at = placement.at,
      data = placement.data,
      end = placement.end,
      wrapped = placement.tail.is_some(),
      free_at = self.free_at.get(),
      "scratch block allocated"
    );

    NonNull::new(unsafe { base.add(placement.data) })
  }

  /// Advances `free_at` over consecutive freed blocks.
  fn reclaim(
    &self,
    start: NonNull<u8>,
  ) {
    let alloc_at = self.alloc_at.get();
    let mut free_at = self.free_at.get();

    while free_at != alloc_at {
      if free_at >= self.capacity {
        free_at = 0;
        continue;
      }

      let header = BlockHeader::from_word(unsafe { (start.as_ptr().add(free_at) as *mut u32).read() });
      if !header.is_free() {
        break;
      }
      free_at += header.size();
    }

    if free_at == alloc_at {
      // Nothing live: restart at the front so the whole buffer is one run.
      self.alloc_at.set(0);
      self.free_at.set(0);
    } else {
      self.free_at.set(free_at);
    }
  }
}

impl Allocator for ScratchAllocator<'_> {
  fn allocate(
    &self,
    size: usize,
    alignment: usize,
  ) -> AllocResult<NonNull<u8>> {
    check_alignment(alignment)?;

    if let Some(ptr) = self.allocate_from_buffer(size, alignment) {
      return Ok(ptr);
    }

    match self.backer {
      Some(backer) => {
        tracing::debug!(size, alignment, "scratch buffer full, using backer");
        backer.allocate(size, alignment)
      }
      None => Err(AllocError::NoBackingAllocator { size }),
    }
  }

  unsafe fn free(
    &self,
    ptr: NonNull<u8>,
  ) {
    let start = match self.start {
      Some(start) if self.contains(ptr.as_ptr()) => start,
      _ => {
        assume!(
          self.backer.is_some(),
          "pointer {:p} is outside the scratch buffer and there is no backer",
          ptr
        );
        if let Some(backer) = self.backer {
          unsafe { backer.free(ptr) };
        }
        return;
      }
    };

    unsafe {
      let header = find_header(start.as_ptr(), ptr.as_ptr());
      let block = BlockHeader::from_word(header.read());
      assume!(!block.is_free(), "double free of {:p}", ptr);
      header.write(block.freed().word());
    }

    self.reclaim(start);

    tracing::trace!(
      alloc_at = self.alloc_at.get(),
      free_at = self.free_at.get(),
      "scratch block freed"
    );
  }
}

impl Drop for ScratchAllocator<'_> {
  fn drop(&mut self) {
    if let (true, Some(start), Some(backer)) = (self.owns_buffer, self.start, self.backer) {
      unsafe { backer.free(start) };
    }
  }
}

/// Builds a scratch allocator over the first `size` bytes of `buffer` (all of
/// it when `size` is 0), or over `size` bytes (0 for the default) taken from
/// `backer` when no buffer is given.
pub fn create_scratch_allocator<'a>(
  buffer: Option<&'a mut [u8]>,
  size: usize,
  backer: Option<&'a dyn Allocator>,
) -> ScratchAllocator<'a> {
  match buffer {
    Some(buffer) if size == 0 => ScratchAllocator::with_buffer(buffer, backer),
    Some(buffer) => {
      let len = size.min(buffer.len());
      ScratchAllocator::with_buffer(&mut buffer[..len], backer)
    }
    None => ScratchAllocator::with_config(ScratchConfig::default().with_buffer_size(size), backer),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    config::{SCRATCH_DEFAULT_BUFFER_SIZE, SCRATCH_MIN_BUFFER_SIZE},
    system::SystemAllocator,
  };

  #[repr(align(16))]
  struct Aligned<const N: usize>([u8; N]);

  impl<const N: usize> Aligned<N> {
    fn new() -> Self {
      Self([0; N])
    }
  }

  #[test]
  fn test_blocks_are_packed_back_to_back() {
    let mut buffer = Aligned::<512>::new();
    let allocator = ScratchAllocator::with_buffer(&mut buffer.0, None);
    let start = buffer_start(&allocator);

    // Header at 0, data rounded up from 4 to 8, block ends at 32.
    let wide = allocator.allocate(24, 8).unwrap();
    assert_eq!(wide.as_ptr() as usize - start, 8);
    assert_eq!(allocator.alloc_cursor(), 32);

    // 10 bytes round to 12; the next header sits right at 32.
    let narrow = allocator.allocate(10, 4).unwrap();
    assert_eq!(narrow.as_ptr() as usize - start, 36);
    assert_eq!(allocator.alloc_cursor(), 48);

    unsafe {
      wide.as_ptr().write_bytes(0xA5, 24);
      narrow.as_ptr().write_bytes(0x5A, 10);
      assert!((0..24).all(|i| *wide.as_ptr().add(i) == 0xA5));

      allocator.free(wide);
      assert_eq!(allocator.free_cursor(), 32);
      allocator.free(narrow);
    }
    assert!(allocator.is_empty());
  }

  fn buffer_start(allocator: &ScratchAllocator<'_>) -> usize {
    allocator.start.map_or(0, |start| start.as_ptr() as usize)
  }

  #[test]
  fn test_external_buffer_managed_whole() {
    let len = 3 * SCRATCH_DEFAULT_BUFFER_SIZE;
    let mut buffer = vec![0u8; len];
    let allocator = ScratchAllocator::with_buffer(&mut buffer, None);
    assert_eq!(allocator.capacity(), len);

    let big = allocator.allocate(2 * SCRATCH_DEFAULT_BUFFER_SIZE, 8).unwrap();
    assert!(allocator.contains(big.as_ptr()));
    unsafe { allocator.free(big) };
    assert!(allocator.is_empty());
  }

  #[test]
  fn test_config_buffer_size_ignored_for_external_buffer() {
    let mut buffer = Aligned::<4096>::new();
    let config = ScratchConfig::default().with_buffer_size(256);
    let allocator = ScratchAllocator::with_buffer_and_config(&mut buffer.0, config, None);
    assert_eq!(allocator.capacity(), 4096);
  }

  #[test]
  fn test_create_with_buffer_honours_size() {
    let mut buffer = Aligned::<4096>::new();
    let allocator = create_scratch_allocator(Some(&mut buffer.0[..]), 1024, None);
    assert_eq!(allocator.capacity(), 1024);
    assert!(allocator.allocate(1000, 4).is_ok());
    assert_eq!(
      allocator.allocate(100, 4),
      Err(AllocError::NoBackingAllocator { size: 100 })
    );
    drop(allocator);

    let allocator = create_scratch_allocator(Some(&mut buffer.0[..]), 0, None);
    assert_eq!(allocator.capacity(), 4096);
    drop(allocator);

    let allocator = create_scratch_allocator(Some(&mut buffer.0[..]), 1 << 20, None);
    assert_eq!(allocator.capacity(), 4096);
  }

  #[test]
  fn test_block_layout() {
    let mut buffer = Aligned::<256>::new();
    let allocator = ScratchAllocator::with_buffer(&mut buffer.0, None);
    assert_eq!(allocator.capacity(), 256);

    let a = allocator.allocate(5, 1).unwrap();
    assert_eq!(allocator.alloc_cursor(), 12);

    // Header at 12, padding words up to the 32-aligned data at 32.
    let b = allocator.allocate(16, 32).unwrap();
    assert_eq!(b.as_ptr() as usize % 32, 0);
    assert_eq!(allocator.alloc_cursor(), 32 + 16);
    assert_eq!(allocator.in_use_bytes(), 48);

    unsafe {
      allocator.free(a);
      assert_eq!(allocator.free_cursor(), 12);
      allocator.free(b);
    }
    assert_eq!((allocator.alloc_cursor(), allocator.free_cursor()), (0, 0));
  }

  #[test]
  fn test_wraparound_reuses_front() {
    let mut buffer = Aligned::<256>::new();
    let allocator = ScratchAllocator::with_buffer(&mut buffer.0, None);

    let a = allocator.allocate(60, 4).unwrap();
    let b = allocator.allocate(60, 4).unwrap();
    let c = allocator.allocate(60, 4).unwrap();
    assert_eq!(allocator.alloc_cursor(), 192);

    unsafe { allocator.free(a) };
    assert_eq!(allocator.free_cursor(), 64);

    // Wrapping would end at 104, past the live block at 64.
    assert_eq!(
      allocator.allocate(100, 4),
      Err(AllocError::NoBackingAllocator { size: 100 })
    );
    assert_eq!((allocator.alloc_cursor(), allocator.free_cursor()), (192, 64));

    unsafe { allocator.free(b) };
    let d = allocator.allocate(100, 4).unwrap();
    assert_eq!(d.as_ptr(), a.as_ptr());
    assert_eq!(allocator.alloc_cursor(), 104);
    assert_eq!(allocator.in_use_bytes(), 256 - 128 + 104);

    // c, then the free tail, then wrap onto d.
    unsafe { allocator.free(c) };
    assert_eq!(allocator.free_cursor(), 0);

    unsafe { allocator.free(d) };
    assert!(allocator.is_empty());
  }

  #[test]
  fn test_gap_checks_both_ends() {
    let mut buffer = Aligned::<256>::new();
    let allocator = ScratchAllocator::with_buffer(&mut buffer.0, None);

    let a = allocator.allocate(60, 4).unwrap();
    let b = allocator.allocate(60, 4).unwrap();
    let c = allocator.allocate(124, 4).unwrap();
    assert_eq!(allocator.alloc_cursor(), 256);

    unsafe {
      allocator.free(a);
      allocator.free(b);
    }
    assert_eq!(allocator.free_cursor(), 128);

    let d = allocator.allocate(60, 4).unwrap();
    assert_eq!(allocator.alloc_cursor(), 64);

    // Gap is [64, 128): 60 bytes plus header would meet the live block.
    assert!(allocator.allocate(60, 4).is_err());
    let e = allocator.allocate(56, 4).unwrap();
    assert_eq!(allocator.alloc_cursor(), 124);

    unsafe {
      allocator.free(c);
      allocator.free(d);
      allocator.free(e);
    }
    assert!(allocator.is_empty());
  }

  #[test]
  fn test_out_of_order_free_waits_for_oldest() {
    let mut buffer = Aligned::<1024>::new();
    let allocator = ScratchAllocator::with_buffer(&mut buffer.0, None);

    let ptrs: Vec<_> = (1..=10).map(|s| allocator.allocate(s * 8, 8).unwrap()).collect();
    let in_use = allocator.in_use_bytes();

    for ptr in ptrs[1..].iter().rev() {
      unsafe { allocator.free(*ptr) };
      assert_eq!(allocator.in_use_bytes(), in_use);
    }

    unsafe { allocator.free(ptrs[0]) };
    assert!(allocator.is_empty());
  }

  #[test]
  fn test_backer_takes_overflow_and_frees() {
    let system = SystemAllocator::new();
    let mut buffer = Aligned::<256>::new();
    let allocator = ScratchAllocator::with_buffer(&mut buffer.0, Some(&system));

    let local = allocator.allocate(64, 8).unwrap();
    let remote = allocator.allocate(4096, 8).unwrap();
    assert!(allocator.contains(local.as_ptr()));
    assert!(!allocator.contains(remote.as_ptr()));

    unsafe {
      allocator.free(remote);
      allocator.free(local);
    }
    assert!(allocator.is_empty());
  }

  #[test]
  fn test_self_acquired_buffer() {
    let system = SystemAllocator::new();
    let allocator = create_scratch_allocator(None, 0, Some(&system));
    assert!(allocator.has_buffer());
    assert!(allocator.owns_buffer());
    assert_eq!(allocator.capacity(), SCRATCH_DEFAULT_BUFFER_SIZE);

    let allocator = create_scratch_allocator(None, 4096, Some(&system));
    assert_eq!(allocator.capacity(), 4096);
    let ptr = allocator.allocate(100, 64).unwrap();
    assert!(allocator.contains(ptr.as_ptr()));
    unsafe { allocator.free(ptr) };
  }

  #[test]
  fn test_small_buffer_forwards_to_backer() {
    let system = SystemAllocator::new();
    let mut buffer = [0u8; SCRATCH_MIN_BUFFER_SIZE - 1];
    let allocator = ScratchAllocator::with_buffer(&mut buffer, Some(&system));
    assert!(!allocator.has_buffer());

    let ptr = allocator.allocate(32, 8).unwrap();
    unsafe { allocator.free(ptr) };

    let allocator = create_scratch_allocator(None, 64, Some(&system));
    assert!(!allocator.has_buffer());
    assert!(!allocator.owns_buffer());
  }

  #[test]
  fn test_no_buffer_no_backer_fails() {
    let allocator = ScratchAllocator::new(None);
    assert!(!allocator.has_buffer());
    assert_eq!(
      allocator.allocate(8, 8),
      Err(AllocError::NoBackingAllocator { size: 8 })
    );
  }

  #[test]
  fn test_unaligned_buffer_is_trimmed() {
    let mut buffer = Aligned::<260>::new();
    let allocator = ScratchAllocator::with_buffer(&mut buffer.0[1..], None);
    assert_eq!(allocator.capacity(), 256);

    let ptr = allocator.allocate(1, 1).unwrap();
    assert_eq!(ptr.as_ptr() as usize % MIN_ALIGNMENT, 0);
    unsafe { allocator.free(ptr) };
  }

  #[test]
  fn test_invalid_alignment_rejected() {
    let mut buffer = Aligned::<256>::new();
    let allocator = ScratchAllocator::with_buffer(&mut buffer.0, None);
    assert_eq!(
      allocator.allocate(8, 6),
      Err(AllocError::InvalidAlignment { align: 6 })
    );
    assert!(allocator.is_empty());
  }
}
