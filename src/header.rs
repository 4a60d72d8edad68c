//! Inline block headers for the scratch ring.
//!
//! ```text
//!   one block:
//!   ┌──────────┬─────────┬─────────┬──────────────────────────┐
//!   │  header  │ 0x0000  │ 0x0000  │          data            │
//!   │ size|free│ padding │ padding │                          │
//!   └──────────┴─────────┴─────────┴──────────────────────────┘
//!   ▲                              ▲                          ▲
//!   header                         data (aligned)             header + size
//! ```
//!
//! The header word is never zero (every block spans at least the header
//! itself), so stepping back from a data pointer over zero words always
//! lands on it.

use std::mem;

use crate::{assume, config::MAX_BLOCK_SIZE};

/// Value of every word between a header and its data pointer.
pub const HEADER_PADDING: u32 = 0;

pub const HEADER_SIZE: usize = mem::size_of::<u32>();

/// Packed `free: 1 | size: 31` record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct BlockHeader(u32);

impl BlockHeader {
  pub fn new(
    size: usize,
    is_free: bool,
  ) -> Self {
    assume!(
      size >= HEADER_SIZE && size <= MAX_BLOCK_SIZE,
      "block size {} out of range",
      size
    );
    Self(((size as u32) << 1) | is_free as u32)
  }

  /// Total span from the header to the end of the data.
  pub fn size(self) -> usize {
    (self.0 >> 1) as usize
  }

  pub fn is_free(self) -> bool {
    self.0 & 1 == 1
  }

  pub fn freed(self) -> Self {
    Self(self.0 | 1)
  }

  pub fn from_word(word: u32) -> Self {
    Self(word)
  }

  pub fn word(self) -> u32 {
    self.0
  }
}

/// Writes `header` at `at` and fills `[at + HEADER_SIZE, data)` with padding.
///
/// # Safety
///
/// `at` and `data` must be word aligned, lie in the same buffer, and
/// `at + HEADER_SIZE <= data`.
pub unsafe fn write_header(
  at: *mut u8,
  data: *mut u8,
  header: BlockHeader,
) {
  assume!(at.wrapping_add(HEADER_SIZE) <= data);

  unsafe {
    let mut word = at.add(HEADER_SIZE) as *mut u32;
    while (word as *mut u8) < data {
      word.write(HEADER_PADDING);
      word = word.add(1);
    }
    (at as *mut u32).write(header.word());
  }
}

/// Steps back from `data` over padding words to the block header.
///
/// # Safety
///
/// `data` must be a data pointer written with [`write_header`] inside the
/// buffer starting at `start`.
pub unsafe fn find_header(
  start: *mut u8,
  data: *mut u8,
) -> *mut u32 {
  assume!(start.wrapping_add(HEADER_SIZE) <= data);

  unsafe {
    let mut word = data as *mut u32;
    while word.sub(1) as *mut u8 > start && word.sub(1).read() == HEADER_PADDING {
      word = word.sub(1);
    }

    let header = word.sub(1);
    assume!(header as *mut u8 >= start);
    assume!(header.read() != HEADER_PADDING, "no header before {:p}", data);
    header
  }
}
