use std::{alloc::Layout, ptr::NonNull};

use crate::error::{AllocError, AllocResult};

/// The allocation interface every allocator in this crate implements.
///
/// Methods take `&self`: an allocator is routinely referenced from several
/// places at once (a scratch allocator borrows its backer while the owner
/// keeps using it). Implementations keep their mutable state in `Cell`s and
/// are therefore not `Sync`.
pub trait Allocator {
  /// Returns a pointer to at least `size` bytes aligned to `alignment`.
  ///
  /// `alignment` must be a power of two. Alignments below the allocator's
  /// granularity are rounded up.
  fn allocate(
    &self,
    size: usize,
    alignment: usize,
  ) -> AllocResult<NonNull<u8>>;

  /// Releases a block returned by [`Allocator::allocate`].
  ///
  /// # Safety
  ///
  /// `ptr` must come from `allocate` on this same instance and must not have
  /// been freed already.
  unsafe fn free(
    &self,
    ptr: NonNull<u8>,
  );

  fn allocate_layout(
    &self,
    layout: Layout,
  ) -> AllocResult<NonNull<u8>> {
    self.allocate(layout.size(), layout.align())
  }
}

/// A borrowed allocator, the form in which allocators are handed around.
pub type AllocatorHandle<'a> = &'a dyn Allocator;

#[inline]
pub(crate) fn check_alignment(alignment: usize) -> AllocResult<()> {
  if alignment.is_power_of_two() {
    Ok(())
  } else {
    Err(AllocError::InvalidAlignment { align: alignment })
  }
}
