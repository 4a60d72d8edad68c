use std::{ffi::c_void, mem, ptr::{self, NonNull}};

use crate::{
  allocator::{Allocator, check_alignment},
  error::{AllocError, AllocResult},
};

/// Pass-through to the C library's `posix_memalign` / `free`.
///
/// This is the process default allocator. It has no state, so any number of
/// copies can coexist; they all refer to the same libc heap.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemAllocator;

impl SystemAllocator {
  pub const fn new() -> Self {
    Self
  }
}

impl Allocator for SystemAllocator {
  fn allocate(
    &self,
    size: usize,
    alignment: usize,
  ) -> AllocResult<NonNull<u8>> {
    check_alignment(alignment)?;

    // posix_memalign rejects alignments below the pointer size.
    let alignment = alignment.max(mem::size_of::<*mut c_void>());
    let size = size.max(1);

    let mut address: *mut c_void = ptr::null_mut();
    let status = unsafe { libc::posix_memalign(&mut address, alignment, size) };

    if status != 0 {
      return Err(AllocError::OutOfMemory {
        size,
        align: alignment,
      });
    }

    NonNull::new(address as *mut u8).ok_or(AllocError::OutOfMemory {
      size,
      align: alignment,
    })
  }

  unsafe fn free(
    &self,
    ptr: NonNull<u8>,
  ) {
    unsafe { libc::free(ptr.as_ptr() as *mut c_void) }
  }
}
