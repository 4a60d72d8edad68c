//! General-purpose arena over a single region.
//!
//! The free-list management is `linked_list_allocator`'s; this module only
//! supplies the region and adapts the size-less `free` of [`Allocator`] to an
//! algorithm that wants the allocation's `Layout` back.

use std::{
  alloc::Layout,
  cell::RefCell,
  ffi::c_void,
  marker::PhantomData,
  mem,
  ptr::{self, NonNull},
};

use libc::{MAP_ANONYMOUS, MAP_FAILED, MAP_PRIVATE, PROT_READ, PROT_WRITE};
use linked_list_allocator::Heap;

use crate::{
  align_to,
  allocator::{Allocator, check_alignment},
  assume,
  config::HeapArenaConfig,
  error::{AllocError, AllocResult},
};

/// Caller regions below this size are ignored in favour of a mapped one.
pub const HEAP_MIN_REGION_SIZE: usize = 4096;

/// Stored immediately before every data pointer handed out by the arena.
#[repr(C)]
#[derive(Clone, Copy)]
struct ArenaTag {
  size: usize,
  align: usize,
}

const TAG_SIZE: usize = mem::size_of::<ArenaTag>();

/// Distance from the start of the underlying block to the data pointer.
#[inline]
fn prefix_for(align: usize) -> usize {
  align_to!(TAG_SIZE, align)
}

struct Region {
  start: NonNull<u8>,
  size: usize,
  mapped: bool,
}

pub struct HeapArenaAllocator<'a> {
  heap: RefCell<Heap>,
  region: Option<Region>,
  _region: PhantomData<&'a mut [u8]>,
}

impl<'a> HeapArenaAllocator<'a> {
  /// Manages `region` if it is given and large enough, otherwise maps a
  /// region of `size` bytes (0 for the default) for itself.
  pub fn new(
    region: Option<&'a mut [u8]>,
    size: usize,
  ) -> Self {
    Self::with_config(region, HeapArenaConfig::default().with_region_size(size))
  }

  pub fn with_config(
    region: Option<&'a mut [u8]>,
    config: HeapArenaConfig,
  ) -> Self {
    let region = match region {
      Some(buffer) if buffer.len() >= HEAP_MIN_REGION_SIZE => Some(Region {
        size: buffer.len(),
        start: NonNull::from(buffer).cast(),
        mapped: false,
      }),
      _ => map_region(config.effective_region_size()),
    };

    let mut heap = Heap::empty();
    match &region {
      Some(region) => {
        unsafe { heap.init(region.start.as_ptr(), region.size) };
        tracing::debug!(
          size = region.size,
          mapped = region.mapped,
          "heap arena created"
        );
      }
      None => tracing::warn!("heap arena has no region, every allocation will fail"),
    }

    Self {
      heap: RefCell::new(heap),
      region,
      _region: PhantomData,
    }
  }

  /// Bytes under management.
  pub fn size(&self) -> usize {
    self.heap.borrow().size()
  }

  pub fn used(&self) -> usize {
    self.heap.borrow().used()
  }

  pub fn free_bytes(&self) -> usize {
    self.heap.borrow().free()
  }

  /// True when the region was mapped by the arena and is unmapped on drop.
  pub fn owns_region(&self) -> bool {
    self.region.as_ref().is_some_and(|region| region.mapped)
  }

  fn contains(
    &self,
    ptr: NonNull<u8>,
  ) -> bool {
    self.region.as_ref().is_some_and(|region| {
      let start = region.start.as_ptr() as usize;
      let address = ptr.as_ptr() as usize;
      address >= start && address < start + region.size
    })
  }
}

fn page_size() -> usize {
  match unsafe { libc::sysconf(libc::_SC_PAGESIZE) } {
    size if size > 0 => size as usize,
    _ => 4096,
  }
}

fn map_region(size: usize) -> Option<Region> {
  let page = page_size();
  let size = size.max(HEAP_MIN_REGION_SIZE).checked_add(page - 1)? & !(page - 1);

  let address = unsafe {
    libc::mmap(
      ptr::null_mut(),
      size,
      PROT_READ | PROT_WRITE,
      MAP_PRIVATE | MAP_ANONYMOUS,
      -1,
      0,
    )
  };

  if address == MAP_FAILED {
    tracing::warn!(size, error = %std::io::Error::last_os_error(), "mmap failed");
    return None;
  }

  Some(Region {
    start: NonNull::new(address as *mut u8)?,
    size,
    mapped: true,
  })
}

impl Allocator for HeapArenaAllocator<'_> {
  fn allocate(
    &self,
    size: usize,
    alignment: usize,
  ) -> AllocResult<NonNull<u8>> {
    check_alignment(alignment)?;

    let align = alignment.max(mem::align_of::<ArenaTag>());
    let prefix = prefix_for(align);
    let total = size
      .checked_add(prefix)
      .ok_or(AllocError::SizeOverflow { size, align })?;
    let layout =
      Layout::from_size_align(total, align).map_err(|_| AllocError::SizeOverflow { size, align })?;

    let block = self
      .heap
      .borrow_mut()
      .allocate_first_fit(layout)
      .map_err(|_| AllocError::OutOfMemory { size, align })?;

    unsafe {
      let data = block.add(prefix);
      data
        .sub(TAG_SIZE)
        .cast::<ArenaTag>()
        .write(ArenaTag { size: total, align });
      Ok(data)
    }
  }

  unsafe fn free(
    &self,
    ptr: NonNull<u8>,
  ) {
    assume!(self.contains(ptr), "pointer {:p} is not from this arena", ptr);

    unsafe {
      let tag = ptr.sub(TAG_SIZE).cast::<ArenaTag>().read();
      let block = ptr.sub(prefix_for(tag.align));
      let layout = Layout::from_size_align_unchecked(tag.size, tag.align);
      self.heap.borrow_mut().deallocate(block, layout);
    }
  }
}

impl Drop for HeapArenaAllocator<'_> {
  fn drop(&mut self) {
    if let Some(region) = self.region.take().filter(|region| region.mapped) {
      let status = unsafe { libc::munmap(region.start.as_ptr() as *mut c_void, region.size) };
      if status != 0 {
        tracing::warn!(error = %std::io::Error::last_os_error(), "munmap failed");
      }
    }
  }
}

/// Builds a heap arena over `region`, or over a self-mapped region of `size`
/// bytes when `region` is absent or too small.
pub fn create_heap_arena_allocator(
  region: Option<&mut [u8]>,
  size: usize,
) -> HeapArenaAllocator<'_> {
  HeapArenaAllocator::new(region, size)
}
