use std::{
  fmt,
  mem,
  ops::{Index, IndexMut},
  ptr::{self, NonNull},
  slice,
};

use crate::{
  allocator::Allocator,
  assume,
  error::{AllocError, AllocResult},
};

/// Growable array of `Copy` values whose storage comes from an [`Allocator`].
///
/// Every resize allocates a new block, copies, then frees the old one, so an
/// array is a well-behaved tenant of a scratch allocator: its blocks are
/// released in the order they were taken.
pub struct Array<'a, T: Copy> {
  allocator: &'a dyn Allocator,
  data: Option<NonNull<T>>,
  len: usize,
  capacity: usize,
}

impl<'a, T: Copy> Array<'a, T> {
  pub fn new(allocator: &'a dyn Allocator) -> Self {
    Self {
      allocator,
      data: None,
      len: 0,
      capacity: 0,
    }
  }

  pub fn with_capacity(
    allocator: &'a dyn Allocator,
    capacity: usize,
  ) -> AllocResult<Self> {
    let mut array = Self::new(allocator);
    array.reserve(capacity)?;
    Ok(array)
  }

  pub fn len(&self) -> usize {
    self.len
  }

  pub fn is_empty(&self) -> bool {
    self.len == 0
  }

  pub fn capacity(&self) -> usize {
    self.capacity
  }

  /// True while no storage has been allocated.
  pub fn is_null(&self) -> bool {
    self.data.is_none()
  }

  pub fn as_slice(&self) -> &[T] {
    match self.data {
      Some(data) => unsafe { slice::from_raw_parts(data.as_ptr(), self.len) },
      None => &[],
    }
  }

  pub fn as_mut_slice(&mut self) -> &mut [T] {
    match self.data {
      Some(data) => unsafe { slice::from_raw_parts_mut(data.as_ptr(), self.len) },
      None => &mut [],
    }
  }

  /// Moves the contents into a fresh block of `capacity` elements.
  fn reallocate(
    &mut self,
    capacity: usize,
  ) -> AllocResult<()> {
    let data = if capacity == 0 {
      None
    } else {
      let bytes = capacity
        .checked_mul(mem::size_of::<T>())
        .ok_or(AllocError::SizeOverflow {
          size: capacity,
          align: mem::align_of::<T>(),
        })?;
      let block = self.allocator.allocate(bytes, mem::align_of::<T>())?.cast::<T>();
      let keep = self.len.min(capacity);
      if let Some(old) = self.data {
        unsafe { ptr::copy_nonoverlapping(old.as_ptr(), block.as_ptr(), keep) };
      }
      Some(block)
    };

    if let Some(old) = self.data {
      unsafe { self.allocator.free(old.cast()) };
    }

    self.data = data;
    self.capacity = capacity;
    self.len = self.len.min(capacity);
    Ok(())
  }

  /// Ensures room for `capacity` elements. Never shrinks; see [`Array::trim`].
  pub fn reserve(
    &mut self,
    capacity: usize,
  ) -> AllocResult<()> {
    if capacity <= self.capacity {
      return Ok(());
    }
    self.reallocate(capacity)
  }

  /// Shrinks (or grows) the storage to `len + excess` elements.
  pub fn trim(
    &mut self,
    excess: usize,
  ) -> AllocResult<()> {
    self.reallocate(self.len.saturating_add(excess))
  }

  /// Sets the length to `len`, filling new slots with `value`. The capacity
  /// becomes exactly `len`.
  pub fn resize(
    &mut self,
    len: usize,
    value: T,
  ) -> AllocResult<()> {
    let old_len = self.len;
    self.reallocate(len)?;
    if let Some(data) = self.data {
      for i in old_len..len {
        unsafe { data.as_ptr().add(i).write(value) };
      }
    }
    self.len = len;
    Ok(())
  }

  pub fn resize_default(
    &mut self,
    len: usize,
  ) -> AllocResult<()>
  where
    T: Default,
  {
    self.resize(len, T::default())
  }

  pub fn push(
    &mut self,
    value: T,
  ) -> AllocResult<()> {
    if self.len == self.capacity {
      self.reserve(self.capacity.saturating_mul(2).saturating_add(10))?;
    }

    if let Some(data) = self.data {
      unsafe { data.as_ptr().add(self.len).write(value) };
    }
    self.len += 1;
    Ok(())
  }

  pub fn pop(&mut self) -> Option<T> {
    if self.len == 0 {
      return None;
    }
    self.len -= 1;
    self.data.map(|data| unsafe { data.as_ptr().add(self.len).read() })
  }

  pub fn clear(&mut self) {
    self.len = 0;
  }

  pub fn sort(&mut self)
  where
    T: Ord,
  {
    self.as_mut_slice().sort_unstable();
  }

  /// Copies the array into new storage from the same allocator.
  pub fn try_clone(&self) -> AllocResult<Self> {
    let mut copy = Self::new(self.allocator);
    copy.reserve(self.len)?;
    if let (Some(src), Some(dst)) = (self.data, copy.data) {
      unsafe { ptr::copy_nonoverlapping(src.as_ptr(), dst.as_ptr(), self.len) };
    }
    copy.len = self.len;
    Ok(copy)
  }
}

impl<T: Copy> Index<usize> for Array<'_, T> {
  type Output = T;

  fn index(
    &self,
    index: usize,
  ) -> &T {
    assume!(index < self.len, "index {} out of bounds for length {}", index, self.len);
    &self.as_slice()[index]
  }
}

impl<T: Copy> IndexMut<usize> for Array<'_, T> {
  fn index_mut(
    &mut self,
    index: usize,
  ) -> &mut T {
    assume!(index < self.len, "index {} out of bounds for length {}", index, self.len);
    &mut self.as_mut_slice()[index]
  }
}

impl<T: Copy> Drop for Array<'_, T> {
  fn drop(&mut self) {
    if let Some(data) = self.data.take() {
      unsafe { self.allocator.free(data.cast()) };
    }
  }
}

impl<T: Copy + fmt::Debug> fmt::Debug for Array<'_, T> {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    f.debug_list().entries(self.as_slice()).finish()
  }
}

impl<'s, T: Copy> IntoIterator for &'s Array<'_, T> {
  type Item = &'s T;
  type IntoIter = slice::Iter<'s, T>;

  fn into_iter(self) -> Self::IntoIter {
    self.as_slice().iter()
  }
}
