//! Process-wide default allocators.
//!
//! ```text
//!   init_registry()                     destroy_registry()
//!        │                                     │
//!        ▼                                     ▼
//!   ┌─────────────────┐   backs   ┌──────────────────────────┐
//!   │ SystemAllocator │◄──────────│ ScratchAllocator<'static>│
//!   │  (default)      │           │  2 MiB from the default  │
//!   └─────────────────┘           └──────────────────────────┘
//!      dropped last                   dropped first
//! ```
//!
//! Both allocators live in static storage, so building them never needs an
//! allocator. Using the registry before [`init_registry`], after
//! [`destroy_registry`], or initialising it twice aborts the process.
//!
//! Like the allocators themselves the registry is single-threaded: call it
//! from one thread only.

use std::{
  cell::{Cell, UnsafeCell},
  mem::MaybeUninit,
};

use crate::{
  allocator::AllocatorHandle,
  assume,
  scratch::ScratchAllocator,
  system::SystemAllocator,
};

struct Registry {
  default: UnsafeCell<MaybeUninit<SystemAllocator>>,
  scratch: UnsafeCell<MaybeUninit<ScratchAllocator<'static>>>,
  initialized: Cell<bool>,
}

// SAFETY: the registry is documented as single-threaded; no two threads may
// call into it. Nothing here is touched without that contract.
unsafe impl Sync for Registry {}

static REGISTRY: Registry = Registry {
  default: UnsafeCell::new(MaybeUninit::uninit()),
  scratch: UnsafeCell::new(MaybeUninit::uninit()),
  initialized: Cell::new(false),
};

/// Builds the default allocator and the default scratch allocator.
pub fn init_registry() {
  assume!(!REGISTRY.initialized.get(), "allocator registry initialised twice");

  let default: &'static SystemAllocator =
    unsafe { (*REGISTRY.default.get()).write(SystemAllocator::new()) };
  unsafe {
    (*REGISTRY.scratch.get()).write(ScratchAllocator::new(Some(default)));
  }

  REGISTRY.initialized.set(true);
  tracing::debug!("allocator registry initialised");
}

/// Tears the registry down, scratch allocator first.
///
/// # Safety
///
/// No handle obtained from [`default_allocator`] or
/// [`default_scratch_allocator`] may be used after this call, and every
/// block allocated through them must already be freed.
pub unsafe fn destroy_registry() {
  assume!(REGISTRY.initialized.get(), "allocator registry destroyed before init");

  REGISTRY.initialized.set(false);
  unsafe {
    (*REGISTRY.scratch.get()).assume_init_drop();
    (*REGISTRY.default.get()).assume_init_drop();
  }
  tracing::debug!("allocator registry destroyed");
}

pub fn is_registry_initialized() -> bool {
  REGISTRY.initialized.get()
}

/// The process default allocator.
pub fn default_allocator() -> AllocatorHandle<'static> {
  assume!(REGISTRY.initialized.get(), "allocator registry used before init");
  unsafe { (*REGISTRY.default.get()).assume_init_ref() }
}

/// The process default scratch allocator, backed by [`default_allocator`].
pub fn default_scratch_allocator() -> AllocatorHandle<'static> {
  assume!(REGISTRY.initialized.get(), "allocator registry used before init");
  unsafe { (*REGISTRY.scratch.get()).assume_init_ref() }
}
