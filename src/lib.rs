//! # scratchring - Pluggable Allocators with a Ring-Buffer Scratch Allocator
//!
//! This crate provides one small allocation interface, [`Allocator`], and
//! three implementations of it:
//!
//! - [`SystemAllocator`]: straight to libc `posix_memalign` / `free`.
//! - [`HeapArenaAllocator`]: a general-purpose free-list arena over one region.
//! - [`ScratchAllocator`]: a ring of variable-size blocks over a fixed buffer,
//!   for short-lived allocations released roughly in the order they were made.
//!
//! ## The Scratch Ring
//!
//! ```text
//!   Scratch buffer, after wrapping once:
//!
//!   ┌──────────┬──────────┬─────────────────┬──────────┬──────────┬──────┐
//!   │ block D  │ block E  │      free       │ block B  │ block C  │ tail │
//!   │ (live)   │ (live)   │                 │ (live)   │ (freed)  │(free)│
//!   └──────────┴──────────┴─────────────────┴──────────┴──────────┴──────┘
//!   ▲                     ▲                 ▲                            ▲
//!   start             alloc_at           free_at                       end
//!
//!   In use:  [free_at, end) + [start, alloc_at)
//!   C is freed but stays in use until B, the oldest block, is freed.
//! ```
//!
//! Reclamation only ever moves `free_at` forward over blocks that are marked
//! free, so a block freed out of order keeps its space until everything
//! allocated before it is freed too. Allocation moves `alloc_at` forward and
//! wraps to the start when the tail is too short, but never onto a byte
//! between `free_at` and `alloc_at`.
//!
//! When the ring cannot take a request, the scratch allocator hands it to its
//! backing allocator; a `free` of a pointer outside the ring goes there as
//! well.
//!
//! Each block carries its own header:
//!
//! ```text
//!   ┌────────────┬─────────┬──────────────────────────────┐
//!   │   Header   │ Padding │          User Data           │
//!   │ ┌────────┐ │  0 0 0  │                              │
//!   │ │size:31 │ │         │                              │
//!   │ │free:1  │ │         │                              │
//!   │ └────────┘ │         │                              │
//!   │  4 bytes   │         │                              │
//!   └────────────┴─────────┴──────────────────────────────┘
//!                          ▲
//!                          └── Pointer returned to user
//! ```
//!
//! ## Crate Structure
//!
//! ```text
//!   scratchring
//!   ├── align      - Alignment macros (align!, align_to!)
//!   ├── assume     - Fail-fast invariant checks (assume!)
//!   ├── allocator  - The Allocator trait
//!   ├── array      - Array<T>, a growable array over any Allocator
//!   ├── config     - Sizes and tunables
//!   ├── error      - AllocError
//!   ├── header     - Block header packing and recovery (internal)
//!   ├── heap       - HeapArenaAllocator
//!   ├── registry   - Process-wide default allocators
//!   ├── scratch    - ScratchAllocator
//!   └── system     - SystemAllocator
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use scratchring::{Allocator, ScratchAllocator, SystemAllocator};
//!
//! let system = SystemAllocator::new();
//! let scratch = ScratchAllocator::new(Some(&system));
//!
//! let ptr = scratch.allocate(64, 16).unwrap();
//! unsafe {
//!     ptr.as_ptr().write_bytes(0, 64);
//!     scratch.free(ptr);
//! }
//! assert!(scratch.is_empty());
//! ```
//!
//! ## Errors
//!
//! Running out of space is an [`AllocError`]. Misuse that indicates a bug,
//! such as touching the registry before [`init_registry`] or freeing a
//! foreign pointer into a scratch allocator with no backer, aborts through
//! [`assume!`].
//!
//! ## Limitations
//!
//! - **Single-threaded only**: allocators use `Cell`s and are not `Sync`
//! - **FIFO-friendly**: the scratch ring reclaims strictly oldest first
//! - **Unix-only**: requires `libc` (`posix_memalign`, `mmap`)

pub mod align;
pub mod assume;

mod allocator;
mod array;
pub mod config;
mod error;
mod header;
mod heap;
mod registry;
mod scratch;
mod system;

pub use allocator::{Allocator, AllocatorHandle};
pub use array::Array;
pub use error::{AllocError, AllocResult};
pub use heap::{HEAP_MIN_REGION_SIZE, HeapArenaAllocator, create_heap_arena_allocator};
pub use registry::{
  default_allocator,
  default_scratch_allocator,
  destroy_registry,
  init_registry,
  is_registry_initialized,
};
pub use scratch::{ScratchAllocator, create_scratch_allocator};
pub use system::SystemAllocator;
