use std::{alloc::Layout, io::Read, ptr::NonNull};

use scratchring::{
  Allocator,
  ScratchAllocator,
  SystemAllocator,
  create_scratch_allocator,
  default_scratch_allocator,
  destroy_registry,
  init_registry,
};

/// Waits until the user presses ENTER.
/// Gives you time to read the ring state printed by each step.
fn block_until_enter_pressed() {
  println!("\n>>> Press ENTER to continue...");
  let _ = std::io::stdin().bytes().next();
}

/// Prints both cursors and how much of the ring is in use.
fn print_ring(
  label: &str,
  scratch: &ScratchAllocator<'_>,
) {
  println!(
    "[{}] alloc_at = {:>5}, free_at = {:>5}, in use = {:>5} / {} bytes",
    label,
    scratch.alloc_cursor(),
    scratch.free_cursor(),
    scratch.in_use_bytes(),
    scratch.capacity(),
  );
}

fn print_alloc(
  layout: Layout,
  scratch: &ScratchAllocator<'_>,
  ptr: NonNull<u8>,
) {
  println!(
    "Allocated {} bytes (align {}), address = {:?}, {}",
    layout.size(),
    layout.align(),
    ptr,
    if scratch.contains(ptr.as_ptr()) {
      "inside the ring"
    } else {
      "from the backer"
    }
  );
}

fn main() {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::DEBUG)
    .init();

  let system = SystemAllocator::new();

  // A deliberately small ring so wrapping and spilling are easy to see.
  let scratch = create_scratch_allocator(None, 1024, Some(&system));

  print_ring("start", &scratch);
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 1) Three blocks, one after the other.
  // --------------------------------------------------------------------
  let layout = Layout::array::<u8>(300).unwrap();
  let first = scratch.allocate_layout(layout).unwrap();
  print_alloc(layout, &scratch, first);
  let second = scratch.allocate_layout(layout).unwrap();
  print_alloc(layout, &scratch, second);
  let third = scratch.allocate_layout(layout).unwrap();
  print_alloc(layout, &scratch, third);
  print_ring("1", &scratch);

  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 2) Free the second block first.
  //
  //    The first block is older and still live, so nothing is reclaimed.
  // --------------------------------------------------------------------
  unsafe { scratch.free(second) };
  println!("\n[2] Freed the second block");
  print_ring("2", &scratch);

  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 3) Free the first block.
  //
  //    Now free_at moves past both of them in one go.
  // --------------------------------------------------------------------
  unsafe { scratch.free(first) };
  println!("\n[3] Freed the first block");
  print_ring("3", &scratch);

  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 4) A block that does not fit in the tail wraps to the front.
  // --------------------------------------------------------------------
  let layout_u64 = Layout::array::<u64>(40).unwrap();
  let wrapped = scratch.allocate_layout(layout_u64).unwrap();
  println!("\n[4] Allocate [u64; 40]");
  print_alloc(layout_u64, &scratch, wrapped);
  print_ring("4", &scratch);

  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 5) A request larger than the ring goes to the system allocator.
  // --------------------------------------------------------------------
  let layout_big = Layout::array::<u8>(64 * 1024).unwrap();
  let big = scratch.allocate_layout(layout_big).unwrap();
  println!("\n[5] Allocate 64 KiB");
  print_alloc(layout_big, &scratch, big);
  print_ring("5", &scratch);

  unsafe {
    scratch.free(big);
    scratch.free(third);
    scratch.free(wrapped);
  }
  print_ring("freed", &scratch);

  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 6) The process-wide registry: default allocator plus a 2 MiB ring.
  // --------------------------------------------------------------------
  init_registry();
  let shared = default_scratch_allocator();
  let ptr = shared.allocate(4096, 64).unwrap();
  println!("\n[6] Default scratch allocator handed out {:?}", ptr);
  unsafe {
    shared.free(ptr);
    destroy_registry();
  }

  println!("\n[7] End of example.");
}
