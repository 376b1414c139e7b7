use std::io::Read;

use buddyheap::{Allocator, HEADER_SIZE};

/// Waits until the user presses ENTER.
/// Useful when you want to inspect memory state with tools like `pmap`, `htop`,
/// `gdb`, or just visually track how allocations change the program break.
fn block_until_enter_pressed() {
  println!("\n>>> Press ENTER to continue...");
  let _ = std::io::stdin().bytes().next();
}

type DemoAllocator = Allocator<4, 16>;

fn main() {
  // A small 64 KiB arena, large enough to see several levels of splitting
  // without printing an overwhelming number of buckets.
  let mut allocator = DemoAllocator::new();

  println!(
    "[start] arena = {} bytes, header = {} bytes",
    DemoAllocator::arena_size(),
    HEADER_SIZE
  );
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 1) Allocate a small block. Since the whole arena starts as one free
  //    block at bucket 0, this forces a cascade of splits down to the
  //    bucket that fits the request.
  // --------------------------------------------------------------------
  println!("\n[1] Allocate 8 bytes (forces a split cascade)");
  let first = allocator.allocate(8).expect("allocation should succeed");
  println!("[1] Returned pointer = {:p}", first.as_ptr());

  unsafe { *(first.as_ptr() as *mut u64) = 0xDEAD_BEEF };
  println!(
    "[1] Value written = 0x{:X}",
    unsafe { *(first.as_ptr() as *mut u64) }
  );
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 2) Allocate a second small block. Because the first split left a
  //    free buddy behind, this one is satisfied without any further
  //    splitting.
  // --------------------------------------------------------------------
  println!("\n[2] Allocate another 8 bytes (reuses the leftover buddy)");
  let second = allocator.allocate(8).expect("allocation should succeed");
  println!("[2] Returned pointer = {:p}", second.as_ptr());
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 3) Release the first block. Its buddy (`second`) is still in use, so
  //    this cannot coalesce past their shared parent.
  // --------------------------------------------------------------------
  println!("\n[3] Release first block (buddy still in use, no coalesce)");
  allocator.release(first);
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 4) Release the second block too. Now both buddies are free, so they
  //    merge, and that merge can cascade all the way back up if every
  //    ancestor's other half is also free.
  // --------------------------------------------------------------------
  println!("\n[4] Release second block (buddies merge and coalesce upward)");
  allocator.release(second);
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 5) Allocate the same size again. With the arena fully coalesced,
  //    this should return to the very same address as step 1.
  // --------------------------------------------------------------------
  println!("\n[5] Allocate 8 bytes again (expect reuse of the same address)");
  let third = allocator.allocate(8).expect("allocation should succeed");
  println!(
    "[5] third == first? {}",
    if third.as_ptr() == first.as_ptr() {
      "yes, fully coalesced back to the original split"
    } else {
      "no, arena state diverged"
    }
  );
  allocator.release(third);
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 6) Request something larger than the arena can ever hold.
  // --------------------------------------------------------------------
  println!("\n[6] Allocate something larger than the whole arena");
  match allocator.allocate(DemoAllocator::arena_size()) {
    Some(_) => println!("[6] unexpectedly succeeded"),
    None => println!("[6] rejected, as expected: request does not fit the arena"),
  }

  println!("\n[7] End of demo.");
}
