//! # buddyheap - A Buddy-System Memory Allocator Library
//!
//! This crate provides a **buddy allocator**: a single contiguous arena is
//! split and merged in powers of two, so every allocation and release is a
//! handful of pointer-chasing operations instead of a scan over the heap.
//!
//! ## Overview
//!
//! ```text
//!   Buddy Allocator Concept:
//!
//!   ┌────────────────────────────────────────────────────────────────────┐
//!   │                         ARENA (2^MAX_LOG2 bytes)                   │
//!   │                                                                    │
//!   │   ┌───────────────────────────────┬────────────────────────────┐  │
//!   │   │         bucket 1 (free)       │       bucket 1 (free)      │  │
//!   │   ├────────────────┬──────────────┤                            │  │
//!   │   │ bucket 2 (used)│bucket 2 (free)│                            │  │
//!   │   └────────────────┴──────────────┴────────────────────────────┘  │
//!   │                                                                    │
//!   └────────────────────────────────────────────────────────────────────┘
//!
//!   A request is rounded up to the smallest power-of-two class that fits.
//!   If no free block of that size exists, a larger block is split in half
//!   repeatedly until one does; releasing a block merges it back into its
//!   buddy whenever that buddy is also free.
//! ```
//!
//! ## Crate Structure
//!
//! ```text
//!   buddyheap
//!   ├── list        - Intrusive circular doubly-linked free lists
//!   ├── addressing  - (bucket, offset) <-> tree-node-index arithmetic
//!   ├── splitbits   - One bit per internal node, tracking split state
//!   ├── buckets     - Per-size-class free-list head table
//!   ├── host        - The "raise the high-water mark" dependency
//!   └── allocator   - Allocator state machine: initialize/allocate/release
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use buddyheap::DefaultAllocator;
//!
//! fn main() {
//!     let mut allocator = DefaultAllocator::new();
//!
//!     let ptr = allocator.allocate(100).expect("out of memory");
//!     unsafe { *(ptr.as_ptr() as *mut u64) = 42 };
//!     allocator.release(ptr);
//! }
//! ```
//!
//! ## How It Works
//!
//! The allocator never talks to the operating system directly. It asks a
//! [`Host`] for the process break at construction time and, from then on,
//! only ever asks it to raise a monotonic high-water mark before writing
//! past it — mirroring the teacher allocator's own use of `sbrk(2)`:
//!
//! ```text
//!   Program Memory Layout:
//!
//!   High Address ┌─────────────────────┐
//!                │       Stack         │ ↓ grows down
//!                │         │           │
//!                │         ▼           │
//!                │                     │
//!                │         ▲           │
//!                │         │           │
//!                │       Heap          │ ↑ grows up (sbrk)
//!                ├─────────────────────┤ ← Program Break (HWM)
//!                │   Uninitialized     │
//!                │       Data          │
//!                ├─────────────────────┤
//!                │   Initialized       │
//!                │       Data          │
//!                ├─────────────────────┤
//!                │       Text          │
//!   Low Address  └─────────────────────┘
//! ```
//!
//! Each allocation carries an 8-byte header immediately before the returned
//! pointer, recording the caller's original request size so it can be
//! recomputed on release:
//!
//! ```text
//!   Single Allocation:
//!   ┌───────────┬────────────────────────────────┐
//!   │  Header   │         User Data               │
//!   │ size: N   │                                 │
//!   │  8 bytes  │          N bytes usable         │
//!   └───────────┴────────────────────────────────┘
//!                ▲
//!                └── Pointer returned to caller
//! ```
//!
//! ## Features
//!
//! - **O(log n) split/merge**: allocation and release cost is bounded by
//!   tree depth, not arena size or live allocation count.
//! - **Lazy commit**: the arena is reserved as address space up front but
//!   physical memory is only committed as splits reach into uncommitted
//!   territory.
//! - **No metadata inside committed blocks beyond a header and, for free
//!   blocks, an intrusive list link**: a node's used/free state for its
//!   *children* lives in a separate bit array, not in the blocks themselves.
//!
//! ## Limitations
//!
//! - **Single-threaded only**: no synchronization primitives.
//! - **Single arena**: one allocator instance owns one contiguous region;
//!   it never shrinks the break back down.
//! - **Unix-only by default**: [`SbrkHost`] requires `libc` and `sbrk`
//!   (POSIX systems); bring your own [`Host`] impl elsewhere.
//!
//! ## Safety
//!
//! This crate manages raw memory directly. `allocate`/`release` are safe to
//! call, but misusing the returned pointer (writing past its size, calling
//! `release` twice, or releasing a pointer not obtained from this allocator)
//! is undefined behavior, exactly as with the system allocator.

mod addressing;
mod allocator;
mod buckets;
mod host;
mod list;
mod splitbits;

pub use allocator::{Allocator, HEADER_SIZE};
pub use host::{Host, SbrkHost};

#[cfg(test)]
pub(crate) use host::fake::FakeHost;

/// An [`Allocator`] with a 16-byte minimum block and a 2 GiB arena ceiling,
/// tuned for general-purpose use on a 64-bit host.
pub type DefaultAllocator = Allocator<4, 31>;

#[cfg(test)]
mod tests {
  use super::*;

  fn small_allocator(
    arena_log2: usize,
    ceiling: usize,
  ) -> Allocator<4, 10, FakeHost> {
    Allocator::with_host(FakeHost::new(1usize << arena_log2, ceiling))
  }

  #[test]
  fn allocate_and_release_round_trip() {
    let mut alloc = small_allocator(10, 1024);
    let p = alloc.allocate(40).expect("allocation should succeed");
    unsafe { *(p.as_ptr() as *mut u64) = 0xDEAD_BEEF };
    assert_eq!(unsafe { *(p.as_ptr() as *mut u64) }, 0xDEAD_BEEF);
    alloc.release(p);
  }

  #[test]
  fn split_cascade_then_immediate_coalesce() {
    // A 1024-byte arena (buckets of class 1024,512,...,16), requesting a
    // tiny block forces a full cascade of splits down from the root.
    let mut alloc = small_allocator(10, 1024);
    let p = alloc.allocate(8).expect("allocation should succeed");
    alloc.release(p);
    // After releasing the only live allocation, everything should have
    // coalesced back to a single free block covering the whole arena.
    assert!(!alloc.is_bucket_empty(0));
    for b in 1..=6 {
      assert!(alloc.is_bucket_empty(b));
    }
  }

  #[test]
  fn buddy_blocked_coalesce_stops_at_shared_ancestor() {
    let mut alloc = small_allocator(10, 1024);
    let a = alloc.allocate(8).unwrap();
    let b = alloc.allocate(8).unwrap();
    // Releasing `a` alone cannot coalesce past the node whose sibling
    // (containing `b`) is still in use.
    alloc.release(a);
    assert!(alloc.is_bucket_empty(0));
    alloc.release(b);
    assert!(!alloc.is_bucket_empty(0));
  }

  #[test]
  fn lifo_reuse_returns_same_address() {
    let mut alloc = small_allocator(10, 1024);
    let p1 = alloc.allocate(16).unwrap();
    alloc.release(p1);
    let p2 = alloc.allocate(16).unwrap();
    assert_eq!(p1.as_ptr(), p2.as_ptr());
  }

  #[test]
  fn oversize_request_is_rejected() {
    let mut alloc = small_allocator(10, 1024);
    assert!(alloc.allocate(1 << 20).is_none());
  }

  #[test]
  fn commit_failure_leaves_allocator_unchanged() {
    // Ceiling lets only the first 64 bytes ever be committed, so any
    // split reaching past that must fail cleanly and repeatably, with
    // the root block restored to its free list each time.
    let mut alloc = small_allocator(10, 64);
    let before = alloc.high_water_mark();
    assert!(alloc.allocate(8).is_none());
    assert_eq!(alloc.high_water_mark(), before);
    assert!(alloc.allocate(8).is_none());
    assert_eq!(alloc.high_water_mark(), before);
    assert!(!alloc.is_bucket_empty(0));
  }

  #[test]
  fn high_water_mark_never_decreases() {
    let mut alloc = small_allocator(10, 1024);
    let before = alloc.high_water_mark();
    let p = alloc.allocate(8).unwrap();
    let after_alloc = alloc.high_water_mark();
    assert!(after_alloc >= before);
    alloc.release(p);
    assert_eq!(alloc.high_water_mark(), after_alloc);
  }

  #[test]
  fn base_address_is_eight_byte_aligned() {
    let alloc = small_allocator(10, 1024);
    assert_eq!(alloc.base_address() % HEADER_SIZE, 0);
  }

  #[test]
  fn split_cascade_leaves_one_free_entry_per_intermediate_bucket() {
    let mut alloc = small_allocator(10, 1024);
    let _p = alloc.allocate(8).expect("allocation should succeed");
    // The root was entirely consumed by the cascade...
    assert!(alloc.is_bucket_empty(0));
    // ...and every intermediate bucket holds exactly one free entry:
    // the right sibling peeled off at that level of the split.
    for b in 1..=6 {
      assert!(
        alloc.bucket_has_exactly_one(b),
        "bucket {b} should hold exactly one free entry after a single allocate"
      );
    }
  }

  #[test]
  fn exhaustion_then_full_release_allows_whole_arena_allocation() {
    let mut alloc = small_allocator(10, 1024);
    let min_class = 1usize << 4;
    let count = Allocator::<4, 10, FakeHost>::arena_size() / min_class;

    let mut live = Vec::new();
    for _ in 0..count {
      live.push(alloc.allocate(8).expect("arena should still have room"));
    }
    assert!(alloc.allocate(8).is_none(), "arena should now be exhausted");

    for p in live {
      alloc.release(p);
    }

    let whole = alloc
      .allocate(Allocator::<4, 10, FakeHost>::arena_size() - HEADER_SIZE)
      .expect("fully released arena should satisfy a whole-arena request");
    alloc.release(whole);
  }
}
