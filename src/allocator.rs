//! The allocator state machine: `initialize`, `allocate`, `release`.
//!
//! This orchestrates the other components — free lists, split bits, node
//! addressing, and the lazily-committed high-water mark — into the buddy
//! algorithm described at the crate level. See [`crate::Allocator`] for the
//! public entry point; this module holds its implementation.

use core::mem;
use core::ptr::NonNull;

use crate::addressing;
use crate::buckets::BucketTable;
use crate::host::{Host, SbrkHost};
use crate::list::{self, Link};
use crate::splitbits::SplitBits;

/// Bytes reserved immediately before every returned pointer, holding the
/// caller's original (not rounded-up) request size.
pub const HEADER_SIZE: usize = 8;

/// Why an internal allocation attempt failed. `allocate`'s public surface
/// stays a plain `Option`, matching the host's raw-pointer API, but this
/// lets the split/commit path itself distinguish the cause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AllocError {
  /// `request + HEADER_SIZE` exceeds the whole arena.
  Oversize,
  /// No free block at or above the target bucket was available.
  NoFreeBlock,
  /// The host refused to extend the committed region far enough.
  CommitFailed,
}

/// A buddy allocator over a single arena of `2^MAX_LOG2` bytes, with size
/// classes down to `2^MIN_LOG2` bytes (including the header).
///
/// `H` is the host the allocator asks to raise its high-water mark; it
/// defaults to [`SbrkHost`], which moves the real process break via
/// `sbrk`, the same primitive the teacher `BumpAllocator` uses.
pub struct Allocator<const MIN_LOG2: usize, const MAX_LOG2: usize, H: Host = SbrkHost> {
  host: H,
  /// 8-byte-aligned start of the arena. Chosen once, from the host's
  /// break at construction time, and never changed afterwards.
  base: usize,
  /// Monotonic high-water mark: every byte in `[base, hwm)` is committed.
  hwm: usize,
  buckets: BucketTable,
  splitbits: SplitBits,
}

impl<const MIN_LOG2: usize, const MAX_LOG2: usize, H: Host> Allocator<MIN_LOG2, MAX_LOG2, H> {
  const BUCKETS: usize = MAX_LOG2 - MIN_LOG2 + 1;

  /// Build an allocator on top of an already-constructed host.
  ///
  /// # Panics
  /// Panics if `MIN_LOG2`/`MAX_LOG2` don't describe a sane arena (too
  /// small a minimum block to hold a free-list link, or `MAX_LOG2` not
  /// strictly greater than `MIN_LOG2`), or if the host fails to commit
  /// the handful of bytes needed for the initial root free-list entry —
  /// per spec this is a fatal startup condition.
  pub fn with_host(mut host: H) -> Self {
    assert!(
      MAX_LOG2 > MIN_LOG2,
      "MAX_LOG2 must be strictly greater than MIN_LOG2"
    );
    assert!(MAX_LOG2 <= 63, "MAX_LOG2 must fit in a 64-bit address space");
    assert!(
      (1usize << MIN_LOG2) >= mem::size_of::<Link>(),
      "minimum block must be large enough to hold a free-list link"
    );

    let raw_base = host.current_break() as usize;
    let base = raw_base.next_multiple_of(HEADER_SIZE);

    let mut allocator = Self {
      host,
      base,
      hwm: base,
      buckets: BucketTable::new(Self::BUCKETS),
      splitbits: SplitBits::new(Self::BUCKETS),
    };

    let root_bytes = mem::size_of::<Link>();
    let committed = allocator.commit_up_to((base + root_bytes) as *mut u8);
    assert!(
      committed,
      "host refused to commit the initial root free-list entry"
    );

    let root = base as *mut Link;
    unsafe { allocator.buckets.push_back(0, root) };

    allocator
  }

  /// Total arena size in bytes.
  pub const fn arena_size() -> usize {
    1usize << MAX_LOG2
  }

  /// Smallest bucket (largest index, smallest block) whose class size is
  /// at least `needed` bytes. `needed` is assumed to already include the
  /// header and to not exceed the arena.
  fn bucket_for_class(
    &self,
    needed: usize,
  ) -> usize {
    let needed = needed.max(1usize << MIN_LOG2);
    let class_log2 = needed.next_power_of_two().trailing_zeros() as usize;
    MAX_LOG2 - class_log2
  }

  /// The target bucket for a user `request`, or `Err(Oversize)` if the
  /// request (plus header) cannot possibly fit the arena.
  fn target_bucket_for_request(
    &self,
    request: usize,
  ) -> Result<usize, AllocError> {
    let needed = request.checked_add(HEADER_SIZE).ok_or(AllocError::Oversize)?;
    if needed > Self::arena_size() {
      return Err(AllocError::Oversize);
    }
    Ok(self.bucket_for_class(needed))
  }

  /// Ask the host to extend the committed region to `addr`, advancing
  /// the tracked high-water mark on success.
  fn commit_up_to(
    &mut self,
    addr: *mut u8,
  ) -> bool {
    if self.host.commit_up_to(addr) {
      self.hwm = self.hwm.max(addr as usize);
      true
    } else {
      false
    }
  }

  fn node_ptr(
    &self,
    offset: usize,
  ) -> *mut Link {
    (self.base + offset) as *mut Link
  }

  /// Allocate `request` bytes. Returns `None` on oversize request,
  /// fragmentation (no large-enough free block), or host commit failure;
  /// in every failure case the allocator's state is unchanged.
  pub fn allocate(
    &mut self,
    request: usize,
  ) -> Option<NonNull<u8>> {
    self.try_allocate(request).ok()
  }

  /// The real implementation of [`Self::allocate`], reporting *why* it
  /// failed internally via [`AllocError`].
  fn try_allocate(
    &mut self,
    request: usize,
  ) -> Result<NonNull<u8>, AllocError> {
    let target_bucket = self.target_bucket_for_request(request)?;

    let (source_bucket, entry) = (0..=target_bucket)
      .rev()
      .find_map(|b| self.buckets.pop_back(b).map(|entry| (b, entry)))
      .ok_or(AllocError::NoFreeBlock)?;

    let offset = entry as usize - self.base;
    let class = addressing::class_size(source_bucket, MAX_LOG2);
    let bytes_needed = if source_bucket < target_bucket {
      class / 2 + mem::size_of::<Link>()
    } else {
      class
    };

    // The commit attempt happens *after* popping, so the committed
    // region covers the headers/links about to be written, and we can
    // restore the block to its free list verbatim on failure.
    if !self.commit_up_to(self.node_ptr(offset + bytes_needed) as *mut u8) {
      unsafe { self.buckets.push_back(source_bucket, entry) };
      return Err(AllocError::CommitFailed);
    }

    let mut node = addressing::node_index(offset, source_bucket, MAX_LOG2);
    if node != 0 {
      self.splitbits.flip_parent_split_and_read(node);
    }

    let mut bucket = source_bucket;
    while bucket < target_bucket {
      let left = addressing::left_child(node);
      let right = addressing::right_child(node);
      // Toggles `node`'s own split-bit: it now has exactly one
      // UNUSED child (the right sibling we're about to free).
      self.splitbits.flip_parent_split_and_read(left);

      let new_bucket = bucket + 1;
      let right_offset = addressing::offset_for_node(right, new_bucket, MAX_LOG2);
      unsafe { self.buckets.push_back(new_bucket, self.node_ptr(right_offset)) };

      node = left;
      bucket = new_bucket;
    }

    let p_addr = self.base + offset;
    unsafe { (p_addr as *mut u64).write(request as u64) };
    // p_addr is derived from the host's break, which is never the null
    // address, so the header-adjusted pointer is never null either.
    Ok(unsafe { NonNull::new_unchecked((p_addr + HEADER_SIZE) as *mut u8) })
  }

  /// Release a pointer previously returned by [`Self::allocate`] on this
  /// allocator. Passing any other pointer is undefined behavior (per
  /// spec, this is not checked at runtime).
  pub fn release(
    &mut self,
    ptr: NonNull<u8>,
  ) {
    let p_addr = ptr.as_ptr() as usize - HEADER_SIZE;
    let request = unsafe { (p_addr as *const u64).read() } as usize;

    let bucket = self.bucket_for_class(request + HEADER_SIZE);
    let offset = p_addr - self.base;
    let mut node = addressing::node_index(offset, bucket, MAX_LOG2);
    let mut bucket = bucket;

    while node != 0 {
      let parent_is_split = self.splitbits.flip_parent_split_and_read(node);
      if parent_is_split {
        // The buddy is still in use; stop here.
        break;
      }
      // The buddy is free too: un-list it and ascend to the parent.
      let buddy = addressing::sibling_index(node);
      let buddy_offset = addressing::offset_for_node(buddy, bucket, MAX_LOG2);
      unsafe { list::remove(self.node_ptr(buddy_offset)) };

      node = addressing::parent_index(node);
      bucket -= 1;
    }

    let final_offset = addressing::offset_for_node(node, bucket, MAX_LOG2);
    unsafe { self.buckets.push_back(bucket, self.node_ptr(final_offset)) };
  }

  /// The allocator's monotonic high-water mark, as an absolute address.
  /// Exposed for tests that check invariant 4 of the spec (`HWM` never
  /// decreases).
  #[cfg(test)]
  pub(crate) fn high_water_mark(&self) -> usize {
    self.hwm
  }

  #[cfg(test)]
  pub(crate) fn base_address(&self) -> usize {
    self.base
  }

  #[cfg(test)]
  pub(crate) fn is_bucket_empty(
    &mut self,
    bucket: usize,
  ) -> bool {
    self.buckets.is_empty(bucket)
  }

  #[cfg(test)]
  pub(crate) fn split_bit(
    &mut self,
    node_index: usize,
  ) -> bool {
    // Flipping twice leaves the bit as it was; used by tests to peek.
    let v = self.splitbits.flip_parent_split_and_read(node_index);
    self.splitbits.flip_parent_split_and_read(node_index);
    v
  }

  /// `true` iff `bucket` holds exactly one free entry. Pops and restores
  /// the entry, so the list ends up exactly as it started.
  #[cfg(test)]
  pub(crate) fn bucket_has_exactly_one(
    &mut self,
    bucket: usize,
  ) -> bool {
    match self.buckets.pop_back(bucket) {
      None => false,
      Some(entry) => {
        let only_one = self.buckets.is_empty(bucket);
        unsafe { self.buckets.push_back(bucket, entry) };
        only_one
      }
    }
  }
}

impl<const MIN_LOG2: usize, const MAX_LOG2: usize, H: Host + Default>
  Allocator<MIN_LOG2, MAX_LOG2, H>
{
  /// Build a fresh allocator with a default-constructed host.
  pub fn new() -> Self {
    Self::with_host(H::default())
  }
}
