//! The host dependency: a "raise the high-water mark" primitive.
//!
//! The allocator never touches the OS directly. It talks to a [`Host`],
//! which is queried once for the current break and afterwards asked to
//! commit memory up to a given address before that address is ever
//! written. The default, real implementation ([`SbrkHost`]) mirrors the
//! teacher allocator's own use of `libc::sbrk`; a fake implementation lives
//! under `#[cfg(test)]` so the commit-failure path (spec scenario:
//! "commit failure rollback") can be driven deterministically.

use libc::{intptr_t, sbrk};

/// A host capable of raising a monotonic break and committing memory below
/// it.
pub trait Host {
  /// The current committed high-water address.
  fn current_break(&self) -> *mut u8;

  /// Extend the committed region to at least `addr`. Returns `false`
  /// (without side effects) if the host cannot satisfy the request.
  fn commit_up_to(
    &mut self,
    addr: *mut u8,
  ) -> bool;
}

/// Minimum amount `commit_up_to` grows the break by in one call, to avoid a
/// storm of tiny `sbrk` calls as blocks are split one level at a time.
const GROW_QUANTUM: usize = 4096;

/// The default host: obtains memory by moving the process break via
/// `sbrk`, exactly as the teacher's `BumpAllocator` does.
pub struct SbrkHost {
  committed: *mut u8,
}

impl SbrkHost {
  /// Query the current break and adopt it as the starting high-water
  /// mark.
  pub fn new() -> Self {
    let committed = unsafe { sbrk(0) } as *mut u8;
    Self { committed }
  }
}

impl Default for SbrkHost {
  fn default() -> Self {
    Self::new()
  }
}

impl Host for SbrkHost {
  fn current_break(&self) -> *mut u8 {
    self.committed
  }

  fn commit_up_to(
    &mut self,
    addr: *mut u8,
  ) -> bool {
    if addr <= self.committed {
      return true;
    }

    let needed = addr as usize - self.committed as usize;
    let grow = needed.next_multiple_of(GROW_QUANTUM);

    let old_break = unsafe { sbrk(grow as intptr_t) };
    if old_break as usize == usize::MAX {
      // sbrk returns (void*) -1 on failure.
      return false;
    }
    debug_assert_eq!(old_break as *mut u8, self.committed);

    self.committed = unsafe { self.committed.add(grow) };
    true
  }
}

#[cfg(test)]
pub(crate) mod fake {
  use super::Host;
  use std::alloc::{alloc_zeroed, Layout};

  /// A host backed by a plain heap buffer, for deterministic tests.
  ///
  /// `ceiling` caps how far `commit_up_to` is allowed to advance the
  /// break, letting tests simulate a host that refuses further growth
  /// (spec scenario: "commit failure rollback").
  pub struct FakeHost {
    base: *mut u8,
    committed: *mut u8,
    ceiling: *mut u8,
    _layout: Layout,
  }

  impl FakeHost {
    /// Allocate a zeroed buffer of `capacity` bytes to back the fake
    /// arena, with commits allowed up to `ceiling_offset` bytes past
    /// the base.
    pub fn new(
      capacity: usize,
      ceiling_offset: usize,
    ) -> Self {
      let layout = Layout::from_size_align(capacity, 8).unwrap();
      let base = unsafe { alloc_zeroed(layout) };
      assert!(!base.is_null(), "failed to allocate fake host buffer");
      Self {
        base,
        committed: base,
        ceiling: unsafe { base.add(ceiling_offset.min(capacity)) },
        _layout: layout,
      }
    }
  }

  impl Host for FakeHost {
    fn current_break(&self) -> *mut u8 {
      self.base
    }

    fn commit_up_to(
      &mut self,
      addr: *mut u8,
    ) -> bool {
      if addr <= self.committed {
        return true;
      }
      if addr > self.ceiling {
        return false;
      }
      self.committed = addr;
      true
    }
  }

  impl Drop for FakeHost {
    fn drop(&mut self) {
      unsafe { std::alloc::dealloc(self.base, self._layout) };
    }
  }
}
