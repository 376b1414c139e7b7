//! Node addressing arithmetic.
//!
//! The allocator never builds an explicit tree: every node is identified by
//! a `(bucket, in-arena offset)` pair, and the bijection to a breadth-first
//! index into the linearized complete binary tree is pure arithmetic. Bucket
//! 0 is the whole arena; bucket `BUCKETS - 1` is the minimum-size leaf.
//!
//! A node at bucket `b` and index `i` has children at `2i + 1` / `2i + 2`,
//! parent at `(i - 1) / 2`, and buddy (sibling) at `((i - 1) ^ 1) + 1`.

/// `log2` of the byte size of a block at `bucket`, given the arena's
/// `max_log2`.
pub const fn class_log2(
  bucket: usize,
  max_log2: usize,
) -> usize {
  max_log2 - bucket
}

/// Byte size of a block at `bucket`.
pub const fn class_size(
  bucket: usize,
  max_log2: usize,
) -> usize {
  1usize << class_log2(bucket, max_log2)
}

/// First node index at `bucket` (the index of the leftmost node at that
/// depth).
const fn first_index_at(bucket: usize) -> usize {
  (1usize << bucket) - 1
}

/// The node index for the block at in-arena `offset` and `bucket`.
pub const fn node_index(
  offset: usize,
  bucket: usize,
  max_log2: usize,
) -> usize {
  (offset >> class_log2(bucket, max_log2)) + first_index_at(bucket)
}

/// The in-arena offset of the block represented by node `index` at `bucket`.
pub const fn offset_for_node(
  index: usize,
  bucket: usize,
  max_log2: usize,
) -> usize {
  (index - first_index_at(bucket)) * class_size(bucket, max_log2)
}

/// Parent of node `index`. Undefined (wraps) for the root; callers must
/// check `index != 0` first.
pub const fn parent_index(index: usize) -> usize {
  (index - 1) / 2
}

/// Buddy (sibling) of node `index`. Undefined for the root.
pub const fn sibling_index(index: usize) -> usize {
  ((index - 1) ^ 1) + 1
}

/// Left child of node `index`.
pub const fn left_child(index: usize) -> usize {
  2 * index + 1
}

/// Right child of node `index`.
pub const fn right_child(index: usize) -> usize {
  2 * index + 2
}
