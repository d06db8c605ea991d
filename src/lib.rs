//! A stable typed memory pool: slab + free-heap allocation for node types
//! that must not move.
//!
//! [`Pool<T>`] hands out pointers to uninitialized `T` slots. A pointer
//! returned by [`Pool::alloc`] stays valid at the same address until the
//! matching [`Pool::remove`], regardless of how many other elements are
//! allocated or freed in the meantime — the building block for graphs,
//! intrusive lists, and adjacency structures whose nodes reference each
//! other by address.
//!
//! # Architecture
//!
//! - **Slab map** (`slab_map`): an ordered sequence of slabs. Slab 0 is the
//!   *active* slab, the only one that admits fresh allocations; slabs
//!   `1..` are *sealed*, address-sorted, and only ever shrink until freed.
//! - **Free-heap** (`heap`): a min-heap of holes inside slab 0, so reuse
//!   concentrates live elements toward the front and exposes a trimmable
//!   tail.
//! - **Pool façade** (`pool`): ties the two together and enforces the
//!   growth/eviction lifecycle.
//!
//! # Usage
//!
//! ```
//! use stable_pool::Pool;
//!
//! let mut pool: Pool<u64> = Pool::new();
//! let a = pool.alloc().expect("allocator failure");
//! unsafe { *a = 42 };
//! unsafe { pool.remove(a) }.expect("free-heap allocator failure");
//! ```
//!
//! # Non-goals
//!
//! No global-order iteration, no O(1) live-element count, no shrinking of
//! slab 0, no thread safety, no deterministic release outside explicit
//! `remove`, no defragmentation of sealed slabs. See `SPEC_FULL.md` for the
//! full rationale.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

mod cursor;
mod error;
mod heap;
mod pool;
mod slab_map;

pub use cursor::DebugCursor;
pub use error::{ErrorKind, PoolError, PoolResult};
pub use pool::Pool;

/// The minimum capacity slab 0 is ever allocated with, whether on first
/// allocation or after a `clear`-preserving `reserve`. Must be `>= 2`; the
/// pool's growth arithmetic assumes at least one hole is meaningful to
/// track. The one compile-time tunable named by the spec.
pub const SLAB_MIN_CAPACITY: usize = 8;

const _: () = assert!(SLAB_MIN_CAPACITY >= 2, "SLAB_MIN_CAPACITY must be at least 2");
