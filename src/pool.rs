//! The pool façade: ties the slab map and free-heap together.
//!
//! See spec §4.3 for the algorithms implemented here; `crate::SLAB_MIN_CAPACITY`
//! is the one compile-time tunable (spec §6).

use core::mem::size_of;

use crate::cursor::DebugCursor;
use crate::error::{PoolError, PoolResult};
use crate::heap::MaxIndexHeap;
use crate::slab_map::SlabMap;
use crate::SLAB_MIN_CAPACITY;

fn max_elements<T>() -> usize {
    let size = size_of::<T>();
    if size == 0 {
        usize::MAX
    } else {
        usize::MAX / size
    }
}

/// Pick the next capacity for slab 0: geometric growth of the previous
/// capacity (golden-ratio approximation, `1 + 1/2 + 1/8`), raised to at
/// least `min_required` and `SLAB_MIN_CAPACITY`, then clamped to the
/// largest capacity `T` can address at all.
fn next_capacity<T>(old_capacity: usize, min_required: usize) -> PoolResult<usize> {
    let geometric = old_capacity
        .checked_add(old_capacity / 2)
        .and_then(|v| v.checked_add(old_capacity / 8))
        .unwrap_or(usize::MAX);
    let desired = geometric.max(min_required).max(SLAB_MIN_CAPACITY);
    let capped = desired.min(max_elements::<T>());
    if capped < min_required {
        return Err(PoolError::out_of_range());
    }
    Ok(capped)
}

/// A stable typed memory pool.
///
/// Hands out pointers to uninitialized `T` slots via [`Pool::alloc`]. A
/// returned pointer stays valid at the same address until the matching
/// [`Pool::remove`], or until the pool itself is dropped — no other
/// operation, including growth, ever moves a live element (spec §5).
///
/// A freshly constructed pool is idle: no memory has been allocated yet,
/// and `size_of::<Pool<T>>()` worth of zeroed bytes is a valid value for it
/// (spec §9, "hot idle state = zero bytes").
pub struct Pool<T> {
    map: SlabMap<T>,
    free: MaxIndexHeap,
}

impl<T> Pool<T> {
    /// An idle pool: no slabs, no holes, nothing allocated.
    pub const fn new() -> Self {
        Pool { map: SlabMap::new(), free: MaxIndexHeap::new() }
    }

    /// Ensure `n` more elements can be allocated without a further
    /// allocator call.
    ///
    /// If slab 0 is empty and needs to grow, it is reallocated in place
    /// (no eviction — there is nothing live to preserve). Otherwise, if slab
    /// 0 cannot hold `n` more elements even after accounting for existing
    /// holes, the current slab 0 is evicted into the sealed set and a
    /// larger one takes its place.
    pub fn reserve(&mut self, n: usize) -> PoolResult<()> {
        if !self.map.has_active() {
            let capacity = next_capacity::<T>(0, n)?;
            return self.map.init_active(capacity);
        }

        let active = self.map.active();
        let available = (active.capacity - active.size) + self.free.size();
        if n <= available {
            return Ok(());
        }

        if active.size == 0 {
            let capacity = next_capacity::<T>(active.capacity, n)?;
            return self.map.upgrade_active(capacity);
        }

        let capacity = next_capacity::<T>(active.capacity, n)?;
        let fresh = crate::slab_map::allocate_slab::<T>(capacity)?;
        // Holes the free-heap tracked belonged to the old slab 0; once it is
        // sealed they are no longer reachable through any live pointer, so
        // they must not be double-counted as still-live in the sealed slot.
        let live = active.size - self.free.size();
        match self.map.evict_active(fresh, live) {
            Ok(()) => {
                self.free.clear();
                Ok(())
            }
            Err((err, fresh)) => {
                // SAFETY: `fresh` was just allocated above and was never
                // installed into the map, so it is safe to free here.
                unsafe { crate::slab_map::free_slab(&fresh) };
                Err(err)
            }
        }
    }

    /// Return a pointer to an uninitialized `T` slot.
    ///
    /// Named `alloc` rather than the spec's `new` — `new` is reserved by
    /// Rust convention for the idle constructor above.
    pub fn alloc(&mut self) -> PoolResult<*mut T> {
        self.reserve(1)?;
        let idx = match self.free.take_any() {
            Some(i) => i,
            None => {
                let active = self.map.active_mut();
                let i = active.size;
                active.size += 1;
                i
            }
        };
        let active = self.map.active();
        // SAFETY: `idx` came either from the free-heap (always `< size`) or
        // was the previous high-water mark, now `< size <= capacity`.
        Ok(unsafe { active.ptr.as_ptr().add(idx) })
    }

    /// Mark the element at `ptr` as free.
    ///
    /// # Safety
    /// `ptr` must have been returned by a previous `alloc` on this pool and
    /// must not already have been removed. Violating this is checked only
    /// in debug builds (`debug_assert!`) — see spec §9's open question on
    /// foreign-pointer removal, resolved here in favor of a caller
    /// precondition rather than a checked runtime error.
    ///
    /// If this returns `Err`, the element at `ptr` is still considered
    /// live and allocated — the failure came from the free-heap being
    /// unable to grow, and the caller may retry.
    pub unsafe fn remove(&mut self, ptr: *mut T) -> PoolResult<()> {
        let addr = ptr as usize;
        let owner = self.map.slot_of(addr);

        if owner > 0 {
            let slot = self.map.get_mut(owner);
            debug_assert!(slot.size > 0, "remove: double free in sealed slab");
            slot.size -= 1;
            if slot.size == 0 {
                log::trace!("sealed slab {owner} reached zero live elements, freeing");
                // SAFETY: `owner >= 1` and `slot.size == 0`, just verified.
                unsafe { self.map.remove_sealed(owner) };
            }
            return Ok(());
        }

        let (start, size) = {
            let active = self.map.active();
            (active.ptr.as_ptr() as usize, active.size)
        };
        debug_assert!(addr >= start, "remove: pointer precedes slab 0");
        let i = (addr - start) / size_of::<T>();
        debug_assert!(i < size, "remove: pointer out of range for slab 0");

        if i + 1 == size {
            let mut new_size = size - 1;
            while new_size > 0 {
                match self.free.peek() {
                    Some(top) if top == new_size - 1 => {
                        self.free.pop();
                        new_size -= 1;
                    }
                    _ => break,
                }
            }
            self.map.active_mut().size = new_size;
            Ok(())
        } else {
            // A failed push here must not touch `i`'s liveness: the element
            // remains allocated and the caller may retry.
            self.free.push(i)
        }
    }

    /// Free every sealed slab, reset slab 0 to empty, and clear the
    /// free-heap. Slab 0's capacity is preserved.
    pub fn clear(&mut self) {
        self.map.clear_sealed();
        if self.map.has_active() {
            self.map.active_mut().size = 0;
        }
        self.free.clear();
    }

    /// A single-shot, debug-only forward cursor over slab 0's occupied
    /// prefix. See [`DebugCursor`].
    pub fn debug_cursor(&self) -> DebugCursor<'_, T> {
        if self.map.has_active() {
            let active = self.map.active();
            DebugCursor::new(active.ptr.as_ptr(), active.size)
        } else {
            DebugCursor::new(core::ptr::null_mut(), 0)
        }
    }
}

impl<T> Default for Pool<T> {
    fn default() -> Self {
        Self::new()
    }
}
