//! The slab map: an address-sorted sequence of slabs with an unsorted,
//! always-active head. See spec §4.1.
//!
//! Index 0 ("slab 0") is the only slab that admits fresh allocations. It is
//! excluded from the address ordering — its address may be anywhere.
//! Indices `1..` ("sealed" slabs) are kept sorted by slab start address so
//! that `slot_of` can binary-search them.

use alloc::alloc::{alloc, dealloc, realloc, Layout};
use alloc::vec::Vec;
use core::mem::size_of;
use core::ptr::NonNull;

use crate::error::{PoolError, PoolResult};

/// One slab's descriptor: its backing allocation and occupied prefix length.
///
/// For slab 0, `size` is the high-water mark (holes may exist below it,
/// tracked separately by the free-heap). For a sealed slab, `size` is the
/// live element count, decremented on every `remove` and never increased.
pub(crate) struct Slot<T> {
    pub(crate) ptr: NonNull<T>,
    pub(crate) size: usize,
    pub(crate) capacity: usize,
}

fn addr<T>(ptr: NonNull<T>) -> usize {
    ptr.as_ptr() as usize
}

fn layout_for<T>(capacity: usize) -> PoolResult<Layout> {
    Layout::array::<T>(capacity).map_err(|_| PoolError::out_of_range())
}

/// Allocate a fresh, zero-length slab with room for `capacity` elements.
/// A zero-capacity slab never touches the allocator and carries a dangling
/// pointer, matching `Vec`'s own convention for empty backing storage.
pub(crate) fn allocate_slab<T>(capacity: usize) -> PoolResult<Slot<T>> {
    if capacity == 0 {
        return Ok(Slot { ptr: NonNull::dangling(), size: 0, capacity: 0 });
    }
    let layout = layout_for::<T>(capacity)?;
    // SAFETY: layout has nonzero size, checked by `Layout::array`.
    let raw = unsafe { alloc(layout) };
    let ptr = NonNull::new(raw as *mut T).ok_or_else(PoolError::alloc_failure)?;
    Ok(Slot { ptr, size: 0, capacity })
}

/// # Safety
/// `slot` must describe a live allocation made by `allocate_slab`/`realloc_slab`
/// that has not already been freed.
pub(crate) unsafe fn free_slab<T>(slot: &Slot<T>) {
    if slot.capacity == 0 {
        return;
    }
    let layout = Layout::array::<T>(slot.capacity).expect("capacity was validated at allocation time");
    dealloc(slot.ptr.as_ptr() as *mut u8, layout);
}

/// Grow `slot` in place to `new_capacity`. Only valid while `slot.size == 0`
/// — the realloc-upgrade path used by `Pool::reserve` when slab 0 is empty,
/// avoiding a pointless eviction-of-empty-slab.
fn realloc_slab<T>(slot: &mut Slot<T>, new_capacity: usize) -> PoolResult<()> {
    debug_assert_eq!(slot.size, 0, "realloc_slab requires an empty slab");
    if slot.capacity == 0 {
        *slot = allocate_slab(new_capacity)?;
        return Ok(());
    }
    let old_layout = Layout::array::<T>(slot.capacity).expect("capacity was validated at allocation time");
    let new_layout = layout_for::<T>(new_capacity)?;
    // SAFETY: old_layout matches the layout `slot.ptr` was allocated with;
    // new_layout.size() is nonzero because new_capacity > slot.capacity >= 0
    // is only reached when new_capacity was validated above.
    let raw = unsafe { realloc(slot.ptr.as_ptr() as *mut u8, old_layout, new_layout.size()) };
    match NonNull::new(raw as *mut T) {
        Some(ptr) => {
            slot.ptr = ptr;
            slot.capacity = new_capacity;
            Ok(())
        }
        // Per `GlobalAlloc::realloc`'s contract, the original block is left
        // untouched when reallocation fails.
        None => Err(PoolError::alloc_failure()),
    }
}

pub(crate) struct SlabMap<T> {
    slots: Vec<Slot<T>>,
}

impl<T> SlabMap<T> {
    pub(crate) const fn new() -> Self {
        SlabMap { slots: Vec::new() }
    }

    pub(crate) fn sealed_count(&self) -> usize {
        self.slots.len().saturating_sub(1)
    }

    pub(crate) fn has_active(&self) -> bool {
        !self.slots.is_empty()
    }

    pub(crate) fn active(&self) -> &Slot<T> {
        &self.slots[0]
    }

    pub(crate) fn active_mut(&mut self) -> &mut Slot<T> {
        &mut self.slots[0]
    }

    pub(crate) fn get(&self, idx: usize) -> &Slot<T> {
        &self.slots[idx]
    }

    pub(crate) fn get_mut(&mut self, idx: usize) -> &mut Slot<T> {
        &mut self.slots[idx]
    }

    /// First allocation: there is no slab 0 yet, so just install one.
    pub(crate) fn init_active(&mut self, capacity: usize) -> PoolResult<()> {
        debug_assert!(self.slots.is_empty());
        let slot = allocate_slab::<T>(capacity)?;
        self.slots.try_reserve(1).map_err(|_| {
            // SAFETY: `slot` was just allocated by us and nothing else
            // references it yet.
            unsafe { free_slab(&slot) };
            PoolError::alloc_failure()
        })?;
        self.slots.push(slot);
        Ok(())
    }

    /// Grow slab 0 in place (it must be empty); no eviction happens.
    pub(crate) fn upgrade_active(&mut self, new_capacity: usize) -> PoolResult<()> {
        realloc_slab(&mut self.slots[0], new_capacity)
    }

    /// Evict the current slab 0 into the sealed region (address-sorted) and
    /// install `fresh` as the new slab 0. `live` is the number of elements
    /// still allocated in the old slab 0 (its high-water mark minus any
    /// holes the free-heap was tracking for it) — a direct `reserve(n)`
    /// for `n > 1` can trigger eviction even while holes remain, so the
    /// sealed slot's live count cannot simply be assumed to equal its
    /// capacity. If `live == 0`, the old slab has nothing left to track and
    /// is freed immediately rather than sealed with invariant-violating
    /// zero size.
    ///
    /// On failure to grow the slot vector, `fresh` is handed back so the
    /// caller can free it and leave the pool's observable state unchanged.
    pub(crate) fn evict_active(
        &mut self,
        fresh: Slot<T>,
        live: usize,
    ) -> Result<(), (PoolError, Slot<T>)> {
        if live == 0 {
            let old = core::mem::replace(&mut self.slots[0], fresh);
            // SAFETY: `live == 0` means no allocated element still points
            // into `old`, so freeing it immediately is sound.
            unsafe { free_slab(&old) };
            return Ok(());
        }
        if self.slots.try_reserve(1).is_err() {
            return Err((PoolError::alloc_failure(), fresh));
        }
        let mut old = core::mem::replace(&mut self.slots[0], fresh);
        old.size = live;
        let idx = self.insertion_index(addr(old.ptr));
        self.slots.insert(idx, old);
        Ok(())
    }

    /// Index of the first sealed slab whose start address is strictly
    /// greater than `x`. Relative to `self.slots[1..]`, offset so it is a
    /// valid insertion point into the full `self.slots`.
    fn insertion_index(&self, x: usize) -> usize {
        let sealed = &self.slots[1..];
        1 + sealed.partition_point(|slot| addr(slot.ptr) < x)
    }

    /// Which slab owns element address `x`? Spec §4.1's two-step algorithm:
    /// the hot path checks slab 0's range directly; otherwise a binary
    /// search over the sealed, address-sorted region.
    pub(crate) fn slot_of(&self, x: usize) -> usize {
        if self.slots.len() <= 1 {
            return 0;
        }
        let active = &self.slots[0];
        let start = addr(active.ptr);
        if x >= start && x < start + active.capacity * size_of::<T>() {
            return 0;
        }
        let sealed = &self.slots[1..];
        let upper = 1 + sealed.partition_point(|slot| addr(slot.ptr) <= x);
        upper - 1
    }

    /// Free and drop a sealed slab that has reached zero live elements.
    ///
    /// # Safety
    /// `idx` must be `>= 1` and `self.slots[idx].size` must already be 0.
    pub(crate) unsafe fn remove_sealed(&mut self, idx: usize) {
        debug_assert!(idx >= 1);
        debug_assert_eq!(self.slots[idx].size, 0);
        let slot = self.slots.remove(idx);
        free_slab(&slot);
    }

    /// Free every sealed slab and truncate the map back to just slab 0
    /// (or to nothing, if there was no active slab).
    pub(crate) fn clear_sealed(&mut self) {
        for slot in self.slots.drain(1..) {
            // SAFETY: draining removes ownership from `self.slots`; the slot
            // is not observable afterward.
            unsafe { free_slab(&slot) };
        }
    }

    /// Free every slab, including slab 0, and empty the map.
    pub(crate) fn clear_all(&mut self) {
        for slot in self.slots.drain(..) {
            // SAFETY: same as `clear_sealed`.
            unsafe { free_slab(&slot) };
        }
    }
}

impl<T> Drop for SlabMap<T> {
    fn drop(&mut self) {
        self.clear_all();
    }
}
